//! # Tunables
//!
//! Central constants for segment sizing and polling behavior, plus the
//! per-space [`SpaceConfig`].
//!
//! ## Constant Dependencies
//!
//! ```text
//! SUPERPAGE_SIZE ──────┬──> segment mapping size (superpage + store)
//!                      └──> superpage layout asserts (superpage.rs)
//! DEFAULT_STORE_CAPACITY ─> SpaceConfig::default()
//! READY_POLL_INTERVAL ─┬──> segment readiness wait
//! READY_POLL_MAX_WAIT ─┘
//! LOCK_RETRY_INTERVAL ────> lock acquisition backoff
//! TAKE_RETRY_INTERVAL ────> blocking take retry loop
//! ```
//!
//! Store capacities are recorded in the superpage as `u32`, so every
//! capacity that can reach the wire must fit in one.

use std::time::Duration;

use crate::error::{Result, SpaceError};

/// Size of the superpage at the start of every segment. One page on
/// every platform this crate targets; the store area begins at this
/// offset.
pub const SUPERPAGE_SIZE: usize = 4096;

/// Store capacity used by `Space::open` when no config is given.
pub const DEFAULT_STORE_CAPACITY: usize = 64 * 1024;

/// Smallest store that can hold one slot header plus a one-byte payload.
pub const MIN_STORE_CAPACITY: usize = 64;

/// Interval between readiness checks while waiting for the creating
/// process to publish the superpage.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on the readiness wait. A creator that dies between
/// winning creation and publishing readiness surfaces as a timeout,
/// never as a hang.
pub const READY_POLL_MAX_WAIT: Duration = Duration::from_secs(1);

/// Sleep between lock acquisition attempts after the initial spin.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Sleep between store scans in the blocking take loop.
pub const TAKE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Fields per tuple are recorded in a single slot-header byte.
pub const MAX_TUPLE_FIELDS: usize = u8::MAX as usize;

const _: () = assert!(SUPERPAGE_SIZE >= 64, "superpage must hold its header");
const _: () = assert!(SUPERPAGE_SIZE % 8 == 0, "superpage size must be 8-byte aligned");
const _: () = assert!(MIN_STORE_CAPACITY >= 16);
const _: () = assert!(DEFAULT_STORE_CAPACITY >= MIN_STORE_CAPACITY);
const _: () = assert!(DEFAULT_STORE_CAPACITY <= u32::MAX as usize);

/// Per-space settings supplied at open time. Only the creation winner's
/// capacity takes effect; late openers adopt the capacity recorded in
/// the superpage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceConfig {
    store_capacity: usize,
}

impl SpaceConfig {
    pub fn new(store_capacity: usize) -> Result<Self> {
        if store_capacity < MIN_STORE_CAPACITY || store_capacity > u32::MAX as usize {
            return Err(SpaceError::InvalidConfig {
                store_capacity,
                reason: "store capacity out of range",
            });
        }
        Ok(Self { store_capacity })
    }

    pub fn store_capacity(&self) -> usize {
        self.store_capacity
    }
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            store_capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}
