//! # Superpage ABI
//!
//! Every space begins with a 4096-byte superpage shared verbatim between
//! processes. The layout is a fixed-width little-endian ABI; changing it
//! requires bumping [`FORMAT_VERSION`].
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Description
//! ------  ----  ------------------------------------------------
//! 0       8     Magic: "mmspace\0"
//! 8       4     Format version (little-endian u32)
//! 12      4     Ready word (AtomicU32, 0 = constructing, 1 = ready)
//! 16      4     Lock word (AtomicU32, 0 = unlocked, 1 = held)
//! 20      4     Store capacity in bytes
//! 24      4     Live tuple count
//! 28      4     Bump offset: first never-carved byte of the store
//! 32      4064  Reserved, zero
//! 4096          Store area begins
//! ```
//!
//! The ready word is written with `Release` ordering by the creation
//! winner after every other superpage byte, and polled with `Acquire` by
//! late openers, so no process ever observes a half-built superpage. The
//! lock word serializes all store mutation across processes. The
//! remaining metadata (capacity, live count, bump) is only touched while
//! the lock word is held.

use std::sync::atomic::AtomicU32;

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::SUPERPAGE_SIZE;

/// Identifies a mapped object as a tuple space.
pub const SPACE_MAGIC: [u8; 8] = *b"mmspace\0";

/// Current superpage/store layout version.
pub const FORMAT_VERSION: u32 = 1;

pub const IDENT_OFFSET: usize = 0;
pub const IDENT_SIZE: usize = 12;
pub const READY_OFFSET: usize = 12;
pub const LOCK_OFFSET: usize = 16;
pub const META_OFFSET: usize = 20;
pub const META_SIZE: usize = 12;
pub const SUPERPAGE_HEADER_SIZE: usize = 32;

pub const READY: u32 = 1;

const _: () = assert!(IDENT_OFFSET + IDENT_SIZE == READY_OFFSET);
const _: () = assert!(READY_OFFSET % 4 == 0, "ready word must be 4-byte aligned");
const _: () = assert!(LOCK_OFFSET % 4 == 0, "lock word must be 4-byte aligned");
const _: () = assert!(META_OFFSET + META_SIZE == SUPERPAGE_HEADER_SIZE);
const _: () = assert!(SUPERPAGE_HEADER_SIZE <= SUPERPAGE_SIZE);
const _: () = assert!(std::mem::size_of::<SpaceIdent>() == IDENT_SIZE);
const _: () = assert!(std::mem::size_of::<StoreMeta>() == META_SIZE);

/// Magic and version prefix of the superpage.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SpaceIdent {
    magic: [u8; 8],
    version: U32,
}

impl SpaceIdent {
    pub fn new() -> Self {
        Self {
            magic: SPACE_MAGIC,
            version: U32::new(FORMAT_VERSION),
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == SPACE_MAGIC
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }
}

impl Default for SpaceIdent {
    fn default() -> Self {
        Self::new()
    }
}

/// Store bookkeeping. Mutated only while the lock word is held.
#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct StoreMeta {
    store_capacity: U32,
    live_count: U32,
    bump: U32,
}

impl StoreMeta {
    pub fn new(store_capacity: u32) -> Self {
        Self {
            store_capacity: U32::new(store_capacity),
            live_count: U32::ZERO,
            bump: U32::ZERO,
        }
    }

    pub fn store_capacity(&self) -> u32 {
        self.store_capacity.get()
    }

    pub fn live_count(&self) -> u32 {
        self.live_count.get()
    }

    pub fn set_live_count(&mut self, count: u32) {
        self.live_count = U32::new(count);
    }

    pub fn bump(&self) -> u32 {
        self.bump.get()
    }

    pub fn set_bump(&mut self, bump: u32) {
        self.bump = U32::new(bump);
    }
}

/// Borrows the ident region out of a superpage slice.
pub(crate) fn ident(superpage: &[u8]) -> &SpaceIdent {
    // The slice below has length IDENT_SIZE and SpaceIdent is Unaligned,
    // so the cast cannot fail.
    SpaceIdent::ref_from_bytes(&superpage[IDENT_OFFSET..IDENT_OFFSET + IDENT_SIZE])
        .expect("ident slice has exact size")
}

pub(crate) fn meta(superpage: &[u8]) -> &StoreMeta {
    StoreMeta::ref_from_bytes(&superpage[META_OFFSET..META_OFFSET + META_SIZE])
        .expect("meta slice has exact size")
}

pub(crate) fn invalidate(superpage: &mut [u8]) {
    superpage[IDENT_OFFSET..IDENT_OFFSET + 8].fill(0);
}

/// Returns the ready word of the superpage at `base`.
///
/// # Safety
///
/// `base` must point at a live mapping of at least
/// `SUPERPAGE_HEADER_SIZE` bytes that stays mapped for `'a`, and must be
/// 4-byte aligned (page-aligned mappings always are).
pub(crate) unsafe fn ready_word<'a>(base: *const u8) -> &'a AtomicU32 {
    &*(base.add(READY_OFFSET) as *const AtomicU32)
}

/// Returns the lock word of the superpage at `base`.
///
/// # Safety
///
/// Same requirements as [`ready_word`].
pub(crate) unsafe fn lock_word<'a>(base: *const u8) -> &'a AtomicU32 {
    &*(base.add(LOCK_OFFSET) as *const AtomicU32)
}
