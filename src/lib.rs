//! # memspace
//!
//! Tuple spaces in POSIX shared memory. Unrelated processes on one host
//! rendezvous on a name, map the same shm object, and exchange typed
//! tuples through it with content matching. No daemon, no socket, no
//! coordinator process.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ Space / SpaceRegistry     (public handles)     │
//! ├────────────────────────────────────────────────┤
//! │ pattern (formats, fields) │ store (slots)      │
//! ├────────────────────────────────────────────────┤
//! │ lock (cross-process CAS)  │ superpage (ABI)    │
//! ├────────────────────────────────────────────────┤
//! │ segment  (shm_open / mmap / rendezvous)        │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! A space is a named shm object: a 4096-byte superpage (magic, version,
//! readiness and lock words, store bookkeeping) followed by a slot area
//! holding the tuples. Creation is race free: losers of the
//! `O_CREAT | O_EXCL` race attach to the winner's object and wait on its
//! ready word. All store mutation happens under the lock word embedded
//! in the superpage, so the mutual exclusion spans every process that
//! has the space mapped.
//!
//! Tuples are written and matched through format strings: `"uu"` writes
//! two `u32` fields, `"u?u"` takes a tuple whose first field equals a
//! literal and captures the second. See [`pattern`] for the full format
//! language and [`Space`] for the operations.

pub mod config;
pub mod error;
pub mod pattern;
pub mod registry;
pub mod space;
pub mod superpage;

mod lock;
mod segment;
mod store;

pub use config::SpaceConfig;
pub use error::{Result, SpaceError};
pub use pattern::{Field, FieldType};
pub use registry::SpaceRegistry;
pub use space::Space;
