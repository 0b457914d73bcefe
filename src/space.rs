//! # Space Handle
//!
//! [`Space`] is the process-private handle to a named tuple space. Any
//! number of processes (and threads within them) operate on the same
//! space concurrently; only the name is shared between them.
//!
//! ```no_run
//! use memspace::{Field, Space};
//!
//! let space = Space::open("/jobs")?;
//! space.write("uu", &[Field::U32(1), Field::U32(42)])?;
//!
//! // Match the literal 1, capture the second field.
//! let got = space.take("u?u", &[Field::U32(1)], None)?;
//! assert_eq!(got, vec![Field::U32(42)]);
//! # Ok::<(), memspace::SpaceError>(())
//! ```
//!
//! Dropping (or [`close`](Space::close)-ing) a handle unmaps the space
//! but leaves the backing object and its tuples in place for other
//! processes; [`unlink`](Space::unlink) destroys the backing object.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{SpaceConfig, TAKE_RETRY_INTERVAL};
use crate::error::{Result, SpaceError};
use crate::pattern::{self, Field, Pattern};
use crate::segment::ShmSegment;
use crate::store;

pub struct Space {
    name: String,
    segment: Mutex<ShmSegment>,
}

impl Space {
    /// Opens the named space with default settings, creating it if no
    /// process has yet.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_with(name, SpaceConfig::default())
    }

    /// Opens the named space. `config` only takes effect when this call
    /// wins the creation race; late openers adopt the creator's
    /// settings.
    pub fn open_with(name: &str, config: SpaceConfig) -> Result<Self> {
        let segment = ShmSegment::open(name, &config)?;
        Ok(Self::from_segment(segment))
    }

    /// Opens the named space only if it already exists. Maintenance
    /// tools use this to avoid creating spaces as a side effect.
    pub fn open_existing(name: &str) -> Result<Self> {
        let segment = ShmSegment::open_existing(name)?;
        Ok(Self::from_segment(segment))
    }

    fn from_segment(segment: ShmSegment) -> Self {
        Self {
            name: segment.name().to_string(),
            segment: Mutex::new(segment),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores a tuple described by `format` with one value per type
    /// code. Fails with [`SpaceError::Capacity`] when no slot fits and
    /// with [`SpaceError::Encoding`] when format and values disagree.
    pub fn write(&self, format: &str, values: &[Field]) -> Result<()> {
        let tuple = pattern::encode_tuple(format, values)?;
        let mut segment = self.segment.lock();
        segment.with_store(|name, meta, area| store::insert(name, meta, area, &tuple))
    }

    /// Takes the first tuple matching `format` and its literal values,
    /// blocking until one arrives. `?`-prefixed fields are captured and
    /// returned in format order. With `timeout` of `None` the call waits
    /// indefinitely; otherwise an expired wait fails with
    /// [`SpaceError::Timeout`].
    pub fn take(
        &self,
        format: &str,
        literals: &[Field],
        timeout: Option<Duration>,
    ) -> Result<Vec<Field>> {
        let pattern = Pattern::parse(format, literals)?;
        let deadline = timeout.map(|t| (t, Instant::now() + t));

        loop {
            if let Some(captures) = self.take_once(&pattern)? {
                return Ok(captures);
            }
            if let Some((waited, deadline)) = deadline {
                if Instant::now() >= deadline {
                    return Err(SpaceError::Timeout {
                        name: self.name.clone(),
                        waited,
                    });
                }
            }
            thread::sleep(TAKE_RETRY_INTERVAL);
        }
    }

    /// Non-blocking variant of [`take`](Space::take): fails with
    /// [`SpaceError::NotFound`] when nothing matches right now.
    pub fn try_take(&self, format: &str, literals: &[Field]) -> Result<Vec<Field>> {
        let pattern = Pattern::parse(format, literals)?;
        self.take_once(&pattern)?.ok_or(SpaceError::NotFound)
    }

    fn take_once(&self, pattern: &Pattern) -> Result<Option<Vec<Field>>> {
        let mut segment = self.segment.lock();
        segment.with_store(|name, meta, area| store::take_match(name, meta, area, pattern))
    }

    /// Number of tuples currently stored, as a point-in-time snapshot.
    pub fn live_count(&self) -> u32 {
        let mut segment = self.segment.lock();
        segment.with_store(|_, meta, _| meta.live_count())
    }

    /// Unmaps the space. Equivalent to dropping the handle; the backing
    /// object and its tuples survive for other processes.
    pub fn close(self) {
        drop(self);
    }

    /// Destroys the backing object: the name disappears from the shm
    /// namespace and the next open of it builds a fresh, empty space.
    /// Undefined toward processes still using the space, like removing
    /// a file out from under a reader; callers must ensure nobody holds
    /// the space lock.
    pub fn unlink(self) -> Result<()> {
        self.segment.into_inner().unlink()
    }
}
