//! # Segment Lifecycle
//!
//! Maps a named POSIX shm object and takes it through the superpage
//! rendezvous. Any process may open a space by name with no coordinator:
//!
//! 1. Try a plain `shm_open`. `ENOENT` means nobody created the object
//!    yet, so try again with `O_CREAT | O_EXCL`; losing that race with
//!    `EEXIST` falls back to a plain open.
//! 2. The creation winner sizes the object, maps it, builds the
//!    superpage, and publishes readiness last with a `Release` store.
//! 3. Everyone else polls the object size and then the ready word with
//!    `Acquire` loads, 1 ms apart for at most 1 s, then validates the
//!    magic and version. The bounded poll turns a creator that died
//!    mid-construction into a timeout instead of a hang.
//!
//! Closing a segment only unmaps it; the backing object survives until
//! someone unlinks the name.

use std::fs::File;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Instant;

use memmap2::MmapMut;
use rustix::fs::{fstat, ftruncate, Mode};
use rustix::io::Errno;
use rustix::shm;
use tracing::debug;
use zerocopy::IntoBytes;

use crate::config::{SpaceConfig, READY_POLL_INTERVAL, READY_POLL_MAX_WAIT, SUPERPAGE_SIZE};
use crate::error::{Result, SpaceError};
use crate::lock::SpaceLockGuard;
use crate::superpage::{self, SpaceIdent, StoreMeta, FORMAT_VERSION, READY};

/// Longest name the shm namespace accepts, including the leading slash.
pub const MAX_NAME_LEN: usize = 255;

/// Checks a space name against the shm namespace rules: a leading
/// slash, no other slashes, and a bounded length.
pub(crate) fn validate_space_name(name: &str) -> Result<()> {
    let invalid = |reason| SpaceError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if !name.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if name.len() < 2 {
        return Err(invalid("must name the object after the '/'"));
    }
    if name[1..].contains('/') {
        return Err(invalid("must not contain '/' after the first"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 255 bytes"));
    }
    if name.contains('\0') {
        return Err(invalid("must not contain NUL"));
    }
    Ok(())
}

/// A mapped shm segment holding one tuple space.
pub(crate) struct ShmSegment {
    name: String,
    mmap: MmapMut,
    _file: File,
}

impl ShmSegment {
    /// Opens the named space, creating and constructing it when this
    /// process wins the creation race.
    pub(crate) fn open(name: &str, config: &SpaceConfig) -> Result<Self> {
        validate_space_name(name)?;
        let (file, created) = open_or_create(name)?;
        if created {
            Self::construct(name, file, config)
        } else {
            Self::attach(name, file)
        }
    }

    /// Opens the named space only if its backing object already exists.
    pub(crate) fn open_existing(name: &str) -> Result<Self> {
        validate_space_name(name)?;
        let fd = shm::open(name, shm::OFlags::RDWR, shm_mode())
            .map_err(|errno| SpaceError::resource("shm_open", name, errno))?;
        Self::attach(name, File::from(fd))
    }

    fn construct(name: &str, file: File, config: &SpaceConfig) -> Result<Self> {
        let capacity = config.store_capacity();
        let total = SUPERPAGE_SIZE + capacity;
        ftruncate(&file, total as u64)
            .map_err(|errno| SpaceError::resource("ftruncate", name, errno))?;

        // SAFETY: the fd refers to a freshly created shm object sized to
        // `total` just above; the mapping stays valid as long as this
        // segment holds it.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| SpaceError::Resource {
            op: "mmap",
            name: name.to_string(),
            source,
        })?;

        let mut segment = Self {
            name: name.to_string(),
            mmap,
            _file: file,
        };

        {
            let page = &mut segment.mmap[..SUPERPAGE_SIZE];
            page[superpage::IDENT_OFFSET..superpage::IDENT_OFFSET + superpage::IDENT_SIZE]
                .copy_from_slice(SpaceIdent::new().as_bytes());
            page[superpage::META_OFFSET..superpage::META_OFFSET + superpage::META_SIZE]
                .copy_from_slice(StoreMeta::new(capacity as u32).as_bytes());
            // Ready and lock words are already zero in a fresh object.
        }

        // Publish: after this store any opener that observes READY also
        // observes the fully built superpage.
        segment.ready_word().store(READY, Ordering::Release);
        debug!(space = %name, capacity, "created tuple space");
        Ok(segment)
    }

    fn attach(name: &str, file: File) -> Result<Self> {
        let deadline = Instant::now() + READY_POLL_MAX_WAIT;

        // The creator may not have sized the object yet.
        loop {
            let stat = fstat(&file).map_err(|errno| SpaceError::resource("fstat", name, errno))?;
            if stat.st_size as usize >= SUPERPAGE_SIZE {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SpaceError::Timeout {
                    name: name.to_string(),
                    waited: READY_POLL_MAX_WAIT,
                });
            }
            thread::sleep(READY_POLL_INTERVAL);
        }

        // SAFETY: the object has at least superpage size; the mapping
        // stays valid as long as this segment holds it.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| SpaceError::Resource {
            op: "mmap",
            name: name.to_string(),
            source,
        })?;
        let segment = Self {
            name: name.to_string(),
            mmap,
            _file: file,
        };

        loop {
            if segment.ready_word().load(Ordering::Acquire) == READY {
                break;
            }
            if Instant::now() >= deadline {
                return Err(SpaceError::Timeout {
                    name: name.to_string(),
                    waited: READY_POLL_MAX_WAIT,
                });
            }
            thread::sleep(READY_POLL_INTERVAL);
        }

        segment.validate()?;
        debug!(space = %name, "opened tuple space");
        Ok(segment)
    }

    fn validate(&self) -> Result<()> {
        let page = &self.mmap[..SUPERPAGE_SIZE];
        let ident = superpage::ident(page);
        if !ident.has_valid_magic() {
            return Err(SpaceError::primitive(&self.name, "bad magic"));
        }
        if ident.version() != FORMAT_VERSION {
            return Err(SpaceError::primitive(
                &self.name,
                format!("unsupported version {}", ident.version()),
            ));
        }
        let capacity = superpage::meta(page).store_capacity() as usize;
        if SUPERPAGE_SIZE + capacity > self.mmap.len() {
            return Err(SpaceError::primitive(
                &self.name,
                "store capacity exceeds the mapped object",
            ));
        }
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn ready_word(&self) -> &AtomicU32 {
        // SAFETY: the mapping is page-aligned, at least superpage sized,
        // and lives as long as self.
        unsafe { superpage::ready_word(self.mmap.as_ptr()) }
    }

    /// Runs `f` on the store metadata and slot area while holding the
    /// cross-process lock.
    pub(crate) fn with_store<R>(
        &mut self,
        f: impl FnOnce(&str, &mut StoreMeta, &mut [u8]) -> R,
    ) -> R {
        let capacity = superpage::meta(&self.mmap[..SUPERPAGE_SIZE]).store_capacity() as usize;
        let base = self.mmap.as_mut_ptr();

        // SAFETY: the mapping is page-aligned and at least SUPERPAGE_SIZE
        // + capacity bytes (checked at open). The three references cover
        // disjoint regions of it and none outlives this call. Concurrent
        // processes only touch the metadata and slot area while holding
        // the same lock word.
        let (word, meta, area) = unsafe {
            let word = superpage::lock_word(base);
            let meta = &mut *(base.add(superpage::META_OFFSET) as *mut StoreMeta);
            let area = std::slice::from_raw_parts_mut(base.add(SUPERPAGE_SIZE), capacity);
            (word, meta, area)
        };

        let _guard = SpaceLockGuard::acquire(word);
        f(&self.name, meta, area)
    }

    /// Invalidates the superpage and removes the name from the shm
    /// namespace. Callers must ensure no process holds the space lock.
    pub(crate) fn unlink(mut self) -> Result<()> {
        superpage::invalidate(&mut self.mmap[..SUPERPAGE_SIZE]);
        shm::unlink(&self.name)
            .map_err(|errno| SpaceError::resource("shm_unlink", &self.name, errno))?;
        debug!(space = %self.name, "unlinked tuple space");
        Ok(())
    }
}

fn shm_mode() -> Mode {
    // Spaces are a cross-process rendezvous, so the object is created
    // world read-write like any other local IPC endpoint.
    Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::WGRP | Mode::ROTH | Mode::WOTH
}

fn open_or_create(name: &str) -> Result<(File, bool)> {
    match shm::open(name, shm::OFlags::RDWR, shm_mode()) {
        Ok(fd) => return Ok((File::from(fd), false)),
        Err(errno) if errno == Errno::NOENT => {}
        Err(errno) => return Err(SpaceError::resource("shm_open", name, errno)),
    }

    let create = shm::OFlags::RDWR | shm::OFlags::CREATE | shm::OFlags::EXCL;
    match shm::open(name, create, shm_mode()) {
        Ok(fd) => Ok((File::from(fd), true)),
        // Lost the creation race; the winner's object is there now.
        Err(errno) if errno == Errno::EXIST => {
            match shm::open(name, shm::OFlags::RDWR, shm_mode()) {
                Ok(fd) => Ok((File::from(fd), false)),
                Err(errno) => Err(SpaceError::resource("shm_open", name, errno)),
            }
        }
        Err(errno) => Err(SpaceError::resource("shm_open", name, errno)),
    }
}
