//! # Error Types
//!
//! `SpaceError` covers every failure the crate can surface: operating
//! system failures around the backing object, malformed names and
//! configs, readiness and take timeouts, format/value encoding problems,
//! a full store, an empty non-blocking take, and a superpage that fails
//! validation.

use std::fmt;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, SpaceError>;

#[derive(Debug)]
pub enum SpaceError {
    /// A create/open/size/map/unlink call on the backing object failed.
    Resource {
        op: &'static str,
        name: String,
        source: std::io::Error,
    },
    /// The space name does not fit the shm namespace rules.
    InvalidName {
        name: String,
        reason: &'static str,
    },
    /// A `SpaceConfig` value is out of range.
    InvalidConfig {
        store_capacity: usize,
        reason: &'static str,
    },
    /// A bounded wait (readiness poll or blocking take) expired.
    Timeout {
        name: String,
        waited: Duration,
    },
    /// A format string and its values do not agree, or a payload could
    /// not be decoded back into fields.
    Encoding {
        format: String,
        reason: String,
    },
    /// No free slot or carve space can hold the payload.
    Capacity {
        requested: usize,
        capacity: usize,
    },
    /// Non-blocking take found no matching tuple.
    NotFound,
    /// The mapped superpage is not a usable space: bad magic, wrong
    /// version, or metadata inconsistent with the mapping.
    Primitive {
        name: String,
        reason: String,
    },
}

impl SpaceError {
    pub(crate) fn resource(op: &'static str, name: &str, errno: rustix::io::Errno) -> Self {
        SpaceError::Resource {
            op,
            name: name.to_string(),
            source: std::io::Error::from_raw_os_error(errno.raw_os_error()),
        }
    }

    pub(crate) fn primitive(name: &str, reason: impl Into<String>) -> Self {
        SpaceError::Primitive {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn encoding(format: &str, reason: impl Into<String>) -> Self {
        SpaceError::Encoding {
            format: format.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceError::Resource { op, name, source } => {
                write!(f, "{op} failed for space '{name}': {source}")
            }
            SpaceError::InvalidName { name, reason } => {
                write!(f, "invalid space name '{name}': {reason}")
            }
            SpaceError::InvalidConfig {
                store_capacity,
                reason,
            } => {
                write!(f, "invalid config (store capacity {store_capacity}): {reason}")
            }
            SpaceError::Timeout { name, waited } => {
                write!(f, "timed out after {waited:?} waiting on space '{name}'")
            }
            SpaceError::Encoding { format, reason } => {
                write!(f, "encoding error for format '{format}': {reason}")
            }
            SpaceError::Capacity {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "store full: no slot for {requested} byte payload (store capacity {capacity})"
                )
            }
            SpaceError::NotFound => write!(f, "no matching tuple"),
            SpaceError::Primitive { name, reason } => {
                write!(f, "space '{name}' has an unusable superpage: {reason}")
            }
        }
    }
}

impl std::error::Error for SpaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpaceError::Resource { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_error_reports_op_and_name() {
        let err = SpaceError::resource("shm_open", "/demo", rustix::io::Errno::NOENT);
        let msg = err.to_string();

        assert!(msg.contains("shm_open"));
        assert!(msg.contains("/demo"));
    }

    #[test]
    fn resource_error_exposes_source() {
        use std::error::Error;

        let err = SpaceError::resource("mmap", "/demo", rustix::io::Errno::ACCESS);

        assert!(err.source().is_some());
    }

    #[test]
    fn capacity_error_mentions_both_sizes() {
        let err = SpaceError::Capacity {
            requested: 512,
            capacity: 64,
        };
        let msg = err.to_string();

        assert!(msg.contains("512"));
        assert!(msg.contains("64"));
    }
}
