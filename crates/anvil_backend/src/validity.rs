//! Validity fingerprints for output items.

use anvil_common::FileStamp;
use std::any::Any;
use std::fmt;
use std::io;

/// A backend-defined comparable snapshot of one output item.
///
/// Fingerprints decide "is this item's previous result still valid": the
/// engine only hands a backend items whose current fingerprint differs from
/// the last committed one, that have never been seen, or that are forced by
/// a rebuild. The serialized byte format is each backend's own contract; the
/// engine stores the bytes opaquely and round-trips them through
/// [`ProcessingBackend::read_validity_state`](crate::ProcessingBackend::read_validity_state).
pub trait ValidityState: Send + Sync + fmt::Debug {
    /// Serializes this fingerprint to a byte stream.
    fn write_to(&self, out: &mut Vec<u8>);

    /// Compares with another fingerprint of the same item class.
    ///
    /// The comparison must be symmetric; fingerprints of different concrete
    /// types never match.
    fn matches(&self, other: &dyn ValidityState) -> bool;

    /// Downcasting support for [`matches`](Self::matches) implementations.
    fn as_any(&self) -> &dyn Any;
}

/// The standard fingerprint: destination existence plus modification stamp.
///
/// Serialized as 1 byte of existence followed by the stamp as 8 bytes
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampValidity {
    /// Whether the output item existed when the fingerprint was taken.
    pub exists: bool,
    /// Modification stamp of the output item; [`FileStamp::ZERO`] when absent.
    pub stamp: FileStamp,
}

impl TimestampValidity {
    /// Takes the fingerprint of an output path as it currently is on disk.
    pub fn of_path(path: &std::path::Path) -> Self {
        match FileStamp::of_path(path) {
            Ok(stamp) => Self {
                exists: true,
                stamp,
            },
            Err(_) => Self {
                exists: false,
                stamp: FileStamp::ZERO,
            },
        }
    }

    /// Deserializes a fingerprint previously produced by
    /// [`write_to`](ValidityState::write_to).
    pub fn read_from(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() != 9 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "timestamp validity state must be 9 bytes",
            ));
        }
        let exists = bytes[0] != 0;
        let nanos = u64::from_le_bytes(bytes[1..9].try_into().unwrap_or([0; 8]));
        Ok(Self {
            exists,
            stamp: FileStamp::from_nanos(nanos),
        })
    }
}

impl ValidityState for TimestampValidity {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.exists as u8);
        out.extend_from_slice(&self.stamp.as_nanos().to_le_bytes());
    }

    fn matches(&self, other: &dyn ValidityState) -> bool {
        match other.as_any().downcast_ref::<TimestampValidity>() {
            Some(other) => self == other,
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_bytes() {
        let state = TimestampValidity {
            exists: true,
            stamp: FileStamp::from_nanos(123_456),
        };
        let mut bytes = Vec::new();
        state.write_to(&mut bytes);
        let back = TimestampValidity::read_from(&bytes).unwrap();
        assert!(state.matches(&back));
        assert!(back.matches(&state));
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(TimestampValidity::read_from(&[1, 2, 3]).is_err());
    }

    #[test]
    fn different_stamps_do_not_match() {
        let a = TimestampValidity {
            exists: true,
            stamp: FileStamp::from_nanos(1),
        };
        let b = TimestampValidity {
            exists: true,
            stamp: FileStamp::from_nanos(2),
        };
        assert!(!a.matches(&b));
    }

    #[test]
    fn existence_participates_in_comparison() {
        let present = TimestampValidity {
            exists: true,
            stamp: FileStamp::ZERO,
        };
        let absent = TimestampValidity {
            exists: false,
            stamp: FileStamp::ZERO,
        };
        assert!(!present.matches(&absent));
    }

    #[test]
    fn of_path_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.obj");

        let missing = TimestampValidity::of_path(&path);
        assert!(!missing.exists);

        std::fs::write(&path, "output").unwrap();
        let present = TimestampValidity::of_path(&path);
        assert!(present.exists);
        assert!(present.stamp > FileStamp::ZERO);
        assert!(!present.matches(&missing));
    }

    #[test]
    fn fingerprint_stable_across_reads() {
        // Fingerprint equality law: taking the fingerprint twice with no
        // intervening change yields matching states.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.obj");
        std::fs::write(&path, "output").unwrap();

        let first = TimestampValidity::of_path(&path);
        let second = TimestampValidity::of_path(&path);
        assert!(first.matches(&second));
    }
}
