//! Checksummed binary envelope for persisted cache artifacts.
//!
//! Every cache artifact is written as: 4-byte little-endian header length,
//! bincode-encoded header (magic bytes, format version, payload checksum),
//! then the payload. Writes go to a temporary sibling file first and are
//! renamed into place, so a crash mid-write leaves either the previous
//! artifact or a temporary the next open never reads. A crash mid-rename or
//! a torn payload fails checksum validation and surfaces as
//! [`CacheError::Corrupted`].

use anvil_common::ContentHash;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CacheError;

/// Magic bytes identifying an Anvil cache artifact.
const ENVELOPE_MAGIC: [u8; 4] = *b"ANVL";

/// Current envelope format version. Increment on breaking changes.
const ENVELOPE_FORMAT_VERSION: u32 = 1;

/// Suffix of the temporary file used for atomic replacement.
const TMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvelopeHeader {
    magic: [u8; 4],
    format_version: u32,
    checksum: ContentHash,
}

/// Writes a payload to `path` inside a validated envelope.
///
/// The write is atomic with respect to process crash: the envelope is
/// assembled in memory, written to a temporary file, and renamed over the
/// destination.
pub fn write_envelope(path: &Path, payload: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }

    let header = EnvelopeHeader {
        magic: ENVELOPE_MAGIC,
        format_version: ENVELOPE_FORMAT_VERSION,
        checksum: ContentHash::from_bytes(payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(payload);

    let tmp = path.with_extension(TMP_SUFFIX);
    std::fs::write(&tmp, &output).map_err(|e| CacheError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CacheError::io(path, e))
}

/// Reads and validates an envelope, returning its payload.
///
/// Returns `Ok(None)` if the file does not exist (a fresh cache). Any other
/// failure to produce a valid payload, including truncation, bad magic,
/// version mismatch, and checksum mismatch, is [`CacheError::Corrupted`].
pub fn read_envelope(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    if raw.len() < 4 {
        return Err(CacheError::corrupted(path, "truncated header length"));
    }

    let header_len = u32::from_le_bytes(raw[..4].try_into().unwrap_or([0; 4])) as usize;
    if raw.len() < 4 + header_len {
        return Err(CacheError::corrupted(path, "truncated header"));
    }

    let header: EnvelopeHeader =
        bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
            .map_err(|e| CacheError::corrupted(path, format!("unreadable header: {e}")))?
            .0;

    if header.magic != ENVELOPE_MAGIC {
        return Err(CacheError::corrupted(path, "bad magic bytes"));
    }
    if header.format_version != ENVELOPE_FORMAT_VERSION {
        return Err(CacheError::corrupted(
            path,
            format!(
                "format version {} does not match {}",
                header.format_version, ENVELOPE_FORMAT_VERSION
            ),
        ));
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::corrupted(path, "checksum mismatch"));
    }

    Ok(Some(payload.to_vec()))
}
