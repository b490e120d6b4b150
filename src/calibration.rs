//! Persisted idle brightness ("calibration").
//!
//! A calibration is a named snapshot of the idle table. It is stored as one
//! binary blob:
//!
//! ```text
//! [version: u8][payload length: u16 LE][postcard payload][CRC32 LE]
//! ```
//!
//! The CRC covers everything before it. Blobs with an unknown version or a
//! bad checksum are rejected by [`Calibration::decode`]; callers fall back to
//! [`Calibration::default`] so the idle table is never left uninitialised.

use crc32fast::Hasher;
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::types::{BRG_MAX, BrightnessTable, DARK_TABLE};

/// Format version written into every blob.
pub const CALIBRATION_FORMAT_VERSION: u8 = 0;

/// Maximum calibration name length in bytes.
pub const CALIBRATION_NAME_MAX_LEN: usize = 32;

/// Name reported when no calibration is stored.
pub const DEFAULT_CALIBRATION_NAME: &str = "default";

/// Upper bound of an encoded calibration, in bytes.
pub const CALIBRATION_BLOB_MAX_LEN: usize = 768;

const HEADER_SIZE: usize = 3;
const CRC_SIZE: usize = 4;

/// A named idle brightness table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Name given by the operator on save.
    pub name: String<CALIBRATION_NAME_MAX_LEN>,

    /// Idle brightness of every LED.
    pub idle: BrightnessTable,
}

impl Default for Calibration {
    /// All LEDs off, named [`DEFAULT_CALIBRATION_NAME`].
    fn default() -> Self {
        let mut name = String::new();
        // Fits: the default name is shorter than CALIBRATION_NAME_MAX_LEN.
        let _ = name.push_str(DEFAULT_CALIBRATION_NAME);
        Self {
            name,
            idle: DARK_TABLE,
        }
    }
}

impl Calibration {
    /// Creates a calibration from a name and an idle table.
    ///
    /// # Errors
    /// * `NameTooLong` - `name` exceeds [`CALIBRATION_NAME_MAX_LEN`] bytes
    pub fn new(name: &str, idle: &BrightnessTable) -> Result<Self, CalibrationError> {
        let name = String::try_from(name).map_err(|_| CalibrationError::NameTooLong(name.len()))?;
        Ok(Self { name, idle: *idle })
    }

    /// Encodes the calibration into `buffer`.
    ///
    /// # Returns
    /// Number of bytes written.
    ///
    /// # Errors
    /// * `BufferTooSmall` - `buffer` cannot hold the encoded blob
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, CalibrationError> {
        if buffer.len() < HEADER_SIZE + CRC_SIZE {
            return Err(CalibrationError::BufferTooSmall);
        }

        let payload_end = buffer.len() - CRC_SIZE;
        let payload_len = postcard::to_slice(self, &mut buffer[HEADER_SIZE..payload_end])
            .map_err(|_| CalibrationError::BufferTooSmall)?
            .len();
        let payload_len_le = u16::try_from(payload_len)
            .map_err(|_| CalibrationError::BufferTooSmall)?
            .to_le_bytes();

        buffer[0] = CALIBRATION_FORMAT_VERSION;
        buffer[1..HEADER_SIZE].copy_from_slice(&payload_len_le);

        let crc_offset = HEADER_SIZE + payload_len;
        let crc = compute_crc(&buffer[..crc_offset]);
        buffer[crc_offset..crc_offset + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());

        Ok(crc_offset + CRC_SIZE)
    }

    /// Decodes a blob written by [`encode`](Self::encode).
    ///
    /// Trailing bytes after the CRC are ignored, so a whole storage sector may
    /// be passed in.
    ///
    /// # Errors
    /// * `Truncated` - The blob ends before its declared length
    /// * `UnsupportedVersion` - The blob was written by another format version
    /// * `Corrupted` - CRC mismatch, undecodable payload or a level above [`BRG_MAX`]
    pub fn decode(blob: &[u8]) -> Result<Self, CalibrationError> {
        if blob.len() < HEADER_SIZE + CRC_SIZE {
            return Err(CalibrationError::Truncated);
        }

        let version = blob[0];
        if version != CALIBRATION_FORMAT_VERSION {
            return Err(CalibrationError::UnsupportedVersion(version));
        }

        let payload_len = usize::from(u16::from_le_bytes([blob[1], blob[2]]));
        let crc_offset = HEADER_SIZE + payload_len;
        let Some(stored_crc) = blob.get(crc_offset..crc_offset + CRC_SIZE) else {
            return Err(CalibrationError::Truncated);
        };
        let stored_crc = u32::from_le_bytes([stored_crc[0], stored_crc[1], stored_crc[2], stored_crc[3]]);
        if stored_crc != compute_crc(&blob[..crc_offset]) {
            return Err(CalibrationError::Corrupted);
        }

        let calibration: Self = postcard::from_bytes(&blob[HEADER_SIZE..crc_offset])
            .map_err(|_| CalibrationError::Corrupted)?;
        calibration.validate()?;
        Ok(calibration)
    }

    /// Checks every idle level against [`BRG_MAX`].
    ///
    /// # Errors
    /// * `Corrupted` - At least one level is out of range
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let in_range = self
            .idle
            .iter()
            .flatten()
            .flatten()
            .all(|level| *level <= BRG_MAX);
        if in_range {
            Ok(())
        } else {
            Err(CalibrationError::Corrupted)
        }
    }
}

fn compute_crc(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Persistent storage for a single calibration slot.
///
/// Implement this over flash, EEPROM or a file. Encoding is up to the
/// implementation; [`Calibration::encode`] and [`Calibration::decode`] provide
/// a checked binary format.
pub trait CalibrationStore {
    /// Error reported by the storage backend.
    type Error;

    /// Loads the stored calibration.
    ///
    /// Returns `Ok(None)` when nothing (or nothing readable) is stored.
    fn load(&mut self) -> Result<Option<Calibration>, Self::Error>;

    /// Replaces the stored calibration.
    fn save(&mut self, calibration: &Calibration) -> Result<(), Self::Error>;

    /// Removes the stored calibration. Deleting an empty slot succeeds.
    fn delete(&mut self) -> Result<(), Self::Error>;
}

/// Calibration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// Name longer than [`CALIBRATION_NAME_MAX_LEN`]; carries the given length.
    NameTooLong(usize),

    /// Output buffer too small for the encoded calibration.
    BufferTooSmall,

    /// Blob shorter than its header or declared payload.
    Truncated,

    /// Blob written with an unknown format version.
    UnsupportedVersion(u8),

    /// Checksum mismatch or undecodable payload.
    Corrupted,
}

impl core::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CalibrationError::NameTooLong(len) => write!(
                f,
                "calibration name too long: {} (max {})",
                len, CALIBRATION_NAME_MAX_LEN
            ),
            CalibrationError::BufferTooSmall => write!(f, "calibration buffer too small"),
            CalibrationError::Truncated => write!(f, "calibration data truncated"),
            CalibrationError::UnsupportedVersion(version) => {
                write!(f, "unsupported calibration format version: {}", version)
            }
            CalibrationError::Corrupted => write!(f, "calibration data corrupted"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CalibrationError {}
