//! Machine-level error type.

use std::error::Error;
use std::fmt;

/// Failures reported by the fallible entry points (`load_rom`,
/// `load_state`). Everything else in the core is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NesError {
    /// The iNES magic is missing or the header is inconsistent with the
    /// file length.
    UnsupportedRom,
    /// The header parses but names a mapper this core does not implement.
    UnsupportedMapper(u8),
    /// A save-state blob from a different format version.
    SaveStateVersionMismatch {
        /// Version found in the blob.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
    /// A save-state blob that failed to deserialize.
    SaveStateCorrupt,
}

impl fmt::Display for NesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NesError::UnsupportedRom => write!(f, "not a valid iNES ROM image"),
            NesError::UnsupportedMapper(n) => write!(f, "unsupported mapper {n}"),
            NesError::SaveStateVersionMismatch { found, expected } => {
                write!(f, "save state version {found} (expected {expected})")
            }
            NesError::SaveStateCorrupt => write!(f, "save state is corrupt"),
        }
    }
}

impl Error for NesError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            NesError::UnsupportedMapper(85).to_string(),
            "unsupported mapper 85"
        );
        assert_eq!(
            NesError::SaveStateVersionMismatch {
                found: 2,
                expected: 1
            }
            .to_string(),
            "save state version 2 (expected 1)"
        );
    }
}
