//! Save states.
//!
//! A save state is a versioned JSON document holding the complete mutable
//! state of every sub-component; bulk memory regions travel as base64
//! strings. ROM contents are not included — a blob only makes sense
//! restored into a machine with the same cartridge loaded.
//!
//! Serialization is deterministic, so capture → restore → capture yields
//! a byte-identical blob.

use serde::{Deserialize, Serialize};

use crate::cartridge::CartridgeState;
use crate::controller::Controller;
use crate::error::NesError;
use crate::{Apu, Ppu};

/// Format version written by this build. `load_state` refuses any other.
pub(crate) const SAVE_STATE_VERSION: u32 = 1;

/// Base64 (de)serialization for byte buffers, used via
/// `#[serde(with = "b64")]`.
pub(crate) mod b64 {
    use base64::Engine;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_ref());
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(D::Error::custom)?;
        T::try_from(bytes).map_err(|_| D::Error::custom("buffer has the wrong length"))
    }
}

/// CPU register and pacing state.
#[derive(Serialize, Deserialize)]
pub(crate) struct CpuState {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub pc: u16,
    pub p: u8,
    pub cycles_remaining: u8,
    pub total_cycles: u64,
    pub nmi_pending: bool,
    pub irq_pending: bool,
}

/// Bus-side state: RAM, DMA machine, controllers.
#[derive(Serialize, Deserialize)]
pub(crate) struct BusState {
    #[serde(with = "b64")]
    pub ram: [u8; 2048],
    pub dma_page: u8,
    pub dma_address: u8,
    pub dma_data: u8,
    pub dma_transfer: bool,
    pub dma_dummy: bool,
    pub controller1: Controller,
    pub controller2: Controller,
}

/// The whole machine.
#[derive(Serialize, Deserialize)]
pub(crate) struct SaveState {
    pub version: u32,
    pub cpu: CpuState,
    pub bus: BusState,
    pub ppu: Ppu,
    pub apu: Apu,
    pub cartridge: CartridgeState,
    pub master_clock: u64,
    pub cpu_cycles: u64,
    pub frame_count: u64,
}

/// Only the version field, parsed first so mismatches are reported as
/// such rather than as corruption.
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Serialize a state to its blob form.
pub(crate) fn to_blob(state: &SaveState) -> Vec<u8> {
    serde_json::to_vec(state).expect("save state serializes")
}

/// Parse a blob, enforcing the version.
pub(crate) fn from_blob(bytes: &[u8]) -> Result<SaveState, NesError> {
    let probe: VersionProbe =
        serde_json::from_slice(bytes).map_err(|_| NesError::SaveStateCorrupt)?;
    if probe.version != SAVE_STATE_VERSION {
        return Err(NesError::SaveStateVersionMismatch {
            found: probe.version,
            expected: SAVE_STATE_VERSION,
        });
    }
    serde_json::from_slice(bytes).map_err(|_| NesError::SaveStateCorrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64_round_trips_fixed_arrays() {
        #[derive(Serialize, Deserialize)]
        struct Wrap {
            #[serde(with = "b64")]
            data: [u8; 32],
        }
        let w = Wrap { data: [7; 32] };
        let json = serde_json::to_string(&w).expect("serialize");
        let back: Wrap = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.data, [7; 32]);
    }

    #[test]
    fn b64_rejects_wrong_length() {
        #[derive(Deserialize)]
        struct Wrap {
            #[serde(with = "b64")]
            #[allow(dead_code)]
            data: [u8; 4],
        }
        // "AAAA" decodes to 3 bytes, not 4.
        let result: Result<Wrap, _> = serde_json::from_str(r#"{"data":"AAAA"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn version_mismatch_is_detected_before_full_parse() {
        let blob = br#"{"version": 9}"#;
        assert_eq!(
            from_blob(blob).err(),
            Some(NesError::SaveStateVersionMismatch {
                found: 9,
                expected: SAVE_STATE_VERSION
            })
        );
    }

    #[test]
    fn garbage_is_corrupt() {
        assert_eq!(
            from_blob(b"not json").err(),
            Some(NesError::SaveStateCorrupt)
        );
        // Valid JSON with the right version but the wrong shape.
        assert_eq!(
            from_blob(br#"{"version": 1}"#).err(),
            Some(NesError::SaveStateCorrupt)
        );
    }
}
