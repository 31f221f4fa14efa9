//! iNES cartridge: header parsing and PRG/CHR storage.
//!
//! The cartridge owns the ROM images, the 8 KB PRG RAM window at
//! $6000-$7FFF, and the mapper that translates every CPU/PPU access into
//! an offset. Mapper writes may retarget the nametable mirroring; the
//! current mode lives here and is read by the PPU each access.

#![allow(clippy::cast_possible_truncation)]

use serde::{Deserialize, Serialize};

use crate::error::NesError;
use crate::mapper::{Mapper, Nrom};
use crate::snapshot::b64;

/// Nametable mirroring mode. Mappers may switch this at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    SingleScreenLow,
    SingleScreenHigh,
    FourScreen,
}

/// Parsed iNES header.
#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    /// PRG ROM size in 16 KB banks.
    pub prg_rom_banks: u8,
    /// CHR ROM size in 8 KB banks. Zero means the board carries CHR RAM.
    pub chr_rom_banks: u8,
    /// Mapper number: `(flags7 & $F0) | (flags6 >> 4)`.
    pub mapper_id: u8,
    /// Mirroring hint from flags 6 (four-screen overrides the H/V bit).
    pub mirroring: Mirroring,
    /// Battery-backed PRG RAM present.
    pub has_battery: bool,
    /// 512-byte trainer before the PRG data.
    pub has_trainer: bool,
    /// File declares the NES 2.0 extension (tolerated, not interpreted).
    pub is_nes2: bool,
}

/// Serializable cartridge state: the mutable parts only. ROM contents are
/// deliberately excluded — restoring requires the same ROM to be loaded.
#[derive(Serialize, Deserialize)]
pub(crate) struct CartridgeState {
    #[serde(with = "b64")]
    prg_ram: Vec<u8>,
    /// Contents of the writable CHR region (whole CHR when the board has
    /// CHR RAM, the appended 8 KB for mapper 253, absent otherwise).
    chr_ram: Option<String>,
    mapper: Mapper,
    mirroring: Mirroring,
    irq_latch: bool,
}

/// A loaded (or empty) cartridge.
pub struct Cartridge {
    /// Parsed header.
    pub header: CartridgeHeader,
    prg_rom: Vec<u8>,
    /// CHR ROM, CHR RAM, or (mapper 253) CHR ROM with 8 KB RAM appended.
    chr: Vec<u8>,
    chr_is_ram: bool,
    /// Length of the read-only prefix of `chr`. Offsets at or past this
    /// are writable.
    chr_rom_len: usize,
    prg_ram: Vec<u8>,
    mirroring: Mirroring,
    mapper: Mapper,
    irq_latch: bool,
    loaded: bool,
}

/// PRG RAM window size.
const PRG_RAM_SIZE: usize = 8 * 1024;
/// CHR RAM size when the header declares zero CHR banks.
const CHR_RAM_SIZE: usize = 8 * 1024;

impl Cartridge {
    /// An empty cartridge slot. All reads return zero until a ROM loads.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: CartridgeHeader {
                prg_rom_banks: 0,
                chr_rom_banks: 0,
                mapper_id: 0,
                mirroring: Mirroring::Horizontal,
                has_battery: false,
                has_trainer: false,
                is_nes2: false,
            },
            prg_rom: Vec::new(),
            chr: Vec::new(),
            chr_is_ram: false,
            chr_rom_len: 0,
            prg_ram: vec![0; PRG_RAM_SIZE],
            mirroring: Mirroring::Horizontal,
            mapper: Mapper::Nrom(Nrom::new(1, 1)),
            irq_latch: false,
            loaded: false,
        }
    }

    /// Parse an iNES image.
    ///
    /// # Errors
    ///
    /// [`NesError::UnsupportedRom`] when the magic is missing or the file
    /// is shorter than the header claims; [`NesError::UnsupportedMapper`]
    /// when the mapper number is not implemented.
    pub fn from_ines(data: &[u8]) -> Result<Self, NesError> {
        if data.len() < 16 || &data[0..4] != b"NES\x1a" {
            return Err(NesError::UnsupportedRom);
        }

        let prg_banks = data[4];
        let chr_banks = data[5];
        let flags6 = data[6];
        let flags7 = data[7];

        let mapper_id = (flags7 & 0xF0) | (flags6 >> 4);
        let mirroring = if flags6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        let has_battery = flags6 & 0x02 != 0;
        let has_trainer = flags6 & 0x04 != 0;
        let is_nes2 = flags7 & 0x0C == 0x08;

        let mapper =
            Mapper::from_id(mapper_id, prg_banks, chr_banks).ok_or(NesError::UnsupportedMapper(mapper_id))?;

        let mut offset = 16;
        if has_trainer {
            offset += 512;
        }

        let prg_size = usize::from(prg_banks) * 16 * 1024;
        if data.len() < offset + prg_size {
            return Err(NesError::UnsupportedRom);
        }
        let prg_rom = data[offset..offset + prg_size].to_vec();
        offset += prg_size;

        let (mut chr, chr_is_ram) = if chr_banks > 0 {
            let chr_size = usize::from(chr_banks) * 8 * 1024;
            // Some dumps truncate the CHR data; pad the remainder with
            // zeroes rather than rejecting the image.
            let mut chr = vec![0u8; chr_size];
            let available = data.len().saturating_sub(offset).min(chr_size);
            chr[..available].copy_from_slice(&data[offset..offset + available]);
            (chr, false)
        } else {
            (vec![0u8; CHR_RAM_SIZE], true)
        };

        let chr_rom_len = if chr_is_ram { 0 } else { chr.len() };

        // Mapper 253 banks CHR ROM and an extra 8 KB of CHR RAM through
        // the same window; the RAM lives past the end of the ROM image.
        if mapper_id == 253 && !chr_is_ram {
            chr.resize(chr_rom_len + CHR_RAM_SIZE, 0);
        }

        Ok(Self {
            header: CartridgeHeader {
                prg_rom_banks: prg_banks,
                chr_rom_banks: chr_banks,
                mapper_id,
                mirroring,
                has_battery,
                has_trainer,
                is_nes2,
            },
            prg_rom,
            chr,
            chr_is_ram,
            chr_rom_len,
            prg_ram: vec![0; PRG_RAM_SIZE],
            mirroring,
            mapper,
            irq_latch: false,
            loaded: true,
        })
    }

    /// Reset the mapper and restore the header's mirroring hint.
    pub fn reset(&mut self) {
        self.mapper.reset();
        self.mirroring = self.header.mirroring;
        self.irq_latch = false;
    }

    /// True once a ROM image has been loaded.
    #[must_use]
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// Current nametable mirroring.
    #[must_use]
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    /// Length of the read-only CHR prefix. Offsets returned by
    /// `ppu_map_read` at or past this land in CHR RAM.
    #[must_use]
    pub fn chr_rom_len(&self) -> usize {
        self.chr_rom_len
    }

    /// Mapper state, for harnesses that classify accesses.
    #[must_use]
    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    // === CPU side ===

    /// CPU read from cartridge space ($4020-$FFFF).
    #[must_use]
    pub fn cpu_read(&self, addr: u16) -> u8 {
        if (0x6000..0x8000).contains(&addr) {
            return self.prg_ram[usize::from(addr - 0x6000)];
        }
        match self.mapper.cpu_map_read(addr) {
            Some(offset) if !self.prg_rom.is_empty() => self.prg_rom[offset % self.prg_rom.len()],
            _ => 0,
        }
    }

    /// CPU write to cartridge space. PRG ROM writes reach the mapper's
    /// registers; PRG RAM writes land in RAM (and are still shown to the
    /// mapper — the Bandai boards decode $6000-$7FFF).
    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        if (0x6000..0x8000).contains(&addr) {
            self.prg_ram[usize::from(addr - 0x6000)] = value;
        }
        if let Some(effect) = self.mapper.cpu_map_write(addr, value) {
            if let Some(mode) = effect.mirroring {
                self.mirroring = mode;
            }
            if effect.irq {
                self.irq_latch = true;
            }
        }
    }

    // === PPU side ===

    /// PPU read from pattern space ($0000-$1FFF).
    #[must_use]
    pub fn ppu_read(&self, addr: u16) -> u8 {
        match self.mapper.ppu_map_read(addr) {
            Some(offset) if !self.chr.is_empty() => self.chr[offset % self.chr.len()],
            _ => 0,
        }
    }

    /// PPU write to pattern space. Only offsets past the CHR ROM prefix
    /// are writable; everything else is silently dropped.
    pub fn ppu_write(&mut self, addr: u16, value: u8) {
        if let Some(offset) = self.mapper.ppu_map_write(addr) {
            if offset >= self.chr_rom_len && offset < self.chr.len() {
                self.chr[offset] = value;
            }
        }
    }

    // === Mapper tick hooks ===

    /// A12 rising-edge notification from the PPU.
    pub fn scanline_tick(&mut self) {
        self.mapper.scanline_tick();
    }

    /// One CPU cycle elapsed (cycle-counting IRQ mappers).
    pub fn cpu_tick(&mut self) {
        self.mapper.cpu_tick();
    }

    /// Level view of the mapper IRQ line, without acknowledging it. The
    /// machine polls this every CPU cycle; the line stays asserted until
    /// the program acknowledges it through the mapper's own registers.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.irq_latch || self.mapper.irq_pending()
    }

    /// Acknowledge and drain the pending mapper IRQ, if any.
    pub fn take_irq(&mut self) -> bool {
        let pending = self.irq_latch || self.mapper.take_irq();
        self.irq_latch = false;
        pending
    }

    // === Save-state support ===

    pub(crate) fn state(&self) -> CartridgeState {
        use base64::Engine;
        let chr_ram = if self.chr_rom_len < self.chr.len() {
            Some(base64::engine::general_purpose::STANDARD.encode(&self.chr[self.chr_rom_len..]))
        } else {
            None
        };
        CartridgeState {
            prg_ram: self.prg_ram.clone(),
            chr_ram,
            mapper: self.mapper.clone(),
            mirroring: self.mirroring,
            irq_latch: self.irq_latch,
        }
    }

    pub(crate) fn restore(&mut self, state: CartridgeState) -> Result<(), NesError> {
        use base64::Engine;
        if state.prg_ram.len() != self.prg_ram.len() {
            return Err(NesError::SaveStateCorrupt);
        }
        if let Some(encoded) = &state.chr_ram {
            let ram = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|_| NesError::SaveStateCorrupt)?;
            if ram.len() != self.chr.len() - self.chr_rom_len {
                return Err(NesError::SaveStateCorrupt);
            }
            self.chr[self.chr_rom_len..].copy_from_slice(&ram);
        }
        self.prg_ram = state.prg_ram;
        self.mapper = state.mapper;
        self.mirroring = state.mirroring;
        self.irq_latch = state.irq_latch;
        Ok(())
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::new()
    }
}
