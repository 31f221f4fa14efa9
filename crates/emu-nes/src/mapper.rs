//! Cartridge mappers: bank switching, mirroring control, IRQ generation.
//!
//! Each board is a plain struct with the same small set of operations;
//! [`Mapper`] is the tagged sum over all of them. The variant is fixed at
//! load time, so a `match` at the call site dispatches directly — no
//! vtable.
//!
//! Address translation returns byte offsets into PRG ROM / CHR data; the
//! cartridge masks them against the actual image size. Write-side calls
//! may return a [`WriteEffect`] carrying a mirroring change or an IRQ
//! pulse; counter-driven IRQs (MMC3, VRC4, Bandai) latch internally and
//! drain through `take_irq`.

#![allow(clippy::cast_possible_truncation, clippy::match_same_arms)]

use serde::{Deserialize, Serialize};

use crate::cartridge::Mirroring;

/// Side effects of a mapper register write.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteEffect {
    /// New nametable mirroring, when the write retargets it.
    pub mirroring: Option<Mirroring>,
    /// Immediate IRQ pulse (rare; most boards latch internally).
    pub irq: bool,
}

impl WriteEffect {
    fn mirror(mode: Mirroring) -> Option<Self> {
        Some(Self {
            mirroring: Some(mode),
            irq: false,
        })
    }
}

/// VRC-style two-bit mirroring select, shared by the Konami and Bandai
/// boards.
fn vrc_mirroring(data: u8) -> Mirroring {
    match data & 0x03 {
        0 => Mirroring::Vertical,
        1 => Mirroring::Horizontal,
        2 => Mirroring::SingleScreenLow,
        _ => Mirroring::SingleScreenHigh,
    }
}

/// Uniform board interface. Statically dispatched through the enum.
trait Board {
    /// CPU read: offset into PRG ROM, or `None` when unmapped.
    fn cpu_map_read(&self, addr: u16) -> Option<usize>;

    /// CPU write: register decode; may change mirroring or pulse an IRQ.
    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect>;

    /// PPU read: offset into CHR data.
    fn ppu_map_read(&self, addr: u16) -> Option<usize>;

    /// PPU write: offset into writable CHR, or `None` when the target is
    /// ROM.
    fn ppu_map_write(&self, addr: u16) -> Option<usize>;

    /// Return to power-on register state.
    fn reset(&mut self) {}

    /// A12 rising-edge notification (scanline-counting IRQs).
    fn scanline_tick(&mut self) {}

    /// One CPU cycle elapsed (cycle-counting IRQs).
    fn cpu_tick(&mut self) {}

    /// Level view of the IRQ line. Never clears anything — the machine
    /// polls this every CPU cycle.
    fn irq_pending(&self) -> bool {
        false
    }

    /// Acknowledge and clear the pending IRQ.
    fn take_irq(&mut self) -> bool {
        false
    }
}

// ===========================================================================
// Mapper 0 (NROM)
// ===========================================================================

/// No bank switching. 16 KB PRG mirrors $8000 across $C000.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nrom {
    prg_banks: u8,
    chr_banks: u8,
}

impl Nrom {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
        }
    }
}

impl Board for Nrom {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x8000 {
            let mask = if self.prg_banks > 1 { 0x7FFF } else { 0x3FFF };
            Some(usize::from(addr & mask))
        } else {
            None
        }
    }

    fn cpu_map_write(&mut self, _addr: u16, _data: u8) -> Option<WriteEffect> {
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000 && self.chr_banks == 0).then(|| usize::from(addr))
    }
}

// ===========================================================================
// Mapper 1 (MMC1)
// ===========================================================================

/// Serial five-write shift register drives PRG mode (4 layouts), CHR mode
/// (8 KB / 2×4 KB) and mirroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mmc1 {
    prg_banks: u8,
    chr_banks: u8,
    shift_register: u8,
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

impl Mmc1 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            shift_register: 0x10,
            control: 0x0C,
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }
}

impl Board for Mmc1 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let prg_mode = (self.control >> 2) & 0x03;
        let offset = if prg_mode <= 1 {
            // 32 KB mode: lowest bank bit ignored.
            usize::from(self.prg_bank & 0x0E) * 16 * 1024 + usize::from(addr & 0x7FFF)
        } else if prg_mode == 2 {
            // First bank fixed at $8000, $C000 switches.
            if addr < 0xC000 {
                usize::from(addr & 0x3FFF)
            } else {
                usize::from(self.prg_bank) * 16 * 1024 + usize::from(addr & 0x3FFF)
            }
        } else {
            // $8000 switches, last bank fixed at $C000.
            if addr < 0xC000 {
                usize::from(self.prg_bank) * 16 * 1024 + usize::from(addr & 0x3FFF)
            } else {
                (usize::from(self.prg_banks).max(1) - 1) * 16 * 1024 + usize::from(addr & 0x3FFF)
            }
        };
        Some(offset)
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        // Bit 7 resets the shift register and re-fixes the PRG layout.
        if data & 0x80 != 0 {
            self.shift_register = 0x10;
            self.control |= 0x0C;
            return None;
        }

        let complete = self.shift_register & 0x01 != 0;
        self.shift_register = (self.shift_register >> 1) | ((data & 0x01) << 4);

        if !complete {
            return None;
        }

        let value = self.shift_register;
        self.shift_register = 0x10;
        match (addr >> 13) & 0x03 {
            0 => self.control = value,
            1 => self.chr_bank0 = value,
            2 => self.chr_bank1 = value,
            _ => self.prg_bank = value & 0x0F,
        }

        let mirror = match self.control & 0x03 {
            0 => Mirroring::SingleScreenLow,
            1 => Mirroring::SingleScreenHigh,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        };
        WriteEffect::mirror(mirror)
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        let total = (usize::from(self.chr_banks) * 2).max(1);
        let offset = if (self.control >> 4) & 0x01 == 0 {
            // 8 KB mode.
            let bank = usize::from(self.chr_bank0 & 0x1E) % total;
            bank * 4096 + usize::from(addr)
        } else if addr < 0x1000 {
            let bank = usize::from(self.chr_bank0) % total;
            bank * 4096 + usize::from(addr)
        } else {
            let bank = usize::from(self.chr_bank1) % total;
            bank * 4096 + usize::from(addr & 0x0FFF)
        };
        Some(offset)
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000 && self.chr_banks == 0).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.shift_register = 0x10;
        self.control = 0x0C;
        self.chr_bank0 = 0;
        self.chr_bank1 = 0;
        self.prg_bank = 0;
    }
}

// ===========================================================================
// Mapper 2 (UxROM)
// ===========================================================================

/// 4-bit PRG select at $8000-$BFFF; last bank fixed at $C000.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UxRom {
    prg_banks: u8,
    selected_bank: u8,
}

impl UxRom {
    #[must_use]
    pub fn new(prg_banks: u8, _chr_banks: u8) -> Self {
        Self {
            prg_banks,
            selected_bank: 0,
        }
    }
}

impl Board for UxRom {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        match addr {
            0x8000..=0xBFFF => {
                Some(usize::from(self.selected_bank) * 16 * 1024 + usize::from(addr & 0x3FFF))
            }
            0xC000..=0xFFFF => Some(
                (usize::from(self.prg_banks).max(1) - 1) * 16 * 1024 + usize::from(addr & 0x3FFF),
            ),
            _ => None,
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr >= 0x8000 {
            self.selected_bank = data & 0x0F;
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        // UxROM boards carry CHR RAM.
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.selected_bank = 0;
    }
}

// ===========================================================================
// Mapper 3 (CNROM)
// ===========================================================================

/// Fixed PRG, 8 KB CHR select at $8000+.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnRom {
    prg_banks: u8,
    chr_bank: u8,
}

impl CnRom {
    #[must_use]
    pub fn new(prg_banks: u8, _chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_bank: 0,
        }
    }
}

impl Board for CnRom {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x8000 {
            let mask = if self.prg_banks > 1 { 0x7FFF } else { 0x3FFF };
            Some(usize::from(addr & mask))
        } else {
            None
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr >= 0x8000 {
            self.chr_bank = data & 0x03;
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(self.chr_bank) * 8192 + usize::from(addr))
    }

    fn ppu_map_write(&self, _addr: u16) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        self.chr_bank = 0;
    }
}

// ===========================================================================
// Mapper 4 (MMC3)
// ===========================================================================

/// Eight bank registers plus mode bits; scanline IRQ counter clocked on
/// the PPU's A12 rising edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mmc3 {
    prg_banks: u8,
    chr_banks: u8,
    registers: [u8; 8],
    bank_select: u8,
    prg_rom_bank_mode: bool,
    chr_a12_inversion: bool,
    irq_counter: u8,
    irq_latch: u8,
    irq_enabled: bool,
    irq_reload: bool,
    irq_pending: bool,
}

impl Mmc3 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            registers: [0; 8],
            bank_select: 0,
            prg_rom_bank_mode: false,
            chr_a12_inversion: false,
            irq_counter: 0,
            irq_latch: 0,
            irq_enabled: false,
            irq_reload: false,
            irq_pending: false,
        }
    }

    /// PRG bank number for `addr`, in 8 KB units.
    fn prg_bank(&self, addr: u16) -> usize {
        let count = usize::from(self.prg_banks).max(1) * 2;
        let last = count - 1;
        let second_last = count - 2;
        match addr {
            0x8000..=0x9FFF => {
                if self.prg_rom_bank_mode {
                    second_last
                } else {
                    usize::from(self.registers[6] & 0x3F)
                }
            }
            0xA000..=0xBFFF => usize::from(self.registers[7] & 0x3F),
            0xC000..=0xDFFF => {
                if self.prg_rom_bank_mode {
                    usize::from(self.registers[6] & 0x3F)
                } else {
                    second_last
                }
            }
            _ => last,
        }
    }

    /// CHR bank number for `addr`, in 1 KB units.
    fn chr_bank(&self, addr: u16) -> usize {
        let region = usize::from(addr >> 10);
        let r = &self.registers;
        let bank = if self.chr_a12_inversion {
            // R2-R5 low half, R0-R1 (2 KB pairs) high half.
            match region {
                0 => usize::from(r[2]),
                1 => usize::from(r[3]),
                2 => usize::from(r[4]),
                3 => usize::from(r[5]),
                4 => usize::from(r[0] & 0xFE),
                5 => usize::from(r[0] & 0xFE) | 1,
                6 => usize::from(r[1] & 0xFE),
                _ => usize::from(r[1] & 0xFE) | 1,
            }
        } else {
            match region {
                0 => usize::from(r[0] & 0xFE),
                1 => usize::from(r[0] & 0xFE) | 1,
                2 => usize::from(r[1] & 0xFE),
                3 => usize::from(r[1] & 0xFE) | 1,
                4 => usize::from(r[2]),
                5 => usize::from(r[3]),
                6 => usize::from(r[4]),
                _ => usize::from(r[5]),
            }
        };
        bank
    }
}

impl Board for Mmc3 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        (addr >= 0x8000).then(|| self.prg_bank(addr) * 8192 + usize::from(addr & 0x1FFF))
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        let even = addr & 1 == 0;
        match (addr >> 13) & 0x03 {
            0 => {
                if even {
                    self.bank_select = data & 0x07;
                    self.prg_rom_bank_mode = data & 0x40 != 0;
                    self.chr_a12_inversion = data & 0x80 != 0;
                } else {
                    self.registers[usize::from(self.bank_select)] = data;
                }
            }
            1 => {
                if even {
                    let mode = if data & 1 != 0 {
                        Mirroring::Horizontal
                    } else {
                        Mirroring::Vertical
                    };
                    return WriteEffect::mirror(mode);
                }
                // Odd: PRG RAM protect, not emulated.
            }
            2 => {
                if even {
                    self.irq_latch = data;
                } else {
                    self.irq_reload = true;
                }
            }
            _ => {
                if even {
                    self.irq_enabled = false;
                    self.irq_pending = false;
                } else {
                    self.irq_enabled = true;
                }
            }
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| self.chr_bank(addr) * 1024 + usize::from(addr & 0x03FF))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000 && self.chr_banks == 0).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        *self = Self::new(self.prg_banks, self.chr_banks);
    }

    fn scanline_tick(&mut self) {
        // Reload when the counter hit zero last time or a reload was
        // requested; otherwise count down. Hitting zero while enabled
        // pends the IRQ.
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn take_irq(&mut self) -> bool {
        let pending = self.irq_pending;
        self.irq_pending = false;
        pending
    }
}

// ===========================================================================
// Mapper 7 (AxROM)
// ===========================================================================

/// 32 KB PRG select plus a single-screen mirror bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxRom {
    selected_bank: u8,
}

impl AxRom {
    #[must_use]
    pub fn new(_prg_banks: u8, _chr_banks: u8) -> Self {
        Self { selected_bank: 0 }
    }
}

impl Board for AxRom {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        (addr >= 0x8000)
            .then(|| usize::from(self.selected_bank) * 32 * 1024 + usize::from(addr & 0x7FFF))
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        self.selected_bank = data & 0x07;
        let mode = if data & 0x10 != 0 {
            Mirroring::SingleScreenHigh
        } else {
            Mirroring::SingleScreenLow
        };
        WriteEffect::mirror(mode)
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.selected_bank = 0;
    }
}

// ===========================================================================
// Mapper 11 (Color Dreams)
// ===========================================================================

/// Low nibble PRG bank, high nibble CHR bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorDreams {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank: u8,
    chr_bank: u8,
}

impl ColorDreams {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank: 0,
            chr_bank: 0,
        }
    }
}

impl Board for ColorDreams {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let bank = usize::from(self.prg_bank) % usize::from(self.prg_banks.max(1));
        Some(bank * 32 * 1024 + usize::from(addr & 0x7FFF))
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr >= 0x8000 {
            self.prg_bank = data & 0x03;
            self.chr_bank = (data >> 4) & 0x0F;
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        let bank = usize::from(self.chr_bank) % usize::from(self.chr_banks.max(1));
        Some(bank * 8192 + usize::from(addr))
    }

    fn ppu_map_write(&self, _addr: u16) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.chr_bank = 0;
    }
}

// ===========================================================================
// Mapper 15 (100-in-1 Contra Function 16)
// ===========================================================================

/// Multicart: PRG layout chosen by address bits, bank by data bits,
/// mirroring by data bit 6. CHR is RAM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bmc100In1 {
    prg_banks: u8,
    latch_addr: u16,
    latch_data: u8,
}

impl Bmc100In1 {
    #[must_use]
    pub fn new(prg_banks: u8, _chr_banks: u8) -> Self {
        Self {
            prg_banks,
            latch_addr: 0,
            latch_data: 0,
        }
    }
}

impl Board for Bmc100In1 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let total_8k = usize::from(self.prg_banks).max(1) * 2;
        let data6 = usize::from(self.latch_data & 0x3F);
        let p_bit = usize::from(self.latch_data >> 7);
        let mode = self.latch_addr & 0x03;
        // Window index: 0=$8000, 1=$A000, 2=$C000, 3=$E000.
        let i = usize::from((addr >> 13) & 3);

        let bank_8k = match mode {
            // NROM-256: four consecutive 8 KB banks.
            0 => (data6 << 1) + i,
            // NROM-64: every window the same 8 KB bank.
            2 => (data6 << 1) + p_bit,
            // UNROM (1) and NROM-128 (3): switchable low half; mode 1
            // pins the upper windows to the last 16 KB of the 128 KB
            // block.
            _ => {
                let mut b = data6;
                if i >= 2 && mode == 1 {
                    b |= 0x07;
                }
                (i & 1) + (b << 1)
            }
        };

        Some((bank_8k % total_8k) * 8192 + usize::from(addr & 0x1FFF))
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        self.latch_addr = addr;
        self.latch_data = data;
        let mode = if data & 0x40 != 0 {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        };
        WriteEffect::mirror(mode)
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.latch_addr = 0;
        self.latch_data = 0;
    }
}

// ===========================================================================
// Mapper 16 (Bandai FCG)
// ===========================================================================

/// Per-1 KB CHR banks and a CPU-cycle-counted IRQ. The counter is signed
/// and pends the IRQ when it drops below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandaiFcg {
    prg_banks: u8,
    chr_banks: u8,
    chr_bank_regs: [u8; 8],
    prg_bank: u8,
    irq_counter: i32,
    irq_latch: u16,
    irq_enabled: bool,
    irq_pending: bool,
}

impl BandaiFcg {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            chr_bank_regs: [0; 8],
            prg_bank: 0,
            irq_counter: 0,
            irq_latch: 0,
            irq_enabled: false,
            irq_pending: false,
        }
    }
}

impl Board for BandaiFcg {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        match addr {
            0x8000..=0xBFFF => {
                let bank = usize::from(self.prg_bank) % usize::from(self.prg_banks.max(1));
                Some(bank * 16 * 1024 + usize::from(addr & 0x3FFF))
            }
            0xC000..=0xFFFF => {
                let bank = usize::from(self.prg_banks).saturating_sub(1);
                Some(bank * 16 * 1024 + usize::from(addr & 0x3FFF))
            }
            _ => None,
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        // FCG-1/2 decode $6000-$7FFF, LZ93D50 decodes $8000+; both fold
        // onto the same 16-register window.
        if addr < 0x6000 {
            return None;
        }
        let reg = addr & 0x000F;
        match reg {
            0..=7 => self.chr_bank_regs[usize::from(reg)] = data,
            8 => self.prg_bank = data & 0x0F,
            9 => return WriteEffect::mirror(vrc_mirroring(data)),
            0x0A => {
                self.irq_enabled = data & 0x01 != 0;
                self.irq_counter = i32::from(self.irq_latch);
                self.irq_pending = false;
            }
            0x0B => self.irq_latch = (self.irq_latch & 0xFF00) | u16::from(data),
            0x0C => self.irq_latch = (self.irq_latch & 0x00FF) | (u16::from(data) << 8),
            _ => {}
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        let total = (usize::from(self.chr_banks) * 8).max(1);
        let bank = usize::from(self.chr_bank_regs[usize::from(addr >> 10)]) % total;
        Some(bank * 1024 + usize::from(addr & 0x03FF))
    }

    fn ppu_map_write(&self, _addr: u16) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        *self = Self::new(self.prg_banks, self.chr_banks);
    }

    fn cpu_tick(&mut self) {
        if self.irq_enabled {
            self.irq_counter -= 1;
            if self.irq_counter < 0 {
                self.irq_pending = true;
            }
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn take_irq(&mut self) -> bool {
        let pending = self.irq_pending;
        self.irq_pending = false;
        pending
    }
}

// ===========================================================================
// Mapper 23 (VRC2b / VRC4)
// ===========================================================================

/// Konami VRC: 8 KB PRG windows with a swap mode, nibble-written 1 KB CHR
/// banks, and a scanline-approximated IRQ (341-dot prescaler counted in
/// CPU cycles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vrc4 {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank0: u8,
    prg_bank1: u8,
    chr_bank_regs: [u8; 8],
    prg_swap_mode: u8,
    irq_latch: u8,
    irq_control: u8,
    irq_counter: u8,
    irq_prescaler: i16,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Vrc4 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank0: 0,
            prg_bank1: 0,
            chr_bank_regs: [0; 8],
            prg_swap_mode: 0,
            irq_latch: 0,
            irq_control: 0,
            irq_counter: 0,
            irq_prescaler: 0,
            irq_enabled: false,
            irq_pending: false,
        }
    }

    /// Write the low or high nibble of a CHR bank register.
    fn write_chr_nibble(&mut self, reg: usize, data: u8, high: bool) {
        let r = &mut self.chr_bank_regs[reg];
        if high {
            *r = (*r & 0x0F) | ((data & 0x0F) << 4);
        } else {
            *r = (*r & 0xF0) | (data & 0x0F);
        }
    }

    /// VRC4 IRQ clock shared with the Waixing variant: the 8-bit counter
    /// counts scanlines (341 PPU dots ≈ 113.67 CPU cycles) and pends when
    /// it wraps past $FF.
    fn clock_irq(&mut self) {
        if !self.irq_enabled {
            return;
        }
        self.irq_prescaler -= 3;
        if self.irq_prescaler <= 0 {
            self.irq_prescaler += 341;
            if self.irq_counter == 0xFF {
                self.irq_counter = self.irq_latch;
                self.irq_pending = true;
            } else {
                self.irq_counter += 1;
            }
        }
    }
}

impl Board for Vrc4 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        let total = usize::from(self.prg_banks).max(1) * 2;
        let offset = usize::from(addr & 0x1FFF);
        match addr {
            0x8000..=0x9FFF => {
                let bank = if self.prg_swap_mode != 0 {
                    total - 2
                } else {
                    usize::from(self.prg_bank0)
                };
                Some((bank % total) * 8192 + offset)
            }
            0xA000..=0xBFFF => Some((usize::from(self.prg_bank1) % total) * 8192 + offset),
            0xC000..=0xDFFF => {
                let bank = if self.prg_swap_mode != 0 {
                    usize::from(self.prg_bank0)
                } else {
                    total - 2
                };
                Some((bank % total) * 8192 + offset)
            }
            0xE000..=0xFFFF => Some((total - 1) * 8192 + offset),
            _ => None,
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        // VRC2b wiring: A0 and A1 select the sub-register.
        let a0 = addr & 0x0001;
        let a1 = (addr & 0x0002) >> 1;
        let reg = (addr & 0xF000) | (a1 << 1) | a0;

        match reg {
            0x8000..=0x8003 => self.prg_bank0 = data & 0x1F,
            0x9000 | 0x9001 => return WriteEffect::mirror(vrc_mirroring(data)),
            0x9002 | 0x9003 => self.prg_swap_mode = (data >> 1) & 0x01,
            0xA000..=0xA003 => self.prg_bank1 = data & 0x1F,
            0xB000..=0xE003 => {
                // Two sub-registers per 1 KB bank, low nibble then high.
                let base = usize::from((reg >> 12) - 0xB) * 2;
                let reg_index = base + usize::from(reg & 0x02) / 2;
                let high = reg & 0x01 != 0;
                self.write_chr_nibble(reg_index, data, high);
            }
            0xF000 => self.irq_latch = (self.irq_latch & 0xF0) | (data & 0x0F),
            0xF001 => self.irq_latch = (self.irq_latch & 0x0F) | ((data & 0x0F) << 4),
            0xF002 => {
                self.irq_control = data;
                self.irq_enabled = data & 0x02 != 0;
                if data & 0x02 != 0 {
                    self.irq_counter = self.irq_latch;
                    self.irq_prescaler = 341;
                }
                self.irq_pending = false;
            }
            0xF003 => {
                self.irq_enabled = self.irq_control & 0x01 != 0;
                self.irq_pending = false;
            }
            _ => {}
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        let total = (usize::from(self.chr_banks) * 8).max(1);
        let bank = usize::from(self.chr_bank_regs[usize::from(addr >> 10)]) % total;
        Some(bank * 1024 + usize::from(addr & 0x03FF))
    }

    fn ppu_map_write(&self, _addr: u16) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        *self = Self::new(self.prg_banks, self.chr_banks);
    }

    fn cpu_tick(&mut self) {
        self.clock_irq();
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn take_irq(&mut self) -> bool {
        let pending = self.irq_pending;
        self.irq_pending = false;
        pending
    }
}

// ===========================================================================
// Mapper 66 (GxROM)
// ===========================================================================

/// CHR bank in the low bits, 32 KB PRG bank in the high bits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GxRom {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank: u8,
    chr_bank: u8,
}

impl GxRom {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank: 0,
            chr_bank: 0,
        }
    }
}

impl Board for GxRom {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let bank = usize::from(self.prg_bank) % usize::from(self.prg_banks.max(1));
        Some(bank * 32 * 1024 + usize::from(addr & 0x7FFF))
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if addr >= 0x8000 {
            self.chr_bank = data & 0x03;
            self.prg_bank = (data >> 4) & 0x03;
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        let bank = usize::from(self.chr_bank) % usize::from(self.chr_banks.max(1));
        Some(bank * 8192 + usize::from(addr))
    }

    fn ppu_map_write(&self, _addr: u16) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.chr_bank = 0;
    }
}

// ===========================================================================
// Mapper 71 (Camerica / Codemasters)
// ===========================================================================

/// UxROM-like PRG switching; single-screen mirroring via $9000-$9FFF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camerica {
    prg_banks: u8,
    selected_bank: u8,
}

impl Camerica {
    #[must_use]
    pub fn new(prg_banks: u8, _chr_banks: u8) -> Self {
        Self {
            prg_banks,
            selected_bank: 0,
        }
    }
}

impl Board for Camerica {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        match addr {
            0x8000..=0xBFFF => {
                Some(usize::from(self.selected_bank) * 16 * 1024 + usize::from(addr & 0x3FFF))
            }
            0xC000..=0xFFFF => Some(
                (usize::from(self.prg_banks).max(1) - 1) * 16 * 1024 + usize::from(addr & 0x3FFF),
            ),
            _ => None,
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if (0x9000..0xA000).contains(&addr) {
            let mode = if data & 0x10 != 0 {
                Mirroring::SingleScreenHigh
            } else {
                Mirroring::SingleScreenLow
            };
            return WriteEffect::mirror(mode);
        }
        if addr >= 0xC000 {
            self.selected_bank = data & 0x0F;
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.selected_bank = 0;
    }
}

// ===========================================================================
// Mapper 113 (NINA-03/06)
// ===========================================================================

/// Combined PRG and CHR select through a single register in the
/// $4100-$5FFF expansion range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nina03 {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank: u8,
    chr_bank: u8,
}

impl Nina03 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank: 0,
            chr_bank: 0,
        }
    }
}

impl Board for Nina03 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let bank = usize::from(self.prg_bank) % usize::from(self.prg_banks.max(1));
        Some(bank * 32 * 1024 + usize::from(addr & 0x7FFF))
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        if (0x4100..0x6000).contains(&addr) {
            self.prg_bank = (data >> 3) & 0x07;
            self.chr_bank = (data & 0x07) | ((data >> 3) & 0x08);
            let mode = if data & 0x80 != 0 {
                Mirroring::Vertical
            } else {
                Mirroring::Horizontal
            };
            return WriteEffect::mirror(mode);
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        let bank = usize::from(self.chr_bank) % usize::from(self.chr_banks.max(1));
        Some(bank * 8192 + usize::from(addr))
    }

    fn ppu_map_write(&self, _addr: u16) -> Option<usize> {
        None
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.chr_bank = 0;
    }
}

// ===========================================================================
// Mapper 202 (150-in-1)
// ===========================================================================

/// Multicart with the bank and PRG mode taken from the written address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bmc150In1 {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank: u8,
    chr_bank: u8,
    prg_mode: u8,
}

impl Bmc150In1 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank: 0,
            chr_bank: 0,
            prg_mode: 0,
        }
    }
}

impl Board for Bmc150In1 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let total_prg = usize::from(self.prg_banks) * 16 * 1024;
        if total_prg == 0 {
            return Some(0);
        }
        if self.prg_mode == 0 {
            // 16 KB bank mirrored at both halves.
            let offset = usize::from(addr & 0x3FFF);
            Some((usize::from(self.prg_bank) * 16 * 1024 + offset) % total_prg)
        } else {
            let bank_32k = usize::from(self.prg_bank) >> 1;
            let offset = usize::from(addr & 0x7FFF);
            Some((bank_32k * 32 * 1024 + offset) % total_prg)
        }
    }

    fn cpu_map_write(&mut self, addr: u16, _data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        let bank = ((addr >> 1) & 0x07) as u8;
        self.prg_bank = bank;
        self.chr_bank = bank;
        self.prg_mode = ((addr & 0x01) ^ ((addr >> 3) & 0x01)) as u8;
        let mode = if addr & 0x01 != 0 {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        };
        WriteEffect::mirror(mode)
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        if self.chr_banks == 0 {
            return Some(usize::from(addr));
        }
        let total = usize::from(self.chr_banks) * 8192;
        Some((usize::from(self.chr_bank) * 8192 + usize::from(addr & 0x1FFF)) % total.max(1))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000 && self.chr_banks == 0).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.chr_bank = 0;
        self.prg_mode = 0;
    }
}

// ===========================================================================
// Mapper 225 (52-in-1)
// ===========================================================================

/// Large multicart (up to 2 MB PRG). The whole configuration rides on the
/// written address: `A~[.HMO PPPP PPCC CCCC]`. Mirroring is Vertical when
/// bit 13 is set, Horizontal when clear — the reverse of the naive
/// reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bmc52In1 {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank: u16,
    chr_bank: u16,
    prg_mode: u8,
}

impl Bmc52In1 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank: 0,
            chr_bank: 0,
            prg_mode: 0,
        }
    }
}

impl Board for Bmc52In1 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let total_prg = usize::from(self.prg_banks) * 16 * 1024;
        if total_prg == 0 {
            return Some(0);
        }
        if self.prg_mode == 0 {
            // 32 KB mode: bank select ignores the lowest bit.
            let bank_32k = (usize::from(self.prg_bank) >> 1) & 0x3F;
            let offset = usize::from(addr & 0x7FFF);
            Some((bank_32k * 32 * 1024 + offset) % total_prg)
        } else {
            // 16 KB mode: both halves map the same bank.
            let offset = usize::from(addr & 0x3FFF);
            Some((usize::from(self.prg_bank) * 16 * 1024 + offset) % total_prg)
        }
    }

    fn cpu_map_write(&mut self, addr: u16, _data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        let hi_bit = (addr >> 14) & 1;
        self.chr_bank = (addr & 0x3F) | (hi_bit << 6);
        self.prg_bank = ((addr >> 6) & 0x3F) | (hi_bit << 6);
        self.prg_mode = ((addr >> 12) & 1) as u8;
        let mode = if (addr >> 13) & 1 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };
        WriteEffect::mirror(mode)
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        if self.chr_banks == 0 {
            return Some(usize::from(addr));
        }
        let total = usize::from(self.chr_banks) * 8192;
        Some((usize::from(self.chr_bank) * 8192 + usize::from(addr & 0x1FFF)) % total.max(1))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000 && self.chr_banks == 0).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        self.prg_bank = 0;
        self.chr_bank = 0;
        self.prg_mode = 0;
    }
}

// ===========================================================================
// Mapper 227 (1200-in-1)
// ===========================================================================

/// Multicart with a composite address latch:
/// bit 0 S = 16/32 KB mode, bit 1 M = mirroring, bit 2 p + bits 3-4 PP =
/// inner bank, bits 5-6 QQ + bit 8 Q = outer bank, bit 7 O = $C000
/// behavior, bit 9 L = fixed-bank select. Power-on is all-clear:
/// UNROM-like with bank 0 everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bmc1200In1 {
    prg_banks: u8,
    s_bit: bool,
    o_bit: bool,
    l_bit: bool,
    inner_bank: u8,
    outer_bank: u8,
}

impl Bmc1200In1 {
    #[must_use]
    pub fn new(prg_banks: u8, _chr_banks: u8) -> Self {
        Self {
            prg_banks,
            s_bit: false,
            o_bit: false,
            l_bit: false,
            inner_bank: 0,
            outer_bank: 0,
        }
    }
}

impl Board for Bmc1200In1 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        if addr < 0x8000 {
            return None;
        }
        let total_prg = usize::from(self.prg_banks) * 16 * 1024;
        if total_prg == 0 {
            return Some(0);
        }
        let outer = usize::from(self.outer_bank);
        let inner = usize::from(self.inner_bank);

        let offset = if self.o_bit {
            if self.s_bit {
                // NROM-256: PP selects a 32 KB block.
                let bank_32k = outer * 4 + (inner >> 1);
                bank_32k * 32 * 1024 + usize::from(addr & 0x7FFF)
            } else {
                // NROM-128: one 16 KB bank mirrored.
                let bank_16k = outer * 8 + inner;
                bank_16k * 16 * 1024 + usize::from(addr & 0x3FFF)
            }
        } else if self.s_bit {
            // Same 32 KB decode with the inner low bit dropped.
            let bank_32k = outer * 4 + (inner >> 1);
            bank_32k * 32 * 1024 + usize::from(addr & 0x7FFF)
        } else if addr < 0xC000 {
            // UNROM-like: switchable low half...
            let bank_16k = outer * 8 + inner;
            bank_16k * 16 * 1024 + usize::from(addr & 0x3FFF)
        } else {
            // ...fixed high half, L picking bank 0 or 7 of the block.
            let fixed = if self.l_bit { 7 } else { 0 };
            let bank_16k = outer * 8 + fixed;
            bank_16k * 16 * 1024 + usize::from(addr & 0x3FFF)
        };

        Some(offset % total_prg)
    }

    fn cpu_map_write(&mut self, addr: u16, _data: u8) -> Option<WriteEffect> {
        if addr < 0x8000 {
            return None;
        }
        self.s_bit = addr & 0x0001 != 0;
        let p = ((addr >> 2) & 0x01) as u8;
        let pp = ((addr >> 3) & 0x03) as u8;
        self.inner_bank = (pp << 1) | p;
        self.outer_bank = (((addr >> 5) & 0x03) | ((addr >> 8) & 0x01) << 2) as u8;
        self.o_bit = addr & 0x0080 != 0;
        self.l_bit = addr & 0x0200 != 0;
        let mode = if addr & 0x0002 != 0 {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        };
        WriteEffect::mirror(mode)
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        *self = Self::new(self.prg_banks, 0);
    }
}

// ===========================================================================
// Mapper 245 (Waixing MMC3 variant)
// ===========================================================================

/// MMC3-style bank layout with an extra PRG high bit smuggled through CHR
/// register 0, and a CHR RAM pattern path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaixingMmc3 {
    prg_banks: u8,
    bank_regs: [u8; 8],
    bank_select: u8,
    irq_counter: u8,
    irq_latch: u8,
    irq_enabled: bool,
    irq_reload: bool,
    irq_pending: bool,
    prg_high_bit: u8,
}

impl WaixingMmc3 {
    #[must_use]
    pub fn new(prg_banks: u8, _chr_banks: u8) -> Self {
        Self {
            prg_banks,
            bank_regs: [0; 8],
            bank_select: 0,
            irq_counter: 0,
            irq_latch: 0,
            irq_enabled: false,
            irq_reload: false,
            irq_pending: false,
            prg_high_bit: 0,
        }
    }
}

impl Board for WaixingMmc3 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        let count = usize::from(self.prg_banks).max(1) * 2;
        let offset = usize::from(addr & 0x1FFF);
        let high = usize::from(self.prg_high_bit);
        match addr {
            0x8000..=0x9FFF => {
                let bank = if self.bank_select & 0x40 != 0 {
                    count - 2
                } else {
                    (usize::from(self.bank_regs[6]) | high) % count
                };
                Some(bank * 8192 + offset)
            }
            0xA000..=0xBFFF => {
                Some(((usize::from(self.bank_regs[7]) | high) % count) * 8192 + offset)
            }
            0xC000..=0xDFFF => {
                let bank = if self.bank_select & 0x40 != 0 {
                    (usize::from(self.bank_regs[6]) | high) % count
                } else {
                    count - 2
                };
                Some(bank * 8192 + offset)
            }
            0xE000..=0xFFFF => Some((count - 1) * 8192 + offset),
            _ => None,
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        match addr {
            0x8000..=0x9FFF => {
                if addr & 1 != 0 {
                    let reg = usize::from(self.bank_select & 0x07);
                    self.bank_regs[reg] = data;
                    if reg == 0 {
                        self.prg_high_bit = if data & 0x02 != 0 { 0x40 } else { 0 };
                    }
                } else {
                    self.bank_select = data;
                }
            }
            0xA000..=0xBFFF => {
                if addr & 1 == 0 {
                    let mode = if data & 0x01 != 0 {
                        Mirroring::Horizontal
                    } else {
                        Mirroring::Vertical
                    };
                    return WriteEffect::mirror(mode);
                }
            }
            0xC000..=0xDFFF => {
                if addr & 1 != 0 {
                    self.irq_reload = true;
                } else {
                    self.irq_latch = data;
                }
            }
            0xE000..=0xFFFF => {
                if addr & 1 != 0 {
                    self.irq_enabled = true;
                } else {
                    self.irq_enabled = false;
                    self.irq_pending = false;
                }
            }
            _ => {}
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        // Pattern data lives in CHR RAM on these boards.
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then(|| usize::from(addr))
    }

    fn reset(&mut self) {
        *self = Self::new(self.prg_banks, 0);
    }

    fn scanline_tick(&mut self) {
        if self.irq_reload || self.irq_counter == 0 {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn take_irq(&mut self) -> bool {
        let pending = self.irq_pending;
        self.irq_pending = false;
        pending
    }
}

// ===========================================================================
// Mapper 253 (Waixing VRC4 variant)
// ===========================================================================

/// VRC4-style board with per-bank CHR ROM / CHR RAM selection. When a
/// region's low CHR register holds 4 or 5 and the `vlock` latch is open,
/// that region addresses the 8 KB CHR RAM appended after the ROM image.
/// Writing $C8 to register 0 opens the latch; $88 closes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaixingVrc4 {
    prg_banks: u8,
    chr_banks: u8,
    prg_bank0: u8,
    prg_bank1: u8,
    chr_lo: [u8; 8],
    chr_hi: [u8; 8],
    vlock: bool,
    chr_rom_size: usize,
    irq_latch: u8,
    irq_control: u8,
    irq_counter: u8,
    irq_prescaler: i16,
    irq_enabled: bool,
    irq_pending: bool,
}

impl WaixingVrc4 {
    #[must_use]
    pub fn new(prg_banks: u8, chr_banks: u8) -> Self {
        Self {
            prg_banks,
            chr_banks,
            prg_bank0: 0,
            prg_bank1: 0,
            chr_lo: [0; 8],
            chr_hi: [0; 8],
            vlock: false,
            chr_rom_size: usize::from(chr_banks) * 8192,
            irq_latch: 0,
            irq_control: 0,
            irq_counter: 0,
            irq_prescaler: 0,
            irq_enabled: false,
            irq_pending: false,
        }
    }

    /// Byte offset of a 1 KB region's bank base, and whether it resolves
    /// into the appended CHR RAM.
    fn chr_offset(&self, region: usize) -> (usize, bool) {
        let chr = usize::from(self.chr_lo[region]) | (usize::from(self.chr_hi[region]) << 8);
        let is_ram = (self.chr_lo[region] == 4 || self.chr_lo[region] == 5) && !self.vlock;

        if is_ram {
            // The low bank bit picks one of two 4 KB pages of CHR RAM.
            let ram_bank = chr & 1;
            (
                self.chr_rom_size + ram_bank * 4096 + (region & 3) * 1024,
                true,
            )
        } else {
            let total = (usize::from(self.chr_banks) * 8).max(1);
            ((chr % total) * 1024, false)
        }
    }
}

impl Board for WaixingVrc4 {
    fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        let count = usize::from(self.prg_banks).max(1) * 2;
        let offset = usize::from(addr & 0x1FFF);
        match addr {
            0x8000..=0x9FFF => Some((usize::from(self.prg_bank0) % count) * 8192 + offset),
            0xA000..=0xBFFF => Some((usize::from(self.prg_bank1) % count) * 8192 + offset),
            0xC000..=0xDFFF => Some((count - 2) * 8192 + offset),
            0xE000..=0xFFFF => Some((count - 1) * 8192 + offset),
            _ => None,
        }
    }

    fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        // Register index decode: ind = ((((A & 8) | (A >> 8)) >> 3) + 2) & 7.
        let ind = usize::from((((addr & 8) | (addr >> 8)) >> 3).wrapping_add(2) & 7);
        let high_nibble = addr & 4 != 0;

        match addr & 0xF000 {
            0x8000 => self.prg_bank0 = data,
            0xA000 => self.prg_bank1 = data,
            0x9000 => return WriteEffect::mirror(vrc_mirroring(data)),
            0xB000 | 0xC000 | 0xD000 | 0xE000 => {
                if high_nibble {
                    self.chr_lo[ind] = (self.chr_lo[ind] & 0x0F) | ((data & 0x0F) << 4);
                    self.chr_hi[ind] = data >> 4;
                } else {
                    self.chr_lo[ind] = (self.chr_lo[ind] & 0xF0) | (data & 0x0F);
                }
                // Register 0 doubles as the CHR RAM latch.
                if ind == 0 {
                    match self.chr_lo[0] {
                        0xC8 => self.vlock = false,
                        0x88 => self.vlock = true,
                        _ => {}
                    }
                }
            }
            0xF000 => match addr & 0xF00C {
                0xF000 => self.irq_latch = (self.irq_latch & 0xF0) | (data & 0x0F),
                0xF004 => self.irq_latch = (self.irq_latch & 0x0F) | ((data & 0x0F) << 4),
                0xF008 => {
                    self.irq_control = data;
                    self.irq_enabled = data & 0x02 != 0;
                    if data & 0x02 != 0 {
                        self.irq_counter = self.irq_latch;
                        self.irq_prescaler = 341;
                    }
                    self.irq_pending = false;
                }
                0xF00C => {
                    self.irq_enabled = self.irq_control & 0x01 != 0;
                    self.irq_pending = false;
                }
                _ => {}
            },
            _ => {}
        }
        None
    }

    fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        if self.chr_banks == 0 {
            return Some(usize::from(addr));
        }
        let (offset, _is_ram) = self.chr_offset(usize::from(addr >> 10));
        Some(offset + usize::from(addr & 0x03FF))
    }

    fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        if addr >= 0x2000 {
            return None;
        }
        if self.chr_banks == 0 {
            return Some(usize::from(addr));
        }
        let (offset, is_ram) = self.chr_offset(usize::from(addr >> 10));
        is_ram.then(|| offset + usize::from(addr & 0x03FF))
    }

    fn reset(&mut self) {
        *self = Self::new(self.prg_banks, self.chr_banks);
    }

    fn cpu_tick(&mut self) {
        if !self.irq_enabled {
            return;
        }
        self.irq_prescaler -= 3;
        if self.irq_prescaler <= 0 {
            self.irq_prescaler += 341;
            if self.irq_counter == 0xFF {
                self.irq_counter = self.irq_latch;
                self.irq_pending = true;
            } else {
                self.irq_counter += 1;
            }
        }
    }

    fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn take_irq(&mut self) -> bool {
        let pending = self.irq_pending;
        self.irq_pending = false;
        pending
    }
}

// ===========================================================================
// The tagged sum
// ===========================================================================

/// All supported boards. Selected at load time; fixed thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mapper {
    Nrom(Nrom),
    Mmc1(Mmc1),
    UxRom(UxRom),
    CnRom(CnRom),
    Mmc3(Mmc3),
    AxRom(AxRom),
    ColorDreams(ColorDreams),
    Bmc100In1(Bmc100In1),
    BandaiFcg(BandaiFcg),
    Vrc4(Vrc4),
    GxRom(GxRom),
    Camerica(Camerica),
    Nina03(Nina03),
    Bmc150In1(Bmc150In1),
    Bmc52In1(Bmc52In1),
    Bmc1200In1(Bmc1200In1),
    WaixingMmc3(WaixingMmc3),
    WaixingVrc4(WaixingVrc4),
}

macro_rules! dispatch {
    ($self:expr, $board:ident => $call:expr) => {
        match $self {
            Mapper::Nrom($board) => $call,
            Mapper::Mmc1($board) => $call,
            Mapper::UxRom($board) => $call,
            Mapper::CnRom($board) => $call,
            Mapper::Mmc3($board) => $call,
            Mapper::AxRom($board) => $call,
            Mapper::ColorDreams($board) => $call,
            Mapper::Bmc100In1($board) => $call,
            Mapper::BandaiFcg($board) => $call,
            Mapper::Vrc4($board) => $call,
            Mapper::GxRom($board) => $call,
            Mapper::Camerica($board) => $call,
            Mapper::Nina03($board) => $call,
            Mapper::Bmc150In1($board) => $call,
            Mapper::Bmc52In1($board) => $call,
            Mapper::Bmc1200In1($board) => $call,
            Mapper::WaixingMmc3($board) => $call,
            Mapper::WaixingVrc4($board) => $call,
        }
    };
}

impl Mapper {
    /// Build the board for an iNES mapper number. `None` for numbers this
    /// core does not support.
    #[must_use]
    pub fn from_id(id: u8, prg_banks: u8, chr_banks: u8) -> Option<Self> {
        Some(match id {
            0 => Mapper::Nrom(Nrom::new(prg_banks, chr_banks)),
            1 => Mapper::Mmc1(Mmc1::new(prg_banks, chr_banks)),
            2 => Mapper::UxRom(UxRom::new(prg_banks, chr_banks)),
            3 => Mapper::CnRom(CnRom::new(prg_banks, chr_banks)),
            4 => Mapper::Mmc3(Mmc3::new(prg_banks, chr_banks)),
            7 => Mapper::AxRom(AxRom::new(prg_banks, chr_banks)),
            11 => Mapper::ColorDreams(ColorDreams::new(prg_banks, chr_banks)),
            15 => Mapper::Bmc100In1(Bmc100In1::new(prg_banks, chr_banks)),
            16 => Mapper::BandaiFcg(BandaiFcg::new(prg_banks, chr_banks)),
            23 => Mapper::Vrc4(Vrc4::new(prg_banks, chr_banks)),
            66 => Mapper::GxRom(GxRom::new(prg_banks, chr_banks)),
            71 => Mapper::Camerica(Camerica::new(prg_banks, chr_banks)),
            113 => Mapper::Nina03(Nina03::new(prg_banks, chr_banks)),
            202 => Mapper::Bmc150In1(Bmc150In1::new(prg_banks, chr_banks)),
            225 => Mapper::Bmc52In1(Bmc52In1::new(prg_banks, chr_banks)),
            227 => Mapper::Bmc1200In1(Bmc1200In1::new(prg_banks, chr_banks)),
            245 => Mapper::WaixingMmc3(WaixingMmc3::new(prg_banks, chr_banks)),
            253 => Mapper::WaixingVrc4(WaixingVrc4::new(prg_banks, chr_banks)),
            _ => return None,
        })
    }

    /// CPU read translation: offset into PRG ROM.
    #[must_use]
    pub fn cpu_map_read(&self, addr: u16) -> Option<usize> {
        dispatch!(self, board => board.cpu_map_read(addr))
    }

    /// CPU write: bank-switch registers; may change mirroring or IRQ.
    pub fn cpu_map_write(&mut self, addr: u16, data: u8) -> Option<WriteEffect> {
        dispatch!(self, board => board.cpu_map_write(addr, data))
    }

    /// PPU read translation: offset into CHR ROM/RAM.
    #[must_use]
    pub fn ppu_map_read(&self, addr: u16) -> Option<usize> {
        dispatch!(self, board => board.ppu_map_read(addr))
    }

    /// PPU write translation: offset into writable CHR, if any.
    #[must_use]
    pub fn ppu_map_write(&self, addr: u16) -> Option<usize> {
        dispatch!(self, board => board.ppu_map_write(addr))
    }

    /// Return the board to power-on state.
    pub fn reset(&mut self) {
        dispatch!(self, board => board.reset());
    }

    /// A12 rising-edge notification.
    pub fn scanline_tick(&mut self) {
        dispatch!(self, board => board.scanline_tick());
    }

    /// One CPU cycle elapsed.
    pub fn cpu_tick(&mut self) {
        dispatch!(self, board => board.cpu_tick());
    }

    /// Level view of the IRQ line, without acknowledging it.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        dispatch!(self, board => board.irq_pending())
    }

    /// Acknowledge and clear the pending IRQ.
    pub fn take_irq(&mut self) -> bool {
        dispatch!(self, board => board.take_irq())
    }
}
