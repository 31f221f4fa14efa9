//! Top-level NES system.
//!
//! The master clock is counted in PPU dots. Per dot: the PPU always
//! ticks; every third dot the CPU (or the DMA engine stealing its bus)
//! and the APU tick, the mapper sees a CPU cycle, and the IRQ lines are
//! polled. One NTSC frame is 341 × 262 = 89,342 dots, one fewer on odd
//! frames with rendering enabled.

#![allow(clippy::cast_possible_truncation)]

use emu_core::{Bus, Cpu, Observable, Tickable, Value};
use mos_6502::{Mos6502, Status};

use crate::bus::NesBus;
use crate::cartridge::Cartridge;
use crate::controller::Controller;
use crate::error::NesError;
use crate::input::{InputQueue, NesButton};
use crate::snapshot::{self, BusState, CpuState, SaveState};
use crate::ppu;

/// NES system: CPU plus the bus that owns every other device.
pub struct Nes {
    cpu: Mos6502,
    bus: NesBus,
    /// Master clock in PPU dots.
    master_clock: u64,
    /// Elapsed CPU cycles (DMA parity and debugging).
    cpu_cycles: u64,
    /// Completed frame counter.
    frame_count: u64,
    /// Timed input event queue.
    input_queue: InputQueue,
}

impl Nes {
    /// An empty system. Load a ROM before running frames.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cpu: Mos6502::new(),
            bus: NesBus::new(Cartridge::new()),
            master_clock: 0,
            cpu_cycles: 0,
            frame_count: 0,
            input_queue: InputQueue::new(),
        }
    }

    /// Parse an iNES image, insert the cartridge, and reset.
    ///
    /// # Errors
    ///
    /// Propagates header and mapper failures from the parser.
    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), NesError> {
        self.bus.cartridge = Cartridge::from_ines(data)?;
        self.reset();
        Ok(())
    }

    /// Reset the machine: zero RAM, reset every device, and re-seed the
    /// CPU from the reset vector.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.bus.ppu.reset();
        self.bus.apu.reset();
        self.bus.cartridge.reset();
        self.cpu.reset(&mut self.bus);
        self.master_clock = 0;
        self.cpu_cycles = 0;
    }

    /// Run until the PPU completes the current frame. Pending input-queue
    /// events for this frame are applied first.
    ///
    /// Returns the number of master-clock dots executed.
    pub fn run_frame(&mut self) -> u64 {
        self.input_queue
            .process(self.frame_count, &mut self.bus.controller1);
        self.frame_count += 1;

        self.bus.ppu.clear_frame_complete();
        let start = self.master_clock;
        while !self.bus.ppu.frame_complete() {
            self.tick();
        }
        self.master_clock - start
    }

    // === Video ===

    /// The finished frame: 256×240 opaque ARGB words, row-major.
    #[must_use]
    pub fn frame_buffer(&self) -> &[u32] {
        self.bus.ppu.framebuffer()
    }

    /// Framebuffer width in pixels.
    #[must_use]
    pub fn frame_width(&self) -> u32 {
        ppu::FB_WIDTH
    }

    /// Framebuffer height in pixels.
    #[must_use]
    pub fn frame_height(&self) -> u32 {
        ppu::FB_HEIGHT
    }

    // === Audio ===

    /// Drain up to `out.len()` resampled audio samples; see
    /// [`crate::Apu`]-level docs for the under-run behavior. Returns the
    /// number of samples written.
    pub fn read_audio(&mut self, out: &mut [f32]) -> usize {
        self.bus.apu.read_samples(out)
    }

    /// Set the host output rate in Hz.
    pub fn set_audio_sample_rate(&mut self, rate: f64) {
        self.bus.apu.set_sample_rate(rate);
    }

    // === Input ===

    /// Controller on `port` (1 or 2; anything else folds to port 2).
    #[must_use]
    pub fn controller(&self, port: u8) -> &Controller {
        if port <= 1 {
            &self.bus.controller1
        } else {
            &self.bus.controller2
        }
    }

    /// Mutable controller on `port`.
    pub fn controller_mut(&mut self, port: u8) -> &mut Controller {
        if port <= 1 {
            &mut self.bus.controller1
        } else {
            &mut self.bus.controller2
        }
    }

    /// Press a button on controller 1.
    pub fn press_button(&mut self, button: NesButton) {
        self.bus.controller1.set_button(button.bit(), true);
    }

    /// Release a button on controller 1.
    pub fn release_button(&mut self, button: NesButton) {
        self.bus.controller1.set_button(button.bit(), false);
    }

    /// The timed input queue.
    pub fn input_queue(&mut self) -> &mut InputQueue {
        &mut self.input_queue
    }

    // === Save states ===

    /// Capture the whole machine as a versioned blob.
    #[must_use]
    pub fn save_state(&self) -> Vec<u8> {
        let (cycles_remaining, total_cycles, nmi_pending, irq_pending) = self.cpu.exec_state();
        let state = SaveState {
            version: snapshot::SAVE_STATE_VERSION,
            cpu: CpuState {
                a: self.cpu.regs.a,
                x: self.cpu.regs.x,
                y: self.cpu.regs.y,
                s: self.cpu.regs.s,
                pc: self.cpu.regs.pc,
                p: self.cpu.regs.p.0,
                cycles_remaining,
                total_cycles,
                nmi_pending,
                irq_pending,
            },
            bus: BusState {
                ram: self.bus.ram,
                dma_page: self.bus.dma_page,
                dma_address: self.bus.dma_address,
                dma_data: self.bus.dma_data,
                dma_transfer: self.bus.dma_transfer,
                dma_dummy: self.bus.dma_dummy,
                controller1: self.bus.controller1.clone(),
                controller2: self.bus.controller2.clone(),
            },
            ppu: self.bus.ppu.clone(),
            apu: self.bus.apu.clone(),
            cartridge: self.bus.cartridge.state(),
            master_clock: self.master_clock,
            cpu_cycles: self.cpu_cycles,
            frame_count: self.frame_count,
        };
        snapshot::to_blob(&state)
    }

    /// Restore a blob captured by `save_state`. The same ROM must already
    /// be loaded; the blob does not carry ROM contents.
    ///
    /// # Errors
    ///
    /// [`NesError::SaveStateVersionMismatch`] for blobs from another
    /// format version, [`NesError::SaveStateCorrupt`] when the blob does
    /// not deserialize or its buffers have the wrong shape.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), NesError> {
        let state = snapshot::from_blob(bytes)?;

        self.bus.cartridge.restore(state.cartridge)?;

        self.cpu.regs.a = state.cpu.a;
        self.cpu.regs.x = state.cpu.x;
        self.cpu.regs.y = state.cpu.y;
        self.cpu.regs.s = state.cpu.s;
        self.cpu.regs.pc = state.cpu.pc;
        self.cpu.regs.p = Status(state.cpu.p);
        self.cpu.set_exec_state(
            state.cpu.cycles_remaining,
            state.cpu.total_cycles,
            state.cpu.nmi_pending,
            state.cpu.irq_pending,
        );

        self.bus.ram = state.bus.ram;
        self.bus.dma_page = state.bus.dma_page;
        self.bus.dma_address = state.bus.dma_address;
        self.bus.dma_data = state.bus.dma_data;
        self.bus.dma_transfer = state.bus.dma_transfer;
        self.bus.dma_dummy = state.bus.dma_dummy;
        self.bus.controller1 = state.bus.controller1;
        self.bus.controller2 = state.bus.controller2;

        self.bus.ppu = state.ppu;
        self.bus.apu = state.apu;

        self.master_clock = state.master_clock;
        self.cpu_cycles = state.cpu_cycles;
        self.frame_count = state.frame_count;
        Ok(())
    }

    // === Observation ===

    /// Reference to the CPU.
    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    /// Mutable reference to the CPU.
    pub fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    /// Reference to the bus.
    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    /// Mutable reference to the bus.
    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Master clock in PPU dots.
    #[must_use]
    pub fn master_clock(&self) -> u64 {
        self.master_clock
    }

    /// Completed frames.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Tickable for Nes {
    fn tick(&mut self) {
        // PPU: every dot.
        self.bus.ppu.tick(&self.bus.cartridge);

        // CPU and APU: every third dot.
        if self.master_clock % 3 == 0 {
            if self.bus.dma_active() {
                // Only the DMA engine touches the bus during the stall.
                let odd = self.cpu_cycles % 2 == 1;
                self.bus.dma_cycle(odd);
            } else {
                self.cpu.clock(&mut self.bus);
            }
            self.cpu_cycles += 1;

            self.bus.apu.clock();

            // DMC sample fetch: perform the bus read and charge the CPU
            // the steal cycles.
            if let Some(addr) = self.bus.apu.take_dmc_request() {
                let data = self.bus.read(addr);
                self.bus.apu.provide_dmc_byte(data);
                self.cpu.stall(4);
            }

            self.bus.cartridge.cpu_tick();

            // Level-sensitive IRQ sources, sampled once per CPU cycle.
            // Never drained here: each line stays asserted until the
            // program acknowledges its source ($4015 for the APU, the
            // mapper's own registers for the cartridge), so a request
            // masked by the I flag survives until it can be served.
            if self.bus.apu.irq_pending() || self.bus.cartridge.irq_pending() {
                self.cpu.irq();
            }
        }

        // VBlank NMI.
        if self.bus.ppu.take_nmi() {
            self.cpu.nmi();
        }

        // A12 rising edge → scanline-counting mappers.
        if self.bus.ppu.take_scanline_irq() {
            self.bus.cartridge.scanline_tick();
        }

        self.master_clock += 1;
    }
}

impl Default for Nes {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Nes {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("ppu.") {
            match rest {
                "scanline" => Some(Value::U16(self.bus.ppu.scanline().max(0) as u16)),
                "dot" => Some(self.bus.ppu.dot().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("apu.") {
            self.bus.apu.query(rest)
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let addr = if let Some(hex) = rest
                .strip_prefix("0x")
                .or_else(|| rest.strip_prefix("0X"))
                .or_else(|| rest.strip_prefix('$'))
            {
                u16::from_str_radix(hex, 16).ok()
            } else {
                rest.parse().ok()
            };
            addr.map(|a| Value::U8(self.bus.peek_ram(a)))
        } else {
            match path {
                "master_clock" => Some(self.master_clock.into()),
                "frame_count" => Some(self.frame_count.into()),
                _ => self.cpu.query(path),
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<register>",
            "ppu.scanline",
            "ppu.dot",
            "apu.<channel>",
            "memory.<address>",
            "master_clock",
            "frame_count",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 32 KB NOP sled with the reset vector at $8000.
    fn nop_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 16 + 32 * 1024 + 8 * 1024];
        rom[0..4].copy_from_slice(b"NES\x1a");
        rom[4] = 2;
        rom[5] = 1;
        for i in 0..32 * 1024 {
            rom[16 + i] = 0xEA;
        }
        rom[16 + 0x7FFC] = 0x00;
        rom[16 + 0x7FFD] = 0x80;
        rom
    }

    fn make_nes() -> Nes {
        let mut nes = Nes::new();
        nes.load_rom(&nop_rom()).expect("load");
        nes
    }

    #[test]
    fn reset_seeds_pc_from_vector() {
        let nes = make_nes();
        assert_eq!(nes.cpu().regs.pc, 0x8000);
        assert_eq!(nes.cpu().regs.s, 0xFD);
    }

    #[test]
    fn run_frame_advances_one_frame_of_dots() {
        let mut nes = make_nes();
        let dots = nes.run_frame();
        // Rendering disabled: exactly 341 × 262 dots.
        assert_eq!(dots, 341 * 262);
        assert_eq!(nes.frame_count(), 1);
    }

    #[test]
    fn master_clock_is_monotonic_across_frames() {
        let mut nes = make_nes();
        let mut last = nes.master_clock();
        for _ in 0..3 {
            nes.run_frame();
            assert!(nes.master_clock() > last);
            last = nes.master_clock();
        }
    }

    #[test]
    fn frame_buffer_has_expected_dimensions() {
        let nes = make_nes();
        assert_eq!(
            nes.frame_buffer().len(),
            nes.frame_width() as usize * nes.frame_height() as usize
        );
    }

    #[test]
    fn cpu_to_ppu_ratio_is_one_to_three() {
        let mut nes = make_nes();
        let cpu_before = nes.cpu().total_cycles();
        nes.run_frame();
        let cpu_after = nes.cpu().total_cycles();
        let dots = nes.master_clock();
        let cpu_ticks = cpu_after - cpu_before;
        // One CPU tick per three dots, within one tick of rounding.
        assert!(
            (dots / 3).abs_diff(cpu_ticks) <= 1,
            "dots={dots} cpu={cpu_ticks}"
        );
    }

    #[test]
    fn observable_paths_route() {
        let mut nes = make_nes();
        assert_eq!(nes.query("cpu.pc"), Some(Value::U16(0x8000)));
        nes.bus_mut().ram[0] = 0xAB;
        assert_eq!(nes.query("memory.0x0000"), Some(Value::U8(0xAB)));
        assert_eq!(nes.query("memory.$0000"), Some(Value::U8(0xAB)));
        assert!(nes.query("nonsense.path").is_none());
    }

    /// 32 KB mapper-4 image: idle loop at $8000, IRQ handler at $8040
    /// that acknowledges the MMC3 through $E000, counts into $10, and
    /// returns.
    fn mmc3_irq_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 16 + 32 * 1024 + 8 * 1024];
        rom[0..4].copy_from_slice(b"NES\x1a");
        rom[4] = 2;
        rom[5] = 1;
        rom[6] = 0x40; // mapper 4
        // Idle: JMP $8000.
        rom[16..16 + 3].copy_from_slice(&[0x4C, 0x00, 0x80]);
        // Handler: STA $E000 (disable + acknowledge), INC $10, RTI.
        rom[16 + 0x40..16 + 0x46].copy_from_slice(&[0x8D, 0x00, 0xE0, 0xE6, 0x10, 0x40]);
        rom[16 + 0x7FFC] = 0x00;
        rom[16 + 0x7FFD] = 0x80;
        rom[16 + 0x7FFE] = 0x40;
        rom[16 + 0x7FFF] = 0x80;
        rom
    }

    #[test]
    fn mapper_irq_survives_i_flag_mask() {
        let mut nes = Nes::new();
        nes.load_rom(&mmc3_irq_rom()).expect("load");
        assert!(nes.cpu().regs.p.is_set(0x04), "I set out of reset");

        // Arm the counter and clock one A12 edge by hand: latch 0
        // reloads to zero and pends immediately.
        {
            let cart = &mut nes.bus_mut().cartridge;
            cart.cpu_write(0xC000, 0);
            cart.cpu_write(0xC001, 0);
            cart.cpu_write(0xE001, 0);
            cart.scanline_tick();
        }
        assert!(nes.bus().cartridge.irq_pending());

        // While I is set the request must neither run the handler nor
        // get lost.
        for _ in 0..300 {
            nes.tick();
        }
        assert_eq!(nes.bus().peek_ram(0x10), 0, "handler ran despite I");
        assert!(
            nes.bus().cartridge.irq_pending(),
            "masked IRQ was dropped instead of held"
        );

        // Clear I: the held request is serviced exactly once; the
        // handler's $E000 write deasserts the line.
        nes.cpu_mut().regs.p.0 &= !0x04;
        for _ in 0..600 {
            nes.tick();
        }
        assert_eq!(nes.bus().peek_ram(0x10), 1);
        assert!(!nes.bus().cartridge.irq_pending(), "handler acknowledged");
    }

    #[test]
    fn run_frame_is_total_on_an_empty_system() {
        // No ROM loaded: the machine must still never panic.
        let mut nes = Nes::new();
        nes.run_frame();
    }

    #[test]
    fn controllers_reachable_by_port() {
        let mut nes = make_nes();
        nes.controller_mut(1)
            .set_button(crate::controller::button::A, true);
        assert_eq!(nes.controller(1).buttons() >> 7, 1);
        assert_eq!(nes.controller(2).buttons(), 0);
    }
}
