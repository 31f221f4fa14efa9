//! NES APU (2A03 audio).
//!
//! Five channels — two pulse, triangle, noise, DMC — plus the frame
//! sequencer and the non-linear mixer. The APU clocks once per CPU cycle;
//! the triangle timer runs at CPU rate, the other channel timers at half
//! that. Mixed samples are resampled to the host rate by a fractional
//! cycle accumulator and land in a fixed-capacity ring.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use emu_core::{Observable, Value};
use serde::{Deserialize, Serialize};

/// NTSC CPU clock rate, which is also the APU's input rate.
const CPU_CLOCK_HZ: f64 = 1_789_773.0;

/// Sample ring capacity.
const RING_CAPACITY: usize = 8192;

/// Pulse duty sequences: 12.5%, 25%, 50%, 75% (25% negated).
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [0, 0, 0, 0, 0, 0, 1, 1],
    [0, 0, 0, 0, 1, 1, 1, 1],
    [1, 1, 1, 1, 1, 1, 0, 0],
];

/// Triangle output sequence: 15 down to 0, then back up.
const TRIANGLE_TABLE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, //
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Noise timer periods (NTSC).
const NOISE_PERIOD_TABLE: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

/// DMC timer periods (NTSC).
const DMC_RATE_TABLE: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

/// Length counter load values, indexed by the 5-bit field of $4003-style
/// writes.
const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, //
    12, 16, 24, 18, 48, 20, 96, 22, 192, 24, 72, 26, 16, 28, 32, 30,
];

/// Frame-sequencer step points, in CPU cycles after the last $4017 write.
const FRAME_STEP_1: u16 = 7457;
const FRAME_STEP_2: u16 = 14913;
const FRAME_STEP_3: u16 = 22371;
const FRAME_STEP_4: u16 = 29829;
const FRAME_STEP_5: u16 = 37281;

// ===========================================================================
// Pulse channel
// ===========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PulseChannel {
    enabled: bool,
    /// 1 or 2. Pulse 1's sweep negates in one's complement, pulse 2's in
    /// two's complement.
    channel: u8,

    duty: u8,
    duty_pos: u8,

    timer_period: u16,
    timer_value: u16,

    length_halt: bool,
    length_counter: u8,

    envelope_enabled: bool,
    envelope_loop: bool,
    envelope_start: bool,
    envelope_period: u8,
    envelope_divider: u8,
    envelope_decay: u8,
    constant_volume: u8,

    sweep_enabled: bool,
    sweep_negate: bool,
    sweep_reload: bool,
    sweep_period: u8,
    sweep_shift: u8,
    sweep_divider: u8,
}

impl PulseChannel {
    fn new(channel: u8) -> Self {
        Self {
            enabled: false,
            channel,
            duty: 0,
            duty_pos: 0,
            timer_period: 0,
            timer_value: 0,
            length_halt: false,
            length_counter: 0,
            envelope_enabled: true,
            envelope_loop: false,
            envelope_start: false,
            envelope_period: 0,
            envelope_divider: 0,
            envelope_decay: 0,
            constant_volume: 0,
            sweep_enabled: false,
            sweep_negate: false,
            sweep_reload: false,
            sweep_period: 0,
            sweep_shift: 0,
            sweep_divider: 0,
        }
    }

    /// $4000/$4004: duty, length halt, envelope.
    fn write_ctrl(&mut self, data: u8) {
        self.duty = (data >> 6) & 0x03;
        self.length_halt = data & 0x20 != 0;
        self.envelope_loop = data & 0x20 != 0;
        self.envelope_enabled = data & 0x10 == 0;
        self.envelope_period = data & 0x0F;
        self.constant_volume = data & 0x0F;
    }

    /// $4001/$4005: sweep unit.
    fn write_sweep(&mut self, data: u8) {
        self.sweep_enabled = data & 0x80 != 0;
        self.sweep_period = (data >> 4) & 0x07;
        self.sweep_negate = data & 0x08 != 0;
        self.sweep_shift = data & 0x07;
        self.sweep_reload = true;
    }

    /// $4002/$4006: timer low.
    fn write_timer_lo(&mut self, data: u8) {
        self.timer_period = (self.timer_period & 0x0700) | u16::from(data);
    }

    /// $4003/$4007: length load and timer high; restarts the sequence.
    fn write_length(&mut self, data: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | ((u16::from(data) & 0x07) << 8);
        if self.enabled {
            self.length_counter = LENGTH_TABLE[usize::from(data >> 3)];
        }
        self.duty_pos = 0;
        self.envelope_start = true;
    }

    fn clock_timer(&mut self) {
        if self.timer_value == 0 {
            self.timer_value = self.timer_period;
            self.duty_pos = (self.duty_pos + 1) % 8;
        } else {
            self.timer_value -= 1;
        }
    }

    fn clock_envelope(&mut self) {
        if self.envelope_start {
            self.envelope_start = false;
            self.envelope_decay = 15;
            self.envelope_divider = self.envelope_period;
        } else if self.envelope_divider == 0 {
            self.envelope_divider = self.envelope_period;
            if self.envelope_decay > 0 {
                self.envelope_decay -= 1;
            } else if self.envelope_loop {
                self.envelope_decay = 15;
            }
        } else {
            self.envelope_divider -= 1;
        }
    }

    fn clock_length(&mut self) {
        if !self.length_halt && self.length_counter > 0 {
            self.length_counter -= 1;
        }
    }

    fn clock_sweep(&mut self) {
        let target = self.sweep_target_period();
        if self.sweep_divider == 0
            && self.sweep_enabled
            && self.sweep_shift > 0
            && self.timer_period >= 8
            && target <= 0x7FF
        {
            self.timer_period = target;
        }
        if self.sweep_divider == 0 || self.sweep_reload {
            self.sweep_divider = self.sweep_period;
            self.sweep_reload = false;
        } else {
            self.sweep_divider -= 1;
        }
    }

    fn sweep_target_period(&self) -> u16 {
        let delta = self.timer_period >> self.sweep_shift;
        if self.sweep_negate {
            // Pulse 1: one's complement (subtract delta + 1).
            if self.channel == 1 {
                self.timer_period.wrapping_sub(delta).wrapping_sub(1)
            } else {
                self.timer_period.wrapping_sub(delta)
            }
        } else {
            self.timer_period.wrapping_add(delta)
        }
    }

    fn is_muted(&self) -> bool {
        self.timer_period < 8 || self.sweep_target_period() > 0x7FF
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length_counter == 0 || self.is_muted() {
            return 0;
        }
        if DUTY_TABLE[usize::from(self.duty)][usize::from(self.duty_pos)] == 0 {
            return 0;
        }
        if self.envelope_enabled {
            self.envelope_decay
        } else {
            self.constant_volume
        }
    }
}

// ===========================================================================
// Triangle channel
// ===========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TriangleChannel {
    enabled: bool,
    timer_period: u16,
    timer_value: u16,
    sequence_pos: u8,
    length_halt: bool,
    length_counter: u8,
    linear_counter: u8,
    linear_reload: u8,
    linear_reload_flag: bool,
}

impl TriangleChannel {
    fn new() -> Self {
        Self {
            enabled: false,
            timer_period: 0,
            timer_value: 0,
            sequence_pos: 0,
            length_halt: false,
            length_counter: 0,
            linear_counter: 0,
            linear_reload: 0,
            linear_reload_flag: false,
        }
    }

    /// $4008: control flag and linear counter reload value.
    fn write_ctrl(&mut self, data: u8) {
        self.length_halt = data & 0x80 != 0;
        self.linear_reload = data & 0x7F;
    }

    /// $400A: timer low.
    fn write_timer_lo(&mut self, data: u8) {
        self.timer_period = (self.timer_period & 0x0700) | u16::from(data);
    }

    /// $400B: length load and timer high.
    fn write_length(&mut self, data: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | ((u16::from(data) & 0x07) << 8);
        if self.enabled {
            self.length_counter = LENGTH_TABLE[usize::from(data >> 3)];
        }
        self.linear_reload_flag = true;
    }

    /// Runs at CPU rate (twice the other channels).
    fn clock_timer(&mut self) {
        if self.timer_value == 0 {
            self.timer_value = self.timer_period;
            if self.length_counter > 0 && self.linear_counter > 0 {
                self.sequence_pos = (self.sequence_pos + 1) % 32;
            }
        } else {
            self.timer_value -= 1;
        }
    }

    fn clock_linear_counter(&mut self) {
        if self.linear_reload_flag {
            self.linear_counter = self.linear_reload;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.length_halt {
            self.linear_reload_flag = false;
        }
    }

    fn clock_length(&mut self) {
        if !self.length_halt && self.length_counter > 0 {
            self.length_counter -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length_counter == 0 || self.linear_counter == 0 {
            return 0;
        }
        // Ultrasonic periods would alias badly; hold the sequence
        // midpoint instead of snapping to zero.
        if self.timer_period < 2 {
            return 7;
        }
        TRIANGLE_TABLE[usize::from(self.sequence_pos)]
    }
}

// ===========================================================================
// Noise channel
// ===========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NoiseChannel {
    enabled: bool,
    /// 15-bit LFSR, seeded with 1.
    shift_register: u16,
    /// Short mode: feedback from bit 6 instead of bit 1.
    mode: bool,
    timer_period: u16,
    timer_value: u16,
    length_halt: bool,
    length_counter: u8,

    envelope_enabled: bool,
    envelope_loop: bool,
    envelope_start: bool,
    envelope_period: u8,
    envelope_divider: u8,
    envelope_decay: u8,
    constant_volume: u8,
}

impl NoiseChannel {
    fn new() -> Self {
        Self {
            enabled: false,
            shift_register: 1,
            mode: false,
            timer_period: 0,
            timer_value: 0,
            length_halt: false,
            length_counter: 0,
            envelope_enabled: true,
            envelope_loop: false,
            envelope_start: false,
            envelope_period: 0,
            envelope_divider: 0,
            envelope_decay: 0,
            constant_volume: 0,
        }
    }

    /// $400C: length halt and envelope.
    fn write_ctrl(&mut self, data: u8) {
        self.length_halt = data & 0x20 != 0;
        self.envelope_loop = data & 0x20 != 0;
        self.envelope_enabled = data & 0x10 == 0;
        self.envelope_period = data & 0x0F;
        self.constant_volume = data & 0x0F;
    }

    /// $400E: mode and period select.
    fn write_mode(&mut self, data: u8) {
        self.mode = data & 0x80 != 0;
        self.timer_period = NOISE_PERIOD_TABLE[usize::from(data & 0x0F)];
    }

    /// $400F: length load; restarts the envelope.
    fn write_length(&mut self, data: u8) {
        if self.enabled {
            self.length_counter = LENGTH_TABLE[usize::from(data >> 3)];
        }
        self.envelope_start = true;
    }

    fn clock_timer(&mut self) {
        if self.timer_value == 0 {
            self.timer_value = self.timer_period;
            let tap = if self.mode { 6 } else { 1 };
            let feedback = (self.shift_register & 1) ^ ((self.shift_register >> tap) & 1);
            self.shift_register >>= 1;
            self.shift_register |= feedback << 14;
        } else {
            self.timer_value -= 1;
        }
    }

    fn clock_envelope(&mut self) {
        if self.envelope_start {
            self.envelope_start = false;
            self.envelope_decay = 15;
            self.envelope_divider = self.envelope_period;
        } else if self.envelope_divider == 0 {
            self.envelope_divider = self.envelope_period;
            if self.envelope_decay > 0 {
                self.envelope_decay -= 1;
            } else if self.envelope_loop {
                self.envelope_decay = 15;
            }
        } else {
            self.envelope_divider -= 1;
        }
    }

    fn clock_length(&mut self) {
        if !self.length_halt && self.length_counter > 0 {
            self.length_counter -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length_counter == 0 || self.shift_register & 1 != 0 {
            return 0;
        }
        if self.envelope_enabled {
            self.envelope_decay
        } else {
            self.constant_volume
        }
    }
}

// ===========================================================================
// DMC channel
// ===========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DmcChannel {
    enabled: bool,
    irq_enabled: bool,
    loop_flag: bool,
    rate_index: u8,
    timer_period: u16,
    timer_value: u16,
    /// 7-bit output level.
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    bytes_remaining: u16,
    shift_register: u8,
    bits_remaining: u8,
    sample_buffer: u8,
    sample_buffer_empty: bool,
    silence: bool,
    irq_flag: bool,
}

impl DmcChannel {
    fn new() -> Self {
        Self {
            enabled: false,
            irq_enabled: false,
            loop_flag: false,
            rate_index: 0,
            timer_period: DMC_RATE_TABLE[0],
            timer_value: 0,
            output_level: 0,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            shift_register: 0,
            bits_remaining: 8,
            sample_buffer: 0,
            sample_buffer_empty: true,
            silence: true,
            irq_flag: false,
        }
    }

    /// $4010: IRQ enable, loop, rate.
    fn write_ctrl(&mut self, data: u8) {
        self.irq_enabled = data & 0x80 != 0;
        self.loop_flag = data & 0x40 != 0;
        self.rate_index = data & 0x0F;
        self.timer_period = DMC_RATE_TABLE[usize::from(self.rate_index)];
        if !self.irq_enabled {
            self.irq_flag = false;
        }
    }

    /// $4011: direct 7-bit output load.
    fn write_direct_load(&mut self, data: u8) {
        self.output_level = data & 0x7F;
    }

    /// $4012: sample address = $C000 + n*64.
    fn write_sample_addr(&mut self, data: u8) {
        self.sample_address = 0xC000 + u16::from(data) * 64;
    }

    /// $4013: sample length = n*16 + 1.
    fn write_sample_length(&mut self, data: u8) {
        self.sample_length = u16::from(data) * 16 + 1;
    }

    fn restart(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    fn output(&self) -> u8 {
        self.output_level
    }
}

// ===========================================================================
// Sample ring
// ===========================================================================

/// Single-writer single-reader ring of resampled output. Overrun drops
/// the oldest samples so the most recent audio survives.
#[derive(Debug, Clone)]
struct SampleRing {
    buf: Vec<f32>,
    read: usize,
    write: usize,
    len: usize,
}

impl SampleRing {
    fn new() -> Self {
        Self {
            buf: vec![0.0; RING_CAPACITY],
            read: 0,
            write: 0,
            len: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        if self.len == RING_CAPACITY {
            self.read = (self.read + 1) % RING_CAPACITY;
            self.len -= 1;
        }
        self.buf[self.write] = sample;
        self.write = (self.write + 1) % RING_CAPACITY;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let sample = self.buf[self.read];
        self.read = (self.read + 1) % RING_CAPACITY;
        self.len -= 1;
        Some(sample)
    }

    fn available(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.len = 0;
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// APU
// ===========================================================================

/// The 2A03 audio unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apu {
    pulse1: PulseChannel,
    pulse2: PulseChannel,
    triangle: TriangleChannel,
    noise: NoiseChannel,
    dmc: DmcChannel,

    /// Frame sequencer: false = 4-step, true = 5-step.
    frame_mode: bool,
    frame_irq_inhibit: bool,
    frame_irq: bool,
    /// CPU cycles since the sequence (re)started.
    frame_cycle: u16,

    /// CPU cycle parity for the half-rate channel timers.
    cycle: u64,

    sample_rate: f64,
    /// CPU cycles per output sample.
    sample_interval: f64,
    sample_counter: f64,

    // One-pole output filters and the soft-clip state feeding the ring.
    lowpass_acc: f32,
    highpass_prev: f32,
    highpass_out: f32,

    /// Pending DMC memory fetch, serviced by the machine between cycles.
    dmc_read_request: Option<u16>,

    #[serde(skip)]
    ring: SampleRing,
}

impl Apu {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pulse1: PulseChannel::new(1),
            pulse2: PulseChannel::new(2),
            triangle: TriangleChannel::new(),
            noise: NoiseChannel::new(),
            dmc: DmcChannel::new(),
            frame_mode: false,
            frame_irq_inhibit: false,
            frame_irq: false,
            frame_cycle: 0,
            cycle: 0,
            sample_rate: 44_100.0,
            sample_interval: CPU_CLOCK_HZ / 44_100.0,
            sample_counter: 0.0,
            lowpass_acc: 0.0,
            highpass_prev: 0.0,
            highpass_out: 0.0,
            dmc_read_request: None,
            ring: SampleRing::new(),
        }
    }

    /// Return every unit to power-on state.
    pub fn reset(&mut self) {
        let rate = self.sample_rate;
        *self = Self::new();
        self.set_sample_rate(rate);
    }

    /// Recompute the resampling interval for a new host rate.
    pub fn set_sample_rate(&mut self, rate: f64) {
        let rate = if rate > 0.0 { rate } else { 44_100.0 };
        self.sample_rate = rate;
        self.sample_interval = CPU_CLOCK_HZ / rate;
    }

    // === Register interface ===

    /// CPU write to $4000-$4017.
    pub fn cpu_write(&mut self, addr: u16, data: u8) {
        match addr {
            0x4000 => self.pulse1.write_ctrl(data),
            0x4001 => self.pulse1.write_sweep(data),
            0x4002 => self.pulse1.write_timer_lo(data),
            0x4003 => self.pulse1.write_length(data),
            0x4004 => self.pulse2.write_ctrl(data),
            0x4005 => self.pulse2.write_sweep(data),
            0x4006 => self.pulse2.write_timer_lo(data),
            0x4007 => self.pulse2.write_length(data),
            0x4008 => self.triangle.write_ctrl(data),
            0x400A => self.triangle.write_timer_lo(data),
            0x400B => self.triangle.write_length(data),
            0x400C => self.noise.write_ctrl(data),
            0x400E => self.noise.write_mode(data),
            0x400F => self.noise.write_length(data),
            0x4010 => self.dmc.write_ctrl(data),
            0x4011 => self.dmc.write_direct_load(data),
            0x4012 => self.dmc.write_sample_addr(data),
            0x4013 => self.dmc.write_sample_length(data),
            0x4015 => self.write_status(data),
            0x4017 => self.write_frame_counter(data),
            _ => {}
        }
    }

    /// $4015 write: channel enables. Disabling a channel zeroes its
    /// length counter; enabling the DMC with nothing in flight restarts
    /// the sample. Always acknowledges the DMC IRQ.
    fn write_status(&mut self, data: u8) {
        self.pulse1.enabled = data & 0x01 != 0;
        self.pulse2.enabled = data & 0x02 != 0;
        self.triangle.enabled = data & 0x04 != 0;
        self.noise.enabled = data & 0x08 != 0;
        self.dmc.enabled = data & 0x10 != 0;

        if !self.pulse1.enabled {
            self.pulse1.length_counter = 0;
        }
        if !self.pulse2.enabled {
            self.pulse2.length_counter = 0;
        }
        if !self.triangle.enabled {
            self.triangle.length_counter = 0;
        }
        if !self.noise.enabled {
            self.noise.length_counter = 0;
        }

        if self.dmc.enabled {
            if self.dmc.bytes_remaining == 0 {
                self.dmc.restart();
            }
            // Kick the fetch chain; once the buffer fills it sustains
            // itself from the shift-register reloads.
            self.fetch_dmc_byte();
        } else {
            self.dmc.bytes_remaining = 0;
        }
        self.dmc.irq_flag = false;
    }

    /// $4017 write: frame counter mode. Restarts the sequence; a 5-step
    /// write clocks the quarter and half units immediately.
    fn write_frame_counter(&mut self, data: u8) {
        self.frame_mode = data & 0x80 != 0;
        self.frame_irq_inhibit = data & 0x40 != 0;
        if self.frame_irq_inhibit {
            self.frame_irq = false;
        }
        self.frame_cycle = 0;
        if self.frame_mode {
            self.clock_quarter_frame();
            self.clock_half_frame();
        }
    }

    /// $4015 read: per-channel length status plus the two IRQ flags.
    /// Reading acknowledges the frame IRQ.
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0u8;
        if self.pulse1.length_counter > 0 {
            status |= 0x01;
        }
        if self.pulse2.length_counter > 0 {
            status |= 0x02;
        }
        if self.triangle.length_counter > 0 {
            status |= 0x04;
        }
        if self.noise.length_counter > 0 {
            status |= 0x08;
        }
        if self.dmc.bytes_remaining > 0 {
            status |= 0x10;
        }
        if self.frame_irq {
            status |= 0x40;
        }
        if self.dmc.irq_flag {
            status |= 0x80;
        }
        self.frame_irq = false;
        status
    }

    // === Clocking ===

    /// Advance one CPU cycle.
    pub fn clock(&mut self) {
        self.triangle.clock_timer();

        if self.cycle % 2 == 0 {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
            self.clock_dmc();
        }

        self.clock_frame_counter();

        self.sample_counter += 1.0;
        if self.sample_counter >= self.sample_interval {
            self.sample_counter -= self.sample_interval;
            let sample = self.filter(self.mix());
            self.ring.push(sample);
        }

        self.cycle += 1;
    }

    fn clock_dmc(&mut self) {
        if self.dmc.timer_value > 0 {
            self.dmc.timer_value -= 1;
            return;
        }
        self.dmc.timer_value = self.dmc.timer_period;

        if !self.dmc.silence {
            if self.dmc.shift_register & 1 != 0 {
                if self.dmc.output_level <= 125 {
                    self.dmc.output_level += 2;
                }
            } else if self.dmc.output_level >= 2 {
                self.dmc.output_level -= 2;
            }
        }

        self.dmc.shift_register >>= 1;
        self.dmc.bits_remaining -= 1;

        if self.dmc.bits_remaining == 0 {
            self.dmc.bits_remaining = 8;
            if self.dmc.sample_buffer_empty {
                self.dmc.silence = true;
            } else {
                self.dmc.silence = false;
                self.dmc.shift_register = self.dmc.sample_buffer;
                self.dmc.sample_buffer_empty = true;
                self.fetch_dmc_byte();
            }
        }
    }

    /// Queue the next DMC sample byte fetch. The machine performs the bus
    /// read (stalling the CPU) and hands the byte back.
    fn fetch_dmc_byte(&mut self) {
        if self.dmc.bytes_remaining == 0 || !self.dmc.sample_buffer_empty {
            return;
        }
        self.dmc_read_request = Some(self.dmc.current_address);
        self.dmc.current_address = if self.dmc.current_address == 0xFFFF {
            0x8000
        } else {
            self.dmc.current_address + 1
        };
        self.dmc.bytes_remaining -= 1;

        if self.dmc.bytes_remaining == 0 {
            if self.dmc.loop_flag {
                self.dmc.restart();
            } else if self.dmc.irq_enabled {
                self.dmc.irq_flag = true;
            }
        }
    }

    /// Take the pending DMC fetch address, if any.
    pub fn take_dmc_request(&mut self) -> Option<u16> {
        self.dmc_read_request.take()
    }

    /// Deliver the byte for the last DMC fetch.
    pub fn provide_dmc_byte(&mut self, data: u8) {
        self.dmc.sample_buffer = data;
        self.dmc.sample_buffer_empty = false;
    }

    fn clock_frame_counter(&mut self) {
        self.frame_cycle += 1;
        if self.frame_mode {
            // 5-step: no IRQ, extra step, nothing at step 4's slot.
            match self.frame_cycle {
                FRAME_STEP_1 | FRAME_STEP_3 => self.clock_quarter_frame(),
                FRAME_STEP_2 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
                FRAME_STEP_5 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                    self.frame_cycle = 0;
                }
                _ => {}
            }
        } else {
            match self.frame_cycle {
                FRAME_STEP_1 | FRAME_STEP_3 => self.clock_quarter_frame(),
                FRAME_STEP_2 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
                FRAME_STEP_4 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                    if !self.frame_irq_inhibit {
                        self.frame_irq = true;
                    }
                    self.frame_cycle = 0;
                }
                _ => {}
            }
        }
    }

    /// Quarter-frame clock: envelopes and the triangle's linear counter.
    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_envelope();
        self.pulse2.clock_envelope();
        self.triangle.clock_linear_counter();
        self.noise.clock_envelope();
    }

    /// Half-frame clock: length counters and sweep units.
    fn clock_half_frame(&mut self) {
        self.pulse1.clock_length();
        self.pulse1.clock_sweep();
        self.pulse2.clock_length();
        self.pulse2.clock_sweep();
        self.triangle.clock_length();
        self.noise.clock_length();
    }

    /// Level-sensitive IRQ line: frame IRQ or DMC IRQ.
    #[must_use]
    pub fn irq_pending(&self) -> bool {
        self.frame_irq || self.dmc.irq_flag
    }

    // === Mixing and output ===

    /// The non-linear mixer from the 2A03's resistor ladder.
    fn mix(&self) -> f32 {
        let p1 = f32::from(self.pulse1.output());
        let p2 = f32::from(self.pulse2.output());
        let t = f32::from(self.triangle.output());
        let n = f32::from(self.noise.output());
        let d = f32::from(self.dmc.output());

        let pulse_sum = p1 + p2;
        let pulse_out = if pulse_sum > 0.0 {
            95.88 / ((8128.0 / pulse_sum) + 100.0)
        } else {
            0.0
        };

        let tnd_sum = t / 8227.0 + n / 12241.0 + d / 22638.0;
        let tnd_out = if tnd_sum > 0.0 {
            159.79 / ((1.0 / tnd_sum) + 100.0)
        } else {
            0.0
        };

        pulse_out + tnd_out
    }

    /// One-pole low-pass, one-pole DC-blocking high-pass, then a gentle
    /// soft clip before the hard [-1, 1] limit.
    fn filter(&mut self, input: f32) -> f32 {
        const LOWPASS_COEFF: f32 = 0.9;
        const HIGHPASS_COEFF: f32 = 0.996;

        self.lowpass_acc = self.lowpass_acc * LOWPASS_COEFF + input * (1.0 - LOWPASS_COEFF);
        let mut sample = self.lowpass_acc;

        self.highpass_out = HIGHPASS_COEFF * self.highpass_out + sample - self.highpass_prev;
        self.highpass_prev = sample;
        sample = self.highpass_out;

        sample *= 1.5;
        if sample > 0.95 {
            sample = 0.95 + (sample - 0.95) * 0.2;
        } else if sample < -0.95 {
            sample = -0.95 + (sample + 0.95) * 0.2;
        }

        sample.clamp(-1.0, 1.0)
    }

    /// Samples waiting in the ring.
    #[must_use]
    pub fn samples_available(&self) -> usize {
        self.ring.available()
    }

    /// Drain samples into `out`.
    ///
    /// With enough samples buffered this copies `out.len()` of them. On
    /// under-run the available samples are linearly stretched to fill the
    /// request so playback glides instead of gapping. Returns the number
    /// of samples written; zero only when the ring is empty.
    pub fn read_samples(&mut self, out: &mut [f32]) -> usize {
        let wanted = out.len();
        let available = self.ring.available();
        if wanted == 0 || available == 0 {
            return 0;
        }

        if available >= wanted {
            for slot in out.iter_mut() {
                *slot = self.ring.pop().unwrap_or(0.0);
            }
            return wanted;
        }

        // Under-run: stretch what we have across the whole request.
        let mut staged = Vec::with_capacity(available);
        while let Some(sample) = self.ring.pop() {
            staged.push(sample);
        }
        if staged.len() == 1 {
            out.fill(staged[0]);
            return wanted;
        }
        let step = (staged.len() - 1) as f64 / (wanted - 1) as f64;
        for (i, slot) in out.iter_mut().enumerate() {
            let pos = i as f64 * step;
            let base = pos as usize;
            let frac = (pos - base as f64) as f32;
            let a = staged[base];
            let b = staged[(base + 1).min(staged.len() - 1)];
            *slot = a + (b - a) * frac;
        }
        wanted
    }

    /// Drop all buffered samples.
    pub fn clear_samples(&mut self) {
        self.ring.clear();
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Apu {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pulse1.period" => Some(self.pulse1.timer_period.into()),
            "pulse1.length" => Some(self.pulse1.length_counter.into()),
            "pulse1.envelope" => Some(self.pulse1.envelope_decay.into()),
            "pulse2.period" => Some(self.pulse2.timer_period.into()),
            "pulse2.length" => Some(self.pulse2.length_counter.into()),
            "triangle.period" => Some(self.triangle.timer_period.into()),
            "triangle.length" => Some(self.triangle.length_counter.into()),
            "noise.period" => Some(self.noise.timer_period.into()),
            "dmc.bytes_remaining" => Some(self.dmc.bytes_remaining.into()),
            "frame_counter.mode" => Some(u8::from(self.frame_mode).into()),
            "samples_available" => Some((self.samples_available() as u64).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pulse1.period",
            "pulse1.length",
            "pulse1.envelope",
            "pulse2.period",
            "pulse2.length",
            "triangle.period",
            "triangle.length",
            "noise.period",
            "dmc.bytes_remaining",
            "frame_counter.mode",
            "samples_available",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_apu() -> Apu {
        let mut apu = Apu::new();
        apu.cpu_write(0x4015, 0x1F);
        apu
    }

    #[test]
    fn length_counter_loads_from_table() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4003, 0x08); // length index 1 → 254
        assert_eq!(apu.pulse1.length_counter, 254);
    }

    #[test]
    fn disabled_channel_ignores_length_load() {
        let mut apu = Apu::new();
        apu.cpu_write(0x4003, 0x08);
        assert_eq!(apu.pulse1.length_counter, 0);
    }

    #[test]
    fn status_write_clears_length_on_disable() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4003, 0x08);
        apu.cpu_write(0x4015, 0x00);
        assert_eq!(apu.pulse1.length_counter, 0);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn status_read_reports_lengths() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4003, 0x08); // pulse 1
        apu.cpu_write(0x400B, 0x08); // triangle
        let status = apu.read_status();
        assert_eq!(status & 0x05, 0x05);
        assert_eq!(status & 0x02, 0);
    }

    #[test]
    fn frame_irq_fires_at_step_four_and_clears_on_read() {
        let mut apu = enabled_apu();
        for _ in 0..u32::from(FRAME_STEP_4) {
            apu.clock();
        }
        assert!(apu.irq_pending());
        let status = apu.read_status();
        assert_eq!(status & 0x40, 0x40);
        assert!(!apu.irq_pending(), "read acknowledged the frame IRQ");
    }

    #[test]
    fn frame_irq_inhibited_in_five_step_mode() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4017, 0x80);
        for _ in 0..u32::from(FRAME_STEP_5) + 100 {
            apu.clock();
        }
        assert!(!apu.irq_pending());
    }

    #[test]
    fn five_step_write_clocks_immediately() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4003, 0x18); // length index 3 → 2
        assert_eq!(apu.pulse1.length_counter, 2);
        apu.cpu_write(0x4017, 0x80); // immediate half clock
        assert_eq!(apu.pulse1.length_counter, 1);
    }

    #[test]
    fn envelope_starts_at_fifteen() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4003, 0x08); // sets envelope start
        for _ in 0..u32::from(FRAME_STEP_1) {
            apu.clock();
        }
        assert_eq!(apu.pulse1.envelope_decay, 15);
    }

    #[test]
    fn pulse1_sweep_uses_ones_complement_negate() {
        let mut p1 = PulseChannel::new(1);
        let mut p2 = PulseChannel::new(2);
        for p in [&mut p1, &mut p2] {
            p.timer_period = 0x100;
            p.sweep_negate = true;
            p.sweep_shift = 2;
        }
        // delta = 0x40; pulse 1 subtracts one extra.
        assert_eq!(p1.sweep_target_period(), 0x100 - 0x40 - 1);
        assert_eq!(p2.sweep_target_period(), 0x100 - 0x40);
    }

    #[test]
    fn pulse_mutes_below_period_eight() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4000, 0x3F); // constant volume 15, duty 0
        apu.cpu_write(0x4002, 0x04); // period 4 < 8
        apu.cpu_write(0x4003, 0x08);
        assert_eq!(apu.pulse1.output(), 0);
    }

    #[test]
    fn triangle_holds_midpoint_at_ultrasonic_period() {
        let mut apu = enabled_apu();
        apu.cpu_write(0x4008, 0x7F); // linear reload 127
        apu.cpu_write(0x400A, 0x01); // period 1 < 2
        apu.cpu_write(0x400B, 0x08);
        apu.triangle.linear_counter = 10;
        assert_eq!(apu.triangle.output(), 7);
    }

    #[test]
    fn noise_lfsr_long_mode_taps_bits_zero_and_one() {
        let mut n = NoiseChannel::new();
        n.timer_period = 0;
        n.shift_register = 0b0000_0000_0000_0011;
        n.clock_timer();
        // feedback = bit0 ^ bit1 = 0 → shifted right, 0 into bit 14.
        assert_eq!(n.shift_register, 0b0000_0000_0000_0001);
        n.clock_timer();
        // feedback = 1 ^ 0 = 1 → bit 14 set.
        assert_eq!(n.shift_register, 0b0100_0000_0000_0000);
    }

    #[test]
    fn dmc_address_and_length_formulas() {
        let mut apu = Apu::new();
        apu.cpu_write(0x4012, 0x10);
        apu.cpu_write(0x4013, 0x04);
        assert_eq!(apu.dmc.sample_address, 0xC000 + 0x10 * 64);
        assert_eq!(apu.dmc.sample_length, 0x04 * 16 + 1);
    }

    #[test]
    fn enabling_dmc_restarts_and_fetches() {
        let mut apu = Apu::new();
        apu.cpu_write(0x4012, 0x02);
        apu.cpu_write(0x4013, 0x01);
        apu.cpu_write(0x4015, 0x10);
        // Restart loaded 17 bytes and immediately queued the first fetch.
        assert_eq!(apu.take_dmc_request(), Some(0xC000 + 2 * 64));
        assert_eq!(apu.dmc.bytes_remaining, 16);
        assert_eq!(apu.dmc.current_address, 0xC000 + 2 * 64 + 1);
    }

    #[test]
    fn status_write_acknowledges_dmc_irq() {
        let mut apu = Apu::new();
        apu.dmc.irq_flag = true;
        apu.cpu_write(0x4015, 0x00);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn mixer_matches_reference_formula() {
        let mut apu = enabled_apu();
        apu.pulse1.enabled = true;
        apu.pulse1.timer_period = 0x100;
        apu.pulse1.length_counter = 10;
        apu.pulse1.envelope_enabled = false;
        apu.pulse1.constant_volume = 15;
        apu.pulse1.duty = 2;
        apu.pulse1.duty_pos = 4; // duty 50%, high phase

        let expected = 95.88 / (8128.0 / 15.0 + 100.0);
        assert!((apu.mix() - expected).abs() < 1e-6);
    }

    #[test]
    fn mixer_is_zero_when_silent() {
        let apu = Apu::new();
        assert!(apu.mix().abs() < f32::EPSILON);
    }

    #[test]
    fn ring_overrun_discards_oldest() {
        let mut ring = SampleRing::new();
        for i in 0..=RING_CAPACITY {
            ring.push(i as f32);
        }
        assert_eq!(ring.available(), RING_CAPACITY);
        assert!((ring.pop().unwrap() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn read_samples_exact_when_enough_buffered() {
        let mut apu = Apu::new();
        for i in 0..100 {
            apu.ring.push(i as f32);
        }
        let mut out = [0.0f32; 50];
        assert_eq!(apu.read_samples(&mut out), 50);
        assert!((out[0] - 0.0).abs() < f32::EPSILON);
        assert!((out[49] - 49.0).abs() < f32::EPSILON);
        assert_eq!(apu.samples_available(), 50);
    }

    #[test]
    fn read_samples_stretches_on_underrun() {
        let mut apu = Apu::new();
        apu.ring.push(0.0);
        apu.ring.push(1.0);
        let mut out = [0.0f32; 5];
        assert_eq!(apu.read_samples(&mut out), 5);
        assert!((out[0] - 0.0).abs() < f32::EPSILON);
        assert!((out[4] - 1.0).abs() < f32::EPSILON);
        assert!(out[2] > 0.0 && out[2] < 1.0, "interpolated midpoint");
    }

    #[test]
    fn read_samples_empty_ring_returns_zero() {
        let mut apu = Apu::new();
        let mut out = [0.0f32; 8];
        assert_eq!(apu.read_samples(&mut out), 0);
    }

    #[test]
    fn resampler_produces_roughly_host_rate_samples() {
        let mut apu = Apu::new();
        apu.set_sample_rate(48_000.0);
        // One frame's worth of CPU cycles ≈ 29780.
        for _ in 0..29_780 {
            apu.clock();
        }
        let available = apu.samples_available();
        // 48000 / 60 ≈ 800 samples per frame.
        assert!(
            (780..=820).contains(&available),
            "got {available} samples"
        );
    }
}
