//! 6502 execution core.
//!
//! `clock()` is called once per CPU cycle. While an instruction is in
//! flight the call just burns a cycle; at an instruction boundary it
//! services any latched interrupt or fetches and fully executes the next
//! opcode, charging the documented cycle count plus any page-cross or
//! branch penalty. The fetch call itself counts as the instruction's
//! first cycle.
//!
//! Interrupts: NMI is edge-latched and always taken at the next boundary.
//! IRQ is level-sensitive — the machine re-asserts the line every CPU
//! cycle while any source is pending, and the latch is dropped when the
//! I flag masks it.

#![allow(clippy::cast_possible_truncation, clippy::too_many_lines)]

use emu_core::{Bus, Cpu, Observable, Value};

use crate::flags::{C, D, I, N, V, Z};
use crate::{Registers, Status};

/// NMI vector location.
const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector location.
const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector location.
const IRQ_VECTOR: u16 = 0xFFFE;

/// The MOS 6502 (2A03 variant: D flag stored but ignored by the ALU).
#[derive(Debug, Clone)]
pub struct Mos6502 {
    /// CPU registers.
    pub regs: Registers,

    /// Cycles left before the next instruction boundary.
    cycles_remaining: u8,

    /// Monotonic cycle counter.
    total_cycles: u64,

    /// Edge-latched NMI request.
    nmi_pending: bool,

    /// Level-sampled IRQ request.
    irq_pending: bool,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    /// Create a CPU in power-on state. PC is undefined until `reset`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            cycles_remaining: 0,
            total_cycles: 0,
            nmi_pending: false,
            irq_pending: false,
        }
    }

    /// Reset: load PC from $FFFC/$FFFD, S = $FD, P = I | U.
    ///
    /// The reset sequence occupies 8 cycles before the first fetch.
    pub fn reset<Bu: Bus>(&mut self, bus: &mut Bu) {
        let lo = u16::from(bus.read(RESET_VECTOR));
        let hi = u16::from(bus.read(RESET_VECTOR + 1));
        self.regs = Registers::new();
        self.regs.pc = (hi << 8) | lo;
        self.cycles_remaining = 8;
        self.total_cycles = 0;
        self.nmi_pending = false;
        self.irq_pending = false;
    }

    /// Execute one CPU cycle.
    pub fn clock<Bu: Bus>(&mut self, bus: &mut Bu) {
        self.total_cycles += 1;

        if self.cycles_remaining > 0 {
            self.cycles_remaining -= 1;
            return;
        }

        self.regs.p.set(crate::flags::U);

        if self.nmi_pending {
            self.nmi_pending = false;
            self.service_interrupt(bus, NMI_VECTOR);
            self.cycles_remaining = 8 - 1;
            return;
        }

        if self.irq_pending {
            // Drop the latch either way; an asserted line is re-latched
            // by the machine on the next cycle.
            self.irq_pending = false;
            if !self.regs.p.is_set(I) {
                self.service_interrupt(bus, IRQ_VECTOR);
                self.cycles_remaining = 7 - 1;
                return;
            }
        }

        let opcode = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let cycles = self.execute(opcode, bus);
        self.cycles_remaining = cycles - 1;

        self.regs.p.set(crate::flags::U);
    }

    /// Run clock cycles until the next instruction boundary.
    ///
    /// Returns the number of cycles consumed. Used by trace harnesses that
    /// step one instruction at a time.
    pub fn step<Bu: Bus>(&mut self, bus: &mut Bu) -> u64 {
        let start = self.total_cycles;
        loop {
            self.clock(bus);
            if self.cycles_remaining == 0 {
                break;
            }
        }
        self.total_cycles - start
    }

    /// Add stall cycles (DMC byte-fetch steals).
    pub fn stall(&mut self, cycles: u8) {
        self.cycles_remaining = self.cycles_remaining.saturating_add(cycles);
    }

    /// Monotonic cycle counter.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Raw execution state for save states:
    /// `(cycles_remaining, total_cycles, nmi_pending, irq_pending)`.
    #[must_use]
    pub fn exec_state(&self) -> (u8, u64, bool, bool) {
        (
            self.cycles_remaining,
            self.total_cycles,
            self.nmi_pending,
            self.irq_pending,
        )
    }

    /// Restore execution state captured by `exec_state`.
    pub fn set_exec_state(
        &mut self,
        cycles_remaining: u8,
        total_cycles: u64,
        nmi_pending: bool,
        irq_pending: bool,
    ) {
        self.cycles_remaining = cycles_remaining;
        self.total_cycles = total_cycles;
        self.nmi_pending = nmi_pending;
        self.irq_pending = irq_pending;
    }

    /// Push PC and P, set I, and vector. Shared by NMI, IRQ and the
    /// spurious-BRK path.
    fn service_interrupt<Bu: Bus>(&mut self, bus: &mut Bu, vector: u16) {
        self.push16(bus, self.regs.pc);
        let p = self.regs.p.to_push_irq();
        self.push(bus, p);
        self.regs.p.set(I);
        let lo = u16::from(bus.read(vector));
        let hi = u16::from(bus.read(vector.wrapping_add(1)));
        self.regs.pc = (hi << 8) | lo;
    }

    // === Stack ===

    fn push<Bu: Bus>(&mut self, bus: &mut Bu, value: u8) {
        let addr = self.regs.push();
        bus.write(addr, value);
    }

    fn pop<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let addr = self.regs.pop();
        bus.read(addr)
    }

    fn push16<Bu: Bus>(&mut self, bus: &mut Bu, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop16<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let lo = u16::from(self.pop(bus));
        let hi = u16::from(self.pop(bus));
        (hi << 8) | lo
    }

    // === Addressing modes ===
    //
    // `*_addr` return an effective address; bare names read the operand.
    // Indexed reads also return the page-cross penalty (0 or 1); indexed
    // writes and read-modify-writes always pay the fixed cost, so their
    // `*_addr` variants carry no penalty flag.

    fn imm<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let v = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    fn zp_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let a = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        a
    }

    fn zp<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let a = self.zp_addr(bus);
        bus.read(a)
    }

    fn zpx_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let a = u16::from(bus.read(self.regs.pc).wrapping_add(self.regs.x));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        a
    }

    fn zpx<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let a = self.zpx_addr(bus);
        bus.read(a)
    }

    fn zpy_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let a = u16::from(bus.read(self.regs.pc).wrapping_add(self.regs.y));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        a
    }

    fn zpy<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let a = self.zpy_addr(bus);
        bus.read(a)
    }

    fn abs_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let lo = u16::from(bus.read(self.regs.pc));
        let hi = u16::from(bus.read(self.regs.pc.wrapping_add(1)));
        self.regs.pc = self.regs.pc.wrapping_add(2);
        (hi << 8) | lo
    }

    fn abs<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let a = self.abs_addr(bus);
        bus.read(a)
    }

    fn abx_read<Bu: Bus>(&mut self, bus: &mut Bu) -> (u8, u8) {
        let base = self.abs_addr(bus);
        let addr = base.wrapping_add(u16::from(self.regs.x));
        let penalty = u8::from((base & 0xFF00) != (addr & 0xFF00));
        (bus.read(addr), penalty)
    }

    fn abx_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let base = self.abs_addr(bus);
        base.wrapping_add(u16::from(self.regs.x))
    }

    fn aby_read<Bu: Bus>(&mut self, bus: &mut Bu) -> (u8, u8) {
        let base = self.abs_addr(bus);
        let addr = base.wrapping_add(u16::from(self.regs.y));
        let penalty = u8::from((base & 0xFF00) != (addr & 0xFF00));
        (bus.read(addr), penalty)
    }

    fn aby_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let base = self.abs_addr(bus);
        base.wrapping_add(u16::from(self.regs.y))
    }

    fn izx_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let ptr = bus.read(self.regs.pc).wrapping_add(self.regs.x);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let lo = u16::from(bus.read(u16::from(ptr)));
        let hi = u16::from(bus.read(u16::from(ptr.wrapping_add(1))));
        (hi << 8) | lo
    }

    fn izx<Bu: Bus>(&mut self, bus: &mut Bu) -> u8 {
        let a = self.izx_addr(bus);
        bus.read(a)
    }

    fn izy_read<Bu: Bus>(&mut self, bus: &mut Bu) -> (u8, u8) {
        let ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let lo = u16::from(bus.read(u16::from(ptr)));
        let hi = u16::from(bus.read(u16::from(ptr.wrapping_add(1))));
        let base = (hi << 8) | lo;
        let addr = base.wrapping_add(u16::from(self.regs.y));
        let penalty = u8::from((base & 0xFF00) != (addr & 0xFF00));
        (bus.read(addr), penalty)
    }

    fn izy_addr<Bu: Bus>(&mut self, bus: &mut Bu) -> u16 {
        let ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let lo = u16::from(bus.read(u16::from(ptr)));
        let hi = u16::from(bus.read(u16::from(ptr.wrapping_add(1))));
        ((hi << 8) | lo).wrapping_add(u16::from(self.regs.y))
    }

    /// 16-bit read with the indirect-JMP page-wrap bug: the high byte is
    /// fetched from the start of the same page when the pointer sits at
    /// $xxFF.
    fn read16_wrap<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u16 {
        let lo = u16::from(bus.read(addr));
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = u16::from(bus.read(hi_addr));
        (hi << 8) | lo
    }

    // === ALU operations ===

    fn adc(&mut self, value: u8) {
        let a = u16::from(self.regs.a);
        let v = u16::from(value);
        let carry = u16::from(self.regs.p.is_set(C));
        let sum = a + v + carry;
        let result = sum as u8;
        self.regs.p.set_if(C, sum > 0xFF);
        self.regs
            .p
            .set_if(V, (self.regs.a ^ result) & (value ^ result) & 0x80 != 0);
        self.regs.a = result;
        self.regs.p.update_nz(result);
    }

    fn sbc(&mut self, value: u8) {
        // Two's-complement subtract is add with the operand inverted.
        self.adc(!value);
    }

    fn cmp(&mut self, reg: u8, value: u8) {
        self.regs.p.set_if(C, reg >= value);
        self.regs.p.update_nz(reg.wrapping_sub(value));
    }

    fn bit(&mut self, value: u8) {
        self.regs.p.set_if(Z, self.regs.a & value == 0);
        self.regs.p.set_if(N, value & 0x80 != 0);
        self.regs.p.set_if(V, value & 0x40 != 0);
    }

    /// Conditional branch. Returns the cycle count: 2 not taken, 3 taken,
    /// 4 taken across a page boundary.
    fn branch<Bu: Bus>(&mut self, bus: &mut Bu, condition: bool) -> u8 {
        let offset = bus.read(self.regs.pc) as i8;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        if !condition {
            return 2;
        }
        let target = self.regs.pc.wrapping_add(offset as u16);
        let crossed = (self.regs.pc & 0xFF00) != (target & 0xFF00);
        self.regs.pc = target;
        if crossed {
            4
        } else {
            3
        }
    }

    // === Read-modify-write memory operations ===

    fn asl_m<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u8 {
        let v = bus.read(addr);
        self.regs.p.set_if(C, v & 0x80 != 0);
        let v = v << 1;
        bus.write(addr, v);
        self.regs.p.update_nz(v);
        v
    }

    fn lsr_m<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u8 {
        let v = bus.read(addr);
        self.regs.p.set_if(C, v & 0x01 != 0);
        let v = v >> 1;
        bus.write(addr, v);
        self.regs.p.update_nz(v);
        v
    }

    fn rol_m<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u8 {
        let v = bus.read(addr);
        let carry_in = u8::from(self.regs.p.is_set(C));
        self.regs.p.set_if(C, v & 0x80 != 0);
        let v = (v << 1) | carry_in;
        bus.write(addr, v);
        self.regs.p.update_nz(v);
        v
    }

    fn ror_m<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u8 {
        let v = bus.read(addr);
        let carry_in = if self.regs.p.is_set(C) { 0x80 } else { 0 };
        self.regs.p.set_if(C, v & 0x01 != 0);
        let v = (v >> 1) | carry_in;
        bus.write(addr, v);
        self.regs.p.update_nz(v);
        v
    }

    fn inc_m<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u8 {
        let v = bus.read(addr).wrapping_add(1);
        bus.write(addr, v);
        self.regs.p.update_nz(v);
        v
    }

    fn dec_m<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) -> u8 {
        let v = bus.read(addr).wrapping_sub(1);
        bus.write(addr, v);
        self.regs.p.update_nz(v);
        v
    }

    // === Undocumented read-modify-write combos ===

    fn dcp<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = bus.read(addr).wrapping_sub(1);
        bus.write(addr, v);
        self.cmp(self.regs.a, v);
    }

    fn isb<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = bus.read(addr).wrapping_add(1);
        bus.write(addr, v);
        self.sbc(v);
    }

    fn slo<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = self.asl_m(bus, addr);
        self.regs.a |= v;
        self.regs.p.update_nz(self.regs.a);
    }

    fn rla<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = self.rol_m(bus, addr);
        self.regs.a &= v;
        self.regs.p.update_nz(self.regs.a);
    }

    fn sre<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = self.lsr_m(bus, addr);
        self.regs.a ^= v;
        self.regs.p.update_nz(self.regs.a);
    }

    fn rra<Bu: Bus>(&mut self, bus: &mut Bu, addr: u16) {
        let v = self.ror_m(bus, addr);
        self.adc(v);
    }

    fn lax(&mut self, value: u8) {
        self.regs.a = value;
        self.regs.x = value;
        self.regs.p.update_nz(value);
    }

    // === Dispatch ===

    /// Fetch operands, execute, and return the instruction's cycle count.
    fn execute<Bu: Bus>(&mut self, opcode: u8, bus: &mut Bu) -> u8 {
        match opcode {
            // ADC
            0x69 => { let v = self.imm(bus); self.adc(v); 2 }
            0x65 => { let v = self.zp(bus); self.adc(v); 3 }
            0x75 => { let v = self.zpx(bus); self.adc(v); 4 }
            0x6D => { let v = self.abs(bus); self.adc(v); 4 }
            0x7D => { let (v, e) = self.abx_read(bus); self.adc(v); 4 + e }
            0x79 => { let (v, e) = self.aby_read(bus); self.adc(v); 4 + e }
            0x61 => { let v = self.izx(bus); self.adc(v); 6 }
            0x71 => { let (v, e) = self.izy_read(bus); self.adc(v); 5 + e }

            // AND
            0x29 => { let v = self.imm(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 2 }
            0x25 => { let v = self.zp(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 3 }
            0x35 => { let v = self.zpx(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 4 }
            0x2D => { let v = self.abs(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 4 }
            0x3D => { let (v, e) = self.abx_read(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 4 + e }
            0x39 => { let (v, e) = self.aby_read(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 4 + e }
            0x21 => { let v = self.izx(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 6 }
            0x31 => { let (v, e) = self.izy_read(bus); self.regs.a &= v; self.regs.p.update_nz(self.regs.a); 5 + e }

            // ASL
            0x0A => {
                self.regs.p.set_if(C, self.regs.a & 0x80 != 0);
                self.regs.a <<= 1;
                self.regs.p.update_nz(self.regs.a);
                2
            }
            0x06 => { let a = self.zp_addr(bus); self.asl_m(bus, a); 5 }
            0x16 => { let a = self.zpx_addr(bus); self.asl_m(bus, a); 6 }
            0x0E => { let a = self.abs_addr(bus); self.asl_m(bus, a); 6 }
            0x1E => { let a = self.abx_addr(bus); self.asl_m(bus, a); 7 }

            // Branches
            0x90 => { let c = !self.regs.p.is_set(C); self.branch(bus, c) }
            0xB0 => { let c = self.regs.p.is_set(C); self.branch(bus, c) }
            0xF0 => { let c = self.regs.p.is_set(Z); self.branch(bus, c) }
            0x30 => { let c = self.regs.p.is_set(N); self.branch(bus, c) }
            0xD0 => { let c = !self.regs.p.is_set(Z); self.branch(bus, c) }
            0x10 => { let c = !self.regs.p.is_set(N); self.branch(bus, c) }
            0x50 => { let c = !self.regs.p.is_set(V); self.branch(bus, c) }
            0x70 => { let c = self.regs.p.is_set(V); self.branch(bus, c) }

            // BIT
            0x24 => { let v = self.zp(bus); self.bit(v); 3 }
            0x2C => { let v = self.abs(bus); self.bit(v); 4 }

            // BRK
            0x00 => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.push16(bus, self.regs.pc);
                let p = self.regs.p.to_push_brk();
                self.push(bus, p);
                self.regs.p.set(I);
                let lo = u16::from(bus.read(IRQ_VECTOR));
                let hi = u16::from(bus.read(IRQ_VECTOR + 1));
                self.regs.pc = (hi << 8) | lo;
                7
            }

            // Flag operations
            0x18 => { self.regs.p.clear(C); 2 }
            0xD8 => { self.regs.p.clear(D); 2 }
            0x58 => { self.regs.p.clear(I); 2 }
            0xB8 => { self.regs.p.clear(V); 2 }
            0x38 => { self.regs.p.set(C); 2 }
            0xF8 => { self.regs.p.set(D); 2 }
            0x78 => { self.regs.p.set(I); 2 }

            // CMP
            0xC9 => { let v = self.imm(bus); self.cmp(self.regs.a, v); 2 }
            0xC5 => { let v = self.zp(bus); self.cmp(self.regs.a, v); 3 }
            0xD5 => { let v = self.zpx(bus); self.cmp(self.regs.a, v); 4 }
            0xCD => { let v = self.abs(bus); self.cmp(self.regs.a, v); 4 }
            0xDD => { let (v, e) = self.abx_read(bus); self.cmp(self.regs.a, v); 4 + e }
            0xD9 => { let (v, e) = self.aby_read(bus); self.cmp(self.regs.a, v); 4 + e }
            0xC1 => { let v = self.izx(bus); self.cmp(self.regs.a, v); 6 }
            0xD1 => { let (v, e) = self.izy_read(bus); self.cmp(self.regs.a, v); 5 + e }

            // CPX
            0xE0 => { let v = self.imm(bus); self.cmp(self.regs.x, v); 2 }
            0xE4 => { let v = self.zp(bus); self.cmp(self.regs.x, v); 3 }
            0xEC => { let v = self.abs(bus); self.cmp(self.regs.x, v); 4 }

            // CPY
            0xC0 => { let v = self.imm(bus); self.cmp(self.regs.y, v); 2 }
            0xC4 => { let v = self.zp(bus); self.cmp(self.regs.y, v); 3 }
            0xCC => { let v = self.abs(bus); self.cmp(self.regs.y, v); 4 }

            // DEC / DEX / DEY
            0xC6 => { let a = self.zp_addr(bus); self.dec_m(bus, a); 5 }
            0xD6 => { let a = self.zpx_addr(bus); self.dec_m(bus, a); 6 }
            0xCE => { let a = self.abs_addr(bus); self.dec_m(bus, a); 6 }
            0xDE => { let a = self.abx_addr(bus); self.dec_m(bus, a); 7 }
            0xCA => { self.regs.x = self.regs.x.wrapping_sub(1); self.regs.p.update_nz(self.regs.x); 2 }
            0x88 => { self.regs.y = self.regs.y.wrapping_sub(1); self.regs.p.update_nz(self.regs.y); 2 }

            // EOR
            0x49 => { let v = self.imm(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 2 }
            0x45 => { let v = self.zp(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 3 }
            0x55 => { let v = self.zpx(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 4 }
            0x4D => { let v = self.abs(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 4 }
            0x5D => { let (v, e) = self.abx_read(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 4 + e }
            0x59 => { let (v, e) = self.aby_read(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 4 + e }
            0x41 => { let v = self.izx(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 6 }
            0x51 => { let (v, e) = self.izy_read(bus); self.regs.a ^= v; self.regs.p.update_nz(self.regs.a); 5 + e }

            // INC / INX / INY
            0xE6 => { let a = self.zp_addr(bus); self.inc_m(bus, a); 5 }
            0xF6 => { let a = self.zpx_addr(bus); self.inc_m(bus, a); 6 }
            0xEE => { let a = self.abs_addr(bus); self.inc_m(bus, a); 6 }
            0xFE => { let a = self.abx_addr(bus); self.inc_m(bus, a); 7 }
            0xE8 => { self.regs.x = self.regs.x.wrapping_add(1); self.regs.p.update_nz(self.regs.x); 2 }
            0xC8 => { self.regs.y = self.regs.y.wrapping_add(1); self.regs.p.update_nz(self.regs.y); 2 }

            // JMP
            0x4C => { self.regs.pc = self.abs_addr(bus); 3 }
            0x6C => {
                let ptr = self.abs_addr(bus);
                self.regs.pc = self.read16_wrap(bus, ptr);
                5
            }

            // JSR
            0x20 => {
                let addr = self.abs_addr(bus);
                let ret = self.regs.pc.wrapping_sub(1);
                self.push16(bus, ret);
                self.regs.pc = addr;
                6
            }

            // LDA
            0xA9 => { self.regs.a = self.imm(bus); self.regs.p.update_nz(self.regs.a); 2 }
            0xA5 => { self.regs.a = self.zp(bus); self.regs.p.update_nz(self.regs.a); 3 }
            0xB5 => { self.regs.a = self.zpx(bus); self.regs.p.update_nz(self.regs.a); 4 }
            0xAD => { self.regs.a = self.abs(bus); self.regs.p.update_nz(self.regs.a); 4 }
            0xBD => { let (v, e) = self.abx_read(bus); self.regs.a = v; self.regs.p.update_nz(v); 4 + e }
            0xB9 => { let (v, e) = self.aby_read(bus); self.regs.a = v; self.regs.p.update_nz(v); 4 + e }
            0xA1 => { self.regs.a = self.izx(bus); self.regs.p.update_nz(self.regs.a); 6 }
            0xB1 => { let (v, e) = self.izy_read(bus); self.regs.a = v; self.regs.p.update_nz(v); 5 + e }

            // LDX
            0xA2 => { self.regs.x = self.imm(bus); self.regs.p.update_nz(self.regs.x); 2 }
            0xA6 => { self.regs.x = self.zp(bus); self.regs.p.update_nz(self.regs.x); 3 }
            0xB6 => { self.regs.x = self.zpy(bus); self.regs.p.update_nz(self.regs.x); 4 }
            0xAE => { self.regs.x = self.abs(bus); self.regs.p.update_nz(self.regs.x); 4 }
            0xBE => { let (v, e) = self.aby_read(bus); self.regs.x = v; self.regs.p.update_nz(v); 4 + e }

            // LDY
            0xA0 => { self.regs.y = self.imm(bus); self.regs.p.update_nz(self.regs.y); 2 }
            0xA4 => { self.regs.y = self.zp(bus); self.regs.p.update_nz(self.regs.y); 3 }
            0xB4 => { self.regs.y = self.zpx(bus); self.regs.p.update_nz(self.regs.y); 4 }
            0xAC => { self.regs.y = self.abs(bus); self.regs.p.update_nz(self.regs.y); 4 }
            0xBC => { let (v, e) = self.abx_read(bus); self.regs.y = v; self.regs.p.update_nz(v); 4 + e }

            // LSR
            0x4A => {
                self.regs.p.set_if(C, self.regs.a & 0x01 != 0);
                self.regs.a >>= 1;
                self.regs.p.update_nz(self.regs.a);
                2
            }
            0x46 => { let a = self.zp_addr(bus); self.lsr_m(bus, a); 5 }
            0x56 => { let a = self.zpx_addr(bus); self.lsr_m(bus, a); 6 }
            0x4E => { let a = self.abs_addr(bus); self.lsr_m(bus, a); 6 }
            0x5E => { let a = self.abx_addr(bus); self.lsr_m(bus, a); 7 }

            // NOP
            0xEA => 2,

            // ORA
            0x09 => { let v = self.imm(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 2 }
            0x05 => { let v = self.zp(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 3 }
            0x15 => { let v = self.zpx(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 4 }
            0x0D => { let v = self.abs(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 4 }
            0x1D => { let (v, e) = self.abx_read(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 4 + e }
            0x19 => { let (v, e) = self.aby_read(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 4 + e }
            0x01 => { let v = self.izx(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 6 }
            0x11 => { let (v, e) = self.izy_read(bus); self.regs.a |= v; self.regs.p.update_nz(self.regs.a); 5 + e }

            // Stack operations
            0x48 => { let a = self.regs.a; self.push(bus, a); 3 }
            0x08 => { let p = self.regs.p.to_push_brk(); self.push(bus, p); 3 }
            0x68 => { self.regs.a = self.pop(bus); self.regs.p.update_nz(self.regs.a); 4 }
            0x28 => { let v = self.pop(bus); self.regs.p = Status::from_pull(v); 4 }

            // ROL
            0x2A => {
                let carry_in = u8::from(self.regs.p.is_set(C));
                self.regs.p.set_if(C, self.regs.a & 0x80 != 0);
                self.regs.a = (self.regs.a << 1) | carry_in;
                self.regs.p.update_nz(self.regs.a);
                2
            }
            0x26 => { let a = self.zp_addr(bus); self.rol_m(bus, a); 5 }
            0x36 => { let a = self.zpx_addr(bus); self.rol_m(bus, a); 6 }
            0x2E => { let a = self.abs_addr(bus); self.rol_m(bus, a); 6 }
            0x3E => { let a = self.abx_addr(bus); self.rol_m(bus, a); 7 }

            // ROR
            0x6A => {
                let carry_in = if self.regs.p.is_set(C) { 0x80 } else { 0 };
                self.regs.p.set_if(C, self.regs.a & 0x01 != 0);
                self.regs.a = (self.regs.a >> 1) | carry_in;
                self.regs.p.update_nz(self.regs.a);
                2
            }
            0x66 => { let a = self.zp_addr(bus); self.ror_m(bus, a); 5 }
            0x76 => { let a = self.zpx_addr(bus); self.ror_m(bus, a); 6 }
            0x6E => { let a = self.abs_addr(bus); self.ror_m(bus, a); 6 }
            0x7E => { let a = self.abx_addr(bus); self.ror_m(bus, a); 7 }

            // RTI
            0x40 => {
                let p = self.pop(bus);
                self.regs.p = Status::from_pull(p);
                self.regs.pc = self.pop16(bus);
                6
            }

            // RTS
            0x60 => { self.regs.pc = self.pop16(bus).wrapping_add(1); 6 }

            // SBC ($EB is the undocumented immediate alias)
            0xE9 | 0xEB => { let v = self.imm(bus); self.sbc(v); 2 }
            0xE5 => { let v = self.zp(bus); self.sbc(v); 3 }
            0xF5 => { let v = self.zpx(bus); self.sbc(v); 4 }
            0xED => { let v = self.abs(bus); self.sbc(v); 4 }
            0xFD => { let (v, e) = self.abx_read(bus); self.sbc(v); 4 + e }
            0xF9 => { let (v, e) = self.aby_read(bus); self.sbc(v); 4 + e }
            0xE1 => { let v = self.izx(bus); self.sbc(v); 6 }
            0xF1 => { let (v, e) = self.izy_read(bus); self.sbc(v); 5 + e }

            // STA (indexed stores always pay the fixed cycle)
            0x85 => { let a = self.zp_addr(bus); bus.write(a, self.regs.a); 3 }
            0x95 => { let a = self.zpx_addr(bus); bus.write(a, self.regs.a); 4 }
            0x8D => { let a = self.abs_addr(bus); bus.write(a, self.regs.a); 4 }
            0x9D => { let a = self.abx_addr(bus); bus.write(a, self.regs.a); 5 }
            0x99 => { let a = self.aby_addr(bus); bus.write(a, self.regs.a); 5 }
            0x81 => { let a = self.izx_addr(bus); bus.write(a, self.regs.a); 6 }
            0x91 => { let a = self.izy_addr(bus); bus.write(a, self.regs.a); 6 }

            // STX
            0x86 => { let a = self.zp_addr(bus); bus.write(a, self.regs.x); 3 }
            0x96 => { let a = self.zpy_addr(bus); bus.write(a, self.regs.x); 4 }
            0x8E => { let a = self.abs_addr(bus); bus.write(a, self.regs.x); 4 }

            // STY
            0x84 => { let a = self.zp_addr(bus); bus.write(a, self.regs.y); 3 }
            0x94 => { let a = self.zpx_addr(bus); bus.write(a, self.regs.y); 4 }
            0x8C => { let a = self.abs_addr(bus); bus.write(a, self.regs.y); 4 }

            // Register transfers
            0xAA => { self.regs.x = self.regs.a; self.regs.p.update_nz(self.regs.x); 2 }
            0xA8 => { self.regs.y = self.regs.a; self.regs.p.update_nz(self.regs.y); 2 }
            0xBA => { self.regs.x = self.regs.s; self.regs.p.update_nz(self.regs.x); 2 }
            0x8A => { self.regs.a = self.regs.x; self.regs.p.update_nz(self.regs.a); 2 }
            0x9A => { self.regs.s = self.regs.x; 2 }
            0x98 => { self.regs.a = self.regs.y; self.regs.p.update_nz(self.regs.a); 2 }

            // === Undocumented opcodes used by shipped ROMs ===

            // LAX: load A and X together
            0xA7 => { let v = self.zp(bus); self.lax(v); 3 }
            0xB7 => { let v = self.zpy(bus); self.lax(v); 4 }
            0xAF => { let v = self.abs(bus); self.lax(v); 4 }
            0xBF => { let (v, e) = self.aby_read(bus); self.lax(v); 4 + e }
            0xA3 => { let v = self.izx(bus); self.lax(v); 6 }
            0xB3 => { let (v, e) = self.izy_read(bus); self.lax(v); 5 + e }

            // SAX: store A AND X
            0x87 => { let a = self.zp_addr(bus); bus.write(a, self.regs.a & self.regs.x); 3 }
            0x97 => { let a = self.zpy_addr(bus); bus.write(a, self.regs.a & self.regs.x); 4 }
            0x8F => { let a = self.abs_addr(bus); bus.write(a, self.regs.a & self.regs.x); 4 }
            0x83 => { let a = self.izx_addr(bus); bus.write(a, self.regs.a & self.regs.x); 6 }

            // DCP: DEC then CMP
            0xC7 => { let a = self.zp_addr(bus); self.dcp(bus, a); 5 }
            0xD7 => { let a = self.zpx_addr(bus); self.dcp(bus, a); 6 }
            0xCF => { let a = self.abs_addr(bus); self.dcp(bus, a); 6 }
            0xDF => { let a = self.abx_addr(bus); self.dcp(bus, a); 7 }
            0xDB => { let a = self.aby_addr(bus); self.dcp(bus, a); 7 }
            0xC3 => { let a = self.izx_addr(bus); self.dcp(bus, a); 8 }
            0xD3 => { let a = self.izy_addr(bus); self.dcp(bus, a); 8 }

            // ISB: INC then SBC
            0xE7 => { let a = self.zp_addr(bus); self.isb(bus, a); 5 }
            0xF7 => { let a = self.zpx_addr(bus); self.isb(bus, a); 6 }
            0xEF => { let a = self.abs_addr(bus); self.isb(bus, a); 6 }
            0xFF => { let a = self.abx_addr(bus); self.isb(bus, a); 7 }
            0xFB => { let a = self.aby_addr(bus); self.isb(bus, a); 7 }
            0xE3 => { let a = self.izx_addr(bus); self.isb(bus, a); 8 }
            0xF3 => { let a = self.izy_addr(bus); self.isb(bus, a); 8 }

            // SLO: ASL then ORA
            0x07 => { let a = self.zp_addr(bus); self.slo(bus, a); 5 }
            0x17 => { let a = self.zpx_addr(bus); self.slo(bus, a); 6 }
            0x0F => { let a = self.abs_addr(bus); self.slo(bus, a); 6 }
            0x1F => { let a = self.abx_addr(bus); self.slo(bus, a); 7 }
            0x1B => { let a = self.aby_addr(bus); self.slo(bus, a); 7 }
            0x03 => { let a = self.izx_addr(bus); self.slo(bus, a); 8 }
            0x13 => { let a = self.izy_addr(bus); self.slo(bus, a); 8 }

            // RLA: ROL then AND
            0x27 => { let a = self.zp_addr(bus); self.rla(bus, a); 5 }
            0x37 => { let a = self.zpx_addr(bus); self.rla(bus, a); 6 }
            0x2F => { let a = self.abs_addr(bus); self.rla(bus, a); 6 }
            0x3F => { let a = self.abx_addr(bus); self.rla(bus, a); 7 }
            0x3B => { let a = self.aby_addr(bus); self.rla(bus, a); 7 }
            0x23 => { let a = self.izx_addr(bus); self.rla(bus, a); 8 }
            0x33 => { let a = self.izy_addr(bus); self.rla(bus, a); 8 }

            // SRE: LSR then EOR
            0x47 => { let a = self.zp_addr(bus); self.sre(bus, a); 5 }
            0x57 => { let a = self.zpx_addr(bus); self.sre(bus, a); 6 }
            0x4F => { let a = self.abs_addr(bus); self.sre(bus, a); 6 }
            0x5F => { let a = self.abx_addr(bus); self.sre(bus, a); 7 }
            0x5B => { let a = self.aby_addr(bus); self.sre(bus, a); 7 }
            0x43 => { let a = self.izx_addr(bus); self.sre(bus, a); 8 }
            0x53 => { let a = self.izy_addr(bus); self.sre(bus, a); 8 }

            // RRA: ROR then ADC
            0x67 => { let a = self.zp_addr(bus); self.rra(bus, a); 5 }
            0x77 => { let a = self.zpx_addr(bus); self.rra(bus, a); 6 }
            0x6F => { let a = self.abs_addr(bus); self.rra(bus, a); 6 }
            0x7F => { let a = self.abx_addr(bus); self.rra(bus, a); 7 }
            0x7B => { let a = self.aby_addr(bus); self.rra(bus, a); 7 }
            0x63 => { let a = self.izx_addr(bus); self.rra(bus, a); 8 }
            0x73 => { let a = self.izy_addr(bus); self.rra(bus, a); 8 }

            // Multi-byte NOP variants
            0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => 2,
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                2
            }
            0x04 | 0x44 | 0x64 => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                3
            }
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                4
            }
            0x0C => {
                self.regs.pc = self.regs.pc.wrapping_add(2);
                4
            }
            0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => {
                let base = self.abs_addr(bus);
                let addr = base.wrapping_add(u16::from(self.regs.x));
                4 + u8::from((base & 0xFF00) != (addr & 0xFF00))
            }

            // Everything else: 2-cycle no-op, never fatal.
            _ => 2,
        }
    }
}

impl Cpu for Mos6502 {
    type Registers = Registers;

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_instruction_boundary(&self) -> bool {
        self.cycles_remaining == 0
    }

    fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn irq(&mut self) {
        self.irq_pending = true;
    }
}

impl Observable for Mos6502 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "a" => Some(self.regs.a.into()),
            "x" => Some(self.regs.x.into()),
            "y" => Some(self.regs.y.into()),
            "s" => Some(self.regs.s.into()),
            "pc" => Some(self.regs.pc.into()),
            "p" => Some(self.regs.p.0.into()),
            "total_cycles" => Some(self.total_cycles.into()),
            "flags.c" => Some(self.regs.p.is_set(C).into()),
            "flags.z" => Some(self.regs.p.is_set(Z).into()),
            "flags.i" => Some(self.regs.p.is_set(I).into()),
            "flags.v" => Some(self.regs.p.is_set(V).into()),
            "flags.n" => Some(self.regs.p.is_set(N).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "a",
            "x",
            "y",
            "s",
            "pc",
            "p",
            "total_cycles",
            "flags.c",
            "flags.z",
            "flags.i",
            "flags.v",
            "flags.n",
        ]
    }
}
