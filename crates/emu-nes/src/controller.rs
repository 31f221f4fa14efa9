//! NES controller (joypad) emulation.
//!
//! The standard pad is a parallel-load shift register read serially
//! through $4016/$4017. Writing bit 0 = 1 to $4016 holds the register in
//! strobe (continuous reload); dropping it latches the buttons. Each read
//! returns the top bit and shifts, so the program sees the buttons in the
//! order A, B, Select, Start, Up, Down, Left, Right.

use serde::{Deserialize, Serialize};

/// Button bit positions in the latched byte, A at the MSB.
pub mod button {
    pub const A: u8 = 7;
    pub const B: u8 = 6;
    pub const SELECT: u8 = 5;
    pub const START: u8 = 4;
    pub const UP: u8 = 3;
    pub const DOWN: u8 = 2;
    pub const LEFT: u8 = 1;
    pub const RIGHT: u8 = 0;
}

/// One controller port.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Controller {
    /// Live button state, one bit per button (A in bit 7).
    buttons: u8,
    /// Latched shift register.
    shift_register: u8,
    /// Strobe mode: shift register tracks the live buttons.
    strobe: bool,
}

impl Controller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one button's state (true = pressed).
    pub fn set_button(&mut self, bit: u8, pressed: bool) {
        if bit > 7 {
            return;
        }
        if pressed {
            self.buttons |= 1 << bit;
        } else {
            self.buttons &= !(1 << bit);
        }
        if self.strobe {
            self.shift_register = self.buttons;
        }
    }

    /// $4016 write: bit 0 is the strobe line.
    pub fn write(&mut self, value: u8) {
        let strobe = value & 0x01 != 0;
        if self.strobe && !strobe {
            // Falling edge latches the current buttons.
            self.shift_register = self.buttons;
        }
        self.strobe = strobe;
        if self.strobe {
            self.shift_register = self.buttons;
        }
    }

    /// $4016/$4017 read: top bit of the shift register, then shift left.
    ///
    /// After all eight bits have been shifted out, further reads return 1
    /// (the open-bus behavior programs rely on to detect the end).
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            // Strobe held: always the A button.
            return (self.buttons >> 7) & 1;
        }
        let value = (self.shift_register >> 7) & 1;
        self.shift_register = (self.shift_register << 1) | 1;
        value
    }

    /// Live button byte (A in bit 7).
    #[must_use]
    pub fn buttons(&self) -> u8 {
        self.buttons
    }

    /// Clear all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_come_out_a_first() {
        let mut pad = Controller::new();
        pad.set_button(button::A, true);
        pad.set_button(button::START, true);

        pad.write(1);
        pad.write(0);

        let bits: Vec<u8> = (0..8).map(|_| pad.read()).collect();
        assert_eq!(bits, [1, 0, 0, 1, 0, 0, 0, 0]); // A, B, Sel, Start, U, D, L, R
        // Exhausted register reads as 1.
        assert_eq!(pad.read(), 1);
        assert_eq!(pad.read(), 1);
    }

    #[test]
    fn strobe_held_always_reports_a() {
        let mut pad = Controller::new();
        pad.set_button(button::A, true);
        pad.write(1);
        assert_eq!(pad.read(), 1);
        assert_eq!(pad.read(), 1);
        pad.set_button(button::A, false);
        assert_eq!(pad.read(), 0);
    }

    #[test]
    fn latch_is_a_snapshot() {
        let mut pad = Controller::new();
        pad.set_button(button::B, true);
        pad.write(1);
        pad.write(0);
        // Releasing after the latch does not change what is read out.
        pad.set_button(button::B, false);
        assert_eq!(pad.read(), 0); // A
        assert_eq!(pad.read(), 1); // B, from the latch
    }
}
