//! MOS 6502 CPU core, as found in the Ricoh 2A03.
//!
//! Instruction-granular execution: `clock()` burns one cycle per call, and
//! when the current instruction's cycles are spent it fetches, decodes and
//! executes the next one in a single call, charging its full documented
//! cycle count (plus page-cross and branch penalties). The 2A03 has no BCD
//! unit, so the D flag is ignored by ADC/SBC.

mod cpu;
mod flags;
mod registers;

pub use cpu::Mos6502;
pub use flags::Status;
pub use registers::Registers;
