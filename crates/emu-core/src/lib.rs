//! Core traits and types for cycle-accurate emulation.
//!
//! Everything in the machine advances in lock-step with the master clock.
//! Components implement [`Tickable`]; CPUs additionally implement [`Cpu`]
//! and talk to the rest of the machine through a [`Bus`].

mod bus;
mod cpu;
mod observable;
mod tickable;

pub use bus::{Bus, SimpleBus};
pub use cpu::Cpu;
pub use observable::{Observable, Value};
pub use tickable::Tickable;
