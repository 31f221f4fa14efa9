//! Cycle-accurate NES (NTSC) emulation core.
//!
//! The master clock is counted in PPU dots: the PPU advances every tick,
//! the CPU and APU every third tick (the hardware 1:3 CPU:PPU ratio).
//! One frame is 262 scanlines of 341 dots; `Nes::run_frame` ticks until
//! the PPU signals end of frame.
//!
//! The core is a pure in-memory engine: ROM bytes in, ARGB framebuffer
//! and f32 audio samples out. No host I/O lives here apart from the
//! optional [`capture`] helpers used by tests.

mod apu;
mod bus;
pub mod capture;
mod cartridge;
mod controller;
mod error;
pub mod input;
mod mapper;
mod nes;
mod palette;
mod ppu;
mod snapshot;

pub use apu::Apu;
pub use bus::NesBus;
pub use cartridge::{Cartridge, CartridgeHeader, Mirroring};
pub use controller::Controller;
pub use error::NesError;
pub use input::{InputQueue, NesButton};
pub use mapper::{Mapper, WriteEffect};
pub use nes::Nes;
pub use ppu::{Ppu, FB_HEIGHT, FB_WIDTH};
