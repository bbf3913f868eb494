//! A CHIP-8 and SUPER-CHIP interpreter.
//!
//! `VirtualMachine` executes instructions, `Executor` drives it on its own
//! thread, and `VMInterface` is what a front end uses to look at the display,
//! press keys and tick the timers while the machine runs.

pub mod emulator;
pub mod rom_config;

pub use emulator::error::Chip8Error;
pub use emulator::executor::Executor;
pub use emulator::vm::{VMInterface, VirtualMachine};
