mod bytecode;
mod clock;
pub mod constants;
mod cpu;
mod devices;
mod error;
mod op;
mod vm;

pub use self::{
    bytecode::Instr,
    devices::{InvalidKeyCode, KeyCode},
    error::{Chip8Error, Chip8Result, Trap},
    op::Op,
    vm::Hz,
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read-only view of the display, one luminance byte per pixel in row-major order.
pub type Chip8DisplayBuffer<'a> = &'a [u8; constants::DISPLAY_BUFFER_SIZE];

pub mod prelude {
    pub use super::{
        error::{Chip8Error, Chip8Result},
        vm::{Chip8Conf, Chip8Vm, Flow, FrameReport, RunState},
        KeyCode,
    };
}
