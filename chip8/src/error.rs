//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::Address;

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

/// Location and raw bytes of the instruction that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trap {
    /// Address the instruction was fetched from.
    pub pc: Address,
    pub instr: [u8; 2],
}

impl Display for Trap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self { pc, instr: [a, b] } = self;
        write!(f, "{a:02X}{b:02X} at 0x{pc:03X}")
    }
}

#[derive(Debug)]
pub enum Chip8Error {
    /// Instruction does not map to any known opcode.
    UnsupportedOpcode(Trap),
    /// Subroutine call while all stack levels are in use.
    StackOverflow(Trap),
    /// Subroutine return with an empty call stack.
    StackUnderflow(Trap),
    /// Instruction tried to read or write outside of VM memory.
    MemoryOutOfBounds { trap: Trap, address: usize },
    /// Fontset data has the wrong shape.
    Font(String),
}

impl Chip8Error {
    /// The faulting instruction, if this error was raised by the interpreter.
    pub fn trap(&self) -> Option<&Trap> {
        match self {
            Self::UnsupportedOpcode(trap)
            | Self::StackOverflow(trap)
            | Self::StackUnderflow(trap)
            | Self::MemoryOutOfBounds { trap, .. } => Some(trap),
            Self::Font(_) => None,
        }
    }
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOpcode(trap) => write!(f, "unsupported opcode {trap}"),
            Self::StackOverflow(trap) => write!(f, "call stack overflow: {trap}"),
            Self::StackUnderflow(trap) => write!(f, "call stack underflow: {trap}"),
            Self::MemoryOutOfBounds { trap, address } => {
                write!(f, "memory access out of bounds at 0x{address:04X}: {trap}")
            }
            Self::Font(msg) => write!(f, "font error: {msg}"),
        }
    }
}

impl std::error::Error for Chip8Error {}
