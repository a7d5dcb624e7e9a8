//! Helpers for extracting data from opcodes.
use crate::constants::Address;

/// A single two-byte instruction split into its operand fields.
///
/// Every field is extracted regardless of the opcode family,
/// it's up to [`Op::decode`](crate::op::Op::decode) to decide
/// which of them are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    /// Original bytes as they were read from memory.
    pub bytes: [u8; 2],
    /// Opcode family identified by the first nibble.
    pub op: u8, // 0xF000
    pub vx: u8, // 0x0F00
    pub vy: u8, // 0x00F0
    pub n: u8,  // 0x000F
    pub nn: u8, // 0x00FF
    pub nnn: Address, // 0x0FFF
}

impl Instr {
    #[inline(always)]
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        let [a, b] = bytes;
        Self {
            bytes,
            op: op_code(a),
            vx: a & 0xF,
            vy: b >> 4,
            n: b & 0xF,
            nn: b,
            nnn: op_nnn(a, b),
        }
    }

    /// Original bytes encoded into a `u16`.
    #[inline(always)]
    pub fn bytecode(&self) -> u16 {
        u16::from_be_bytes(self.bytes)
    }
}

/// Extract opcode family from the first byte of an instruction.
#[inline(always)]
pub fn op_code(a: u8) -> u8 {
    (a & 0b1111_0000) >> 4
}

/// Extract the 12-bit address operand NNN.
#[inline(always)]
pub fn op_nnn(a: u8, b: u8) -> Address {
    ((a as u16 & 0b1111) << 8) | b as u16
}
