//! CPU and memory state.
use crate::{bytecode::Instr, constants::*};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: Address,
    /// Stack pointer, equal to the number of return addresses on the stack.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn to, one luminance byte per pixel.
    pub(crate) display: Box<[u8; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self {
            pc: MEM_START as Address,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_state: 0,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([PIXEL_OFF; DISPLAY_BUFFER_SIZE]),
        }
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Erase the contents of the memory buffers `ram`, `stack` and `display`,
    /// and return all registers to their startup values.
    pub(crate) fn clear_memory(&mut self) {
        self.ram.fill(0);
        self.stack.fill(0);
        self.display.fill(PIXEL_OFF);

        self.pc = MEM_START as Address;
        self.sp = 0;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.key_state = 0;
    }

    pub fn clear_display(&mut self) {
        self.display.fill(PIXEL_OFF);
    }

    // ------------------------------------------------------------------------
    // Checked memory access

    /// Read a byte from memory, or `None` if the address is out of range.
    #[inline]
    pub fn read(&self, address: usize) -> Option<u8> {
        self.ram.get(address).copied()
    }

    /// Borrow a run of memory, or `None` if any part of it is out of range.
    #[inline]
    pub fn read_slice(&self, address: usize, len: usize) -> Option<&[u8]> {
        self.ram.get(address..address.checked_add(len)?)
    }

    /// Mutably borrow a run of memory, or `None` if any part of it is out of range.
    #[inline]
    pub fn write_slice(&mut self, address: usize, len: usize) -> Option<&mut [u8]> {
        self.ram.get_mut(address..address.checked_add(len)?)
    }

    /// Extract the instruction at the current program counter.
    ///
    /// `None` when the program counter runs off the end of memory.
    #[inline]
    pub fn instr(&self) -> Option<Instr> {
        let pc = self.pc as usize;
        match self.read_slice(pc, 2)? {
            [a, b] => Some(Instr::from_bytes([*a, *b])),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Stack

    /// Push a return address. Returns `false` when all levels are in use.
    #[must_use]
    pub fn push_stack(&mut self, address: Address) -> bool {
        match self.stack.get_mut(self.sp) {
            Some(slot) => {
                *slot = address;
                self.sp += 1;
                true
            }
            None => false,
        }
    }

    /// Pop the most recent return address, or `None` if the stack is empty.
    pub fn pop_stack(&mut self) -> Option<Address> {
        let sp = self.sp.checked_sub(1)?;
        self.sp = sp;
        Some(self.stack[sp])
    }

    // ------------------------------------------------------------------------
    // Keyboard

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    /// Values outside of the keypad range are never pressed.
    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = Chip8Cpu::default();

        cpu.set_key_state(0, true);
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(!cpu.key_state(7));

        cpu.set_key_state(7, true);
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(0));
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false);
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(cpu.key_state(7));

        cpu.set_key_state(15, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(cpu.key_state(15));

        // Out of range keys are ignored
        cpu.set_key_state(16, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
        assert!(!cpu.key_state(0xFF));
    }

    #[test]
    fn test_stack_bounds() {
        let mut cpu = Chip8Cpu::default();
        assert_eq!(cpu.pop_stack(), None);

        for i in 0..STACK_SIZE {
            assert!(cpu.push_stack(0x200 + i as Address * 2));
        }
        assert!(!cpu.push_stack(0xFFF));
        assert_eq!(cpu.sp, STACK_SIZE);

        assert_eq!(cpu.pop_stack(), Some(0x21E));
        assert_eq!(cpu.sp, STACK_SIZE - 1);
    }

    #[test]
    fn test_checked_memory() {
        let mut cpu = Chip8Cpu::default();
        assert_eq!(cpu.read(MEM_SIZE - 1), Some(0));
        assert_eq!(cpu.read(MEM_SIZE), None);
        assert!(cpu.read_slice(MEM_SIZE - 3, 3).is_some());
        assert!(cpu.read_slice(MEM_SIZE - 2, 3).is_none());
        assert!(cpu.write_slice(usize::MAX, 2).is_none());

        cpu.pc = (MEM_SIZE - 1) as Address;
        assert!(cpu.instr().is_none());
    }
}
