//! Virtual machine.
use std::{
    fmt::{self, Write},
    time::Duration,
};

use log::{trace, warn};
use rand::prelude::*;

use crate::{
    clock::{Clock, Timer},
    constants::*,
    cpu::Chip8Cpu,
    devices::KeyCode,
    error::{Chip8Error, Chip8Result, Trap},
    op::Op,
    Chip8DisplayBuffer,
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    /// Instruction clock, converts frame time into cycles.
    clock: Clock,
    /// Delay and sound timer countdown.
    timer: Timer,
    state: RunState,
    rng: StdRng,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(),
            clock: Clock::new(conf.clock_frequency.unwrap_or_default().0),
            timer: Timer::new(),
            state: RunState::Running,
            rng,
            conf,
        };

        // A fresh machine already has its fonts in place,
        // so a program can be poked into memory by hand.
        vm.cpu.ram[..FONTSET_DATA_LENGTH].copy_from_slice(&BUILTIN_FONT);

        vm
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Replace the font glyphs in low memory.
    ///
    /// Loading a program restores the built-in font, so custom fonts
    /// must be loaded after [`Chip8Vm::load_bytecode`].
    pub fn load_font(&mut self, fontset: &[u8]) -> Chip8Result<()> {
        if fontset.len() != FONTSET_DATA_LENGTH {
            return Err(Chip8Error::Font(format!(
                "fontset data must be {FONTSET_DATA_LENGTH} bytes, got {}",
                fontset.len()
            )));
        }

        let start = FONTSET_START as usize;
        self.cpu.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(fontset);

        Ok(())
    }

    /// Load a program image into memory at [`MEM_START`].
    ///
    /// Bytes that don't fit in memory are discarded.
    pub fn load_bytecode(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        // Start with clean memory to avoid leaking previous program.
        self.cpu.clear_memory();

        // Reset fonts
        self.load_font(&BUILTIN_FONT)?;

        let len = if bytecode.len() > MAX_PROGRAM_SIZE {
            warn!(
                "program is {} bytes, discarding everything past {MAX_PROGRAM_SIZE}",
                bytecode.len()
            );
            MAX_PROGRAM_SIZE
        } else {
            bytecode.len()
        };

        // Load program into virtual RAM
        self.cpu.ram[MEM_START..MEM_START + len].copy_from_slice(&bytecode[..len]);

        self.reset();

        Ok(())
    }

    pub fn display_buffer(&self) -> Chip8DisplayBuffer {
        &self.cpu.display
    }
}

/// Outcome of a single interpreter step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    Jump,
    /// Display buffer was changed by `CLS` or `DRW`.
    Draw,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// Whether the interpreter is executing instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Suspended by `Fx0A` until a key down event is delivered.
    /// The key value will be stored in register `vx`.
    AwaitingKey { vx: u8 },
}

/// Summary of the work done by [`Chip8Vm::run_frame`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Number of instructions executed.
    pub cycles: u64,
    /// Number of 60Hz timer ticks that elapsed.
    pub timer_ticks: u64,
    /// The display buffer changed and should be presented.
    pub redraw: bool,
    /// The VM is suspended until a key is pressed.
    pub key_wait: bool,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
pub struct Chip8Conf {
    /// Number of instructions executed per second.
    pub clock_frequency: Option<Hz>,
    /// Log every executed instruction at trace level.
    pub trace: bool,
    /// Seed for the random number generator used by `Cxnn`.
    pub seed: Option<u64>,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hz(pub u64);

impl Default for Hz {
    fn default() -> Self {
        Hz(DEFAULT_CLOCK_FREQUENCY)
    }
}

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    ///
    /// If the VM is waiting for keyboard input, a key press
    /// stores the key in the waiting register and resumes execution.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);

        if pressed {
            if let RunState::AwaitingKey { vx } = self.state {
                self.cpu.registers[vx as usize] = key.as_u8();
                self.state = RunState::Running;
            }
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    pub fn key_state(&self, key: KeyCode) -> bool {
        self.cpu.key_state(key.as_u8())
    }

    pub fn run_state(&self) -> RunState {
        self.state
    }

    #[inline]
    pub fn is_awaiting_key(&self) -> bool {
        matches!(self.state, RunState::AwaitingKey { .. })
    }

    /// The buzzer should sound while the sound timer is counting down.
    #[inline]
    pub fn sound_active(&self) -> bool {
        self.cpu.sound_timer > 0
    }

    /// Clear internal state in preparation for a fresh startup.
    fn reset(&mut self) {
        self.clock.reset();
        self.timer.reset();
        self.state = RunState::Running;
    }

    /// Run the instructions that are due in a frame of the given length,
    /// then count down the timers.
    ///
    /// Time that doesn't add up to a whole cycle is carried over to
    /// the next frame. Execution stops early when the program starts
    /// waiting for a key. Faults are fatal and stop the batch immediately.
    pub fn run_frame(&mut self, delta: Duration) -> Chip8Result<FrameReport> {
        let due = self.clock.advance(delta);
        let mut report = FrameReport::default();

        for _ in 0..due {
            if self.is_awaiting_key() {
                break;
            }

            if self.step()? == Flow::Draw {
                report.redraw = true;
            }
            report.cycles += 1;
        }

        report.timer_ticks = self.timer.advance(
            delta,
            &mut self.cpu.delay_timer,
            &mut self.cpu.sound_timer,
        );
        report.key_wait = self.is_awaiting_key();

        Ok(report)
    }

    /// Execute up to `step_count` instructions, ignoring the clock.
    ///
    /// Stops early when the VM starts waiting for a key.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.step()?;
            if flow == Flow::KeyWait {
                break;
            }
        }

        Ok(flow)
    }

    /// Count down the delay and sound timers by the elapsed time.
    pub fn tick_timers(&mut self, delta: Duration) -> u64 {
        self.timer.advance(
            delta,
            &mut self.cpu.delay_timer,
            &mut self.cpu.sound_timer,
        )
    }

    /// Fetch, decode and execute a single instruction.
    pub fn step(&mut self) -> Chip8Result<Flow> {
        if self.is_awaiting_key() {
            return Ok(Flow::KeyWait);
        }

        let pc = self.cpu.pc;

        // Each instruction is two bytes, with the opcode identity in the first 4-bit nibble.
        let instr = match self.cpu.instr() {
            Some(instr) => instr,
            None => {
                // The first unreadable byte is either the opcode itself or its operand.
                let (first, address) = match self.cpu.read(pc as usize) {
                    Some(first) => (first, pc as usize + 1),
                    None => (0, pc as usize),
                };
                return Err(Chip8Error::MemoryOutOfBounds {
                    trap: Trap {
                        pc,
                        instr: [first, 0],
                    },
                    address,
                });
            }
        };
        let trap = Trap {
            pc,
            instr: instr.bytes,
        };

        let op = Op::decode(&instr).ok_or(Chip8Error::UnsupportedOpcode(trap))?;
        self.op_trace(pc, &op);

        self.cpu.pc = pc.wrapping_add(2);

        self.exec(op, trap)
    }

    fn exec(&mut self, op: Op, trap: Trap) -> Chip8Result<Flow> {
        let mut control_flow = Flow::Ok;

        match op {
            // 00E0 (CLS)
            //
            // Clear display
            Op::ClearScreen => {
                self.cpu.clear_display();
                control_flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Subtract 1 from the stack pointer.
            // Set the program counter to the value at the top of the stack.
            Op::Return => {
                self.cpu.pc = self
                    .cpu
                    .pop_stack()
                    .ok_or(Chip8Error::StackUnderflow(trap))?;
                control_flow = Flow::Jump;
            }
            // 1NNN (JP addr)
            //
            // Jump to address.
            Op::JumpAddress { address } => {
                self.cpu.pc = address;
                control_flow = Flow::Jump;
            }
            // 2NNN (CALL addr)
            //
            // Call subroutine at NNN.
            // The return address is the instruction following the call.
            Op::Call { address } => {
                if !self.cpu.push_stack(self.cpu.pc) {
                    return Err(Chip8Error::StackOverflow(trap));
                }
                self.cpu.pc = address;
                control_flow = Flow::Jump;
            }
            // 3XNN (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            Op::Skip_Eq_Byte { vx, nn } => {
                if self.cpu.registers[vx as usize] == nn {
                    self.skip();
                }
            }
            // 4XNN (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            Op::Skip_NotEq_Byte { vx, nn } => {
                if self.cpu.registers[vx as usize] != nn {
                    self.skip();
                }
            }
            // 5XY0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals value VY.
            Op::Skip_Eq { vx, vy } => {
                if self.cpu.registers[vx as usize] == self.cpu.registers[vy as usize] {
                    self.skip();
                }
            }
            // 6XNN (LD Vx, byte)
            //
            // Set register VX to value NN.
            Op::Load_Byte { vx, nn } => {
                self.cpu.registers[vx as usize] = nn;
            }
            // 7XNN (ADD Vx, byte)
            //
            // Add value NN to register VX. Carry flag is not set.
            Op::Add_Byte { vx, nn } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x.wrapping_add(nn);
            }
            // 8XY0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            Op::Load_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] = self.cpu.registers[vy as usize];
            }
            // 8XY1 (OR Vx, Vy)
            Op::Or_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] |= self.cpu.registers[vy as usize];
            }
            // 8XY2 (AND Vx, Vy)
            Op::And_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] &= self.cpu.registers[vy as usize];
            }
            // 8XY3 (XOR Vx, Vy)
            Op::Xor_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] ^= self.cpu.registers[vy as usize];
            }
            // 8XY4 (ADD Vx, Vy)
            //
            // ADDs VY to VX, and stores the result in VX.
            // Overflow is wrapped.
            // If overflow, set VF to 1, else 0.
            Op::Add_Vx_Vy { vx, vy } => {
                // VF is written before the sum, so a VF operand reads the new flag.
                let registers = &mut self.cpu.registers;
                registers[FLAG_REGISTER] = registers[vx as usize]
                    .checked_add(registers[vy as usize])
                    .is_none() as u8;
                registers[vx as usize] =
                    registers[vx as usize].wrapping_add(registers[vy as usize]);
            }
            // 8XY5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 1 when there is a borrow, set to 0 when there isn't.
            Op::Sub_Vx_Vy { vx, vy } => {
                let registers = &mut self.cpu.registers;
                registers[FLAG_REGISTER] = (registers[vx as usize] < registers[vy as usize]) as u8;
                registers[vx as usize] =
                    registers[vx as usize].wrapping_sub(registers[vy as usize]);
            }
            // 8XY6 (SHR Vx, Vy)
            //
            // The least-significant bit of VY goes to VF.
            // Store VY shifted right by 1 in VX.
            Op::ShiftRight { vx, vy } => {
                let registers = &mut self.cpu.registers;
                registers[FLAG_REGISTER] = registers[vy as usize] & 1;
                registers[vx as usize] = registers[vy as usize] >> 1;
            }
            // 8XY7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 1 when there is a borrow, set to 0 when there isn't.
            Op::SubReverse_Vx_Vy { vx, vy } => {
                let registers = &mut self.cpu.registers;
                registers[FLAG_REGISTER] = (registers[vx as usize] > registers[vy as usize]) as u8;
                registers[vx as usize] =
                    registers[vy as usize].wrapping_sub(registers[vx as usize]);
            }
            // 8XYE (SHL Vx, Vy)
            //
            // The most-significant bit of VY goes to VF.
            // Store VY shifted left by 1 in VX.
            Op::ShiftLeft { vx, vy } => {
                let registers = &mut self.cpu.registers;
                registers[FLAG_REGISTER] = registers[vy as usize] >> 7;
                registers[vx as usize] = registers[vy as usize] << 1;
            }
            // 9XY0 (SNE Vx, Vy)
            //
            // Skip next instruction if Vx != Vy.
            Op::Skip_NotEq { vx, vy } => {
                if self.cpu.registers[vx as usize] != self.cpu.registers[vy as usize] {
                    self.skip();
                }
            }
            // ANNN (LD I, addr)
            //
            // Set address register I to value NNN.
            Op::Load_Address { address } => {
                self.cpu.address = address;
            }
            // CXNN (RND Vx, byte)
            //
            // Generate random number.
            // Set register VX to the result of bitwise AND between a random number and NN.
            Op::Random { vx, nn } => {
                self.cpu.registers[vx as usize] = nn & self.rng.gen::<u8>();
            }
            // DXYN (DRW Vx, Vy, nibble)
            Op::Draw { vx, vy, n } => {
                self.exec_draw(vx, vy, n, trap)?;
                control_flow = Flow::Draw;
            }
            // ----------------------------------------------------------------
            // Ex9E (SKP Vx)
            Op::Skip_Key { vx } => {
                if self.cpu.key_state(self.cpu.registers[vx as usize]) {
                    self.skip();
                }
            }
            // ExA1 (SKNP Vx)
            Op::Skip_NotKey { vx } => {
                if !self.cpu.key_state(self.cpu.registers[vx as usize]) {
                    self.skip();
                }
            }
            // ----------------------------------------------------------------
            // Fx07 (LD Vx, DT)
            //
            // Set Vx = delay timer value.
            Op::Load_Vx_Delay { vx } => {
                self.cpu.registers[vx as usize] = self.cpu.delay_timer;
            }
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // All execution stops until a key is pressed, then the value of that key is stored in Vx.
            // The program counter has already moved past this instruction,
            // so execution resumes at the next one.
            Op::Load_Vx_Key { vx } => {
                self.state = RunState::AwaitingKey { vx };
                control_flow = Flow::KeyWait;
            }
            // Fx15 (LD DT, Vx)
            //
            // Set delay timer = Vx.
            Op::Load_Delay_Vx { vx } => {
                self.cpu.delay_timer = self.cpu.registers[vx as usize];
            }
            // Fx18 (LD ST, Vx)
            //
            // Set sound timer = Vx.
            Op::Load_Sound_Vx { vx } => {
                self.cpu.sound_timer = self.cpu.registers[vx as usize];
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to I
            Op::Add_Address_Vx { vx } => {
                let x = self.cpu.registers[vx as usize] as u16;
                self.cpu.address = self.cpu.address.wrapping_add(x);
            }
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            Op::Load_Font { vx } => {
                let digit = (self.cpu.registers[vx as usize] & 0xF) as u16;
                self.cpu.address = FONTSET_START + digit * FONTSET_HEIGHT as u16;
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            Op::Load_Bcd { vx } => {
                let x = self.cpu.registers[vx as usize];
                let addr = self.cpu.address as usize;
                let out = self.cpu.write_slice(addr, 3).ok_or(
                    Chip8Error::MemoryOutOfBounds {
                        trap,
                        address: addr + 2,
                    },
                )?;
                out.copy_from_slice(&[x / 100, x / 10 % 10, x % 10]);
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            // I is left pointing past the last stored byte.
            Op::Store_Registers { vx } => {
                let count = vx as usize + 1;
                let addr = self.cpu.address as usize;
                let values = self.cpu.registers;
                let out = self.cpu.write_slice(addr, count).ok_or(
                    Chip8Error::MemoryOutOfBounds {
                        trap,
                        address: addr + count - 1,
                    },
                )?;
                out.copy_from_slice(&values[..count]);
                self.cpu.address = self.cpu.address.wrapping_add(count as u16);
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            // I is left pointing past the last loaded byte.
            Op::Load_Registers { vx } => {
                let count = vx as usize + 1;
                let addr = self.cpu.address as usize;
                let values = self.cpu.read_slice(addr, count).ok_or(
                    Chip8Error::MemoryOutOfBounds {
                        trap,
                        address: addr + count - 1,
                    },
                )?;
                let mut buf = [0u8; REGISTER_COUNT];
                buf[..count].copy_from_slice(values);
                self.cpu.registers[..count].copy_from_slice(&buf[..count]);
                self.cpu.address = self.cpu.address.wrapping_add(count as u16);
            }
        }

        Ok(control_flow)
    }

    /// Advance the program counter past the next instruction.
    #[inline]
    fn skip(&mut self) {
        self.cpu.pc = self.cpu.pc.wrapping_add(2);
    }

    /// Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
    ///
    /// Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
    /// memory pointed to by address register I.
    ///
    /// Only the origin wraps around the display. Pixels that fall past the right
    /// or bottom edge are clipped.
    ///
    /// If the drawing operation erases existing pixels in the display buffer, register VF is set to
    /// 1, and set to 0 if no display bits are unset. This is used for collision detection.
    fn exec_draw(&mut self, vx: u8, vy: u8, n: u8, trap: Trap) -> Chip8Result<()> {
        let x0 = self.cpu.registers[vx as usize] as usize % DISPLAY_WIDTH;
        let y0 = self.cpu.registers[vy as usize] as usize % DISPLAY_HEIGHT;

        let addr = self.cpu.address as usize;
        let height = n as usize;
        let mut sprite = [0u8; 0xF];
        sprite[..height].copy_from_slice(self.cpu.read_slice(addr, height).ok_or(
            Chip8Error::MemoryOutOfBounds {
                trap,
                address: addr + height.saturating_sub(1),
            },
        )?);

        let mut is_erased = false;

        for (r, row) in sprite[..height].iter().enumerate() {
            let y = y0 + r;
            if y >= DISPLAY_HEIGHT {
                break;
            }

            // Each row is 8 bits representing the 8 pixels of the sprite.
            for c in 0..8 {
                let x = x0 + c;
                if x >= DISPLAY_WIDTH {
                    break;
                }

                if (row >> (7 - c)) & 1 == 0 {
                    continue;
                }

                let d = x + y * DISPLAY_WIDTH;
                let old_px = self.cpu.display[d];

                // XOR erases a pixel when both the old and new values are lit.
                is_erased |= old_px == PIXEL_ON;

                self.cpu.display[d] = old_px ^ PIXEL_ON;
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.registers[FLAG_REGISTER] = is_erased as u8;

        Ok(())
    }

    #[inline]
    fn op_trace(&self, pc: Address, op: &Op) {
        if self.conf.trace {
            trace!("{pc:04X}: {op}");
        }
    }
}

/// Inspection
impl Chip8Vm {
    #[inline]
    pub fn pc(&self) -> Address {
        self.cpu.pc
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.cpu.address
    }

    #[inline]
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    /// Number of return addresses on the call stack.
    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.cpu.sp
    }

    #[inline]
    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    #[inline]
    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    #[inline]
    pub fn memory(&self) -> &[u8] {
        &self.cpu.ram[..]
    }
}

/// Troubleshooting
impl Chip8Vm {
    /// Returns the contents of the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            let next = self.cpu.read(i + 1).unwrap_or(0);
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, next)?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for row in self.cpu.display.chunks(DISPLAY_WIDTH) {
            for px in row {
                if *px == PIXEL_OFF {
                    write!(buf, ".")?;
                } else {
                    write!(buf, "#")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.cpu.any_key() {
            write!(buf, "keys: ")?;
            for i in 0..KEY_COUNT {
                if self.cpu.key_state(i) {
                    write!(buf, "k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }

    /// Returns the registers, pointers and timers as a human readable string.
    pub fn dump_registers(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for (i, v) in self.cpu.registers.iter().enumerate() {
            write!(buf, "v{i:X}: {v:02X} ")?;
            if i % 8 == 7 {
                writeln!(buf)?;
            }
        }
        writeln!(
            buf,
            "I: {:04X} PC: {:04X} SP: {} DT: {} ST: {}",
            self.cpu.address, self.cpu.pc, self.cpu.sp, self.cpu.delay_timer, self.cpu.sound_timer
        )?;

        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vm_with(program: &[u8]) -> Chip8Vm {
        let mut vm = Chip8Vm::new(Chip8Conf {
            seed: Some(8),
            ..Chip8Conf::default()
        });
        vm.load_bytecode(program).unwrap();
        vm
    }

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);
        assert_eq!(Hz::default(), Hz(1000));
    }

    /// Booleans must be cast to u8 1 or 0
    #[test]
    fn test_assert_bool_cast() {
        assert_eq!(true as u8, 1);
        assert_eq!(false as u8, 0);
    }

    #[test]
    fn test_startup_state() {
        let vm = Chip8Vm::new(Chip8Conf::default());
        assert_eq!(vm.pc(), 0x200);
        assert_eq!(&vm.memory()[..FONTSET_DATA_LENGTH], &BUILTIN_FONT[..]);
        assert!(vm.memory()[MEM_START..].iter().all(|b| *b == 0));
        assert_eq!(vm.run_state(), RunState::Running);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The VM must stall while waiting, and signal the state to the outer executer.
    #[test]
    #[rustfmt::skip]
    fn test_key_wait() {
        let mut vm = vm_with(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42  // LD v2, 0x42  ; sentinal
        ]);

        assert_eq!(vm.step().unwrap(), Flow::KeyWait);
        assert_eq!(vm.run_state(), RunState::AwaitingKey { vx: 1 });

        // machine must stall
        for _ in 0..5 {
            assert_eq!(vm.step().unwrap(), Flow::KeyWait);
            assert_eq!(vm.cpu.pc as usize, MEM_START + 2);
            assert_eq!(vm.cpu.registers[2], 0);
        }

        // Releasing a key is not a key press.
        vm.set_key(KeyCode::Key9, false);
        assert!(vm.is_awaiting_key());

        // machine has yielded, waiting for any key to be pressed.
        vm.set_key(KeyCode::Key5, true);
        assert_eq!(vm.run_state(), RunState::Running);
        assert!(vm.key_state(KeyCode::Key5));
        assert_eq!(vm.cpu.registers[1], 0x05);

        // Ensure the machine is continuing
        vm.step().unwrap();
        assert_eq!(vm.cpu.pc as usize, MEM_START + 4);
        assert_eq!(vm.cpu.registers[2], 0x42); // sentinal
    }

    #[test]
    fn test_frame_stops_on_key_wait() {
        let mut vm = vm_with(&[
            0x60, 0x01, // LD v0, 1
            0xF3, 0x0A, // LD v3, K
            0x61, 0x02, // LD v1, 2
        ]);

        // 10 cycles are due, but only 2 can run.
        let report = vm.run_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(report.cycles, 2);
        assert!(report.key_wait);
        assert_eq!(vm.cpu.registers[1], 0);

        let report = vm.run_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(report.cycles, 0);

        vm.set_key(KeyCode::KeyE, true);
        let report = vm.run_frame(Duration::from_millis(1)).unwrap();
        assert_eq!(report.cycles, 1);
        assert!(!report.key_wait);
        assert_eq!(vm.cpu.registers[3], 0xE);
        assert_eq!(vm.cpu.registers[1], 2);
    }

    #[test]
    fn test_frame_carries_fractional_cycles() {
        // Infinite loop
        let mut vm = vm_with(&[0x12, 0x00]);

        let cycles: u64 = (0..3)
            .map(|_| vm.run_frame(Duration::from_micros(1500)).unwrap().cycles)
            .sum();

        // 4.5ms at 1000Hz
        assert_eq!(cycles, 4);
        assert_eq!(vm.clock.remainder(), Duration::from_micros(500));
    }

    #[test]
    fn test_frame_counts_down_timers() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x78, // LD v0, 120
            0xF0, 0x15, // LD DT, v0
            0xF0, 0x18, // LD ST, v0
            0x12, 0x06, // JP 0x206
        ]);

        let report = vm.run_frame(Duration::from_millis(500)).unwrap();
        assert_eq!(report.cycles, 500);
        assert_eq!(report.timer_ticks, 30);
        assert_eq!(vm.delay_timer(), 90);
        assert_eq!(vm.sound_timer(), 90);
        assert!(vm.sound_active());
    }

    #[test]
    fn test_frame_stops_on_fault() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x01, // LD v0, 1
            0xFF, 0xFF, // ???
            0x61, 0x01, // LD v1, 1
        ]);

        let err = vm.run_frame(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, Chip8Error::UnsupportedOpcode(Trap { pc: 0x202, instr: [0xFF, 0xFF] })));
        assert_eq!(vm.cpu.registers[0], 1);
        assert_eq!(vm.cpu.registers[1], 0);
    }

    #[test]
    fn test_draw_collision() {
        // Draw two pixels next to each other.
        // The zero bits of the second draw must not erase
        // the pixels of the first draw
        //
        // draw sprite 1
        // ____####, vf == 0
        //
        // draw sprite 2
        // ########, vf == 0
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0xA2, 0x0C, // LD I, .sprite
            0x60, 0x04, // LD v0, 4
            0x61, 0x00, // LD v1, 0
            0xD0, 0x11, // DRW v0, v1, 1
            0x60, 0x00, // LD v0, 0
            0xD0, 0x11, // DRW v0, v1, 1
            // .sprite
            0b11110000,
            0b00000000,
        ]);

        vm.run_steps(6).unwrap();

        assert_eq!(&vm.display_buffer()[0..8], &[PIXEL_ON; 8]);
        assert_eq!(vm.display_buffer()[8], PIXEL_OFF);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_draw_twice_erases() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x0A, // LD v0, 0xA
            0xF0, 0x29, // LD F, v0
            0x61, 0x3E, // LD v1, 62
            0x62, 0x03, // LD v2, 3
            0xD1, 0x25, // DRW v1, v2, 5
            0xD1, 0x25, // DRW v1, v2, 5
        ]);

        vm.run_steps(5).unwrap();
        let first = vm.display_buffer().clone();
        assert_eq!(vm.cpu.registers[0xF], 0);
        assert!(first.iter().any(|px| *px == PIXEL_ON));

        vm.step().unwrap();
        assert_eq!(vm.cpu.registers[0xF], 1);
        assert!(vm.display_buffer().iter().all(|px| *px == PIXEL_OFF));
    }

    #[test]
    fn test_draw_clips_edges() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0xA2, 0x0A, // LD I, .sprite
            0x60, 0x7E, // LD v0, 126  ; wraps to 62
            0x61, 0x3F, // LD v1, 63   ; wraps to 31
            0xD0, 0x12, // DRW v0, v1, 2
            0x00, 0x00,
            // .sprite
            0xFF, 0xFF,
        ]);

        vm.run_steps(4).unwrap();

        let lit: Vec<usize> = vm
            .display_buffer()
            .iter()
            .enumerate()
            .filter(|(_, px)| **px == PIXEL_ON)
            .map(|(i, _)| i)
            .collect();

        // Only the two pixels in the bottom right corner are drawn.
        assert_eq!(lit, vec![31 * DISPLAY_WIDTH + 62, 31 * DISPLAY_WIDTH + 63]);
    }

    #[test]
    fn test_draw_reads_past_memory() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0xAF, 0xFE, // LD I, 0xFFE
            0xD0, 0x03, // DRW v0, v0, 3
        ]);

        vm.step().unwrap();
        let err = vm.step().unwrap_err();
        assert!(matches!(err, Chip8Error::MemoryOutOfBounds { address: 0x1000, .. }));
    }

    #[test]
    fn test_shift_uses_vy() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0xFF, // LD v0, 0xFF
            0x61, 0x81, // LD v1, 0x81
            0x80, 0x16, // SHR v0, v1
            0x82, 0x1E, // SHL v2, v1
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0], 0x40);
        assert_eq!(vm.cpu.registers[0xF], 1);

        vm.step().unwrap();
        assert_eq!(vm.cpu.registers[2], 0x02);
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    fn test_flag_register_as_target() {
        // The flag is written first, then the sum reads the new VF.
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x6F, 0xF0, // LD vF, 0xF0
            0x61, 0x20, // LD v1, 0x20
            0x8F, 0x14, // ADD vF, v1  ; carry, then 1 + 0x20
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0xF], 0x21);
    }

    #[test]
    fn test_flag_register_as_source() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0xFF, // LD v0, 0xFF
            0x6F, 0x02, // LD vF, 2
            0x80, 0xF4, // ADD v0, vF  ; carry, then 0xFF + 1
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0x0], 0x00);
        assert_eq!(vm.cpu.registers[0xF], 1);

        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x6F, 0x03, // LD vF, 3
            0x80, 0xF6, // SHR v0, vF  ; flag 1, then 1 >> 1
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0x0], 0x00);
        assert_eq!(vm.cpu.registers[0xF], 1);

        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x10, // LD v0, 0x10
            0x6F, 0x20, // LD vF, 0x20
            0x80, 0xF5, // SUB v0, vF  ; borrow, then 0x10 - 1
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0x0], 0x0F);
        assert_eq!(vm.cpu.registers[0xF], 1);

        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x05, // LD v0, 5
            0x6F, 0x80, // LD vF, 0x80
            0x80, 0xF7, // SUBN v0, vF  ; no borrow, then 0 - 5
            0x61, 0x81, // LD v1, 0x81
            0x8F, 0x1E, // SHL vF, v1  ; flag 1, then 0x81 << 1
        ]);
        vm.run_steps(5).unwrap();
        assert_eq!(vm.cpu.registers[0x0], 0xFB);
        assert_eq!(vm.cpu.registers[0xF], 0x02);
    }

    #[test]
    fn test_subtract_flags() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x05, // LD v0, 5
            0x61, 0x07, // LD v1, 7
            0x82, 0x00, // LD v2, v0
            0x82, 0x17, // SUBN v2, v1  ; 7 - 5
            0x83, 0x10, // LD v3, v1
            0x83, 0x07, // SUBN v3, v0  ; 5 - 7
        ]);

        vm.run_steps(4).unwrap();
        assert_eq!(vm.cpu.registers[2], 2);
        assert_eq!(vm.cpu.registers[0xF], 0);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[3], 0xFE);
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    fn test_bcd() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x9D, // LD v0, 157
            0xA3, 0x00, // LD I, 0x300
            0xF0, 0x33, // LD B, v0
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(&vm.memory()[0x300..0x303], &[1, 5, 7]);
        assert_eq!(vm.address(), 0x300);
    }

    #[test]
    fn test_register_block_copy() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x11, // LD v0, 0x11
            0x61, 0x22, // LD v1, 0x22
            0x62, 0x33, // LD v2, 0x33
            0xA3, 0x00, // LD I, 0x300
            0xF2, 0x55, // LD [I], v2
            0xA3, 0x01, // LD I, 0x301
            0xF1, 0x65, // LD v1, [I]
        ]);

        vm.run_steps(5).unwrap();
        assert_eq!(&vm.memory()[0x300..0x304], &[0x11, 0x22, 0x33, 0x00]);
        assert_eq!(vm.address(), 0x303);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0], 0x22);
        assert_eq!(vm.cpu.registers[1], 0x33);
        assert_eq!(vm.cpu.registers[2], 0x33);
        assert_eq!(vm.address(), 0x303);
    }

    #[test]
    fn test_font_address() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x0F, // LD v0, 0xF
            0xF0, 0x29, // LD F, v0
        ]);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.address(), 0xF * 5);
        assert_eq!(
            &vm.memory()[vm.address() as usize..vm.address() as usize + 5],
            &[0xF0, 0x80, 0xF0, 0x80, 0x80]
        );
    }

    #[test]
    fn test_add_address_wraps() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0xFF, // LD v0, 0xFF
            0xAF, 0xFF, // LD I, 0xFFF
            0xF0, 0x1E, // ADD I, v0
        ]);

        vm.run_steps(3).unwrap();
        assert_eq!(vm.address(), 0x10FE);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_skip_key() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0x60, 0x0C, // LD v0, 0xC
            0xE0, 0x9E, // SKP v0
            0x61, 0x01, // LD v1, 1
            0xE0, 0xA1, // SKNP v0
            0x62, 0x01, // LD v2, 1
        ]);

        vm.set_key(KeyCode::KeyC, true);
        vm.run_steps(4).unwrap();
        assert_eq!(vm.cpu.registers[1], 0);
        assert_eq!(vm.cpu.registers[2], 1);
        assert_eq!(vm.cpu.pc, 0x20A);
    }

    #[test]
    fn test_random_mask() {
        #[rustfmt::skip]
        let mut vm = vm_with(&[
            0xC0, 0x0F, // RND v0, 0x0F
            0xC1, 0x00, // RND v1, 0
        ]);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0] & 0xF0, 0);
        assert_eq!(vm.cpu.registers[1], 0);
    }

    #[test]
    fn test_load_truncates_large_program() {
        let program = vec![0xAB; MAX_PROGRAM_SIZE + 100];
        let vm = vm_with(&program);
        assert_eq!(vm.memory().len(), MEM_SIZE);
        assert_eq!(vm.memory()[MEM_SIZE - 1], 0xAB);
    }

    #[test]
    fn test_reload_resets_state() {
        let mut vm = vm_with(&[0x60, 0x01, 0xF0, 0x0A]);
        vm.run_steps(2).unwrap();
        assert!(vm.is_awaiting_key());

        vm.load_bytecode(&[0x00, 0xE0]).unwrap();
        assert_eq!(vm.run_state(), RunState::Running);
        assert_eq!(vm.pc(), 0x200);
        assert_eq!(vm.registers(), &[0; REGISTER_COUNT]);
        assert_eq!(vm.memory()[0x202], 0);
    }

    #[test]
    fn test_custom_font() {
        let mut vm = vm_with(&[]);
        assert!(matches!(vm.load_font(&[0; 10]), Err(Chip8Error::Font(_))));

        vm.load_font(&[0xAA; FONTSET_DATA_LENGTH]).unwrap();
        assert!(vm.memory()[..FONTSET_DATA_LENGTH].iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn test_every_opcode_executes() {
        #[rustfmt::skip]
        let cases = [
            (0x00E0, Flow::Draw), (0x1208, Flow::Jump), (0x2300, Flow::Jump),
            (0x3001, Flow::Ok), (0x4001, Flow::Ok), (0x5010, Flow::Ok), (0x6012, Flow::Ok),
            (0x7012, Flow::Ok), (0x8010, Flow::Ok), (0x8011, Flow::Ok), (0x8012, Flow::Ok),
            (0x8013, Flow::Ok), (0x8014, Flow::Ok), (0x8015, Flow::Ok), (0x8016, Flow::Ok),
            (0x8017, Flow::Ok), (0x801E, Flow::Ok), (0x9010, Flow::Ok), (0xA300, Flow::Ok),
            (0xC0FF, Flow::Ok), (0xD015, Flow::Draw), (0xE09E, Flow::Ok), (0xE0A1, Flow::Ok),
            (0xF007, Flow::Ok), (0xF00A, Flow::KeyWait), (0xF015, Flow::Ok), (0xF018, Flow::Ok),
            (0xF01E, Flow::Ok), (0xF029, Flow::Ok), (0xF033, Flow::Ok), (0xF055, Flow::Ok),
            (0xF065, Flow::Ok),
        ];

        for (code, expected) in cases {
            let [hi, lo] = u16::to_be_bytes(code);
            // LD I, 0x300 keeps memory instructions in range.
            let mut vm = vm_with(&[0xA3, 0x00, hi, lo]);
            vm.step().unwrap();
            let flow = vm
                .step()
                .unwrap_or_else(|err| panic!("{code:04X} failed: {err}"));
            assert_eq!(flow, expected, "{code:04X}");
        }
    }

    #[test]
    fn test_fetch_past_memory() {
        let mut vm = vm_with(&[0x1F, 0xFF]); // JP 0xFFF
        vm.step().unwrap();
        let err = vm.step().unwrap_err();
        assert!(matches!(
            err,
            Chip8Error::MemoryOutOfBounds {
                trap: Trap { pc: 0xFFF, .. },
                address: 0x1000
            }
        ));
    }

    #[test]
    fn test_fetch_outside_memory() {
        let mut vm = vm_with(&[0x1F, 0xFE]); // JP 0xFFE
        vm.cpu.ram[0xFFE..].copy_from_slice(&[0x30, 0x00]); // SE v0, 0
        vm.run_steps(2).unwrap();
        assert_eq!(vm.pc(), 0x1002);

        let err = vm.step().unwrap_err();
        assert!(matches!(
            err,
            Chip8Error::MemoryOutOfBounds {
                trap: Trap {
                    pc: 0x1002,
                    instr: [0, 0]
                },
                address: 0x1002
            }
        ));
    }

    #[test]
    fn test_dumps() {
        let mut vm = vm_with(&[0x6A, 0x42]);
        vm.step().unwrap();

        let regs = vm.dump_registers().unwrap();
        assert!(regs.contains("vA: 42"));
        assert!(regs.contains("PC: 0202"));

        assert_eq!(vm.dump_ram(2).unwrap(), "0200: 6A42\n");

        let display = vm.dump_display().unwrap();
        assert_eq!(display.lines().count(), DISPLAY_HEIGHT);
        assert!(display.lines().all(|l| l.len() == DISPLAY_WIDTH));

        assert_eq!(vm.dump_keys().unwrap(), "");
        vm.set_key(KeyCode::Key3, true);
        assert_eq!(vm.dump_keys().unwrap(), "keys: k3");
    }
}
