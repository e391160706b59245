//! [Emulator] for executing bytecode.
//!
//! The emulator is generic over its [Memory] and [InputOutput] buses, so the same core
//! runs against a flat 64 KiB array, a test harness or a [port bridge](crate::io_bridge).

use slog::{debug, error, o, trace, Discard, Logger};

use std::collections::VecDeque;
use std::fmt;
use std::io::{Read, Write};

use crate::instruction::{Instruction, InvalidOpcode, Opcode, Register};

/// Port used by [StdIo] for character input and output.
pub const CONSOLE_PORT: u16 = 0x0A;

/// Contains the execution environment of the processor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    /// Address of the next instruction to be executed.
    pub pc: u16,

    /// Values of the sixteen registers, indexed by [Register::index].
    pub r: [u16; 16],

    pub interrupts_enabled: bool,

    /// Instruction word of a requested interrupt that has not been dispatched yet.
    pub pending_interrupt: Option<u16>,
}

/// Byte addressable memory of the emulated machine.
///
/// Addresses wrap around at 0x10000.
pub trait Memory {
    fn read(&mut self, address: u16) -> u8;

    fn write(&mut self, address: u16, value: u8);

    /// Reads a big-endian word.
    fn read_word(&mut self, address: u16) -> u16 {
        let high = self.read(address);
        let low = self.read(address.wrapping_add(1));
        u16::from_be_bytes([high, low])
    }

    /// Writes a big-endian word.
    fn write_word(&mut self, address: u16, value: u16) {
        let [high, low] = value.to_be_bytes();
        self.write(address, high);
        self.write(address.wrapping_add(1), low);
    }
}

impl<T: Memory + ?Sized> Memory for &mut T {
    fn read(&mut self, address: u16) -> u8 {
        (**self).read(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        (**self).write(address, value)
    }
}

/// Interface to the input and output devices.
pub trait InputOutput {
    /// Called when an IN or INI instruction is executed.
    ///
    /// # Parameters
    /// - `port`: The port number given by the instruction.
    ///
    /// # Returns
    /// A value received from the device behind the port.
    fn input(&mut self, port: u16) -> u16;

    /// Called when an OUT or OUTI instruction is executed.
    ///
    /// # Parameters
    /// - `port`: The port number given by the instruction.
    /// - `data`: The value of the register given by the instruction.
    fn output(&mut self, port: u16, data: u16);
}

impl<T: InputOutput + ?Sized> InputOutput for &mut T {
    fn input(&mut self, port: u16) -> u16 {
        (**self).input(port)
    }

    fn output(&mut self, port: u16, data: u16) {
        (**self).output(port, data)
    }
}

/// Error that stops the execution. The emulator is halted when one is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    /// The word fetched from `address` is not an instruction.
    InvalidOpcode {
        word: u16,
        address: u16,
    },

    /// MOD or MODI at `address` had zero as its divisor.
    DivideByZero {
        address: u16,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutionError::InvalidOpcode { word, address } =>
                write!(f, "invalid opcode 0x{:04X} at address 0x{:04X}", word, address),
            ExecutionError::DivideByZero { address } =>
                write!(f, "division by zero at address 0x{:04X}", address),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Utility struct for implementing methods in the context of emulating a single instruction.
struct InstructionEmulationContext<'e, 'i, M, IO> {
    /// The emulator in whose context the instruction is being emulated.
    emulator: &'e mut Emulator<M, IO>,

    /// The instruction that we are currently emulating.
    instruction: &'i Instruction,

    /// Address the instruction was fetched from.
    address: u16,
}

impl<'e, 'i, M, IO> InstructionEmulationContext<'e, 'i, M, IO>
    where M: Memory,
          IO: InputOutput,
{
    fn index_a(&self) -> usize {
        self.instruction.register_a.map(Register::index).unwrap_or(0)
    }

    fn index_b(&self) -> usize {
        self.instruction.register_b.map(Register::index).unwrap_or(0)
    }

    fn a(&self) -> u16 {
        self.emulator.context.r[self.index_a()]
    }

    fn set_a(&mut self, value: u16) {
        let index = self.index_a();
        self.emulator.context.r[index] = value;
    }

    fn b(&self) -> u16 {
        self.emulator.context.r[self.index_b()]
    }

    fn set_b(&mut self, value: u16) {
        let index = self.index_b();
        self.emulator.context.r[index] = value;
    }

    fn immediate(&self) -> u16 {
        self.instruction.immediate.unwrap_or(0)
    }

    fn jump(&mut self, target: u16) {
        self.emulator.context.pc = target;
    }

    fn ret(&mut self) {
        let target = self.emulator.pop();
        self.jump(target);
    }

    fn call(&mut self, target: u16) {
        let pc = self.emulator.context.pc;
        self.emulator.push(pc);
        self.jump(target);
    }

    fn arithmetic(&self, left: u16, right: u16) -> Result<u16, ExecutionError> {
        let value = match self.instruction.opcode {
            Opcode::Add | Opcode::AddI => left.wrapping_add(right),
            Opcode::Sub | Opcode::SubI => left.wrapping_sub(right),
            Opcode::Mul | Opcode::MulI => left.wrapping_mul(right),
            Opcode::Mod | Opcode::ModI => left.checked_rem(right)
                .ok_or(ExecutionError::DivideByZero { address: self.address })?,
            Opcode::And | Opcode::AndI => left & right,
            Opcode::Or | Opcode::OrI => left | right,
            Opcode::Xor | Opcode::XorI => left ^ right,
            Opcode::Shl | Opcode::ShlI | Opcode::Shal => left.checked_shl(right as u32).unwrap_or(0),
            Opcode::Shr | Opcode::ShrI => left.checked_shr(right as u32).unwrap_or(0),
            Opcode::Shar => ((left as i16) >> right.min(15)) as u16,
            _ => left,
        };

        Ok(value)
    }

    /// Evaluates the condition of a two register branch or return.
    fn compare(&self) -> bool {
        let (a, b) = (self.a(), self.b());
        let (signed_a, signed_b) = (a as i16, b as i16);

        match self.instruction.opcode {
            Opcode::Jlt | Opcode::Rlt => signed_a < signed_b,
            Opcode::Jlte | Opcode::Rlte => signed_a <= signed_b,
            Opcode::Jgt | Opcode::Rgt => signed_a > signed_b,
            Opcode::Jgte | Opcode::Rgte => signed_a >= signed_b,
            Opcode::Jb | Opcode::Rb => a < b,
            Opcode::Jbe | Opcode::Rbe => a <= b,
            Opcode::Ja | Opcode::Ra => a > b,
            Opcode::Jae | Opcode::Rae => a >= b,
            Opcode::Jeq | Opcode::Req => a == b,
            Opcode::Jneq | Opcode::Rneq => a != b,
            _ => false,
        }
    }

    /// Evaluates the condition of a branch or return that compares against zero.
    fn test_zero(&self) -> bool {
        let value = self.a() as i16;

        match self.instruction.opcode {
            Opcode::Jez | Opcode::Rez => value == 0,
            Opcode::Jlz | Opcode::Rlz => value < 0,
            Opcode::Jlez | Opcode::Rlez => value <= 0,
            Opcode::Jgz | Opcode::Rgz => value > 0,
            Opcode::Jgez | Opcode::Rgez => value >= 0,
            _ => false,
        }
    }

    /// Execute the instruction.
    fn emulate(&mut self) -> Result<(), ExecutionError> {
        match self.instruction.opcode {
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Mod | Opcode::And
            | Opcode::Or | Opcode::Xor | Opcode::Shl | Opcode::Shr => {
                let value = self.arithmetic(self.a(), self.b())?;
                self.set_b(value);
            },

            Opcode::AddI | Opcode::SubI | Opcode::MulI | Opcode::ModI | Opcode::AndI
            | Opcode::OrI | Opcode::XorI | Opcode::ShlI | Opcode::ShrI
            | Opcode::Shal | Opcode::Shar => {
                let value = self.arithmetic(self.a(), self.immediate())?;
                self.set_a(value);
            },

            Opcode::Inc => self.set_a(self.a().wrapping_add(1)),
            Opcode::Dec => self.set_a(self.a().wrapping_sub(1)),
            Opcode::Not => self.set_a(!self.a()),
            Opcode::Neg => self.set_a(self.a().wrapping_neg()),

            Opcode::Jlt | Opcode::Jlte | Opcode::Jgt | Opcode::Jgte | Opcode::Jb
            | Opcode::Jbe | Opcode::Ja | Opcode::Jae | Opcode::Jeq | Opcode::Jneq => {
                if self.compare() {
                    self.jump(self.immediate());
                }
            },

            Opcode::Rlt | Opcode::Rlte | Opcode::Rgt | Opcode::Rgte | Opcode::Rb
            | Opcode::Rbe | Opcode::Ra | Opcode::Rae | Opcode::Req | Opcode::Rneq => {
                if self.compare() {
                    self.ret();
                }
            },

            Opcode::Jez | Opcode::Jlz | Opcode::Jlez | Opcode::Jgz | Opcode::Jgez => {
                if self.test_zero() {
                    self.jump(self.immediate());
                }
            },

            Opcode::Rez | Opcode::Rlz | Opcode::Rlez | Opcode::Rgz | Opcode::Rgez => {
                if self.test_zero() {
                    self.ret();
                }
            },

            Opcode::Copy => self.set_b(self.a()),
            Opcode::Load => {
                let value = self.emulator.memory.read_word(self.a());
                self.set_b(value);
            },
            Opcode::Stor => {
                let (value, address) = (self.a(), self.b());
                self.emulator.memory.write_word(address, value);
            },
            Opcode::Rxr => {
                let (a, b) = (self.a(), self.b());
                self.set_a(b);
                self.set_b(a);
            },
            Opcode::Rxm => {
                let (address, b) = (self.a(), self.b());
                let value = self.emulator.memory.read_word(address);
                self.emulator.memory.write_word(address, b);
                self.set_b(value);
            },
            Opcode::Hi => self.set_b(self.a() >> 8),
            Opcode::Lo => self.set_b(self.a() & 0xFF),

            Opcode::In => {
                let value = self.emulator.io.input(self.b());
                self.set_a(value);
            },
            Opcode::Out => {
                let (port, value) = (self.a(), self.b());
                self.emulator.io.output(port, value);
            },
            Opcode::CopyI => self.set_a(self.immediate()),
            Opcode::InI => {
                let value = self.emulator.io.input(self.immediate());
                self.set_a(value);
            },
            Opcode::OutI => {
                let (port, value) = (self.immediate(), self.a());
                self.emulator.io.output(port, value);
            },

            Opcode::JumpR => self.jump(self.a()),
            Opcode::Jump => self.jump(self.immediate()),
            Opcode::Call => self.call(self.immediate()),
            Opcode::CallR => self.call(self.a()),
            Opcode::Ret => self.ret(),

            Opcode::Push => {
                let value = self.a();
                self.emulator.push(value);
            },
            Opcode::Pop => {
                let value = self.emulator.pop();
                self.set_a(value);
            },
            // Every register except SP.
            Opcode::PushR => {
                for index in Register::A.index()..Register::SP.index() {
                    let value = self.emulator.context.r[index];
                    self.emulator.push(value);
                }
            },
            Opcode::PopR => {
                for index in (Register::A.index()..Register::SP.index()).rev() {
                    self.emulator.context.r[index] = self.emulator.pop();
                }
            },

            Opcode::Halt => self.emulator.halted = true,
            Opcode::Ei => self.emulator.context.interrupts_enabled = true,
            Opcode::Di => self.emulator.context.interrupts_enabled = false,
            Opcode::Nop => (),
        }

        Ok(())
    }
}

/// The emulator contains all neccessary context for executing a program and interfaces
/// for doing IO.
#[derive(Clone)]
pub struct Emulator<Mem, IO> {
    /// The memory of the emulated machine.
    /// Contains all the instructions and data required by the program.
    /// Implements [Memory].
    pub memory: Mem,

    /// The execution context, which includes the registers and the interrupt state.
    pub context: Context,

    /// Interface for doing IO operations.
    pub io: IO,

    /// True if the execution has been halted.
    pub halted: bool,

    log: Logger,
}

impl<Mem, IO> fmt::Debug for Emulator<Mem, IO> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Emulator")
            .field("context", &self.context)
            .field("halted", &self.halted)
            .finish()
    }
}

impl<Mem, IO> Emulator<Mem, IO> where Mem: Memory, IO: InputOutput {
    /// Create a new emulator.
    ///
    /// Execution starts at address zero with every register, including `SP`, set to zero
    /// and interrupts disabled.
    ///
    /// # Parameters
    /// - `memory`: A [Memory] object which has the program.
    /// - `io`: An [IO handler](InputOutput).
    pub fn new(memory: Mem, io: IO) -> Emulator<Mem, IO> {
        Emulator::with_logger(memory, io, None)
    }

    pub fn with_logger<L>(memory: Mem, io: IO, logger: L) -> Emulator<Mem, IO>
    where
        L: Into<Option<Logger>>,
    {
        let log = logger.into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "emulator"));

        Emulator {
            memory,
            context: Context::default(),
            io,
            halted: false,
            log,
        }
    }

    /// Requests an interrupt whose handler is the instruction word `vector`.
    ///
    /// The request is only latched when the emulator is running and interrupts are
    /// enabled. A latched request replaces an earlier one that has not been dispatched.
    ///
    /// # Returns
    /// True if an interrupt is pending after the call.
    pub fn request_interrupt(&mut self, vector: u16) -> bool {
        if self.halted {
            return false;
        }

        if self.context.interrupts_enabled {
            trace!(self.log, "interrupt requested"; "vector" => format!("{:04X}", vector));
            self.context.pending_interrupt = Some(vector);
        }

        self.context.pending_interrupt.is_some()
    }

    /// Decodes the instruction at the address pointed to by the program counter.
    pub fn current_instruction(&mut self) -> Result<Instruction, InvalidOpcode> {
        let pc = self.context.pc;
        let mut instruction = Instruction::decode(self.memory.read_word(pc))?;

        if instruction.opcode.shape().requires_immediate() {
            instruction.immediate = Some(self.memory.read_word(pc.wrapping_add(2)));
        }

        Ok(instruction)
    }

    /// Executes a single instruction.
    ///
    /// Does not touch the program counter beyond what the instruction itself does.
    ///
    /// # Errors
    /// Returns [ExecutionError::DivideByZero] for a modulo by zero.
    pub fn emulate_instruction(&mut self, instruction: &Instruction) -> Result<(), ExecutionError> {
        let address = self.context.pc;
        self.execute(instruction, address)
    }

    fn execute(&mut self, instruction: &Instruction, address: u16) -> Result<(), ExecutionError> {
        let mut ctx = InstructionEmulationContext {
            emulator: self,
            instruction,
            address,
        };

        ctx.emulate()
    }

    /// Fetches and executes the next instruction.
    ///
    /// A pending interrupt is dispatched instead of fetching from the program counter
    /// when interrupts are enabled. Its immediate, if the vector needs one, is still
    /// read from the program counter.
    ///
    /// # Returns
    /// The number of cycles the instruction took, or zero if the emulator is halted.
    ///
    /// # Errors
    /// Returns an [ExecutionError] and halts the emulator if the instruction could not be
    /// decoded or executed.
    pub fn step(&mut self) -> Result<u8, ExecutionError> {
        if self.halted {
            return Ok(0);
        }

        let address = self.context.pc;

        let word = match self.context.pending_interrupt {
            Some(vector) if self.context.interrupts_enabled => {
                self.context.pending_interrupt = None;
                debug!(self.log, "dispatching interrupt"; "vector" => format!("{:04X}", vector));
                vector
            },
            _ => {
                let word = self.memory.read_word(address);
                self.context.pc = address.wrapping_add(2);
                word
            },
        };

        let mut instruction = match Instruction::decode(word) {
            Ok(instruction) => instruction,
            Err(InvalidOpcode(word)) => return Err(self.fault(ExecutionError::InvalidOpcode { word, address })),
        };

        if instruction.opcode.shape().requires_immediate() {
            instruction.immediate = Some(self.memory.read_word(self.context.pc));
            self.context.pc = self.context.pc.wrapping_add(2);
        }

        trace!(self.log, "step"; "address" => format!("{:04X}", address), "instruction" => %instruction);

        if let Err(err) = self.execute(&instruction, address) {
            return Err(self.fault(err));
        }

        if self.halted {
            debug!(self.log, "halted"; "address" => format!("{:04X}", address));
        }

        Ok(instruction.opcode.definition().cycles)
    }

    fn fault(&mut self, err: ExecutionError) -> ExecutionError {
        error!(self.log, "execution error"; "error" => %err);
        self.halted = true;
        err
    }

    /// Executes the program until it halts.
    ///
    /// # Returns
    /// The total number of cycles used.
    pub fn run(&mut self) -> Result<u64, ExecutionError> {
        let mut cycles = 0;

        while !self.halted {
            cycles += self.step()? as u64;
        }

        Ok(cycles)
    }

    /// Executes at most `limit` instructions, stopping early if the program halts.
    ///
    /// # Returns
    /// The total number of cycles used.
    pub fn run_for(&mut self, limit: u64) -> Result<u64, ExecutionError> {
        let mut cycles = 0;

        for _ in 0..limit {
            if self.halted {
                break;
            }

            cycles += self.step()? as u64;
        }

        Ok(cycles)
    }

    fn push(&mut self, value: u16) {
        let sp = self.context.r[Register::SP.index()].wrapping_sub(2);
        self.context.r[Register::SP.index()] = sp;
        self.memory.write_word(sp, value);
    }

    fn pop(&mut self) -> u16 {
        let sp = self.context.r[Register::SP.index()];
        let value = self.memory.read_word(sp);
        self.context.r[Register::SP.index()] = sp.wrapping_add(2);
        value
    }
}

/// The whole 64 KiB address space backed by an array.
#[derive(Clone)]
pub struct FlatMemory {
    bytes: Box<[u8]>,
}

impl FlatMemory {
    pub fn new() -> FlatMemory {
        FlatMemory {
            bytes: vec![0; 0x10000].into_boxed_slice(),
        }
    }

    /// Creates a memory with `program` loaded at address zero.
    pub fn with_program(program: &[u8]) -> FlatMemory {
        let mut memory = FlatMemory::new();
        memory.load(program, 0);
        memory
    }

    /// Copies `bytes` into memory starting at `address`, wrapping around the end of the
    /// address space.
    pub fn load(&mut self, bytes: &[u8], address: u16) {
        let mut address = address;

        for &byte in bytes {
            self.write(address, byte);
            address = address.wrapping_add(1);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for FlatMemory {
    fn default() -> FlatMemory {
        FlatMemory::new()
    }
}

impl fmt::Debug for FlatMemory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FlatMemory({} bytes)", self.bytes.len())
    }
}

impl Memory for FlatMemory {
    fn read(&mut self, address: u16) -> u8 {
        self.bytes[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.bytes[address as usize] = value;
    }
}

/// An IO handler without devices. Reads return 0 and writes are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullIo;

impl InputOutput for NullIo {
    fn input(&mut self, _port: u16) -> u16 {
        0
    }

    fn output(&mut self, _port: u16, _data: u16) {}
}

/// An IO handler for testing purposes.
///
/// Reads input values from a pre-determined input queue, regardless of the port, and
/// records every output together with its port. Reading from an empty queue returns 0.
#[derive(Clone, Debug, Default)]
pub struct TestIo {
    input_buffer: VecDeque<u16>,
    output_buffer: Vec<(u16, u16)>,
}

impl TestIo {
    pub fn new() -> TestIo {
        TestIo::default()
    }

    pub fn with_input<I: IntoIterator<Item=u16>>(input: I) -> TestIo {
        TestIo {
            input_buffer: input.into_iter().collect(),
            output_buffer: Vec::new(),
        }
    }

    pub fn push_input(&mut self, value: u16) {
        self.input_buffer.push_back(value);
    }

    /// Outputs as `(port, value)` pairs in the order they were written.
    pub fn output(&self) -> &[(u16, u16)] {
        &self.output_buffer[..]
    }

    pub fn into_output(self) -> Vec<(u16, u16)> {
        self.output_buffer
    }
}

impl InputOutput for TestIo {
    fn input(&mut self, _port: u16) -> u16 {
        self.input_buffer.pop_front().unwrap_or(0)
    }

    fn output(&mut self, port: u16, value: u16) {
        self.output_buffer.push((port, value));
    }
}

/// An IO handler that connects [CONSOLE_PORT] to the terminal.
///
/// Output to the port prints the low byte of the value as a character to the standard
/// output. Input from the port reads a single byte from the standard input and returns
/// 0xFFFF at the end of the input or on error.
///
/// All other ports read 0 and ignore writes.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdIo;

impl InputOutput for StdIo {
    fn input(&mut self, port: u16) -> u16 {
        if port != CONSOLE_PORT {
            return 0;
        }

        std::io::stdin()
            .bytes()
            .next()
            .transpose()
            .unwrap_or(None)
            .map(|byte| byte as u16)
            .unwrap_or(0xFFFF)
    }

    fn output(&mut self, port: u16, data: u16) {
        if port != CONSOLE_PORT {
            return;
        }

        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&[data as u8]);
        let _ = stdout.flush();
    }
}

#[cfg(test)]
macro_rules! assert_register {
    ($emulator:expr, $register:expr, $value:expr) => {
        assert_eq!(
            $emulator.context.r[$register.index()], $value,
            "Register {} != {}", $register, $value,
        );
    };
}
