//! Types for representing instructions, the encoding table and the instruction word format.
//!
//! The [`OPCODES`] table is the single description of the instruction set. The
//! [compiler](crate::compiler) consults it to encode instructions and the
//! [emulator](crate::emulator) consults it to decode them.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// Describes which operands an instruction takes and thus how it is encoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgumentShape {
    /// No operands. (`HALT`)
    None,

    /// A single register packed into the low nibble. (`INC A`)
    Reg,

    /// A trailing immediate word. (`JUMP label`)
    Immed,

    /// Two registers packed into the low byte. (`ADD A, B`)
    RegReg,

    /// A register in the low nibble and a trailing immediate word. (`ADDI A, 5`)
    RegImmed,

    /// Two registers in the low byte and a trailing immediate word. (`JLT A, B, label`)
    RegRegImmed,
}

impl ArgumentShape {
    /// Returns the length of an encoded instruction of this shape in bytes.
    pub const fn byte_length(self) -> u16 {
        if self.requires_immediate() {
            4
        } else {
            2
        }
    }

    /// Returns the number of registers packed into the instruction word.
    pub const fn register_count(self) -> u8 {
        match self {
            ArgumentShape::None | ArgumentShape::Immed => 0,
            ArgumentShape::Reg | ArgumentShape::RegImmed => 1,
            ArgumentShape::RegReg | ArgumentShape::RegRegImmed => 2,
        }
    }

    /// Returns true if an immediate word follows the instruction word.
    pub const fn requires_immediate(self) -> bool {
        match self {
            ArgumentShape::Immed | ArgumentShape::RegImmed | ArgumentShape::RegRegImmed => true,
            ArgumentShape::None | ArgumentShape::Reg | ArgumentShape::RegReg => false,
        }
    }
}

/// The sixteen general purpose registers. `SP` doubles as the stack pointer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    SP,
}

impl Register {
    /// All registers ordered by their index.
    pub const ALL: [Register; 16] = [
        Register::A,
        Register::B,
        Register::C,
        Register::D,
        Register::E,
        Register::F,
        Register::G,
        Register::H,
        Register::I,
        Register::J,
        Register::K,
        Register::L,
        Register::M,
        Register::N,
        Register::O,
        Register::SP,
    ];

    /// Returns the register encoded in the low four bits of `nibble`.
    pub fn from_nibble(nibble: u16) -> Register {
        Register::ALL[(nibble & 0xF) as usize]
    }

    /// Looks up a register by its name, ignoring case.
    pub fn from_name(name: &str) -> Option<Register> {
        let upper = name.to_uppercase();

        Register::ALL.iter()
            .copied()
            .find(|register| register.name() == upper)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::B => "B",
            Register::C => "C",
            Register::D => "D",
            Register::E => "E",
            Register::F => "F",
            Register::G => "G",
            Register::H => "H",
            Register::I => "I",
            Register::J => "J",
            Register::K => "K",
            Register::L => "L",
            Register::M => "M",
            Register::N => "N",
            Register::O => "O",
            Register::SP => "SP",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operations of the instruction architecture.
///
/// Register operands are called `A` and `B` below in the order they are written in the
/// source, `imm` is the immediate operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `B = A + B`
    Add,
    /// `B = A - B`
    Sub,
    /// `B = A * B`
    Mul,
    /// `B = A % B`
    Mod,
    /// `B = A & B`
    And,
    /// `B = A | B`
    Or,
    /// `B = A ^ B`
    Xor,
    /// `B = A << B`
    Shl,
    /// `B = A >> B`
    Shr,

    /// `A = A + imm`
    AddI,
    /// `A = A - imm`
    SubI,
    /// `A = A * imm`
    MulI,
    /// `A = A % imm`
    ModI,
    /// `A = A & imm`
    AndI,
    /// `A = A | imm`
    OrI,
    /// `A = A ^ imm`
    XorI,
    /// `A = A << imm`
    ShlI,
    /// `A = A >> imm`
    ShrI,

    Inc,
    Dec,
    Not,
    Neg,

    // Conditional jumps comparing two registers.
    Jlt,
    Jlte,
    Jgt,
    Jgte,
    Jb,
    Jbe,
    Ja,
    Jae,
    Jeq,
    Jneq,

    // Conditional returns comparing two registers.
    Rlt,
    Rlte,
    Rgt,
    Rgte,
    Rb,
    Rbe,
    Ra,
    Rae,
    Req,
    Rneq,

    /// `B = A`
    Copy,
    /// `B = memory[A]`
    Load,
    /// `memory[B] = A`
    Stor,
    /// Swaps the values of two registers.
    Rxr,
    /// Swaps `memory[A]` and `B`.
    Rxm,
    /// `B = A >> 8`
    Hi,
    /// `B = A & 0xFF`
    Lo,
    /// `A = input(port B)`
    In,

    /// `A = imm`
    CopyI,
    /// `A = input(port imm)`
    InI,
    /// `output(port imm, A)`
    OutI,
    /// Arithmetic shift left by `imm`.
    Shal,
    /// Arithmetic shift right by `imm`.
    Shar,

    JumpR,
    /// Pops the registers pushed by [`Opcode::PushR`].
    PopR,
    /// Pushes registers `A` to `O`.
    PushR,
    Jump,
    Call,
    Ret,
    Halt,
    /// Enables interrupts.
    Ei,
    /// Disables interrupts.
    Di,
    CallR,
    Push,
    Pop,
    /// `output(port A, B)`
    Out,

    // Conditional jumps comparing a register against zero.
    Jez,
    Jlz,
    Jlez,
    Jgz,
    Jgez,

    // Conditional returns comparing a register against zero.
    Rez,
    Rlz,
    Rlez,
    Rgz,
    Rgez,

    Nop,
}

/// A single entry of the encoding table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpcodeDefinition {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub shape: ArgumentShape,

    /// The instruction word with all operand bits cleared.
    pub code: u16,

    /// Length of the encoded instruction, including the immediate.
    pub byte_length: u16,

    /// Number of cycles an execution of the instruction costs.
    pub cycles: u8,
}

const fn define(
    opcode: Opcode,
    mnemonic: &'static str,
    shape: ArgumentShape,
    code: u16,
) -> OpcodeDefinition {
    OpcodeDefinition {
        opcode,
        mnemonic,
        shape,
        code,
        byte_length: shape.byte_length(),
        cycles: if shape.requires_immediate() { 2 } else { 1 },
    }
}

/// The encoding table. The order of the entries decides which opcode a word decodes to
/// when several patterns of the same decoding tier match.
pub static OPCODES: &[OpcodeDefinition] = &[
    define(Opcode::Add,   "ADD",   ArgumentShape::RegReg,      0xA000),
    define(Opcode::Sub,   "SUB",   ArgumentShape::RegReg,      0xA100),
    define(Opcode::Mul,   "MUL",   ArgumentShape::RegReg,      0xA200),
    define(Opcode::Mod,   "MOD",   ArgumentShape::RegReg,      0xA500),
    define(Opcode::And,   "AND",   ArgumentShape::RegReg,      0xA600),
    define(Opcode::Or,    "OR",    ArgumentShape::RegReg,      0xA700),
    define(Opcode::Xor,   "XOR",   ArgumentShape::RegReg,      0xA800),
    define(Opcode::Shl,   "SHL",   ArgumentShape::RegReg,      0xA900),
    define(Opcode::Shr,   "SHR",   ArgumentShape::RegReg,      0xAA00),

    define(Opcode::AddI,  "ADDI",  ArgumentShape::RegImmed,    0xAF00),
    define(Opcode::SubI,  "SUBI",  ArgumentShape::RegImmed,    0xAF10),
    define(Opcode::MulI,  "MULI",  ArgumentShape::RegImmed,    0xAF20),
    define(Opcode::ModI,  "MODI",  ArgumentShape::RegImmed,    0xAF50),
    define(Opcode::AndI,  "ANDI",  ArgumentShape::RegImmed,    0xAF60),
    define(Opcode::OrI,   "ORI",   ArgumentShape::RegImmed,    0xAF70),
    define(Opcode::XorI,  "XORI",  ArgumentShape::RegImmed,    0xAF80),
    define(Opcode::ShlI,  "SHLI",  ArgumentShape::RegImmed,    0xAF90),
    define(Opcode::ShrI,  "SHRI",  ArgumentShape::RegImmed,    0xAFA0),

    define(Opcode::Inc,   "INC",   ArgumentShape::Reg,         0xAFC0),
    define(Opcode::Dec,   "DEC",   ArgumentShape::Reg,         0xAFD0),
    define(Opcode::Not,   "NOT",   ArgumentShape::Reg,         0xAFE0),
    define(Opcode::Neg,   "NEG",   ArgumentShape::Reg,         0xAFF0),

    define(Opcode::Jlt,   "JLT",   ArgumentShape::RegRegImmed, 0xB000),
    define(Opcode::Jlte,  "JLTE",  ArgumentShape::RegRegImmed, 0xB100),
    define(Opcode::Jgt,   "JGT",   ArgumentShape::RegRegImmed, 0xB200),
    define(Opcode::Jgte,  "JGTE",  ArgumentShape::RegRegImmed, 0xB300),
    define(Opcode::Jb,    "JB",    ArgumentShape::RegRegImmed, 0xB400),
    define(Opcode::Jbe,   "JBE",   ArgumentShape::RegRegImmed, 0xB500),
    define(Opcode::Ja,    "JA",    ArgumentShape::RegRegImmed, 0xB600),
    define(Opcode::Jae,   "JAE",   ArgumentShape::RegRegImmed, 0xB700),
    define(Opcode::Jeq,   "JEQ",   ArgumentShape::RegRegImmed, 0xB800),
    define(Opcode::Jneq,  "JNEQ",  ArgumentShape::RegRegImmed, 0xB900),

    define(Opcode::Rlt,   "RLT",   ArgumentShape::RegReg,      0xC400),
    define(Opcode::Rlte,  "RLTE",  ArgumentShape::RegReg,      0xC500),
    define(Opcode::Rgt,   "RGT",   ArgumentShape::RegReg,      0xC600),
    define(Opcode::Rgte,  "RGTE",  ArgumentShape::RegReg,      0xC700),
    define(Opcode::Rb,    "RB",    ArgumentShape::RegReg,      0xC800),
    define(Opcode::Rbe,   "RBE",   ArgumentShape::RegReg,      0xC900),
    define(Opcode::Ra,    "RA",    ArgumentShape::RegReg,      0xCA00),
    define(Opcode::Rae,   "RAE",   ArgumentShape::RegReg,      0xCB00),
    define(Opcode::Req,   "REQ",   ArgumentShape::RegReg,      0xCC00),
    define(Opcode::Rneq,  "RNEQ",  ArgumentShape::RegReg,      0xCD00),

    define(Opcode::Copy,  "COPY",  ArgumentShape::RegReg,      0xD000),
    define(Opcode::Load,  "LOAD",  ArgumentShape::RegReg,      0xD100),
    define(Opcode::Stor,  "STOR",  ArgumentShape::RegReg,      0xD200),
    define(Opcode::Rxr,   "RXR",   ArgumentShape::RegReg,      0xD900),
    define(Opcode::Rxm,   "RXM",   ArgumentShape::RegReg,      0xDA00),
    define(Opcode::Hi,    "HI",    ArgumentShape::RegReg,      0xDB00),
    define(Opcode::Lo,    "LO",    ArgumentShape::RegReg,      0xDC00),
    define(Opcode::In,    "IN",    ArgumentShape::RegReg,      0xDD00),

    define(Opcode::CopyI, "COPYI", ArgumentShape::RegImmed,    0xDE00),
    define(Opcode::InI,   "INI",   ArgumentShape::RegImmed,    0xDE30),
    define(Opcode::OutI,  "OUTI",  ArgumentShape::RegImmed,    0xDE40),
    define(Opcode::Shal,  "SHAL",  ArgumentShape::RegImmed,    0xDE50),
    define(Opcode::Shar,  "SHAR",  ArgumentShape::RegImmed,    0xDE60),

    define(Opcode::JumpR, "JUMPR", ArgumentShape::Reg,         0xDE90),

    define(Opcode::PopR,  "POPR",  ArgumentShape::None,        0xDEA2),
    define(Opcode::PushR, "PUSHR", ArgumentShape::None,        0xDEA3),

    define(Opcode::Jump,  "JUMP",  ArgumentShape::Immed,       0xDEAA),
    define(Opcode::Call,  "CALL",  ArgumentShape::Immed,       0xDEAB),

    define(Opcode::Ret,   "RET",   ArgumentShape::None,        0xDEAC),
    define(Opcode::Halt,  "HALT",  ArgumentShape::None,        0xDEAD),
    define(Opcode::Ei,    "EI",    ArgumentShape::None,        0xDEAE),
    define(Opcode::Di,    "DI",    ArgumentShape::None,        0xDEAF),

    define(Opcode::CallR, "CALLR", ArgumentShape::Reg,         0xDEB0),
    define(Opcode::Push,  "PUSH",  ArgumentShape::Reg,         0xDEC0),
    define(Opcode::Pop,   "POP",   ArgumentShape::Reg,         0xDED0),

    define(Opcode::Out,   "OUT",   ArgumentShape::RegReg,      0xDF00),

    define(Opcode::Jez,   "JEZ",   ArgumentShape::RegImmed,    0xFF00),
    define(Opcode::Jlz,   "JLZ",   ArgumentShape::RegImmed,    0xFF10),
    define(Opcode::Jlez,  "JLEZ",  ArgumentShape::RegImmed,    0xFF20),
    define(Opcode::Jgz,   "JGZ",   ArgumentShape::RegImmed,    0xFF30),
    define(Opcode::Jgez,  "JGEZ",  ArgumentShape::RegImmed,    0xFF40),

    define(Opcode::Rez,   "REZ",   ArgumentShape::Reg,         0xFFA0),
    define(Opcode::Rlz,   "RLZ",   ArgumentShape::Reg,         0xFFB0),
    define(Opcode::Rlez,  "RLEZ",  ArgumentShape::Reg,         0xFFC0),
    define(Opcode::Rgz,   "RGZ",   ArgumentShape::Reg,         0xFFD0),
    define(Opcode::Rgez,  "RGEZ",  ArgumentShape::Reg,         0xFFE0),

    define(Opcode::Nop,   "NOP",   ArgumentShape::None,        0xFFF0),
];

lazy_static! {
    static ref BY_OPCODE: HashMap<Opcode, &'static OpcodeDefinition> = OPCODES
        .iter()
        .map(|definition| (definition.opcode, definition))
        .collect();

    static ref BY_MNEMONIC: HashMap<&'static str, &'static OpcodeDefinition> = OPCODES
        .iter()
        .map(|definition| (definition.mnemonic, definition))
        .collect();

    /// Length of the longest mnemonic. Used to align listings.
    pub static ref LONGEST_MNEMONIC: usize = OPCODES
        .iter()
        .map(|definition| definition.mnemonic.len())
        .max()
        .unwrap_or(0);
}

impl Opcode {
    /// Returns the encoding table entry of this opcode.
    pub fn definition(self) -> &'static OpcodeDefinition {
        // Every variant has exactly one entry in the table.
        BY_OPCODE[&self]
    }

    pub fn shape(self) -> ArgumentShape {
        self.definition().shape
    }

    pub fn mnemonic(self) -> &'static str {
        self.definition().mnemonic
    }

    /// Looks up an opcode by its mnemonic, ignoring case.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        BY_MNEMONIC
            .get(name.to_uppercase().as_str())
            .map(|definition| definition.opcode)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Error returned when the operands given to [`Instruction::new`] do not match the
/// argument shape of the opcode.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeMismatch {
    pub opcode: Opcode,
    pub shape: ArgumentShape,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "operands do not match the {:?} shape of {}", self.shape, self.opcode)
    }
}

impl std::error::Error for ShapeMismatch {}

/// Error returned when a word does not decode to any instruction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvalidOpcode(pub u16);

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid opcode 0x{:04X}", self.0)
    }
}

impl std::error::Error for InvalidOpcode {}

/// An instruction with resolved operands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub register_a: Option<Register>,
    pub register_b: Option<Register>,
    pub immediate: Option<u16>,
}

impl Instruction {
    /// Creates an instruction after checking the operands against the argument shape.
    ///
    /// # Errors
    /// Returns [ShapeMismatch] if a register or the immediate is missing or superfluous.
    pub fn new(
        opcode: Opcode,
        register_a: Option<Register>,
        register_b: Option<Register>,
        immediate: Option<u16>,
    ) -> Result<Instruction, ShapeMismatch> {
        let shape = opcode.shape();
        let registers = match (register_a, register_b) {
            (None, None) => 0,
            (Some(_), None) => 1,
            (Some(_), Some(_)) => 2,
            (None, Some(_)) => return Err(ShapeMismatch { opcode, shape }),
        };

        if registers != shape.register_count() || immediate.is_some() != shape.requires_immediate() {
            return Err(ShapeMismatch { opcode, shape });
        }

        Ok(Instruction {
            opcode,
            register_a,
            register_b,
            immediate,
        })
    }

    /// Returns the instruction word: the code pattern with the registers packed in.
    pub fn word(&self) -> u16 {
        let a = self.register_a.map(|r| r.index() as u16).unwrap_or(0);
        let b = self.register_b.map(|r| r.index() as u16).unwrap_or(0);
        let definition = self.opcode.definition();

        match definition.shape.register_count() {
            0 => definition.code,
            1 => definition.code | a,
            _ => definition.code | a << 4 | b,
        }
    }

    pub fn byte_length(&self) -> u16 {
        self.opcode.definition().byte_length
    }

    /// Encodes the instruction as big-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_length() as usize);
        bytes.extend_from_slice(&self.word().to_be_bytes());

        if self.opcode.shape().requires_immediate() {
            bytes.extend_from_slice(&self.immediate.unwrap_or(0).to_be_bytes());
        }

        bytes
    }

    /// Decodes an instruction word. The immediate of the returned instruction is not
    /// set; it lives in the following word.
    ///
    /// Patterns without registers are matched against the whole word first, then
    /// single-register patterns against `word & 0xFFF0` and finally two-register
    /// patterns against `word & 0xFF00`.
    ///
    /// # Errors
    /// Returns [InvalidOpcode] if no pattern matches.
    pub fn decode(word: u16) -> Result<Instruction, InvalidOpcode> {
        for &(mask, registers) in &[(0xFFFF, 0), (0xFFF0, 1), (0xFF00, 2)] {
            let pattern = word & mask;

            let definition = OPCODES
                .iter()
                .find(|d| d.shape.register_count() == registers && d.code == pattern);

            if let Some(definition) = definition {
                let (register_a, register_b) = match registers {
                    0 => (None, None),
                    1 => (Some(Register::from_nibble(word)), None),
                    _ => (
                        Some(Register::from_nibble(word >> 4)),
                        Some(Register::from_nibble(word)),
                    ),
                };

                return Ok(Instruction {
                    opcode: definition.opcode,
                    register_a,
                    register_b,
                    immediate: None,
                });
            }
        }

        Err(InvalidOpcode(word))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let operands = self.register_a.iter()
            .chain(self.register_b.iter())
            .map(|r| r.to_string())
            .chain(self.immediate.iter().map(|imm| format!("0x{:04X}", imm)))
            .collect::<Vec<_>>();

        if operands.is_empty() {
            write!(f, "{}", self.opcode)
        } else {
            write!(f, "{:width$} {}", self.opcode.mnemonic(), operands.join(", "), width = *LONGEST_MNEMONIC)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn encode(opcode: Opcode, a: Option<Register>, b: Option<Register>, imm: Option<u16>) -> Vec<u8> {
        Instruction::new(opcode, a, b, imm)
            .expect("operands should match the shape")
            .to_bytes()
    }

    #[test]
    fn test_encoding_vectors() {
        assert_eq!(encode(Opcode::Nop, None, None, None), vec![0xFF, 0xF0]);
        assert_eq!(encode(Opcode::Inc, Some(Register::B), None, None), vec![0xAF, 0xC1]);
        assert_eq!(encode(Opcode::Jump, None, None, Some(0xF00D)), vec![0xDE, 0xAA, 0xF0, 0x0D]);
        assert_eq!(encode(Opcode::Add, Some(Register::B), Some(Register::C), None), vec![0xA0, 0x12]);
        assert_eq!(
            encode(Opcode::AddI, Some(Register::B), None, Some(0xF00D)),
            vec![0xAF, 0x01, 0xF0, 0x0D],
        );
        assert_eq!(
            encode(Opcode::Jlt, Some(Register::B), Some(Register::C), Some(0xF00D)),
            vec![0xB0, 0x12, 0xF0, 0x0D],
        );
        assert_eq!(encode(Opcode::Push, Some(Register::SP), None, None), vec![0xDE, 0xCF]);
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(Instruction::new(Opcode::Add, Some(Register::A), None, None).is_err());
        assert!(Instruction::new(Opcode::Halt, None, None, Some(1)).is_err());
        assert!(Instruction::new(Opcode::Inc, None, Some(Register::A), None).is_err());
        assert!(Instruction::new(Opcode::Jump, None, None, None).is_err());
    }

    #[test]
    fn test_table_consistency() {
        let mut codes = HashSet::new();
        let mut mnemonics = HashSet::new();

        for definition in OPCODES {
            assert!(codes.insert(definition.code), "duplicate code {:04X}", definition.code);
            assert!(mnemonics.insert(definition.mnemonic), "duplicate {}", definition.mnemonic);
            assert_eq!(definition.opcode.definition(), definition);
            assert_eq!(definition.byte_length, definition.shape.byte_length());

            let operand_bits = match definition.shape.register_count() {
                0 => 0,
                1 => 0x000F,
                _ => 0x00FF,
            };
            assert_eq!(definition.code & operand_bits, 0, "{} has operand bits set", definition.mnemonic);
        }

        assert_eq!(OPCODES.len(), 79);
        assert_eq!(*LONGEST_MNEMONIC, 5);
    }

    #[test]
    fn test_shape_functions() {
        assert_eq!(ArgumentShape::None.byte_length(), 2);
        assert_eq!(ArgumentShape::RegReg.byte_length(), 2);
        assert_eq!(ArgumentShape::Immed.byte_length(), 4);
        assert_eq!(ArgumentShape::RegRegImmed.byte_length(), 4);
        assert_eq!(ArgumentShape::RegRegImmed.register_count(), 2);
        assert_eq!(ArgumentShape::RegImmed.register_count(), 1);
        assert!(!ArgumentShape::Reg.requires_immediate());
        assert_eq!(Opcode::Halt.definition().cycles, 1);
        assert_eq!(Opcode::Call.definition().cycles, 2);
    }

    #[test]
    fn test_decode_tie_break() {
        let halt = Instruction::decode(0xDEAD).unwrap();
        assert_eq!(halt.opcode, Opcode::Halt);
        assert_eq!(halt.register_a, None);

        let copyi = Instruction::decode(0xDE05).unwrap();
        assert_eq!(copyi.opcode, Opcode::CopyI);
        assert_eq!(copyi.register_a, Some(Register::F));

        let jumpr = Instruction::decode(0xDE9F).unwrap();
        assert_eq!(jumpr.opcode, Opcode::JumpR);
        assert_eq!(jumpr.register_a, Some(Register::SP));
    }

    #[test]
    fn test_decode_unallocated() {
        for &word in &[0x0000, 0xDEA0, 0xDEA1, 0xDEA5, 0xE000, 0xA300, 0xAFB0, 0xFF50] {
            assert_eq!(Instruction::decode(word), Err(InvalidOpcode(word)), "{:04X}", word);
        }
    }

    #[test]
    fn test_encode_decode_inverse() {
        for definition in OPCODES {
            for &(a, b) in &[(0u16, 0u16), (1, 2), (15, 7), (9, 15)] {
                let (register_a, register_b) = match definition.shape.register_count() {
                    0 => (None, None),
                    1 => (Some(Register::from_nibble(a)), None),
                    _ => (Some(Register::from_nibble(a)), Some(Register::from_nibble(b))),
                };
                let immediate = if definition.shape.requires_immediate() { Some(0xBEEF) } else { None };

                let instruction = Instruction::new(definition.opcode, register_a, register_b, immediate)
                    .unwrap();

                let mut decoded = Instruction::decode(instruction.word()).unwrap();
                if definition.shape.requires_immediate() {
                    let bytes = instruction.to_bytes();
                    decoded.immediate = Some(u16::from_be_bytes([bytes[2], bytes[3]]));
                }

                assert_eq!(decoded, instruction);
            }
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Opcode::from_mnemonic("addi"), Some(Opcode::AddI));
        assert_eq!(Opcode::from_mnemonic("Halt"), Some(Opcode::Halt));
        assert_eq!(Opcode::from_mnemonic("DIV"), None);
        assert_eq!(Register::from_name("sp"), Some(Register::SP));
        assert_eq!(Register::from_name("o"), Some(Register::O));
        assert_eq!(Register::from_name("P"), None);
    }

    #[test]
    fn test_display() {
        let add = Instruction::new(Opcode::Add, Some(Register::A), Some(Register::B), None).unwrap();
        assert_eq!(add.to_string(), "ADD   A, B");

        let jump = Instruction::new(Opcode::Jump, None, None, Some(0x12)).unwrap();
        assert_eq!(jump.to_string(), "JUMP  0x0012");

        let halt = Instruction::new(Opcode::Halt, None, None, None).unwrap();
        assert_eq!(halt.to_string(), "HALT");
    }
}
