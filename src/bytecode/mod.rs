//! Storing, inspecting and disassembling bytecode programs.

mod disassembler;
mod program;

pub use self::disassembler::disassemble;
pub use self::program::Program;
