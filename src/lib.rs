//! An assembler and a virtual machine for a small 16-bit instruction architecture.
//!
//! The machine has sixteen 16-bit registers `A` to `O` and `SP`, a flat 64 KiB byte
//! addressed memory and a 64 Ki port I/O space. Instructions are one big-endian word,
//! optionally followed by a 16-bit immediate.
//!
//! This crate provides the functionality to:
//! - Tokenize, lex and parse symbolic assembly into a syntax tree ([symbolic]).
//! - Compile the syntax tree into bytecode with forward label resolution ([compiler]).
//! - Read and write binary symbol tables ([symbol_table]).
//! - Disassemble bytecode back into assembly ([bytecode::disassemble]).
//! - Execute bytecode ([emulator]), optionally with several devices sharing the port
//!   space ([io_bridge]).
//!
//! # Example
//! ```
//! use asmtwo::{
//!     symbolic::Program,
//!     emulator::{Emulator, FlatMemory, TestIo},
//! };
//!
//! // Adds 13 and 15 together and writes the answer to port 0x0A.
//! let source = r#"
//!         COPYI A, 13
//!         COPYI B, 15
//!         ADD   A, B
//!         OUTI  B, 0x0A
//!         HALT
//! "#;
//!
//! // Parse the assembly into a syntax tree.
//! let program = Program::parse(source).unwrap();
//!
//! // Translate the syntax tree into bytecode.
//! let compiled = program.compile().unwrap();
//!
//! // Load the bytecode at address zero and run it until it halts.
//! let memory = FlatMemory::with_program(&compiled.bytes);
//! let mut emulator = Emulator::new(memory, TestIo::new());
//!
//! emulator.run()
//!     .expect("an error occured while emulating the program");
//!
//! assert_eq!(emulator.io.output(), &[(0x0A, 28)]);
//! ```
//!
//! # Executables
//!
//! With the `tools` feature the crate builds two executables.
//!
//! ## `asmtwo-build`
//!
//! Assembles a source file into bytecode and, optionally, a symbol table. The
//! intermediate results can be dumped with `--dump tokens|ast|bytes|symbols`.
//!
//! ```text
//! asmtwo-build hello.a2s -o hello.bin --symbols hello.sym --debug
//! ```
//!
//! ## `asmtwo-run`
//!
//! Runs an assembly source file (`.a2s`) or raw bytecode with port 0x0A connected to the
//! terminal.
//!
//! ```text
//! asmtwo-run hello.a2s --max-steps 100000
//! ```
pub mod assembler;
pub mod bytecode;
pub mod compiler;
pub mod emulator;
pub mod error;
pub mod instruction;
pub mod io_bridge;
pub mod parsing;
pub mod source_map;
pub mod symbol_table;
pub mod symbolic;
pub mod utils;

pub use assembler::{Assembler, BuildOptions};
pub use error::Error;
