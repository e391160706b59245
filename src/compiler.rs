//! Compilation from the syntax tree to bytecode.
//!
//! Compilation makes two passes over the nodes. The first one assigns an address to
//! every label, the second one encodes the nodes. Because all addresses are known
//! before anything is emitted, labels can be referenced before they are defined.

use slog::{debug, o, trace, Discard, Logger};

use std::collections::HashMap;
use std::fmt;

use crate::bytecode::Program;
use crate::instruction::{Instruction, ShapeMismatch};
use crate::parsing::Location;
use crate::symbolic;
use crate::symbolic::ast::{Immediate, Node};

/// Size of the address space in bytes.
pub const ADDRESS_SPACE: usize = 0x10000;

#[derive(Clone, Debug, PartialEq)]
pub enum CompileError {
    /// An immediate refers to a label that is not defined anywhere.
    UnresolvedLabel {
        name: String,
        location: Location,
    },

    /// The operands of an instruction node do not match its opcode.
    InvalidOperands {
        mismatch: ShapeMismatch,
        location: Location,
    },

    /// The program does not fit in the address space.
    ProgramTooLarge {
        size: usize,
    },
}

impl CompileError {
    pub fn location(&self) -> Option<Location> {
        match self {
            CompileError::UnresolvedLabel { location, .. } => Some(*location),
            CompileError::InvalidOperands { location, .. } => Some(*location),
            CompileError::ProgramTooLarge { .. } => None,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CompileError::UnresolvedLabel { name, location } =>
                write!(f, "undefined label '{}' referenced at {}", name, location),
            CompileError::InvalidOperands { mismatch, location } =>
                write!(f, "{} at {}", mismatch, location),
            CompileError::ProgramTooLarge { size } =>
                write!(f, "program is {} bytes, which exceeds the {} byte address space", size, ADDRESS_SPACE),
        }
    }
}

impl std::error::Error for CompileError {}

/// Compiles a program without logging.
pub fn compile(program: &symbolic::Program) -> Result<Program, CompileError> {
    compile_with_logger(program, None)
}

/// Compiles a program into bytecode.
///
/// # Errors
/// Returns [CompileError::UnresolvedLabel] for references to undefined labels and
/// [CompileError::ProgramTooLarge] if the output does not fit in 64 KiB.
pub fn compile_with_logger<L>(program: &symbolic::Program, logger: L) -> Result<Program, CompileError>
where
    L: Into<Option<Logger>>,
{
    let log = logger.into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "compile"));

    let label_defines = assign_addresses(&program.nodes)?;

    for (name, address) in &label_defines {
        trace!(log, "label address"; "label" => name, "address" => address);
    }

    let mut output = Program {
        bytes: Vec::new(),
        label_defines,
        label_references: HashMap::new(),
        relocations: Default::default(),
        source_map: Default::default(),
    };

    for node in &program.nodes {
        let position = output.bytes.len();
        let offset = position as u16;

        // An empty node after a full address space has no address to map.
        if position < ADDRESS_SPACE {
            output.source_map.insert(offset, node.location());
        }

        match node {
            Node::Binary(binary) => {
                trace!(log, "binary"; "offset" => offset, "length" => binary.bytes.len());
                output.bytes.extend_from_slice(&binary.bytes);
            },
            Node::Instruction(node) => {
                let immediate = match &node.immediate {
                    None => None,
                    Some(Immediate::Constant(value)) => Some(*value),
                    Some(Immediate::Label { name, location }) => {
                        let address = *output.label_defines.get(name)
                            .ok_or_else(|| CompileError::UnresolvedLabel {
                                name: name.clone(),
                                location: *location,
                            })?;

                        // The immediate follows the instruction word.
                        let site = offset + 2;

                        output.label_references.entry(name.clone())
                            .or_insert_with(Vec::new)
                            .push(site);
                        output.relocations.insert(site);

                        Some(address)
                    },
                };

                let instruction = Instruction::new(node.opcode, node.register_a, node.register_b, immediate)
                    .map_err(|mismatch| CompileError::InvalidOperands {
                        mismatch,
                        location: node.location,
                    })?;

                trace!(log, "instruction";
                    "offset" => offset,
                    "word" => format!("{:04X}", instruction.word()),
                    "instruction" => %instruction);

                output.bytes.extend(instruction.to_bytes());
            },
        }
    }

    debug!(log, "compiled program";
        "bytes" => output.bytes.len(),
        "labels" => output.label_defines.len(),
        "relocations" => output.relocations.len());

    Ok(output)
}

/// First pass: computes the address of every label.
fn assign_addresses(nodes: &[Node]) -> Result<HashMap<String, u16>, CompileError> {
    let mut addresses = HashMap::new();
    let mut offset = 0usize;

    for node in nodes {
        if let Some(label) = node.label() {
            if offset >= ADDRESS_SPACE {
                return Err(CompileError::ProgramTooLarge { size: offset });
            }

            addresses.insert(label.name.clone(), offset as u16);
        }

        offset += node.byte_length();
    }

    if offset > ADDRESS_SPACE {
        return Err(CompileError::ProgramTooLarge { size: offset });
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Opcode, Register};
    use crate::symbolic::ast::{BinaryNode, InstructionNode};

    fn compile_source(source: &str) -> Result<Program, CompileError> {
        symbolic::Program::parse(source)
            .expect("could not parse the source code")
            .compile()
    }

    #[test]
    fn test_compile() {
        let program = compile_source(r#"
            NAME "compile"
            start:  COPYI A, 0x0041
                    OUTI  A, 0x0A
            loop:   JLT   A, B, start
                    HALT
            text:   PUT   "ok"
        "#).unwrap();

        assert_eq!(
            program.bytes,
            vec![
                0xDE, 0x00, 0x00, 0x41,
                0xDE, 0x40, 0x00, 0x0A,
                0xB0, 0x01, 0x00, 0x00,
                0xDE, 0xAD,
                b'o', b'k',
            ],
        );

        assert_eq!(program.label_defines["start"], 0);
        assert_eq!(program.label_defines["loop"], 8);
        assert_eq!(program.label_defines["text"], 14);
        assert_eq!(program.label_references["start"], vec![10]);
        assert!(program.label_references.get("loop").is_none());
        assert_eq!(program.relocations.iter().copied().collect::<Vec<_>>(), vec![10]);
        assert_eq!(program.source_map.get(8).map(|l| l.line), Some(4));
    }

    #[test]
    fn test_forward_reference() {
        let program = compile_source("JUMP target\nNOP\nNOP\ntarget: HALT\nJUMP target").unwrap();

        assert_eq!(program.label_defines["target"], 8);
        assert_eq!(&program.bytes[0..4], &[0xDE, 0xAA, 0x00, 0x08]);
        assert_eq!(&program.bytes[10..14], &[0xDE, 0xAA, 0x00, 0x08]);
        assert_eq!(program.label_references["target"], vec![2, 12]);
    }

    #[test]
    fn test_aliased_labels() {
        let program = compile_source("first:\nsecond:\n  NOP\ntail:").unwrap();

        assert_eq!(program.label_defines["first"], 0);
        assert_eq!(program.label_defines["second"], 0);
        assert_eq!(program.label_defines["tail"], 2);
    }

    #[test]
    fn test_unresolved_label() {
        let error = compile_source("NOP\nJUMP nowhere").unwrap_err();

        match error {
            CompileError::UnresolvedLabel { name, location } => {
                assert_eq!(name, "nowhere");
                assert_eq!(location, Location::new(9, 1, 5));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_operands() {
        let program = symbolic::Program::from_nodes(vec![Node::Instruction(InstructionNode {
            opcode: Opcode::Add,
            register_a: Some(Register::A),
            register_b: None,
            immediate: None,
            label: None,
            location: Location::default(),
        })]);

        assert!(matches!(compile(&program), Err(CompileError::InvalidOperands { .. })));
    }

    #[test]
    fn test_program_too_large() {
        let chunk = || Node::Binary(BinaryNode {
            bytes: vec![0; 0x8000],
            label: None,
            location: Location::default(),
        });

        let fits = symbolic::Program::from_nodes(vec![chunk(), chunk()]);
        assert_eq!(compile(&fits).unwrap().bytes.len(), 0x10000);

        let mut full = vec![chunk(), chunk()];
        full.push(Node::Binary(BinaryNode {
            bytes: Vec::new(),
            label: None,
            location: Location::new(0, 7, 0),
        }));

        let program = compile(&symbolic::Program::from_nodes(full)).unwrap();
        assert_eq!(program.bytes.len(), 0x10000);
        assert_eq!(program.source_map.get(0), Some(&Location::default()));
        assert_eq!(program.source_map.len(), 2);

        let too_large = symbolic::Program::from_nodes(vec![chunk(), chunk(), chunk()]);
        assert_eq!(compile(&too_large), Err(CompileError::ProgramTooLarge { size: 0x18000 }));
    }
}
