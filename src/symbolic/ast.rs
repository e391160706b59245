//! Syntax tree of an assembly document.

use std::fmt;

use crate::instruction::{Opcode, Register, LONGEST_MNEMONIC};
use crate::parsing::Location;
use crate::utils::escape;

/// A label definition (`name:`).
#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub name: String,
    pub location: Location,
}

/// The immediate operand of an instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Immediate {
    /// A literal value.
    Constant(u16),

    /// A reference to a label, resolved by the [compiler](crate::compiler).
    Label {
        name: String,
        location: Location,
    },
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Immediate::Constant(value) => write!(f, "0x{:04X}", value),
            Immediate::Label { name, .. } => write!(f, "{}", name),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstructionNode {
    pub opcode: Opcode,
    pub register_a: Option<Register>,
    pub register_b: Option<Register>,
    pub immediate: Option<Immediate>,
    pub label: Option<Label>,

    /// Location of the opcode token.
    pub location: Location,
}

/// Raw bytes placed into the output by a `PUT` directive.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryNode {
    pub bytes: Vec<u8>,
    pub label: Option<Label>,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Instruction(InstructionNode),
    Binary(BinaryNode),
}

impl Node {
    pub fn label(&self) -> Option<&Label> {
        match self {
            Node::Instruction(node) => node.label.as_ref(),
            Node::Binary(node) => node.label.as_ref(),
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Node::Instruction(node) => node.location,
            Node::Binary(node) => node.location,
        }
    }

    /// Number of bytes the node occupies in the output.
    pub fn byte_length(&self) -> usize {
        match self {
            Node::Instruction(node) => node.opcode.definition().byte_length as usize,
            Node::Binary(node) => node.bytes.len(),
        }
    }
}

/// Renders the node as assembly source. Binary nodes become `PUT` directives.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(label) = self.label() {
            writeln!(f, "{}:", label.name)?;
        }

        match self {
            Node::Instruction(node) => {
                let operands = node.register_a.iter()
                    .chain(node.register_b.iter())
                    .map(|r| r.to_string())
                    .chain(node.immediate.iter().map(|imm| imm.to_string()))
                    .collect::<Vec<_>>();

                if operands.is_empty() {
                    write!(f, "    {}", node.opcode)
                } else {
                    write!(
                        f,
                        "    {:width$} {}",
                        node.opcode.mnemonic(),
                        operands.join(", "),
                        width = *LONGEST_MNEMONIC,
                    )
                }
            },
            Node::Binary(node) if node.bytes.is_empty() => Ok(()),
            Node::Binary(node) => {
                write!(f, "    {:width$} \"{}\"", "PUT", escape(&node.bytes), width = *LONGEST_MNEMONIC)
            },
        }
    }
}
