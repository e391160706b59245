use crate::instruction::Instruction;
use crate::parsing::Location;
use crate::symbolic::ast::{BinaryNode, Immediate, InstructionNode, Node};

/// Decodes bytes into syntax tree nodes.
///
/// Every word that decodes to an instruction becomes an instruction node. Words that
/// do not decode, instructions whose immediate is cut off by the end of the input and
/// a trailing odd byte are collected into binary nodes. Labels are not recovered, so
/// immediates are always constants.
pub fn disassemble(bytes: &[u8]) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut binary = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let rest = &bytes[offset..];

        let decoded = match rest {
            [high, low, ..] => Instruction::decode(u16::from_be_bytes([*high, *low])).ok(),
            _ => None,
        };

        let instruction = decoded.and_then(|mut instruction| {
            if !instruction.opcode.shape().requires_immediate() {
                return Some(instruction);
            }

            match rest {
                [_, _, high, low, ..] => {
                    instruction.immediate = Some(u16::from_be_bytes([*high, *low]));
                    Some(instruction)
                },
                _ => None,
            }
        });

        match instruction {
            Some(instruction) => {
                flush(&mut nodes, &mut binary);
                offset += instruction.byte_length() as usize;

                nodes.push(Node::Instruction(InstructionNode {
                    opcode: instruction.opcode,
                    register_a: instruction.register_a,
                    register_b: instruction.register_b,
                    immediate: instruction.immediate.map(Immediate::Constant),
                    label: None,
                    location: Location::default(),
                }));
            },
            None => {
                let length = rest.len().min(2);
                binary.extend_from_slice(&rest[..length]);
                offset += length;
            },
        }
    }

    flush(&mut nodes, &mut binary);

    nodes
}

fn flush(nodes: &mut Vec<Node>, binary: &mut Vec<u8>) {
    if binary.is_empty() {
        return;
    }

    nodes.push(Node::Binary(BinaryNode {
        bytes: std::mem::replace(binary, Vec::new()),
        label: None,
        location: Location::default(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Opcode, Register};

    #[test]
    fn test_disassemble() {
        let nodes = disassemble(&[
            0xA0, 0x12,
            0x00, 0x00, 0x12, 0x34,
            0xDE, 0xAA, 0xF0, 0x0D,
            0xDE, 0xAD,
            0xAF, 0x01,
        ]);

        assert_eq!(nodes.len(), 5);

        match &nodes[0] {
            Node::Instruction(node) => {
                assert_eq!(node.opcode, Opcode::Add);
                assert_eq!(node.register_a, Some(Register::B));
                assert_eq!(node.register_b, Some(Register::C));
            },
            other => panic!("unexpected node {:?}", other),
        }

        assert!(matches!(&nodes[1], Node::Binary(b) if b.bytes == vec![0x00, 0x00, 0x12, 0x34]));
        assert!(matches!(
            &nodes[2],
            Node::Instruction(n) if n.opcode == Opcode::Jump && n.immediate == Some(Immediate::Constant(0xF00D))
        ));
        assert!(matches!(&nodes[3], Node::Instruction(n) if n.opcode == Opcode::Halt));

        // ADDI without room for its immediate.
        assert!(matches!(&nodes[4], Node::Binary(b) if b.bytes == vec![0xAF, 0x01]));
    }

    #[test]
    fn test_odd_trailing_byte() {
        let nodes = disassemble(&[0xFF, 0xF0, 0x42]);

        assert_eq!(nodes.len(), 2);
        assert!(matches!(&nodes[1], Node::Binary(b) if b.bytes == vec![0x42]));
    }
}
