use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use crate::source_map::SourceMap;
use crate::symbol_table::{Mode, SymbolTable};
use crate::symbolic::ast::Node;

/// Output of the [compiler](crate::compiler).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// The encoded program, meant to be loaded at address zero.
    pub bytes: Vec<u8>,

    /// Address of every label.
    pub label_defines: HashMap<String, u16>,

    /// Byte offsets into [bytes](Program::bytes) at which the address of a label was
    /// written, grouped by label.
    pub label_references: HashMap<String, Vec<u16>>,

    /// Byte offsets of every word that holds an address and needs to move when the
    /// program is loaded somewhere else than address zero.
    pub relocations: BTreeSet<u16>,

    pub source_map: SourceMap,
}

impl Program {
    /// Creates a symbol table describing the labels of the program.
    ///
    /// The labels are ordered by address and then by name.
    pub fn symbol_table(&self, mode: Mode) -> SymbolTable {
        let mut labels = self.label_defines.iter()
            .map(|(name, address)| (*address, name.as_str()))
            .collect::<Vec<_>>();

        labels.sort();

        let mut table = SymbolTable::new(mode);

        for (address, name) in labels {
            let references = self.label_references.get(name)
                .cloned()
                .unwrap_or_default();

            table.push(name, address, references);
        }

        table
    }

    /// Returns a copy of the program whose addresses are valid when it is loaded at
    /// `base` instead of zero.
    ///
    /// Every word listed in [relocations](Program::relocations) and every label address
    /// is moved by `base`. Offsets into the byte array are unchanged.
    pub fn relocate(&self, base: u16) -> Program {
        let mut program = self.clone();

        for &offset in &self.relocations {
            let index = offset as usize;

            if let Some(slot) = program.bytes.get_mut(index..index + 2) {
                let word = u16::from_be_bytes([slot[0], slot[1]]).wrapping_add(base);
                slot.copy_from_slice(&word.to_be_bytes());
            }
        }

        for address in program.label_defines.values_mut() {
            *address = address.wrapping_add(base);
        }

        program
    }

    /// Decodes the bytes back into syntax tree nodes.
    pub fn disassemble(&self) -> Vec<Node> {
        super::disassemble(&self.bytes)
    }

    /// Formats the bytes as rows of sixteen bytes, grouped into words.
    ///
    /// ```text
    /// 0000: DE00 0041 DE40 000A DEAD
    /// ```
    pub fn hex_dump(&self) -> String {
        let mut dump = String::new();

        for (row, chunk) in self.bytes.chunks(16).enumerate() {
            let _ = write!(dump, "{:04X}:", row * 16);

            for pair in chunk.chunks(2) {
                dump.push(' ');

                for byte in pair {
                    let _ = write!(dump, "{:02X}", byte);
                }
            }

            dump.push('\n');
        }

        dump
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Program {
        let mut program = Program {
            bytes: vec![0xDE, 0xAA, 0x00, 0x06, 0xFF, 0xF0, 0xDE, 0xAD],
            ..Program::default()
        };

        program.label_defines.insert("end".to_string(), 6);
        program.label_defines.insert("start".to_string(), 0);
        program.label_defines.insert("alias".to_string(), 6);
        program.label_references.insert("end".to_string(), vec![2]);
        program.relocations.insert(2);

        program
    }

    #[test]
    fn test_symbol_table_order() {
        let table = program().symbol_table(Mode::Debug);

        assert_eq!(table.define_addresses, vec![0, 6, 6]);
        assert_eq!(table.names, vec!["start", "alias", "end"]);
        assert_eq!(table.reference_addresses, vec![vec![], vec![], vec![2]]);

        let release = program().symbol_table(Mode::Release);
        assert!(release.names.is_empty());
        assert_eq!(release.define_addresses.len(), 3);
    }

    #[test]
    fn test_relocate() {
        let relocated = program().relocate(0x1000);

        assert_eq!(relocated.bytes, vec![0xDE, 0xAA, 0x10, 0x06, 0xFF, 0xF0, 0xDE, 0xAD]);
        assert_eq!(relocated.label_defines["end"], 0x1006);
        assert_eq!(relocated.label_references["end"], vec![2]);
    }

    #[test]
    fn test_hex_dump() {
        let mut program = program();
        program.bytes.extend((0..9).map(|i| i as u8));

        assert_eq!(
            program.hex_dump(),
            "0000: DEAA 0006 FFF0 DEAD 0001 0203 0405 0607\n0010: 08\n",
        );
    }
}
