use slog::{o, Discard, Logger};

use std::collections::HashMap;
use std::fmt;

use super::ast::Node;
use super::{lexer, parser, token};
use crate::bytecode;
use crate::compiler::{compile_with_logger, CompileError};
use crate::error::Error;
use crate::parsing::Location;

/// A parsed assembly document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    /// The name given with the `NAME` directive.
    pub name: Option<String>,

    pub nodes: Vec<Node>,

    /// Every label of the document and the location of its definition.
    pub labels: HashMap<String, Location>,
}

impl Program {
    /// Builds a program from already constructed nodes, such as the output of the
    /// [disassembler](crate::bytecode::disassemble).
    pub fn from_nodes(nodes: Vec<Node>) -> Program {
        Program {
            name: None,
            labels: parser::label_map(&nodes),
            nodes,
        }
    }

    /// Tokenizes, lexes and parses assembly source.
    ///
    /// # Errors
    /// Returns the first lexical or syntax error.
    pub fn parse(source: &str) -> Result<Program, Error> {
        Program::parse_with_logger(source, None)
    }

    pub fn parse_with_logger<L>(source: &str, logger: L) -> Result<Program, Error>
    where
        L: Into<Option<Logger>>,
    {
        let logger = logger.into().unwrap_or_else(|| Logger::root(Discard, o!()));

        let tokens = token::tokenize_with_logger(source, logger.clone())?;
        let tokens = lexer::lex_with_logger(&tokens, logger.clone())?;
        let program = parser::parse_with_logger(&tokens, logger)?;

        Ok(program)
    }

    /// Generates bytecode for the program.
    pub fn compile(&self) -> Result<bytecode::Program, CompileError> {
        compile_with_logger(self, None)
    }
}

/// Renders the program as assembly source that parses back into the same nodes.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "NAME \"{}\"", name)?;
        }

        for node in &self.nodes {
            writeln!(f, "{}", node)?;
        }

        Ok(())
    }
}
