//! The parser: builds the syntax tree from lexical tokens.
//!
//! Parsing is line oriented. A line is an optional `label:` followed by an optional
//! statement, which is either an instruction or a directive. The operands an
//! instruction takes are decided by the [argument shape](crate::instruction::ArgumentShape)
//! of its opcode.

use edit_distance::edit_distance;
use itertools::Itertools;
use slog::{debug, o, trace, Discard, Logger};

use std::collections::HashMap;
use std::fmt;

use super::ast::{BinaryNode, Immediate, InstructionNode, Label, Node};
use super::lexer::{Directive, LexicalToken, Punctuation, Token, TokenKind};
use super::program::Program;
use crate::instruction::{ArgumentShape, Opcode, Register, OPCODES};
use crate::parsing::{Location, TokenStream};
use crate::utils::{unescape, InvalidEscape};

#[derive(Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    /// The token list was empty.
    EmptyInput,

    UnexpectedToken {
        expected: Vec<TokenKind>,
        found: TokenKind,
    },

    /// The input ended while `expected` was still required.
    UnexpectedEnd {
        expected: Vec<TokenKind>,
    },

    DuplicateLabel {
        name: String,
        previous: Location,
    },

    /// An identifier was found where an opcode or a directive was expected.
    UnknownMnemonic {
        name: String,
        suggestion: Option<&'static str>,
    },

    /// `NAME` was used more than once.
    DuplicateName,

    /// An immediate operand was not exactly one number or identifier.
    InvalidImmediate {
        tokens: usize,
    },

    /// A number does not fit in 16 bits.
    NumberOutOfRange(u32),

    InvalidEscape(InvalidEscape),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseErrorKind::EmptyInput => write!(f, "nothing to parse"),
            ParseErrorKind::UnexpectedToken { expected, found } =>
                write!(f, "expected {}, found {}", expected.iter().join(" or "), found),
            ParseErrorKind::UnexpectedEnd { expected } =>
                write!(f, "expected {}, found end of input", expected.iter().join(" or ")),
            ParseErrorKind::DuplicateLabel { name, previous } =>
                write!(f, "label '{}' is already defined at {}", name, previous),
            ParseErrorKind::UnknownMnemonic { name, suggestion: Some(suggestion) } =>
                write!(f, "unknown opcode or directive '{}', did you mean '{}'?", name, suggestion),
            ParseErrorKind::UnknownMnemonic { name, suggestion: None } =>
                write!(f, "unknown opcode or directive '{}'", name),
            ParseErrorKind::DuplicateName => write!(f, "the document name is already set"),
            ParseErrorKind::InvalidImmediate { tokens } =>
                write!(f, "expected a single number or label as the immediate, found {} tokens", tokens),
            ParseErrorKind::NumberOutOfRange(value) =>
                write!(f, "number {} does not fit in 16 bits", value),
            ParseErrorKind::InvalidEscape(escape) => fmt::Display::fmt(escape, f),
        }
    }
}

/// A syntax error and the location of the offending token.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub location: Location,
}

impl ParseError {
    fn new(kind: ParseErrorKind, location: Location) -> ParseError {
        ParseError { kind, location }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.location)
    }
}

impl std::error::Error for ParseError {}

/// Parses lexical tokens into a [Program].
///
/// # Errors
/// Returns the first syntax error encountered.
pub fn parse(tokens: &[LexicalToken]) -> Result<Program, ParseError> {
    parse_with_logger(tokens, None)
}

/// Like [parse], logging every produced node at the trace level.
pub fn parse_with_logger<L>(tokens: &[LexicalToken], logger: L) -> Result<Program, ParseError>
where
    L: Into<Option<Logger>>,
{
    let logger = logger.into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "parse"));

    if tokens.is_empty() {
        return Err(ParseError::new(ParseErrorKind::EmptyInput, Location::default()));
    }

    let mut parser = Parser {
        stream: TokenStream::new(tokens),
        program: Program::default(),
        logger,
    };

    let mut pending = None;

    while !parser.stream.is_at_end() {
        pending = parser.line(pending)?;
    }

    if let Some(label) = pending {
        parser.anchor(label);
    }

    debug!(parser.logger, "parsed program";
        "nodes" => parser.program.nodes.len(),
        "labels" => parser.program.labels.len());

    Ok(parser.program)
}

struct Parser<'a> {
    stream: TokenStream<'a, LexicalToken>,
    program: Program,
    logger: Logger,
}

impl<'a> Parser<'a> {
    /// Parses a single line. Takes the label waiting for a node and returns the label
    /// that is still waiting after the line.
    fn line(&mut self, mut pending: Option<Label>) -> Result<Option<Label>, ParseError> {
        if let Some(label) = self.label()? {
            if let Some(previous) = pending.take() {
                self.anchor(previous);
            }

            pending = Some(label);
        }

        let token = match self.stream.peek() {
            Some(token) => token,
            None => return Ok(pending),
        };

        match &token.token {
            Token::EndOfLine => {
                self.stream.next();
                return Ok(pending);
            },
            Token::Opcode(opcode) => {
                self.stream.next();
                let node = self.instruction(*opcode, token.location(), pending.take())?;
                self.push(node);
            },
            Token::Directive(Directive::Name) => {
                self.stream.next();
                self.name(token.location())?;
            },
            Token::Directive(Directive::Put) => {
                self.stream.next();
                let node = self.put(token.location(), pending.take())?;
                self.push(node);
            },
            Token::Identifier(name) => {
                return Err(ParseError::new(
                    ParseErrorKind::UnknownMnemonic {
                        name: name.clone(),
                        suggestion: suggest(name),
                    },
                    token.location(),
                ));
            },
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken {
                        expected: vec![TokenKind::Opcode, TokenKind::Directive],
                        found: token.kind(),
                    },
                    token.location(),
                ));
            },
        }

        self.end_of_line()?;

        Ok(pending)
    }

    /// Parses `identifier:` at the start of a line.
    fn label(&mut self) -> Result<Option<Label>, ParseError> {
        let (name, location) = match (self.stream.at_offset(0), self.stream.at_offset(1)) {
            (Some(ident), Some(colon)) => match (&ident.token, &colon.token) {
                (Token::Identifier(name), Token::Punctuation(Punctuation::Colon)) =>
                    (name.clone(), ident.location()),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        if let Some(previous) = self.program.labels.get(&name) {
            return Err(ParseError::new(
                ParseErrorKind::DuplicateLabel { name, previous: *previous },
                location,
            ));
        }

        self.stream.seek(2);
        self.program.labels.insert(name.clone(), location);

        trace!(self.logger, "label"; "name" => &name, "line" => location.line);

        Ok(Some(Label { name, location }))
    }

    /// Attaches a label that no node claimed to an empty binary node, so that it points
    /// at the address of whatever follows.
    fn anchor(&mut self, label: Label) {
        let location = label.location;

        self.push(Node::Binary(BinaryNode {
            bytes: Vec::new(),
            label: Some(label),
            location,
        }));
    }

    fn push(&mut self, node: Node) {
        trace!(self.logger, "node"; "node" => %node, "line" => node.location().line);
        self.program.nodes.push(node);
    }

    fn instruction(
        &mut self,
        opcode: Opcode,
        location: Location,
        label: Option<Label>,
    ) -> Result<Node, ParseError> {
        let shape = opcode.shape();

        let (register_a, register_b) = match shape.register_count() {
            0 => (None, None),
            1 => (Some(self.register()?), None),
            _ => {
                let a = self.register()?;
                self.comma()?;
                (Some(a), Some(self.register()?))
            },
        };

        let immediate = if shape.requires_immediate() {
            if shape != ArgumentShape::Immed {
                self.comma()?;
            }

            Some(self.immediate()?)
        } else {
            None
        };

        Ok(Node::Instruction(InstructionNode {
            opcode,
            register_a,
            register_b,
            immediate,
            label,
            location,
        }))
    }

    fn register(&mut self) -> Result<Register, ParseError> {
        let token = self.expect(&[TokenKind::Register])?;

        match token.token {
            Token::Register(register) => Ok(register),
            _ => Err(self.unexpected(token, &[TokenKind::Register])),
        }
    }

    fn comma(&mut self) -> Result<(), ParseError> {
        self.expect(&[TokenKind::Punctuation(Punctuation::Comma)])?;
        Ok(())
    }

    /// Parses an immediate operand: everything up to the end of the line, which must be
    /// a single number or identifier.
    fn immediate(&mut self) -> Result<Immediate, ParseError> {
        let start = self.stream.peek()
            .map(LexicalToken::location)
            .unwrap_or_else(|| self.end_location());

        let tokens = self.stream.consume_while(|t| t.token != Token::EndOfLine);

        match tokens {
            [token] => match &token.token {
                Token::Number(value) => Ok(Immediate::Constant(word(*value, token.location())?)),
                Token::Identifier(name) => Ok(Immediate::Label {
                    name: name.clone(),
                    location: token.location(),
                }),
                _ => Err(ParseError::new(ParseErrorKind::InvalidImmediate { tokens: 1 }, start)),
            },
            _ => Err(ParseError::new(ParseErrorKind::InvalidImmediate { tokens: tokens.len() }, start)),
        }
    }

    fn name(&mut self, location: Location) -> Result<(), ParseError> {
        let token = self.expect(&[TokenKind::String])?;

        let name = match &token.token {
            Token::String(name) => name.clone(),
            _ => return Err(self.unexpected(token, &[TokenKind::String])),
        };

        if self.program.name.is_some() {
            return Err(ParseError::new(ParseErrorKind::DuplicateName, location));
        }

        trace!(self.logger, "document name"; "name" => &name);
        self.program.name = Some(name);

        Ok(())
    }

    fn put(&mut self, location: Location, label: Option<Label>) -> Result<Node, ParseError> {
        let expected = [TokenKind::String, TokenKind::Number];
        let token = self.expect(&expected)?;

        let bytes = match &token.token {
            Token::String(literal) => unescape(literal)
                .map_err(|e| ParseError::new(ParseErrorKind::InvalidEscape(e), token.location()))?,
            Token::Number(value) => word(*value, token.location())?.to_be_bytes().to_vec(),
            _ => return Err(self.unexpected(token, &expected)),
        };

        Ok(Node::Binary(BinaryNode { bytes, label, location }))
    }

    fn end_of_line(&mut self) -> Result<(), ParseError> {
        match self.stream.next() {
            None => Ok(()),
            Some(token) if token.token == Token::EndOfLine => Ok(()),
            Some(token) => Err(self.unexpected(token, &[TokenKind::EndOfLine])),
        }
    }

    /// Consumes the next token if it is one of the `expected` kinds.
    fn expect(&mut self, expected: &[TokenKind]) -> Result<&'a LexicalToken, ParseError> {
        match self.stream.peek() {
            Some(token) if expected.contains(&token.kind()) => {
                self.stream.next();
                Ok(token)
            },
            Some(token) => Err(self.unexpected(token, expected)),
            None => Err(ParseError::new(
                ParseErrorKind::UnexpectedEnd { expected: expected.to_vec() },
                self.end_location(),
            )),
        }
    }

    fn unexpected(&self, token: &LexicalToken, expected: &[TokenKind]) -> ParseError {
        ParseError::new(
            ParseErrorKind::UnexpectedToken {
                expected: expected.to_vec(),
                found: token.kind(),
            },
            token.location(),
        )
    }

    /// Location right after the last consumed token.
    fn end_location(&self) -> Location {
        self.stream.previous()
            .map(|token| token.source.end())
            .unwrap_or_default()
    }
}

fn word(value: u32, location: Location) -> Result<u16, ParseError> {
    if value > u16::max_value() as u32 {
        return Err(ParseError::new(ParseErrorKind::NumberOutOfRange(value), location));
    }

    Ok(value as u16)
}

/// Finds the mnemonic or directive closest to `name`, if any is close enough to be a
/// plausible typo.
fn suggest(name: &str) -> Option<&'static str> {
    let upper = name.to_uppercase();

    OPCODES.iter()
        .map(|definition| definition.mnemonic)
        .chain(Directive::ALL.iter().map(|directive| directive.name()))
        .map(|candidate| (edit_distance(&upper, candidate), candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Collects the label names of a program into a lookup table of their definitions.
pub(crate) fn label_map(nodes: &[Node]) -> HashMap<String, Location> {
    nodes.iter()
        .filter_map(Node::label)
        .map(|label| (label.name.clone(), label.location))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::lexer::lex;
    use crate::symbolic::token::tokenize;

    fn parse_source(source: &str) -> Result<Program, ParseError> {
        let tokens = tokenize(source).expect("tokenization failed");
        let tokens = lex(&tokens).expect("lexing failed");
        parse(&tokens)
    }

    fn instruction(node: &Node) -> &InstructionNode {
        match node {
            Node::Instruction(node) => node,
            Node::Binary(node) => panic!("expected an instruction, found {:?}", node),
        }
    }

    #[test]
    fn test_shapes() {
        let program = parse_source(r#"
            NOP
            INC C
            ADD A, B
            JUMP 0x10
            ADDI B, 3
            JLT A, SP, done
        done:
            HALT
        "#).unwrap();

        assert_eq!(program.nodes.len(), 7);

        let jlt = instruction(&program.nodes[5]);
        assert_eq!(jlt.opcode, Opcode::Jlt);
        assert_eq!(jlt.register_a, Some(Register::A));
        assert_eq!(jlt.register_b, Some(Register::SP));
        assert!(matches!(&jlt.immediate, Some(Immediate::Label { name, .. }) if name == "done"));

        let addi = instruction(&program.nodes[4]);
        assert_eq!(addi.immediate, Some(Immediate::Constant(3)));
        assert_eq!(addi.register_b, None);

        let halt = instruction(&program.nodes[6]);
        assert_eq!(halt.label.as_ref().map(|l| l.name.as_str()), Some("done"));
    }

    #[test]
    fn test_label_on_same_line() {
        let program = parse_source("start: COPYI A, 1\nloop: INC A").unwrap();

        assert_eq!(program.nodes.len(), 2);
        assert_eq!(program.nodes[0].label().unwrap().name, "start");
        assert_eq!(program.nodes[1].label().unwrap().name, "loop");
        assert!(program.labels.contains_key("start"));
    }

    #[test]
    fn test_stacked_and_trailing_labels() {
        let program = parse_source("first:\nsecond:\n  NOP\nend:\n").unwrap();

        assert_eq!(program.nodes.len(), 3);
        assert!(matches!(&program.nodes[0], Node::Binary(b) if b.bytes.is_empty()));
        assert_eq!(program.nodes[0].label().unwrap().name, "first");
        assert_eq!(program.nodes[1].label().unwrap().name, "second");
        assert_eq!(program.nodes[2].label().unwrap().name, "end");
        assert_eq!(program.nodes[2].byte_length(), 0);
    }

    #[test]
    fn test_duplicate_label() {
        let error = parse_source("x: NOP\n\nx: HALT").unwrap_err();

        assert_eq!(
            error.kind,
            ParseErrorKind::DuplicateLabel { name: "x".to_string(), previous: Location::new(0, 0, 0) },
        );
        assert_eq!(error.location.line, 2);
    }

    #[test]
    fn test_unknown_mnemonic() {
        let error = parse_source("  HALTT").unwrap_err();

        assert_eq!(
            error.kind,
            ParseErrorKind::UnknownMnemonic { name: "HALTT".to_string(), suggestion: Some("HALT") },
        );
        assert_eq!(error.location.column, 2);

        let error = parse_source("NOP\nfoobarbaz A").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnknownMnemonic { suggestion: None, .. }));

        // A label after a label is not at the start of the line anymore.
        let error = parse_source("a1: a2: NOP").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnknownMnemonic { ref name, .. } if name == "a2"));
    }

    #[test]
    fn test_shape_mismatch() {
        let error = parse_source("ADD A 5").unwrap_err();
        assert_eq!(
            error.kind,
            ParseErrorKind::UnexpectedToken {
                expected: vec![TokenKind::Punctuation(Punctuation::Comma)],
                found: TokenKind::Number,
            },
        );
        assert_eq!(error.location.column, 6);
        assert_eq!(
            error.to_string(),
            "expected ',', found number at line 1 col 7",
        );

        let error = parse_source("INC").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::UnexpectedEnd { expected: vec![TokenKind::Register] });
        assert_eq!(error.location.column, 3);

        let error = parse_source("HALT A").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnexpectedToken { found: TokenKind::Register, .. }));
    }

    #[test]
    fn test_immediates() {
        let error = parse_source("JUMP a b").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidImmediate { tokens: 2 });

        let error = parse_source("ADDI A,\nNOP").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidImmediate { tokens: 0 });

        let error = parse_source("ADDI A, B").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidImmediate { tokens: 1 });

        let error = parse_source("COPYI A, 65536").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::NumberOutOfRange(65536));

        let program = parse_source("COPYI A, 65535").unwrap();
        assert_eq!(instruction(&program.nodes[0]).immediate, Some(Immediate::Constant(0xFFFF)));
    }

    #[test]
    fn test_directives() {
        let program = parse_source("NAME \"demo\"\ndata: PUT \"A\\x00\"\nPUT 0x1234\n").unwrap();

        assert_eq!(program.name.as_deref(), Some("demo"));
        assert_eq!(program.nodes.len(), 2);
        assert!(matches!(&program.nodes[0], Node::Binary(b) if b.bytes == vec![0x41, 0x00]));
        assert_eq!(program.nodes[0].label().unwrap().name, "data");
        assert!(matches!(&program.nodes[1], Node::Binary(b) if b.bytes == vec![0x12, 0x34]));

        let error = parse_source("NAME \"a\"\nNAME \"b\"").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::DuplicateName);

        let error = parse_source("PUT A").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnexpectedToken { found: TokenKind::Register, .. }));

        let error = parse_source("PUT \"\\q\"").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::InvalidEscape(_)));
    }

    #[test]
    fn test_name_keeps_label_pending() {
        let program = parse_source("top:\nNAME \"x\"\nNOP").unwrap();

        assert_eq!(program.nodes.len(), 1);
        assert_eq!(program.nodes[0].label().unwrap().name, "top");
    }

    #[test]
    fn test_stray_tokens() {
        let error = parse_source("5").unwrap_err();
        assert!(matches!(error.kind, ParseErrorKind::UnexpectedToken { found: TokenKind::Number, .. }));

        let error = parse_source("NOP ,").unwrap_err();
        assert!(matches!(
            error.kind,
            ParseErrorKind::UnexpectedToken { found: TokenKind::Punctuation(Punctuation::Comma), .. }
        ));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse(&[]).unwrap_err().kind, ParseErrorKind::EmptyInput);
    }

    #[test]
    fn test_label_map() {
        let program = parse_source("a1: NOP\na2: NOP").unwrap();
        assert_eq!(label_map(&program.nodes), program.labels);
    }
}
