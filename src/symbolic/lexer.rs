//! The lexer: turns string tokens into typed lexical tokens.

use slog::{debug, o, trace, Discard, Logger};

use std::fmt;

use super::token::{StringToken, StringTokenKind};
use crate::instruction::{Opcode, Register};
use crate::parsing::Location;

/// Assembler directives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Directive {
    /// `NAME "text"` names the document.
    Name,

    /// `PUT "text"` or `PUT number` places raw bytes into the output.
    Put,
}

impl Directive {
    pub const ALL: [Directive; 2] = [Directive::Name, Directive::Put];

    pub fn name(self) -> &'static str {
        match self {
            Directive::Name => "NAME",
            Directive::Put => "PUT",
        }
    }

    /// Looks up a directive by its name, ignoring case.
    pub fn from_name(name: &str) -> Option<Directive> {
        let upper = name.to_uppercase();

        Directive::ALL.iter()
            .copied()
            .find(|directive| directive.name() == upper)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Punctuation characters recognized by the lexer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Punctuation {
    Exclaim,
    Sharp,
    Dollar,
    Percent,
    Amp,
    Quote,
    LParen,
    RParen,
    Asterisk,
    Plus,
    Comma,
    Minus,
    Colon,
    LessThan,
    Equals,
    GreaterThan,
    QuestMark,
    At,
    Period,
    FwdSlash,
    LSBrack,
    Backslash,
    RSBrack,
    Caret,
    Backtick,
    LCBrack,
    VertBar,
    RCBrack,
    Tilde,
}

impl Punctuation {
    pub fn from_char(character: char) -> Option<Punctuation> {
        let punctuation = match character {
            '!' => Punctuation::Exclaim,
            '#' => Punctuation::Sharp,
            '$' => Punctuation::Dollar,
            '%' => Punctuation::Percent,
            '&' => Punctuation::Amp,
            '\'' => Punctuation::Quote,
            '(' => Punctuation::LParen,
            ')' => Punctuation::RParen,
            '*' => Punctuation::Asterisk,
            '+' => Punctuation::Plus,
            ',' => Punctuation::Comma,
            '-' => Punctuation::Minus,
            ':' => Punctuation::Colon,
            '<' => Punctuation::LessThan,
            '=' => Punctuation::Equals,
            '>' => Punctuation::GreaterThan,
            '?' => Punctuation::QuestMark,
            '@' => Punctuation::At,
            '.' => Punctuation::Period,
            '/' => Punctuation::FwdSlash,
            '[' => Punctuation::LSBrack,
            '\\' => Punctuation::Backslash,
            ']' => Punctuation::RSBrack,
            '^' => Punctuation::Caret,
            '`' => Punctuation::Backtick,
            '{' => Punctuation::LCBrack,
            '|' => Punctuation::VertBar,
            '}' => Punctuation::RCBrack,
            '~' => Punctuation::Tilde,
            _ => return None,
        };

        Some(punctuation)
    }

    pub fn as_char(self) -> char {
        match self {
            Punctuation::Exclaim => '!',
            Punctuation::Sharp => '#',
            Punctuation::Dollar => '$',
            Punctuation::Percent => '%',
            Punctuation::Amp => '&',
            Punctuation::Quote => '\'',
            Punctuation::LParen => '(',
            Punctuation::RParen => ')',
            Punctuation::Asterisk => '*',
            Punctuation::Plus => '+',
            Punctuation::Comma => ',',
            Punctuation::Minus => '-',
            Punctuation::Colon => ':',
            Punctuation::LessThan => '<',
            Punctuation::Equals => '=',
            Punctuation::GreaterThan => '>',
            Punctuation::QuestMark => '?',
            Punctuation::At => '@',
            Punctuation::Period => '.',
            Punctuation::FwdSlash => '/',
            Punctuation::LSBrack => '[',
            Punctuation::Backslash => '\\',
            Punctuation::RSBrack => ']',
            Punctuation::Caret => '^',
            Punctuation::Backtick => '`',
            Punctuation::LCBrack => '{',
            Punctuation::VertBar => '|',
            Punctuation::RCBrack => '}',
            Punctuation::Tilde => '~',
        }
    }
}

/// The value of a lexical token.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    EndOfLine,

    /// A string literal without the surrounding quotes. Escapes are not processed.
    String(String),

    Register(Register),
    Opcode(Opcode),
    Directive(Directive),

    /// An identifier that is not a register, an opcode or a directive.
    Identifier(String),

    Number(u32),
    Punctuation(Punctuation),
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::EndOfLine => TokenKind::EndOfLine,
            Token::String(_) => TokenKind::String,
            Token::Register(_) => TokenKind::Register,
            Token::Opcode(_) => TokenKind::Opcode,
            Token::Directive(_) => TokenKind::Directive,
            Token::Identifier(_) => TokenKind::Identifier,
            Token::Number(_) => TokenKind::Number,
            Token::Punctuation(p) => TokenKind::Punctuation(*p),
        }
    }
}

/// The kind of a [Token] without its payload. Used for describing expectations in
/// error messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    EndOfLine,
    String,
    Register,
    Opcode,
    Directive,
    Identifier,
    Number,
    Punctuation(Punctuation),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenKind::EndOfLine => write!(f, "end of line"),
            TokenKind::String => write!(f, "string"),
            TokenKind::Register => write!(f, "register"),
            TokenKind::Opcode => write!(f, "opcode"),
            TokenKind::Directive => write!(f, "directive"),
            TokenKind::Identifier => write!(f, "identifier"),
            TokenKind::Number => write!(f, "number"),
            TokenKind::Punctuation(p) => write!(f, "'{}'", p.as_char()),
        }
    }
}

/// A lexical token together with the string token it was made from.
#[derive(Clone, Debug, PartialEq)]
pub struct LexicalToken {
    pub token: Token,
    pub source: StringToken,
}

impl LexicalToken {
    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }

    pub fn location(&self) -> Location {
        self.source.location
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LexError {
    /// The token list was empty.
    EmptyInput,

    /// A token the tokenizer could not classify.
    UnknownToken {
        text: String,
        location: Location,
    },

    /// A symbol token with no punctuation mapping.
    UnmappedSymbol {
        text: String,
        location: Location,
    },

    /// A numeric literal that does not fit in 32 bits.
    NumberOutOfRange {
        text: String,
        location: Location,
    },
}

impl LexError {
    pub fn location(&self) -> Option<Location> {
        match self {
            LexError::EmptyInput => None,
            LexError::UnknownToken { location, .. } => Some(*location),
            LexError::UnmappedSymbol { location, .. } => Some(*location),
            LexError::NumberOutOfRange { location, .. } => Some(*location),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexError::EmptyInput => write!(f, "no tokens to lex"),
            LexError::UnknownToken { text, location } =>
                write!(f, "unknown token {:?} at {}", text, location),
            LexError::UnmappedSymbol { text, location } =>
                write!(f, "unknown symbol {:?} at {}", text, location),
            LexError::NumberOutOfRange { text, location } =>
                write!(f, "number {} at {} is too large", text, location),
        }
    }
}

impl std::error::Error for LexError {}

/// Converts string tokens into lexical tokens.
///
/// Whitespace and comments are dropped. An end of line is only emitted when the output
/// is not empty and does not already end with an end of line, so blank lines collapse
/// and leading blank lines disappear.
///
/// # Errors
/// Returns an error on an empty token list, an unknown token, an unmapped symbol or a
/// number that does not fit in 32 bits.
pub fn lex(tokens: &[StringToken]) -> Result<Vec<LexicalToken>, LexError> {
    lex_with_logger(tokens, None)
}

/// Like [lex], logging every produced token at the trace level.
pub fn lex_with_logger<L>(tokens: &[StringToken], logger: L) -> Result<Vec<LexicalToken>, LexError>
where
    L: Into<Option<Logger>>,
{
    let logger = logger.into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "lex"));

    if tokens.is_empty() {
        return Err(LexError::EmptyInput);
    }

    let mut output: Vec<LexicalToken> = Vec::with_capacity(tokens.len());

    for source in tokens {
        let token = match source.kind {
            StringTokenKind::Whitespace | StringTokenKind::Comment => continue,
            StringTokenKind::Unknown => {
                return Err(LexError::UnknownToken {
                    text: source.text.clone(),
                    location: source.location,
                });
            },
            StringTokenKind::EndOfLine => {
                match output.last() {
                    None => continue,
                    Some(last) if last.token == Token::EndOfLine => continue,
                    Some(_) => Token::EndOfLine,
                }
            },
            StringTokenKind::String => {
                let text = &source.text;
                let inner = text.get(1..text.len().saturating_sub(1)).unwrap_or("");
                Token::String(inner.to_string())
            },
            StringTokenKind::Symbol => {
                let mut chars = source.text.chars();
                let punctuation = match (chars.next(), chars.next()) {
                    (Some(c), None) => Punctuation::from_char(c),
                    _ => None,
                };

                match punctuation {
                    Some(p) => Token::Punctuation(p),
                    None => return Err(LexError::UnmappedSymbol {
                        text: source.text.clone(),
                        location: source.location,
                    }),
                }
            },
            StringTokenKind::HexNumber => {
                Token::Number(parse_number(source, 16)?)
            },
            StringTokenKind::Number => {
                Token::Number(parse_number(source, 10)?)
            },
            StringTokenKind::Identifier => classify(&source.text),
        };

        trace!(logger, "token"; "kind" => ?token.kind(), "line" => source.location.line);

        output.push(LexicalToken {
            token,
            source: source.clone(),
        });
    }

    debug!(logger, "lexed tokens"; "input" => tokens.len(), "output" => output.len());

    Ok(output)
}

fn parse_number(source: &StringToken, radix: u32) -> Result<u32, LexError> {
    let digits = match radix {
        16 => source.text.get(2..).unwrap_or(""),
        _ => source.text.as_str(),
    };

    u32::from_str_radix(digits, radix)
        .map_err(|_| LexError::NumberOutOfRange {
            text: source.text.clone(),
            location: source.location,
        })
}

fn classify(identifier: &str) -> Token {
    if let Some(register) = Register::from_name(identifier) {
        Token::Register(register)
    } else if let Some(opcode) = Opcode::from_mnemonic(identifier) {
        Token::Opcode(opcode)
    } else if let Some(directive) = Directive::from_name(identifier) {
        Token::Directive(directive)
    } else {
        Token::Identifier(identifier.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::token::tokenize;

    fn lex_source(source: &str) -> Vec<Token> {
        let tokens = tokenize(source).expect("tokenization failed");

        lex(&tokens)
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            lex_source("loop: addi b, 0x10 ; x\nPut \"hi\"\nname sp"),
            vec![
                Token::Identifier("loop".to_string()),
                Token::Punctuation(Punctuation::Colon),
                Token::Opcode(Opcode::AddI),
                Token::Register(Register::B),
                Token::Punctuation(Punctuation::Comma),
                Token::Number(16),
                Token::EndOfLine,
                Token::Directive(Directive::Put),
                Token::String("hi".to_string()),
                Token::EndOfLine,
                Token::Directive(Directive::Name),
                Token::Register(Register::SP),
            ],
        );
    }

    #[test]
    fn test_register_before_opcode() {
        // Single letter names are always registers.
        assert_eq!(lex_source("a"), vec![Token::Register(Register::A)]);
        assert_eq!(lex_source("p"), vec![Token::Identifier("p".to_string())]);
    }

    #[test]
    fn test_leading_blank_lines_are_dropped() {
        assert_eq!(lex_source("\n\n\nNOP"), vec![Token::Opcode(Opcode::Nop)]);
        assert_eq!(lex_source("  ; comment\n\n  \nNOP"), vec![Token::Opcode(Opcode::Nop)]);
        assert_eq!(lex_source("\n\n\n"), vec![]);
    }

    #[test]
    fn test_blank_lines_collapse() {
        assert_eq!(
            lex_source("NOP\n\n\n; comment\n\nHALT\n\n"),
            vec![
                Token::Opcode(Opcode::Nop),
                Token::EndOfLine,
                Token::Opcode(Opcode::Halt),
                Token::EndOfLine,
            ],
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex_source("4294967295"), vec![Token::Number(u32::max_value())]);
        assert_eq!(lex_source("0xFFFFFFFF"), vec![Token::Number(u32::max_value())]);

        let tokens = tokenize("COPYI A, 0x100000000").unwrap();
        match lex(&tokens) {
            Err(LexError::NumberOutOfRange { text, location }) => {
                assert_eq!(text, "0x100000000");
                assert_eq!(location.column, 9);
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(lex(&[]), Err(LexError::EmptyInput));

        let unknown = StringToken {
            kind: StringTokenKind::Unknown,
            text: "=".to_string(),
            location: Location::default(),
        };
        assert!(matches!(lex(&[unknown]), Err(LexError::UnknownToken { .. })));

        let unmapped = StringToken {
            kind: StringTokenKind::Symbol,
            text: "\u{00A7}".to_string(),
            location: Location::default(),
        };
        assert!(matches!(lex(&[unmapped]), Err(LexError::UnmappedSymbol { .. })));
    }

    #[test]
    fn test_tokens_keep_their_source() {
        let tokens = tokenize("  HALT").unwrap();
        let lexed = lex(&tokens).unwrap();

        assert_eq!(lexed[0].source.text, "HALT");
        assert_eq!(lexed[0].location().column, 2);
    }
}
