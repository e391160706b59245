//! The string tokenizer: splits assembly source into positioned fragments.
//!
//! Tokenization is lossless. Whitespace and comments are kept as tokens so that the
//! texts of all tokens concatenate back into the source, which the
//! [assembler](crate::assembler) relies on when it reconstructs source lines for
//! diagnostics.

use logos::Logos;
use slog::{debug, o, trace, Discard, Logger};

use std::fmt;

use crate::parsing::Location;

/// Kinds of source fragments.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringTokenKind {
    /// A character that does not start any fragment.
    #[error]
    Unknown,

    #[regex(r"\r?\n")]
    EndOfLine,

    #[regex(r"[ \t]+")]
    Whitespace,

    /// A comment from `;` to the end of the line.
    #[regex(r";[^\r\n]*")]
    Comment,

    /// A double quoted string on a single line. Quotes are part of the text.
    #[regex(r#""[^"\r\n]*""#)]
    String,

    /// A single punctuation character.
    #[regex(r"[`~!@#$%^&*()\-+{}\[\]|:',.<>/?]")]
    Symbol,

    #[regex("0[xX][0-9a-fA-F]+")]
    HexNumber,

    #[regex("[0-9]+")]
    Number,

    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,
}

/// A fragment of the source text and its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringToken {
    pub kind: StringTokenKind,
    pub text: String,
    pub location: Location,
}

impl StringToken {
    /// Length of the token text in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Location right after the last character of the token.
    pub fn end(&self) -> Location {
        Location {
            index: self.location.index + self.len(),
            line: self.location.line,
            column: self.location.column + self.len(),
        }
    }
}

impl fmt::Display for StringToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:>4}:{:<3} {:<10} {:?}",
            self.location.line + 1,
            self.location.column + 1,
            format!("{:?}", self.kind),
            self.text,
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenizeError {
    /// The source text was empty.
    EmptyInput,

    /// No fragment pattern matches the source at `location`.
    UnknownCharacter {
        character: char,
        location: Location,
    },
}

impl TokenizeError {
    pub fn location(&self) -> Option<Location> {
        match self {
            TokenizeError::EmptyInput => None,
            TokenizeError::UnknownCharacter { location, .. } => Some(*location),
        }
    }
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenizeError::EmptyInput => write!(f, "cannot tokenize empty source"),
            TokenizeError::UnknownCharacter { character, location } =>
                write!(f, "unknown character {:?} at {}", character, location),
        }
    }
}

impl std::error::Error for TokenizeError {}

/// Splits `source` into tokens.
///
/// # Errors
/// Returns an error if the source is empty or contains a character that does not
/// start any token.
pub fn tokenize(source: &str) -> Result<Vec<StringToken>, TokenizeError> {
    tokenize_with_logger(source, None)
}

/// Like [tokenize], logging every produced token at the trace level.
pub fn tokenize_with_logger<L>(source: &str, logger: L) -> Result<Vec<StringToken>, TokenizeError>
where
    L: Into<Option<Logger>>,
{
    let logger = logger.into()
        .unwrap_or_else(|| Logger::root(Discard, o!()))
        .new(o!("stage" => "tokenize"));

    if source.is_empty() {
        return Err(TokenizeError::EmptyInput);
    }

    let mut lexer = StringTokenKind::lexer(source);
    let mut tokens = Vec::new();
    let mut location = Location::default();

    while let Some(kind) = lexer.next() {
        let text = lexer.slice();

        if kind == StringTokenKind::Unknown {
            let character = text.chars().next().unwrap_or('\u{FFFD}');
            return Err(TokenizeError::UnknownCharacter { character, location });
        }

        let length = text.chars().count();

        trace!(logger, "token";
            "kind" => ?kind,
            "text" => text,
            "line" => location.line,
            "column" => location.column);

        tokens.push(StringToken {
            kind,
            text: text.to_string(),
            location,
        });

        location.index += length;

        if kind == StringTokenKind::EndOfLine {
            location.line += 1;
            location.column = 0;
        } else {
            location.column += length;
        }
    }

    debug!(logger, "tokenized source"; "tokens" => tokens.len(), "lines" => location.line + 1);

    Ok(tokens)
}
