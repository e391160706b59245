//! Error type covering every stage of the toolchain.

use std::fmt;

use crate::compiler::CompileError;
use crate::emulator::ExecutionError;
use crate::parsing::Location;
use crate::symbol_table::FormatError;
use crate::symbolic::lexer::LexError;
use crate::symbolic::parser::ParseError;
use crate::symbolic::token::TokenizeError;

/// Broad classification of an [Error].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// The source contains characters or tokens that are not part of the language.
    Lexical,

    /// The tokens do not form a valid program.
    Syntactic,

    /// The program is well formed but cannot be compiled, for example because of an
    /// undefined label.
    Semantic,

    /// A binary file is malformed.
    Format,

    /// The virtual machine could not continue.
    Execution,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Category::Lexical => "lexical",
            Category::Syntactic => "syntax",
            Category::Semantic => "semantic",
            Category::Format => "format",
            Category::Execution => "execution",
        };

        write!(f, "{} error", name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Tokenize(TokenizeError),
    Lex(LexError),
    Parse(ParseError),
    Compile(CompileError),
    Format(FormatError),
    Execution(ExecutionError),
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Error::Tokenize(_) | Error::Lex(_) => Category::Lexical,
            Error::Parse(_) => Category::Syntactic,
            Error::Compile(_) => Category::Semantic,
            Error::Format(_) => Category::Format,
            Error::Execution(_) => Category::Execution,
        }
    }

    /// Location in the assembly source, for errors that have one.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::Tokenize(error) => error.location(),
            Error::Lex(error) => error.location(),
            Error::Parse(error) => Some(error.location),
            Error::Compile(error) => error.location(),
            Error::Format(_) | Error::Execution(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: ", self.category())?;

        match self {
            Error::Tokenize(error) => fmt::Display::fmt(error, f),
            Error::Lex(error) => fmt::Display::fmt(error, f),
            Error::Parse(error) => fmt::Display::fmt(error, f),
            Error::Compile(error) => fmt::Display::fmt(error, f),
            Error::Format(error) => fmt::Display::fmt(error, f),
            Error::Execution(error) => fmt::Display::fmt(error, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Tokenize(error) => Some(error),
            Error::Lex(error) => Some(error),
            Error::Parse(error) => Some(error),
            Error::Compile(error) => Some(error),
            Error::Format(error) => Some(error),
            Error::Execution(error) => Some(error),
        }
    }
}

macro_rules! impl_from_error {
    ( $variant:ident, $error:ty ) => {
        impl From<$error> for Error {
            fn from(error: $error) -> Error {
                Error::$variant(error)
            }
        }
    };
}

impl_from_error!(Tokenize, TokenizeError);
impl_from_error!(Lex, LexError);
impl_from_error!(Parse, ParseError);
impl_from_error!(Compile, CompileError);
impl_from_error!(Format, FormatError);
impl_from_error!(Execution, ExecutionError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let error: Error = FormatError::BadFlag(7).into();
        assert_eq!(error.category(), Category::Format);
        assert_eq!(error.location(), None);
        assert_eq!(error.to_string(), "format error: unknown flag 7");

        let error: Error = CompileError::UnresolvedLabel {
            name: "x".to_string(),
            location: Location::new(4, 1, 0),
        }.into();
        assert_eq!(error.category(), Category::Semantic);
        assert_eq!(error.location(), Some(Location::new(4, 1, 0)));

        let error: Error = ExecutionError::DivideByZero { address: 2 }.into();
        assert_eq!(error.category(), Category::Execution);
    }
}
