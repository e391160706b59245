//! Parsing and storing symbolic assembly programs.
//!
//! The pipeline runs [token::tokenize], [lexer::lex] and [parser::parse] in that order.
//! [Program::parse] does all three.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod token;

pub use self::program::Program;
