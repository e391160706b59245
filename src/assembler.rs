//! Running the whole build from assembly source to bytecode and symbol table.

use slog::{debug, error, o, Discard, Logger};

use std::fmt;

use crate::bytecode;
use crate::compiler::compile_with_logger;
use crate::error::Error;
use crate::parsing::Location;
use crate::symbol_table::{FormatError, Mode, SymbolTable};
use crate::symbolic;
use crate::symbolic::lexer::lex_with_logger;
use crate::symbolic::parser::parse_with_logger;
use crate::symbolic::token::{tokenize_with_logger, StringToken, StringTokenKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Store label names in the symbol table.
    pub debug_symbols: bool,
}

impl BuildOptions {
    pub fn symbol_mode(&self) -> Mode {
        if self.debug_symbols {
            Mode::Debug
        } else {
            Mode::Release
        }
    }
}

/// Everything produced by a successful build.
#[derive(Clone, Debug)]
pub struct Build {
    /// The name given with the `NAME` directive.
    pub name: Option<String>,
    pub tokens: Vec<StringToken>,
    pub program: symbolic::Program,
    pub bytecode: bytecode::Program,
    pub symbol_table: SymbolTable,
}

impl Build {
    pub fn bytes(&self) -> &[u8] {
        &self.bytecode.bytes
    }

    /// Encodes the symbol table.
    pub fn symbol_bytes(&self) -> Result<Vec<u8>, FormatError> {
        self.symbol_table.to_bytes()
    }
}

/// A failed build.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildError {
    pub error: Error,

    /// The offending source line with a caret under the error location, followed by the
    /// error message. Only available for errors found after tokenization.
    pub diagnostic: Option<String>,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.diagnostic {
            Some(diagnostic) => write!(f, "{}", diagnostic),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct Assembler {
    options: BuildOptions,

    /// Passed on to every stage, which add their own `stage` key.
    root: Logger,
    log: Logger,
}

impl Assembler {
    pub fn new(options: BuildOptions) -> Assembler {
        Assembler::with_logger(options, None)
    }

    pub fn with_logger<L>(options: BuildOptions, logger: L) -> Assembler
    where
        L: Into<Option<Logger>>,
    {
        let root = logger.into().unwrap_or_else(|| Logger::root(Discard, o!()));
        let log = root.new(o!("stage" => "build"));

        Assembler { options, root, log }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Assembles `source`.
    ///
    /// # Errors
    /// Returns the first error of any stage. No output is produced for a failed build.
    pub fn build(&self, source: &str) -> Result<Build, BuildError> {
        let tokens = tokenize_with_logger(source, self.root.clone())
            .map_err(|err| self.fail(None, err.into()))?;

        let lexed = lex_with_logger(&tokens, self.root.clone())
            .map_err(|err| self.fail(Some(&tokens[..]), err.into()))?;

        let program = parse_with_logger(&lexed, self.root.clone())
            .map_err(|err| self.fail(Some(&tokens[..]), err.into()))?;

        let bytecode = compile_with_logger(&program, self.root.clone())
            .map_err(|err| self.fail(Some(&tokens[..]), err.into()))?;

        let symbol_table = bytecode.symbol_table(self.options.symbol_mode());

        debug!(self.log, "build finished";
            "name" => program.name.as_ref().map(String::as_str).unwrap_or("<unnamed>"),
            "bytes" => bytecode.bytes.len(),
            "labels" => symbol_table.len());

        Ok(Build {
            name: program.name.clone(),
            tokens,
            program,
            bytecode,
            symbol_table,
        })
    }

    fn fail(&self, tokens: Option<&[StringToken]>, error: Error) -> BuildError {
        let diagnostic = match (tokens, error.location()) {
            (Some(tokens), Some(location)) => Some(diagnostic(tokens, location, &error.to_string())),
            _ => None,
        };

        match &diagnostic {
            Some(diagnostic) => error!(self.log, "build failed\n{}", diagnostic),
            None => error!(self.log, "build failed"; "error" => %error),
        }

        BuildError { error, diagnostic }
    }
}

/// Renders an error message under the source line it refers to.
///
/// ```text
///   3|    ADD A
///              ^
/// syntax error: expected ',', found end of line at line 3 col 10
/// ```
///
/// The line text is put back together from the tokens on the line, so `tokens` must be
/// the complete output of the tokenizer.
pub fn diagnostic(tokens: &[StringToken], location: Location, message: &str) -> String {
    let line = tokens.iter()
        .filter(|token| token.location.line == location.line)
        .filter(|token| token.kind != StringTokenKind::EndOfLine)
        .map(|token| token.text.as_str())
        .collect::<String>();

    let prefix = format!("{:3}|", location.line + 1);
    let padding = " ".repeat(prefix.len() + location.column);

    format!("{}{}\n{}^\n{}", prefix, line, padding, message)
}
