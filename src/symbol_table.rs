//! Binary symbol table format.
//!
//! All integers are big-endian.
//!
//! ```text
//! u16  magic (0xABEF)
//! u8   version (1)
//! u8   flag (0 = release, 2 = debug)
//! u16  label count, followed by that many define addresses
//! u16  label count, followed by one reference list per label:
//!        u16 reference count, followed by that many addresses
//! u16  external symbol count (always 0)
//! u16  public symbol count (always 0)
//! u16  extra delta count (always 0)
//! debug only:
//! u16  label count, followed by one name per label:
//!        u16 byte length, followed by that many bytes of UTF-8
//! ```

use itertools::Itertools;
use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::multi::count;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use std::convert::TryFrom;
use std::fmt;

pub const MAGIC: u16 = 0xABEF;
pub const VERSION: u8 = 1;

/// Whether the label names are stored in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Release,
    Debug,
}

impl Mode {
    pub fn flag(self) -> u8 {
        match self {
            Mode::Release => 0,
            Mode::Debug => 2,
        }
    }

    pub fn from_flag(flag: u8) -> Option<Mode> {
        match flag {
            0 => Some(Mode::Release),
            2 => Some(Mode::Debug),
            _ => None,
        }
    }
}

impl Default for Mode {
    fn default() -> Mode {
        Mode::Release
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatError {
    BadMagic(u16),
    BadVersion(u8),
    BadFlag(u8),

    /// A section lists a different number of entries than there are labels.
    CountMismatch {
        section: &'static str,
        expected: usize,
        found: usize,
    },

    /// One of the reserved sections is not empty.
    UnsupportedSection(&'static str),

    /// The name of the label at `index` is not valid UTF-8.
    InvalidName {
        index: usize,
    },

    /// The input ends in the middle of the field starting at `offset`.
    Truncated {
        offset: usize,
    },

    /// Bytes remain after the table.
    TrailingData {
        offset: usize,
    },

    /// A section has too many entries to be counted with 16 bits.
    TooLarge(&'static str),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormatError::BadMagic(magic) =>
                write!(f, "bad magic number 0x{:04X}, expected 0x{:04X}", magic, MAGIC),
            FormatError::BadVersion(version) =>
                write!(f, "unsupported version {}, expected {}", version, VERSION),
            FormatError::BadFlag(flag) =>
                write!(f, "unknown flag {}", flag),
            FormatError::CountMismatch { section, expected, found } =>
                write!(f, "{} section has {} entries, expected {}", section, found, expected),
            FormatError::UnsupportedSection(section) =>
                write!(f, "{} section is not supported and must be empty", section),
            FormatError::InvalidName { index } =>
                write!(f, "name of label {} is not valid UTF-8", index),
            FormatError::Truncated { offset } =>
                write!(f, "unexpected end of input at offset {}", offset),
            FormatError::TrailingData { offset } =>
                write!(f, "unexpected data after the table at offset {}", offset),
            FormatError::TooLarge(section) =>
                write!(f, "{} section has more than 65535 entries", section),
        }
    }
}

impl std::error::Error for FormatError {}

/// Labels of a compiled program.
///
/// The three vectors are parallel: entry `i` of each describes the same label. `names`
/// is empty in [Mode::Release].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolTable {
    pub mode: Mode,
    pub define_addresses: Vec<u16>,
    pub reference_addresses: Vec<Vec<u16>>,
    pub names: Vec<String>,
}

impl SymbolTable {
    pub fn new(mode: Mode) -> SymbolTable {
        SymbolTable {
            mode,
            ..SymbolTable::default()
        }
    }

    /// Appends a label. The name is only kept in [Mode::Debug].
    pub fn push(&mut self, name: &str, address: u16, references: Vec<u16>) {
        self.define_addresses.push(address);
        self.reference_addresses.push(references);

        if self.mode == Mode::Debug {
            self.names.push(name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.define_addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.define_addresses.is_empty()
    }

    /// Encodes the table.
    ///
    /// # Errors
    /// Fails if the sections disagree on the number of labels or a count does not fit
    /// in 16 bits.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let labels = self.len();

        if self.reference_addresses.len() != labels {
            return Err(FormatError::CountMismatch {
                section: "references",
                expected: labels,
                found: self.reference_addresses.len(),
            });
        }

        if self.mode == Mode::Debug && self.names.len() != labels {
            return Err(FormatError::CountMismatch {
                section: "names",
                expected: labels,
                found: self.names.len(),
            });
        }

        let mut bytes = Vec::new();

        bytes.extend_from_slice(&MAGIC.to_be_bytes());
        bytes.push(VERSION);
        bytes.push(self.mode.flag());

        put_count(&mut bytes, labels, "defines")?;
        put_words(&mut bytes, &self.define_addresses);

        put_count(&mut bytes, labels, "references")?;
        for references in &self.reference_addresses {
            put_count(&mut bytes, references.len(), "references")?;
            put_words(&mut bytes, references);
        }

        // External, public and extra delta sections.
        bytes.extend_from_slice(&[0; 6]);

        if self.mode == Mode::Debug {
            put_count(&mut bytes, labels, "names")?;

            for name in &self.names {
                put_count(&mut bytes, name.len(), "names")?;
                bytes.extend_from_slice(name.as_bytes());
            }
        }

        Ok(bytes)
    }

    /// Decodes a table, requiring that `bytes` contains exactly one.
    pub fn from_bytes(bytes: &[u8]) -> Result<SymbolTable, FormatError> {
        let offset = |rest: &[u8]| bytes.len() - rest.len();

        match table(bytes) {
            Ok((rest, table)) if rest.is_empty() => Ok(table),
            Ok((rest, _)) => Err(FormatError::TrailingData { offset: offset(rest) }),
            Err(nom::Err::Error(failure)) | Err(nom::Err::Failure(failure)) => {
                let input = failure.input;

                Err(failure.error.unwrap_or_else(|| FormatError::Truncated {
                    offset: offset(input),
                }))
            },
            Err(nom::Err::Incomplete(_)) => Err(FormatError::Truncated { offset: bytes.len() }),
        }
    }
}

impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = match self.mode {
            Mode::Release => "release",
            Mode::Debug => "debug",
        };

        writeln!(f, "symbol table ({}, {} labels)", mode, self.len())?;

        let width = self.names.iter()
            .map(|name| name.len())
            .max()
            .unwrap_or(0);

        for (index, address) in self.define_addresses.iter().enumerate() {
            let name = match self.names.get(index) {
                Some(name) => name.clone(),
                None => format!("#{}", index),
            };

            write!(f, "{:04X}  {:width$}", address, name, width = width)?;

            if let Some(references) = self.reference_addresses.get(index) {
                if !references.is_empty() {
                    let references = references.iter()
                        .map(|address| format!("{:04X}", address))
                        .join(" ");

                    write!(f, "  refs: {}", references)?;
                }
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

fn put_count(bytes: &mut Vec<u8>, count: usize, section: &'static str) -> Result<(), FormatError> {
    let count = u16::try_from(count).map_err(|_| FormatError::TooLarge(section))?;
    bytes.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

fn put_words(bytes: &mut Vec<u8>, words: &[u16]) {
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
}

/// Parser error carrying the input at which decoding stopped.
///
/// `error` is [None] when one of the nom primitives ran out of input.
#[derive(Debug)]
struct Failure<'a> {
    input: &'a [u8],
    error: Option<FormatError>,
}

impl<'a> nom::error::ParseError<&'a [u8]> for Failure<'a> {
    fn from_error_kind(input: &'a [u8], _kind: ErrorKind) -> Self {
        Failure { input, error: None }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type Res<'a, T> = IResult<&'a [u8], T, Failure<'a>>;

fn fail<T>(input: &[u8], error: FormatError) -> Res<T> {
    Err(nom::Err::Failure(Failure { input, error: Some(error) }))
}

fn word(input: &[u8]) -> Res<u16> {
    be_u16(input)
}

fn byte(input: &[u8]) -> Res<u8> {
    be_u8(input)
}

fn header(input: &[u8]) -> Res<Mode> {
    let (rest, magic) = word(input)?;
    if magic != MAGIC {
        return fail(input, FormatError::BadMagic(magic));
    }

    let (input, version) = byte(rest)?;
    if version != VERSION {
        return fail(rest, FormatError::BadVersion(version));
    }

    let (rest, flag) = byte(input)?;
    match Mode::from_flag(flag) {
        Some(mode) => Ok((rest, mode)),
        None => fail(input, FormatError::BadFlag(flag)),
    }
}

fn words(input: &[u8]) -> Res<Vec<u16>> {
    let (input, length) = word(input)?;
    count(word, length as usize)(input)
}

fn name(input: &[u8]) -> Res<&[u8]> {
    let (input, length) = word(input)?;
    take(length as usize)(input)
}

/// Reads a section count and checks that it matches the number of labels.
fn section_count<'a>(input: &'a [u8], section: &'static str, expected: usize) -> Res<'a, usize> {
    let (rest, found) = word(input)?;
    let found = found as usize;

    if found != expected {
        return fail(input, FormatError::CountMismatch { section, expected, found });
    }

    Ok((rest, found))
}

fn reserved<'a>(input: &'a [u8], section: &'static str) -> Res<'a, ()> {
    let (rest, length) = word(input)?;

    if length != 0 {
        return fail(input, FormatError::UnsupportedSection(section));
    }

    Ok((rest, ()))
}

fn table(input: &[u8]) -> Res<SymbolTable> {
    let (input, mode) = header(input)?;
    let (input, define_addresses) = words(input)?;
    let labels = define_addresses.len();

    let (input, _) = section_count(input, "references", labels)?;
    let (input, reference_addresses) = count(words, labels)(input)?;

    let (input, _) = reserved(input, "external symbol")?;
    let (input, _) = reserved(input, "public symbol")?;
    let (mut input, _) = reserved(input, "extra delta")?;

    let mut names = Vec::new();

    if mode == Mode::Debug {
        let (rest, _) = section_count(input, "names", labels)?;
        input = rest;

        for index in 0..labels {
            let start = input;
            let (rest, bytes) = name(input)?;
            input = rest;

            match std::str::from_utf8(bytes) {
                Ok(name) => names.push(name.to_string()),
                Err(_) => return fail(start, FormatError::InvalidName { index }),
            }
        }
    }

    let table = SymbolTable {
        mode,
        define_addresses,
        reference_addresses,
        names,
    };

    Ok((input, table))
}
