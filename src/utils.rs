//! String literal escaping shared by the parser and the listing renderer.

use std::fmt;

/// An escape sequence that could not be decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidEscape(pub String);

impl fmt::Display for InvalidEscape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid escape sequence '\\{}'", self.0)
    }
}

/// Decodes the escapes of a string literal into bytes.
///
/// Plain characters are encoded as UTF-8. `\xHH` produces the single byte `HH` and
/// `\uHHHH` the UTF-8 encoding of the code point. The remaining escapes are
/// `\\ \" \' \0 \a \b \f \n \r \t \v`.
pub fn unescape(literal: &str) -> Result<Vec<u8>, InvalidEscape> {
    let mut bytes = Vec::with_capacity(literal.len());
    let mut chars = literal.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buffer = [0; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
            continue;
        }

        let escape = chars.next().ok_or_else(|| InvalidEscape(String::new()))?;

        let byte = match escape {
            '\\' => b'\\',
            '"' => b'"',
            '\'' => b'\'',
            '0' => 0x00,
            'a' => 0x07,
            'b' => 0x08,
            'f' => 0x0C,
            'n' => b'\n',
            'r' => b'\r',
            't' => b'\t',
            'v' => 0x0B,
            'x' => {
                let digits: String = chars.by_ref().take(2).collect();
                hex_value(&digits, 2)
                    .map(|value| value as u8)
                    .ok_or_else(|| InvalidEscape(format!("x{}", digits)))?
            },
            'u' => {
                let digits: String = chars.by_ref().take(4).collect();
                let c = hex_value(&digits, 4)
                    .and_then(std::char::from_u32)
                    .ok_or_else(|| InvalidEscape(format!("u{}", digits)))?;

                let mut buffer = [0; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
                continue;
            },
            other => return Err(InvalidEscape(other.to_string())),
        };

        bytes.push(byte);
    }

    Ok(bytes)
}

fn hex_value(digits: &str, length: usize) -> Option<u32> {
    if digits.len() != length {
        return None;
    }

    u32::from_str_radix(digits, 16).ok()
}

/// Renders bytes as the body of a string literal that [unescape] decodes back into the
/// same bytes.
pub fn escape(bytes: &[u8]) -> String {
    let mut literal = String::with_capacity(bytes.len());

    for &byte in bytes {
        match byte {
            b'\\' => literal.push_str("\\\\"),
            b'\n' => literal.push_str("\\n"),
            b'\r' => literal.push_str("\\r"),
            b'\t' => literal.push_str("\\t"),
            // String literals cannot contain a quote, even an escaped one.
            b'"' => literal.push_str("\\x22"),
            0x20..=0x7E => literal.push(byte as char),
            _ => literal.push_str(&format!("\\x{:02X}", byte)),
        }
    }

    literal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("Hi!\\n").unwrap(), b"Hi!\n".to_vec());
        assert_eq!(unescape("\\\"q\\\" \\\\").unwrap(), b"\"q\" \\".to_vec());
        assert_eq!(unescape("\\x00\\xfF").unwrap(), vec![0x00, 0xFF]);
        assert_eq!(unescape("\\u00e4").unwrap(), "ä".as_bytes().to_vec());
        assert_eq!(unescape("ä").unwrap(), vec![0xC3, 0xA4]);
        assert_eq!(unescape("\\0\\a\\b\\f\\v\\t\\r").unwrap(), vec![0, 7, 8, 12, 11, 9, 13]);
    }

    #[test]
    fn test_invalid_escapes() {
        assert_eq!(unescape("\\q"), Err(InvalidEscape("q".to_string())));
        assert_eq!(unescape("\\x4"), Err(InvalidEscape("x4".to_string())));
        assert_eq!(unescape("\\uD800"), Err(InvalidEscape("uD800".to_string())));
        assert_eq!(unescape("trailing\\"), Err(InvalidEscape(String::new())));
    }

    #[test]
    fn test_escape_is_reversible() {
        let bytes = vec![b'a', b'"', 0x00, 0xFF, b'\\', b'\n', b' '];
        assert_eq!(unescape(&escape(&bytes)).unwrap(), bytes);
        assert!(!escape(&bytes).contains('"'));
    }
}
