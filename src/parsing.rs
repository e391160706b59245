//! Source locations and the token stream shared by the symbolic stages.

use std::fmt;

/// A position in the assembly source. All fields are zero-based and count characters,
/// not bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    /// Offset from the beginning of the source.
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(index: usize, line: usize, column: usize) -> Location {
        Location { index, line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {} col {}", self.line + 1, self.column + 1)
    }
}

/// A cursor over a slice of tokens.
///
/// The parser only ever needs to look a couple of tokens ahead, so the whole token
/// list is kept in memory and positions are plain indices.
#[derive(Clone, Debug)]
pub struct TokenStream<'a, T> {
    buffer: &'a [T],
    position: usize,
}

impl<'a, T> TokenStream<'a, T> {
    pub fn new(buffer: &'a [T]) -> TokenStream<'a, T> {
        TokenStream { buffer, position: 0 }
    }

    /// Index of the next token.
    pub fn offset(&self) -> usize {
        self.position
    }

    /// Returns the token `offset` tokens away from the current position without
    /// consuming anything. Negative offsets look at already consumed tokens.
    pub fn at_offset(&self, offset: isize) -> Option<&'a T> {
        let index = self.position as isize + offset;

        if index < 0 {
            return None;
        }

        self.buffer.get(index as usize)
    }

    pub fn peek(&self) -> Option<&'a T> {
        self.at_offset(0)
    }

    /// The most recently consumed token.
    pub fn previous(&self) -> Option<&'a T> {
        self.at_offset(-1)
    }

    /// Moves the cursor by `amount` tokens, clamped to the buffer boundaries.
    pub fn seek(&mut self, amount: isize) {
        let target = self.position as isize + amount;
        self.position = target.max(0).min(self.buffer.len() as isize) as usize;
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.buffer.len()
    }

    /// Consumes tokens while `predicate` holds and returns them.
    pub fn consume_while<P>(&mut self, mut predicate: P) -> &'a [T]
    where
        P: FnMut(&T) -> bool,
    {
        let start = self.position;

        while let Some(token) = self.peek() {
            if !predicate(token) {
                break;
            }

            self.position += 1;
        }

        &self.buffer[start..self.position]
    }
}

impl<'a, T> Iterator for TokenStream<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let token = self.buffer.get(self.position)?;
        self.position += 1;
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_navigation() {
        let tokens = [1, 2, 3, 4];
        let mut stream = TokenStream::new(&tokens[..]);

        assert_eq!(stream.peek(), Some(&1));
        assert_eq!(stream.previous(), None);
        assert_eq!(stream.next(), Some(&1));
        assert_eq!(stream.at_offset(1), Some(&3));
        assert_eq!(stream.consume_while(|t| *t < 4), &[2, 3]);
        assert_eq!(stream.previous(), Some(&3));

        stream.seek(-10);
        assert_eq!(stream.offset(), 0);

        stream.seek(10);
        assert!(stream.is_at_end());
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new(12, 2, 4).to_string(), "line 3 col 5");
    }
}
