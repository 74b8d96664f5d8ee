use std::fmt::{Display, Formatter};
use std::str::Chars;

use crate::Pep508Error;

/// A [`Cursor`] over a requirement or marker string.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    input: &'a str,
    chars: Chars<'a>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars(),
            pos: 0,
        }
    }

    /// Returns the current byte position of the cursor.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Returns a slice over the input string.
    pub(crate) fn slice(&self, start: usize, len: usize) -> &'a str {
        &self.input[start..start + len]
    }

    /// Peeks the next character and position from the input stream without consuming it.
    pub(crate) fn peek(&self) -> Option<(usize, char)> {
        self.chars.clone().next().map(|char| (self.pos, char))
    }

    /// Peeks the next character from the input stream without consuming it.
    pub(crate) fn peek_char(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// Eats the next character from the input stream if it matches the given token.
    pub(crate) fn eat_char(&mut self, token: char) -> Option<usize> {
        let (start_pos, peek_char) = self.peek()?;
        if peek_char == token {
            self.next();
            Some(start_pos)
        } else {
            None
        }
    }

    pub(crate) fn eat_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    /// Returns the next character and position from the input stream and consumes it.
    pub(crate) fn next(&mut self) -> Option<(usize, char)> {
        let pos = self.pos;
        let char = self.chars.next()?;
        self.pos += char.len_utf8();
        Some((pos, char))
    }

    /// The number of bytes left in the input.
    pub(crate) fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    /// Peeks over the cursor as long as the condition is met, without consuming it.
    pub(crate) fn peek_while(&self, condition: impl Fn(char) -> bool) -> (usize, usize) {
        let len = self
            .chars
            .clone()
            .take_while(|c| condition(*c))
            .map(char::len_utf8)
            .sum();
        (self.pos, len)
    }

    /// Consumes characters from the cursor as long as the condition is met.
    pub(crate) fn take_while(&mut self, condition: impl Fn(char) -> bool) -> (usize, usize) {
        let start = self.pos();
        let mut len = 0;
        while let Some(char) = self.peek_char() {
            if !condition(char) {
                break;
            }
            self.next();
            len += char.len_utf8();
        }
        (start, len)
    }

    /// Consumes one character, raising an error if it doesn't match the given token.
    pub(crate) fn next_expect_char(
        &mut self,
        expected: char,
        span_start: usize,
    ) -> Result<(), Pep508Error> {
        match self.next() {
            None => Err(Pep508Error::new(
                format!("Expected '{expected}', found end of dependency specification"),
                span_start,
                1,
                self.input,
            )),
            Some((_, value)) if value == expected => Ok(()),
            Some((pos, other)) => Err(Pep508Error::new(
                format!("Expected '{expected}', found '{other}'"),
                pos,
                other.len_utf8(),
                self.input,
            )),
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>, start: usize, len: usize) -> Pep508Error {
        Pep508Error::new(message, start, len, self.input)
    }
}

impl Display for Cursor<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.input)
    }
}
