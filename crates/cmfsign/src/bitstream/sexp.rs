//! Minimal S-expression reader for exported public keys.
//!
//! Signing tokens export keys as S-expressions such as
//! `(public-key (ecdsa-secp384r1-sha384 (qx #59..a0#) (qy #a3..e1#)))`,
//! either in advanced form (whitespace, `#hex#` atoms) or canonical form
//! (`10:public-key`, length-prefixed raw bytes). Both are accepted.

use crate::{Error, Result};

/// A parsed S-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    Atom(Vec<u8>),
    List(Vec<Sexp>),
}

impl Sexp {
    /// Parse the first complete expression in `input`.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let mut parser = Parser { input, pos: 0 };
        parser.skip_whitespace();
        parser.expression()
    }

    /// Atom bytes, if this is an atom.
    pub fn as_atom(&self) -> Option<&[u8]> {
        match self {
            Sexp::Atom(bytes) => Some(bytes),
            Sexp::List(_) => None,
        }
    }

    /// Depth-first search for a list whose first atom equals `keyword`.
    pub fn find(&self, keyword: &str) -> Option<&[Sexp]> {
        let Sexp::List(items) = self else {
            return None;
        };
        if items.first().and_then(Sexp::as_atom) == Some(keyword.as_bytes()) {
            return Some(items);
        }
        items.iter().find_map(|item| item.find(keyword))
    }

    /// Atom value of the `(keyword value)` pair somewhere below this node.
    pub fn value_of(&self, keyword: &str) -> Option<&[u8]> {
        self.find(keyword)?.get(1)?.as_atom()
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn expression(&mut self) -> Result<Sexp> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_whitespace();
                    match self.peek() {
                        Some(b')') => {
                            self.pos += 1;
                            return Ok(Sexp::List(items));
                        }
                        Some(_) => items.push(self.expression()?),
                        None => return Err(self.error("unterminated list")),
                    }
                }
            }
            Some(b'#') => self.hex_atom(),
            Some(c) if c.is_ascii_digit() && self.has_length_prefix() => self.raw_atom(),
            Some(_) => self.token(),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn hex_atom(&mut self) -> Result<Sexp> {
        self.pos += 1;
        let start = self.pos;
        let end = self.input[start..]
            .iter()
            .position(|&c| c == b'#')
            .map(|i| start + i)
            .ok_or_else(|| self.error("unterminated hex atom"))?;
        self.pos = end + 1;

        let digits: Vec<u8> = self.input[start..end]
            .iter()
            .copied()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        hex::decode(digits)
            .map(Sexp::Atom)
            .map_err(|e| Error::InvalidHex(format!("hex atom at byte {start}: {e}")))
    }

    fn raw_atom(&mut self) -> Result<Sexp> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let length: usize = std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error("bad length prefix"))?;
        // Skip ':'
        self.pos += 1;

        let end = self
            .pos
            .checked_add(length)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("length prefix runs past end of input"))?;
        let atom = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(Sexp::Atom(atom))
    }

    fn token(&mut self) -> Result<Sexp> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_ascii_whitespace() && c != b'(' && c != b')' && c != b'#')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("empty token"));
        }
        Ok(Sexp::Atom(self.input[start..self.pos].to_vec()))
    }

    fn has_length_prefix(&self) -> bool {
        self.input[self.pos..]
            .iter()
            .find(|c| !c.is_ascii_digit())
            .is_some_and(|&c| c == b':')
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn error(&self, what: &str) -> Error {
        Error::InvalidField(format!("s-expression: {what} at byte {}", self.pos))
    }
}
