//! Byte stream with look-ahead for magic-number sniffing.
//!
//! Parsing decisions are made by peeking at upcoming bytes (a magic number, an
//! entry header) before committing to a concrete type, so every fragment reads
//! from a [`BitstreamReader`] rather than a bare [`Read`].

use std::io::{self, Cursor, Read};

/// Chunk size used when filling the look-ahead buffer for unbounded reads.
const READ_CHUNK: usize = 8192;

/// A blocking reader that can peek arbitrarily far ahead.
///
/// A short read is not an error: it simply yields fewer bytes and the caller
/// decides whether that means end-of-stream or a truncated structure.
pub struct BitstreamReader<'a> {
    inner: Box<dyn Read + 'a>,
    lookahead: Vec<u8>,
    eof: bool,
    position: usize,
}

impl<'a> BitstreamReader<'a> {
    /// Wrap any reader.
    pub fn new(reader: impl Read + 'a) -> Self {
        Self {
            inner: Box::new(reader),
            lookahead: Vec::new(),
            eof: false,
            position: 0,
        }
    }

    /// Read from an in-memory buffer.
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self::new(Cursor::new(bytes))
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Return up to `n` upcoming bytes without consuming them.
    ///
    /// Fewer than `n` bytes are returned only at end of stream.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        self.fill(n)?;
        let available = n.min(self.lookahead.len());
        Ok(&self.lookahead[..available])
    }

    /// Consume and return up to `n` bytes.
    pub fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>> {
        self.fill(n)?;
        let available = n.min(self.lookahead.len());
        let out: Vec<u8> = self.lookahead.drain(..available).collect();
        self.position += out.len();
        Ok(out)
    }

    /// Consume everything left in the stream.
    pub fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = std::mem::take(&mut self.lookahead);
        if !self.eof {
            self.inner.read_to_end(&mut out)?;
            self.eof = true;
        }
        self.position += out.len();
        Ok(out)
    }

    /// True once no further bytes can be read.
    pub fn is_exhausted(&mut self) -> io::Result<bool> {
        Ok(self.peek(1)?.is_empty())
    }

    fn fill(&mut self, n: usize) -> io::Result<()> {
        while self.lookahead.len() < n && !self.eof {
            let wanted = (n - self.lookahead.len()).min(READ_CHUNK);
            let mut chunk = vec![0u8; wanted];
            match self.inner.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(read) => self.lookahead.extend_from_slice(&chunk[..read]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BitstreamReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitstreamReader")
            .field("position", &self.position)
            .field("buffered", &self.lookahead.len())
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most 3 bytes per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_peek_does_not_consume() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut reader = BitstreamReader::from_bytes(&data);
        assert_eq!(reader.peek(4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_up_to(2).unwrap(), vec![1, 2]);
        assert_eq!(reader.peek(2).unwrap(), &[3, 4]);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_peek_across_short_reads() {
        let data: Vec<u8> = (0..20).collect();
        let mut reader = BitstreamReader::new(Trickle(&data));
        assert_eq!(reader.peek(10).unwrap().len(), 10);
        assert_eq!(reader.read_up_to(12).unwrap(), (0..12).collect::<Vec<u8>>());
        assert_eq!(reader.read_to_end().unwrap(), (12..20).collect::<Vec<u8>>());
        assert!(reader.is_exhausted().unwrap());
    }

    #[test]
    fn test_short_stream() {
        let data = [9u8, 8];
        let mut reader = BitstreamReader::from_bytes(&data);
        assert_eq!(reader.peek(4).unwrap(), &[9, 8]);
        assert_eq!(reader.read_up_to(4).unwrap(), vec![9, 8]);
        assert!(reader.is_exhausted().unwrap());
        assert_eq!(reader.read_up_to(4).unwrap(), Vec::<u8>::new());
        assert_eq!(reader.position(), 2);
    }
}
