use std::ops::Deref;

use bytes::{Bytes, BytesMut};

/// a line delivered by [`LineReader::consume_line`], terminator stripped
#[derive(Debug)]
pub(crate) enum Line<'a> {
    /// the line sat whole inside the current chunk
    Slice(&'a [u8]),
    /// the line was stitched together with bytes carried over from
    /// previous chunks
    Spanned(Bytes),
}

impl Deref for Line<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Line::Slice(slice) => slice,
            Line::Spanned(bytes) => bytes,
        }
    }
}

/// cursor over one borrowed input chunk plus the carry-over buffer for
/// lines that span chunks
///
/// every state handler reads through this cursor, nothing else touches the
/// chunk. the reader lives for a single `execute` call; the carry outlives
/// it on the parser.
pub(crate) struct LineReader<'a> {
    chunk: &'a [u8],
    offset: usize,
    carry: &'a mut BytesMut,
}

impl<'a> LineReader<'a> {
    pub fn new(chunk: &'a [u8], carry: &'a mut BytesMut) -> Self {
        Self { chunk, offset: 0, carry }
    }

    /// bytes consumed from the chunk so far
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.chunk.len() - self.offset
    }

    pub fn has_remaining(&self) -> bool {
        self.offset < self.chunk.len()
    }

    /// Consume the next CRLF- or LF-terminated line.
    ///
    /// On success the cursor moves past the terminator and the carry is
    /// emptied. Without a terminator in the window the rest of the chunk is
    /// appended to the carry, the cursor moves to the end, and `None` asks
    /// the caller to wait for more input.
    pub fn consume_line(&mut self) -> Option<Line<'a>> {
        let chunk = self.chunk;
        let window = &chunk[self.offset..];

        let Some(lf) = window.iter().position(|&b| b == b'\n') else {
            self.carry.extend_from_slice(window);
            self.offset = chunk.len();
            return None;
        };

        let mut line = &window[..lf];
        self.offset += lf + 1;

        if self.carry.is_empty() {
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            return Some(Line::Slice(line));
        }

        // the CR may sit at the end of the carry when the terminator itself
        // straddles a chunk boundary
        self.carry.extend_from_slice(line);
        if self.carry.last() == Some(&b'\r') {
            let shortened = self.carry.len() - 1;
            self.carry.truncate(shortened);
        }
        Some(Line::Spanned(self.carry.split().freeze()))
    }

    /// Consume up to `n` bytes of raw body data as a view into the chunk.
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        debug_assert!(n <= self.remaining());
        let chunk = self.chunk;
        let start = self.offset;
        self.offset += n;
        &chunk[start..self.offset]
    }

    pub fn take_remaining(&mut self) -> &'a [u8] {
        let chunk = self.chunk;
        let start = self.offset;
        self.offset = chunk.len();
        &chunk[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_lines() {
        let mut carry = BytesMut::new();
        let mut reader = LineReader::new(b"GET / HTTP/1.1\r\nHost: x\r\n", &mut carry);

        assert_eq!(&*reader.consume_line().unwrap(), b"GET / HTTP/1.1");
        assert_eq!(&*reader.consume_line().unwrap(), b"Host: x");
        assert!(!reader.has_remaining());
        assert_eq!(reader.offset(), 25);
    }

    #[test]
    fn test_bare_lf_line() {
        let mut carry = BytesMut::new();
        let mut reader = LineReader::new(b"Host: x\nrest", &mut carry);

        assert_eq!(&*reader.consume_line().unwrap(), b"Host: x");
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_partial_line_carries_over() {
        let mut carry = BytesMut::new();

        {
            let mut reader = LineReader::new(b"Host: loca", &mut carry);
            assert!(reader.consume_line().is_none());
            assert_eq!(reader.offset(), 10);
        }
        assert_eq!(&carry[..], b"Host: loca");

        let mut reader = LineReader::new(b"lhost\r\n", &mut carry);
        let line = reader.consume_line().unwrap();
        assert_eq!(&*line, b"Host: localhost");
        assert!(matches!(line, Line::Spanned(_)));
        assert!(carry.is_empty());
    }

    #[test]
    fn test_terminator_straddles_chunks() {
        let mut carry = BytesMut::new();

        {
            let mut reader = LineReader::new(b"Host: x\r", &mut carry);
            assert!(reader.consume_line().is_none());
        }

        let mut reader = LineReader::new(b"\nnext", &mut carry);
        assert_eq!(&*reader.consume_line().unwrap(), b"Host: x");
        assert_eq!(reader.remaining(), 4);
        assert!(carry.is_empty());
    }

    #[test]
    fn test_empty_line() {
        let mut carry = BytesMut::new();
        let mut reader = LineReader::new(b"\r\nbody", &mut carry);

        let line = reader.consume_line().unwrap();
        assert!(line.is_empty());
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_take() {
        let mut carry = BytesMut::new();
        let mut reader = LineReader::new(b"hello world", &mut carry);

        assert_eq!(reader.take(5), b"hello");
        assert_eq!(reader.take_remaining(), b" world");
        assert!(!reader.has_remaining());
    }
}
