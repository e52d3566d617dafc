//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with `{n}` literals that may themselves
//! contain CRLF. [`ResponseFramer`] is the sans-I/O half: it owns the
//! accumulation buffer and cuts complete responses out of it. [`FramedStream`]
//! drives it from an async stream under a per-response deadline.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::ops::Range;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// One command's complete response, cut from the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedResponse {
    /// Untagged units in arrival order. A unit is a line plus any literals
    /// and continuation lines that belong to it.
    pub untagged: Vec<Bytes>,
    /// The tagged completion line.
    pub tagged: Bytes,
}

/// Accumulation buffer that extracts complete responses.
///
/// Scanning always restarts at the beginning of the unconsumed buffer and
/// consumes nothing until a whole response is present, so it may be re-run
/// after every inbound chunk.
#[derive(Debug, Default)]
pub struct ResponseFramer {
    buffer: BytesMut,
}

impl ResponseFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Appends inbound bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// The accumulation buffer, for reading directly into it.
    pub const fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of buffered, unconsumed bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Extracts the response terminated by `tag`: every untagged unit before
    /// the first line starting with `<tag> `, plus that line.
    ///
    /// Returns `Ok(None)` without consuming anything when the buffer does
    /// not yet hold the tagged line, or a literal is only partly buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for a literal above [`MAX_LITERAL_SIZE`]
    /// or a line above [`MAX_LINE_LENGTH`].
    pub fn next_response(&mut self, tag: &str) -> Result<Option<FramedResponse>> {
        let buf = &self.buffer[..];
        let mut units: Vec<Range<usize>> = Vec::new();
        let mut current: Option<usize> = None;
        // The bytes right after a literal finish the line that announced it.
        let mut literal_tail = false;
        // Once a unit has carried a literal, stray lines continue it.
        let mut unit_has_literal = false;
        let mut pos = 0;

        loop {
            let Some(end) = line_end(buf, pos)? else {
                return Ok(None);
            };
            let line = &buf[pos..end];

            if !literal_tail {
                if is_tagged(line, tag) {
                    if let Some(start) = current.take() {
                        units.push(start..pos);
                    }
                    let tagged = pos..end;
                    return Ok(Some(self.split(end, &units, tagged)));
                }
                if line.starts_with(b"* ") || !unit_has_literal {
                    if let Some(start) = current.replace(pos) {
                        units.push(start..pos);
                    }
                    unit_has_literal = false;
                }
            }

            match literal_length(line)? {
                Some(n) => {
                    if end + n > buf.len() {
                        return Ok(None);
                    }
                    pos = end + n;
                    literal_tail = true;
                    unit_has_literal = true;
                }
                None => {
                    pos = end;
                    literal_tail = false;
                }
            }
        }
    }

    /// Extracts the next single unit (a line with its literals), for reads
    /// outside a tagged exchange such as the server greeting.
    ///
    /// # Errors
    ///
    /// Same size limits as [`next_response`](Self::next_response).
    pub fn next_unit(&mut self) -> Result<Option<Bytes>> {
        let buf = &self.buffer[..];
        let mut pos = 0;
        loop {
            let Some(end) = line_end(buf, pos)? else {
                return Ok(None);
            };
            match literal_length(&buf[pos..end])? {
                Some(n) if end + n > buf.len() => return Ok(None),
                Some(n) => pos = end + n,
                None => return Ok(Some(self.buffer.split_to(end).freeze())),
            }
        }
    }

    fn split(
        &mut self,
        consumed: usize,
        units: &[Range<usize>],
        tagged: Range<usize>,
    ) -> FramedResponse {
        let frozen = self.buffer.split_to(consumed).freeze();
        FramedResponse {
            untagged: units.iter().map(|r| frozen.slice(r.clone())).collect(),
            tagged: frozen.slice(tagged),
        }
    }
}

/// Finds the end (after CRLF) of the line starting at `pos`.
fn line_end(buf: &[u8], pos: usize) -> Result<Option<usize>> {
    let rest = &buf[pos..];
    match find_crlf(rest) {
        Some(i) if i > MAX_LINE_LENGTH => Err(Error::Protocol("line too long".to_string())),
        Some(i) => Ok(Some(pos + i + 2)),
        None if rest.len() > MAX_LINE_LENGTH => {
            Err(Error::Protocol("line too long".to_string()))
        }
        None => Ok(None),
    }
}

fn is_tagged(line: &[u8], tag: &str) -> bool {
    line.strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.first() == Some(&b' '))
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Reads a `{n}` or `{n+}` literal announcement at the end of a line.
fn literal_length(line: &[u8]) -> Result<Option<usize>> {
    let Some(line) = line.strip_suffix(b"\r\n") else {
        return Ok(None);
    };
    let Some(inner) = line.strip_suffix(b"}") else {
        return Ok(None);
    };
    let Some(open) = inner.iter().rposition(|&b| b == b'{') else {
        return Ok(None);
    };
    let digits = &inner[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Ok(None);
    }

    let size = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    if size > MAX_LITERAL_SIZE {
        return Err(Error::Protocol(format!(
            "literal too large: {size} bytes (max {MAX_LITERAL_SIZE})"
        )));
    }
    Ok(Some(size))
}

/// Framed connection: a stream, its framer and the I/O deadline.
pub struct FramedStream<S> {
    stream: S,
    framer: ResponseFramer,
    io_timeout: Duration,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream,
            framer: ResponseFramer::new(),
            io_timeout,
        }
    }

    /// Reads until the response for `tag` is complete.
    pub async fn read_response(&mut self, tag: &str) -> Result<FramedResponse> {
        loop {
            if let Some(response) = self.framer.next_response(tag)? {
                return Ok(response);
            }
            self.fill().await?;
        }
    }

    /// Reads one untagged unit.
    pub async fn read_unit(&mut self) -> Result<Bytes> {
        loop {
            if let Some(unit) = self.framer.next_unit()? {
                return Ok(unit);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let limit = self.io_timeout;
        let read = self.stream.read_buf(self.framer.buffer_mut());
        let n = timeout(limit, read)
            .await
            .map_err(|_| Error::Timeout(limit))??;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        Ok(())
    }

    /// Writes a command to the stream.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.io_timeout;
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(data).await?;
            stream.flush().await
        };
        timeout(limit, write)
            .await
            .map_err(|_| Error::Timeout(limit))??;
        Ok(())
    }

    /// Number of bytes received but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.framer.buffered()
    }

    /// Returns the I/O deadline.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Gets a reference to the underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Fails if received bytes are still buffered, since they would be lost.
    pub fn into_inner(self) -> Result<S> {
        if self.framer.buffered() > 0 {
            return Err(Error::Protocol(format!(
                "{} unread bytes buffered",
                self.framer.buffered()
            )));
        }
        Ok(self.stream)
    }

    /// Shuts down the write half, ignoring errors.
    pub async fn shutdown(&mut self) {
        let _ = timeout(self.io_timeout, self.stream.shutdown()).await;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio_test::io::Builder;

    fn framer(data: &[u8]) -> ResponseFramer {
        let mut framer = ResponseFramer::new();
        framer.feed(data);
        framer
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
    }

    #[test]
    fn test_literal_length() {
        assert_eq!(literal_length(b"BODY {123}\r\n").unwrap(), Some(123));
        assert_eq!(literal_length(b"BODY {123+}\r\n").unwrap(), Some(123));
        assert_eq!(literal_length(b"{0}\r\n").unwrap(), Some(0));
        assert_eq!(literal_length(b"no literal\r\n").unwrap(), None);
        assert_eq!(literal_length(b"incomplete {123").unwrap(), None);
        assert_eq!(literal_length(b"wrong {abc}\r\n").unwrap(), None);
        assert_eq!(literal_length(b"empty {}\r\n").unwrap(), None);
        assert!(literal_length(b"{99999999999999999999999}\r\n").is_err());
    }

    #[test]
    fn test_simple_response() {
        let mut f = framer(b"* 42 EXISTS\r\n* 3 RECENT\r\nA0001 OK done\r\n");
        let response = f.next_response("A0001").unwrap().unwrap();
        assert_eq!(response.untagged.len(), 2);
        assert_eq!(&response.untagged[0][..], b"* 42 EXISTS\r\n");
        assert_eq!(&response.untagged[1][..], b"* 3 RECENT\r\n");
        assert_eq!(&response.tagged[..], b"A0001 OK done\r\n");
        assert_eq!(f.buffered(), 0);
    }

    #[test]
    fn test_leftover_stays_buffered() {
        let mut f = framer(b"A0001 OK done\r\n* 1 EXISTS\r\n");
        let response = f.next_response("A0001").unwrap().unwrap();
        assert!(response.untagged.is_empty());
        assert_eq!(f.buffered(), b"* 1 EXISTS\r\n".len());
    }

    #[test]
    fn test_incomplete_consumes_nothing() {
        let mut f = framer(b"* 42 EXISTS\r\nA0001 OK do");
        assert_eq!(f.next_response("A0001").unwrap(), None);
        assert_eq!(f.buffered(), 24);
        f.feed(b"ne\r\n");
        assert!(f.next_response("A0001").unwrap().is_some());
    }

    #[test]
    fn test_tag_prefix_is_not_a_match() {
        let mut f = framer(b"A00010 OK other\r\nA0001 OK mine\r\n");
        let response = f.next_response("A0001").unwrap().unwrap();
        assert_eq!(&response.tagged[..], b"A0001 OK mine\r\n");
        assert_eq!(response.untagged.len(), 1);
    }

    #[test]
    fn test_literal_with_embedded_crlf() {
        let data = b"* 1 FETCH (BODY[TEXT] {12}\r\nA0001 OK x\r\n)\r\nA0001 OK done\r\n";
        let mut f = framer(data);
        let response = f.next_response("A0001").unwrap().unwrap();
        assert_eq!(response.untagged.len(), 1);
        assert_eq!(
            &response.untagged[0][..],
            b"* 1 FETCH (BODY[TEXT] {12}\r\nA0001 OK x\r\n)\r\n"
        );
        assert_eq!(&response.tagged[..], b"A0001 OK done\r\n");
    }

    #[test]
    fn test_partial_literal_waits() {
        let mut f = framer(b"* 1 FETCH (BODY[TEXT] {10}\r\nhello");
        assert_eq!(f.next_response("A0001").unwrap(), None);
        f.feed(b"world)\r\nA0001 OK done\r\n");
        let response = f.next_response("A0001").unwrap().unwrap();
        assert_eq!(&response.untagged[0][..], b"* 1 FETCH (BODY[TEXT] {10}\r\nhelloworld)\r\n");
    }

    #[test]
    fn test_multiple_literals_in_one_unit() {
        let data = concat!(
            "* 1 FETCH (UID 5 BODY[HEADER] {14}\r\nSubject: a\r\n\r\n",
            " BODY[TEXT] {4}\r\nbody)\r\n",
            "* 2 FETCH (UID 6)\r\n",
            "A0002 OK FETCH completed\r\n"
        );
        let mut f = framer(data.as_bytes());
        let response = f.next_response("A0002").unwrap().unwrap();
        assert_eq!(response.untagged.len(), 2);
        assert!(response.untagged[0].ends_with(b"body)\r\n"));
        assert_eq!(&response.untagged[1][..], b"* 2 FETCH (UID 6)\r\n");
    }

    #[test]
    fn test_continuation_lines_after_literal() {
        let data = b"* 1 FETCH (ENVELOPE ({3}\r\nabc\r\n NIL)\r\n NIL)\r\nA0001 OK\r\n";
        let mut f = framer(data);
        let response = f.next_response("A0001").unwrap().unwrap();
        assert_eq!(response.untagged.len(), 1);
        assert!(response.untagged[0].ends_with(b" NIL)\r\n NIL)\r\n"));
    }

    #[test]
    fn test_literal_size_guard() {
        let header = format!("* 1 FETCH (BODY {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mut f = framer(header.as_bytes());
        let err = f.next_response("A0001").unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[test]
    fn test_line_length_guard() {
        let mut f = framer("A".repeat(MAX_LINE_LENGTH + 100).as_bytes());
        let err = f.next_response("A0001").unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    #[test]
    fn test_next_unit() {
        let mut f = framer(b"* OK ready\r\n* BYE");
        assert_eq!(&f.next_unit().unwrap().unwrap()[..], b"* OK ready\r\n");
        assert_eq!(f.next_unit().unwrap(), None);
        assert_eq!(f.buffered(), 5);
    }

    #[tokio::test]
    async fn test_framed_read_split_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY {5}\r\n")
            .read(b"hel")
            .read(b"lo)\r\nA0001 OK")
            .read(b" done\r\n")
            .build();
        let mut framed = FramedStream::new(mock, Duration::from_secs(5));

        let response = framed.read_response("A0001").await.unwrap();
        assert_eq!(&response.untagged[0][..], b"* 1 FETCH (BODY {5}\r\nhello)\r\n");
        assert_eq!(&response.tagged[..], b"A0001 OK done\r\n");
    }

    #[tokio::test]
    async fn test_framed_eof() {
        let mock = Builder::new().read(b"* 1 EXISTS\r\n").build();
        let mut framed = FramedStream::new(mock, Duration::from_secs(5));
        match framed.read_response("A0001").await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_framed_timeout() {
        let mock = Builder::new()
            .read(b"* 1 EXISTS\r\n")
            .wait(Duration::from_secs(120))
            .build();
        let mut framed = FramedStream::new(mock, Duration::from_secs(1));
        assert!(matches!(
            framed.read_response("A0001").await,
            Err(Error::Timeout(d)) if d == Duration::from_secs(1)
        ));
    }

    #[tokio::test]
    async fn test_framed_write_command() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock, Duration::from_secs(5));
        framed.write_command(b"A0001 NOOP\r\n").await.unwrap();
    }

    #[test]
    fn test_into_inner_rejects_buffered_bytes() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock, Duration::from_secs(5));
        framed.framer.feed(b"junk");
        assert!(matches!(framed.into_inner(), Err(Error::Protocol(_))));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_result(cuts in proptest::collection::vec(0usize..120, 0..8)) {
            let data: &[u8] = concat!(
                "* 3 EXISTS\r\n",
                "* 1 FETCH (UID 9 BODY[TEXT] {11}\r\nab\r\n{2}\r\ncd)\r\n",
                "* OK [UIDNEXT 10] next\r\n",
                "A0007 OK done\r\n"
            ).as_bytes();

            let mut whole = framer(data);
            let expected = whole.next_response("A0007").unwrap().unwrap();

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c.min(data.len())).collect();
            points.sort_unstable();
            points.push(data.len());

            let mut f = ResponseFramer::new();
            let mut start = 0;
            let mut got = None;
            for point in points {
                f.feed(&data[start..point]);
                start = point;
                if let Some(response) = f.next_response("A0007").unwrap() {
                    got = Some(response);
                    break;
                }
            }
            if got.is_none() {
                got = f.next_response("A0007").unwrap();
            }
            prop_assert_eq!(got, Some(expected));
        }
    }
}
