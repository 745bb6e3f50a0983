use std::cmp;

use bytes::{Bytes, BytesMut};
use snafu::prelude::*;
use tracing::trace;

use crate::codec::error::{
    HeaderOverflowSnafu, InvalidChunkSizeSnafu, InvalidConstantSnafu, InvalidEofStateSnafu,
    LfExpectedSnafu, ParseError, StrictSnafu,
};
use crate::codec::reader::LineReader;
use crate::handler::{HeadersAction, MessageHandler};
use crate::protocol::{MessageHead, Method, Mode};

/// default cap on accumulated header bytes
pub const DEFAULT_MAX_HEADER_SIZE: usize = 80 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestLine,
    ResponseLine,
    Header,
    BodyChunkHead,
    BodyChunk,
    BodyChunkEnd,
    BodyChunkTrailers,
    BodySized,
    BodyRaw,
}

impl State {
    fn start(mode: Mode) -> State {
        match mode {
            Mode::Request => State::RequestLine,
            Mode::Response => State::ResponseLine,
        }
    }

    // trailers are headers too, they count against the same cap
    fn is_header_state(self) -> bool {
        matches!(
            self,
            State::RequestLine | State::ResponseLine | State::Header | State::BodyChunkTrailers
        )
    }
}

/// what a state handler decided about the drain loop
enum Step {
    /// state advanced, keep draining
    Continue,
    /// out of input, resume here on the next `execute`
    NeedMore,
    /// message complete and the connection is leaving http, the caller
    /// takes over the remaining bytes
    Stop,
}

/// An incremental HTTP/1.x message parser.
///
/// The parser consumes arbitrary byte chunks through [`execute`] and emits
/// [`MessageHandler`] callbacks as it recognises the parts of one or more
/// messages. Input may be fragmented anywhere, including inside a header
/// line or a chunk-size line; unfinished lines are carried over between
/// calls. At each message boundary the parser resets itself, so pipelined
/// messages on one connection parse back to back.
///
/// [`execute`]: Parser::execute
#[derive(Debug)]
pub struct Parser {
    mode: Mode,
    state: State,
    line_carry: BytesMut,
    header_bytes: usize,
    info: MessageHead,
    chunked: bool,
    body_remaining: Option<u64>,
    had_error: bool,
    max_header_size: usize,
}

impl Parser {
    pub fn new(mode: Mode) -> Self {
        Self::with_max_header_size(mode, DEFAULT_MAX_HEADER_SIZE)
    }

    pub fn with_max_header_size(mode: Mode, max_header_size: usize) -> Self {
        Self {
            mode,
            state: State::start(mode),
            line_carry: BytesMut::new(),
            header_bytes: 0,
            info: MessageHead::default(),
            chunked: false,
            body_remaining: None,
            had_error: false,
            max_header_size,
        }
    }

    /// Re-initialise for reuse, keeping the configured header cap.
    pub fn initialize(&mut self, mode: Mode) {
        self.mode = mode;
        self.state = State::start(mode);
        self.line_carry.clear();
        self.header_bytes = 0;
        self.info = MessageHead::default();
        self.chunked = false;
        self.body_remaining = None;
        self.had_error = false;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Feed one chunk of input, returning how many bytes were consumed.
    ///
    /// The chunk is borrowed only for the duration of the call; `on_body`
    /// callbacks hand out views into it. A return value smaller than
    /// `chunk.len()` means the current message upgraded the connection and
    /// the caller owns the remaining bytes.
    ///
    /// After a parse error the parser is dead: the error is returned once
    /// and every later call consumes nothing.
    pub fn execute<H: MessageHandler>(&mut self, handler: &mut H, chunk: &[u8]) -> Result<usize, ParseError> {
        if self.had_error {
            return Ok(0);
        }

        let mut carry = std::mem::take(&mut self.line_carry);
        let mut reader = LineReader::new(chunk, &mut carry);
        let drained = self.drain(handler, &mut reader);
        let consumed = reader.offset();
        self.line_carry = carry;

        if let Err(error) = drained {
            self.had_error = true;
            return Err(error);
        }

        if self.state.is_header_state() {
            self.header_bytes += consumed;
            if self.header_bytes > self.max_header_size {
                self.had_error = true;
                return HeaderOverflowSnafu {
                    current_size: self.header_bytes,
                    max_size: self.max_header_size,
                }
                .fail();
            }
        }

        Ok(consumed)
    }

    /// Signal end of stream.
    ///
    /// Completes a close-delimited body, accepts an idle parser, and
    /// rejects a stream that closed in the middle of a message.
    pub fn finish<H: MessageHandler>(&mut self, handler: &mut H) -> Result<(), ParseError> {
        if self.had_error {
            return Ok(());
        }
        match self.state {
            State::RequestLine | State::ResponseLine => Ok(()),
            State::BodyRaw => {
                self.next_message(handler);
                Ok(())
            }
            _ => {
                self.had_error = true;
                InvalidEofStateSnafu.fail()
            }
        }
    }

    fn drain<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        reader: &mut LineReader<'_>,
    ) -> Result<(), ParseError> {
        while reader.has_remaining() {
            let step = match self.state {
                State::RequestLine => self.request_line(reader)?,
                State::ResponseLine => self.response_line(reader)?,
                State::Header => self.header(handler, reader)?,
                State::BodyChunkHead => self.chunk_head(reader)?,
                State::BodyChunk => self.chunk_data(handler, reader)?,
                State::BodyChunkEnd => self.chunk_end(reader)?,
                State::BodyChunkTrailers => self.chunk_trailers(handler, reader)?,
                State::BodySized => self.sized_body(handler, reader)?,
                State::BodyRaw => self.raw_body(handler, reader)?,
            };
            match step {
                Step::Continue => {}
                Step::NeedMore | Step::Stop => break,
            }
        }
        Ok(())
    }

    fn request_line(&mut self, reader: &mut LineReader<'_>) -> Result<Step, ParseError> {
        let Some(line) = reader.consume_line() else {
            return Ok(Step::NeedMore);
        };
        if line.is_empty() {
            // blank lines before the request line are tolerated
            return Ok(Step::Continue);
        }

        let parsed = parse_request_line(&line)?;
        self.info.method = Some(parsed.method);
        self.info.url = Bytes::copy_from_slice(parsed.target);
        self.info.version_major = parsed.version_major;
        self.info.version_minor = parsed.version_minor;
        self.body_remaining = Some(0);
        self.state = State::Header;
        Ok(Step::Continue)
    }

    fn response_line(&mut self, reader: &mut LineReader<'_>) -> Result<Step, ParseError> {
        let Some(line) = reader.consume_line() else {
            return Ok(Step::NeedMore);
        };

        let parsed = parse_status_line(&line)?;
        self.info.version_major = parsed.version_major;
        self.info.version_minor = parsed.version_minor;
        self.info.status_code = parsed.status;
        self.info.status_reason = Bytes::copy_from_slice(parsed.reason);
        if parsed.status / 100 == 1 || parsed.status == 204 || parsed.status == 304 {
            // these statuses imply an empty body no matter what the
            // headers say
            self.body_remaining = Some(0);
        }
        self.state = State::Header;
        Ok(Step::Continue)
    }

    fn header<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        reader: &mut LineReader<'_>,
    ) -> Result<Step, ParseError> {
        let Some(line) = reader.consume_line() else {
            return Ok(Step::NeedMore);
        };
        if !line.is_empty() {
            append_field(&mut self.info.headers, &line)?;
            return Ok(Step::Continue);
        }
        self.headers_complete(handler)
    }

    fn headers_complete<H: MessageHandler>(&mut self, handler: &mut H) -> Result<Step, ParseError> {
        let framing = self.info.resolve_framing(self.mode, self.body_remaining)?;
        self.chunked = framing.chunked;
        self.body_remaining = framing.body_remaining;

        let action = handler.on_headers_complete(&self.info);
        match action {
            HeadersAction::NoBody => {
                self.next_message(handler);
                Ok(Step::Continue)
            }
            HeadersAction::ParseBody if self.chunked => {
                self.state = State::BodyChunkHead;
                Ok(Step::Continue)
            }
            HeadersAction::SkipBody => Ok(self.complete_without_body(handler)),
            HeadersAction::ParseBody => match self.body_remaining {
                Some(0) => Ok(self.complete_without_body(handler)),
                None => {
                    self.state = State::BodyRaw;
                    Ok(Step::Continue)
                }
                Some(_) => {
                    self.state = State::BodySized;
                    Ok(Step::Continue)
                }
            },
        }
    }

    // an upgraded message hands the rest of the stream to the caller
    fn complete_without_body<H: MessageHandler>(&mut self, handler: &mut H) -> Step {
        let stop = self.info.upgrade;
        self.next_message(handler);
        if stop {
            Step::Stop
        } else {
            Step::Continue
        }
    }

    fn chunk_head(&mut self, reader: &mut LineReader<'_>) -> Result<Step, ParseError> {
        let Some(line) = reader.consume_line() else {
            return Ok(Step::NeedMore);
        };
        let size = parse_chunk_size(&line)?;
        if size == 0 {
            self.state = State::BodyChunkTrailers;
        } else {
            self.body_remaining = Some(size);
            self.state = State::BodyChunk;
        }
        Ok(Step::Continue)
    }

    fn chunk_data<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        reader: &mut LineReader<'_>,
    ) -> Result<Step, ParseError> {
        let wanted = self.body_remaining.unwrap_or(0);
        let n = cmp::min(wanted, reader.remaining() as u64) as usize;
        if n > 0 {
            handler.on_body(reader.take(n));
        }

        let left = wanted - n as u64;
        self.body_remaining = Some(left);
        if left == 0 {
            self.state = State::BodyChunkEnd;
        }
        Ok(Step::Continue)
    }

    fn chunk_end(&mut self, reader: &mut LineReader<'_>) -> Result<Step, ParseError> {
        let Some(line) = reader.consume_line() else {
            return Ok(Step::NeedMore);
        };
        // only the CRLF that terminates the chunk data may be here
        ensure!(line.is_empty(), StrictSnafu);
        self.state = State::BodyChunkHead;
        Ok(Step::Continue)
    }

    fn chunk_trailers<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        reader: &mut LineReader<'_>,
    ) -> Result<Step, ParseError> {
        let Some(line) = reader.consume_line() else {
            return Ok(Step::NeedMore);
        };
        if !line.is_empty() {
            append_field(&mut self.info.trailers, &line)?;
            return Ok(Step::Continue);
        }
        if !self.info.trailers.is_empty() {
            handler.on_headers(&self.info.trailers, b"");
        }
        self.next_message(handler);
        Ok(Step::Continue)
    }

    fn sized_body<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        reader: &mut LineReader<'_>,
    ) -> Result<Step, ParseError> {
        let wanted = self.body_remaining.unwrap_or(0);
        let n = cmp::min(wanted, reader.remaining() as u64) as usize;
        if n > 0 {
            handler.on_body(reader.take(n));
        }

        let left = wanted - n as u64;
        self.body_remaining = Some(left);
        if left == 0 {
            self.next_message(handler);
        }
        Ok(Step::Continue)
    }

    fn raw_body<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        reader: &mut LineReader<'_>,
    ) -> Result<Step, ParseError> {
        let data = reader.take_remaining();
        if !data.is_empty() {
            handler.on_body(data);
        }
        // never transitions, the message completes at finish()
        Ok(Step::NeedMore)
    }

    fn next_message<H: MessageHandler>(&mut self, handler: &mut H) {
        handler.on_message_complete();
        trace!("message complete");

        self.info = MessageHead::default();
        self.chunked = false;
        self.header_bytes = 0;
        self.body_remaining = None;
        self.state = State::start(self.mode);
    }
}

struct RequestLine<'a> {
    method: Method,
    target: &'a [u8],
    version_major: u8,
    version_minor: u8,
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine<'_>, ParseError> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let token = parts.next().unwrap_or_default();
    let target = parts.next().context(InvalidConstantSnafu)?;
    let version = parts.next().context(InvalidConstantSnafu)?;
    ensure!(!target.is_empty(), InvalidConstantSnafu);

    let (version_major, version_minor) = parse_version(version)?;
    let method = Method::try_from(token)?;
    Ok(RequestLine { method, target, version_major, version_minor })
}

struct StatusLine<'a> {
    version_major: u8,
    version_minor: u8,
    status: u16,
    reason: &'a [u8],
}

fn parse_status_line(line: &[u8]) -> Result<StatusLine<'_>, ParseError> {
    let version = line.get(..8).context(InvalidConstantSnafu)?;
    let (version_major, version_minor) = parse_version(version)?;

    let rest = line[8..].strip_prefix(b" ").context(InvalidConstantSnafu)?;
    ensure!(rest.len() >= 3, InvalidConstantSnafu);
    let (digits, reason) = rest.split_at(3);
    ensure!(digits.iter().all(|b| b.is_ascii_digit()), InvalidConstantSnafu);
    let status = digits.iter().fold(0u16, |status, &b| status * 10 + u16::from(b - b'0'));

    let reason = match reason {
        [] => &b""[..],
        [b' ', tail @ ..] => tail,
        _ => return InvalidConstantSnafu.fail(),
    };
    Ok(StatusLine { version_major, version_minor, status, reason })
}

fn parse_version(bytes: &[u8]) -> Result<(u8, u8), ParseError> {
    match bytes {
        [b'H', b'T', b'T', b'P', b'/', major @ b'0'..=b'9', b'.', minor @ b'0'..=b'9'] => {
            Ok((*major - b'0', *minor - b'0'))
        }
        _ => InvalidConstantSnafu.fail(),
    }
}

/// Parse one header or trailer line into the flat name/value sequence.
///
/// Lines starting with whitespace continue the previous value; lines
/// without a colon are tolerated and dropped.
fn append_field(fields: &mut Vec<Bytes>, line: &[u8]) -> Result<(), ParseError> {
    ensure!(!line.contains(&b'\r'), LfExpectedSnafu);

    if matches!(line.first(), Some(b' ') | Some(b'\t')) {
        let folded = trim_ows(line);
        if folded.is_empty() {
            return Ok(());
        }
        // a continuation before any field is dropped
        if let Some(value) = fields.last_mut() {
            if value.is_empty() {
                *value = Bytes::copy_from_slice(folded);
            } else {
                let mut joined = BytesMut::with_capacity(value.len() + 1 + folded.len());
                joined.extend_from_slice(value);
                joined.extend_from_slice(b" ");
                joined.extend_from_slice(folded);
                *value = joined.freeze();
            }
        }
        return Ok(());
    }

    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return Ok(());
    };
    fields.push(Bytes::copy_from_slice(&line[..colon]));
    fields.push(Bytes::copy_from_slice(trim_ows(&line[colon + 1..])));
    Ok(())
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

// the size is the hex prefix of the line, anything after it (chunk
// extensions, whitespace) is ignored
fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let mut size: u64 = 0;
    let mut digits = 0usize;

    for &b in line.iter() {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => break,
        };
        digits += 1;
        size = size
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .context(InvalidChunkSizeSnafu)?;
    }

    ensure!(digits > 0, InvalidChunkSizeSnafu);
    Ok(size)
}
