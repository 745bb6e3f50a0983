use snafu::prelude::*;

use crate::protocol::UnknownMethod;

/// parse failures, one variant per stable wire code
///
/// the codes returned by [`ParseError::code`] are part of the public
/// contract and never change across releases.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum ParseError {
    #[snafu(display("malformed request or response line"))]
    InvalidConstant,

    #[snafu(display("{source}"), context(false))]
    InvalidMethod { source: UnknownMethod },

    #[snafu(display("stray CR inside a header line"))]
    LfExpected,

    #[snafu(display("conflicting content-length values: {previous} then {conflict}"))]
    UnexpectedContentLength { previous: u64, conflict: u64 },

    #[snafu(display("chunk size is not a hex number"))]
    InvalidChunkSize,

    #[snafu(display("chunk data exceeded its declared length"))]
    Strict,

    #[snafu(display("header bytes exceed the cap, current size: {current_size}, max size: {max_size}"))]
    HeaderOverflow { current_size: usize, max_size: usize },

    #[snafu(display("stream closed in the middle of a message"))]
    InvalidEofState,
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::InvalidConstant => "HPE_INVALID_CONSTANT",
            ParseError::InvalidMethod { .. } => "HPE_INVALID_METHOD",
            ParseError::LfExpected => "HPE_LF_EXPECTED",
            ParseError::UnexpectedContentLength { .. } => "HPE_UNEXPECTED_CONTENT_LENGTH",
            ParseError::InvalidChunkSize => "HPE_INVALID_CHUNK_SIZE",
            ParseError::Strict => "HPE_STRICT",
            ParseError::HeaderOverflow { .. } => "HPE_HEADER_OVERFLOW",
            ParseError::InvalidEofState => "HPE_INVALID_EOF_STATE",
        }
    }
}
