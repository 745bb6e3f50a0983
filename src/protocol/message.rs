use bytes::Bytes;
use snafu::ensure;
use tracing::trace;

use crate::codec::error::{ParseError, UnexpectedContentLengthSnafu};
use crate::protocol::method::Method;

/// which side of the wire the parser reads, fixed at initialisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Request,
    Response,
}

/// body framing resolved at end of headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    pub chunked: bool,
    /// `None` reads until connection close, `Some(0)` is no body
    pub body_remaining: Option<u64>,
}

/// the in-progress message descriptor
///
/// `headers` and `trailers` are flat alternating name/value entries in wire
/// order, so their length is always even.
#[derive(Debug, Clone, Default)]
pub struct MessageHead {
    pub method: Option<Method>,
    pub url: Bytes,
    pub status_code: u16,
    pub status_reason: Bytes,
    pub version_major: u8,
    pub version_minor: u8,
    pub headers: Vec<Bytes>,
    pub trailers: Vec<Bytes>,
    /// lowercased concatenation of all `Connection` header values
    pub connection_tokens: String,
    pub upgrade: bool,
    pub should_keep_alive: bool,
}

impl MessageHead {
    /// Scan the accumulated headers and settle framing, upgrade and
    /// keep-alive for this message.
    ///
    /// `implied` is the body length implied by the start line (zero for
    /// requests and for 1xx/204/304 responses, unknown otherwise); an
    /// explicit `Content-Length` overrides it and `Transfer-Encoding:
    /// chunked` overrides that.
    pub(crate) fn resolve_framing(&mut self, mode: Mode, implied: Option<u64>) -> Result<Framing, ParseError> {
        let mut chunked = false;
        let mut content_length: Option<u64> = None;
        let mut saw_upgrade = false;

        for pair in self.headers.chunks_exact(2) {
            let (name, value) = (&pair[0], &pair[1]);

            if name.eq_ignore_ascii_case(b"transfer-encoding") {
                chunked = value.eq_ignore_ascii_case(b"chunked");
            } else if name.eq_ignore_ascii_case(b"content-length") {
                // a value that is not a decimal integer contributes nothing
                let Some(length) = parse_decimal(value) else { continue };
                if let Some(previous) = content_length {
                    ensure!(
                        previous == length,
                        UnexpectedContentLengthSnafu { previous, conflict: length }
                    );
                }
                content_length = Some(length);
            } else if name.eq_ignore_ascii_case(b"connection") {
                let value = String::from_utf8_lossy(value).to_lowercase();
                self.connection_tokens.push_str(&value);
            } else if name.eq_ignore_ascii_case(b"upgrade") {
                saw_upgrade = true;
            }
        }

        let mut body_remaining = content_length.or(implied);
        if chunked && content_length.is_some() {
            // conflicting framing, chunked wins
            body_remaining = None;
        }

        self.upgrade = if saw_upgrade && self.connection_tokens.contains("upgrade") {
            matches!(mode, Mode::Request) || self.status_code == 101
        } else {
            self.method == Some(Method::Connect)
        };
        if self.upgrade && chunked {
            // an upgraded stream is not chunked
            chunked = false;
        }

        // note: literally major>0 && minor>0, HTTP/1.0 takes the older branch
        let mut keep_alive = if self.version_major > 0 && self.version_minor > 0 {
            !self.connection_tokens.contains("close")
        } else {
            self.connection_tokens.contains("keep-alive")
        };
        if body_remaining.is_none() && !chunked {
            // indeterminate framing, the connection delimits the body
            keep_alive = false;
        }
        self.should_keep_alive = keep_alive;

        trace!(
            chunked,
            body_remaining = ?body_remaining,
            upgrade = self.upgrade,
            keep_alive,
            "resolved framing"
        );

        Ok(Framing { chunked, body_remaining })
    }
}

fn parse_decimal(value: &[u8]) -> Option<u64> {
    std::str::from_utf8(value).ok()?.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_with(headers: &[(&str, &str)]) -> MessageHead {
        let mut head = MessageHead { version_major: 1, version_minor: 1, ..Default::default() };
        for (name, value) in headers {
            head.headers.push(Bytes::copy_from_slice(name.as_bytes()));
            head.headers.push(Bytes::copy_from_slice(value.as_bytes()));
        }
        head
    }

    #[test]
    fn test_content_length_framing() {
        let mut head = head_with(&[("Content-Length", "42")]);
        let framing = head.resolve_framing(Mode::Request, Some(0)).unwrap();

        assert_eq!(framing, Framing { chunked: false, body_remaining: Some(42) });
        assert!(head.should_keep_alive);
        assert!(!head.upgrade);
    }

    #[test]
    fn test_duplicate_content_length() {
        let mut head = head_with(&[("Content-Length", "5"), ("Content-Length", "5")]);
        let framing = head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert_eq!(framing.body_remaining, Some(5));

        let mut head = head_with(&[("Content-Length", "5"), ("Content-Length", "6")]);
        let err = head.resolve_framing(Mode::Request, Some(0)).unwrap_err();
        assert_eq!(err.code(), "HPE_UNEXPECTED_CONTENT_LENGTH");
    }

    #[test]
    fn test_chunked_wins_over_content_length() {
        let mut head = head_with(&[("Transfer-Encoding", "chunked"), ("Content-Length", "42")]);
        let framing = head.resolve_framing(Mode::Request, Some(0)).unwrap();

        assert!(framing.chunked);
        assert_eq!(framing.body_remaining, None);
        // chunked framing is determinate, keep-alive survives
        assert!(head.should_keep_alive);
    }

    #[test]
    fn test_non_chunked_transfer_encoding() {
        let mut head = head_with(&[("Transfer-Encoding", "gzip")]);
        let framing = head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(!framing.chunked);
    }

    #[test]
    fn test_keep_alive_version_branches() {
        // HTTP/1.1 defaults on
        let mut head = head_with(&[]);
        head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(head.should_keep_alive);

        // HTTP/1.1 with close
        let mut head = head_with(&[("Connection", "close")]);
        head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(!head.should_keep_alive);

        // HTTP/1.0 is classified with the older versions: off by default
        let mut head = head_with(&[]);
        head.version_minor = 0;
        head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(!head.should_keep_alive);

        // HTTP/1.0 with an explicit keep-alive token
        let mut head = head_with(&[("Connection", "Keep-Alive")]);
        head.version_minor = 0;
        head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(head.should_keep_alive);
    }

    #[test]
    fn test_indeterminate_framing_forces_close() {
        // response with no content-length and no chunking reads until close
        let mut head = head_with(&[]);
        let framing = head.resolve_framing(Mode::Response, None).unwrap();

        assert_eq!(framing.body_remaining, None);
        assert!(!head.should_keep_alive);
    }

    #[test]
    fn test_upgrade_request() {
        let mut head = head_with(&[("Connection", "Upgrade"), ("Upgrade", "websocket")]);
        head.method = Some(Method::Get);
        head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(head.upgrade);
    }

    #[test]
    fn test_upgrade_response_needs_101() {
        let mut head = head_with(&[("Connection", "Upgrade"), ("Upgrade", "websocket")]);
        head.status_code = 200;
        head.resolve_framing(Mode::Response, None).unwrap();
        assert!(!head.upgrade);

        let mut head = head_with(&[("Connection", "Upgrade"), ("Upgrade", "websocket")]);
        head.status_code = 101;
        head.resolve_framing(Mode::Response, Some(0)).unwrap();
        assert!(head.upgrade);
    }

    #[test]
    fn test_connect_is_an_upgrade() {
        let mut head = head_with(&[]);
        head.method = Some(Method::Connect);
        head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(head.upgrade);
    }

    #[test]
    fn test_upgrade_clears_chunked() {
        let mut head = head_with(&[
            ("Connection", "Upgrade"),
            ("Upgrade", "websocket"),
            ("Transfer-Encoding", "chunked"),
        ]);
        head.method = Some(Method::Get);
        let framing = head.resolve_framing(Mode::Request, Some(0)).unwrap();
        assert!(!framing.chunked);
    }
}
