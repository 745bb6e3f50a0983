use bytes::Bytes;

use crate::protocol::MessageHead;

/// directive returned from [`MessageHandler::on_headers_complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadersAction {
    /// parse the body according to the resolved framing
    #[default]
    ParseBody,
    /// skip the body and begin the next message
    SkipBody,
    /// skip the body, the caller knows there is none (HEAD semantics)
    NoBody,
}

/// The callback surface the host implements.
///
/// For a single message the callbacks arrive in the sequence
/// `on_headers_complete`, zero or more `on_body`, optional `on_headers`
/// carrying chunked trailers, `on_message_complete`; pipelined messages
/// repeat the sequence without interleaving. All bodies default to no-ops
/// so a host only implements what it consumes.
pub trait MessageHandler {
    /// Chunked trailers, delivered as flat alternating name/value entries.
    /// `url` is always empty for trailers.
    fn on_headers(&mut self, trailers: &[Bytes], url: &[u8]) {
        let _ = (trailers, url);
    }

    /// End of the header block. `head` carries the request or response
    /// metadata, the wire-order headers, and the derived `upgrade` and
    /// `should_keep_alive` flags. The returned directive decides whether
    /// the body is parsed or skipped.
    fn on_headers_complete(&mut self, head: &MessageHead) -> HeadersAction {
        let _ = head;
        HeadersAction::ParseBody
    }

    /// Body data. The slice is a non-owning view into the chunk passed to
    /// `execute` and is only valid for the duration of the callback; copy
    /// it to retain the bytes.
    fn on_body(&mut self, data: &[u8]) {
        let _ = data;
    }

    fn on_message_complete(&mut self) {}

    /// Reserved. Never invoked by the parser.
    fn on_execute(&mut self) {}
}
