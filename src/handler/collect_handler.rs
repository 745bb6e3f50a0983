use bytes::Bytes;

use crate::handler::{HeadersAction, MessageHandler};
use crate::protocol::MessageHead;

/// one fully or partially parsed message as observed by [`CollectingHandler`]
#[derive(Debug, Clone, Default)]
pub struct CollectedMessage {
    pub head: MessageHead,
    /// one entry per `on_body` delivery, copied out of the input chunk
    pub body_chunks: Vec<Bytes>,
    pub trailers: Vec<Bytes>,
    pub complete: bool,
}

impl CollectedMessage {
    /// the body chunks glued back together
    pub fn body(&self) -> Vec<u8> {
        self.body_chunks.iter().flat_map(|chunk| chunk.iter().copied()).collect()
    }
}

/// A handler that records every callback for later inspection.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    pub messages: Vec<CollectedMessage>,
    /// directive returned from every `on_headers_complete`
    pub action: HeadersAction,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(action: HeadersAction) -> Self {
        Self { messages: Vec::new(), action }
    }

    fn current(&mut self) -> &mut CollectedMessage {
        if self.messages.last().map(|message| message.complete).unwrap_or(true) {
            self.messages.push(CollectedMessage::default());
        }
        self.messages.last_mut().expect("just pushed")
    }
}

impl MessageHandler for CollectingHandler {
    fn on_headers(&mut self, trailers: &[Bytes], _url: &[u8]) {
        self.current().trailers = trailers.to_vec();
    }

    fn on_headers_complete(&mut self, head: &MessageHead) -> HeadersAction {
        self.current().head = head.clone();
        self.action
    }

    fn on_body(&mut self, data: &[u8]) {
        let copied = Bytes::copy_from_slice(data);
        self.current().body_chunks.push(copied);
    }

    fn on_message_complete(&mut self) {
        self.current().complete = true;
    }
}
