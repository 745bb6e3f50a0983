pub mod codec;
pub mod handler;
pub mod protocol;

pub use codec::{ParseError, Parser};
pub use handler::{HeadersAction, MessageHandler};
pub use protocol::{MessageHead, Method, Mode};
