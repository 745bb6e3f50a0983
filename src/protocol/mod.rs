mod message;
mod method;

pub use message::{Framing, MessageHead, Mode};
pub use method::{Method, UnknownMethod, METHODS};
