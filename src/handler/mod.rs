mod collect_handler;
mod handler;

pub use collect_handler::{CollectedMessage, CollectingHandler};
pub use handler::{HeadersAction, MessageHandler};
