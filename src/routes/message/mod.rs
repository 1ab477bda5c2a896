mod handler;
mod model;

pub use handler::{get_messages, mark_read, send_message, unread};
pub use model::{MarkReadResponse, UnreadSummary};
