mod handler;
mod model;

pub use handler::{by_id, list, resolve};
pub use model::{ConversationSummary, ResolveRequest, ResolveResponse};
