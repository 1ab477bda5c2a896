mod handler;
mod model;

pub use handler::{approve_room, list_users, pending_rooms, reject_room};
