mod handler;
mod model;

pub use handler::{approved, by_id, create_room, delete_room, mine, update_room};
pub use model::{ListingFilter, RoomForm, RoomIdRequest};
