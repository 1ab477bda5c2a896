mod handler;
mod model;

pub use handler::{
    by_id, check_token, login, me, refresh_token, register, role, update_profile,
};
pub use model::{AuthResponse, PublicProfile, RegisterRequest, RoleResponse};
