pub mod admin;
pub mod conversation;
pub mod health;
pub mod live;
pub mod message;
pub mod room;
pub mod user;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::{
    AppState,
    middleware::{admin_middleware, auth_middleware, log_errors},
};

/// 组装全部路由；限流和 CORS 由 main 按配置追加
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/users/register", post(user::register))
        .route("/users/login", post(user::login))
        .route("/rooms/approved", get(room::approved))
        .route("/rooms/by-id", get(room::by_id));

    let admin_routes = Router::new()
        .route("/admin/rooms/pending", get(admin::pending_rooms))
        .route("/admin/rooms/approve", post(admin::approve_room))
        .route("/admin/rooms/reject", post(admin::reject_room))
        .route("/admin/users", get(admin::list_users))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    let protected_routes = Router::new()
        // 用户
        .route("/users/me", get(user::me))
        .route("/users/role", get(user::role))
        .route("/users/by-id", get(user::by_id))
        .route("/users/update-profile", put(user::update_profile))
        .route("/users/refresh-token", post(user::refresh_token))
        .route("/users/check-token", get(user::check_token))
        // 房源
        .route("/rooms/create", post(room::create_room))
        .route("/rooms/update", put(room::update_room))
        .route("/rooms/delete", post(room::delete_room))
        .route("/rooms/mine", get(room::mine))
        // 会话与消息
        .route("/conversations/resolve", post(conversation::resolve))
        .route("/conversations/list", get(conversation::list))
        .route("/conversations/by-id", get(conversation::by_id))
        .route("/messages/send", post(message::send_message))
        .route("/messages/get", post(message::get_messages))
        .route("/messages/mark-read", post(message::mark_read))
        .route("/messages/unread", get(message::unread))
        .route("/live", get(live::live_ws))
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = state.config.api_base_uri.trim_end_matches('/');
    // axum 不允许在根路径 nest
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    router
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
