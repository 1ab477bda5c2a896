use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppResult,
    routes::room::RoomIdRequest,
    store::Room,
    utils::success_to_api_response,
};

// 以下接口都挂在 admin_middleware 之后

#[axum::debug_handler]
pub async fn pending_rooms(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let rooms = Room::pending(state.store.as_ref()).await?;
    Ok((StatusCode::OK, success_to_api_response(rooms)))
}

#[axum::debug_handler]
pub async fn approve_room(
    State(state): State<AppState>,
    Json(req): Json<RoomIdRequest>,
) -> AppResult<impl IntoResponse> {
    let room = Room::approve(
        state.store.as_ref(),
        &state.cache,
        &state.live,
        &req.room_id,
    )
    .await?;
    Ok((StatusCode::OK, success_to_api_response(room)))
}

#[axum::debug_handler]
pub async fn reject_room(
    State(state): State<AppState>,
    Json(req): Json<RoomIdRequest>,
) -> AppResult<impl IntoResponse> {
    Room::reject(state.store.as_ref(), &state.live, &req.room_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({
            "success": true
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_users(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let users = state.store.list_users().await?;
    Ok((StatusCode::OK, success_to_api_response(users)))
}
