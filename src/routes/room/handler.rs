use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppResult,
    store::{Room, UserRecord},
    utils::{Claims, success_to_api_response},
};

use super::model::{ListingFilter, RoomForm, RoomIdRequest, UpdateRoomRequest};

#[axum::debug_handler]
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(form): Json<RoomForm>,
) -> AppResult<impl IntoResponse> {
    let owner = UserRecord::require(state.store.as_ref(), &claims.sub).await?;
    let room = Room::create(state.store.as_ref(), &state.live, &owner, form).await?;
    Ok((StatusCode::CREATED, success_to_api_response(room)))
}

#[axum::debug_handler]
pub async fn approved(
    State(state): State<AppState>,
    Query(filter): Query<ListingFilter>,
) -> AppResult<impl IntoResponse> {
    let rooms = Room::approved_listing(state.store.as_ref(), &state.cache, filter).await?;
    Ok((StatusCode::OK, success_to_api_response(rooms)))
}

#[axum::debug_handler]
pub async fn by_id(
    State(state): State<AppState>,
    Query(query): Query<RoomIdRequest>,
) -> AppResult<impl IntoResponse> {
    let room = Room::require(state.store.as_ref(), &query.room_id).await?;
    Ok((StatusCode::OK, success_to_api_response(room)))
}

#[axum::debug_handler]
pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let rooms = Room::owned_by(state.store.as_ref(), &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(rooms)))
}

#[axum::debug_handler]
pub async fn update_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateRoomRequest>,
) -> AppResult<impl IntoResponse> {
    let actor = UserRecord::require(state.store.as_ref(), &claims.sub).await?;
    let room = Room::edit(
        state.store.as_ref(),
        &state.cache,
        &state.live,
        &actor,
        &req.room_id,
        req.form,
    )
    .await?;
    Ok((StatusCode::OK, success_to_api_response(room)))
}

#[axum::debug_handler]
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RoomIdRequest>,
) -> AppResult<impl IntoResponse> {
    let actor = UserRecord::require(state.store.as_ref(), &claims.sub).await?;
    Room::remove(
        state.store.as_ref(),
        &state.cache,
        &state.live,
        &actor,
        &req.room_id,
    )
    .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({
            "success": true
        })),
    ))
}
