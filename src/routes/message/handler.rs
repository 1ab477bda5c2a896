use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{ConversationRequest, MarkReadResponse, SendMessageRequest, UnreadSummary};
use crate::AppState;
use crate::error::AppResult;
use crate::store::{Message, UserRecord};
use crate::utils::{Claims, success_to_api_response};

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let sender = UserRecord::require(state.store.as_ref(), &claims.sub).await?;
    let message = Message::send(state.store.as_ref(), &state.live, &sender, req).await?;
    Ok((StatusCode::CREATED, success_to_api_response(message)))
}

#[axum::debug_handler]
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConversationRequest>,
) -> AppResult<impl IntoResponse> {
    let messages = Message::list(state.store.as_ref(), &claims.sub, &req.conversation_id).await?;
    Ok((StatusCode::OK, success_to_api_response(messages)))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConversationRequest>,
) -> AppResult<impl IntoResponse> {
    let marked = Message::mark_read(
        state.store.as_ref(),
        &state.live,
        &claims.sub,
        &req.conversation_id,
    )
    .await?;
    Ok((StatusCode::OK, success_to_api_response(MarkReadResponse { marked })))
}

#[axum::debug_handler]
pub async fn unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let summary = UnreadSummary::for_user(state.store.as_ref(), &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(summary)))
}
