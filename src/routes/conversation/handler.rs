use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppResult,
    store::{Conversation, UserRecord},
    utils::{Claims, success_to_api_response},
};

use super::model::{ConversationIdQuery, ResolveRequest, ResolveResponse};

/// 从房源页"联系房东"进入：找到或创建与对方的会话
#[axum::debug_handler]
pub async fn resolve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResolveRequest>,
) -> AppResult<impl IntoResponse> {
    let caller = UserRecord::require(state.store.as_ref(), &claims.sub).await?;
    let conversation_id = Conversation::get_or_create(
        state.store.as_ref(),
        &caller,
        &req.counterpart_id,
        req.counterpart_name,
    )
    .await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(ResolveResponse { conversation_id }),
    ))
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let summaries = Conversation::summaries_for(state.store.as_ref(), &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(summaries)))
}

#[axum::debug_handler]
pub async fn by_id(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ConversationIdQuery>,
) -> AppResult<impl IntoResponse> {
    let conversation = Conversation::require_participant(
        state.store.as_ref(),
        &query.conversation_id,
        &claims.sub,
    )
    .await?;
    Ok((StatusCode::OK, success_to_api_response(conversation)))
}
