use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppResult,
    store::{ContactDetails, UserRecord},
    utils::{Claims, generate_token, success_to_api_response},
};

use super::model::{
    AuthResponse, CheckTokenResponse, LoginRequest, PublicProfile, RegisterRequest, RoleResponse,
    TokenResponse, UserIdQuery,
};

fn auth_response(state: &AppState, user: UserRecord) -> AppResult<AuthResponse> {
    let (token, expires_at) = generate_token(&user.user_id, &state.config)?;
    Ok(AuthResponse {
        user_id: user.user_id,
        display_name: user.display_name,
        token,
        expires_at,
    })
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let user = UserRecord::register(state.store.as_ref(), req).await?;
    Ok((
        StatusCode::CREATED,
        success_to_api_response(auth_response(&state, user)?),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let user = UserRecord::login(state.store.as_ref(), req).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(auth_response(&state, user)?),
    ))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let user = UserRecord::require(state.store.as_ref(), &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn by_id(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> AppResult<impl IntoResponse> {
    let user = UserRecord::require(state.store.as_ref(), &query.user_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(PublicProfile::from(user)),
    ))
}

/// 前端据此决定是否显示管理页面
#[axum::debug_handler]
pub async fn role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let role = UserRecord::role_of(state.store.as_ref(), &claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(RoleResponse { role })))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(contact): Json<ContactDetails>,
) -> AppResult<impl IntoResponse> {
    let user = UserRecord::update_profile(state.store.as_ref(), &claims.sub, contact).await?;
    Ok((StatusCode::OK, success_to_api_response(user)))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<impl IntoResponse> {
    let (token, expires_at) = generate_token(&claims.sub, &state.config)?;
    if let Err(e) = state.store.touch_user(&claims.sub, chrono::Utc::now()).await {
        tracing::warn!("Failed to update last_active for {}: {}", claims.sub, e);
    }
    Ok((
        StatusCode::OK,
        success_to_api_response(TokenResponse { token, expires_at }),
    ))
}

/// 中间件已验证 token，能走到这里即有效
#[axum::debug_handler]
pub async fn check_token(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(CheckTokenResponse {
            user_id: claims.sub,
        }),
    )
}
