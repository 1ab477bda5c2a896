use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{AppState, error::AppError, utils::Claims};

/// 必须挂在 auth_middleware 内层，依赖其写入的 Claims
pub async fn admin_middleware(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match state.store.find_user(&claims.sub).await? {
        Some(user) if user.is_admin() => Ok(next.run(req).await),
        _ => {
            tracing::info!("Non-admin user {} denied admin route {}", claims.sub, req.uri().path());
            Err(AppError::Forbidden("Admin role required".to_string()))
        }
    }
}
