use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::store::{ContactDetails, DEFAULT_ROLE, Store, StoreError, UserRecord};
use crate::utils::{hash_password, verify_password};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
    pub password: String,
    pub display_name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub display_name: String,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckTokenResponse {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleResponse {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

/// 对其他用户可见的资料（房东联系方式）
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicProfile {
    pub user_id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub line_id: Option<String>,
    pub messenger_name: Option<String>,
    pub profile_picture_url: Option<String>,
}

impl From<UserRecord> for PublicProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            display_name: user.display_name,
            photo_url: user.photo_url,
            phone_number: user.phone_number,
            line_id: user.line_id,
            messenger_name: user.messenger_name,
            profile_picture_url: user.profile_picture_url,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_registration(req: &RegisterRequest) -> AppResult<()> {
    if req.user_id.is_empty()
        || req.user_id.len() > 64
        || !req.user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::Validation(
            "user_id may only contain letters, digits and underscores".to_string(),
        ));
    }
    let password_len = req.password.chars().count();
    if !(6..=24).contains(&password_len) {
        return Err(AppError::Validation(
            "password must be between 6 and 24 characters".to_string(),
        ));
    }
    let name_len = req.display_name.trim().chars().count();
    if !(2..=24).contains(&name_len) {
        return Err(AppError::Validation(
            "display_name must be between 2 and 24 characters".to_string(),
        ));
    }
    Ok(())
}

impl UserRecord {
    pub async fn register(store: &dyn Store, req: RegisterRequest) -> AppResult<Self> {
        validate_registration(&req)?;

        let password_hash = hash_password(&req.password)?;
        let now = Utc::now();
        let user = UserRecord {
            user_id: req.user_id,
            display_name: req.display_name.trim().to_string(),
            email: non_blank(req.email),
            photo_url: non_blank(req.photo_url),
            role: DEFAULT_ROLE.to_string(),
            phone_number: None,
            line_id: None,
            messenger_name: None,
            profile_picture_url: None,
            password_hash,
            created_at: now,
            last_active: now,
        };

        match store.insert_user(&user).await {
            Ok(()) => {
                tracing::info!("Registered user: {}", user.user_id);
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                Err(AppError::UserExists("User already exists".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(store: &dyn Store, req: LoginRequest) -> AppResult<Self> {
        let user = store
            .find_user(&req.user_id)
            .await?
            .ok_or_else(|| AppError::AuthFailed("Invalid user id or password".to_string()))?;

        // 库里的哈希无法解析（例如手工写入的管理员）同样按认证失败处理
        let verified = verify_password(&req.password, &user.password_hash).unwrap_or_else(|e| {
            tracing::warn!("Unusable password hash for {}: {}", user.user_id, e);
            false
        });
        if !verified {
            return Err(AppError::AuthFailed(
                "Invalid user id or password".to_string(),
            ));
        }

        store.touch_user(&user.user_id, Utc::now()).await?;
        Ok(user)
    }

    pub async fn require(store: &dyn Store, user_id: &str) -> AppResult<Self> {
        store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// 没有资料记录的用户按普通用户处理
    pub async fn role_of(store: &dyn Store, user_id: &str) -> AppResult<String> {
        Ok(store
            .find_user(user_id)
            .await?
            .map(|u| u.role)
            .unwrap_or_else(|| DEFAULT_ROLE.to_string()))
    }

    pub async fn update_profile(
        store: &dyn Store,
        user_id: &str,
        contact: ContactDetails,
    ) -> AppResult<Self> {
        let contact = ContactDetails {
            phone_number: non_blank(contact.phone_number),
            line_id: non_blank(contact.line_id),
            messenger_name: non_blank(contact.messenger_name),
            profile_picture_url: non_blank(contact.profile_picture_url),
        };
        Ok(store.update_contact(user_id, &contact).await?)
    }
}
