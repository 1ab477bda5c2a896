// 存储模块
// Store trait 是所有业务逻辑访问数据的唯一入口

mod memory;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub role: String,
    pub phone_number: Option<String>,
    pub line_id: Option<String>,
    pub messenger_name: Option<String>,
    pub profile_picture_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl UserRecord {
    /// role 是自由文本，只有精确等于 "admin" 才算管理员
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// 个人资料页可以修改的联系方式
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactDetails {
    pub phone_number: Option<String>,
    pub line_id: Option<String>,
    pub messenger_name: Option<String>,
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Pending,
    Approved,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Pending => "pending",
            RoomStatus::Approved => "approved",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown room status: {0}")]
pub struct UnknownStatus(pub String);

impl TryFrom<String> for RoomStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(RoomStatus::Pending),
            "approved" => Ok(RoomStatus::Approved),
            _ => Err(UnknownStatus(value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Room {
    pub room_id: String,
    pub owner_id: String,
    pub owner_name: String,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub details: RoomDetails,
    #[sqlx(try_from = "String")]
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
}

/// 房源中房东可以编辑的部分，创建和更新共用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RoomDetails {
    pub name: String,
    pub price: f64,
    pub deposit: Option<f64>,
    pub location: String,
    pub building: Option<String>,
    pub floor: Option<String>,
    pub room_number: Option<String>,
    pub room_type: Option<String>,
    pub description: String,
    pub image_url: String,
    pub location_map: Option<String>,
    pub contract: Option<String>,
    pub electric: Option<String>,
    pub facilities: Vec<String>,
    pub taxi_service: bool,
    pub van_service: bool,
}

/// 房源查询条件，两种存储实现必须给出相同的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomQuery {
    pub status: Option<RoomStatus>,
    pub owner_id: Option<String>,
    pub location: Option<String>,
    pub room_type: Option<String>,
    pub building: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl RoomQuery {
    pub fn with_status(status: RoomStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_owner(owner_id: &str) -> Self {
        Self {
            owner_id: Some(owner_id.to_string()),
            ..Self::default()
        }
    }

    /// 除了 status 之外没有任何过滤条件
    pub fn is_unfiltered(&self) -> bool {
        self.owner_id.is_none()
            && self.location.is_none()
            && self.room_type.is_none()
            && self.building.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
    }

    pub fn matches(&self, room: &Room) -> bool {
        if self.status.is_some_and(|s| s != room.status) {
            return false;
        }
        if self.owner_id.as_deref().is_some_and(|o| o != room.owner_id) {
            return false;
        }
        // location 为不区分大小写的子串匹配
        if let Some(location) = &self.location {
            if !room
                .details
                .location
                .to_lowercase()
                .contains(&location.to_lowercase())
            {
                return false;
            }
        }
        if let Some(room_type) = &self.room_type {
            if room.details.room_type.as_deref() != Some(room_type.as_str()) {
                return false;
            }
        }
        if let Some(building) = &self.building {
            if room.details.building.as_deref() != Some(building.as_str()) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| room.details.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| room.details.price > max) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub conversation_id: String,
    pub participants: Vec<String>,
    #[sqlx(json)]
    pub participant_names: HashMap<String, String>,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// 两人会话中除 user_id 以外的另一方
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if !self.has_participant(user_id) {
            return None;
        }
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    // 用户
    async fn insert_user(&self, user: &UserRecord) -> StoreResult<()>;
    async fn find_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>>;
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;
    async fn update_contact(
        &self,
        user_id: &str,
        contact: &ContactDetails,
    ) -> StoreResult<UserRecord>;
    async fn touch_user(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    // 房源
    async fn insert_room(&self, room: &Room) -> StoreResult<()>;
    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>>;
    /// 按 created_at 倒序
    async fn query_rooms(&self, query: &RoomQuery) -> StoreResult<Vec<Room>>;
    async fn update_room(&self, room_id: &str, details: &RoomDetails) -> StoreResult<Room>;
    async fn set_room_status(&self, room_id: &str, status: RoomStatus) -> StoreResult<Room>;
    async fn delete_room(&self, room_id: &str) -> StoreResult<()>;

    // 会话
    /// 所有包含 user_id 的会话，按 last_message_time 倒序
    async fn conversations_with(&self, user_id: &str) -> StoreResult<Vec<Conversation>>;
    async fn find_conversation(&self, conversation_id: &str) -> StoreResult<Option<Conversation>>;
    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()>;
    async fn record_last_message(
        &self,
        conversation_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation>;

    // 消息
    async fn insert_message(&self, message: &Message) -> StoreResult<()>;
    /// 按 timestamp 正序
    async fn messages_in(&self, conversation_id: &str) -> StoreResult<Vec<Message>>;
    /// 返回被标记为已读的消息数
    async fn mark_read(&self, conversation_id: &str, recipient_id: &str) -> StoreResult<u64>;
    async fn count_unread(
        &self,
        recipient_id: &str,
        conversation_id: Option<&str>,
    ) -> StoreResult<i64>;
}
