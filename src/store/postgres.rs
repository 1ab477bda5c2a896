use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use super::{
    ContactDetails, Conversation, Message, Room, RoomDetails, RoomQuery, RoomStatus, Store,
    StoreError, StoreResult, UserRecord,
};

const USER_COLUMNS: &str = r#"
    user_id, display_name, email, photo_url, role, phone_number, line_id,
    messenger_name, profile_picture_url, password_hash, created_at, last_active
"#;

const ROOM_COLUMNS: &str = r#"
    room_id, owner_id, owner_name, name, price, deposit, location, building, floor,
    room_number, room_type, description, image_url, location_map, contract, electric,
    facilities, taxi_service, van_service, status, created_at
"#;

const CONVERSATION_COLUMNS: &str = r#"
    conversation_id, participants, participant_names, last_message, last_message_time, created_at
"#;

const MESSAGE_COLUMNS: &str = r#"
    message_id, conversation_id, sender_id, sender_name, recipient_id, text, timestamp, read
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

// 唯一键冲突映射为 Conflict，其余错误原样上抛
fn map_insert_error(err: sqlx::Error, key: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(key.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn map_row_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {}: {}", index, source))
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &UserRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, display_name, email, photo_url, role, phone_number, line_id,
                messenger_name, profile_picture_url, password_hash, created_at, last_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.photo_url)
        .bind(&user.role)
        .bind(&user.phone_number)
        .bind(&user.line_id)
        .bind(&user.messenger_name)
        .bind(&user.profile_picture_url)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.last_active)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &user.user_id))?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
        sqlx::query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn update_contact(
        &self,
        user_id: &str,
        contact: &ContactDetails,
    ) -> StoreResult<UserRecord> {
        let sql = format!(
            r#"
            UPDATE users
            SET phone_number = $1, line_id = $2, messenger_name = $3, profile_picture_url = $4
            WHERE user_id = $5
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(&contact.phone_number)
            .bind(&contact.line_id)
            .bind(&contact.messenger_name)
            .bind(&contact.profile_picture_url)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn touch_user(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET last_active = $1 WHERE user_id = $2")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_room(&self, room: &Room) -> StoreResult<()> {
        let d = &room.details;
        sqlx::query(
            r#"
            INSERT INTO rooms (
                room_id, owner_id, owner_name, name, price, deposit, location, building, floor,
                room_number, room_type, description, image_url, location_map, contract, electric,
                facilities, taxi_service, van_service, status, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
            )
            "#,
        )
        .bind(&room.room_id)
        .bind(&room.owner_id)
        .bind(&room.owner_name)
        .bind(&d.name)
        .bind(d.price)
        .bind(d.deposit)
        .bind(&d.location)
        .bind(&d.building)
        .bind(&d.floor)
        .bind(&d.room_number)
        .bind(&d.room_type)
        .bind(&d.description)
        .bind(&d.image_url)
        .bind(&d.location_map)
        .bind(&d.contract)
        .bind(&d.electric)
        .bind(&d.facilities)
        .bind(d.taxi_service)
        .bind(d.van_service)
        .bind(room.status.as_str())
        .bind(room.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &room.room_id))?;
        Ok(())
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let sql = format!("SELECT {} FROM rooms WHERE room_id = $1", ROOM_COLUMNS);
        sqlx::query_as::<_, Room>(&sql)
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn query_rooms(&self, query: &RoomQuery) -> StoreResult<Vec<Room>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM rooms WHERE TRUE",
            ROOM_COLUMNS
        ));
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(owner_id) = &query.owner_id {
            qb.push(" AND owner_id = ").push_bind(owner_id.clone());
        }
        if let Some(location) = &query.location {
            // 与 RoomQuery::matches 一致：不区分大小写的子串
            qb.push(" AND STRPOS(LOWER(location), LOWER(")
                .push_bind(location.clone())
                .push(")) > 0");
        }
        if let Some(room_type) = &query.room_type {
            qb.push(" AND room_type = ").push_bind(room_type.clone());
        }
        if let Some(building) = &query.building {
            qb.push(" AND building = ").push_bind(building.clone());
        }
        if let Some(min_price) = query.min_price {
            qb.push(" AND price >= ").push_bind(min_price);
        }
        if let Some(max_price) = query.max_price {
            qb.push(" AND price <= ").push_bind(max_price);
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<Room>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn update_room(&self, room_id: &str, details: &RoomDetails) -> StoreResult<Room> {
        let sql = format!(
            r#"
            UPDATE rooms
            SET name = $1, price = $2, deposit = $3, location = $4, building = $5, floor = $6,
                room_number = $7, room_type = $8, description = $9, image_url = $10,
                location_map = $11, contract = $12, electric = $13, facilities = $14,
                taxi_service = $15, van_service = $16
            WHERE room_id = $17
            RETURNING {}
            "#,
            ROOM_COLUMNS
        );
        sqlx::query_as::<_, Room>(&sql)
            .bind(&details.name)
            .bind(details.price)
            .bind(details.deposit)
            .bind(&details.location)
            .bind(&details.building)
            .bind(&details.floor)
            .bind(&details.room_number)
            .bind(&details.room_type)
            .bind(&details.description)
            .bind(&details.image_url)
            .bind(&details.location_map)
            .bind(&details.contract)
            .bind(&details.electric)
            .bind(&details.facilities)
            .bind(details.taxi_service)
            .bind(details.van_service)
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn set_room_status(&self, room_id: &str, status: RoomStatus) -> StoreResult<Room> {
        let sql = format!(
            "UPDATE rooms SET status = $1 WHERE room_id = $2 RETURNING {}",
            ROOM_COLUMNS
        );
        sqlx::query_as::<_, Room>(&sql)
            .bind(status.as_str())
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn conversations_with(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let sql = format!(
            r#"
            SELECT {} FROM conversations
            WHERE $1 = ANY(participants)
            ORDER BY last_message_time DESC
            "#,
            CONVERSATION_COLUMNS
        );
        sqlx::query_as::<_, Conversation>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn find_conversation(&self, conversation_id: &str) -> StoreResult<Option<Conversation>> {
        let sql = format!(
            "SELECT {} FROM conversations WHERE conversation_id = $1",
            CONVERSATION_COLUMNS
        );
        sqlx::query_as::<_, Conversation>(&sql)
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                conversation_id, participants, participant_names, last_message,
                last_message_time, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&conversation.conversation_id)
        .bind(&conversation.participants)
        .bind(Json(&conversation.participant_names))
        .bind(&conversation.last_message)
        .bind(conversation.last_message_time)
        .bind(conversation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &conversation.conversation_id))?;
        Ok(())
    }

    async fn record_last_message(
        &self,
        conversation_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        let sql = format!(
            r#"
            UPDATE conversations
            SET last_message = $1, last_message_time = $2
            WHERE conversation_id = $3
            RETURNING {}
            "#,
            CONVERSATION_COLUMNS
        );
        sqlx::query_as::<_, Conversation>(&sql)
            .bind(text)
            .bind(at)
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, conversation_id, sender_id, sender_name, recipient_id,
                text, timestamp, read
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&message.message_id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.recipient_id)
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(message.read)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::NotFound)
            }
            Err(e) => Err(map_insert_error(e, &message.message_id)),
        }
    }

    async fn messages_in(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE conversation_id = $1 ORDER BY timestamp ASC",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, Message>(&sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_row_error)
    }

    async fn mark_read(&self, conversation_id: &str, recipient_id: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE
            WHERE conversation_id = $1 AND recipient_id = $2 AND read = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_unread(
        &self,
        recipient_id: &str,
        conversation_id: Option<&str>,
    ) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE recipient_id = $1
                AND read = FALSE
                AND ($2::TEXT IS NULL OR conversation_id = $2)
            "#,
        )
        .bind(recipient_id)
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
