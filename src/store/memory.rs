use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    ContactDetails, Conversation, Message, Room, RoomDetails, RoomQuery, RoomStatus, Store,
    StoreError, StoreResult, UserRecord,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    rooms: HashMap<String, Room>,
    conversations: HashMap<String, Conversation>,
    messages: Vec<Message>,
}

/// 进程内存储，没有配置 DATABASE_URL 时使用，测试也使用它
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &UserRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.user_id) {
            return Err(StoreError::Conflict(user.user_id.clone()));
        }
        tables.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        let tables = self.tables.read().await;
        let mut users: Vec<_> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn update_contact(
        &self,
        user_id: &str,
        contact: &ContactDetails,
    ) -> StoreResult<UserRecord> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(user_id).ok_or(StoreError::NotFound)?;
        user.phone_number = contact.phone_number.clone();
        user.line_id = contact.line_id.clone();
        user.messenger_name = contact.messenger_name.clone();
        user.profile_picture_url = contact.profile_picture_url.clone();
        Ok(user.clone())
    }

    async fn touch_user(&self, user_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(user_id).ok_or(StoreError::NotFound)?;
        user.last_active = at;
        Ok(())
    }

    async fn insert_room(&self, room: &Room) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.rooms.contains_key(&room.room_id) {
            return Err(StoreError::Conflict(room.room_id.clone()));
        }
        tables.rooms.insert(room.room_id.clone(), room.clone());
        Ok(())
    }

    async fn find_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        Ok(self.tables.read().await.rooms.get(room_id).cloned())
    }

    async fn query_rooms(&self, query: &RoomQuery) -> StoreResult<Vec<Room>> {
        let tables = self.tables.read().await;
        let mut rooms: Vec<_> = tables
            .rooms
            .values()
            .filter(|room| query.matches(room))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn update_room(&self, room_id: &str, details: &RoomDetails) -> StoreResult<Room> {
        let mut tables = self.tables.write().await;
        let room = tables.rooms.get_mut(room_id).ok_or(StoreError::NotFound)?;
        room.details = details.clone();
        Ok(room.clone())
    }

    async fn set_room_status(&self, room_id: &str, status: RoomStatus) -> StoreResult<Room> {
        let mut tables = self.tables.write().await;
        let room = tables.rooms.get_mut(room_id).ok_or(StoreError::NotFound)?;
        room.status = status;
        Ok(room.clone())
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .rooms
            .remove(room_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn conversations_with(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<_> = tables
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(conversations)
    }

    async fn find_conversation(&self, conversation_id: &str) -> StoreResult<Option<Conversation>> {
        Ok(self
            .tables
            .read()
            .await
            .conversations
            .get(conversation_id)
            .cloned())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .conversations
            .contains_key(&conversation.conversation_id)
        {
            return Err(StoreError::Conflict(conversation.conversation_id.clone()));
        }
        tables
            .conversations
            .insert(conversation.conversation_id.clone(), conversation.clone());
        Ok(())
    }

    async fn record_last_message(
        &self,
        conversation_id: &str,
        text: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        let conversation = tables
            .conversations
            .get_mut(conversation_id)
            .ok_or(StoreError::NotFound)?;
        conversation.last_message = text.to_string();
        conversation.last_message_time = at;
        Ok(conversation.clone())
    }

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&message.conversation_id) {
            return Err(StoreError::NotFound);
        }
        tables.messages.push(message.clone());
        Ok(())
    }

    async fn messages_in(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        let mut messages: Vec<_> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // 稳定排序，同一时间戳保持插入顺序
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    async fn mark_read(&self, conversation_id: &str, recipient_id: &str) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut flipped = 0;
        for message in tables.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id && m.recipient_id == recipient_id && !m.read
        }) {
            message.read = true;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn count_unread(
        &self,
        recipient_id: &str,
        conversation_id: Option<&str>,
    ) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .messages
            .iter()
            .filter(|m| m.recipient_id == recipient_id && !m.read)
            .filter(|m| conversation_id.is_none_or(|c| m.conversation_id == c))
            .count();
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn details(name: &str, location: &str, price: f64) -> RoomDetails {
        RoomDetails {
            name: name.to_string(),
            price,
            deposit: None,
            location: location.to_string(),
            building: None,
            floor: None,
            room_number: None,
            room_type: Some("studio".to_string()),
            description: "quiet".to_string(),
            image_url: "https://img.example/r.jpg".to_string(),
            location_map: None,
            contract: None,
            electric: None,
            facilities: vec!["wifi".to_string()],
            taxi_service: false,
            van_service: false,
        }
    }

    fn room(id: &str, owner: &str, status: RoomStatus, age_minutes: i64, d: RoomDetails) -> Room {
        Room {
            room_id: id.to_string(),
            owner_id: owner.to_string(),
            owner_name: owner.to_string(),
            details: d,
            status,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn message(id: &str, conversation: &str, to: &str, read: bool) -> Message {
        Message {
            message_id: id.to_string(),
            conversation_id: conversation.to_string(),
            sender_id: "someone".to_string(),
            sender_name: "Someone".to_string(),
            recipient_id: to.to_string(),
            text: "hi".to_string(),
            timestamp: Utc::now(),
            read,
        }
    }

    fn conversation(id: &str, a: &str, b: &str) -> Conversation {
        Conversation {
            conversation_id: id.to_string(),
            participants: vec![a.to_string(), b.to_string()],
            participant_names: HashMap::new(),
            last_message: String::new(),
            last_message_time: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn query_rooms_filters_and_orders_newest_first() {
        let store = MemoryStore::new();
        let seed = [
            room("old", "a", RoomStatus::Approved, 30, details("Old", "Silom", 5000.0)),
            room("new", "a", RoomStatus::Approved, 1, details("New", "silom soi 3", 9000.0)),
            room("pend", "b", RoomStatus::Pending, 5, details("Pend", "Silom", 4000.0)),
        ];
        for r in &seed {
            store.insert_room(r).await.unwrap();
        }

        let approved = store
            .query_rooms(&RoomQuery::with_status(RoomStatus::Approved))
            .await
            .unwrap();
        let ids: Vec<_> = approved.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let cheap_silom = RoomQuery {
            status: Some(RoomStatus::Approved),
            location: Some("SILOM".to_string()),
            max_price: Some(6000.0),
            ..RoomQuery::default()
        };
        let rooms = store.query_rooms(&cheap_silom).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, "old");

        let mine = store.query_rooms(&RoomQuery::with_owner("b")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, RoomStatus::Pending);
    }

    #[tokio::test]
    async fn deleted_room_disappears_from_every_query() {
        let store = MemoryStore::new();
        store
            .insert_room(&room("r1", "a", RoomStatus::Approved, 0, details("R", "Ari", 1.0)))
            .await
            .unwrap();
        store.delete_room("r1").await.unwrap();

        assert!(store.find_room("r1").await.unwrap().is_none());
        assert!(store.query_rooms(&RoomQuery::default()).await.unwrap().is_empty());
        assert!(matches!(store.delete_room("r1").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn unread_counts_follow_read_flags() {
        let store = MemoryStore::new();
        store.insert_conversation(&conversation("c1", "a", "b")).await.unwrap();
        store.insert_conversation(&conversation("c2", "a", "c")).await.unwrap();
        store.insert_message(&message("m1", "c1", "a", false)).await.unwrap();
        store.insert_message(&message("m2", "c1", "a", false)).await.unwrap();
        store.insert_message(&message("m3", "c2", "a", false)).await.unwrap();
        store.insert_message(&message("m4", "c2", "a", true)).await.unwrap();
        store.insert_message(&message("m5", "c1", "b", false)).await.unwrap();

        assert_eq!(store.count_unread("a", None).await.unwrap(), 3);
        assert_eq!(store.count_unread("a", Some("c1")).await.unwrap(), 2);

        assert_eq!(store.mark_read("c1", "a").await.unwrap(), 2);
        assert_eq!(store.mark_read("c1", "a").await.unwrap(), 0);
        assert_eq!(store.count_unread("a", None).await.unwrap(), 1);
        // 对方的未读不受影响
        assert_eq!(store.count_unread("b", Some("c1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn message_requires_existing_conversation() {
        let store = MemoryStore::new();
        let result = store.insert_message(&message("m1", "missing", "a", false)).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
