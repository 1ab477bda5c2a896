use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{Conversation, Store, StoreResult, UserRecord};

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub counterpart_id: String,
    #[serde(default)]
    pub counterpart_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationIdQuery {
    pub conversation_id: String,
}

/// 会话列表中的一项，附带对方信息和当前用户在该会话中的未读数
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart_id: Option<String>,
    pub counterpart_name: Option<String>,
    pub unread_count: i64,
}

// 取出 user_id 参与的全部会话，再线性查找同时包含 other_id 的那一个
async fn find_existing(
    store: &dyn Store,
    user_id: &str,
    other_id: &str,
) -> StoreResult<Option<Conversation>> {
    Ok(store
        .conversations_with(user_id)
        .await?
        .into_iter()
        .find(|c| c.has_participant(other_id)))
}

impl Conversation {
    /// 返回 caller 与 counterpart_id 之间唯一的会话 id，不存在时新建
    ///
    /// 查找和插入是两次独立的存储调用：同一对用户同时发起时可能都查不到并各自插入，
    /// 留下两个会话。顺序调用总是得到同一个 id。
    pub async fn get_or_create(
        store: &dyn Store,
        caller: &UserRecord,
        counterpart_id: &str,
        counterpart_name: Option<String>,
    ) -> AppResult<String> {
        if counterpart_id == caller.user_id {
            return Err(AppError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }
        let counterpart = store
            .find_user(counterpart_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Counterpart not found".to_string()))?;

        if let Some(existing) = find_existing(store, &caller.user_id, counterpart_id).await? {
            return Ok(existing.conversation_id);
        }

        let counterpart_name = counterpart_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or(counterpart.display_name);

        let now = Utc::now();
        let conversation = Conversation {
            conversation_id: Uuid::new_v4().to_string(),
            participants: vec![caller.user_id.clone(), counterpart_id.to_string()],
            participant_names: HashMap::from([
                (caller.user_id.clone(), caller.display_name.clone()),
                (counterpart_id.to_string(), counterpart_name),
            ]),
            last_message: String::new(),
            last_message_time: now,
            created_at: now,
        };
        store.insert_conversation(&conversation).await?;
        tracing::info!(
            "Conversation {} created between {} and {}",
            conversation.conversation_id,
            caller.user_id,
            counterpart_id
        );
        Ok(conversation.conversation_id)
    }

    pub async fn require_participant(
        store: &dyn Store,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<Self> {
        let conversation = store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;
        if !conversation.has_participant(user_id) {
            return Err(AppError::Forbidden(
                "User is not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    /// 最近活跃的会话在前
    pub async fn summaries_for(
        store: &dyn Store,
        user_id: &str,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations = store.conversations_with(user_id).await?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let unread_count = store
                .count_unread(user_id, Some(&conversation.conversation_id))
                .await?;
            let counterpart_id = conversation.counterpart_of(user_id).map(str::to_string);
            let counterpart_name = counterpart_id
                .as_ref()
                .and_then(|id| conversation.participant_names.get(id).cloned());
            summaries.push(ConversationSummary {
                conversation,
                counterpart_id,
                counterpart_name,
                unread_count,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DEFAULT_ROLE, MemoryStore};

    fn user(id: &str, name: &str) -> UserRecord {
        let now = Utc::now();
        UserRecord {
            user_id: id.to_string(),
            display_name: name.to_string(),
            email: None,
            photo_url: None,
            role: DEFAULT_ROLE.to_string(),
            phone_number: None,
            line_id: None,
            messenger_name: None,
            profile_picture_url: None,
            password_hash: String::new(),
            created_at: now,
            last_active: now,
        }
    }

    async fn seeded() -> (MemoryStore, UserRecord, UserRecord) {
        let store = MemoryStore::new();
        let a = user("alice", "Alice");
        let b = user("bob", "Bob");
        store.insert_user(&a).await.unwrap();
        store.insert_user(&b).await.unwrap();
        (store, a, b)
    }

    #[tokio::test]
    async fn resolving_twice_in_either_order_returns_same_conversation() {
        let (store, a, b) = seeded().await;

        let first = Conversation::get_or_create(&store, &a, "bob", Some("Bob".into()))
            .await
            .unwrap();
        let again = Conversation::get_or_create(&store, &a, "bob", None)
            .await
            .unwrap();
        let reverse = Conversation::get_or_create(&store, &b, "alice", Some("Alice".into()))
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(first, reverse);
        assert_eq!(store.conversations_with("alice").await.unwrap().len(), 1);
        assert_eq!(store.conversations_with("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn participants_are_exactly_caller_and_counterpart() {
        let (store, a, _) = seeded().await;
        let id = Conversation::get_or_create(&store, &a, "bob", Some("  ".into()))
            .await
            .unwrap();

        let conversation = store.find_conversation(&id).await.unwrap().unwrap();
        let mut participants = conversation.participants.clone();
        participants.sort();
        assert_eq!(participants, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(conversation.participant_names["alice"], "Alice");
        // 空白名称回退到对方资料中的显示名
        assert_eq!(conversation.participant_names["bob"], "Bob");
        assert_eq!(conversation.last_message, "");
    }

    #[tokio::test]
    async fn different_counterparts_get_different_conversations() {
        let (store, a, _) = seeded().await;
        store.insert_user(&user("carol", "Carol")).await.unwrap();

        let with_bob = Conversation::get_or_create(&store, &a, "bob", None).await.unwrap();
        let with_carol = Conversation::get_or_create(&store, &a, "carol", None).await.unwrap();
        assert_ne!(with_bob, with_carol);
        assert_eq!(store.conversations_with("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_self_and_unknown_counterparts() {
        let (store, a, _) = seeded().await;
        assert!(matches!(
            Conversation::get_or_create(&store, &a, "alice", None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            Conversation::get_or_create(&store, &a, "nobody", None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store.conversations_with("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outsiders_cannot_enter_a_conversation() {
        let (store, a, _) = seeded().await;
        let id = Conversation::get_or_create(&store, &a, "bob", None).await.unwrap();

        assert!(Conversation::require_participant(&store, &id, "bob").await.is_ok());
        assert!(matches!(
            Conversation::require_participant(&store, &id, "mallory").await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            Conversation::require_participant(&store, "missing", "bob").await,
            Err(AppError::NotFound(_))
        ));
    }
}
