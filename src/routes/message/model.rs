use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::live::{LiveEvent, LiveHub};
use crate::store::{Conversation, Message, Store, UserRecord};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

/// 未读数：每个会话各自计数，total 为各会话之和
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UnreadSummary {
    pub total: i64,
    pub per_conversation: BTreeMap<String, i64>,
}

impl UnreadSummary {
    pub async fn for_user(store: &dyn Store, user_id: &str) -> AppResult<Self> {
        let mut per_conversation = BTreeMap::new();
        for conversation in store.conversations_with(user_id).await? {
            let count = store
                .count_unread(user_id, Some(&conversation.conversation_id))
                .await?;
            per_conversation.insert(conversation.conversation_id, count);
        }
        Ok(Self {
            total: per_conversation.values().sum(),
            per_conversation,
        })
    }

    /// `conversation_id` 为空时生成连接建立时的快照事件
    pub fn into_event(self, user_id: &str, conversation_id: Option<&str>) -> LiveEvent {
        let conversation_unread = conversation_id
            .and_then(|id| self.per_conversation.get(id).copied())
            .unwrap_or(self.total);
        LiveEvent::UnreadChanged {
            user_id: user_id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            conversation_unread,
            total_unread: self.total,
        }
    }
}

// 推送失败不影响写操作本身
async fn publish_unread(
    store: &dyn Store,
    live: &LiveHub,
    user_id: &str,
    conversation_id: &str,
) {
    match UnreadSummary::for_user(store, user_id).await {
        Ok(summary) => live.publish(summary.into_event(user_id, Some(conversation_id))),
        Err(e) => tracing::warn!("Failed to compute unread counts for {}: {}", user_id, e),
    }
}

impl Message {
    /// 收件人是会话中的另一方，发送后更新会话的最后一条消息
    pub async fn send(
        store: &dyn Store,
        live: &LiveHub,
        sender: &UserRecord,
        req: SendMessageRequest,
    ) -> AppResult<Self> {
        if req.text.trim().is_empty() {
            return Err(AppError::Validation("Message text is empty".to_string()));
        }

        let conversation =
            Conversation::require_participant(store, &req.conversation_id, &sender.user_id)
                .await?;
        let recipient_id = conversation
            .counterpart_of(&sender.user_id)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Conversation {} has no counterpart",
                    conversation.conversation_id
                ))
            })?
            .to_string();

        let now = Utc::now();
        let message = Message {
            message_id: Uuid::new_v4().to_string(),
            conversation_id: conversation.conversation_id,
            sender_id: sender.user_id.clone(),
            sender_name: sender.display_name.clone(),
            recipient_id,
            text: req.text,
            timestamp: now,
            read: false,
        };
        store.insert_message(&message).await?;

        let conversation = store
            .record_last_message(&message.conversation_id, &message.text, now)
            .await?;

        live.publish(LiveEvent::MessageCreated {
            message: message.clone(),
        });
        live.publish(LiveEvent::ConversationUpdated { conversation });
        publish_unread(store, live, &message.recipient_id, &message.conversation_id).await;

        tracing::debug!(
            "Message {} sent in {}",
            message.message_id,
            message.conversation_id
        );
        Ok(message)
    }

    pub async fn list(
        store: &dyn Store,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<Vec<Self>> {
        Conversation::require_participant(store, conversation_id, user_id).await?;
        Ok(store.messages_in(conversation_id).await?)
    }

    /// 把会话中发给 user_id 的未读消息逐条标记为已读
    pub async fn mark_read(
        store: &dyn Store,
        live: &LiveHub,
        user_id: &str,
        conversation_id: &str,
    ) -> AppResult<u64> {
        Conversation::require_participant(store, conversation_id, user_id).await?;
        let marked = store.mark_read(conversation_id, user_id).await?;
        if marked > 0 {
            publish_unread(store, live, user_id, conversation_id).await;
        }
        Ok(marked)
    }
}
