//! 实时推送
//!
//! 所有写操作成功后把事件发布到一个 broadcast 通道，每个 `/live` 连接订阅该通道，
//! 只转发 `is_visible_to` 允许它看到的事件。
//!
//! 房源事件的可见范围跟随房源状态：已审核的房源所有人可见，待审核的只对房东和管理员可见。

use serde::Serialize;
use tokio::sync::broadcast;

use crate::store::{Conversation, Message, Room, RoomStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    MessageCreated {
        message: Message,
    },
    ConversationUpdated {
        conversation: Conversation,
    },
    UnreadChanged {
        user_id: String,
        /// 为空表示连接建立时的全量快照
        conversation_id: Option<String>,
        conversation_unread: i64,
        total_unread: i64,
    },
    RoomCreated {
        room: Room,
    },
    /// 内容修改或审核通过
    RoomUpdated {
        room: Room,
    },
    RoomDeleted {
        room_id: String,
        owner_id: String,
        status: RoomStatus,
    },
}

/// `/live` 连接的订阅者身份，连接建立时确定
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: String,
    pub is_admin: bool,
}

impl Viewer {
    fn can_see_room(&self, owner_id: &str, status: RoomStatus) -> bool {
        status == RoomStatus::Approved || self.is_admin || self.user_id == owner_id
    }
}

impl LiveEvent {
    pub fn is_visible_to(&self, viewer: &Viewer) -> bool {
        let user_id = viewer.user_id.as_str();
        match self {
            LiveEvent::MessageCreated { message } => {
                message.sender_id == user_id || message.recipient_id == user_id
            }
            LiveEvent::ConversationUpdated { conversation } => {
                conversation.has_participant(user_id)
            }
            LiveEvent::UnreadChanged { user_id: owner, .. } => owner == user_id,
            LiveEvent::RoomCreated { room } | LiveEvent::RoomUpdated { room } => {
                viewer.can_see_room(&room.owner_id, room.status)
            }
            LiveEvent::RoomDeleted {
                owner_id, status, ..
            } => viewer.can_see_room(owner_id, *status),
        }
    }
}

#[derive(Clone)]
pub struct LiveHub {
    tx: broadcast::Sender<LiveEvent>,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 没有订阅者时事件直接丢弃
    pub fn publish(&self, event: LiveEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RoomDetails;
    use chrono::Utc;

    fn message(from: &str, to: &str) -> Message {
        Message {
            message_id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: from.into(),
            sender_name: from.into(),
            recipient_id: to.into(),
            text: "hello".into(),
            timestamp: Utc::now(),
            read: false,
        }
    }

    fn room(owner: &str, status: RoomStatus) -> Room {
        Room {
            room_id: "r1".into(),
            owner_id: owner.into(),
            owner_name: owner.into(),
            details: RoomDetails {
                name: "Loft".into(),
                price: 5000.0,
                deposit: None,
                location: "Ari".into(),
                building: None,
                floor: None,
                room_number: None,
                room_type: None,
                description: "quiet".into(),
                image_url: "https://img.example/r.jpg".into(),
                location_map: None,
                contract: None,
                electric: None,
                facilities: Vec::new(),
                taxi_service: false,
                van_service: false,
            },
            status,
            created_at: Utc::now(),
        }
    }

    fn user(id: &str) -> Viewer {
        Viewer {
            user_id: id.into(),
            is_admin: false,
        }
    }

    fn admin(id: &str) -> Viewer {
        Viewer {
            user_id: id.into(),
            is_admin: true,
        }
    }

    #[test]
    fn message_events_are_scoped_to_their_users() {
        let created = LiveEvent::MessageCreated {
            message: message("a", "b"),
        };
        assert!(created.is_visible_to(&user("a")));
        assert!(created.is_visible_to(&user("b")));
        assert!(!created.is_visible_to(&user("c")));
        // 管理员也看不到别人的私信
        assert!(!created.is_visible_to(&admin("boss")));

        let unread = LiveEvent::UnreadChanged {
            user_id: "b".into(),
            conversation_id: Some("c1".into()),
            conversation_unread: 1,
            total_unread: 3,
        };
        assert!(unread.is_visible_to(&user("b")));
        assert!(!unread.is_visible_to(&user("a")));
    }

    #[test]
    fn pending_room_events_reach_only_owner_and_admins() {
        let created = LiveEvent::RoomCreated {
            room: room("owner", RoomStatus::Pending),
        };
        assert!(created.is_visible_to(&user("owner")));
        assert!(created.is_visible_to(&admin("boss")));
        assert!(!created.is_visible_to(&user("renter")));

        let rejected = LiveEvent::RoomDeleted {
            room_id: "r1".into(),
            owner_id: "owner".into(),
            status: RoomStatus::Pending,
        };
        assert!(rejected.is_visible_to(&admin("boss")));
        assert!(!rejected.is_visible_to(&user("renter")));
    }

    #[test]
    fn approved_room_events_reach_everyone() {
        let approved = LiveEvent::RoomUpdated {
            room: room("owner", RoomStatus::Approved),
        };
        assert!(approved.is_visible_to(&user("renter")));

        let deleted = LiveEvent::RoomDeleted {
            room_id: "r1".into(),
            owner_id: "owner".into(),
            status: RoomStatus::Approved,
        };
        assert!(deleted.is_visible_to(&user("renter")));
        assert!(deleted.is_visible_to(&user("owner")));
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let hub = LiveHub::new(8);
        hub.publish(LiveEvent::MessageCreated {
            message: message("a", "b"),
        });

        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(LiveEvent::MessageCreated {
            message: message("b", "a"),
        });

        match rx.recv().await.unwrap() {
            LiveEvent::MessageCreated { message } => assert_eq!(message.sender_id, "b"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = LiveEvent::RoomDeleted {
            room_id: "r1".into(),
            owner_id: "a".into(),
            status: RoomStatus::Approved,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "room_deleted");
        assert_eq!(value["status"], "approved");

        let event = LiveEvent::RoomCreated {
            room: room("a", RoomStatus::Pending),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "room_created");
        assert_eq!(value["room"]["status"], "pending");
        assert_eq!(value["room"]["name"], "Loft");
    }
}
