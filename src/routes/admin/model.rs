use crate::cache::RoomCache;
use crate::error::{AppError, AppResult};
use crate::live::{LiveEvent, LiveHub};
use crate::store::{Room, RoomQuery, RoomStatus, Store};

// 审核流程：pending -> approved 是唯一的状态迁移，拒绝等于删除 pending 房源
impl Room {
    pub async fn pending(store: &dyn Store) -> AppResult<Vec<Self>> {
        Ok(store
            .query_rooms(&RoomQuery::with_status(RoomStatus::Pending))
            .await?)
    }

    pub async fn approve(
        store: &dyn Store,
        cache: &RoomCache,
        live: &LiveHub,
        room_id: &str,
    ) -> AppResult<Self> {
        let room = Self::require(store, room_id).await?;
        if room.status != RoomStatus::Pending {
            return Err(AppError::Conflict("Room is already approved".to_string()));
        }

        let room = store.set_room_status(room_id, RoomStatus::Approved).await?;
        cache.invalidate().await;
        live.publish(LiveEvent::RoomUpdated { room: room.clone() });
        tracing::info!("Room {} approved", room_id);
        Ok(room)
    }

    pub async fn reject(store: &dyn Store, live: &LiveHub, room_id: &str) -> AppResult<()> {
        let room = Self::require(store, room_id).await?;
        if room.status != RoomStatus::Pending {
            return Err(AppError::Conflict(
                "Only pending rooms can be rejected".to_string(),
            ));
        }
        store.delete_room(room_id).await?;
        live.publish(LiveEvent::RoomDeleted {
            room_id: room.room_id,
            owner_id: room.owner_id,
            status: room.status,
        });
        tracing::info!("Room {} rejected", room_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::Viewer;
    use crate::routes::room::RoomForm;
    use crate::store::{DEFAULT_ROLE, MemoryStore, UserRecord};
    use chrono::Utc;

    fn owner() -> UserRecord {
        let now = Utc::now();
        UserRecord {
            user_id: "owner".to_string(),
            display_name: "Owner".to_string(),
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

    fn form(name: &str) -> RoomForm {
        RoomForm {
            name: name.to_string(),
            price: 4500.0,
            deposit: None,
            location: "Huai Khwang".to_string(),
            building: None,
            floor: None,
            room_number: None,
            room_type: None,
            description: "Quiet street".to_string(),
            image_url: "https://img.example/h.jpg".to_string(),
            location_map: None,
            contract: None,
            electric: None,
            facilities: Vec::new(),
            taxi_service: false,
            van_service: false,
        }
    }

    fn viewer(id: &str, is_admin: bool) -> Viewer {
        Viewer {
            user_id: id.to_string(),
            is_admin,
        }
    }

    #[tokio::test]
    async fn room_lifecycle_is_published_to_the_right_viewers() {
        let store = MemoryStore::new();
        let cache = RoomCache::disabled();
        let live = LiveHub::new(16);
        let mut rx = live.subscribe();
        let owner = owner();
        let renter = viewer("renter", false);
        let admin = viewer("boss", true);

        let room = Room::create(&store, &live, &owner, form("Corner room"))
            .await
            .unwrap();
        let created = rx.recv().await.unwrap();
        assert!(matches!(created, LiveEvent::RoomCreated { .. }));
        assert!(created.is_visible_to(&admin));
        assert!(created.is_visible_to(&viewer("owner", false)));
        assert!(!created.is_visible_to(&renter));

        Room::approve(&store, &cache, &live, &room.room_id)
            .await
            .unwrap();
        let approved = rx.recv().await.unwrap();
        match &approved {
            LiveEvent::RoomUpdated { room } => assert_eq!(room.status, RoomStatus::Approved),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(approved.is_visible_to(&renter));

        Room::remove(&store, &cache, &live, &owner, &room.room_id)
            .await
            .unwrap();
        let deleted = rx.recv().await.unwrap();
        match &deleted {
            LiveEvent::RoomDeleted { room_id, .. } => assert_eq!(room_id, &room.room_id),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(deleted.is_visible_to(&renter));
    }

    #[tokio::test]
    async fn rejecting_publishes_a_deletion_for_the_pending_room() {
        let store = MemoryStore::new();
        let live = LiveHub::new(16);
        let owner = owner();

        let room = Room::create(&store, &live, &owner, form("Box room"))
            .await
            .unwrap();
        let mut rx = live.subscribe();
        Room::reject(&store, &live, &room.room_id).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            LiveEvent::RoomDeleted {
                status: RoomStatus::Pending,
                ..
            }
        ));
        assert!(event.is_visible_to(&viewer("boss", true)));
        assert!(!event.is_visible_to(&viewer("renter", false)));
        assert!(store.find_room(&room.room_id).await.unwrap().is_none());
        assert!(matches!(
            Room::reject(&store, &live, &room.room_id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
