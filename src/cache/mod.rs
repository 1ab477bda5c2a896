// 缓存模块
// 只缓存公开的已审核房源列表（无过滤条件的那一份），redis 不可用时直接回源

use std::sync::Arc;
use std::time::Duration;

use redis::{AsyncCommands, Client as RedisClient};

use crate::store::Room;

const APPROVED_ROOMS_KEY: &str = "rooms:approved";

#[derive(Clone)]
pub struct RoomCache {
    redis: Option<Arc<RedisClient>>,
    expire: Duration,
}

impl RoomCache {
    pub fn new(redis: Option<Arc<RedisClient>>, expire: Duration) -> Self {
        Self { redis, expire }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub async fn get_approved(&self) -> Option<Vec<Room>> {
        let redis = self.redis.as_ref()?;
        let mut conn = redis.get_multiplexed_async_connection().await.ok()?;
        let cached: redis::RedisResult<Option<String>> = conn.get(APPROVED_ROOMS_KEY).await;

        match cached {
            Ok(Some(json_str)) => match serde_json::from_str::<Vec<Room>>(&json_str) {
                Ok(rooms) => {
                    tracing::debug!("Get approved rooms from cache: {}", APPROVED_ROOMS_KEY);
                    Some(rooms)
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable room cache entry: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Room cache read failed: {}", e);
                None
            }
        }
    }

    pub async fn put_approved(&self, rooms: &[Room]) {
        let Some(redis) = self.redis.as_ref() else {
            return;
        };
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(rooms) {
                let result: Result<(), redis::RedisError> = conn
                    .set_ex(APPROVED_ROOMS_KEY, json_str, self.expire.as_secs())
                    .await;
                match result {
                    Ok(()) => {
                        tracing::debug!("Set approved rooms to cache: {}", APPROVED_ROOMS_KEY)
                    }
                    Err(e) => tracing::warn!("Room cache write failed: {}", e),
                }
            }
        }
    }

    /// 审核、修改、删除房源后调用
    pub async fn invalidate(&self) {
        let Some(redis) = self.redis.as_ref() else {
            return;
        };
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let result: Result<(), redis::RedisError> = conn.del(APPROVED_ROOMS_KEY).await;
            if let Err(e) = result {
                tracing::warn!("Room cache invalidation failed: {}", e);
            }
        }
    }
}
