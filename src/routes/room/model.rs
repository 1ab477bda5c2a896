use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::cache::RoomCache;
use crate::error::{AppError, AppResult};
use crate::live::{LiveEvent, LiveHub};
use crate::store::{Room, RoomDetails, RoomQuery, RoomStatus, Store, UserRecord};

/// 房源表单，创建和修改共用
#[derive(Debug, Clone, Deserialize)]
pub struct RoomForm {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub deposit: Option<f64>,
    pub location: String,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub room_number: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
    pub description: String,
    pub image_url: String,
    #[serde(default)]
    pub location_map: Option<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub electric: Option<String>,
    #[serde(default)]
    pub facilities: Vec<String>,
    #[serde(default)]
    pub taxi_service: bool,
    #[serde(default)]
    pub van_service: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    pub room_id: String,
    #[serde(flatten)]
    pub form: RoomForm,
}

#[derive(Debug, Deserialize)]
pub struct RoomIdRequest {
    pub room_id: String,
}

/// 公开列表支持的过滤条件
#[derive(Debug, Default, Deserialize)]
pub struct ListingFilter {
    pub location: Option<String>,
    pub room_type: Option<String>,
    pub building: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl TryFrom<ListingFilter> for RoomQuery {
    type Error = AppError;

    fn try_from(filter: ListingFilter) -> AppResult<Self> {
        Ok(RoomQuery {
            status: Some(RoomStatus::Approved),
            owner_id: None,
            location: non_blank(filter.location),
            room_type: non_blank(filter.room_type),
            building: non_blank(filter.building),
            min_price: filter.min_price.map(|p| price_bound("min_price", p)).transpose()?,
            max_price: filter.max_price.map(|p| price_bound("max_price", p)).transpose()?,
        })
    }
}

// NaN 在内存比较和 SQL 比较中的语义不同，直接拒绝
fn price_bound(field: &str, value: f64) -> AppResult<f64> {
    if !value.is_finite() {
        return Err(AppError::Validation(format!("{} must be a finite number", field)));
    }
    Ok(value)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &str, value: String) -> AppResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value)
}

fn amount(field: &str, value: f64) -> AppResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!(
            "{} must be a non-negative number",
            field
        )));
    }
    Ok(value)
}

impl RoomForm {
    pub fn into_details(self) -> AppResult<RoomDetails> {
        let mut facilities: Vec<String> = Vec::with_capacity(self.facilities.len());
        for facility in self.facilities {
            let facility = facility.trim().to_string();
            if !facility.is_empty() && !facilities.contains(&facility) {
                facilities.push(facility);
            }
        }

        Ok(RoomDetails {
            name: required("name", self.name)?,
            price: amount("price", self.price)?,
            deposit: self.deposit.map(|d| amount("deposit", d)).transpose()?,
            location: required("location", self.location)?,
            building: non_blank(self.building),
            floor: non_blank(self.floor),
            room_number: non_blank(self.room_number),
            room_type: non_blank(self.room_type),
            description: required("description", self.description)?,
            image_url: required("image_url", self.image_url)?,
            location_map: non_blank(self.location_map),
            contract: non_blank(self.contract),
            electric: non_blank(self.electric),
            facilities,
            taxi_service: self.taxi_service,
            van_service: self.van_service,
        })
    }
}

// 房东本人或管理员才能修改、删除
fn ensure_can_manage(actor: &UserRecord, room: &Room) -> AppResult<()> {
    if actor.user_id == room.owner_id || actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the owner or an admin can change this room".to_string(),
        ))
    }
}

impl Room {
    /// 新房源一律为 pending，等待管理员审核
    pub async fn create(
        store: &dyn Store,
        live: &LiveHub,
        owner: &UserRecord,
        form: RoomForm,
    ) -> AppResult<Self> {
        let room = Room {
            room_id: Uuid::new_v4().to_string(),
            owner_id: owner.user_id.clone(),
            owner_name: owner.display_name.clone(),
            details: form.into_details()?,
            status: RoomStatus::Pending,
            created_at: Utc::now(),
        };
        store.insert_room(&room).await?;
        live.publish(LiveEvent::RoomCreated { room: room.clone() });
        tracing::info!("Room {} created by {}", room.room_id, owner.user_id);
        Ok(room)
    }

    pub async fn require(store: &dyn Store, room_id: &str) -> AppResult<Self> {
        store
            .find_room(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Room not found".to_string()))
    }

    pub async fn approved_listing(
        store: &dyn Store,
        cache: &RoomCache,
        filter: ListingFilter,
    ) -> AppResult<Vec<Self>> {
        let query = RoomQuery::try_from(filter)?;
        // 只有无过滤条件的列表走缓存
        if !query.is_unfiltered() {
            return Ok(store.query_rooms(&query).await?);
        }
        if let Some(rooms) = cache.get_approved().await {
            return Ok(rooms);
        }
        let rooms = store.query_rooms(&query).await?;
        cache.put_approved(&rooms).await;
        Ok(rooms)
    }

    pub async fn owned_by(store: &dyn Store, owner_id: &str) -> AppResult<Vec<Self>> {
        Ok(store.query_rooms(&RoomQuery::with_owner(owner_id)).await?)
    }

    pub async fn edit(
        store: &dyn Store,
        cache: &RoomCache,
        live: &LiveHub,
        actor: &UserRecord,
        room_id: &str,
        form: RoomForm,
    ) -> AppResult<Self> {
        let room = Self::require(store, room_id).await?;
        ensure_can_manage(actor, &room)?;

        let details = form.into_details()?;
        let updated = store.update_room(room_id, &details).await?;
        if updated.status == RoomStatus::Approved {
            cache.invalidate().await;
        }
        live.publish(LiveEvent::RoomUpdated {
            room: updated.clone(),
        });
        Ok(updated)
    }

    pub async fn remove(
        store: &dyn Store,
        cache: &RoomCache,
        live: &LiveHub,
        actor: &UserRecord,
        room_id: &str,
    ) -> AppResult<()> {
        let room = Self::require(store, room_id).await?;
        ensure_can_manage(actor, &room)?;

        store.delete_room(room_id).await?;
        if room.status == RoomStatus::Approved {
            cache.invalidate().await;
        }
        live.publish(LiveEvent::RoomDeleted {
            room_id: room.room_id,
            owner_id: room.owner_id,
            status: room.status,
        });
        tracing::info!("Room {} deleted by {}", room_id, actor.user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> RoomForm {
        RoomForm {
            name: " Sunny studio ".to_string(),
            price: 6500.0,
            deposit: Some(13000.0),
            location: "Ladprao".to_string(),
            building: Some("".to_string()),
            floor: Some("7".to_string()),
            room_number: None,
            room_type: Some("studio".to_string()),
            description: "Near BTS".to_string(),
            image_url: "https://img.example/1.jpg".to_string(),
            location_map: None,
            contract: Some("1 year".to_string()),
            electric: None,
            facilities: vec!["wifi".into(), " wifi ".into(), "".into(), "aircon".into()],
            taxi_service: true,
            van_service: false,
        }
    }

    #[test]
    fn form_is_normalised() {
        let details = form().into_details().unwrap();
        assert_eq!(details.name, "Sunny studio");
        assert_eq!(details.building, None);
        assert_eq!(details.floor.as_deref(), Some("7"));
        assert_eq!(details.facilities, vec!["wifi".to_string(), "aircon".to_string()]);
    }

    #[test]
    fn form_rejects_missing_fields_and_bad_amounts() {
        let mut blank_name = form();
        blank_name.name = "   ".to_string();
        assert!(matches!(blank_name.into_details(), Err(AppError::Validation(_))));

        let mut no_image = form();
        no_image.image_url = String::new();
        assert!(no_image.into_details().is_err());

        let mut negative = form();
        negative.price = -1.0;
        assert!(negative.into_details().is_err());

        let mut nan_deposit = form();
        nan_deposit.deposit = Some(f64::NAN);
        assert!(nan_deposit.into_details().is_err());
    }

    #[test]
    fn listing_filter_always_targets_approved_rooms() {
        let query = RoomQuery::try_from(ListingFilter {
            location: Some("  ".to_string()),
            ..ListingFilter::default()
        })
        .unwrap();
        assert_eq!(query.status, Some(RoomStatus::Approved));
        assert!(query.is_unfiltered());
    }

    #[test]
    fn listing_filter_rejects_non_finite_price_bounds() {
        for bound in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let min = RoomQuery::try_from(ListingFilter {
                min_price: Some(bound),
                ..ListingFilter::default()
            });
            assert!(matches!(min, Err(AppError::Validation(_))));

            let max = RoomQuery::try_from(ListingFilter {
                max_price: Some(bound),
                ..ListingFilter::default()
            });
            assert!(matches!(max, Err(AppError::Validation(_))));
        }

        let query = RoomQuery::try_from(ListingFilter {
            min_price: Some(1000.0),
            max_price: Some(8000.0),
            ..ListingFilter::default()
        })
        .unwrap();
        assert_eq!(query.min_price, Some(1000.0));
        assert!(!query.is_unfiltered());
    }
}
