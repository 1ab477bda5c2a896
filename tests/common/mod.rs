#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use roomshare::{
    AppState,
    cache::RoomCache,
    config::Config,
    routes,
    store::{MemoryStore, Store, UserRecord},
    utils::generate_token,
};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::for_tests();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config.clone(), RoomCache::disabled());
        Self {
            router: routes::router(state),
            store,
            config,
        }
    }

    pub async fn seed_user(&self, user_id: &str, display_name: &str, role: &str) -> String {
        let now = Utc::now();
        self.store
            .insert_user(&UserRecord {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                email: None,
                photo_url: None,
                role: role.to_string(),
                phone_number: None,
                line_id: None,
                messenger_name: None,
                profile_picture_url: None,
                password_hash: String::new(),
                created_at: now,
                last_active: now,
            })
            .await
            .expect("seed user");
        generate_token(user_id, &self.config).expect("token").0
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}
