use std::sync::Arc;

use cache::RoomCache;
use config::Config;
use live::LiveHub;
use store::Store;

pub mod cache;
pub mod config;
pub mod error;
pub mod live;
pub mod middleware;
pub mod store;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub cache: RoomCache,
    pub live: LiveHub,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config, cache: RoomCache) -> Self {
        let live = LiveHub::new(config.live_channel_capacity);
        Self {
            store,
            config,
            cache,
            live,
        }
    }
}
