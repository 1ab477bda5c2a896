use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use roomshare::{
    AppState,
    cache::RoomCache,
    config::Config,
    middleware::{RateLimiter, rate_limit},
    routes,
    store::{MemoryStore, PgStore, Store},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect_store(config: &Config) -> Arc<dyn Store> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
        return Arc::new(MemoryStore::new());
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'roomshare';").await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = PgStore::new(pool);
    store.migrate().await.expect("Failed to run migrations");
    Arc::new(store)
}

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    let store = connect_store(&config).await;

    let redis_client = config.redis_url.as_deref().map(|url| {
        Arc::new(redis::Client::open(url).expect("Failed to create Redis client"))
    });
    let cache = RoomCache::new(redis_client.clone(), config.room_cache_expire());

    let state = AppState::new(store, config.clone(), cache);
    let router = routes::router(state);

    // 限流依赖 redis，未配置时跳过
    let router = match redis_client {
        Some(redis) => {
            let rate_limiter = Arc::new(RateLimiter::new(redis, config.clone()));
            router.layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit))
        }
        None => {
            tracing::warn!("REDIS_URL not set, rate limiting and room cache disabled");
            router
        }
    };

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding permissive CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
