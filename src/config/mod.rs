use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// 为空时使用内存存储
    pub database_url: Option<String>,
    /// 为空时关闭限流和房源缓存
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub room_cache_expire_secs: u64,
    pub live_channel_capacity: usize,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    optional(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = optional("JWT_EXPIRATION")
            .and_then(|v| v.trim_end_matches('h').parse::<u64>().ok())
            .unwrap_or(24);

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: parse_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: parse_or("RATE_LIMIT_REQUESTS", 100),
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "::".to_string()),
            server_port: parse_or("SERVER_PORT", 3000),
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api".to_string()),
            room_cache_expire_secs: parse_or("ROOM_CACHE_EXPIRE", 300),
            live_channel_capacity: parse_or("LIVE_CHANNEL_CAPACITY", 256),
        })
    }

    /// 测试用配置：内存存储、无 redis
    pub fn for_tests() -> Self {
        Config {
            database_url: None,
            redis_url: None,
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            api_base_uri: "/api".to_string(),
            room_cache_expire_secs: 300,
            live_channel_capacity: 64,
        }
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn room_cache_expire(&self) -> Duration {
        Duration::from_secs(self.room_cache_expire_secs)
    }
}
