use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_ttl_hours = env::var("JWT_TTL_HOURS")
            .ok()
            .and_then(|h| h.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(24);
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(10);
        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret,
            jwt_ttl_hours,
            db_max_connections,
        })
    }
}
