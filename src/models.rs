//! Application configuration, loaded once before the core goes live.

use crate::error::CoreError;

/// Process-wide configuration. Constructed at startup and passed to each
/// component explicitly; nothing in the core reads the environment after
/// this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// Token signing secret. Required; rotating it invalidates every
    /// previously issued token.
    pub jwt_secret: String,
    pub token_expiry_days: i64,
    pub bcrypt_cost: u32,
    pub pool_size: u32,
    pub pool_acquire_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./campus_erp.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // No fallback secret; a missing signing key is fatal.
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| {
            CoreError::Configuration("JWT_SECRET must be set before startup".to_string())
        })?;

        let token_expiry_days = std::env::var("TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .unwrap_or(7);

        let bcrypt_cost = std::env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST);

        let pool_size = std::env::var("DB_POOL_SIZE")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .unwrap_or(8);

        let pool_acquire_timeout_secs = std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        Ok(Self {
            database_path,
            port,
            jwt_secret,
            token_expiry_days,
            bcrypt_cost,
            pool_size,
            pool_acquire_timeout_secs,
        })
    }
}
