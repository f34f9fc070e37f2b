use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::services::LedgerConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub ledger: LedgerConfig,
    /// Semester label stamped on new registrations.
    pub semester: String,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://registrar.db?mode=rwc".to_string());
        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?;
        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        let max_retries = parse_or(&lookup, "COMMIT_MAX_RETRIES", 3)?;
        let backoff_ms = parse_or(&lookup, "COMMIT_RETRY_BACKOFF_MS", 50u64)?;
        let semester = lookup("REGISTRATION_SEMESTER").unwrap_or_else(|| "First".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            max_connections,
            ledger: LedgerConfig {
                max_retries,
                retry_backoff: Duration::from_millis(backoff_ms),
            },
            semester,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::BadRequest(format!("{} has an invalid value: {}", key, raw))),
    }
}
