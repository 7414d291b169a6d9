use postkeep_common::{
    model::auth::TokenIssuer,
    snowflake::{ProcessId, SnowflakePartOutOfRangeError, WorkerId},
    util::{NonPositiveDurationError, PositiveDuration},
};
use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    net::{IpAddr, SocketAddr},
};
use thiserror::Error;
use tracing::debug;

/// One year.
pub const MAX_TOKEN_LIFETIME_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("JWT_SECRET must not be empty")]
    EmptySecret,
    #[error("Invalid token lifetime: {0}")]
    TokenLifetime(#[from] NonPositiveDurationError),
    #[error("Token lifetime of {0} seconds is longer than a year")]
    TokenLifetimeTooLong(i64),
    #[error("Invalid snowflake node id: {0}")]
    NodeId(#[from] SnowflakePartOutOfRangeError),
}

/// Server settings, read from the environment (and a `.env` file if present).
#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct Config {
    pub server_address: IpAddr,
    pub server_port: u16,
    pub jwt_secret: String,
    /// Without a database everything is kept in memory.
    pub database_url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_access_token_lifetime_seconds")]
    pub access_token_lifetime_seconds: i64,
    #[serde(default = "default_refresh_token_lifetime_seconds")]
    pub refresh_token_lifetime_seconds: i64,
    #[serde(default)]
    pub worker_id: u8,
    #[serde(default)]
    pub process_id: u8,
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_access_token_lifetime_seconds() -> i64 {
    5 * 60
}

fn default_refresh_token_lifetime_seconds() -> i64 {
    24 * 60 * 60
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                debug!("No .env file found");
            } else {
                return Err(e.into());
            }
        }

        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        if config.jwt_secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        Ok(config)
    }

    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    pub fn token_issuer(&self) -> Result<TokenIssuer, ConfigError> {
        Ok(TokenIssuer::new(
            self.jwt_secret.as_bytes(),
            token_lifetime(self.access_token_lifetime_seconds)?,
            token_lifetime(self.refresh_token_lifetime_seconds)?,
        ))
    }

    pub fn node_ids(&self) -> Result<(WorkerId, ProcessId), ConfigError> {
        Ok((
            WorkerId::new(self.worker_id)?,
            ProcessId::new(self.process_id)?,
        ))
    }
}

fn token_lifetime(seconds: i64) -> Result<PositiveDuration, ConfigError> {
    if seconds > MAX_TOKEN_LIFETIME_SECONDS {
        return Err(ConfigError::TokenLifetimeTooLong(seconds));
    }

    Ok(PositiveDuration::from_seconds(seconds)?)
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("jwt_secret", &"[redacted]")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("database_max_connections", &self.database_max_connections)
            .field(
                "access_token_lifetime_seconds",
                &self.access_token_lifetime_seconds,
            )
            .field(
                "refresh_token_lifetime_seconds",
                &self.refresh_token_lifetime_seconds,
            )
            .field("worker_id", &self.worker_id)
            .field("process_id", &self.process_id)
            .finish()
    }
}
