//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Tiled JSON map the collision index is built from
    pub map_path: PathBuf,
    /// Maximum number of enemies alive at once
    pub enemy_cap: usize,
    /// Time between spawner passes
    pub spawn_interval: Duration,
    /// Seed for spawn placement; random when unset
    pub seed: Option<u64>,

    /// Supabase project URL. When unset players are kept in memory only.
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Allowed client origins for CORS, comma separated. Permissive when unset.
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let supabase_url = optional("SUPABASE_URL");
        let supabase_service_role_key = optional("SUPABASE_SERVICE_ROLE_KEY");
        if supabase_url.is_some() && supabase_service_role_key.is_none() {
            return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            map_path: env::var("MAP_PATH")
                .unwrap_or_else(|_| "assets/map.json".to_string())
                .into(),
            enemy_cap: parse_or("ENEMY_CAP", 10)?,
            spawn_interval: Duration::from_millis(parse_or("SPAWN_INTERVAL_MS", 2000)?),
            seed: optional("SEED")
                .map(|s| s.parse().map_err(|_| ConfigError::Invalid("SEED")))
                .transpose()?,

            supabase_url,
            supabase_service_role_key,

            client_origin: optional("CLIENT_ORIGIN"),
        })
    }
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
