//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TOKEN_TTL_HOURS: u64 = 24;
const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the SQLite database (`FOODGRAM_DATA_DIR`)
    pub data_dir: PathBuf,
    /// Listen address (`FOODGRAM_BIND_ADDR`)
    pub bind_addr: SocketAddr,
    /// Externally visible base URL used in short links (`FOODGRAM_PUBLIC_URL`)
    pub public_url: String,
    /// Lifetime of issued auth tokens (`FOODGRAM_TOKEN_TTL_HOURS`)
    pub token_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let bind_addr: SocketAddr = ([127, 0, 0, 1], 8080).into();
        Self {
            data_dir: std::env::temp_dir().join("foodgram"),
            bind_addr,
            public_url: format!("http://{}", bind_addr),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_HOURS * 60 * 60),
        }
    }
}

impl ServerConfig {
    /// Read the configuration, falling back to defaults for unset or
    /// unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let data_dir = lookup("FOODGRAM_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let bind_addr = match lookup("FOODGRAM_BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "Ignoring FOODGRAM_BIND_ADDR={:?} ({}), using {}",
                    raw,
                    e,
                    DEFAULT_BIND_ADDR
                );
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        let public_url = lookup("FOODGRAM_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}", bind_addr));

        let token_ttl = match lookup("FOODGRAM_TOKEN_TTL_HOURS") {
            Some(raw) => match raw
                .parse::<u64>()
                .ok()
                .filter(|hours| (1..=MAX_TOKEN_TTL_HOURS).contains(hours))
                .and_then(|hours| hours.checked_mul(60 * 60))
            {
                Some(secs) => Duration::from_secs(secs),
                None => {
                    tracing::warn!(
                        "Ignoring FOODGRAM_TOKEN_TTL_HOURS={:?} (expected 1..={}), using {}",
                        raw,
                        MAX_TOKEN_TTL_HOURS,
                        DEFAULT_TOKEN_TTL_HOURS
                    );
                    defaults.token_ttl
                }
            },
            None => defaults.token_ttl,
        };

        Self {
            data_dir,
            bind_addr,
            public_url,
            token_ttl,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("foodgram.db")
    }
}
