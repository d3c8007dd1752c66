use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::sync::SessionConfig;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::{apply_security_headers, SecurityHeaders};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_RENDER_GATE_MS: u64 = 1000;

pub struct Config {
    /// Postgres store when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub session_token: Option<String>,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(&lookup, "SYNC_BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3001)));
        let gate_ms = parse_or(&lookup, "SYNC_RENDER_GATE_MS", Some(DEFAULT_RENDER_GATE_MS))
            .unwrap_or(DEFAULT_RENDER_GATE_MS);
        let offset_minutes: i32 =
            parse_or(&lookup, "SYNC_UTC_OFFSET_MINUTES", Some(0)).unwrap_or(0);
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| {
            tracing::warn!(offset_minutes, "Config: UTC offset out of range, using UTC");
            SessionConfig::default().utc_offset
        });

        Self {
            database_url: non_empty("DATABASE_URL"),
            bind_addr,
            session_token: non_empty("SYNC_SESSION_TOKEN"),
            session: SessionConfig {
                render_gate_delay: Duration::from_millis(gate_ms),
                utc_offset,
                ..SessionConfig::default()
            },
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Option<T>,
) -> Option<T> {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Config: Invalid value '{}' for {}, using default", raw, key);
                default
            }
        },
        None => default,
    }
}
