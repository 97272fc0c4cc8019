use std::fmt;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 8;
/// SLA applied when an execution runs on the default catalog.
pub const DEFAULT_SLA_MINUTES: u32 = 10;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
            ConfigError::Invalid { key, value } => write!(f, "{key} has invalid value '{value}'"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Engine policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub default_sla_minutes: u32,
    /// When set, photo-required steps must carry an evidence reference before closure.
    pub enforce_photo_evidence: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            default_sla_minutes: DEFAULT_SLA_MINUTES,
            enforce_photo_evidence: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Read configuration from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {e}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let default_sla_minutes = parse_or(&lookup, "DEFAULT_SLA_MINUTES", DEFAULT_SLA_MINUTES)?;
        if default_sla_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_SLA_MINUTES",
                value: "0".to_string(),
            });
        }
        let enforce_photo_evidence = parse_or(&lookup, "ENFORCE_PHOTO_EVIDENCE", false)?;

        Ok(Config {
            database_url,
            bind_addr,
            max_connections,
            protocol: ProtocolConfig {
                default_sla_minutes,
                enforce_photo_evidence,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
