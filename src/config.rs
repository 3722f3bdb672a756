//! Process configuration, read from environment variables.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::admission::{PolicyConfig, PolicyMode};
use crate::logging::{LogConfig, LogLevel};
use crate::matches::DatabaseConfig;
use crate::realtime::HeartbeatConfig;

#[derive(Debug)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid {
                name,
                value,
                reason,
            } => write!(f, "invalid {}={:?}: {}", name, value, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    /// `None` keeps everything in memory
    pub database: Option<DatabaseConfig>,
    pub policy: PolicyConfig,
    pub heartbeat: HeartbeatConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            database: None,
            policy: PolicyConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(host) = var("HOST") {
            config.host = parse("HOST", host)?;
        }
        if let Some(port) = var("PORT") {
            config.port = parse("PORT", port)?;
        }

        if let Some(url) = var("DATABASE_URL") {
            let mut database = DatabaseConfig::default_postgres(&url);
            if let Some(max) = var("DATABASE_MAX_CONNECTIONS") {
                database = database.with_max_connections(parse("DATABASE_MAX_CONNECTIONS", max)?);
            }
            config.database = Some(database);
        }

        if let Some(key) = var("POLICY_KEY") {
            config.policy = config.policy.with_key(key);
        }
        if let Some(mode) = var("POLICY_MODE") {
            config.policy = config
                .policy
                .with_mode(parse::<PolicyMode>("POLICY_MODE", mode)?);
        }
        if let Some(url) = var("POLICY_URL") {
            config.policy = config.policy.with_url(url);
        }
        if let Some(ms) = var("POLICY_TIMEOUT_MS") {
            let ms: u64 = parse("POLICY_TIMEOUT_MS", ms)?;
            config.policy = config.policy.with_timeout(Duration::from_millis(ms));
        }

        if let Some(flag) = var("TRUST_PROXY") {
            config.policy = config
                .policy
                .with_trust_forwarded(parse_flag("TRUST_PROXY", flag)?);
        }

        if let Some(secs) = var("HEARTBEAT_INTERVAL_SECS") {
            let secs: u64 = parse("HEARTBEAT_INTERVAL_SECS", secs)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    name: "HEARTBEAT_INTERVAL_SECS",
                    value: secs.to_string(),
                    reason: "must be positive".into(),
                });
            }
            config.heartbeat = config
                .heartbeat
                .with_interval(Duration::from_secs(secs));
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.log = config.log.with_level(LogLevel::parse(&level));
        }

        Ok(config)
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.host = addr.ip();
        self.port = addr.port();
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

fn parse_flag(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            reason: "expected a boolean".into(),
        }),
    }
}
