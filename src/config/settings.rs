//! Process settings from the environment. `DATABASE_URL` is the base URI for tenants without an
//! explicit one.

use crate::connection::{CachePolicy, DriverTimeouts, RetryPolicy};
use crate::error::ConfigError;
use std::time::Duration;

pub const BASE_URI_VAR: &str = "DATABASE_URL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub base_uri: String,
    pub retry: RetryPolicy,
    pub cache: CachePolicy,
    pub driver: DriverTimeouts,
}

impl Settings {
    /// Defaults for everything but the base URI.
    pub fn with_base_uri(base_uri: impl Into<String>) -> Self {
        Settings {
            base_uri: base_uri.into(),
            retry: RetryPolicy::default(),
            cache: CachePolicy::default(),
            driver: DriverTimeouts::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_uri = lookup(BASE_URI_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSetting(BASE_URI_VAR))?;
        let mut settings = Settings::with_base_uri(base_uri);

        let retry = &mut settings.retry;
        if let Some(n) = parse::<u32>(&lookup, "TENANT_MAX_ATTEMPTS")? {
            if n == 0 {
                return Err(ConfigError::InvalidSetting {
                    name: "TENANT_MAX_ATTEMPTS",
                    value: n.to_string(),
                });
            }
            retry.max_attempts = n;
        }
        override_ms(&lookup, "TENANT_CONNECT_TIMEOUT_MS", &mut retry.connect_timeout)?;
        override_ms(&lookup, "TENANT_BACKOFF_BASE_MS", &mut retry.backoff_base)?;
        override_ms(&lookup, "TENANT_BACKOFF_MAX_MS", &mut retry.backoff_max)?;

        let cache = &mut settings.cache;
        if let Some(secs) = parse::<u64>(&lookup, "TENANT_FAST_PATH_SECS")? {
            cache.fast_path = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "TENANT_MAX_AGE_SECS")? {
            cache.max_age = Duration::from_secs(secs);
        }
        override_ms(&lookup, "TENANT_CLOSE_TIMEOUT_MS", &mut cache.close_timeout)?;

        let driver = &mut settings.driver;
        override_ms(&lookup, "TENANT_SERVER_SELECTION_TIMEOUT_MS", &mut driver.server_selection)?;
        override_ms(&lookup, "TENANT_HEARTBEAT_MS", &mut driver.heartbeat)?;
        override_ms(&lookup, "TENANT_SOCKET_TIMEOUT_MS", &mut driver.socket)?;

        Ok(settings)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting { name, value: raw }),
    }
}

fn override_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    slot: &mut Duration,
) -> Result<(), ConfigError> {
    if let Some(ms) = parse::<u64>(lookup, name)? {
        *slot = Duration::from_millis(ms);
    }
    Ok(())
}
