//! Server configuration, with defaults and environment overrides.
//!
//! | Variable                  | Default          |
//! |---------------------------|------------------|
//! | `COVEY_BIND`              | `127.0.0.1:8081` |
//! | `COVEY_IDLE_TIMEOUT_SECS` | `15`             |
//! | `COVEY_MAX_OCCUPANCY`     | `50`             |
//! | `COVEY_ENFORCE_CAPACITY`  | `false`          |
//! | `COVEY_STRICT_SPRITES`    | `false`          |

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use covey_town::{SpriteEnforcement, TownsConfig};

pub const DEFAULT_BIND: &str = "127.0.0.1:8081";

/// A connection that sends nothing for this long is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// A malformed configuration value.
#[derive(Debug, thiserror::Error)]
#[error("{var}: invalid value {value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub idle_timeout: Duration,
    pub towns: TownsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            towns: TownsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `COVEY_*` environment variables.
    ///
    /// # Errors
    /// [`ConfigError`] naming the first variable that fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("COVEY_BIND") {
            if bind.trim().is_empty() {
                return Err(invalid("COVEY_BIND", bind, "must not be empty"));
            }
            config.bind_addr = bind;
        }
        if let Some(raw) = lookup("COVEY_IDLE_TIMEOUT_SECS") {
            let secs: u64 = parse("COVEY_IDLE_TIMEOUT_SECS", raw)?;
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("COVEY_MAX_OCCUPANCY") {
            config.towns.max_occupancy = parse("COVEY_MAX_OCCUPANCY", raw)?;
        }
        if let Some(raw) = lookup("COVEY_ENFORCE_CAPACITY") {
            config.towns.enforce_capacity = parse_flag("COVEY_ENFORCE_CAPACITY", raw)?;
        }
        if let Some(raw) = lookup("COVEY_STRICT_SPRITES") {
            config.towns.sprite_enforcement = if parse_flag("COVEY_STRICT_SPRITES", raw)? {
                SpriteEnforcement::Strict
            } else {
                SpriteEnforcement::Advisory
            };
        }

        Ok(config)
    }
}

fn invalid(var: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError {
        var,
        value,
        reason: reason.into(),
    }
}

fn parse<T>(var: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.trim().parse() {
        Ok(value) => Ok(value),
        Err(e) => {
            let reason = e.to_string();
            Err(invalid(var, raw, reason))
        }
    }
}

fn parse_flag(var: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected true or false")),
    }
}
