//! Runtime configuration, read from the environment (and `.env`).
//!
//! Every variable is optional. Missing values are logged and defaulted; a
//! value that is present but unparseable stops startup.

use crate::meditation::DEFAULT_TICK;
use crate::session::{AUTH_CHECK_TIMEOUT, FEATURE_GATE_TIMEOUT};
use crate::storage::DEFAULT_QUOTA_BYTES;
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_PATH: &str = "data/local-storage.json";
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3000";
pub const DEFAULT_QUOTE_FEED: &str =
    "https://api.quotable.io/quotes/random?tags=inspirational|wellness|health";
pub const DEFAULT_ADVICE_FEED: &str = "https://api.adviceslip.com/advice";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub api_base: String,
    pub login_url: String,
    pub auth_timeout: Duration,
    pub gate_timeout: Duration,
    pub store_quota: usize,
    pub quote_feed_url: String,
    pub advice_feed_url: String,
    pub meditation_tick: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base: String = try_load(&lookup, "ERAYA_API_BASE", DEFAULT_API_BASE.to_string())?;
        let api_base = api_base.trim_end_matches('/').to_string();
        let login_url = try_load(&lookup, "ERAYA_LOGIN_URL", format!("{api_base}/login.html"))?;

        Ok(Self {
            port: try_load(&lookup, "PORT", DEFAULT_PORT)?,
            data_path: try_load(&lookup, "APP_DATA_PATH", PathBuf::from(DEFAULT_DATA_PATH))?,
            login_url,
            auth_timeout: load_millis(&lookup, "AUTH_TIMEOUT_MS", AUTH_CHECK_TIMEOUT)?,
            gate_timeout: load_millis(&lookup, "GATE_TIMEOUT_MS", FEATURE_GATE_TIMEOUT)?,
            store_quota: try_load(&lookup, "STORE_QUOTA_BYTES", DEFAULT_QUOTA_BYTES)?,
            quote_feed_url: try_load(&lookup, "QUOTE_FEED_URL", DEFAULT_QUOTE_FEED.to_string())?,
            advice_feed_url: try_load(&lookup, "ADVICE_FEED_URL", DEFAULT_ADVICE_FEED.to_string())?,
            meditation_tick: load_millis(&lookup, "MEDITATION_TICK_MS", DEFAULT_TICK)?,
            api_base,
        })
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default:?}");
        return Ok(default);
    };
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: err.to_string(),
    })
}

fn load_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis: u64 = try_load(lookup, key, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: millis.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}
