use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, Map};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use url::Url;

use crate::Result;
use crate::auth::Credentials;
use crate::error::Configuration;
use crate::rest::{DEFAULT_RECV_WINDOW, RetryPolicy};
use crate::validation;

pub const DEFAULT_BASE_URL: &str = "https://testnet.binancefuture.com";

/// Settings as read from the sources, before checks.
#[derive(Debug, Deserialize)]
struct RawSettings {
    api_key: Option<String>,
    api_secret: Option<SecretString>,
    base_url: String,
    default_leverage: Option<u32>,
    recv_window: u64,
    request_timeout_secs: u64,
    max_attempts: u32,
    log_dir: PathBuf,
    log_file: String,
    log_max_bytes: u64,
    log_backups: usize,
}

/// Everything the client needs, resolved once at startup.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct Settings {
    pub credentials: Credentials,
    pub base_url: Url,
    pub default_leverage: Option<u32>,
    pub recv_window: u64,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub log: LogSettings,
}

#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub file_name: String,
    pub max_bytes: u64,
    pub backups: usize,
}

impl LogSettings {
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "trading_bot.log".to_owned(),
            max_bytes: 5 * 1024 * 1024,
            backups: 5,
        }
    }
}

impl Settings {
    /// Reads defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_sources(file, None)
    }

    /// Like [`Settings::load`], reading variables from `env` instead of the
    /// process environment when it is `Some`.
    pub fn from_sources(file: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let log = LogSettings::default();
        let mut builder = config::Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("recv_window", i64::try_from(DEFAULT_RECV_WINDOW).unwrap_or(5000))?
            .set_default("request_timeout_secs", 30_i64)?
            .set_default("max_attempts", i64::from(RetryPolicy::DEFAULT_MAX_ATTEMPTS))?
            .set_default("log_dir", log.dir.to_string_lossy().into_owned())?
            .set_default("log_file", log.file_name)?
            .set_default("log_max_bytes", 5_i64 * 1024 * 1024)?
            .set_default("log_backups", 5_i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let raw: RawSettings = builder
            .add_source(Environment::default().source(env))
            .build()?
            .try_deserialize()?;

        Self::resolve(raw)
    }

    fn resolve(raw: RawSettings) -> Result<Self> {
        let api_key = raw
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(Configuration::Missing("API_KEY"))?;
        let api_secret = raw
            .api_secret
            .filter(|secret| !secret.expose_secret().trim().is_empty())
            .ok_or(Configuration::Missing("API_SECRET"))?;

        let base_url = Url::parse(&raw.base_url).map_err(|e| Configuration::Invalid {
            key: "BASE_URL",
            reason: e.to_string(),
        })?;

        let default_leverage = raw
            .default_leverage
            .map(validation::validate_leverage)
            .transpose()
            .map_err(|e| Configuration::Invalid {
                key: "DEFAULT_LEVERAGE",
                reason: e.to_string(),
            })?;

        if raw.max_attempts == 0 {
            return Err(Configuration::Invalid {
                key: "MAX_ATTEMPTS",
                reason: "at least one attempt is required".to_owned(),
            }
            .into());
        }

        Ok(Self {
            credentials: Credentials::new(api_key.trim(), api_secret),
            base_url,
            default_leverage,
            recv_window: raw.recv_window,
            request_timeout: Duration::from_secs(raw.request_timeout_secs),
            max_attempts: raw.max_attempts,
            log: LogSettings {
                dir: raw.log_dir,
                file_name: raw.log_file,
                max_bytes: raw.log_max_bytes,
                backups: raw.log_backups,
            },
        })
    }
}
