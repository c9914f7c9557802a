//! Application settings for the billing sync.
//!
//! Credentials and connection strings come from the environment (a `.env`
//! file is loaded first by the binary). Sync tunables come from an optional
//! TOML file with a `[sync]` table; every key has a default, so the file may
//! be absent altogether.

use crate::errors::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default base URL of the billing API
pub const DEFAULT_API_BASE_URL: &str = "https://api.selectel.ru";

/// Local `SQLite` database used when nothing else is configured
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/billing.sqlite?mode=rwc";

/// Longest accepted incremental lookback, one leap year in hours
pub const MAX_LOOKBACK_HOURS: i64 = 366 * 24;

/// Tunables of the synchronization engine, read from the `[sync]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Records requested per transactions page
    pub page_size: u32,
    /// Balance buckets the transactions request is filtered to
    pub transaction_balances: Vec<String>,
    /// Lookback of an incremental transactions window, in hours
    pub lookback_hours: i64,
    /// Full-sync ranges longer than this many days are split by calendar month
    pub chunk_threshold_days: i64,
    /// Locale requested for project reports
    pub report_locale: String,
    /// Timeout of a single API request, in seconds
    pub request_timeout_secs: u64,
    /// Upper bound on transactions pages fetched for one window
    pub max_pages: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 500,
            transaction_balances: vec![
                "main".to_string(),
                "vk_rub".to_string(),
                "bonus".to_string(),
            ],
            lookback_hours: 2,
            chunk_threshold_days: 30,
            report_locale: "ru".to_string(),
            request_timeout_secs: 30,
            max_pages: 1000,
        }
    }
}

impl SyncSettings {
    /// Rejects values the planner and fetcher cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(config_error("sync.page_size must be greater than zero"));
        }
        if self.lookback_hours <= 0 || self.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(Error::Config {
                message: format!(
                    "sync.lookback_hours must be between 1 and {MAX_LOOKBACK_HOURS}"
                ),
            });
        }
        if self.chunk_threshold_days < 0 {
            return Err(config_error("sync.chunk_threshold_days must not be negative"));
        }
        if self.transaction_balances.is_empty() {
            return Err(config_error(
                "sync.transaction_balances must name at least one balance",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(config_error(
                "sync.request_timeout_secs must be greater than zero",
            ));
        }
        if self.max_pages == 0 {
            return Err(config_error("sync.max_pages must be greater than zero"));
        }
        Ok(())
    }

    /// Timeout of a single API request
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    sync: SyncSettings,
}

/// Parses sync settings from TOML text and validates them.
pub fn parse_sync_settings(contents: &str) -> Result<SyncSettings> {
    let file: SettingsFile = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse sync settings: {e}"),
    })?;
    file.sync.validate()?;
    Ok(file.sync)
}

/// Loads sync settings from a TOML file.
pub fn load_sync_settings<P: AsRef<Path>>(path: P) -> Result<SyncSettings> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading sync settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {}: {e}", path_ref.display()),
    })?;
    parse_sync_settings(&contents)
}

/// Connection details of the remote billing API.
#[derive(Debug)]
pub struct ApiConfig {
    /// Static token sent with every request
    pub token: SecretString,
    /// Base URL, without a trailing slash
    pub base_url: String,
}

/// Everything the process needs, built once at startup.
#[derive(Debug)]
pub struct AppConfig {
    /// Remote billing API
    pub api: ApiConfig,
    /// SeaORM connection string
    pub database_url: String,
    /// Time between two scheduled runs
    pub interval: Duration,
    /// Engine tunables
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Builds the configuration from process environment variables.
    ///
    /// `settings_path` overrides `SYNC_CONFIG`; when neither is given the
    /// default [`SyncSettings`] are used.
    pub fn from_env(settings_path: Option<&Path>) -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), settings_path)
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, settings_path: Option<&Path>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("BILLING_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::MissingEnvVar {
                name: "BILLING_API_TOKEN".to_string(),
            })?;

        let base_url = lookup("BILLING_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let interval_hours = match lookup("SYNC_INTERVAL_HOURS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| Error::Config {
                message: format!("SYNC_INTERVAL_HOURS must be a whole number of hours: {e}"),
            })?,
            None => 1,
        };
        if interval_hours == 0 {
            return Err(config_error("SYNC_INTERVAL_HOURS must be greater than zero"));
        }
        let interval_secs = interval_hours
            .checked_mul(60 * 60)
            .ok_or_else(|| config_error("SYNC_INTERVAL_HOURS is too large"))?;

        let sync = match settings_path
            .map(Path::to_path_buf)
            .or_else(|| lookup("SYNC_CONFIG").map(Into::into))
        {
            Some(path) => load_sync_settings(path)?,
            None => SyncSettings::default(),
        };

        Ok(Self {
            api: ApiConfig {
                token: SecretString::new(token.into_boxed_str()),
                base_url,
            },
            database_url: super::database::database_url_from(&lookup),
            interval: Duration::from_secs(interval_secs),
            sync,
        })
    }
}

fn config_error(message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
    }
}
