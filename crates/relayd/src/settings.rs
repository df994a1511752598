//! Runtime-adjustable settings.
//!
//! Persisted as key/value rows in the `system_config` table, cached in a
//! [`SettingsHandle`] that the orchestrator and dispatcher read from, and
//! re-read on a fixed interval.

use crate::db::Database;
use relay_shared::RelayError;
use rusqlite::params;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const KEY_RESPONSE_TIMEOUT: &str = "response_timeout";
pub const KEY_CALLBACK_URL: &str = "callback_url";
pub const KEY_MAX_RESPONSE_LENGTH: &str = "max_response_length";
pub const KEY_API_TIMEOUT: &str = "api_timeout";
pub const KEY_ENABLE_ANALYTICS: &str = "enable_analytics";

/// Seed rows: key, default value, description
pub const DEFAULT_SETTINGS: &[(&str, &str, &str)] = &[
    (
        KEY_RESPONSE_TIMEOUT,
        "30",
        "Seconds to wait for the engine before replying with the placeholder (0 = wait forever)",
    ),
    (
        KEY_CALLBACK_URL,
        "http://127.0.0.1:8080/send_custom_message",
        "Notification endpoint that receives late answers",
    ),
    (
        KEY_MAX_RESPONSE_LENGTH,
        "2048",
        "Maximum characters delivered through the callback",
    ),
    (KEY_API_TIMEOUT, "5", "Timeout for the callback HTTP call, in seconds"),
    (KEY_ENABLE_ANALYTICS, "true", "Track popular questions"),
];

/// Typed view of the settings table
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub response_timeout_secs: u64,
    pub callback_url: String,
    pub max_response_length: usize,
    pub api_timeout_secs: u64,
    pub enable_analytics: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            response_timeout_secs: 30,
            callback_url: "http://127.0.0.1:8080/send_custom_message".to_string(),
            max_response_length: 2048,
            api_timeout_secs: 5,
            enable_analytics: true,
        }
    }
}

impl RelaySettings {
    /// Time budget for the caller, `None` when unbounded
    pub fn response_timeout(&self) -> Option<Duration> {
        match self.response_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Build from raw rows. Unknown keys are ignored, bad values keep the default.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut settings = RelaySettings::default();

        if let Some(v) = pairs.get(KEY_RESPONSE_TIMEOUT) {
            settings.response_timeout_secs =
                parse_or_default(KEY_RESPONSE_TIMEOUT, v, settings.response_timeout_secs);
        }
        if let Some(v) = pairs.get(KEY_CALLBACK_URL) {
            if v.trim().is_empty() {
                warn!("Setting {} is empty, keeping default", KEY_CALLBACK_URL);
            } else {
                settings.callback_url = v.trim().to_string();
            }
        }
        if let Some(v) = pairs.get(KEY_MAX_RESPONSE_LENGTH) {
            settings.max_response_length =
                parse_or_default(KEY_MAX_RESPONSE_LENGTH, v, settings.max_response_length);
        }
        if let Some(v) = pairs.get(KEY_API_TIMEOUT) {
            settings.api_timeout_secs =
                parse_or_default(KEY_API_TIMEOUT, v, settings.api_timeout_secs);
        }
        if let Some(v) = pairs.get(KEY_ENABLE_ANALYTICS) {
            settings.enable_analytics = v.trim().eq_ignore_ascii_case("true");
        }

        settings
    }
}

fn parse_or_default<T: std::str::FromStr + Copy + std::fmt::Display>(
    key: &str,
    raw: &str,
    default: T,
) -> T {
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Setting {}={:?} is not valid, using {}", key, raw, default);
            default
        }
    }
}

/// Cheap, cloneable handle to the current settings snapshot
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<RelaySettings>>,
}

impl SettingsHandle {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> RelaySettings {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, settings: RelaySettings) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = settings;
    }
}

/// The `system_config` table plus its cache
pub struct SettingsStore {
    db: Database,
    handle: SettingsHandle,
}

impl SettingsStore {
    /// Create the table if needed, seed defaults and load the cache
    pub async fn open(db: Database) -> Result<Self, RelayError> {
        db.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS system_config (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    description TEXT,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
                [],
            )?;
            for (key, value, description) in DEFAULT_SETTINGS {
                conn.execute(
                    "INSERT OR IGNORE INTO system_config (key, value, description) VALUES (?1, ?2, ?3)",
                    params![key, value, description],
                )?;
            }
            Ok(())
        })
        .await?;

        let store = Self {
            db,
            handle: SettingsHandle::default(),
        };
        let loaded = store.reload().await?;
        info!(
            "Loaded settings: timeout={}s, max_len={}, callback={}",
            loaded.response_timeout_secs, loaded.max_response_length, loaded.callback_url
        );
        Ok(store)
    }

    pub fn handle(&self) -> SettingsHandle {
        self.handle.clone()
    }

    /// Re-read the table into the cache
    pub async fn reload(&self) -> Result<RelaySettings, RelayError> {
        let pairs: HashMap<String, String> = self
            .all()
            .await?
            .into_iter()
            .map(|(key, value, _)| (key, value))
            .collect();
        let settings = RelaySettings::from_pairs(&pairs);
        self.handle.replace(settings.clone());
        Ok(settings)
    }

    /// All rows as (key, value, description)
    pub async fn all(&self) -> Result<Vec<(String, String, String)>, RelayError> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value, COALESCE(description, '') FROM system_config ORDER BY key",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await
    }

    /// Persist a new value and refresh the cache
    pub async fn set(&self, key: &str, value: &str) -> Result<RelaySettings, RelayError> {
        if !DEFAULT_SETTINGS.iter().any(|(k, _, _)| *k == key) {
            return Err(RelayError::Config(format!("Unknown setting: {}", key)));
        }
        let key_owned = key.to_string();
        let value_owned = value.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE system_config SET value = ?1, updated_at = CURRENT_TIMESTAMP WHERE key = ?2",
                    params![value_owned, key_owned],
                )
            })
            .await?;
        info!("Setting {} updated to {}", key, value);
        self.reload().await
    }

    /// Reload the cache every `interval` until the task is aborted
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; the cache is already fresh
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.reload().await {
                    Ok(_) => debug!("Settings refreshed"),
                    Err(e) => warn!("Settings refresh failed, keeping cached values: {}", e),
                }
            }
        })
    }
}
