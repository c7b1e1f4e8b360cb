//! Runtime settings stored in the `settings` key/value table

use crate::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_ASSIGNMENT_STRATEGY: &str = "default_assignment_strategy";
pub const WORKLOAD_LOW_MAX: &str = "workload_low_max";
pub const WORKLOAD_MEDIUM_MAX: &str = "workload_medium_max";
pub const IMPORT_MAX_ROWS: &str = "import_max_rows";
pub const ANALYTICS_TREND_MONTHS: &str = "analytics_trend_months";

/// Every setting with its default value
pub const DEFAULT_SETTINGS: [(&str, &str); 5] = [
    (DEFAULT_ASSIGNMENT_STRATEGY, "round_robin"),
    (WORKLOAD_LOW_MAX, "10"),
    (WORKLOAD_MEDIUM_MAX, "25"),
    (IMPORT_MAX_ROWS, "5000"),
    (ANALYTICS_TREND_MONTHS, "6"),
];

/// Create the settings table
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure every known setting exists; NULL values are reset to defaults
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, default_value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, default_value).await?;
    }
    Ok(())
}

/// Insert a setting if missing, or reset it if its value is NULL
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let existing: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match existing {
        None => {
            // INSERT OR IGNORE: concurrent initializers may race past the lookup
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query(
                "UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?",
            )
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting_raw(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(value.flatten())
}

/// Read and parse a setting, falling back to `default` when absent or unparsable
pub async fn get_setting<T: FromStr>(pool: &SqlitePool, key: &str, default: T) -> Result<T> {
    match get_setting_raw(pool, key).await? {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!("Setting '{}' has unparsable value '{}', using default", key, raw);
                Ok(default)
            }
        },
        None => Ok(default),
    }
}

/// Write a setting value, creating the key if needed
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidInput("Setting key must not be empty".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Workload band thresholds read from settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadThresholds {
    pub low_max: i64,
    pub medium_max: i64,
}

impl Default for WorkloadThresholds {
    fn default() -> Self {
        Self {
            low_max: 10,
            medium_max: 25,
        }
    }
}

impl WorkloadThresholds {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            low_max: get_setting(pool, WORKLOAD_LOW_MAX, defaults.low_max).await?,
            medium_max: get_setting(pool, WORKLOAD_MEDIUM_MAX, defaults.medium_max).await?,
        })
    }

    /// Band label for a workload: LOW up to `low_max`, MEDIUM up to `medium_max`
    pub fn band(&self, workload: i64) -> &'static str {
        if workload <= self.low_max {
            "LOW"
        } else if workload <= self.medium_max {
            "MEDIUM"
        } else {
            "HIGH"
        }
    }
}
