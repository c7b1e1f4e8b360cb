//! Database schema migrations
//!
//! Versioned, idempotent upgrades applied after the base tables exist.
//! Each migration checks the current shape of the schema before altering
//! it, so running the full sequence against an up-to-date database is a
//! no-op.
//!
//! Never edit a released migration; add a new `migrate_vN` instead and
//! bump [`CURRENT_SCHEMA_VERSION`].

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    if current_version < 3 {
        migrate_v3(pool).await?;
        set_schema_version(pool, 3).await?;
        info!("✓ Migration v3 completed");
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Migration v1: lookup indexes
///
/// Assignment snapshots filter leads by owner, the list view filters by
/// status, and the lead detail view reads transfers and activities per lead.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: lead lookup indexes");

    let indexes = [
        ("idx_leads_assigned_counsellor", "leads(assigned_counsellor_id)"),
        ("idx_leads_status", "leads(status)"),
        ("idx_leads_created_at", "leads(created_at)"),
        ("idx_lead_transfers_lead", "lead_transfers(lead_id)"),
        ("idx_lead_activities_lead", "lead_activities(lead_id)"),
    ];

    for (name, target) in indexes {
        sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {} ON {}", name, target))
            .execute(pool)
            .await?;
    }

    info!("  ✓ Ensured {} indexes", indexes.len());
    Ok(())
}

/// Migration v2: add last_contact_date to leads
///
/// Set whenever an activity is logged against the lead.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add last_contact_date column to leads");
    add_column_if_missing(pool, "leads", "last_contact_date", "TIMESTAMP").await
}

/// Migration v3: follow-ups, won value and transfer approval time
///
/// - `leads.next_follow_up`: scheduled by the owning counsellor
/// - `leads.actual_value`: value of the business that closed the lead
/// - `lead_transfers.approved_at`: NULL while a transfer request is pending
async fn migrate_v3(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v3: follow-up, actual value and approval columns");
    add_column_if_missing(pool, "leads", "next_follow_up", "TIMESTAMP").await?;
    add_column_if_missing(pool, "leads", "actual_value", "REAL").await?;
    add_column_if_missing(pool, "lead_transfers", "approved_at", "TIMESTAMP").await?;
    Ok(())
}

/// `ALTER TABLE .. ADD COLUMN` unless the table is missing or already has it
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    declaration: &str,
) -> Result<()> {
    if !table_exists(pool, table).await? {
        info!("  {} table doesn't exist yet - skipping {}", table, column);
        return Ok(());
    }

    let has_column: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = ?",
        table
    ))
    .bind(column)
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  {}.{} already exists - skipping", table, column);
        return Ok(());
    }

    // Tolerate a concurrent initializer adding the column first
    match sqlx::query(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table, column, declaration
    ))
    .execute(pool)
    .await
    {
        Ok(_) => {
            info!("  ✓ Added {}.{}", table, column);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  {}.{} added concurrently - skipping", table, column);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
