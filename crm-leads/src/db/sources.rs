//! Lead source queries

use crm_common::models::{LeadSource, SourceId};
use crm_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use super::{conflict_on_unique, source_from_row};

/// Body of create and update requests
#[derive(Debug, Clone, Deserialize)]
pub struct SourceInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl SourceInput {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("name is required".to_string()));
        }
        Ok(())
    }
}

pub async fn list_sources(pool: &SqlitePool) -> Result<Vec<LeadSource>> {
    let rows = sqlx::query("SELECT id, name, description, is_active FROM lead_sources ORDER BY name")
        .fetch_all(pool)
        .await?;
    rows.iter().map(source_from_row).collect()
}

pub async fn get_source(pool: &SqlitePool, source_id: SourceId) -> Result<LeadSource> {
    let row = sqlx::query("SELECT id, name, description, is_active FROM lead_sources WHERE id = ?")
        .bind(source_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Lead source {} not found", source_id)))?;
    source_from_row(&row)
}

pub async fn insert_source(pool: &SqlitePool, input: &SourceInput) -> Result<LeadSource> {
    input.validate()?;

    let id = sqlx::query("INSERT INTO lead_sources (name, description, is_active) VALUES (?, ?, ?)")
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.is_active)
        .execute(pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("Lead source '{}' already exists", input.name.trim())))?
        .last_insert_rowid();

    info!(source_id = id, name = %input.name.trim(), "Lead source created");
    get_source(pool, id).await
}

pub async fn update_source(
    pool: &SqlitePool,
    source_id: SourceId,
    input: &SourceInput,
) -> Result<LeadSource> {
    input.validate()?;

    let result = sqlx::query(
        "UPDATE lead_sources SET name = ?, description = ?, is_active = ? WHERE id = ?",
    )
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(input.is_active)
    .bind(source_id)
    .execute(pool)
    .await
    .map_err(|e| conflict_on_unique(e, || format!("Lead source '{}' already exists", input.name.trim())))?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Lead source {} not found", source_id)));
    }
    get_source(pool, source_id).await
}

/// Delete a source; leads that referenced it keep no source
pub async fn delete_source(pool: &SqlitePool, source_id: SourceId) -> Result<()> {
    let result = sqlx::query("DELETE FROM lead_sources WHERE id = ?")
        .bind(source_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Lead source {} not found", source_id)));
    }
    info!(source_id, "Lead source deleted");
    Ok(())
}
