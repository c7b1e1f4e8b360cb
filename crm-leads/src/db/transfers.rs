//! Lead transfers
//!
//! Two paths move a lead between counsellors:
//!
//! - a direct transfer, stored already approved, moves the lead at once
//! - a transfer request is stored pending and moves the lead only when
//!   approved; rejecting deletes the pending request
//!
//! Both run under `BEGIN IMMEDIATE` so the owner check and the move see
//! the same state.

use crm_common::models::{Counsellor, CounsellorId, Lead, LeadId, LeadStatus, LeadTransfer};
use crm_common::{Error, Result};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::info;

use super::counsellors::require_active_counsellor;
use super::leads::get_lead;
use super::transfer_from_row;

pub async fn get_transfer<'e, E>(executor: E, transfer_id: i64) -> Result<LeadTransfer>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT * FROM lead_transfers WHERE id = ?")
        .bind(transfer_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Transfer {} not found", transfer_id)))?;
    transfer_from_row(&row)
}

/// Transfer history for a lead, oldest first
pub async fn list_transfers(pool: &SqlitePool, lead_id: LeadId) -> Result<Vec<LeadTransfer>> {
    let rows = sqlx::query("SELECT * FROM lead_transfers WHERE lead_id = ? ORDER BY id")
        .bind(lead_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(transfer_from_row).collect()
}

/// Requests still waiting for approval, oldest first
pub async fn list_pending_transfers(pool: &SqlitePool) -> Result<Vec<LeadTransfer>> {
    let rows = sqlx::query("SELECT * FROM lead_transfers WHERE admin_approved = 0 ORDER BY id")
        .fetch_all(pool)
        .await?;
    rows.iter().map(transfer_from_row).collect()
}

/// Move a lead to another active counsellor right away
///
/// Records an approved transfer, keeps the old owner as the previous
/// counsellor and sets the status to TRANSFERRED.
pub async fn transfer_lead(
    pool: &SqlitePool,
    lead_id: LeadId,
    to_counsellor_id: CounsellorId,
    reason: &str,
) -> Result<LeadTransfer> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let lead = get_lead(&mut *tx, lead_id).await?;
    let target = require_active_counsellor(&mut *tx, to_counsellor_id).await?;
    ensure_new_owner(&lead, &target)?;

    let transfer_id = sqlx::query(
        r#"
        INSERT INTO lead_transfers
            (lead_id, from_counsellor_id, to_counsellor_id, reason, admin_approved, approved_at)
        VALUES (?, ?, ?, ?, 1, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(lead_id)
    .bind(lead.assigned_counsellor_id)
    .bind(to_counsellor_id)
    .bind(reason.trim())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    move_lead(&mut *tx, lead_id, to_counsellor_id).await?;
    let transfer = get_transfer(&mut *tx, transfer_id).await?;
    tx.commit().await?;

    info!(
        lead_id,
        from = ?lead.assigned_counsellor_id,
        to = to_counsellor_id,
        "Lead transferred to {}",
        target.full_name()
    );
    Ok(transfer)
}

/// File a pending request to hand an owned lead to another counsellor
///
/// A lead has at most one pending request at a time.
pub async fn request_transfer(
    pool: &SqlitePool,
    lead_id: LeadId,
    to_counsellor_id: CounsellorId,
    reason: &str,
) -> Result<LeadTransfer> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let lead = get_lead(&mut *tx, lead_id).await?;
    let Some(owner) = lead.assigned_counsellor_id else {
        return Err(Error::InvalidInput(format!(
            "Lead {} has no owner; assign it instead of requesting a transfer",
            lead_id
        )));
    };
    let target = require_active_counsellor(&mut *tx, to_counsellor_id).await?;
    ensure_new_owner(&lead, &target)?;

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lead_transfers WHERE lead_id = ? AND admin_approved = 0",
    )
    .bind(lead_id)
    .fetch_one(&mut *tx)
    .await?;
    if pending > 0 {
        return Err(Error::Conflict(format!(
            "Lead {} already has a pending transfer request",
            lead_id
        )));
    }

    let transfer_id = sqlx::query(
        r#"
        INSERT INTO lead_transfers (lead_id, from_counsellor_id, to_counsellor_id, reason, admin_approved)
        VALUES (?, ?, ?, ?, 0)
        "#,
    )
    .bind(lead_id)
    .bind(owner)
    .bind(to_counsellor_id)
    .bind(reason.trim())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let transfer = get_transfer(&mut *tx, transfer_id).await?;
    tx.commit().await?;

    info!(lead_id, from = owner, to = to_counsellor_id, transfer_id, "Transfer requested");
    Ok(transfer)
}

/// Approve a pending request and move the lead
///
/// Fails with a conflict when the request was already approved, the target
/// has been deactivated, or the lead changed owner after the request.
pub async fn approve_transfer(pool: &SqlitePool, transfer_id: i64) -> Result<LeadTransfer> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let transfer = get_transfer(&mut *tx, transfer_id).await?;
    if transfer.admin_approved {
        return Err(Error::Conflict(format!(
            "Transfer {} is already approved",
            transfer_id
        )));
    }

    let lead = get_lead(&mut *tx, transfer.lead_id).await?;
    if lead.assigned_counsellor_id != transfer.from_counsellor_id {
        return Err(Error::Conflict(format!(
            "Lead {} changed owner since transfer {} was requested",
            lead.id, transfer_id
        )));
    }
    let target = require_active_counsellor(&mut *tx, transfer.to_counsellor_id).await?;

    sqlx::query(
        "UPDATE lead_transfers SET admin_approved = 1, approved_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(transfer_id)
    .execute(&mut *tx)
    .await?;
    move_lead(&mut *tx, lead.id, target.id).await?;

    let approved = get_transfer(&mut *tx, transfer_id).await?;
    tx.commit().await?;

    info!(
        lead_id = lead.id,
        transfer_id,
        "Transfer approved; lead moved to {}",
        target.full_name()
    );
    Ok(approved)
}

/// Drop a pending request; approved transfers are history and stay
pub async fn reject_transfer(pool: &SqlitePool, transfer_id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM lead_transfers WHERE id = ? AND admin_approved = 0")
        .bind(transfer_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        // Distinguish a missing request from an approved one
        get_transfer(pool, transfer_id).await?;
        return Err(Error::Conflict(format!(
            "Transfer {} is already approved",
            transfer_id
        )));
    }
    info!(transfer_id, "Transfer request rejected");
    Ok(())
}

fn ensure_new_owner(lead: &Lead, target: &Counsellor) -> Result<()> {
    if lead.assigned_counsellor_id == Some(target.id) {
        return Err(Error::InvalidInput(format!(
            "Lead {} is already assigned to {}",
            lead.id,
            target.full_name()
        )));
    }
    Ok(())
}

async fn move_lead(
    conn: &mut SqliteConnection,
    lead_id: LeadId,
    to_counsellor_id: CounsellorId,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE leads SET
            previous_counsellor_id = assigned_counsellor_id,
            assigned_counsellor_id = ?,
            status = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(to_counsellor_id)
    .bind(LeadStatus::Transferred.as_str())
    .bind(lead_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
