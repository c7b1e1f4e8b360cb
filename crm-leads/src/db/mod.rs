//! Data access for the lead service
//!
//! Queries are plain `sqlx` against the schema created by
//! `crm_common::db::init_database`. Rows are mapped by hand into the
//! shared models so that enumerations round-trip through their text form.

pub mod analytics;
pub mod assignment;
pub mod businesses;
pub mod counsellors;
pub mod import;
pub mod leads;
pub mod sources;
pub mod transfers;

use crm_common::models::{
    ActivityType, Business, BusinessStatus, Counsellor, Lead, LeadActivity, LeadSource,
    LeadTransfer,
};
use crm_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Column list matching [`lead_from_row`]
pub(crate) const LEAD_COLUMNS: &str = "id, lead_code, first_name, last_name, email, phone, \
     company, position, industry, source_id, status, priority, assigned_counsellor_id, \
     previous_counsellor_id, expected_value, notes, city, country, last_contact_date, \
     next_follow_up, actual_value, created_at, updated_at";

pub(crate) const COUNSELLOR_COLUMNS: &str =
    "id, employee_id, first_name, last_name, email, department, is_active, created_at";

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| Error::Internal(format!("Corrupt {} value '{}': {}", column, raw, e)))
}

pub(crate) fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    Ok(Lead {
        id: row.try_get("id")?,
        lead_code: row.try_get("lead_code")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        position: row.try_get("position")?,
        industry: row.try_get("industry")?,
        source_id: row.try_get("source_id")?,
        status: parse_column(row, "status")?,
        priority: parse_column(row, "priority")?,
        assigned_counsellor_id: row.try_get("assigned_counsellor_id")?,
        previous_counsellor_id: row.try_get("previous_counsellor_id")?,
        expected_value: row.try_get("expected_value")?,
        notes: row.try_get("notes")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
        last_contact_date: row.try_get("last_contact_date")?,
        next_follow_up: row.try_get("next_follow_up")?,
        actual_value: row.try_get("actual_value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn counsellor_from_row(row: &SqliteRow) -> Result<Counsellor> {
    Ok(Counsellor {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn source_from_row(row: &SqliteRow) -> Result<LeadSource> {
    Ok(LeadSource {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
    })
}

pub(crate) fn transfer_from_row(row: &SqliteRow) -> Result<LeadTransfer> {
    Ok(LeadTransfer {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        from_counsellor_id: row.try_get("from_counsellor_id")?,
        to_counsellor_id: row.try_get("to_counsellor_id")?,
        reason: row.try_get("reason")?,
        admin_approved: row.try_get("admin_approved")?,
        approved_at: row.try_get("approved_at")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn activity_from_row(row: &SqliteRow) -> Result<LeadActivity> {
    Ok(LeadActivity {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        counsellor_id: row.try_get("counsellor_id")?,
        activity_type: parse_column::<ActivityType>(row, "activity_type")?,
        subject: row.try_get("subject")?,
        outcome: row.try_get("outcome")?,
        completed_at: row.try_get("completed_at")?,
    })
}

pub(crate) fn business_from_row(row: &SqliteRow) -> Result<Business> {
    Ok(Business {
        id: row.try_get("id")?,
        business_code: row.try_get("business_code")?,
        lead_id: row.try_get("lead_id")?,
        counsellor_id: row.try_get("counsellor_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        value: row.try_get("value")?,
        status: parse_column::<BusinessStatus>(row, "status")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        payment_terms: row.try_get("payment_terms")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Map a UNIQUE constraint violation to [`Error::Conflict`]
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::Conflict(message())
        }
        _ => Error::Database(err),
    }
}

/// Map a FOREIGN KEY violation to [`Error::InvalidInput`]
pub(crate) fn invalid_on_foreign_key(err: sqlx::Error, message: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            Error::InvalidInput(message())
        }
        _ => Error::Database(err),
    }
}
