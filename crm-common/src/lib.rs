//! # Lead CRM Common Library
//!
//! Shared code for the lead CRM crates including:
//! - The lead assignment engine (pure decision logic)
//! - Domain models (leads, counsellors, sources, transfers, activities)
//! - Database schema initialization, migrations and settings
//! - Configuration loading and root folder resolution
//! - Identifier helpers

pub mod assignment;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod ids;
pub mod models;

pub use assignment::{AssignmentPlan, AssignmentReport, AssignmentStrategy};
pub use error::{Error, Result};
pub use models::{Lead, LeadPriority, LeadStatus};
