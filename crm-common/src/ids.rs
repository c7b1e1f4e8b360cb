//! Identifier utilities

use uuid::Uuid;

/// Prefix for human-readable lead codes
pub const LEAD_CODE_PREFIX: &str = "LD-";

/// Prefix for human-readable business codes
pub const BUSINESS_CODE_PREFIX: &str = "BIZ-";

/// Generate a new human-readable lead code (e.g. `LD-3F9A12C0`)
///
/// Codes are derived from a UUIDv4, so collisions are improbable but the
/// `leads.lead_code` column still carries a UNIQUE constraint.
pub fn generate_lead_code() -> String {
    short_code(LEAD_CODE_PREFIX)
}

/// Generate a new business code (e.g. `BIZ-0B44E9D1`)
pub fn generate_business_code() -> String {
    short_code(BUSINESS_CODE_PREFIX)
}

/// Check that a string looks like a lead code produced by [`generate_lead_code`]
pub fn is_lead_code(s: &str) -> bool {
    has_short_code(s, LEAD_CODE_PREFIX)
}

pub fn is_business_code(s: &str) -> bool {
    has_short_code(s, BUSINESS_CODE_PREFIX)
}

fn short_code(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}{}", prefix, &simple[..8])
}

fn has_short_code(s: &str, prefix: &str) -> bool {
    match s.strip_prefix(prefix) {
        Some(rest) => rest.len() == 8 && rest.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
