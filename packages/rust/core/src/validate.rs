//! Per-row validation of parsed lead candidates.

use std::sync::LazyLock;

use leadrevive_shared::ParsedLead;
use regex::Regex;

pub const FIRST_NAME_REQUIRED: &str = "First name is required";
pub const LAST_NAME_REQUIRED: &str = "Last name is required";
pub const EMAIL_REQUIRED: &str = "Email is required";
pub const EMAIL_INVALID: &str = "Invalid email format";
pub const PHONE_INVALID: &str = "Invalid phone number format";

/// `local@domain.tld` shape: one `@`, at least one `.` after it, no whitespace.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Digits, spaces, `-`, `+`, `(`, `)`.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9\s\-+()]+$").expect("phone regex"));

/// Check a sanitized lead and record its problems.
///
/// Fields are expected to be sanitized already. Invalid rows are returned
/// with `is_valid = false` rather than dropped so callers can preview them.
pub fn validate(mut lead: ParsedLead, row_number: usize) -> ParsedLead {
    let mut errors = Vec::new();

    if lead.first_name.is_empty() {
        errors.push(FIRST_NAME_REQUIRED.to_string());
    }
    if lead.last_name.is_empty() {
        errors.push(LAST_NAME_REQUIRED.to_string());
    }

    if lead.email.is_empty() {
        errors.push(EMAIL_REQUIRED.to_string());
    } else if !is_valid_email(&lead.email) {
        errors.push(EMAIL_INVALID.to_string());
    }

    if let Some(phone) = lead.phone.as_deref() {
        if !phone.is_empty() && !is_valid_phone(phone) {
            errors.push(PHONE_INVALID.to_string());
        }
    }

    lead.row_number = row_number;
    lead.is_valid = errors.is_empty();
    lead.validation_errors = errors;
    lead
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}
