//! Core domain types for leads and import sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LeadReviveError;

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LeadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// LeadStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a persisted lead. Transitions are not checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Engaged,
    Qualified,
    MeetingBooked,
    Converted,
    Unresponsive,
    OptedOut,
}

impl LeadStatus {
    /// All statuses, in funnel order.
    pub const ALL: [LeadStatus; 8] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Engaged,
        LeadStatus::Qualified,
        LeadStatus::MeetingBooked,
        LeadStatus::Converted,
        LeadStatus::Unresponsive,
        LeadStatus::OptedOut,
    ];

    /// The snake_case name used in storage and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Engaged => "engaged",
            LeadStatus::Qualified => "qualified",
            LeadStatus::MeetingBooked => "meeting_booked",
            LeadStatus::Converted => "converted",
            LeadStatus::Unresponsive => "unresponsive",
            LeadStatus::OptedOut => "opted_out",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = LeadReviveError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LeadReviveError::validation(format!("unknown lead status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ParsedLead
// ---------------------------------------------------------------------------

/// A lead candidate produced from one row of an uploaded file.
///
/// Lives only for the duration of an import session; only valid rows are
/// turned into [`NewLead`]s and sent to a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLead {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// 1-based line number, counting the header as line 1.
    pub row_number: usize,
    pub is_valid: bool,
    /// Human-readable problems, in the order they were found.
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// NewLead
// ---------------------------------------------------------------------------

/// Insert payload for the `leads` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Owning user.
    pub user_id: String,
    pub status: LeadStatus,
    /// 0-100.
    pub lead_score: u8,
    /// Provenance tag, e.g. `csv_import`.
    pub source: String,
}

impl NewLead {
    /// Build an insert payload from a parsed row, dropping the import-only fields.
    pub fn from_parsed(lead: &ParsedLead, user_id: &str, source: &str, lead_score: u8) -> Self {
        Self {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            company: lead.company.clone(),
            job_title: lead.job_title.clone(),
            notes: lead.notes.clone(),
            user_id: user_id.to_string(),
            status: LeadStatus::New,
            lead_score,
            source: source.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A lead as stored in the `leads` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: LeadStatus,
    pub lead_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ImportProgress
// ---------------------------------------------------------------------------

/// Counters for one import session. `total` is fixed when the session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

impl ImportProgress {
    /// Start a session over `total` rows.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Completion percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed * 100) / self.total).min(100) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.processed == self.total
    }
}
