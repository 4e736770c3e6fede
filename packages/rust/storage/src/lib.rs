//! Embedded libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding leads, the
//! suppression list, and the import journal. It is also a [`LeadSink`], so
//! the import pipeline can write to it directly.
//!
//! **Access rules:**
//! - CLI import/update commands: read-write via [`Storage::open`]
//! - Listing and reporting: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use leadrevive_shared::{Lead, LeadId, LeadReviveError, LeadSink, LeadStatus, NewLead, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;
use uuid::Uuid;

/// Column list shared by every lead query, in [`row_to_lead`] order.
const LEAD_COLUMNS: &str = "id, user_id, first_name, last_name, email, phone, company, job_title, \
                            notes, status, lead_score, source, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadReviveError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeadReviveError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadReviveError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadReviveError::ReadOnly);
        }
        Ok(())
    }

    async fn execute_plain(&self, sql: &str) -> Result<()> {
        self.conn
            .execute(sql, params![])
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lead operations
    // -----------------------------------------------------------------------

    /// Insert a batch of leads in one transaction. Returns the inserted count.
    ///
    /// All-or-nothing: a constraint violation on any row (for example a
    /// duplicate `user_id + email`) rolls back the whole batch.
    pub async fn insert_leads(&self, leads: &[NewLead]) -> Result<usize> {
        self.check_writable()?;
        if leads.is_empty() {
            return Ok(0);
        }

        self.execute_plain("BEGIN").await?;
        let committed = match self.insert_leads_in_tx(leads).await {
            Ok(inserted) => self.execute_plain("COMMIT").await.map(|()| inserted),
            Err(e) => Err(e),
        };

        match committed {
            Ok(inserted) => {
                tracing::debug!(inserted, "lead batch committed");
                Ok(inserted)
            }
            Err(e) => {
                // A failed COMMIT leaves the transaction open
                if let Err(rollback) = self.execute_plain("ROLLBACK").await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert_leads_in_tx(&self, leads: &[NewLead]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0usize;

        for lead in leads {
            let id = LeadId::new().to_string();
            let affected = self
                .conn
                .execute(
                    "INSERT INTO leads (id, user_id, first_name, last_name, email, phone, company,
                                        job_title, notes, status, lead_score, source, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        id.as_str(),
                        lead.user_id.as_str(),
                        lead.first_name.as_str(),
                        lead.last_name.as_str(),
                        lead.email.as_str(),
                        lead.phone.as_deref(),
                        lead.company.as_deref(),
                        lead.job_title.as_deref(),
                        lead.notes.as_deref(),
                        lead.status.as_str(),
                        i64::from(lead.lead_score),
                        lead.source.as_str(),
                        now.as_str(),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(|e| LeadReviveError::Storage(format!("{}: {e}", lead.email)))?;
            inserted += affected as usize;
        }

        Ok(inserted)
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadReviveError::Storage(e.to_string())),
        }
    }

    /// List a user's leads, newest first, optionally filtered by status.
    pub async fn list_leads(
        &self,
        user_id: &str,
        status: Option<LeadStatus>,
        limit: u32,
    ) -> Result<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        );
        let mut rows = self
            .conn
            .query(&sql, params![user_id, status.map(LeadStatus::as_str), limit])
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Count a user's leads.
    pub async fn count_leads(&self, user_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM leads WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map(|n| n as u64).unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(LeadReviveError::Storage(e.to_string())),
        }
    }

    /// Set a lead's status. Returns `false` if no lead has that ID.
    pub async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now.as_str(), id],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Suppression list
    // -----------------------------------------------------------------------

    /// Add an email to the suppression list (upserts the reason).
    pub async fn add_suppression(&self, email: &str, reason: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let email = normalize_email(email);
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO suppression_list (email, reason, added_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(email) DO UPDATE SET reason = excluded.reason",
                params![email.as_str(), reason, now.as_str()],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Whether an email is on the suppression list (case-insensitive).
    pub async fn is_suppressed(&self, email: &str) -> Result<bool> {
        let email = normalize_email(email);
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM suppression_list WHERE email = ?1",
                params![email.as_str()],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(LeadReviveError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Import journal
    // -----------------------------------------------------------------------

    /// Open a journal entry for an import session. Returns the generated job ID.
    pub async fn insert_import_job(
        &self,
        user_id: &str,
        file_name: &str,
        file_sha256: &str,
        sink: &str,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO import_jobs (id, user_id, file_name, file_sha256, sink, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id.as_str(), user_id, file_name, file_sha256, sink, now.as_str()],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Close a journal entry with its final status and tallies.
    pub async fn finish_import_job(&self, job_id: &str, status: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE import_jobs SET finished_at = ?1, status = ?2, stats_json = ?3 WHERE id = ?4",
                params![now.as_str(), status, stats_json, job_id],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent journal entry for a file with this hash and owner.
    pub async fn find_import_by_hash(
        &self,
        user_id: &str,
        file_sha256: &str,
    ) -> Result<Option<ImportJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, file_name, file_sha256, sink, started_at, finished_at, status, stats_json
                 FROM import_jobs WHERE user_id = ?1 AND file_sha256 = ?2
                 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![user_id, file_sha256],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_import_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadReviveError::Storage(e.to_string())),
        }
    }

    /// A user's import sessions, newest first.
    pub async fn list_import_jobs(&self, user_id: &str, limit: u32) -> Result<Vec<ImportJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, file_name, file_sha256, sink, started_at, finished_at, status, stats_json
                 FROM import_jobs WHERE user_id = ?1
                 ORDER BY started_at DESC, id DESC LIMIT ?2",
                params![user_id, limit],
            )
            .await
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_import_job(&row)?);
        }
        Ok(results)
    }
}

impl LeadSink for Storage {
    async fn insert_batch(&self, batch: &[NewLead]) -> Result<Option<usize>> {
        self.insert_leads(batch).await.map(Some)
    }
}

/// One row of the import journal.
#[derive(Debug, Clone, Serialize)]
pub struct ImportJob {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_sha256: String,
    /// `local` or `remote`.
    pub sink: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `completed`, `cancelled`, `aborted`, or `failed`; `None` while running.
    pub status: Option<String>,
    pub stats_json: Option<String>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadReviveError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    let id: String = row
        .get(0)
        .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
    let status: String = row
        .get(9)
        .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
    let score: i64 = row
        .get(10)
        .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
    let created_at: String = row
        .get(12)
        .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
    let updated_at: String = row
        .get(13)
        .map_err(|e| LeadReviveError::Storage(e.to_string()))?;

    Ok(Lead {
        id: id
            .parse()
            .map_err(|e| LeadReviveError::Storage(format!("invalid lead id {id}: {e}")))?,
        user_id: row
            .get::<String>(1)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        first_name: row
            .get::<String>(2)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        last_name: row
            .get::<String>(3)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        email: row
            .get::<String>(4)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        phone: row.get::<String>(5).ok(),
        company: row.get::<String>(6).ok(),
        job_title: row.get::<String>(7).ok(),
        notes: row.get::<String>(8).ok(),
        status: status.parse()?,
        lead_score: u8::try_from(score)
            .map_err(|_| LeadReviveError::Storage(format!("lead_score out of range: {score}")))?,
        source: row.get::<String>(11).ok(),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Convert a database row to an [`ImportJob`].
fn row_to_import_job(row: &libsql::Row) -> Result<ImportJob> {
    let started_at: String = row
        .get(5)
        .map_err(|e| LeadReviveError::Storage(e.to_string()))?;
    let finished_at = match row.get::<String>(6).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };

    Ok(ImportJob {
        id: row
            .get::<String>(0)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        user_id: row
            .get::<String>(1)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        file_name: row
            .get::<String>(2)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        file_sha256: row
            .get::<String>(3)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        sink: row
            .get::<String>(4)
            .map_err(|e| LeadReviveError::Storage(e.to_string()))?,
        started_at: parse_timestamp(&started_at)?,
        finished_at,
        status: row.get::<String>(7).ok(),
        stats_json: row.get::<String>(8).ok(),
    })
}
