//! SQL migration definitions for the LeadRevive database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: leads, suppression_list",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Leads owned by a user
CREATE TABLE IF NOT EXISTS leads (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    email       TEXT NOT NULL,
    phone       TEXT,
    company     TEXT,
    job_title   TEXT,
    notes       TEXT,
    status      TEXT NOT NULL DEFAULT 'new' CHECK (status IN (
                    'new', 'contacted', 'engaged', 'qualified',
                    'meeting_booked', 'converted', 'unresponsive', 'opted_out')),
    lead_score  INTEGER NOT NULL DEFAULT 50 CHECK (lead_score BETWEEN 0 AND 100),
    source      TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(user_id, email)
);

CREATE INDEX IF NOT EXISTS idx_leads_user_id ON leads(user_id);
CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(user_id, status);

-- Emails that must not receive marketing communication
CREATE TABLE IF NOT EXISTS suppression_list (
    email    TEXT PRIMARY KEY,
    reason   TEXT,
    added_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Import journal",
            sql: r#"
CREATE TABLE IF NOT EXISTS import_jobs (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    file_name   TEXT NOT NULL,
    file_sha256 TEXT NOT NULL,
    sink        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_import_jobs_user ON import_jobs(user_id, started_at);
CREATE INDEX IF NOT EXISTS idx_import_jobs_hash ON import_jobs(user_id, file_sha256);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
