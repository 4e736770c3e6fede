//! Lead file parsing: header matching, row splitting, sanitization, validation.
//!
//! The accepted format is deliberately simple comma-separated text. Fields
//! are split on every `,`; there is no quote escaping beyond stripping one
//! wrapping `"` from each field.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use leadrevive_shared::{LeadReviveError, ParsedLead, Result};

use crate::sanitize::sanitize;
use crate::validate::validate;

/// Header columns that must be present.
pub const REQUIRED_COLUMNS: [&str; 3] = ["first_name", "last_name", "email"];

/// Header columns that are read when present.
pub const OPTIONAL_COLUMNS: [&str; 4] = ["phone", "company", "job_title", "notes"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A data row dropped because its field count differs from the header's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// 1-based line number, counting the header as line 1.
    pub row_number: usize,
    /// Field count of the header.
    pub expected: usize,
    /// Field count of this row.
    pub found: usize,
}

impl std::fmt::Display for SkippedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "row {}: expected {} columns, found {}",
            self.row_number, self.expected, self.found
        )
    }
}

/// Everything produced from one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutput {
    /// One entry per structurally valid row, in file order.
    pub leads: Vec<ParsedLead>,
    /// Rows with a column-count mismatch, in file order.
    pub skipped: Vec<SkippedRow>,
}

impl ParseOutput {
    /// Rows that passed validation.
    pub fn valid(&self) -> impl Iterator<Item = &ParsedLead> {
        self.leads.iter().filter(|lead| lead.is_valid)
    }

    pub fn valid_count(&self) -> usize {
        self.valid().count()
    }

    pub fn invalid_count(&self) -> usize {
        self.leads.len() - self.valid_count()
    }
}

/// A lead file read from disk.
#[derive(Debug, Clone)]
pub struct LeadFile {
    pub path: PathBuf,
    /// File name without directories, for display and job records.
    pub name: String,
    pub content: String,
    /// Hex SHA-256 of the raw bytes.
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

/// Read a lead file and fingerprint it. The content must be UTF-8.
pub async fn load_lead_file(path: &Path) -> Result<LeadFile> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LeadReviveError::io(path, e))?;

    let sha256 = {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    };

    let content = String::from_utf8(bytes).map_err(|e| {
        LeadReviveError::parse(format!("{} is not valid UTF-8: {e}", path.display()))
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    debug!(path = %path.display(), bytes = content.len(), %sha256, "lead file loaded");

    Ok(LeadFile {
        path: path.to_path_buf(),
        name,
        content,
        sha256,
    })
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse raw file text into validated lead candidates.
///
/// Fails with [`LeadReviveError::EmptyFile`] when there are no non-blank
/// lines and with [`LeadReviveError::MissingColumns`] before touching any
/// row when a required header is absent.
pub fn parse_csv(raw: &str) -> Result<ParseOutput> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        // Records end at '\n' only; a stray '\r' stays inside its field
        .terminator(csv::Terminator::Any(b'\n'))
        .from_reader(raw.as_bytes());

    let mut lines: Vec<csv::StringRecord> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LeadReviveError::parse(e.to_string()))?;
        if !is_blank(&record) {
            lines.push(record);
        }
    }

    let mut lines = lines.into_iter();
    let header = lines.next().ok_or(LeadReviveError::EmptyFile)?;
    let columns = ColumnMap::from_header(&header)?;

    let mut output = ParseOutput::default();
    for (index, record) in lines.enumerate() {
        // Header is line 1.
        let row_number = index + 2;

        if record.len() != columns.width {
            debug!(
                row_number,
                expected = columns.width,
                found = record.len(),
                "column count mismatch, skipping row"
            );
            output.skipped.push(SkippedRow {
                row_number,
                expected: columns.width,
                found: record.len(),
            });
            continue;
        }

        output.leads.push(validate(columns.lead_from(&record), row_number));
    }

    info!(
        rows = output.leads.len(),
        valid = output.valid_count(),
        invalid = output.invalid_count(),
        skipped = output.skipped.len(),
        "lead file parsed"
    );

    Ok(output)
}

/// A line with nothing but whitespace.
fn is_blank(record: &csv::StringRecord) -> bool {
    record.len() <= 1 && record.get(0).is_none_or(|field| field.trim().is_empty())
}

/// Trim, then drop one leading and one trailing `"`.
fn strip_wrapping_quote(field: &str) -> &str {
    let field = field.trim();
    let field = field.strip_prefix('"').unwrap_or(field);
    field.strip_suffix('"').unwrap_or(field)
}

/// Positions of the known columns within the header.
struct ColumnMap {
    width: usize,
    index: HashMap<&'static str, usize>,
}

impl ColumnMap {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let names: Vec<String> = header
            .iter()
            .map(|h| strip_wrapping_quote(h).trim().to_lowercase())
            .collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !names.iter().any(|n| n == *required))
            .map(|required| required.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(LeadReviveError::MissingColumns { columns: missing });
        }

        let mut index = HashMap::new();
        for column in REQUIRED_COLUMNS.iter().chain(OPTIONAL_COLUMNS.iter()) {
            // First occurrence wins when a header repeats a column.
            if let Some(pos) = names.iter().position(|n| n == column) {
                index.insert(*column, pos);
            }
        }

        Ok(Self {
            width: names.len(),
            index,
        })
    }

    fn text(&self, record: &csv::StringRecord, column: &str) -> String {
        self.index
            .get(column)
            .and_then(|&pos| record.get(pos))
            .map(|field| sanitize(strip_wrapping_quote(field)))
            .unwrap_or_default()
    }

    fn optional(&self, record: &csv::StringRecord, column: &str) -> Option<String> {
        Some(self.text(record, column)).filter(|value| !value.is_empty())
    }

    fn lead_from(&self, record: &csv::StringRecord) -> ParsedLead {
        ParsedLead {
            first_name: self.text(record, "first_name"),
            last_name: self.text(record, "last_name"),
            email: self.text(record, "email"),
            phone: self.optional(record, "phone"),
            company: self.optional(record, "company"),
            job_title: self.optional(record, "job_title"),
            notes: self.optional(record, "notes"),
            ..ParsedLead::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::csv_template;
    use crate::validate::EMAIL_INVALID;

    #[test]
    fn parses_valid_and_invalid_rows() {
        let raw = "first_name,last_name,email\nJane,Doe,jane@x.com\nBad,Row,not-an-email\n";
        let out = parse_csv(raw).expect("parse");

        assert_eq!(out.leads.len(), 2);
        assert!(out.skipped.is_empty());

        let jane = &out.leads[0];
        assert!(jane.is_valid);
        assert_eq!(jane.row_number, 2);
        assert_eq!(jane.email, "jane@x.com");

        let bad = &out.leads[1];
        assert!(!bad.is_valid);
        assert_eq!(bad.row_number, 3);
        assert_eq!(bad.validation_errors, vec![EMAIL_INVALID.to_string()]);

        assert_eq!(out.valid_count(), 1);
        assert_eq!(out.invalid_count(), 1);
    }

    #[test]
    fn empty_file_is_rejected() {
        for raw in ["", "\n\n", "   \n\t\n  "] {
            let err = parse_csv(raw).unwrap_err();
            assert!(matches!(err, LeadReviveError::EmptyFile), "{raw:?}: {err}");
        }
    }

    #[test]
    fn missing_required_columns_are_named() {
        let err = parse_csv("first_name,last_name,phone\nJane,Doe,555\n").unwrap_err();
        match err {
            LeadReviveError::MissingColumns { columns } => assert_eq!(columns, vec!["email"]),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_csv("name,mail\nJane,jane@x.com\n").unwrap_err();
        match err {
            LeadReviveError::MissingColumns { columns } => {
                assert_eq!(columns, vec!["first_name", "last_name", "email"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_matching_is_case_and_space_insensitive() {
        let raw = " First_Name , LAST_NAME ,\"Email\"\nJane,Doe,jane@x.com\n";
        let out = parse_csv(raw).expect("parse");
        assert_eq!(out.leads.len(), 1);
        assert!(out.leads[0].is_valid);
    }

    #[test]
    fn columns_may_appear_in_any_order() {
        let raw = "email,company,last_name,first_name\njane@x.com,Acme,Doe,Jane\n";
        let out = parse_csv(raw).expect("parse");
        let lead = &out.leads[0];
        assert_eq!(lead.first_name, "Jane");
        assert_eq!(lead.last_name, "Doe");
        assert_eq!(lead.company.as_deref(), Some("Acme"));
        assert_eq!(lead.phone, None);
    }

    #[test]
    fn mismatched_rows_are_reported_not_parsed() {
        let raw = "first_name,last_name,email\n\
                   Jane,Doe,jane@x.com\n\
                   Too,Many,fields@x.com,extra\n\
                   Short,row\n\
                   John,Roe,john@x.com\n";
        let out = parse_csv(raw).expect("parse");

        assert_eq!(out.leads.len(), 2);
        assert_eq!(out.leads[0].row_number, 2);
        assert_eq!(out.leads[1].row_number, 5);
        assert_eq!(
            out.skipped,
            vec![
                SkippedRow {
                    row_number: 3,
                    expected: 3,
                    found: 4
                },
                SkippedRow {
                    row_number: 4,
                    expected: 3,
                    found: 2
                },
            ]
        );
        assert_eq!(out.skipped[0].to_string(), "row 3: expected 3 columns, found 4");
    }

    #[test]
    fn blank_lines_are_ignored() {
        let raw = "\nfirst_name,last_name,email\n\n  \nJane,Doe,jane@x.com\n\n";
        let out = parse_csv(raw).expect("parse");
        assert_eq!(out.leads.len(), 1);
        assert_eq!(out.leads[0].row_number, 2);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn crlf_and_bom_are_accepted() {
        let raw = "\u{feff}first_name,last_name,email\r\nJane,Doe,jane@x.com\r\n";
        let out = parse_csv(raw).expect("parse");
        assert_eq!(out.leads.len(), 1);
        assert_eq!(out.leads[0].email, "jane@x.com");
        assert!(out.leads[0].is_valid);
    }

    #[test]
    fn bare_carriage_return_stays_inside_field() {
        let raw = "first_name,last_name,email,notes\r\n\r\nJane,Doe,jane@x.com,line1\rline2\r\n";
        let out = parse_csv(raw).expect("parse");
        assert!(out.skipped.is_empty());
        assert_eq!(out.leads.len(), 1);
        assert_eq!(out.leads[0].row_number, 2);
        assert_eq!(out.leads[0].notes.as_deref(), Some("line1\rline2"));
        assert!(out.leads[0].is_valid);
    }

    #[test]
    fn wrapping_quotes_and_markup_are_stripped() {
        let raw = "first_name,last_name,email,notes\n\"Jane\",\"Doe\",\"jane@x.com\",<b>VIP</b>; call\n";
        let out = parse_csv(raw).expect("parse");
        let lead = &out.leads[0];
        assert_eq!(lead.first_name, "Jane");
        assert_eq!(lead.last_name, "Doe");
        assert_eq!(lead.notes.as_deref(), Some("VIP call"));
        assert!(lead.is_valid);
    }

    #[test]
    fn quoted_commas_are_not_escaped() {
        // Known limitation: a quoted comma still splits the field.
        let raw = "first_name,last_name,email\n\"Doe, Jane\",Doe,jane@x.com\n";
        let out = parse_csv(raw).expect("parse");
        assert!(out.leads.is_empty());
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].found, 4);
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let out = parse_csv("first_name,last_name,email\n").expect("parse");
        assert!(out.leads.is_empty());
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn one_lead_per_matching_line() {
        let mut raw = String::from("first_name,last_name,email,phone\n");
        for i in 0..40 {
            raw.push_str(&format!("First{i},Last{i},user{i}@example.com,555-01{i:02}\n"));
            if i % 10 == 0 {
                raw.push('\n');
            }
        }
        let out = parse_csv(&raw).expect("parse");
        assert_eq!(out.leads.len(), 40);
        assert_eq!(out.valid_count(), 40);
        let rows: Vec<usize> = out.leads.iter().map(|l| l.row_number).collect();
        let expected: Vec<usize> = (2..42).collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn template_parses_cleanly() {
        let out = parse_csv(csv_template()).expect("parse template");
        assert_eq!(out.leads.len(), 2);
        assert_eq!(out.valid_count(), 2);
        assert_eq!(out.leads[1].company.as_deref(), Some("TechStart Inc"));
    }

    #[tokio::test]
    async fn load_lead_file_fingerprints_content() {
        let path = std::env::temp_dir().join(format!("lr_leads_{}.csv", uuid::Uuid::now_v7()));
        std::fs::write(&path, "first_name,last_name,email\nJane,Doe,jane@x.com\n").unwrap();

        let file = load_lead_file(&path).await.expect("load");
        assert_eq!(file.sha256.len(), 64);
        assert!(file.name.starts_with("lr_leads_"));
        assert!(file.content.contains("Jane"));

        let again = load_lead_file(&path).await.expect("load again");
        assert_eq!(file.sha256, again.sha256);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn load_lead_file_rejects_non_utf8() {
        let path = std::env::temp_dir().join(format!("lr_bin_{}.csv", uuid::Uuid::now_v7()));
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let err = load_lead_file(&path).await.unwrap_err();
        assert!(err.to_string().contains("UTF-8"));

        let _ = std::fs::remove_file(&path);
    }
}
