//! End-to-end import session: file -> parse -> journal -> batched import.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use leadrevive_shared::{ImportConfig, LeadSink, Result};
use leadrevive_storage::{ImportJob, Storage};

use crate::import::{ImportProgressReporter, ImportReport, ImportRequest, import_leads};
use crate::parser::{LeadFile, ParseOutput, load_lead_file, parse_csv};

/// Configuration for the `import_file` pipeline.
#[derive(Debug, Clone)]
pub struct ImportFileConfig {
    /// Lead file to import.
    pub path: PathBuf,
    /// Owner attached to every imported lead.
    pub owner_id: String,
    /// Explicit marketing consent from the caller.
    pub consent: bool,
    /// Batch size and lead defaults.
    pub import: ImportConfig,
    /// Where leads are going ("local" or "remote"), recorded on the job.
    pub sink_label: String,
}

/// Result of the `import_file` pipeline.
#[derive(Debug)]
pub struct ImportFileResult {
    /// Journal entry for this session.
    pub job_id: String,
    pub file_name: String,
    pub file_sha256: String,
    /// Everything the parser produced, including invalid and skipped rows.
    pub parsed: ParseOutput,
    pub report: ImportReport,
    /// An earlier session that imported a byte-identical file for the same owner.
    pub previous_import: Option<ImportJob>,
}

/// Read and parse a lead file without persisting anything.
pub async fn preview_file(path: &std::path::Path) -> Result<(LeadFile, ParseOutput)> {
    let file = load_lead_file(path).await?;
    let parsed = parse_csv(&file.content)?;
    Ok((file, parsed))
}

/// Run a full import session.
///
/// 1. Pre-flight: consent, owner, batch settings
/// 2. Read and fingerprint the file
/// 3. Parse and validate rows, then hand both to [`ImportProgressReporter::parsed`]
/// 4. Open a journal entry
/// 5. Send valid rows to `sink` in batches
/// 6. Close the journal entry with the final tallies
#[instrument(skip_all, fields(path = %config.path.display(), owner_id = %config.owner_id))]
pub async fn import_file<S: LeadSink>(
    config: &ImportFileConfig,
    sink: &S,
    journal: &Storage,
    progress: &dyn ImportProgressReporter,
    cancel: &CancellationToken,
) -> Result<ImportFileResult> {
    let request = ImportRequest::new(&config.owner_id, config.consent, config.import.clone());
    request.check()?;

    progress.phase("Reading file");
    let file = load_lead_file(&config.path).await?;

    progress.phase("Validating rows");
    let parsed = parse_csv(&file.content)?;
    progress.parsed(&file, &parsed);

    let previous_import = journal
        .find_import_by_hash(&config.owner_id, &file.sha256)
        .await?;
    if let Some(previous) = &previous_import {
        warn!(
            job_id = %previous.id,
            started_at = %previous.started_at,
            "this file was imported before for the same owner"
        );
    }

    let job_id = journal
        .insert_import_job(&config.owner_id, &file.name, &file.sha256, &config.sink_label)
        .await?;

    progress.phase("Importing leads");
    let report = match import_leads(&parsed.leads, &request, sink, progress, cancel).await {
        Ok(report) => report,
        Err(e) => {
            let stats = serde_json::json!({ "error": e.to_string() });
            if let Err(journal_err) = journal
                .finish_import_job(&job_id, "failed", &stats.to_string())
                .await
            {
                warn!(%job_id, error = %journal_err, "failed to record import failure");
            }
            return Err(e);
        }
    };

    let stats = serde_json::json!({
        "report": &report,
        "invalid_rows": parsed.invalid_count(),
        "skipped_rows": parsed.skipped.len(),
    });
    let status = serde_json::to_value(report.status)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "completed".to_string());
    // Leads are already persisted; a journal failure must not hide the report
    if let Err(e) = journal
        .finish_import_job(&job_id, &status, &stats.to_string())
        .await
    {
        warn!(%job_id, error = %e, "failed to record import result");
    }

    info!(
        %job_id,
        file = %file.name,
        successful = report.progress.successful,
        failed = report.progress.failed,
        "import session recorded"
    );

    Ok(ImportFileResult {
        job_id,
        file_name: file.name,
        file_sha256: file.sha256,
        parsed,
        report,
        previous_import,
    })
}
