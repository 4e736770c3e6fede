//! Batched, sequential persistence of validated leads.
//!
//! Leads are split into contiguous batches that are submitted one at a
//! time; batch N resolves (success or failure) before batch N+1 is sent.
//! A failing batch is recorded and the loop moves on. Only fatal sink
//! errors and cancellation stop the loop early.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use leadrevive_shared::{
    ImportConfig, ImportProgress, LeadReviveError, LeadSink, NewLead, ParsedLead, Result,
};

use crate::parser::{LeadFile, ParseOutput};

/// Diagnostic shown when nothing was imported and no batch reported a reason.
const GENERIC_FAILURE: &str = "No leads were imported";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Parameters for one import session.
///
/// There is no `Default`: callers state consent explicitly.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// User that will own every imported lead.
    pub owner_id: String,
    /// The caller asserts a lawful basis to contact these leads.
    pub consent: bool,
    /// Batch size, provenance tag, initial score, diagnostic cap.
    pub config: ImportConfig,
}

impl ImportRequest {
    pub fn new(owner_id: impl Into<String>, consent: bool, config: ImportConfig) -> Self {
        Self {
            owner_id: owner_id.into(),
            consent,
            config,
        }
    }

    /// Pre-flight checks. Nothing is sent to the sink when this fails.
    pub fn check(&self) -> Result<()> {
        if !self.consent {
            return Err(LeadReviveError::ConsentRequired);
        }
        if self.owner_id.trim().is_empty() {
            return Err(LeadReviveError::validation("owner id must not be empty"));
        }
        self.config.validate()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// How an import session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    /// Every batch was attempted.
    Completed,
    /// The cancellation token fired between batches.
    Cancelled,
    /// A fatal sink error stopped the loop.
    Aborted,
}

/// A batch the store rejected, in whole or in part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// 0-based batch position.
    pub batch_index: usize,
    /// Row number of the first lead in the batch.
    pub first_row: usize,
    /// Row number of the last lead in the batch.
    pub last_row: usize,
    /// Rows counted as failed for this batch.
    pub rows: usize,
    /// Store error message.
    pub message: String,
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Batch {} (rows {}-{}): {}",
            self.batch_index + 1,
            self.first_row,
            self.last_row,
            self.message
        )
    }
}

/// Final tallies for an import session.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub status: ImportStatus,
    pub progress: ImportProgress,
    /// Batch-level failures in submission order.
    pub failures: Vec<BatchFailure>,
    /// Insert calls issued.
    pub batches_sent: usize,
    /// Invalid rows passed in and ignored.
    pub ignored_invalid: usize,
    pub elapsed_ms: u64,
    #[serde(skip)]
    error_preview_limit: usize,
}

/// User-facing summary of an [`ImportReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Every row was confirmed.
    Success { imported: usize },
    /// Some rows were confirmed; `errors` holds the first few diagnostics.
    PartialSuccess {
        imported: usize,
        failed: usize,
        errors: Vec<String>,
    },
    /// Nothing was confirmed.
    Failure { errors: Vec<String> },
}

impl ImportReport {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Summarize for display, capping diagnostics at the configured limit.
    pub fn outcome(&self) -> ImportOutcome {
        let errors: Vec<String> = self
            .failures
            .iter()
            .take(self.error_preview_limit)
            .map(ToString::to_string)
            .collect();

        if self.progress.successful == 0 {
            let errors = if errors.is_empty() {
                vec![GENERIC_FAILURE.to_string()]
            } else {
                errors
            };
            return ImportOutcome::Failure { errors };
        }

        if self.progress.failed == 0 && self.status == ImportStatus::Completed {
            ImportOutcome::Success {
                imported: self.progress.successful,
            }
        } else {
            ImportOutcome::PartialSuccess {
                imported: self.progress.successful,
                failed: self.progress.failed,
                errors,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Callback for reporting import status.
pub trait ImportProgressReporter: Send + Sync {
    /// Called when entering a new phase (reading, parsing, importing).
    fn phase(&self, name: &str);
    /// Called once the file is read and parsed, before any journal write.
    fn parsed(&self, _file: &LeadFile, _output: &ParseOutput) {}
    /// Called once before the first batch.
    fn started(&self, progress: &ImportProgress, batches: usize);
    /// Called after every batch with the updated counters.
    fn progress(&self, progress: &ImportProgress);
    /// Called when the session ends, however it ends.
    fn done(&self, report: &ImportReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ImportProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn started(&self, _progress: &ImportProgress, _batches: usize) {}
    fn progress(&self, _progress: &ImportProgress) {}
    fn done(&self, _report: &ImportReport) {}
}

// ---------------------------------------------------------------------------
// Import loop
// ---------------------------------------------------------------------------

/// Persist the valid subset of `leads` through `sink`, one batch at a time.
///
/// Fails up front (without touching the sink) when consent is missing, the
/// request is malformed, or there is nothing valid to import. Once batches
/// start, store errors are recorded in the report instead of returned.
#[instrument(skip_all, fields(owner_id = %request.owner_id, batch_size = request.config.batch_size))]
pub async fn import_leads<S: LeadSink>(
    leads: &[ParsedLead],
    request: &ImportRequest,
    sink: &S,
    progress: &dyn ImportProgressReporter,
    cancel: &CancellationToken,
) -> Result<ImportReport> {
    if let Err(e) = request.check() {
        warn!(error = %e, "import refused");
        return Err(e);
    }

    let valid: Vec<&ParsedLead> = leads.iter().filter(|lead| lead.is_valid).collect();
    let ignored_invalid = leads.len() - valid.len();
    if valid.is_empty() {
        return Err(LeadReviveError::validation("no valid leads to import"));
    }

    let start = Instant::now();
    let batch_size = request.config.batch_size;
    let batch_count = valid.len().div_ceil(batch_size);
    let mut state = ImportProgress::new(valid.len());
    let mut failures: Vec<BatchFailure> = Vec::new();
    let mut status = ImportStatus::Completed;
    let mut batches_sent = 0;

    info!(
        total = state.total,
        batches = batch_count,
        ignored_invalid,
        "starting import"
    );
    progress.started(&state, batch_count);

    for (batch_index, batch) in valid.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            info!(batch_index, processed = state.processed, "import cancelled");
            status = ImportStatus::Cancelled;
            break;
        }

        let rows = batch.len();
        let first_row = batch.first().map_or(0, |lead| lead.row_number);
        let last_row = batch.last().map_or(0, |lead| lead.row_number);
        let payload: Vec<NewLead> = batch
            .iter()
            .map(|lead| {
                NewLead::from_parsed(
                    lead,
                    &request.owner_id,
                    &request.config.source,
                    request.config.lead_score,
                )
            })
            .collect();

        batches_sent += 1;
        let mut fatal = false;

        match sink.insert_batch(&payload).await {
            Ok(confirmed) => {
                let confirmed = confirmed.unwrap_or(rows).min(rows);
                state.successful += confirmed;

                if confirmed < rows {
                    let missing = rows - confirmed;
                    warn!(batch_index, rows, confirmed, "store confirmed fewer rows than sent");
                    state.failed += missing;
                    failures.push(BatchFailure {
                        batch_index,
                        first_row,
                        last_row,
                        rows: missing,
                        message: format!("store confirmed {confirmed} of {rows} rows"),
                    });
                } else {
                    debug!(batch_index, rows, "batch inserted");
                }
            }
            Err(e) => {
                warn!(batch_index, rows, error = %e, "batch insert failed");
                state.failed += rows;
                fatal = e.is_fatal();
                failures.push(BatchFailure {
                    batch_index,
                    first_row,
                    last_row,
                    rows,
                    message: e.to_string(),
                });
            }
        }

        state.processed += rows;
        progress.progress(&state);

        if fatal {
            warn!(batch_index, "fatal store error, stopping import");
            status = ImportStatus::Aborted;
            break;
        }
    }

    let report = ImportReport {
        status,
        progress: state,
        failures,
        batches_sent,
        ignored_invalid,
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        error_preview_limit: request.config.error_preview_limit,
    };

    progress.done(&report);

    info!(
        status = ?report.status,
        total = report.progress.total,
        successful = report.progress.successful,
        failed = report.progress.failed,
        batches = report.batches_sent,
        elapsed_ms = report.elapsed_ms,
        "import finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use leadrevive_shared::{AppConfig, LeadStatus};

    use super::*;
    use crate::parser::parse_csv;

    /// In-memory sink that records every batch and can be told to fail some.
    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<NewLead>>>,
        fail_batches: HashSet<usize>,
        fatal_batches: HashSet<usize>,
        confirm: Option<usize>,
        echo_counts: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingSink {
        fn echoing() -> Self {
            Self {
                echo_counts: true,
                ..Self::default()
            }
        }

        fn sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }

        fn calls(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    impl LeadSink for RecordingSink {
        async fn insert_batch(&self, batch: &[NewLead]) -> Result<Option<usize>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let index = {
                let mut batches = self.batches.lock().unwrap();
                batches.push(batch.to_vec());
                batches.len() - 1
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fatal_batches.contains(&index) {
                return Err(LeadReviveError::Unauthorized("JWT expired".into()));
            }
            if self.fail_batches.contains(&index) {
                return Err(LeadReviveError::Storage(
                    "UNIQUE constraint failed: leads.user_id, leads.email".into(),
                ));
            }
            if let Some(confirm) = self.confirm {
                return Ok(Some(confirm));
            }
            Ok(self.echo_counts.then_some(batch.len()))
        }
    }

    /// Captures every snapshot the import loop emits.
    #[derive(Default)]
    struct CapturingProgress {
        snapshots: Mutex<Vec<ImportProgress>>,
        started: Mutex<Option<usize>>,
        done: AtomicUsize,
    }

    impl ImportProgressReporter for CapturingProgress {
        fn phase(&self, _name: &str) {}
        fn started(&self, _progress: &ImportProgress, batches: usize) {
            *self.started.lock().unwrap() = Some(batches);
        }
        fn progress(&self, progress: &ImportProgress) {
            self.snapshots.lock().unwrap().push(*progress);
        }
        fn done(&self, _report: &ImportReport) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn valid_leads(count: usize) -> Vec<ParsedLead> {
        (0..count)
            .map(|i| ParsedLead {
                first_name: format!("First{i}"),
                last_name: format!("Last{i}"),
                email: format!("user{i}@example.com"),
                row_number: i + 2,
                is_valid: true,
                ..ParsedLead::default()
            })
            .collect()
    }

    fn request(consent: bool) -> ImportRequest {
        ImportRequest::new("user-1", consent, ImportConfig::from(&AppConfig::default()))
    }

    async fn run(leads: &[ParsedLead], sink: &RecordingSink) -> ImportReport {
        import_leads(
            leads,
            &request(true),
            sink,
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .expect("import")
    }

    #[tokio::test]
    async fn refuses_without_consent() {
        let sink = RecordingSink::default();
        let err = import_leads(
            &valid_leads(3),
            &request(false),
            &sink,
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LeadReviveError::ConsentRequired));
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn rejects_empty_owner_and_zero_batch_size() {
        let sink = RecordingSink::default();
        let leads = valid_leads(1);

        let mut req = request(true);
        req.owner_id = "  ".into();
        let err = import_leads(&leads, &req, &sink, &SilentProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("owner id"));

        let mut req = request(true);
        req.config.batch_size = 0;
        let err = import_leads(&leads, &req, &sink, &SilentProgress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("batch_size"));

        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn nothing_valid_is_an_error() {
        let sink = RecordingSink::default();
        let mut leads = valid_leads(2);
        for lead in &mut leads {
            lead.is_valid = false;
        }
        let err = import_leads(
            &leads,
            &request(true),
            &sink,
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no valid leads"));
        assert_eq!(sink.calls(), 0);
    }

    #[tokio::test]
    async fn splits_into_ordered_sequential_batches() {
        let sink = RecordingSink::echoing();
        let leads = valid_leads(120);
        let report = run(&leads, &sink).await;

        assert_eq!(sink.sizes(), vec![50, 50, 20]);
        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(report.batches_sent, 3);

        let emails: Vec<String> = sink
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|lead| lead.email.clone())
            .collect();
        let expected: Vec<String> = leads.iter().map(|lead| lead.email.clone()).collect();
        assert_eq!(emails, expected);

        assert_eq!(report.status, ImportStatus::Completed);
        assert_eq!(report.progress.processed, 120);
        assert_eq!(report.progress.successful, 120);
        assert_eq!(report.outcome(), ImportOutcome::Success { imported: 120 });
    }

    #[tokio::test]
    async fn payload_carries_owner_and_defaults() {
        let sink = RecordingSink::default();
        let mut leads = valid_leads(1);
        leads[0].company = Some("Acme".into());
        run(&leads, &sink).await;

        let batches = sink.batches.lock().unwrap();
        let lead = &batches[0][0];
        assert_eq!(lead.user_id, "user-1");
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.lead_score, 50);
        assert_eq!(lead.source, "csv_import");
        assert_eq!(lead.company.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn failed_batches_do_not_stop_later_ones() {
        let sink = RecordingSink {
            fail_batches: HashSet::from([1]),
            ..RecordingSink::echoing()
        };
        let report = run(&valid_leads(120), &sink).await;

        assert_eq!(sink.calls(), 3);
        assert_eq!(report.status, ImportStatus::Completed);
        assert_eq!(report.progress.successful, 70);
        assert_eq!(report.progress.failed, 50);
        assert_eq!(report.progress.processed, report.progress.total);
        assert_eq!(
            report.progress.successful + report.progress.failed,
            report.progress.total
        );

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].first_row, 52);
        assert_eq!(report.failures[0].last_row, 101);

        match report.outcome() {
            ImportOutcome::PartialSuccess {
                imported,
                failed,
                errors,
            } => {
                assert_eq!(imported, 70);
                assert_eq!(failed, 50);
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("Batch 2 (rows 52-101)"));
                assert!(errors[0].contains("UNIQUE constraint failed"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn total_failure_caps_diagnostics() {
        let sink = RecordingSink {
            fail_batches: (0..8).collect(),
            ..RecordingSink::default()
        };
        let mut req = request(true);
        req.config.batch_size = 10;
        let report = import_leads(
            &valid_leads(80),
            &req,
            &sink,
            &SilentProgress,
            &CancellationToken::new(),
        )
        .await
        .expect("import");

        assert_eq!(sink.calls(), 8);
        assert_eq!(report.progress.successful, 0);
        assert_eq!(report.progress.failed, 80);
        match report.outcome() {
            ImportOutcome::Failure { errors } => assert_eq!(errors.len(), 5),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_row_counts_fall_back_to_batch_size() {
        let sink = RecordingSink::default();
        let report = run(&valid_leads(7), &sink).await;
        assert_eq!(report.progress.successful, 7);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn short_confirmation_counts_remainder_as_failed() {
        let sink = RecordingSink {
            confirm: Some(3),
            ..RecordingSink::default()
        };
        let report = run(&valid_leads(5), &sink).await;
        assert_eq!(report.progress.successful, 3);
        assert_eq!(report.progress.failed, 2);
        assert_eq!(report.progress.processed, 5);
        assert!(report.failures[0].message.contains("confirmed 3 of 5"));
    }

    #[tokio::test]
    async fn invalid_rows_are_never_sent() {
        let raw = "first_name,last_name,email\nJane,Doe,jane@x.com\nBad,Row,not-an-email\n";
        let parsed = parse_csv(raw).expect("parse");
        let sink = RecordingSink::echoing();

        let report = run(&parsed.leads, &sink).await;

        assert_eq!(sink.calls(), 1);
        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].email, "jane@x.com");
        assert_eq!(report.ignored_invalid, 1);
        assert_eq!(report.progress.total, 1);
    }

    #[tokio::test]
    async fn progress_is_emitted_after_every_batch() {
        let sink = RecordingSink {
            fail_batches: HashSet::from([0]),
            ..RecordingSink::echoing()
        };
        let reporter = CapturingProgress::default();
        let mut req = request(true);
        req.config.batch_size = 4;

        import_leads(
            &valid_leads(10),
            &req,
            &sink,
            &reporter,
            &CancellationToken::new(),
        )
        .await
        .expect("import");

        assert_eq!(*reporter.started.lock().unwrap(), Some(3));
        assert_eq!(reporter.done.load(Ordering::SeqCst), 1);

        let snapshots = reporter.snapshots.lock().unwrap();
        let processed: Vec<usize> = snapshots.iter().map(|s| s.processed).collect();
        assert_eq!(processed, vec![4, 8, 10]);
        assert!(snapshots.iter().all(|s| s.total == 10));
        assert!(snapshots.windows(2).all(|w| {
            w[0].successful <= w[1].successful && w[0].failed <= w[1].failed
        }));
        assert_eq!(snapshots[0].failed, 4);
    }

    #[tokio::test]
    async fn fatal_error_stops_the_loop() {
        let sink = RecordingSink {
            fatal_batches: HashSet::from([1]),
            ..RecordingSink::echoing()
        };
        let report = run(&valid_leads(150), &sink).await;

        assert_eq!(sink.calls(), 2);
        assert_eq!(report.status, ImportStatus::Aborted);
        assert_eq!(report.progress.successful, 50);
        assert_eq!(report.progress.failed, 50);
        assert_eq!(report.progress.processed, 100);
        assert!(matches!(report.outcome(), ImportOutcome::PartialSuccess { .. }));
    }

    /// Cancels the token as soon as the first batch is acknowledged.
    struct CancelAfterFirst {
        token: CancellationToken,
    }

    impl ImportProgressReporter for CancelAfterFirst {
        fn phase(&self, _name: &str) {}
        fn started(&self, _progress: &ImportProgress, _batches: usize) {}
        fn progress(&self, _progress: &ImportProgress) {
            self.token.cancel();
        }
        fn done(&self, _report: &ImportReport) {}
    }

    #[tokio::test]
    async fn cancellation_is_honored_between_batches() {
        let sink = RecordingSink::echoing();
        let token = CancellationToken::new();
        let reporter = CancelAfterFirst {
            token: token.clone(),
        };

        let report = import_leads(&valid_leads(120), &request(true), &sink, &reporter, &token)
            .await
            .expect("import");

        assert_eq!(sink.calls(), 1);
        assert_eq!(report.status, ImportStatus::Cancelled);
        assert_eq!(report.progress.processed, 50);
        assert_eq!(report.progress.total, 120);
        assert!(matches!(report.outcome(), ImportOutcome::PartialSuccess { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let sink = RecordingSink::echoing();
        let token = CancellationToken::new();
        token.cancel();

        let report = import_leads(&valid_leads(3), &request(true), &sink, &SilentProgress, &token)
            .await
            .expect("import");

        assert_eq!(sink.calls(), 0);
        assert_eq!(report.status, ImportStatus::Cancelled);
        assert_eq!(
            report.outcome(),
            ImportOutcome::Failure {
                errors: vec![GENERIC_FAILURE.to_string()]
            }
        );
    }
}
