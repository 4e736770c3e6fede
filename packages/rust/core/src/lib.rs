//! Lead import pipeline for LeadRevive.
//!
//! This crate turns an uploaded lead file into validated candidates and
//! persists the valid subset in bounded, sequential batches:
//! - [`parser`]: header matching, row splitting, skipped-row accounting
//! - [`sanitize`] and [`validate`]: per-field cleanup and per-row checks
//! - [`import`]: the batch loop, progress reporting, and outcomes
//! - [`pipeline`]: end-to-end session with an import journal

pub mod import;
pub mod parser;
pub mod pipeline;
pub mod sanitize;
pub mod template;
pub mod validate;

pub use import::{
    BatchFailure, ImportOutcome, ImportProgressReporter, ImportReport, ImportRequest,
    ImportStatus, SilentProgress, import_leads,
};
pub use parser::{LeadFile, ParseOutput, SkippedRow, load_lead_file, parse_csv};
pub use pipeline::{ImportFileConfig, ImportFileResult, import_file, preview_file};
pub use sanitize::sanitize;
pub use template::csv_template;
pub use validate::validate;
