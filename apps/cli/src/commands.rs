//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadrevive_backend::BackendClient;
use leadrevive_core::{
    ImportFileConfig, ImportOutcome, ImportProgressReporter, ImportReport, ImportRequest,
    ImportStatus, LeadFile, ParseOutput, csv_template, import_file, preview_file,
};
use leadrevive_shared::{
    AppConfig, ImportConfig, ImportProgress, Lead, LeadStatus, SinkKind, database_path,
    init_config, load_config,
};
use leadrevive_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Invalid rows listed before an import starts.
const INVALID_PREVIEW_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadRevive: import and manage sales leads.
#[derive(Parser)]
#[command(
    name = "leadrevive",
    version,
    about = "Import CSV lead lists and manage your lead store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Lead destination selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum SinkArg {
    Local,
    Remote,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Local => SinkKind::Local,
            SinkArg::Remote => SinkKind::Remote,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import a CSV lead file.
    Import {
        /// CSV file to import.
        file: PathBuf,

        /// Owner id attached to every lead (defaults to [defaults].owner_id).
        #[arg(long)]
        owner: Option<String>,

        /// Confirm these contacts consented to marketing communication.
        #[arg(long)]
        consent: bool,

        /// Rows per insert request (defaults to [import].batch_size).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Where to write leads (defaults to [defaults].sink).
        #[arg(long)]
        sink: Option<SinkArg>,

        /// Local database path (defaults to [storage].database_path).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Parse and validate a CSV lead file without importing it.
    Validate {
        /// CSV file to check.
        file: PathBuf,
    },

    /// Write the CSV import template.
    Template {
        /// Output file (prints to stdout when omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Query and update stored leads.
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },

    /// Manage the local suppression list.
    Suppress {
        #[command(subcommand)]
        action: SuppressAction,
    },

    /// Inspect the local import journal.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Lead subcommands.
#[derive(Subcommand)]
pub(crate) enum LeadsAction {
    /// List leads, newest first.
    List {
        /// Owner id (defaults to [defaults].owner_id).
        #[arg(long)]
        owner: Option<String>,

        /// Only show leads with this status.
        #[arg(long)]
        status: Option<LeadStatus>,

        /// Maximum number of leads to show.
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Read from the local database or the hosted backend.
        #[arg(long)]
        sink: Option<SinkArg>,

        /// Local database path.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Set the status of a lead in the local database.
    SetStatus {
        /// Lead id.
        id: String,

        /// New status.
        status: LeadStatus,

        /// Local database path.
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Suppression list subcommands.
#[derive(Subcommand)]
pub(crate) enum SuppressAction {
    /// Add an email address.
    Add {
        email: String,

        /// Why the address is suppressed.
        #[arg(long)]
        reason: Option<String>,

        /// Local database path.
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Check whether an email address is suppressed.
    Check {
        email: String,

        /// Local database path.
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Import journal subcommands.
#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List import sessions, newest first.
    List {
        /// Owner id (defaults to [defaults].owner_id).
        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value = "20")]
        limit: u32,

        /// Local database path.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadrevive=info",
        1 => "leadrevive=debug",
        _ => "leadrevive=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Import {
            file,
            owner,
            consent,
            batch_size,
            sink,
            db,
        } => cmd_import(&file, owner, consent, batch_size, sink, db).await,
        Command::Validate { file } => cmd_validate(&file).await,
        Command::Template { out } => cmd_template(out.as_deref()),
        Command::Leads { action } => match action {
            LeadsAction::List {
                owner,
                status,
                limit,
                sink,
                db,
                json,
            } => cmd_leads_list(owner, status, limit, sink, db, json).await,
            LeadsAction::SetStatus { id, status, db } => cmd_leads_set_status(&id, status, db).await,
        },
        Command::Suppress { action } => match action {
            SuppressAction::Add { email, reason, db } => {
                cmd_suppress_add(&email, reason.as_deref(), db).await
            }
            SuppressAction::Check { email, db } => cmd_suppress_check(&email, db).await,
        },
        Command::Jobs { action } => match action {
            JobsAction::List {
                owner,
                limit,
                db,
                json,
            } => cmd_jobs_list(owner, limit, db, json).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn resolve_owner(owner: Option<String>, config: &AppConfig) -> Result<String> {
    owner
        .or_else(|| config.defaults.owner_id.clone())
        .ok_or_else(|| eyre!("no owner id: pass --owner or set [defaults].owner_id in leadrevive.toml"))
}

fn resolve_db(db: Option<PathBuf>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(database_path(config)?),
    }
}

fn resolve_sink(sink: Option<SinkArg>, config: &AppConfig) -> SinkKind {
    sink.map(SinkKind::from).unwrap_or(config.defaults.sink)
}

fn sink_label(kind: SinkKind) -> &'static str {
    match kind {
        SinkKind::Local => "local",
        SinkKind::Remote => "remote",
    }
}

/// Print counts plus the first few invalid and skipped rows.
fn print_parse_summary(parsed: &ParseOutput, max_rows: Option<usize>) {
    println!("  Rows:    {}", parsed.leads.len());
    println!("  Valid:   {}", parsed.valid_count());
    println!("  Invalid: {}", parsed.invalid_count());
    if !parsed.skipped.is_empty() {
        println!("  Skipped: {} (column count mismatch)", parsed.skipped.len());
    }

    let limit = max_rows.unwrap_or(usize::MAX);
    let invalid: Vec<_> = parsed.leads.iter().filter(|l| !l.is_valid).collect();
    if !invalid.is_empty() {
        println!();
        for lead in invalid.iter().take(limit) {
            println!(
                "  row {}: {}",
                lead.row_number,
                lead.validation_errors.join("; ")
            );
        }
        if invalid.len() > limit {
            println!("  ... and {} more invalid rows", invalid.len() - limit);
        }
    }

    for skipped in parsed.skipped.iter().take(limit) {
        println!("  {skipped}");
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_import(
    file: &Path,
    owner: Option<String>,
    consent: bool,
    batch_size: Option<usize>,
    sink: Option<SinkArg>,
    db: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let owner_id = resolve_owner(owner, &config)?;
    let sink_kind = resolve_sink(sink, &config);

    let mut import = ImportConfig::from(&config);
    if let Some(n) = batch_size {
        import.batch_size = n;
    }

    let import_config = ImportFileConfig {
        path: file.to_path_buf(),
        owner_id,
        consent,
        import,
        sink_label: sink_label(sink_kind).to_string(),
    };

    // Fail fast on consent and settings before opening the database
    ImportRequest::new(
        &import_config.owner_id,
        import_config.consent,
        import_config.import.clone(),
    )
    .check()?;

    let journal = Storage::open(&resolve_db(db, &config)?).await?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            ctrl_c_token.cancel();
        }
    });

    info!(
        file = %file.display(),
        owner_id = %import_config.owner_id,
        sink = import_config.sink_label,
        "starting import"
    );

    let reporter = CliProgress::new();
    // LeadSink is not dyn-compatible, so each sink gets its own call
    let result = match sink_kind {
        SinkKind::Local => {
            import_file(&import_config, &journal, &journal, &reporter, &cancel).await?
        }
        SinkKind::Remote => {
            let client = BackendClient::from_config(&config)?;
            import_file(&import_config, &client, &journal, &reporter, &cancel).await?
        }
    };

    if let Some(previous) = &result.previous_import {
        println!(
            "  Note: this file was already imported on {} (job {}).",
            previous.started_at.format("%Y-%m-%d %H:%M"),
            previous.id
        );
    }

    let report = &result.report;
    match report.status {
        ImportStatus::Completed => {}
        ImportStatus::Cancelled => println!("  Import cancelled before all batches were sent."),
        ImportStatus::Aborted => println!("  Import stopped after a fatal error."),
    }

    println!();
    println!("  Job:     {}", result.job_id);
    println!(
        "  Time:    {:.1}s",
        report.elapsed().as_secs_f64()
    );

    match report.outcome() {
        ImportOutcome::Success { imported } => {
            println!("  Successfully imported {imported} leads.");
            println!();
            Ok(())
        }
        ImportOutcome::PartialSuccess {
            imported,
            failed,
            errors,
        } => {
            println!("  Imported {imported} leads, {failed} failed.");
            for error in &errors {
                println!("    {error}");
            }
            println!();
            Ok(())
        }
        ImportOutcome::Failure { errors } => {
            for error in &errors {
                println!("    {error}");
            }
            println!();
            Err(eyre!("import failed: no leads were imported"))
        }
    }
}

async fn cmd_validate(file: &Path) -> Result<()> {
    let (lead_file, parsed) = preview_file(file).await?;
    info!(file = %lead_file.name, sha256 = %lead_file.sha256, "validated lead file");

    println!();
    println!("  File:    {}", lead_file.name);
    print_parse_summary(&parsed, None);
    println!();
    Ok(())
}

fn cmd_template(out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, csv_template())?;
            println!("Template written to: {}", path.display());
        }
        None => print!("{}", csv_template()),
    }
    Ok(())
}

async fn cmd_leads_list(
    owner: Option<String>,
    status: Option<LeadStatus>,
    limit: u32,
    sink: Option<SinkArg>,
    db: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let owner_id = resolve_owner(owner, &config)?;

    let leads = match resolve_sink(sink, &config) {
        SinkKind::Local => {
            let storage = Storage::open_readonly(&resolve_db(db, &config)?).await?;
            storage.list_leads(&owner_id, status, limit).await?
        }
        SinkKind::Remote => {
            let client = BackendClient::from_config(&config)?;
            client.list_leads(&owner_id, status, limit).await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&leads)?);
        return Ok(());
    }

    if leads.is_empty() {
        println!("No leads found.");
        return Ok(());
    }
    for lead in &leads {
        print_lead(lead);
    }
    Ok(())
}

fn print_lead(lead: &Lead) {
    println!(
        "{}  {:<16} {:>3}  {} {} <{}>{}",
        lead.id,
        lead.status.as_str(),
        lead.lead_score,
        lead.first_name,
        lead.last_name,
        lead.email,
        lead.company
            .as_deref()
            .map(|c| format!(" @ {c}"))
            .unwrap_or_default()
    );
}

async fn cmd_leads_set_status(id: &str, status: LeadStatus, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&resolve_db(db, &config)?).await?;
    if !storage.update_lead_status(id, status).await? {
        return Err(eyre!("no lead with id '{id}'"));
    }
    println!("Lead {id} marked {status}.");
    Ok(())
}

async fn cmd_suppress_add(email: &str, reason: Option<&str>, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&resolve_db(db, &config)?).await?;
    storage.add_suppression(email, reason).await?;
    println!("Suppressed: {email}");
    Ok(())
}

async fn cmd_suppress_check(email: &str, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&resolve_db(db, &config)?).await?;
    if storage.is_suppressed(email).await? {
        println!("{email} is suppressed.");
    } else {
        println!("{email} is not suppressed.");
    }
    Ok(())
}

async fn cmd_jobs_list(
    owner: Option<String>,
    limit: u32,
    db: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let owner_id = resolve_owner(owner, &config)?;
    let storage = Storage::open_readonly(&resolve_db(db, &config)?).await?;
    let jobs = storage.list_import_jobs(&owner_id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No imports recorded.");
        return Ok(());
    }
    for job in &jobs {
        println!(
            "{}  {}  {:<10} {:<6} {}",
            job.id,
            job.started_at.format("%Y-%m-%d %H:%M"),
            job.status.as_deref().unwrap_or("running"),
            job.sink,
            job.file_name
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: a spinner for phases, then a bar over rows.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid spinner template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }
}

impl ImportProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn parsed(&self, file: &LeadFile, output: &ParseOutput) {
        self.bar.suspend(|| {
            println!();
            println!("  File:    {}", file.name);
            print_parse_summary(output, Some(INVALID_PREVIEW_ROWS));
            println!();
        });
    }

    fn started(&self, progress: &ImportProgress, batches: usize) {
        self.bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} rows {msg}")
                .expect("valid bar template"),
        );
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(0);
        self.bar.set_message(format!("({batches} batches)"));
    }

    fn progress(&self, progress: &ImportProgress) {
        self.bar.set_position(progress.processed as u64);
        self.bar.set_message(format!(
            "{}% | {} ok, {} failed",
            progress.percent(),
            progress.successful,
            progress.failed
        ));
    }

    fn done(&self, _report: &ImportReport) {
        self.bar.finish_and_clear();
    }
}
