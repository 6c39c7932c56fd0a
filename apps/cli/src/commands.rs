//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use articleforge_core::{
    AttributeRanker, BriefSource, JsonBriefFile, Orchestrator, ProgressReporter, RunOutcome,
    SectionOutcome,
};
use articleforge_providers::ProviderGateway;
use articleforge_rules::AuditEngine;
use articleforge_shared::{
    AppConfig, AuditReport, Brief, JobId, PassName, PipelineConfig, init_config, load_config,
    validate_providers,
};
use articleforge_storage::{CachedStore, JobStore, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ArticleForge: generate rule-compliant long-form articles from briefs.
#[derive(Parser)]
#[command(
    name = "articleforge",
    version,
    about = "Generate long-form articles from structured content briefs in eight resumable passes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Job database path (defaults to `defaults.db_path` from config).
    #[arg(long, global = true, env = "ARTICLEFORGE_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start or continue the job for a brief.
    Generate {
        /// Brief JSON file.
        #[arg(long)]
        brief: PathBuf,
    },

    /// Resume a paused or failed job.
    Resume {
        /// Job ID.
        #[arg(long)]
        job: JobId,

        /// Brief JSON file the job was started from.
        #[arg(long)]
        brief: PathBuf,
    },

    /// Pause a job. A running generation stops at its next boundary.
    Pause {
        #[arg(long)]
        job: JobId,
    },

    /// Cancel a job. Cancelled jobs cannot be resumed.
    Cancel {
        #[arg(long)]
        job: JobId,
    },

    /// Show job state and per-section progress.
    Status {
        #[arg(long)]
        job: JobId,
    },

    /// Audit a finished draft against a brief without generating anything.
    Audit {
        #[arg(long)]
        brief: PathBuf,

        /// Markdown draft to score.
        #[arg(long)]
        draft: PathBuf,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a job's draft to a file or stdout.
    Export {
        #[arg(long)]
        job: JobId,

        /// Output file (defaults to stdout).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "articleforge=info",
        1 => "articleforge=debug",
        _ => "articleforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    let db = cli.db;
    match cli.command {
        Command::Generate { brief } => cmd_generate(db.as_deref(), &brief).await,
        Command::Resume { job, brief } => cmd_resume(db.as_deref(), &job, &brief).await,
        Command::Pause { job } => cmd_pause(db.as_deref(), &job).await,
        Command::Cancel { job } => cmd_cancel(db.as_deref(), &job).await,
        Command::Status { job } => cmd_status(db.as_deref(), &job).await,
        Command::Audit { brief, draft, json } => cmd_audit(&brief, &draft, json),
        Command::Export { job, out } => cmd_export(db.as_deref(), &job, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

async fn open_store(config: &AppConfig, db: Option<&Path>) -> Result<Arc<dyn JobStore>> {
    let path = match db {
        Some(p) => p.to_path_buf(),
        None => expand_home(&config.defaults.db_path),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("cannot create {}", parent.display()))?;
    }
    let storage = Storage::open(&path).await?;
    let ttl = PipelineConfig::from(config).section_cache_ttl;
    info!(path = %path.display(), "job database opened");
    Ok(Arc::new(CachedStore::new(storage, ttl)))
}

/// Orchestrator with the configured providers.
async fn orchestrator(db: Option<&Path>) -> Result<Orchestrator> {
    let config = load_config()?;
    validate_providers(&config)?;
    let gateway = ProviderGateway::from_config(&config)?;
    info!(route = %gateway.route_key(), "providers ready");
    let store = open_store(&config, db).await?;
    Ok(Orchestrator::new(store, Arc::new(gateway), PipelineConfig::from(&config)))
}

/// Orchestrator for commands that only read or flag jobs and never call a
/// provider.
async fn store_orchestrator(db: Option<&Path>) -> Result<Orchestrator> {
    let config = load_config()?;
    let store = open_store(&config, db).await?;
    Ok(Orchestrator::new(
        store,
        Arc::new(ProviderGateway::new(Vec::new())),
        PipelineConfig::from(&config),
    ))
}

fn load_brief(path: &Path) -> Result<Brief> {
    JsonBriefFile::new(path)
        .load()
        .wrap_err_with(|| format!("cannot load brief {}", path.display()))
}

// ---------------------------------------------------------------------------
// Generation commands
// ---------------------------------------------------------------------------

async fn cmd_generate(db: Option<&Path>, brief_path: &Path) -> Result<()> {
    let brief = load_brief(brief_path)?;
    let orch = orchestrator(db).await?;
    let job = orch.prepare(&brief).await?;

    info!(job_id = %job.id, brief_id = %brief.id, status = %job.status, "generating");
    println!("Job {}", job.id);

    drive(&orch, &job.id, &brief, false).await
}

async fn cmd_resume(db: Option<&Path>, job_id: &JobId, brief_path: &Path) -> Result<()> {
    let brief = load_brief(brief_path)?;
    let orch = orchestrator(db).await?;
    drive(&orch, job_id, &brief, true).await
}

/// Run or resume a job until it finishes or stops. Ctrl-C requests a pause
/// at the next section or pass boundary.
async fn drive(orch: &Orchestrator, job_id: &JobId, brief: &Brief, resume: bool) -> Result<()> {
    let progress = CliProgress::new();

    let run = async {
        if resume {
            orch.resume(job_id, brief, &progress).await
        } else {
            orch.run(job_id, brief, &progress).await
        }
    };
    tokio::pin!(run);

    let outcome = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            progress.phase("Pausing at the next boundary...");
            orch.request_pause(job_id);
            run.await
        }
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.abandon();
            return Err(e).wrap_err(format!(
                "job {job_id} stopped; run `articleforge resume --job {job_id}` to retry"
            ));
        }
    };

    println!();
    match outcome {
        RunOutcome::Completed { score } => {
            println!("  Article generated!");
            println!("  Job:    {job_id}");
            println!("  Score:  {score}/100");
            println!("  Export: articleforge export --job {job_id}");
        }
        RunOutcome::Paused => {
            println!("  Job {job_id} paused.");
            println!("  Resume: articleforge resume --job {job_id} --brief <file>");
        }
        RunOutcome::Cancelled => println!("  Job {job_id} cancelled."),
    }
    println!();
    Ok(())
}

async fn cmd_pause(db: Option<&Path>, job_id: &JobId) -> Result<()> {
    let job = store_orchestrator(db).await?.pause(job_id).await?;
    println!("Job {} {}", job.id, job.status);
    Ok(())
}

async fn cmd_cancel(db: Option<&Path>, job_id: &JobId) -> Result<()> {
    let job = store_orchestrator(db).await?.cancel(job_id).await?;
    println!("Job {} {}", job.id, job.status);
    Ok(())
}

// ---------------------------------------------------------------------------
// Inspection commands
// ---------------------------------------------------------------------------

async fn cmd_status(db: Option<&Path>, job_id: &JobId) -> Result<()> {
    let snap = store_orchestrator(db).await?.status(job_id).await?;
    let job = &snap.job;

    println!();
    println!("  Job:       {}", job.id);
    println!("  Brief:     {}", job.brief_id);
    println!("  Status:    {}", job.status);
    println!(
        "  Pass:      {} ({}/{})",
        job.current_pass_name(),
        job.current_pass,
        PassName::ALL.len()
    );
    println!(
        "  Sections:  {}/{}",
        job.completed_sections, job.total_sections
    );
    if let Some(key) = &job.current_section_key {
        println!("  Next:      {key}");
    }
    if let Some(score) = job.final_score {
        println!("  Score:     {score}/100");
    }
    if job.retry_count > 0 {
        println!("  Retries:   {}", job.retry_count);
    }
    if let Some(err) = &job.last_error {
        println!("  Error:     {err}");
    }

    println!();
    for (pass, state) in job.pass_status.iter() {
        println!("  {:>2} {:<18} {:?}", pass.number(), pass.as_str(), state);
    }

    if !snap.sections.is_empty() {
        println!();
        for s in &snap.sections {
            let indent = "  ".repeat(usize::from(s.level.saturating_sub(2)));
            println!(
                "  {indent}{:<40} {:<12} pass {}",
                s.heading,
                s.status.as_str(),
                s.current_pass()
            );
        }
    }
    println!();
    Ok(())
}

fn cmd_audit(brief_path: &Path, draft_path: &Path, json: bool) -> Result<()> {
    let brief = load_brief(brief_path)?;
    let draft = std::fs::read_to_string(draft_path)
        .wrap_err_with(|| format!("cannot read draft {}", draft_path.display()))?;

    // Pipeline drafts list sections in ranked order.
    let ranked = AttributeRanker::new().order(&brief.sections);
    let order: Vec<&str> = ranked.iter().map(|d| d.key.as_str()).collect();
    let report = AuditEngine::default().audit_in_order(&draft, &brief, &order);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &AuditReport) {
    println!();
    println!(
        "  Score: {}/100 ({} of {} rules passing)",
        report.score,
        report.passing(),
        report.results.len()
    );
    for result in report.failing() {
        println!();
        println!("  x {}", result.rule_id);
        for v in &result.violations {
            if v.matched_text.is_empty() {
                println!("      {}", v.suggestion);
            } else {
                println!("      \"{}\": {}", v.matched_text, v.suggestion);
            }
        }
    }
    println!();
}

async fn cmd_export(db: Option<&Path>, job_id: &JobId, out: Option<&Path>) -> Result<()> {
    let job = store_orchestrator(db).await?.status(job_id).await?.job;
    if job.draft_content.trim().is_empty() {
        return Err(eyre!("job {job_id} has no draft yet (status: {})", job.status));
    }

    match out {
        Some(path) => {
            std::fs::write(path, &job.draft_content)
                .wrap_err_with(|| format!("cannot write {}", path.display()))?;
            println!("Draft written to {}", path.display());
        }
        None => println!("{}", job.draft_content),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

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

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.abandon();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn pass_started(&self, pass: PassName) {
        self.spinner
            .set_message(format!("Pass {}/8: {}", pass.number(), pass.as_str()));
    }

    fn section_started(&self, key: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Drafting [{current}/{total}] {key}"));
    }

    fn section_completed(&self, key: &str, outcome: &SectionOutcome) {
        if !outcome.clean {
            self.spinner.println(format!(
                "  ! {key}: accepted after {} attempts with {} open violations",
                outcome.attempts,
                outcome.violations.len()
            ));
        }
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}
