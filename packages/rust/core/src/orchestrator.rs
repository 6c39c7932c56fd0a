//! Job lifecycle: start, run, pause, cancel, resume.
//!
//! The persisted job is the only resume mechanism. Every pass boundary and
//! every accepted pass-1 section is written through the [`JobStore`] before
//! the next unit of work starts, so a run interrupted at any point picks up
//! from the last checkpoint.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use articleforge_providers::{GenerateOptions, ProviderGateway};
use articleforge_rules::{AuditEngine, ContextChainer, RulesValidator, ValidationContext};
use articleforge_shared::{
    ArticleForgeError, AttributeCategory, Brief, DiscourseContext, GenerationJob, JobId,
    JobStatus, JobUpdate, PASS_COUNT, PassName, PassState, PipelineConfig, Result, Section,
    SectionDefinition, SectionStatus, SectionUpdate,
};
use articleforge_storage::JobStore;

use crate::assembler::{assemble, match_sections};
use crate::passes::DocumentPasses;
use crate::ranker::AttributeRanker;
use crate::section::{SectionGenerator, SectionOutcome};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a pass starts.
    fn pass_started(&self, pass: PassName);
    /// Called before a pass-1 section is generated. `current` is 1-based.
    fn section_started(&self, key: &str, current: usize, total: usize);
    /// Called once a pass-1 section has been persisted.
    fn section_completed(&self, key: &str, outcome: &SectionOutcome);
    /// Called when a run ends without error.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn pass_started(&self, _pass: PassName) {}
    fn section_started(&self, _key: &str, _current: usize, _total: usize) {}
    fn section_completed(&self, _key: &str, _outcome: &SectionOutcome) {}
    fn done(&self, _outcome: &RunOutcome) {}
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All eight passes finished; `score` is the audit score.
    Completed { score: u8 },
    Paused,
    Cancelled,
}

/// A job with its sections, for status displays.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: GenerationJob,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Pause,
    Cancel,
    /// Another process took over the run lease.
    Displaced,
}

impl Stop {
    /// Status persisted when the run stops. A displaced run leaves the job
    /// to its new owner.
    fn status(self) -> Option<JobStatus> {
        match self {
            Self::Pause => Some(JobStatus::Paused),
            Self::Cancel => Some(JobStatus::Cancelled),
            Self::Displaced => None,
        }
    }
}

/// Cooperative stop flag of an active run. Cancel overrides pause.
#[derive(Debug, Default)]
struct RunSignal(AtomicU8);

impl RunSignal {
    const PAUSE: u8 = 1;
    const CANCEL: u8 = 2;

    fn raise(&self, stop: Stop) {
        let value = match stop {
            Stop::Pause => Self::PAUSE,
            Stop::Cancel => Self::CANCEL,
            Stop::Displaced => return,
        };
        self.0.fetch_max(value, Ordering::SeqCst);
    }

    fn get(&self) -> Option<Stop> {
        match self.0.load(Ordering::SeqCst) {
            Self::PAUSE => Some(Stop::Pause),
            Self::CANCEL => Some(Stop::Cancel),
            _ => None,
        }
    }
}

type RunRegistry = Mutex<HashMap<JobId, Arc<RunSignal>>>;

/// Registry entry of an active run, removed on drop.
struct RunGuard<'a> {
    runs: &'a RunRegistry,
    job_id: JobId,
    signal: Arc<RunSignal>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives a job through its eight passes.
///
/// Runs of one job are exclusive across processes sharing a store: a run
/// holds the job's lease for its whole duration and renews it at every
/// section and pass boundary.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    gateway: Arc<ProviderGateway>,
    validator: Arc<RulesValidator>,
    audit: AuditEngine,
    ranker: AttributeRanker,
    chainer: ContextChainer,
    config: PipelineConfig,
    options: GenerateOptions,
    runs: RunRegistry,
    /// Lease holder identity of this orchestrator.
    owner: String,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>, gateway: Arc<ProviderGateway>, config: PipelineConfig) -> Self {
        Self {
            store,
            gateway,
            validator: Arc::new(RulesValidator::new()),
            audit: AuditEngine::default(),
            ranker: AttributeRanker::new(),
            chainer: ContextChainer::new(),
            config,
            options: GenerateOptions::default(),
            runs: Mutex::new(HashMap::new()),
            owner: format!("{}-{}", std::process::id(), Uuid::now_v7()),
        }
    }

    /// Replace the pass-1 section validator.
    pub fn with_validator(mut self, validator: RulesValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// The job to run for `brief`: its existing resumable job, or a fresh one.
    /// A completed or cancelled predecessor is deleted first.
    #[instrument(skip_all, fields(brief_id = %brief.id))]
    pub async fn prepare(&self, brief: &Brief) -> Result<GenerationJob> {
        brief.validate()?;

        if let Some(existing) = self.store.find_job_by_brief(&brief.id).await? {
            match existing.status {
                JobStatus::Completed | JobStatus::Cancelled => {
                    info!(job_id = %existing.id, status = %existing.status, "replacing finished job");
                    self.store.delete_job(&existing.id).await?;
                }
                _ => {
                    info!(job_id = %existing.id, status = %existing.status, "reusing job");
                    return Ok(existing);
                }
            }
        }

        let job = GenerationJob::new(&brief.id, brief.sections.len() as u32);
        self.store.create_job(&job).await?;
        info!(job_id = %job.id, sections = job.total_sections, "job created");
        Ok(job)
    }

    /// Prepare the job for `brief` and run it.
    pub async fn start(
        &self,
        brief: &Brief,
        progress: &dyn ProgressReporter,
    ) -> Result<(JobId, RunOutcome)> {
        let job = self.prepare(brief).await?;
        let outcome = self.run(&job.id, brief, progress).await?;
        Ok((job.id, outcome))
    }

    /// Continue a paused or failed job. A failed job counts as a retry.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn resume(
        &self,
        job_id: &JobId,
        brief: &Brief,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let job = self.load(job_id).await?;
        match job.status {
            JobStatus::Completed | JobStatus::Cancelled => {
                return Err(ArticleForgeError::state(format!(
                    "job {job_id} is {} and cannot be resumed",
                    job.status
                )));
            }
            JobStatus::Failed => {
                self.store
                    .update_job(job_id, &JobUpdate::new().with_retry_count(job.retry_count + 1))
                    .await?;
            }
            _ => {}
        }
        self.run(job_id, brief, progress).await
    }

    /// Execute the remaining passes of a job.
    #[instrument(skip_all, fields(job_id = %job_id, brief_id = %brief.id))]
    pub async fn run(
        &self,
        job_id: &JobId,
        brief: &Brief,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        brief.validate()?;
        let guard = self.register(job_id)?;
        if !self.claim(job_id).await? {
            return Err(ArticleForgeError::state(format!(
                "job {job_id} is already running in another process"
            )));
        }

        let result = self.run_leased(job_id, brief, &guard.signal, progress).await;
        if let Err(e) = self.store.release_run(job_id, &self.owner).await {
            warn!(error = %e, "failed to release run lease");
        }
        result
    }

    async fn run_leased(
        &self,
        job_id: &JobId,
        brief: &Brief,
        signal: &RunSignal,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let job = self.load(job_id).await?;
        if job.brief_id != brief.id {
            return Err(ArticleForgeError::validation(format!(
                "job {job_id} belongs to brief '{}', not '{}'",
                job.brief_id, brief.id
            )));
        }
        if matches!(job.status, JobStatus::Completed | JobStatus::Cancelled) {
            return Err(ArticleForgeError::state(format!("job {job_id} is {}", job.status)));
        }

        let mut start = JobUpdate::new()
            .with_status(JobStatus::InProgress)
            .with_last_error(None);
        if job.started_at.is_none() {
            start = start.with_started_at(Utc::now());
        }
        let job = self.store.update_job(job_id, &start).await?;
        info!(current_pass = job.current_pass, "run started");

        for number in job.current_pass..=PASS_COUNT {
            let Some(pass) = PassName::from_number(number) else {
                continue;
            };
            if job.pass_status.get(pass) == PassState::Completed {
                continue;
            }
            if let Some(stop) = self.stop_requested(signal, job_id).await? {
                return self.halt(job_id, stop, progress).await;
            }

            progress.pass_started(pass);
            self.store
                .update_job(
                    job_id,
                    &JobUpdate::new()
                        .with_current_pass(number)
                        .with_pass_state(pass, PassState::InProgress),
                )
                .await?;

            let result = match pass {
                PassName::Draft => self.draft_pass(job_id, brief, signal, progress).await,
                PassName::Audit => self.audit_pass(job_id, brief).await.map(|_| None),
                _ => self.rewrite_pass(job_id, pass, brief).await.map(|_| None),
            };

            match result {
                Ok(None) => {
                    self.store
                        .update_job(
                            job_id,
                            &JobUpdate::new()
                                .with_pass_state(pass, PassState::Completed)
                                .with_current_pass((number + 1).min(PASS_COUNT)),
                        )
                        .await?;
                    info!(%pass, "pass completed");
                }
                Ok(Some(stop)) => return self.halt(job_id, stop, progress).await,
                Err(e) if e.is_persistence() => return Err(e),
                Err(e) => return Err(self.fail(job_id, pass, e).await),
            }
        }

        if let Some(stop) = self.stop_requested(signal, job_id).await? {
            return self.halt(job_id, stop, progress).await;
        }

        let job = self
            .store
            .update_job(
                job_id,
                &JobUpdate::new()
                    .with_status(JobStatus::Completed)
                    .with_current_section_key(None)
                    .with_completed_at(Utc::now()),
            )
            .await?;
        let outcome = RunOutcome::Completed {
            score: job.final_score.unwrap_or(0),
        };
        info!(score = job.final_score, "job completed");
        progress.done(&outcome);
        Ok(outcome)
    }

    /// Pause a job. An active run in this process stops at its next
    /// boundary; a run in another process sees the persisted status.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn pause(&self, job_id: &JobId) -> Result<GenerationJob> {
        self.signal(job_id, Stop::Pause).await
    }

    /// Cancel a job. Cancelled jobs cannot be resumed.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: &JobId) -> Result<GenerationJob> {
        self.signal(job_id, Stop::Cancel).await
    }

    /// Raise the pause flag of an active run without touching storage.
    /// Returns whether a run was active. Safe to call from a signal handler.
    pub fn request_pause(&self, job_id: &JobId) -> bool {
        self.raise(job_id, Stop::Pause)
    }

    pub fn request_cancel(&self, job_id: &JobId) -> bool {
        self.raise(job_id, Stop::Cancel)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobSnapshot> {
        let job = self.load(job_id).await?;
        let sections = self.store.list_sections(job_id).await?;
        Ok(JobSnapshot { job, sections })
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Pass 1. Returns a stop request seen at a section boundary.
    async fn draft_pass(
        &self,
        job_id: &JobId,
        brief: &Brief,
        signal: &RunSignal,
        progress: &dyn ProgressReporter,
    ) -> Result<Option<Stop>> {
        progress.phase("Drafting sections");
        let ranked = self.ranker.order(&brief.sections);
        let top_level = ranked.iter().map(|s| s.level).min().unwrap_or(2);

        let stored = self.store.list_sections(job_id).await?;
        let finished: HashMap<&str, &str> = stored
            .iter()
            .filter(|s| s.status == SectionStatus::Completed)
            .filter_map(|s| Some((s.section_key.as_str(), s.content_for(PassName::Draft)?)))
            .collect();
        let pending: HashSet<&str> = ranked
            .iter()
            .map(|d| d.key.as_str())
            .filter(|k| !finished.contains_key(k))
            .collect();

        let generator = SectionGenerator::new(self.gateway.clone(), self.validator.clone())
            .with_options(self.options);
        let mut completed = (ranked.len() - pending.len()) as u32;
        let mut preceding: Vec<AttributeCategory> = Vec::new();
        let mut discourse = DiscourseContext::empty();

        for (i, def) in ranked.iter().enumerate() {
            let is_top = def.level == top_level;

            if let Some(text) = finished.get(def.key.as_str()) {
                discourse = self.chainer.extract_for_next(text);
                if is_top {
                    preceding.push(def.attribute_category);
                }
                continue;
            }

            if let Some(stop) = self.stop_requested(signal, job_id).await? {
                return Ok(Some(stop));
            }

            progress.section_started(&def.key, i + 1, ranked.len());
            self.store
                .update_job(
                    job_id,
                    &JobUpdate::new().with_current_section_key(Some(def.key.clone())),
                )
                .await?;
            self.store
                .upsert_section(
                    job_id,
                    &def.key,
                    &SectionUpdate::from_definition(def).with_status(SectionStatus::InProgress),
                )
                .await?;

            let after: &[AttributeCategory] = if is_top { &preceding } else { &[] };
            let ctx = ValidationContext::new(def, brief).lead(i == 0).after(after);
            let outcome = generator
                .generate(brief, &ctx, &discourse, self.config.max_attempts)
                .await?;

            self.store
                .upsert_section(
                    job_id,
                    &def.key,
                    &SectionUpdate::new()
                        .with_content(PassName::Draft, outcome.content.clone())
                        .with_scores(outcome.per_rule_scores.clone())
                        .with_status(SectionStatus::Completed),
                )
                .await?;
            completed += 1;
            self.store
                .update_job(
                    job_id,
                    &JobUpdate::new()
                        .with_completed_sections(completed)
                        .with_current_section_key(next_pending(&ranked[i + 1..], &pending)),
                )
                .await?;
            progress.section_completed(&def.key, &outcome);

            discourse = self.chainer.extract_for_next(&outcome.content);
            if is_top {
                preceding.push(def.attribute_category);
            }
        }

        let sections = self.store.list_sections(job_id).await?;
        let draft = assemble(&brief.title, &sections);
        self.store
            .update_job(job_id, &JobUpdate::new().with_draft(draft))
            .await?;
        Ok(None)
    }

    /// Passes 2-7. The new draft replaces the old one and each matching
    /// section records the pass in its history.
    async fn rewrite_pass(&self, job_id: &JobId, pass: PassName, brief: &Brief) -> Result<()> {
        let job = self.load(job_id).await?;
        let outcome = DocumentPasses::new(self.gateway.clone())
            .with_options(self.options)
            .run(self.store.as_ref(), job_id, pass, brief, &job.draft_content)
            .await?;

        self.store
            .update_job(job_id, &JobUpdate::new().with_draft(outcome.draft.clone()))
            .await?;

        let sections = self.store.list_sections(job_id).await?;
        for (section, body) in match_sections(&sections, &outcome.draft) {
            self.store
                .upsert_section(
                    job_id,
                    &section.section_key,
                    &SectionUpdate::new().with_content(pass, body),
                )
                .await?;
        }
        Ok(())
    }

    /// Pass 8.
    async fn audit_pass(&self, job_id: &JobId, brief: &Brief) -> Result<u8> {
        let job = self.load(job_id).await?;
        let sections = self.store.list_sections(job_id).await?;
        let order: Vec<&str> = sections.iter().map(|s| s.section_key.as_str()).collect();
        let report = self.audit.audit_in_order(&job.draft_content, brief, &order);
        let value = serde_json::to_value(&report)
            .map_err(|e| ArticleForgeError::parse(format!("audit report: {e}")))?;
        self.store
            .update_job(
                job_id,
                &JobUpdate::new()
                    .with_final_score(report.score)
                    .with_violation_report(value),
            )
            .await?;
        info!(
            score = report.score,
            failing = report.failing().count(),
            "audit finished"
        );
        Ok(report.score)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load(&self, job_id: &JobId) -> Result<GenerationJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| ArticleForgeError::state(format!("job {job_id} not found")))
    }

    fn register(&self, job_id: &JobId) -> Result<RunGuard<'_>> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(job_id) {
            return Err(ArticleForgeError::state(format!(
                "job {job_id} is already running"
            )));
        }
        let signal = Arc::new(RunSignal::default());
        runs.insert(job_id.clone(), signal.clone());
        Ok(RunGuard {
            runs: &self.runs,
            job_id: job_id.clone(),
            signal,
        })
    }

    /// Take or renew this orchestrator's lease on a job.
    async fn claim(&self, job_id: &JobId) -> Result<bool> {
        let now = Utc::now();
        let lease = chrono::Duration::seconds(self.config.run_lease.as_secs() as i64);
        self.store
            .claim_run(job_id, &self.owner, now, now - lease)
            .await
    }

    fn raise(&self, job_id: &JobId, stop: Stop) -> bool {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        match runs.get(job_id) {
            Some(signal) => {
                signal.raise(stop);
                true
            }
            None => false,
        }
    }

    async fn signal(&self, job_id: &JobId, stop: Stop) -> Result<GenerationJob> {
        let job = self.load(job_id).await?;
        let allowed = match stop {
            Stop::Pause => !job.status.is_terminal(),
            Stop::Cancel => !matches!(job.status, JobStatus::Completed | JobStatus::Cancelled),
            Stop::Displaced => false,
        };
        let Some(status) = stop.status().filter(|_| allowed) else {
            return Err(ArticleForgeError::state(format!(
                "job {job_id} is {}",
                job.status
            )));
        };
        self.raise(job_id, stop);
        let job = self
            .store
            .update_job(job_id, &JobUpdate::new().with_status(status))
            .await?;
        info!(status = %job.status, "stop requested");
        Ok(job)
    }

    /// A stop raised in this process, a lost lease, or a paused/cancelled
    /// status persisted by another process. Renews the lease.
    async fn stop_requested(&self, signal: &RunSignal, job_id: &JobId) -> Result<Option<Stop>> {
        if let Some(stop) = signal.get() {
            return Ok(Some(stop));
        }
        if !self.claim(job_id).await? {
            return Ok(Some(Stop::Displaced));
        }
        Ok(match self.load(job_id).await?.status {
            JobStatus::Paused => Some(Stop::Pause),
            JobStatus::Cancelled => Some(Stop::Cancel),
            _ => None,
        })
    }

    async fn halt(
        &self,
        job_id: &JobId,
        stop: Stop,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome> {
        let (status, outcome) = match stop {
            Stop::Pause => (JobStatus::Paused, RunOutcome::Paused),
            Stop::Cancel => (JobStatus::Cancelled, RunOutcome::Cancelled),
            Stop::Displaced => {
                warn!("run lease taken over by another process");
                return Err(ArticleForgeError::state(format!(
                    "job {job_id} was taken over by another run"
                )));
            }
        };
        let job = self
            .store
            .update_job(job_id, &JobUpdate::new().with_status(status))
            .await?;
        info!(
            status = %job.status,
            current_pass = job.current_pass,
            completed_sections = job.completed_sections,
            "run stopped"
        );
        progress.done(&outcome);
        Ok(outcome)
    }

    /// Record a pass failure. The pass stays in progress so a resume
    /// re-runs it.
    async fn fail(&self, job_id: &JobId, pass: PassName, error: ArticleForgeError) -> ArticleForgeError {
        warn!(%pass, error = %error, "pass failed");
        let update = JobUpdate::new()
            .with_status(JobStatus::Failed)
            .with_last_error(Some(error.to_string()));
        if let Err(persist) = self.store.update_job(job_id, &update).await {
            return persist;
        }
        error
    }
}

/// Key of the first section in `rest` still waiting for generation.
fn next_pending(rest: &[SectionDefinition], pending: &HashSet<&str>) -> Option<String> {
    rest.iter()
        .find(|d| pending.contains(d.key.as_str()))
        .map(|d| d.key.clone())
}
