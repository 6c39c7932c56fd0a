//! Core domain types for ArticleForge generation jobs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ArticleForgeError, Result};

/// Number of passes in the generation pipeline.
pub const PASS_COUNT: u8 = 8;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for generation job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// The eight ordered pipeline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassName {
    Draft,
    Headings,
    ListsTables,
    Discourse,
    MicroSemantics,
    VisualSemantics,
    FinalPolish,
    Audit,
}

impl PassName {
    /// All passes in execution order.
    pub const ALL: [PassName; PASS_COUNT as usize] = [
        Self::Draft,
        Self::Headings,
        Self::ListsTables,
        Self::Discourse,
        Self::MicroSemantics,
        Self::VisualSemantics,
        Self::FinalPolish,
        Self::Audit,
    ];

    /// 1-based pass number.
    pub fn number(self) -> u8 {
        match self {
            Self::Draft => 1,
            Self::Headings => 2,
            Self::ListsTables => 3,
            Self::Discourse => 4,
            Self::MicroSemantics => 5,
            Self::VisualSemantics => 6,
            Self::FinalPolish => 7,
            Self::Audit => 8,
        }
    }

    /// Look up a pass by its 1-based number.
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// Stable string key used in storage and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Headings => "headings",
            Self::ListsTables => "lists_tables",
            Self::Discourse => "discourse",
            Self::MicroSemantics => "micro_semantics",
            Self::VisualSemantics => "visual_semantics",
            Self::FinalPolish => "final_polish",
            Self::Audit => "audit",
        }
    }

    /// The pass after this one, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    /// Slot index (0-based) for per-pass section content.
    pub fn slot(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl std::fmt::Display for PassName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion state of a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Map of every pass to its state. Always holds all eight entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassStatus(BTreeMap<PassName, PassState>);

impl PassStatus {
    /// All passes pending.
    pub fn new() -> Self {
        Self(PassName::ALL.iter().map(|p| (*p, PassState::Pending)).collect())
    }

    pub fn get(&self, pass: PassName) -> PassState {
        self.0.get(&pass).copied().unwrap_or_default()
    }

    pub fn set(&mut self, pass: PassName, state: PassState) {
        self.0.insert(pass, state);
    }

    /// First pass (in order) that is not completed.
    pub fn first_incomplete(&self) -> Option<PassName> {
        PassName::ALL
            .into_iter()
            .find(|p| self.get(*p) != PassState::Completed)
    }

    /// Iterate `(pass, state)` in pass order.
    pub fn iter(&self) -> impl Iterator<Item = (PassName, PassState)> + '_ {
        PassName::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}

impl Default for PassStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// GenerationJob
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ArticleForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ArticleForgeError::parse(format!("unknown job status '{other}'"))),
        }
    }
}

/// A persisted multi-pass generation job for one brief.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    /// Owning brief (1:1).
    pub brief_id: String,
    pub status: JobStatus,
    /// 1-based number of the pass to run next.
    pub current_pass: u8,
    pub pass_status: PassStatus,
    pub total_sections: u32,
    pub completed_sections: u32,
    /// Key of the section pass 1 will work on next.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_section_key: Option<String>,
    /// Whole-document accumulator, authoritative after each pass.
    #[serde(default)]
    pub draft_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_report: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Fresh pending job for a brief.
    pub fn new(brief_id: impl Into<String>, total_sections: u32) -> Self {
        Self {
            id: JobId::new(),
            brief_id: brief_id.into(),
            status: JobStatus::Pending,
            current_pass: 1,
            pass_status: PassStatus::new(),
            total_sections,
            completed_sections: 0,
            current_section_key: None,
            draft_content: String::new(),
            final_score: None,
            violation_report: None,
            last_error: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// The pass `current_pass` points at.
    pub fn current_pass_name(&self) -> PassName {
        PassName::from_number(self.current_pass).unwrap_or(PassName::Audit)
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(pass) = update.current_pass {
            self.current_pass = pass.clamp(1, PASS_COUNT);
        }
        for (pass, state) in &update.pass_states {
            self.pass_status.set(*pass, *state);
        }
        if let Some(total) = update.total_sections {
            self.total_sections = total;
        }
        if let Some(done) = update.completed_sections {
            self.completed_sections = done;
        }
        if let Some(key) = &update.current_section_key {
            self.current_section_key = key.clone();
        }
        if let Some(draft) = &update.draft_content {
            self.draft_content = draft.clone();
        }
        if let Some(score) = update.final_score {
            self.final_score = score;
        }
        if let Some(report) = &update.violation_report {
            self.violation_report = Some(report.clone());
        }
        if let Some(err) = &update.last_error {
            self.last_error = err.clone();
        }
        if let Some(retries) = update.retry_count {
            self.retry_count = retries;
        }
        if let Some(at) = update.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
    }
}

/// Partial update for a [`GenerationJob`]. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub current_pass: Option<u8>,
    pub pass_states: Vec<(PassName, PassState)>,
    pub total_sections: Option<u32>,
    pub completed_sections: Option<u32>,
    pub current_section_key: Option<Option<String>>,
    pub draft_content: Option<String>,
    pub final_score: Option<Option<u8>>,
    pub violation_report: Option<serde_json::Value>,
    pub last_error: Option<Option<String>>,
    pub retry_count: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_current_pass(mut self, pass: u8) -> Self {
        self.current_pass = Some(pass);
        self
    }

    pub fn with_pass_state(mut self, pass: PassName, state: PassState) -> Self {
        self.pass_states.push((pass, state));
        self
    }

    pub fn with_total_sections(mut self, total: u32) -> Self {
        self.total_sections = Some(total);
        self
    }

    pub fn with_completed_sections(mut self, done: u32) -> Self {
        self.completed_sections = Some(done);
        self
    }

    pub fn with_current_section_key(mut self, key: Option<String>) -> Self {
        self.current_section_key = Some(key);
        self
    }

    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.draft_content = Some(draft.into());
        self
    }

    pub fn with_final_score(mut self, score: u8) -> Self {
        self.final_score = Some(Some(score));
        self
    }

    pub fn with_violation_report(mut self, report: serde_json::Value) -> Self {
        self.violation_report = Some(report);
        self
    }

    pub fn with_last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// Processing status of a single section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SectionStatus {
    type Err = ArticleForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ArticleForgeError::parse(format!(
                "unknown section status '{other}'"
            ))),
        }
    }
}

/// A persisted article section with per-pass version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub job_id: String,
    /// Unique within the job.
    pub section_key: String,
    pub heading: String,
    /// Document position; fractional values order subsections.
    pub order: f64,
    pub level: u8,
    /// Content written by each pass, indexed by pass slot.
    pub contents: [Option<String>; PASS_COUNT as usize],
    /// Rule id -> 0..=100 score from the accepted pass-1 attempt.
    #[serde(default)]
    pub per_rule_scores: BTreeMap<String, u8>,
    pub status: SectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Section {
    /// Empty pending section.
    pub fn new(job_id: impl Into<String>, section_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            job_id: job_id.into(),
            section_key: section_key.into(),
            heading: String::new(),
            order: 0.0,
            level: 2,
            contents: Default::default(),
            per_rule_scores: BTreeMap::new(),
            status: SectionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of the latest pass that wrote content, or 0.
    pub fn current_pass(&self) -> u8 {
        self.contents
            .iter()
            .rposition(Option::is_some)
            .map(|i| i as u8 + 1)
            .unwrap_or(0)
    }

    /// Latest non-empty content slot.
    pub fn current_content(&self) -> Option<&str> {
        self.contents.iter().rev().find_map(|c| c.as_deref())
    }

    pub fn content_for(&self, pass: PassName) -> Option<&str> {
        self.contents[pass.slot()].as_deref()
    }

    /// Write a pass slot. Slots are append-only: once a later pass has
    /// written, earlier slots are frozen.
    pub fn write_slot(&mut self, pass: PassName, content: String) -> Result<()> {
        if self.contents[pass.slot() + 1..].iter().any(Option::is_some) {
            return Err(ArticleForgeError::state(format!(
                "section '{}' already has content from a pass after {pass}",
                self.section_key
            )));
        }
        self.contents[pass.slot()] = Some(content);
        Ok(())
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &SectionUpdate) -> Result<()> {
        if let Some((pass, content)) = &update.content {
            self.write_slot(*pass, content.clone())?;
        }
        if let Some(heading) = &update.heading {
            self.heading = heading.clone();
        }
        if let Some(order) = update.order {
            self.order = order;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(scores) = &update.per_rule_scores {
            self.per_rule_scores = scores.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update for a [`Section`].
#[derive(Debug, Clone, Default)]
pub struct SectionUpdate {
    pub heading: Option<String>,
    pub order: Option<f64>,
    pub level: Option<u8>,
    pub content: Option<(PassName, String)>,
    pub per_rule_scores: Option<BTreeMap<String, u8>>,
    pub status: Option<SectionStatus>,
}

impl SectionUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Heading, order and level from a section definition.
    pub fn from_definition(def: &SectionDefinition) -> Self {
        Self {
            heading: Some(def.heading.clone()),
            order: Some(def.order),
            level: Some(def.level),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, pass: PassName, content: impl Into<String>) -> Self {
        self.content = Some((pass, content.into()));
        self
    }

    pub fn with_scores(mut self, scores: BTreeMap<String, u8>) -> Self {
        self.per_rule_scores = Some(scores);
        self
    }

    pub fn with_status(mut self, status: SectionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

// ---------------------------------------------------------------------------
// Brief
// ---------------------------------------------------------------------------

/// Semantic priority class of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttributeCategory {
    #[serde(rename = "UNIQUE")]
    Unique,
    #[serde(rename = "ROOT")]
    Root,
    #[serde(rename = "RARE")]
    Rare,
    #[serde(rename = "COMMON")]
    Common,
    #[default]
    #[serde(rename = "unclassified")]
    Unclassified,
}

impl AttributeCategory {
    /// Sort rank: lower comes first.
    pub fn rank(self) -> u8 {
        match self {
            Self::Unique => 1,
            Self::Root => 2,
            Self::Rare => 3,
            Self::Common => 4,
            Self::Unclassified => 5,
        }
    }

    /// UNIQUE/ROOT sections form the macro (core) zone of an article.
    pub fn is_macro(self) -> bool {
        matches!(self, Self::Unique | Self::Root)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unique => "UNIQUE",
            Self::Root => "ROOT",
            Self::Rare => "RARE",
            Self::Common => "COMMON",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Structural contract for a section body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FormatCode {
    /// Featured snippet: short definitional answer.
    #[serde(rename = "FS")]
    Fs,
    /// People-also-ask answer.
    #[serde(rename = "PAA")]
    Paa,
    #[serde(rename = "LISTING")]
    Listing,
    #[serde(rename = "DEFINITIVE")]
    Definitive,
    #[serde(rename = "TABLE")]
    Table,
    #[default]
    #[serde(rename = "PROSE")]
    Prose,
}

impl FormatCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fs => "FS",
            Self::Paa => "PAA",
            Self::Listing => "LISTING",
            Self::Definitive => "DEFINITIVE",
            Self::Table => "TABLE",
            Self::Prose => "PROSE",
        }
    }
}

/// A link the section is expected to carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorTarget {
    /// Visible anchor text.
    pub anchor: String,
    /// Link destination.
    pub target: String,
}

/// One section of the brief outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDefinition {
    pub key: String,
    pub heading: String,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default)]
    pub order: f64,
    #[serde(default)]
    pub attribute_category: AttributeCategory,
    #[serde(default)]
    pub format_code: FormatCode,
    #[serde(default)]
    pub required_phrases: Vec<String>,
    #[serde(default)]
    pub anchor_targets: Vec<AnchorTarget>,
    /// Query demand, 0..=100.
    #[serde(default)]
    pub query_priority: u8,
}

fn default_level() -> u8 {
    2
}

/// An Entity-Attribute-Value fact the prose is expected to state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EavTriple {
    pub entity: String,
    pub attribute: String,
    pub value: String,
}

impl EavTriple {
    pub fn new(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Structured content brief, read once at pipeline start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub id: String,
    /// Article title (rendered as the H1).
    pub title: String,
    /// The entity the whole article is about.
    pub central_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_word_count: Option<u32>,
    #[serde(default)]
    pub eav_triples: Vec<EavTriple>,
    pub sections: Vec<SectionDefinition>,
}

impl Brief {
    /// Look up a section definition by key.
    pub fn section(&self, key: &str) -> Option<&SectionDefinition> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Look up a section definition by heading (case-insensitive).
    pub fn section_by_heading(&self, heading: &str) -> Option<&SectionDefinition> {
        let wanted = heading.trim().to_lowercase();
        self.sections
            .iter()
            .find(|s| s.heading.trim().to_lowercase() == wanted)
    }

    /// Reject briefs the pipeline cannot process.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ArticleForgeError::validation("brief id is empty"));
        }
        if self.sections.is_empty() {
            return Err(ArticleForgeError::validation("brief has no sections"));
        }
        let mut seen = std::collections::HashSet::new();
        for s in &self.sections {
            if s.key.trim().is_empty() {
                return Err(ArticleForgeError::validation("section key is empty"));
            }
            if !seen.insert(s.key.as_str()) {
                return Err(ArticleForgeError::validation(format!(
                    "duplicate section key '{}'",
                    s.key
                )));
            }
            if s.query_priority > 100 {
                return Err(ArticleForgeError::validation(format!(
                    "section '{}' query_priority {} exceeds 100",
                    s.key, s.query_priority
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Violation severity. Only `Error` blocks acceptance of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// A single rule finding against generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule_id: String,
    pub matched_text: String,
    /// Byte offset of the match within the checked text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub suggestion: String,
    pub severity: Severity,
}

impl ValidationViolation {
    pub fn new(rule_id: impl Into<String>, severity: Severity, matched_text: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            matched_text: matched_text.into(),
            position: None,
            suggestion: String::new(),
            severity,
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Discourse handoff from one finished section to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscourseContext {
    pub previous_paragraph: String,
    pub last_sentence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_object_phrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_hint: Option<String>,
}

impl DiscourseContext {
    /// Context for a section with no predecessor.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.previous_paragraph.is_empty() && self.last_sentence.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Outcome of one audit rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRuleResult {
    pub rule_id: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ValidationViolation>,
}

/// Pass-8 compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// `round(100 * passing / total)`.
    pub score: u8,
    pub results: Vec<AuditRuleResult>,
    pub checked_at: DateTime<Utc>,
}

impl AuditReport {
    pub fn passing(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failing(&self) -> impl Iterator<Item = &AuditRuleResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Closed set of supported text-generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Public API base URL.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ArticleForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(ArticleForgeError::parse(format!("unknown provider '{other}'"))),
        }
    }
}
