//! Pass 1: the generate, validate, regenerate loop for one section.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use articleforge_providers::{GenerateOptions, ProviderGateway};
use articleforge_rules::{RulesValidator, ValidationContext, has_errors, text};
use articleforge_shared::{
    ArticleForgeError, Brief, DiscourseContext, ProviderKind, Result, ValidationViolation,
};

use crate::prompt;

/// Result of generating one section.
#[derive(Debug, Clone)]
pub struct SectionOutcome {
    /// Normalized text of the accepted attempt.
    pub content: String,
    /// Provider calls made, 1..=max_attempts.
    pub attempts: u32,
    /// Violations of the accepted attempt. Contains errors only when every
    /// attempt failed validation.
    pub violations: Vec<ValidationViolation>,
    pub per_rule_scores: BTreeMap<String, u8>,
    /// Whether the accepted attempt was free of errors.
    pub clean: bool,
    pub provider: ProviderKind,
}

pub struct SectionGenerator {
    gateway: Arc<ProviderGateway>,
    validator: Arc<RulesValidator>,
    options: GenerateOptions,
}

impl SectionGenerator {
    pub fn new(gateway: Arc<ProviderGateway>, validator: Arc<RulesValidator>) -> Self {
        Self {
            gateway,
            validator,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Generate `ctx.section` until it validates without errors or
    /// `max_attempts` is spent; the last candidate is then accepted as is.
    #[instrument(skip_all, fields(section = %ctx.section.key, max_attempts))]
    pub async fn generate(
        &self,
        brief: &Brief,
        ctx: &ValidationContext<'_>,
        discourse: &DiscourseContext,
        max_attempts: u32,
    ) -> Result<SectionOutcome> {
        let max_attempts = max_attempts.max(1);
        let mut previous: Vec<ValidationViolation> = Vec::new();
        let mut last: Option<SectionOutcome> = None;

        for attempt in 1..=max_attempts {
            let prompt = prompt::section_prompt(brief, ctx.section, discourse, &previous);
            let response = self.gateway.generate(&prompt, &self.options).await?;
            let content = normalize(&response.text, &ctx.section.heading);

            let violations = self.validator.validate(&content, ctx);
            let clean = !has_errors(&violations);
            let outcome = SectionOutcome {
                per_rule_scores: self.validator.scores(&violations),
                content,
                attempts: attempt,
                violations,
                clean,
                provider: response.provider,
            };

            if clean {
                info!(attempt, provider = %outcome.provider, "section accepted");
                return Ok(outcome);
            }

            debug!(
                attempt,
                errors = outcome.violations.iter().filter(|v| v.is_error()).count(),
                "section failed validation"
            );
            previous = outcome.violations.clone();
            last = Some(outcome);
        }

        let outcome =
            last.ok_or_else(|| ArticleForgeError::state("section loop produced no attempt"))?;
        warn!(
            attempts = outcome.attempts,
            residual = outcome.violations.len(),
            "accepting section with residual violations"
        );
        Ok(outcome)
    }
}

/// Strip code fences, a leading copy of the section heading, and
/// surrounding whitespace from generated text.
pub fn normalize(raw: &str, heading: &str) -> String {
    let mut body = raw.trim();

    if body.starts_with("```") {
        body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        body = body.trim_end();
        if let Some(stripped) = body.strip_suffix("```") {
            body = stripped;
        }
        body = body.trim();
    }

    let first_line = body.lines().next().unwrap_or("");
    if let Some((_, text)) = text::parse_heading(first_line) {
        let same = squash_heading(text) == squash_heading(heading);
        if same {
            body = body[first_line.len()..].trim_start();
        }
    }

    body.trim().to_string()
}

fn squash_heading(h: &str) -> String {
    text::squash(h)
        .trim_end_matches(['?', '.', ':', '!'])
        .to_lowercase()
}
