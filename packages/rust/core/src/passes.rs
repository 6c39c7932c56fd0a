//! Passes 2-7: whole-document rewrites through the provider gateway.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use articleforge_providers::{GenerateOptions, ProviderGateway};
use articleforge_rules::text;
use articleforge_shared::{Brief, JobId, PassName, Result};
use articleforge_storage::JobStore;

use crate::prompt;

/// Outputs shorter than this share of the input are treated as truncated.
pub const MIN_LENGTH_RATIO: f64 = 0.6;

/// What a document pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub draft: String,
    /// Served from the pass cache without a provider call.
    pub cached: bool,
    /// The provider output was rejected and the input kept.
    pub kept_input: bool,
}

/// Cache key for a pass input.
pub fn input_hash(draft: &str, pass: PassName) -> String {
    let mut hasher = Sha256::new();
    hasher.update(draft.as_bytes());
    hasher.update(pass.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Why a rewrite must not replace its input, if it must not.
pub fn reject_reason(input: &str, output: &str) -> Option<String> {
    let (inp, out) = (input.trim().chars().count(), output.trim().chars().count());
    if (out as f64) < (inp as f64) * MIN_LENGTH_RATIO {
        return Some(format!("output has {out} chars, input {inp}"));
    }
    if !text::headings(input).is_empty() && text::headings(output).is_empty() {
        return Some("output lost every heading".into());
    }
    None
}

/// Strip an `<article>` wrapper or code fence the model may echo back.
fn unwrap_article(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(inner) = body
        .strip_prefix("<article>")
        .and_then(|b| b.strip_suffix("</article>"))
    {
        body = inner.trim();
    }
    if body.starts_with("```") {
        body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        body = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }
    body
}

pub struct DocumentPasses {
    gateway: Arc<ProviderGateway>,
    options: GenerateOptions,
}

impl DocumentPasses {
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self {
            gateway,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one rewrite pass over `draft`. Unchanged input under the same
    /// provider route reuses the cached output.
    #[instrument(skip_all, fields(job_id = %job_id, pass = %pass))]
    pub async fn run(
        &self,
        store: &dyn JobStore,
        job_id: &JobId,
        pass: PassName,
        brief: &Brief,
        draft: &str,
    ) -> Result<PassOutcome> {
        let hash = input_hash(draft, pass);
        let route = self.gateway.route_key();

        if let Some(cached) = store.get_pass_cache(job_id, pass, &hash, &route).await? {
            debug!("pass cache hit");
            return Ok(PassOutcome {
                draft: cached,
                cached: true,
                kept_input: false,
            });
        }

        let prompt = prompt::pass_prompt(pass, brief, draft);
        let response = self.gateway.generate(&prompt, &self.options).await?;
        let output = unwrap_article(&response.text);

        if let Some(reason) = reject_reason(draft, output) {
            warn!(%reason, provider = %response.provider, "keeping input draft");
            return Ok(PassOutcome {
                draft: draft.to_string(),
                cached: false,
                kept_input: true,
            });
        }

        store
            .set_pass_cache(job_id, pass, &hash, &route, output)
            .await?;
        info!(
            provider = %response.provider,
            chars_in = draft.len(),
            chars_out = output.len(),
            "pass rewrote draft"
        );
        Ok(PassOutcome {
            draft: output.to_string(),
            cached: false,
            kept_input: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockWriter, brief, gateway};
    use articleforge_storage::MemoryStore;

    const DRAFT: &str = "# Solar Panels\n\n## Cost\n\nA solar panel costs 300 dollars.\n";

    #[tokio::test]
    async fn rewrites_and_caches() {
        let rewritten = "# Solar Panels\n\n## Solar panel cost\n\nA solar panel costs 300 dollars.";
        let writer = Arc::new(MockWriter::replying(&format!("<article>\n{rewritten}\n</article>")));
        let passes = DocumentPasses::new(gateway(writer.clone()));
        let store = MemoryStore::new();
        let job = JobId::new();
        let b = brief(&["cost"]);

        let first = passes.run(&store, &job, PassName::Headings, &b, DRAFT).await.unwrap();
        assert_eq!(first.draft, rewritten);
        assert!(!first.cached);

        let second = passes.run(&store, &job, PassName::Headings, &b, DRAFT).await.unwrap();
        assert_eq!(second.draft, rewritten);
        assert!(second.cached);
        assert_eq!(writer.calls(), 1);

        // A different pass over the same input is a different cache entry.
        passes.run(&store, &job, PassName::Discourse, &b, DRAFT).await.unwrap();
        assert_eq!(writer.calls(), 2);
    }

    #[tokio::test]
    async fn truncated_output_keeps_input() {
        let writer = Arc::new(MockWriter::replying("# Solar Panels"));
        let passes = DocumentPasses::new(gateway(writer.clone()));
        let store = MemoryStore::new();
        let job = JobId::new();
        let b = brief(&["cost"]);

        let out = passes.run(&store, &job, PassName::MicroSemantics, &b, DRAFT).await.unwrap();
        assert!(out.kept_input);
        assert_eq!(out.draft, DRAFT);

        // Rejected output is not cached.
        passes.run(&store, &job, PassName::MicroSemantics, &b, DRAFT).await.unwrap();
        assert_eq!(writer.calls(), 2);
    }

    #[test]
    fn guard_rules() {
        assert!(reject_reason("## A\n\nbody text", "## A\n\nbody text!").is_none());
        assert!(reject_reason("## A\n\nbody text here", "## A").is_some());
        assert_eq!(
            reject_reason("## A\n\nbody text", "A plain body text").as_deref(),
            Some("output lost every heading")
        );
    }

    #[test]
    fn hash_depends_on_pass_and_input() {
        assert_ne!(
            input_hash("x", PassName::Headings),
            input_hash("x", PassName::Discourse)
        );
        assert_eq!(input_hash("x", PassName::Headings), input_hash("x", PassName::Headings));
        assert_eq!(input_hash("x", PassName::Headings).len(), 64);
    }
}
