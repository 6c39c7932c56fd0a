//! Entity-Attribute-Value density.

use std::collections::HashSet;

use articleforge_shared::{EavTriple, Severity, ValidationViolation};

use crate::text;
use crate::validator::{Check, ValidationContext};

/// Sentences shorter than this are not expected to carry a fact.
pub const MIN_FACT_WORDS: usize = 8;

/// Unmatched share above which findings become warnings.
const WARN_SHARE: f64 = 0.30;

/// Unmatched share above which findings become errors.
const ERROR_SHARE: f64 = 0.50;

/// Terms used for matching: non-stopword tokens of at least three
/// characters, plus any number.
fn match_terms(text: &str) -> Vec<String> {
    text::tokens(text)
        .into_iter()
        .filter(|t| {
            t.chars().all(|c| c.is_ascii_digit())
                || (t.chars().count() >= 3 && !text::is_stopword(t))
        })
        .collect()
}

/// The head noun of an entity phrase: its last content term.
fn head_term(entity: &str) -> Option<String> {
    match_terms(entity).pop()
}

/// Whether a sentence (as a token set) states the triple: it names the
/// entity (or the article's central entity) and at least one attribute or
/// value term.
pub fn triple_matches(tokens: &HashSet<String>, triple: &EavTriple, central_entity: &str) -> bool {
    let names_entity = [triple.entity.as_str(), central_entity]
        .iter()
        .filter_map(|e| head_term(e))
        .any(|t| tokens.contains(&t));
    if !names_entity {
        return false;
    }

    match_terms(&triple.attribute)
        .into_iter()
        .chain(match_terms(&triple.value))
        .any(|t| tokens.contains(&t))
}

/// Number of triples a sentence states.
pub fn count_matches(sentence: &str, triples: &[EavTriple], central_entity: &str) -> usize {
    let tokens = text::token_set(sentence);
    triples
        .iter()
        .filter(|t| triple_matches(&tokens, t, central_entity))
        .count()
}

pub struct EavDensity;

impl Check for EavDensity {
    fn id(&self) -> &'static str {
        "eav_density"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        if ctx.eav_triples.is_empty() {
            return Vec::new();
        }

        let eligible: Vec<(text::Sentence<'_>, usize)> = text::prose_sentences(content)
            .into_iter()
            .filter(|s| text::word_count(s.text) >= MIN_FACT_WORDS)
            .map(|s| {
                let n = count_matches(s.text, ctx.eav_triples, ctx.central_entity);
                (s, n)
            })
            .collect();

        if eligible.is_empty() {
            return Vec::new();
        }

        let unmatched = eligible.iter().filter(|(_, n)| *n == 0).count();
        let share = unmatched as f64 / eligible.len() as f64;
        let severity = if share > ERROR_SHARE {
            Severity::Error
        } else if share > WARN_SHARE {
            Severity::Warning
        } else {
            Severity::Info
        };

        eligible
            .into_iter()
            .filter_map(|(s, n)| match n {
                0 => Some(
                    ValidationViolation::new(self.id(), severity, text::squash(s.text))
                        .at(s.offset)
                        .suggest("state an attribute and value of the entity in this sentence"),
                ),
                1 => None,
                _ => Some(
                    ValidationViolation::new(self.id(), Severity::Info, text::squash(s.text))
                        .at(s.offset)
                        .suggest(format!("sentence states {n} facts; consider splitting it")),
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{brief, section};

    fn triples() -> Vec<EavTriple> {
        vec![
            EavTriple::new("solar panel", "lifespan", "25 years"),
            EavTriple::new("solar panel", "efficiency", "22 percent"),
            EavTriple::new("solar panel", "cost", "300 dollars"),
        ]
    }

    const UNMATCHED: &str =
        "Homeowners often compare several local installers before signing any long contract today.";
    const ONE_MATCH: &str = "A typical solar panel keeps producing power for about 25 years.";

    #[test]
    fn unmatched_sentence_is_flagged_matched_is_not() {
        let mut b = brief();
        b.eav_triples = triples();
        let s = section("s", "Lifespan");
        let ctx = ValidationContext::new(&s, &b);

        assert_eq!(text::word_count(UNMATCHED), 12);
        assert_eq!(count_matches(UNMATCHED, &b.eav_triples, &b.central_entity), 0);
        assert_eq!(count_matches(ONE_MATCH, &b.eav_triples, &b.central_entity), 1);

        let content = format!("{ONE_MATCH} {UNMATCHED}");
        let found = EavDensity.check(&content, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_text, UNMATCHED);
        // One of two eligible sentences unmatched: 50% is a warning.
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn severity_scales_with_unmatched_share() {
        let mut b = brief();
        b.eav_triples = triples();
        let s = section("s", "Lifespan");
        let ctx = ValidationContext::new(&s, &b);

        let mostly_unmatched = format!("{UNMATCHED} {UNMATCHED} {ONE_MATCH}");
        let found = EavDensity.check(&mostly_unmatched, &ctx);
        assert!(found.iter().all(|v| v.severity == Severity::Error));
        assert_eq!(found.len(), 2);

        let mostly_matched = format!("{ONE_MATCH} {ONE_MATCH} {ONE_MATCH} {UNMATCHED}");
        let found = EavDensity.check(&mostly_matched, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Info);
    }

    #[test]
    fn multi_fact_sentence_is_split_candidate() {
        let mut b = brief();
        b.eav_triples = triples();
        let s = section("s", "Overview");
        let ctx = ValidationContext::new(&s, &b);

        let content = "Each solar panel costs 300 dollars and lasts for roughly 25 years.";
        let found = EavDensity.check(content, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Info);
        assert!(found[0].suggestion.contains("splitting"));
    }

    #[test]
    fn skipped_without_triples_or_short_sentences() {
        let b = brief();
        let s = section("s", "Overview");
        let ctx = ValidationContext::new(&s, &b);
        assert!(EavDensity.check(UNMATCHED, &ctx).is_empty());

        let mut b = brief();
        b.eav_triples = triples();
        let ctx = ValidationContext::new(&s, &b);
        assert!(EavDensity.check("Short one here.", &ctx).is_empty());
    }
}
