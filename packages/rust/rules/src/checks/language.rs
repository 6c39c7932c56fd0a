//! Word-level checks: prohibited language and hedging modality.

use std::sync::LazyLock;

use regex::Regex;

use articleforge_shared::{Severity, ValidationViolation};

use crate::text;
use crate::validator::{Check, ValidationContext};

/// A compiled pattern with the severity and advice it carries.
struct Pattern {
    re: Regex,
    severity: Severity,
    suggestion: &'static str,
}

pub(crate) fn word_alternation(words: &[&str]) -> Regex {
    let alts: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))).expect("valid regex")
}

// ---------------------------------------------------------------------------
// prohibited_language
// ---------------------------------------------------------------------------

/// Intensifiers and filler that add no information.
pub const FILLER_WORDS: &[&str] = &[
    "very", "really", "basically", "actually", "literally", "simply", "quite", "extremely",
    "totally", "definitely", "incredibly",
];

/// First-person or unattributed opinion.
pub const HEDGING_OPINIONS: &[&str] = &[
    "i think",
    "i believe",
    "i feel",
    "we believe",
    "we think",
    "in my opinion",
    "in our opinion",
    "it seems",
    "arguably",
    "some would say",
    "it could be argued",
];

/// Figurative comparisons instead of direct statements.
pub const ANALOGIES: &[&str] = &[
    "like a",
    "like an",
    "think of it as",
    "think of it like",
    "similar to a",
    "just as a",
    "imagine a",
    "akin to",
];

/// Stock openers and transitions.
pub const FLUFF_PHRASES: &[&str] = &[
    "in today's world",
    "in this article",
    "let's dive",
    "dive into",
    "it is important to note",
    "it's important to note",
    "when it comes to",
    "without further ado",
    "in the world of",
    "needless to say",
    "at the end of the day",
];

static PROHIBITED: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    vec![
        Pattern {
            re: word_alternation(FILLER_WORDS),
            severity: Severity::Warning,
            suggestion: "remove the filler word",
        },
        Pattern {
            re: word_alternation(HEDGING_OPINIONS),
            severity: Severity::Error,
            suggestion: "state the fact directly without opinion framing",
        },
        Pattern {
            re: word_alternation(ANALOGIES),
            severity: Severity::Error,
            suggestion: "replace the analogy with a literal attribute and value",
        },
        Pattern {
            re: word_alternation(FLUFF_PHRASES),
            severity: Severity::Warning,
            suggestion: "delete the stock phrase and start with the answer",
        },
    ]
});

pub struct ProhibitedLanguage;

impl Check for ProhibitedLanguage {
    fn id(&self) -> &'static str {
        "prohibited_language"
    }

    fn check(&self, content: &str, _ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let mut found: Vec<ValidationViolation> = PROHIBITED
            .iter()
            .flat_map(|p| {
                p.re.find_iter(content).map(move |m| {
                    ValidationViolation::new(self.id(), p.severity, m.as_str())
                        .at(m.start())
                        .suggest(p.suggestion)
                })
            })
            .collect();
        found.sort_by_key(|v| v.position);
        found
    }
}

// ---------------------------------------------------------------------------
// modality
// ---------------------------------------------------------------------------

pub const HEDGING_MODALS: &[&str] = &["might be", "could be", "may be", "possibly"];

/// Heading terms that make possibility language legitimate.
pub const RISK_CONTEXT_TERMS: &[&str] = &[
    "risk",
    "risks",
    "side effect",
    "side effects",
    "danger",
    "dangers",
    "dangerous",
    "hazard",
    "hazards",
    "complication",
    "complications",
    "drawback",
    "drawbacks",
    "downside",
    "downsides",
    "can",
    "could",
    "may",
    "might",
    "possible",
    "possibility",
    "warning",
    "warnings",
];

static MODAL_RE: LazyLock<Regex> = LazyLock::new(|| word_alternation(HEDGING_MODALS));
static RISK_RE: LazyLock<Regex> = LazyLock::new(|| word_alternation(RISK_CONTEXT_TERMS));

pub struct Modality;

impl Check for Modality {
    fn id(&self) -> &'static str {
        "modality"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        if RISK_RE.is_match(&ctx.section.heading) {
            return Vec::new();
        }

        text::prose_sentences(content)
            .into_iter()
            // Questions are not factual claims.
            .filter(|s| !s.text.ends_with('?'))
            .flat_map(|s| {
                MODAL_RE.find_iter(s.text).map(move |m| {
                    ValidationViolation::new(self.id(), Severity::Warning, m.as_str())
                        .at(s.offset + m.start())
                        .suggest("state the fact with a definite verb (is, are, has)")
                })
            })
            .collect()
    }
}
