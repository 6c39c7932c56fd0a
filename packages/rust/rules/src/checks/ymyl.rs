//! Your-Money-or-Your-Life topics need a qualified answer.

use std::sync::LazyLock;

use regex::Regex;

use articleforge_shared::{Severity, ValidationViolation};

use super::language::word_alternation;
use crate::text;
use crate::validator::{Check, ValidationContext};

pub const HEALTH_TERMS: &[&str] = &[
    "health", "medical", "medication", "medicine", "disease", "symptom", "symptoms", "treatment",
    "diagnosis", "dosage", "dose", "pregnancy", "illness", "injury", "therapy", "surgery",
    "cancer", "diabetes", "allergy", "prescription", "vaccine",
];

pub const FINANCE_TERMS: &[&str] = &[
    "loan", "loans", "mortgage", "invest", "investing", "investment", "tax", "taxes", "credit",
    "debt", "retirement", "pension", "insurance", "stock", "stocks", "interest rate", "savings",
    "financing", "bankruptcy",
];

pub const LEGAL_TERMS: &[&str] = &[
    "legal", "law", "lawsuit", "attorney", "lawyer", "contract", "liability", "court", "custody",
    "divorce", "visa", "immigration", "permit", "regulation", "regulations",
];

pub const SAFETY_TERMS: &[&str] = &[
    "safety", "unsafe", "toxic", "poison", "fire", "electrical", "electrocution", "hazardous",
    "emergency", "overdose", "carbon monoxide",
];

/// Conditions, exceptions and consultation advice that qualify an answer.
pub const QUALIFIERS: &[&str] = &[
    "unless",
    "except",
    "depending on",
    "depends on",
    "in some cases",
    "if you",
    "consult",
    "speak with",
    "talk to",
    "qualified",
    "professional",
    "advisor",
    "licensed",
    "may vary",
    "varies",
    "individual circumstances",
];

static TOPICS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("health", word_alternation(HEALTH_TERMS)),
        ("finance", word_alternation(FINANCE_TERMS)),
        ("legal", word_alternation(LEGAL_TERMS)),
        ("safety", word_alternation(SAFETY_TERMS)),
    ]
});

static QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| word_alternation(QUALIFIERS));

/// The first YMYL topic matched by the heading or body, with the matched term.
pub fn ymyl_topic(heading: &str, body: &str) -> Option<(&'static str, String)> {
    TOPICS.iter().find_map(|(topic, re)| {
        re.find(heading)
            .or_else(|| re.find(body))
            .map(|m| (*topic, m.as_str().to_string()))
    })
}

pub struct YmylSafeAnswer;

impl Check for YmylSafeAnswer {
    fn id(&self) -> &'static str {
        "ymyl_safe_answer"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let Some((topic, term)) = ymyl_topic(&ctx.section.heading, content) else {
            return Vec::new();
        };
        if QUALIFIER_RE.is_match(&text::strip_inline(content)) {
            return Vec::new();
        }
        vec![
            ValidationViolation::new(self.id(), Severity::Error, term).suggest(format!(
                "{topic} topic: add a condition or exception clause, or recommend consulting a professional"
            )),
        ]
    }
}
