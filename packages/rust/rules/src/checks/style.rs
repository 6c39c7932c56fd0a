//! Brief obligations and readability limits.

use articleforge_shared::{Severity, ValidationViolation};

use crate::text;
use crate::validator::{Check, ValidationContext};

pub const MAX_SENTENCE_WORDS: usize = 35;
pub const MAX_PARAGRAPH_WORDS: usize = 150;

/// Words a section must not open with: the reader has no referent yet.
pub const OPENING_PRONOUNS: &[&str] = &[
    "it", "its", "this", "they", "these", "those", "he", "she", "that", "them", "their",
];

pub struct RequiredPhrases;

impl Check for RequiredPhrases {
    fn id(&self) -> &'static str {
        "required_phrases"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let plain = text::strip_inline(content);
        ctx.section
            .required_phrases
            .iter()
            .filter(|p| !p.trim().is_empty() && !text::contains_phrase(&plain, p))
            .map(|p| {
                ValidationViolation::new(self.id(), Severity::Error, p.as_str())
                    .suggest(format!("include the phrase \"{p}\""))
            })
            .collect()
    }
}

pub struct SentenceLength;

impl Check for SentenceLength {
    fn id(&self) -> &'static str {
        "sentence_length"
    }

    fn check(&self, content: &str, _ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        text::prose_sentences(content)
            .into_iter()
            .filter_map(|s| {
                let n = text::word_count(s.text);
                (n > MAX_SENTENCE_WORDS).then(|| {
                    ValidationViolation::new(
                        self.id(),
                        Severity::Warning,
                        text::char_prefix(&text::squash(s.text), 80),
                    )
                    .at(s.offset)
                    .suggest(format!("{n} words; split below {MAX_SENTENCE_WORDS}"))
                })
            })
            .collect()
    }
}

pub struct ParagraphLength;

impl Check for ParagraphLength {
    fn id(&self) -> &'static str {
        "paragraph_length"
    }

    fn check(&self, content: &str, _ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        text::paragraphs(content)
            .into_iter()
            .filter_map(|p| {
                let n = text::word_count(p.text);
                (n > MAX_PARAGRAPH_WORDS).then(|| {
                    ValidationViolation::new(
                        self.id(),
                        Severity::Warning,
                        text::char_prefix(&text::squash(p.text), 80),
                    )
                    .at(p.offset)
                    .suggest(format!("{n} words; break into paragraphs of at most {MAX_PARAGRAPH_WORDS}"))
                })
            })
            .collect()
    }
}

pub struct PronounOpening;

impl Check for PronounOpening {
    fn id(&self) -> &'static str {
        "pronoun_opening"
    }

    fn check(&self, content: &str, _ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let Some(first) = text::first_sentence(content) else {
            return Vec::new();
        };
        let Some(word) = text::words(first.text).into_iter().next() else {
            return Vec::new();
        };
        if !OPENING_PRONOUNS.contains(&word.to_lowercase().as_str()) {
            return Vec::new();
        }
        vec![
            ValidationViolation::new(self.id(), Severity::Warning, word)
                .at(first.offset)
                .suggest("open with the entity name instead of a pronoun"),
        ]
    }
}
