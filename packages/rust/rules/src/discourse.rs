//! Discourse handoff between consecutive sections.
//!
//! The chainer looks at the last sentence of a finished section, pulls out
//! the object of its main verb and hands it to the next section's prompt so
//! the new section can open by picking up that object.

use std::sync::LazyLock;

use regex::Regex;

use articleforge_shared::DiscourseContext;

use crate::text;

/// Longest object phrase carried forward.
pub const MAX_OBJECT_WORDS: usize = 6;

/// Verb groups tried in order; the first group with a match wins.
const VERB_GROUPS: &[&[&str]] = &[
    &[
        "requires", "require", "needs", "need", "provides", "provide", "includes", "include",
        "supports", "support", "produces", "produce", "reduces", "reduce", "offers", "offer",
        "uses", "use", "involves", "involve", "creates", "create", "allows", "allow",
        "contains", "contain", "generates", "generate", "delivers", "deliver",
    ],
    &["is", "are", "was", "were", "becomes", "become"],
];

const DETERMINERS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "its", "their", "your", "our", "his",
    "her", "some", "any", "each", "every",
];

static VERB_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    VERB_GROUPS
        .iter()
        .map(|group| {
            Regex::new(&format!(r"(?i)\b(?:{})\s+", group.join("|"))).expect("valid regex")
        })
        .collect()
});

/// Clause boundaries that end an object phrase.
static CLAUSE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[,;:()\u{2013}\u{2014}]|\s(?:and|but|which|because|while|so|when|where)\s")
        .expect("valid regex")
});

/// Derives the [`DiscourseContext`] handed from one section to the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextChainer;

impl ContextChainer {
    pub fn new() -> Self {
        Self
    }

    /// Context for the section following `finished`. Empty when `finished`
    /// has no prose.
    pub fn extract_for_next(&self, finished: &str) -> DiscourseContext {
        let prose = text::strip_inline(&text::prose(finished));
        let Some(paragraph) = prose.rsplit("\n\n").map(str::trim).find(|p| !p.is_empty())
        else {
            return DiscourseContext::empty();
        };
        let paragraph = text::squash(paragraph);

        let last_sentence = text::sentences(&paragraph)
            .last()
            .map(|s| s.text.to_string())
            .unwrap_or_else(|| paragraph.clone());

        let last_object_phrase = object_phrase(&last_sentence);
        let subject_hint = last_object_phrase.as_ref().map(|object| {
            format!(
                "Open this section by referring back to \"{object}\" from the previous section."
            )
        });

        DiscourseContext {
            previous_paragraph: paragraph,
            last_sentence,
            last_object_phrase,
            subject_hint,
        }
    }
}

/// The object of the sentence's main verb, cleaned and capped.
pub fn object_phrase(sentence: &str) -> Option<String> {
    VERB_PATTERNS.iter().find_map(|re| {
        let m = re.find_iter(sentence).last()?;
        clean_phrase(&sentence[m.end()..])
    })
}

fn clean_phrase(raw: &str) -> Option<String> {
    let clause = CLAUSE_END_RE
        .find(raw)
        .map(|m| &raw[..m.start()])
        .unwrap_or(raw);

    let mut words: Vec<&str> = clause
        .split_whitespace()
        .map(|w| w.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '%'))
        .filter(|w| !w.is_empty())
        .collect();

    let lead = words
        .iter()
        .take_while(|w| DETERMINERS.contains(&w.to_lowercase().as_str()))
        .count();
    words.drain(..lead);
    words.truncate(MAX_OBJECT_WORDS);

    (!words.is_empty()).then(|| words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn extracts_object_of_last_sentence() {
        let ctx = ContextChainer::new().extract_for_next(
            "## Mounting\n\nSolar panels convert light.\n\nEvery installation requires a sturdy mounting rack.",
        );
        assert_eq!(
            ctx.last_sentence,
            "Every installation requires a sturdy mounting rack."
        );
        assert_eq!(ctx.last_object_phrase.as_deref(), Some("sturdy mounting rack"));
        assert!(ctx.subject_hint.unwrap().contains("sturdy mounting rack"));
        assert_eq!(
            ctx.previous_paragraph,
            "Every installation requires a sturdy mounting rack."
        );
    }

    #[test]
    fn verb_groups_are_ordered() {
        assert_eq!(
            object_phrase("The inverter requires maintenance and is reliable.").as_deref(),
            Some("maintenance")
        );
        assert_eq!(
            object_phrase("Leasing is the cheapest option for most homes, by far.").as_deref(),
            Some("cheapest option for most homes")
        );
    }

    #[test]
    fn phrase_is_capped() {
        assert_eq!(
            object_phrase("A panel includes one very long list of many small silicon cells.")
                .as_deref(),
            Some("one very long list of many")
        );
    }

    #[test]
    fn list_items_count_as_prose() {
        let ctx = ContextChainer::new().extract_for_next("Intro text.\n\n- Panels require sunlight.");
        assert_eq!(ctx.last_object_phrase.as_deref(), Some("sunlight"));
    }

    #[test]
    fn trailing_blank_paragraphs_are_skipped() {
        let ctx = ContextChainer::new()
            .extract_for_next("Panels age slowly.\n\nEvery roof requires flashing.\n\n\n\n");
        assert_eq!(ctx.previous_paragraph, "Every roof requires flashing.");
        assert_eq!(ctx.last_object_phrase.as_deref(), Some("flashing"));
    }

    #[test]
    fn empty_input_gives_empty_context() {
        let chainer = ContextChainer::new();
        assert!(chainer.extract_for_next("").is_empty());
        assert!(chainer.extract_for_next("## Only a heading\n").is_empty());

        let ctx = chainer.extract_for_next("Sunlight varies.");
        assert_eq!(ctx.last_sentence, "Sunlight varies.");
        assert_eq!(ctx.last_object_phrase, None);
        assert_eq!(ctx.subject_hint, None);
    }

    proptest! {
        #[test]
        fn object_phrase_is_bounded_and_deterministic(
            sentence in "[A-Za-z ,.]{0,200}",
        ) {
            let first = object_phrase(&sentence);
            prop_assert_eq!(&first, &object_phrase(&sentence));
            if let Some(p) = first {
                let words: Vec<&str> = p.split_whitespace().collect();
                prop_assert!(!words.is_empty());
                prop_assert!(words.len() <= MAX_OBJECT_WORDS);
                prop_assert!(!DETERMINERS.contains(&words[0].to_lowercase().as_str()));
            }
        }

        #[test]
        fn chainer_never_panics(body in "[A-Za-z #\\-\n.]{0,300}") {
            let ctx = ContextChainer::new().extract_for_next(&body);
            if ctx.last_object_phrase.is_none() {
                prop_assert!(ctx.subject_hint.is_none());
            }
        }
    }
}
