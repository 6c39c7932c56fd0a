//! Structural checks: heading answers, centerpiece definition, format codes
//! and attribute ordering.

use std::sync::LazyLock;

use regex::Regex;

use articleforge_shared::{AttributeCategory, FormatCode, Severity, ValidationViolation};

use crate::text::{self, BlockKind};
use crate::validator::{Check, ValidationContext};

// ---------------------------------------------------------------------------
// heading_answer
// ---------------------------------------------------------------------------

/// Verbs that make an opening sentence a direct answer.
pub const DEFINITIVE_VERBS: &[&str] = &[
    "is", "are", "was", "were", "means", "mean", "refers", "refer", "include", "includes",
    "require", "requires", "provide", "provides", "cost", "costs", "take", "takes", "has", "have",
    "contain", "contains", "consist", "consists", "last", "lasts", "use", "uses", "need", "needs",
    "work", "works", "reduce", "reduces", "increase", "increases", "cause", "causes", "produce",
    "produces", "convert", "converts", "generate", "generates", "allow", "allows", "offer",
    "offers", "measure", "measures", "weigh", "weighs", "range", "ranges", "depend", "depends",
    "vary", "varies", "equal", "equals", "become", "becomes", "remain", "remains", "protect",
    "protects", "prevent", "prevents", "support", "supports", "affect", "affects", "lower",
    "lowers", "raise", "raises", "save", "saves", "create", "creates",
];

fn has_definitive_verb(sentence: &str) -> bool {
    text::words(sentence)
        .into_iter()
        .any(|w| DEFINITIVE_VERBS.contains(&w.to_lowercase().as_str()))
}

pub struct HeadingAnswer;

impl Check for HeadingAnswer {
    fn id(&self) -> &'static str {
        "heading_answer"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let Some(first) = text::first_sentence(content) else {
            return vec![
                ValidationViolation::new(self.id(), Severity::Error, "")
                    .suggest("open the section with a sentence that answers the heading"),
            ];
        };

        let mut found = Vec::new();
        if !has_definitive_verb(first.text) {
            found.push(
                ValidationViolation::new(self.id(), Severity::Error, text::squash(first.text))
                    .at(first.offset)
                    .suggest("answer the heading with a definitive verb (is, are, means, costs)"),
            );
        }

        let terms = text::salient_terms(&ctx.section.heading);
        if !terms.is_empty() {
            let tokens = text::token_set(first.text);
            let covered = terms.iter().filter(|t| tokens.contains(*t)).count();
            if covered * 2 < terms.len() {
                let missing: Vec<&str> = terms
                    .iter()
                    .filter(|t| !tokens.contains(*t))
                    .map(String::as_str)
                    .collect();
                found.push(
                    ValidationViolation::new(self.id(), Severity::Error, text::squash(first.text))
                        .at(first.offset)
                        .suggest(format!(
                            "repeat the heading's key terms in the first sentence: {}",
                            missing.join(", ")
                        )),
                );
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// centerpiece
// ---------------------------------------------------------------------------

/// Characters of the lead section in which the entity must be defined.
pub const CENTERPIECE_WINDOW: usize = 400;

/// Whether `text` defines `entity` ("X is", "Xs are", "X refers to", ...).
pub fn defines_entity(text: &str, entity: &str) -> bool {
    let entity = entity.trim();
    if entity.is_empty() {
        return false;
    }
    let pattern = format!(
        r"(?i)\b{}(?:s|es)?\b\s+(?:is|are|refers\s+to|means|describes|consists\s+of)\b",
        regex::escape(entity)
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

pub struct Centerpiece;

impl Check for Centerpiece {
    fn id(&self) -> &'static str {
        "centerpiece"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        if !ctx.is_lead {
            return Vec::new();
        }
        centerpiece_violations(self.id(), content, ctx.central_entity)
    }
}

/// Shared with the audit, which applies it to the article intro.
pub fn centerpiece_violations(
    rule_id: &'static str,
    content: &str,
    entity: &str,
) -> Vec<ValidationViolation> {
    let prose = text::strip_inline(&text::prose(content));
    let window = text::char_prefix(&prose, CENTERPIECE_WINDOW);

    if !text::contains_phrase(window, entity) {
        return vec![
            ValidationViolation::new(rule_id, Severity::Error, text::squash(window))
                .suggest(format!(
                    "name '{entity}' within the first {CENTERPIECE_WINDOW} characters"
                )),
        ];
    }
    if !defines_entity(window, entity) {
        return vec![
            ValidationViolation::new(rule_id, Severity::Error, entity)
                .at(text::find_phrase(window, entity).unwrap_or(0))
                .suggest(format!("define it early: \"{entity} is ...\"")),
        ];
    }
    Vec::new()
}

// ---------------------------------------------------------------------------
// format_code
// ---------------------------------------------------------------------------

static DEFINITIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:is|are|refers\s+to|means|describes|consists\s+of)\b")
        .expect("valid regex")
});

/// Word bounds per format code (inclusive).
pub fn word_bounds(code: FormatCode) -> Option<(usize, Option<usize>)> {
    match code {
        FormatCode::Fs => Some((40, Some(60))),
        FormatCode::Paa => Some((35, Some(80))),
        FormatCode::Definitive => Some((150, None)),
        FormatCode::Listing | FormatCode::Table | FormatCode::Prose => None,
    }
}

/// Violations of a body against a format code's structural contract.
pub fn format_violations(
    rule_id: &'static str,
    content: &str,
    code: FormatCode,
) -> Vec<ValidationViolation> {
    let mut found = Vec::new();
    let error = |matched: &str, suggestion: String| {
        ValidationViolation::new(rule_id, Severity::Error, matched).suggest(suggestion)
    };

    if let Some((min, max)) = word_bounds(code) {
        let count = text::word_count(&text::prose(content));
        let too_long = max.is_some_and(|m| count > m);
        if count < min || too_long {
            let range = match max {
                Some(m) => format!("{min}-{m}"),
                None => format!("at least {min}"),
            };
            found.push(error(
                &format!("{count} words"),
                format!("{} answers need {range} words", code.as_str()),
            ));
        }
    }

    if matches!(code, FormatCode::Fs | FormatCode::Paa) {
        let definitional = text::first_sentence(content)
            .is_some_and(|s| DEFINITIONAL_RE.is_match(s.text));
        if !definitional {
            found.push(error(
                "",
                format!("{} answers start with a definition (\"X is ...\")", code.as_str()),
            ));
        }
    }

    match code {
        FormatCode::Listing => found.extend(listing_violations(rule_id, content)),
        FormatCode::Table if !text::has_table(content) => found.push(error(
            "",
            "add a Markdown table with a header row and separator".into(),
        )),
        _ => {}
    }
    found
}

/// A LISTING body needs a list preceded by prose stating the item count.
fn listing_violations(rule_id: &'static str, content: &str) -> Vec<ValidationViolation> {
    let blocks = text::blocks(content);
    let Some(list_idx) = blocks.iter().position(|b| b.kind == BlockKind::List) else {
        return vec![
            ValidationViolation::new(rule_id, Severity::Error, "")
                .suggest("LISTING sections need a bulleted or numbered list"),
        ];
    };

    let list = blocks[list_idx];
    let items = text::list_items(list.text).len();
    let preamble = blocks[..list_idx]
        .iter()
        .rev()
        .find(|b| b.kind == BlockKind::Paragraph);

    match preamble.and_then(|p| text::stated_count(p.text)) {
        None => vec![
            ValidationViolation::new(rule_id, Severity::Error, "")
                .at(list.offset)
                .suggest(format!("introduce the list with its item count ({items})")),
        ],
        Some(n) if n != items => vec![
            ValidationViolation::new(rule_id, Severity::Error, format!("{n} stated, {items} listed"))
                .at(list.offset)
                .suggest("make the stated count match the number of items"),
        ],
        Some(_) => Vec::new(),
    }
}

pub struct FormatCheck;

impl Check for FormatCheck {
    fn id(&self) -> &'static str {
        "format_code"
    }

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        format_violations(self.id(), content, ctx.section.format_code)
    }
}

// ---------------------------------------------------------------------------
// attribute_ordering
// ---------------------------------------------------------------------------

/// Categories a section of category `c` must not follow.
pub fn must_not_follow(c: AttributeCategory) -> &'static [AttributeCategory] {
    use AttributeCategory::*;
    match c {
        Unique => &[Root, Rare, Common],
        Root => &[Rare, Common],
        Rare => &[Common],
        Common | Unclassified => &[],
    }
}

pub struct AttributeOrdering;

impl Check for AttributeOrdering {
    fn id(&self) -> &'static str {
        "attribute_ordering"
    }

    fn check(&self, _content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        let category = ctx.section.attribute_category;
        let blocked = must_not_follow(category);
        match ctx.preceding.iter().find(|p| blocked.contains(p)) {
            Some(earlier) => vec![
                ValidationViolation::new(self.id(), Severity::Error, ctx.section.heading.as_str())
                    .suggest(format!(
                        "{} section placed after a {} section",
                        category.as_str(),
                        earlier.as_str()
                    )),
            ],
            None => Vec::new(),
        }
    }
}
