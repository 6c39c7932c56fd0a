//! Pass 8: deterministic compliance audit of a finished draft.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, instrument};

use articleforge_shared::{
    AttributeCategory, AuditReport, AuditRuleResult, Brief, SectionDefinition, Severity,
    ValidationViolation,
};

use crate::checks::{centerpiece_violations, format_violations};
use crate::text::{self, BlockKind, DocSection, Outline};
use crate::validator::{RulesValidator, ValidationContext, has_errors};

/// Every audit rule, in report order.
pub const AUDIT_RULES: [&str; 26] = [
    "heading_hierarchy",
    "single_h1",
    "h1_central_entity",
    "duplicate_headings",
    "empty_sections",
    "list_count_preamble",
    "table_header",
    "pronoun_density",
    "link_position",
    "anchor_repetition",
    "anchor_coverage",
    "centerpiece",
    "content_zone_border",
    "intro_summary_alignment",
    "query_format_alignment",
    "prohibited_language",
    "modality",
    "ymyl_safe_answer",
    "eav_density",
    "heading_answer",
    "attribute_ordering",
    "required_phrases",
    "sentence_length",
    "paragraph_length",
    "word_count",
    "pronoun_opening",
];

/// Section checks that also run against the intro.
const INTRO_RULES: &[&str] = &[
    "prohibited_language",
    "modality",
    "sentence_length",
    "paragraph_length",
];

pub const MAX_PRONOUN_DENSITY: f64 = 0.04;
pub const MAX_ANCHOR_REPEATS: usize = 3;
/// Share of the brief's target word count a draft must reach.
pub const MIN_WORD_SHARE: f64 = 0.9;
/// Lists shorter than this need no count preamble.
const PREAMBLE_MIN_ITEMS: usize = 3;

/// A draft section paired with the brief definition it answers.
struct MappedSection {
    doc: DocSection,
    def: SectionDefinition,
    /// Whether `def` came from the brief.
    mapped: bool,
}

struct Draft<'a> {
    md: &'a str,
    brief: &'a Brief,
    outline: Outline,
    sections: Vec<MappedSection>,
    /// Shallowest section level present.
    top_level: u8,
}

impl<'a> Draft<'a> {
    /// Parse `md` and pair each section with its brief definition.
    ///
    /// `order` lists brief section keys in the order they were written.
    /// Sections are matched by heading when every heading is still found in
    /// the brief. Otherwise, when the draft has one section per key, they
    /// are paired by position so reworded headings keep their definition.
    fn parse(md: &'a str, brief: &'a Brief, order: &[&str]) -> Self {
        let outline = text::outline(md);
        let by_heading: Vec<Option<&SectionDefinition>> = outline
            .sections
            .iter()
            .map(|doc| brief.section_by_heading(&doc.heading))
            .collect();

        let reworded = by_heading.iter().any(Option::is_none);
        let positional: Option<Vec<&SectionDefinition>> =
            if reworded && order.len() == outline.sections.len() {
                order.iter().map(|key| brief.section(key)).collect()
            } else {
                None
            };

        let defs: Vec<Option<&SectionDefinition>> = match positional {
            Some(defs) => {
                debug!(sections = defs.len(), "headings reworded, mapping sections by position");
                defs.into_iter().map(Some).collect()
            }
            None => by_heading,
        };

        let sections: Vec<MappedSection> = outline
            .sections
            .iter()
            .zip(defs)
            .map(|(doc, def)| match def {
                Some(def) => MappedSection {
                    doc: doc.clone(),
                    def: def.clone(),
                    mapped: true,
                },
                None => MappedSection {
                    doc: doc.clone(),
                    def: unmapped_definition(doc),
                    mapped: false,
                },
            })
            .collect();
        let top_level = sections.iter().map(|s| s.doc.level).min().unwrap_or(2);
        Self {
            md,
            brief,
            outline,
            sections,
            top_level,
        }
    }

    fn top_sections(&self) -> impl Iterator<Item = &MappedSection> {
        self.sections
            .iter()
            .filter(move |s| s.doc.level == self.top_level)
    }

    /// The lead text: the intro, or the first section when there is none.
    fn lead(&self) -> &str {
        if self.outline.intro.trim().is_empty() {
            self.sections
                .first()
                .map(|s| s.doc.body.as_str())
                .unwrap_or("")
        } else {
            &self.outline.intro
        }
    }
}

/// A section the brief does not describe is audited as plain prose.
fn unmapped_definition(doc: &DocSection) -> SectionDefinition {
    SectionDefinition {
        key: doc.heading.to_lowercase(),
        heading: doc.heading.clone(),
        level: doc.level,
        order: 0.0,
        attribute_category: AttributeCategory::Unclassified,
        format_code: Default::default(),
        required_phrases: Vec::new(),
        anchor_targets: Vec::new(),
        query_priority: 0,
    }
}

/// Whether `text` names the entity, allowing plural and possessive forms.
pub fn mentions_entity(text: &str, entity: &str) -> bool {
    if text::contains_phrase(text, entity) {
        return true;
    }
    let terms = text::salient_terms(entity);
    if terms.is_empty() {
        return false;
    }
    let tokens = text::token_set(text);
    terms.iter().all(|t| tokens.contains(t))
}

fn error(rule: &'static str, matched: impl Into<String>, suggestion: impl Into<String>) -> ValidationViolation {
    ValidationViolation::new(rule, Severity::Error, matched).suggest(suggestion)
}

/// Runs the section checks plus document-level checks over a final draft.
pub struct AuditEngine {
    validator: RulesValidator,
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self::new(RulesValidator::new())
    }
}

impl AuditEngine {
    pub fn new(validator: RulesValidator) -> Self {
        Self { validator }
    }

    /// Score `draft` against `brief`, assuming the draft lists the brief's
    /// sections in ascending `order`.
    pub fn audit(&self, draft: &str, brief: &Brief) -> AuditReport {
        let mut defs: Vec<&SectionDefinition> = brief.sections.iter().collect();
        defs.sort_by(|a, b| a.order.total_cmp(&b.order));
        let order: Vec<&str> = defs.iter().map(|d| d.key.as_str()).collect();
        self.audit_in_order(draft, brief, &order)
    }

    /// Score `draft` against `brief`, where `order` holds the brief section
    /// keys in the order the draft was written. A rule passes when it
    /// reports no error-severity violation; `score = round(100 * passing / total)`.
    #[instrument(skip_all, fields(brief_id = %brief.id))]
    pub fn audit_in_order(&self, draft: &str, brief: &Brief, order: &[&str]) -> AuditReport {
        let d = Draft::parse(draft, brief, order);

        let results: Vec<AuditRuleResult> = AUDIT_RULES
            .iter()
            .map(|&rule| {
                let violations = self.run_rule(rule, &d);
                AuditRuleResult {
                    rule_id: rule.to_string(),
                    passed: !has_errors(&violations),
                    violations,
                }
            })
            .collect();

        let passing = results.iter().filter(|r| r.passed).count();
        let score = (100.0 * passing as f64 / results.len() as f64).round() as u8;
        debug!(score, passing, total = results.len(), "audit complete");

        AuditReport {
            score,
            results,
            checked_at: Utc::now(),
        }
    }

    fn run_rule(&self, rule: &'static str, d: &Draft<'_>) -> Vec<ValidationViolation> {
        match rule {
            "heading_hierarchy" => heading_hierarchy(d),
            "single_h1" => single_h1(d),
            "h1_central_entity" => h1_central_entity(d),
            "duplicate_headings" => duplicate_headings(d),
            "empty_sections" => empty_sections(d),
            "list_count_preamble" => list_count_preamble(d),
            "table_header" => table_header(d),
            "pronoun_density" => pronoun_density(d),
            "link_position" => link_position(d),
            "anchor_repetition" => anchor_repetition(d),
            "anchor_coverage" => anchor_coverage(d),
            "centerpiece" => centerpiece_violations(rule, d.lead(), &d.brief.central_entity),
            "content_zone_border" => content_zone_border(d),
            "intro_summary_alignment" => intro_summary_alignment(d),
            "query_format_alignment" => d
                .sections
                .iter()
                .filter(|s| s.mapped)
                .flat_map(|s| format_violations(rule, &s.doc.body, s.def.format_code))
                .collect(),
            "word_count" => word_count(d),
            _ => self.section_rule(rule, d),
        }
    }

    /// Apply a registry check to every section (and the intro where it
    /// makes sense), threading the preceding categories through.
    fn section_rule(&self, rule: &str, d: &Draft<'_>) -> Vec<ValidationViolation> {
        let Some(check) = self.validator.get(rule) else {
            return Vec::new();
        };
        let mut found = Vec::new();

        if INTRO_RULES.contains(&rule) && !d.outline.intro.is_empty() {
            let intro_def = unmapped_definition(&DocSection {
                level: 1,
                heading: d.brief.title.clone(),
                body: String::new(),
                offset: 0,
            });
            let ctx = ValidationContext::new(&intro_def, d.brief).lead(true);
            found.extend(check.check(&d.outline.intro, &ctx));
        }

        let mut preceding: Vec<AttributeCategory> = Vec::new();
        for s in &d.sections {
            let top = s.doc.level == d.top_level;
            let skip = (rule == "attribute_ordering" && !top)
                || (rule == "heading_answer" && s.doc.body.trim().is_empty());
            if !skip {
                let ctx = ValidationContext::new(&s.def, d.brief).after(&preceding);
                found.extend(check.check(&s.doc.body, &ctx));
            }
            if top {
                preceding.push(s.def.attribute_category);
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Document checks
// ---------------------------------------------------------------------------

fn heading_hierarchy(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let heads = text::headings(d.md);
    heads
        .windows(2)
        .filter(|w| w[1].level > w[0].level + 1)
        .map(|w| {
            error(
                "heading_hierarchy",
                w[1].text.as_str(),
                format!("H{} follows H{}; do not skip levels", w[1].level, w[0].level),
            )
            .at(w[1].offset)
        })
        .collect()
}

fn single_h1(d: &Draft<'_>) -> Vec<ValidationViolation> {
    match d.outline.h1_count {
        1 => Vec::new(),
        n => vec![error("single_h1", format!("{n} H1 headings"), "use exactly one H1")],
    }
}

fn h1_central_entity(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let entity = &d.brief.central_entity;
    match d.outline.title.as_deref() {
        Some(title) if mentions_entity(title, entity) => Vec::new(),
        Some(title) => vec![error(
            "h1_central_entity",
            title,
            format!("include '{entity}' in the H1"),
        )],
        None => vec![error("h1_central_entity", "", "add an H1 naming the central entity")],
    }
}

fn duplicate_headings(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let mut seen = HashSet::new();
    text::headings(d.md)
        .into_iter()
        .filter(|h| !seen.insert(text::squash(&h.text).to_lowercase()))
        .map(|h| {
            error("duplicate_headings", h.text.as_str(), "make every heading unique").at(h.offset)
        })
        .collect()
}

fn empty_sections(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let secs = &d.outline.sections;
    secs.iter()
        .enumerate()
        .filter(|(i, s)| {
            let has_children = secs.get(i + 1).is_some_and(|n| n.level > s.level);
            s.body.trim().is_empty() && !has_children
        })
        .map(|(_, s)| {
            error("empty_sections", s.heading.as_str(), "write content under the heading")
                .at(s.offset)
        })
        .collect()
}

fn list_count_preamble(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let blocks = text::blocks(d.md);
    let mut found = Vec::new();
    for (i, b) in blocks.iter().enumerate() {
        if b.kind != BlockKind::List {
            continue;
        }
        let items = text::list_items(b.text).len();
        if items < PREAMBLE_MIN_ITEMS {
            continue;
        }
        let preamble = i
            .checked_sub(1)
            .map(|p| blocks[p])
            .filter(|p| p.kind == BlockKind::Paragraph);
        match preamble.and_then(|p| text::stated_count(p.text)) {
            Some(n) if n == items => {}
            Some(n) => found.push(
                error(
                    "list_count_preamble",
                    format!("{n} stated, {items} listed"),
                    "make the preamble count match the list",
                )
                .at(b.offset),
            ),
            None => found.push(
                ValidationViolation::new("list_count_preamble", Severity::Warning, "")
                    .at(b.offset)
                    .suggest(format!("introduce the list with its item count ({items})")),
            ),
        }
    }
    found
}

fn table_header(d: &Draft<'_>) -> Vec<ValidationViolation> {
    text::blocks(d.md)
        .into_iter()
        .filter(|b| b.kind == BlockKind::Table && !text::table_has_header(b.text))
        .map(|b| {
            error(
                "table_header",
                text::char_prefix(b.text, 60),
                "add a header row followed by a |---| separator",
            )
            .at(b.offset)
        })
        .collect()
}

fn pronoun_density(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let prose = text::strip_inline(&text::prose(d.md));
    let words = text::words(&prose);
    if words.is_empty() {
        return Vec::new();
    }
    let pronouns = words.iter().filter(|w| text::is_pronoun(w)).count();
    let density = pronouns as f64 / words.len() as f64;
    if density <= MAX_PRONOUN_DENSITY {
        return Vec::new();
    }
    vec![error(
        "pronoun_density",
        format!("{pronouns} pronouns in {} words", words.len()),
        "replace pronouns with the entity name",
    )]
}

fn link_position(d: &Draft<'_>) -> Vec<ValidationViolation> {
    std::iter::once(d.outline.intro.as_str())
        .chain(d.sections.iter().map(|s| s.doc.body.as_str()))
        .filter_map(text::first_sentence)
        .flat_map(|s| text::links(s.text))
        .map(|l| {
            error(
                "link_position",
                l.anchor,
                "move the link out of the section's first sentence",
            )
        })
        .collect()
}

fn anchor_repetition(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let mut counts: HashMap<(String, String), usize> = HashMap::new();
    for l in text::links(d.md) {
        *counts
            .entry((l.anchor.to_lowercase(), l.target))
            .or_default() += 1;
    }
    let mut found: Vec<ValidationViolation> = counts
        .into_iter()
        .filter(|(_, n)| *n > MAX_ANCHOR_REPEATS)
        .map(|((anchor, target), n)| {
            error(
                "anchor_repetition",
                anchor,
                format!("anchor used {n} times for {target}; vary it or drop repeats"),
            )
        })
        .collect();
    found.sort_by(|a, b| a.matched_text.cmp(&b.matched_text));
    found
}

fn anchor_coverage(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let linked: HashSet<String> = text::links(d.md).into_iter().map(|l| l.target).collect();
    d.brief
        .sections
        .iter()
        .flat_map(|s| &s.anchor_targets)
        .filter(|a| !linked.contains(a.target.trim()))
        .map(|a| {
            error(
                "anchor_coverage",
                a.target.as_str(),
                format!("link '{}' to {}", a.anchor, a.target),
            )
        })
        .collect()
}

fn content_zone_border(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let mut found = Vec::new();
    let mut first_micro: Option<&MappedSection> = None;
    let mut has_macro = false;

    for s in d.top_sections() {
        let c = s.def.attribute_category;
        if c.is_macro() {
            has_macro = true;
            if let Some(micro) = first_micro {
                found.push(error(
                    "content_zone_border",
                    s.doc.heading.as_str(),
                    format!(
                        "{} section placed after the micro zone began at '{}'",
                        c.as_str(),
                        micro.doc.heading
                    ),
                ));
            }
        } else if matches!(c, AttributeCategory::Rare | AttributeCategory::Common)
            && first_micro.is_none()
        {
            first_micro = Some(s);
        }
    }

    if let Some(micro) = first_micro {
        let entity = &d.brief.central_entity;
        let opening = text::first_sentence(&micro.doc.body).map(|s| s.text).unwrap_or("");
        let bridged =
            mentions_entity(&micro.doc.heading, entity) || mentions_entity(opening, entity);
        if has_macro && !bridged {
            found.push(error(
                "content_zone_border",
                micro.doc.heading.as_str(),
                format!("bridge into the supplementary zone by naming '{entity}'"),
            ));
        }
    }
    found
}

fn intro_summary_alignment(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = d
        .top_sections()
        .flat_map(|s| text::salient_terms(&s.doc.heading))
        .filter(|t| seen.insert(t.clone()))
        .collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let intro = text::token_set(&d.outline.intro);
    let missing: Vec<&str> = terms
        .iter()
        .filter(|t| !intro.contains(*t))
        .map(String::as_str)
        .collect();
    let covered = terms.len() - missing.len();
    if covered * 2 >= terms.len() {
        return Vec::new();
    }
    vec![error(
        "intro_summary_alignment",
        format!("{covered}/{} heading terms", terms.len()),
        format!("summarize the article in the intro: {}", missing.join(", ")),
    )]
}

fn word_count(d: &Draft<'_>) -> Vec<ValidationViolation> {
    let Some(target) = d.brief.target_word_count.filter(|t| *t > 0) else {
        return Vec::new();
    };
    let count = text::word_count(&text::strip_inline(&text::prose(d.md)));
    let needed = (f64::from(target) * MIN_WORD_SHARE).ceil() as usize;
    if count >= needed {
        return Vec::new();
    }
    vec![error(
        "word_count",
        format!("{count} words"),
        format!("expand to at least {needed} words (target {target})"),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::section;
    use articleforge_shared::{AnchorTarget, FormatCode};

    fn solar_brief() -> Brief {
        let mut what = section("what", "What is a solar panel?");
        what.attribute_category = AttributeCategory::Unique;
        let mut cost = section("cost", "How much does a solar panel cost?");
        cost.attribute_category = AttributeCategory::Root;
        let mut types = section("types", "Solar panel types");
        types.attribute_category = AttributeCategory::Rare;
        types.format_code = FormatCode::Listing;
        Brief {
            id: "b1".into(),
            title: "Solar Panels".into(),
            central_entity: "solar panel".into(),
            target_word_count: None,
            eav_triples: Vec::new(),
            sections: vec![what, cost, types],
        }
    }

    const INTRO: &str = "# Solar Panels\n\n\
        A solar panel is a device converting sunlight into electricity. \
        Homes use a solar panel array to cut grid power bills.\n\n";
    const WHAT: &str = "## What is a solar panel?\n\n\
        A solar panel is a flat module of photovoltaic cells converting sunlight into direct current.\n\n";
    const COST: &str = "## How much does a solar panel cost?\n\n\
        A residential solar panel costs between 200 and 400 dollars before installation.\n\n";
    const TYPES: &str = "## Solar panel types\n\n\
        A solar panel is available in three types:\n\n\
        - Monocrystalline\n- Polycrystalline\n- Thin-film\n";

    fn good_draft() -> String {
        format!("{INTRO}{WHAT}{COST}{TYPES}")
    }

    fn failed(report: &AuditReport) -> Vec<&str> {
        report.failing().map(|r| r.rule_id.as_str()).collect()
    }

    #[test]
    fn clean_draft_scores_full_marks() {
        let report = AuditEngine::default().audit(&good_draft(), &solar_brief());
        assert_eq!(report.results.len(), 26);
        assert!(failed(&report).is_empty(), "failing: {:?}", failed(&report));
        assert_eq!(report.score, 100);
    }

    #[test]
    fn structural_failures() {
        let md = "# Solar Panels\n\nA solar panel is a device.\n\n#### Deep\n\nText here.\n\n\
                  # Another title\n\n## Deep\n\nSee [the guide](https://x.test/guide) for more.\n";
        let report = AuditEngine::default().audit(md, &solar_brief());
        let failing = failed(&report);
        for rule in ["heading_hierarchy", "single_h1", "duplicate_headings", "link_position"] {
            assert!(failing.contains(&rule), "{rule} should fail: {failing:?}");
        }
        let expected = (100.0 * report.passing() as f64 / 26.0).round() as u8;
        assert_eq!(report.score, expected);
    }

    #[test]
    fn list_count_mismatch_fails_preamble_and_format() {
        let md = good_draft().replace("three types", "four types");
        let report = AuditEngine::default().audit(&md, &solar_brief());
        let failing = failed(&report);
        assert!(failing.contains(&"list_count_preamble"));
        assert!(failing.contains(&"query_format_alignment"));
    }

    #[test]
    fn zone_order_is_enforced() {
        let md = format!("{INTRO}{WHAT}{TYPES}\n{COST}");
        let report = AuditEngine::default().audit(&md, &solar_brief());
        let failing = failed(&report);
        assert!(failing.contains(&"content_zone_border"));
        assert!(failing.contains(&"attribute_ordering"));
    }

    #[test]
    fn anchor_coverage_and_word_count_follow_the_brief() {
        let mut brief = solar_brief();
        brief.sections[1].anchor_targets = vec![AnchorTarget {
            anchor: "installation prices".into(),
            target: "https://x.test/cost".into(),
        }];
        brief.target_word_count = Some(1000);
        let report = AuditEngine::default().audit(&good_draft(), &brief);
        let failing = failed(&report);
        assert!(failing.contains(&"anchor_coverage"));
        assert!(failing.contains(&"word_count"));

        let linked = good_draft().replace(
            "before installation.",
            "before installation. Compare [installation prices](https://x.test/cost) locally.",
        );
        brief.target_word_count = Some(40);
        let report = AuditEngine::default().audit(&linked, &brief);
        let failing = failed(&report);
        assert!(!failing.contains(&"anchor_coverage"));
        assert!(!failing.contains(&"link_position"));
        assert!(!failing.contains(&"word_count"));
    }

    #[test]
    fn empty_parent_with_children_is_not_empty() {
        let brief = solar_brief();
        let nested = "# Solar Panels\n\n## Parent\n\n### Child\n\nA solar panel is flat.\n";
        let report = AuditEngine::default().audit(nested, &brief);
        assert!(!failed(&report).contains(&"empty_sections"));

        let hollow = "# Solar Panels\n\n## First\n\n## Second\n\nA solar panel is flat.\n";
        let report = AuditEngine::default().audit(hollow, &brief);
        assert!(failed(&report).contains(&"empty_sections"));
    }

    #[test]
    fn pronoun_heavy_prose_fails_density() {
        let brief = solar_brief();
        let md = "# Solar Panels\n\nIt is good. They say it works. This is it.\n";
        let report = AuditEngine::default().audit(md, &brief);
        assert!(failed(&report).contains(&"pronoun_density"));
    }

    #[test]
    fn reworded_headings_keep_their_definitions() {
        let bare_types = "## Solar panel types\n\n\
            Monocrystalline and polycrystalline panels suit most solar panel roofs.\n";
        let mut brief = solar_brief();
        brief.sections[2].required_phrases = vec!["thin-film".into()];
        let order = ["what", "cost", "types"];

        let original = format!("{INTRO}{WHAT}{COST}{bare_types}");
        let report = AuditEngine::default().audit_in_order(&original, &brief, &order);
        let expected = failed(&report);
        assert!(expected.contains(&"query_format_alignment"), "{expected:?}");
        assert!(expected.contains(&"required_phrases"), "{expected:?}");

        let reworded = original.replace("## Solar panel types", "## What types of solar panel exist?");
        let report_reworded = AuditEngine::default().audit_in_order(&reworded, &brief, &order);
        let failing = failed(&report_reworded);
        assert!(failing.contains(&"query_format_alignment"), "{failing:?}");
        assert!(failing.contains(&"required_phrases"), "{failing:?}");
    }

    #[test]
    fn extra_sections_fall_back_to_heading_match() {
        let md = format!("{}## Installation tips\n\nA solar panel needs a south roof.\n", good_draft());
        let report = AuditEngine::default().audit_in_order(&md, &solar_brief(), &["what", "cost", "types"]);
        assert!(!failed(&report).contains(&"query_format_alignment"));
    }

    #[test]
    fn plural_entity_mentions_count() {
        assert!(mentions_entity("Solar Panels", "solar panel"));
        assert!(mentions_entity("Guide to solar panel's output", "solar panel"));
        assert!(!mentions_entity("Panels", "solar panel"));
    }
}
