//! Prompt construction for section drafts and whole-document passes.

use std::fmt::Write as _;

use serde::Serialize;

use articleforge_providers::Prompt;
use articleforge_shared::{
    Brief, DiscourseContext, FormatCode, PassName, SectionDefinition, ValidationViolation,
};

pub const FIX_OPEN: &str = "<fix_instructions>";
pub const FIX_CLOSE: &str = "</fix_instructions>";

const WRITER_SYSTEM: &str = "You write one section of a factual long-form article in Markdown. \
Answer the heading in the first sentence with a definitive verb. State facts as \
entity-attribute-value statements. No filler, no opinions, no analogies. \
Return only the section body without its heading.";

const EDITOR_SYSTEM: &str = "You edit a complete Markdown article. Return the full article \
with every section, keeping the H1 and all facts. Return only the article.";

/// Structural instruction for a format code.
pub fn format_instruction(code: FormatCode) -> &'static str {
    match code {
        FormatCode::Fs => {
            "Write 40-60 words. The first sentence defines the subject (\"X is ...\")."
        }
        FormatCode::Paa => {
            "Write 35-80 words. The first sentence defines the subject (\"X is ...\")."
        }
        FormatCode::Listing => {
            "Open with one sentence stating how many items follow, then a Markdown list with exactly that many items."
        }
        FormatCode::Definitive => "Write at least 150 words covering the topic exhaustively.",
        FormatCode::Table => {
            "Include a Markdown table with a header row and a |---| separator row."
        }
        FormatCode::Prose => "Write well-structured paragraphs.",
    }
}

/// Instruction for one whole-document rewrite pass.
pub fn pass_instruction(pass: PassName) -> &'static str {
    match pass {
        PassName::Headings => {
            "Fix heading wording and hierarchy: one H1, no skipped levels, every heading a clear question or topic naming the entity."
        }
        PassName::ListsTables => {
            "Fix lists and tables: every list gets a preamble stating its item count, every table a header row."
        }
        PassName::Discourse => {
            "Improve transitions: each section opens by picking up the object of the previous section's last sentence."
        }
        PassName::MicroSemantics => {
            "Tighten wording: remove hedging modals, filler and opinions; make each sentence state one attribute and value."
        }
        PassName::VisualSemantics => {
            "Improve visual structure: bold the key value in definitional sentences, split long paragraphs."
        }
        PassName::FinalPolish => {
            "Final polish: the intro defines the central entity and summarizes every H2; fix any remaining errors."
        }
        PassName::Draft | PassName::Audit => "",
    }
}

/// Machine-readable entry of the fix block.
#[derive(Serialize)]
struct FixInstruction<'a> {
    rule: &'a str,
    severity: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    matched: &'a str,
    fix: &'a str,
}

/// A `<fix_instructions>` block listing violations as JSON lines.
pub fn fix_block(violations: &[ValidationViolation]) -> String {
    let mut out = String::from(FIX_OPEN);
    out.push('\n');
    for v in violations {
        let entry = FixInstruction {
            rule: &v.rule_id,
            severity: v.severity.as_str(),
            matched: &v.matched_text,
            fix: &v.suggestion,
        };
        if let Ok(line) = serde_json::to_string(&entry) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.push_str(FIX_CLOSE);
    out
}

/// Prompt for one pass-1 attempt. `previous` holds the violations of the
/// prior attempt; an empty slice means a first attempt.
pub fn section_prompt(
    brief: &Brief,
    section: &SectionDefinition,
    discourse: &DiscourseContext,
    previous: &[ValidationViolation],
) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "Article: {}", brief.title);
    let _ = writeln!(user, "Central entity: {}", brief.central_entity);
    let _ = writeln!(user, "Section heading: {}", section.heading);
    let _ = writeln!(user, "Format ({}): {}", section.format_code.as_str(), format_instruction(section.format_code));

    if !section.required_phrases.is_empty() {
        let _ = writeln!(user, "Required phrases: {}", section.required_phrases.join("; "));
    }
    if !section.anchor_targets.is_empty() {
        user.push_str("Links to include (not in the first sentence):\n");
        for a in &section.anchor_targets {
            let _ = writeln!(user, "- [{}]({})", a.anchor, a.target);
        }
    }
    if !brief.eav_triples.is_empty() {
        user.push_str("Facts to state where relevant:\n");
        for t in &brief.eav_triples {
            let _ = writeln!(user, "- {} | {} | {}", t.entity, t.attribute, t.value);
        }
    }
    if !discourse.is_empty() {
        let _ = writeln!(user, "Previous section ended with: {}", discourse.last_sentence);
    }
    if let Some(hint) = &discourse.subject_hint {
        let _ = writeln!(user, "{hint}");
    }
    if !previous.is_empty() {
        user.push_str("\nThe previous attempt violated these rules. Fix every one:\n");
        user.push_str(&fix_block(previous));
        user.push('\n');
    }

    Prompt::new(WRITER_SYSTEM, user)
}

/// Prompt for a whole-document rewrite pass.
pub fn pass_prompt(pass: PassName, brief: &Brief, draft: &str) -> Prompt {
    let user = format!(
        "Central entity: {}\nTask: {}\n\n<article>\n{}\n</article>",
        brief.central_entity,
        pass_instruction(pass),
        draft
    );
    Prompt::new(EDITOR_SYSTEM, user)
}
