//! Deterministic Markdown/prose utilities shared by checks, the chainer and
//! the audit engine.
//!
//! Everything here works on byte offsets into the original text so that
//! violations can point back at the exact match.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    List,
    Table,
    Code,
}

/// A contiguous Markdown block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub kind: BlockKind,
    pub text: &'a str,
    /// Byte offset of `text` within the parsed document.
    pub offset: usize,
}

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"));

static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d{1,3}[.)])\s+").expect("valid regex"));

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([^\]\n]+)\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).expect("valid regex")
});

/// Parse a heading line into `(level, text)`.
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let caps = HEADING_RE.captures(line.trim_end())?;
    let level = caps.get(1)?.as_str().len() as u8;
    Some((level, caps.get(2)?.as_str()))
}

pub fn is_list_item(line: &str) -> bool {
    LIST_MARKER_RE.is_match(line)
}

fn is_table_line(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

type OpenBlock = Option<(BlockKind, usize, usize)>;

fn flush<'a>(md: &'a str, current: &mut OpenBlock, out: &mut Vec<Block<'a>>) {
    if let Some((kind, start, end)) = current.take() {
        out.push(Block {
            kind,
            text: &md[start..end],
            offset: start,
        });
    }
}

/// Split Markdown into headings, paragraphs, lists, tables and code blocks.
pub fn blocks(md: &str) -> Vec<Block<'_>> {
    let mut out = Vec::new();
    let mut current: OpenBlock = None;
    let mut in_code = false;
    let mut offset = 0;

    for raw in md.split_inclusive('\n') {
        let start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);
        let end = start + line.len();

        if in_code {
            if let Some((_, _, e)) = current.as_mut() {
                *e = end;
            }
            if line.trim_start().starts_with("```") {
                in_code = false;
                flush(md, &mut current, &mut out);
            }
            continue;
        }

        if line.trim().is_empty() {
            flush(md, &mut current, &mut out);
            continue;
        }

        if line.trim_start().starts_with("```") {
            flush(md, &mut current, &mut out);
            current = Some((BlockKind::Code, start, end));
            in_code = true;
            continue;
        }

        if let Some((level, _)) = parse_heading(line) {
            flush(md, &mut current, &mut out);
            current = Some((BlockKind::Heading(level), start, end));
            flush(md, &mut current, &mut out);
            continue;
        }

        let kind = if is_table_line(line) {
            BlockKind::Table
        } else if is_list_item(line) {
            BlockKind::List
        } else {
            BlockKind::Paragraph
        };

        let extends = match current {
            // Indented continuation lines stay with their list item.
            Some((BlockKind::List, _, _)) => {
                kind == BlockKind::List || line.starts_with([' ', '\t'])
            }
            Some((k, _, _)) => k == kind,
            None => false,
        };

        if extends {
            if let Some((_, _, e)) = current.as_mut() {
                *e = end;
            }
        } else {
            flush(md, &mut current, &mut out);
            current = Some((kind, start, end));
        }
    }
    flush(md, &mut current, &mut out);
    out
}

/// Paragraph blocks only.
pub fn paragraphs(md: &str) -> Vec<Block<'_>> {
    blocks(md)
        .into_iter()
        .filter(|b| b.kind == BlockKind::Paragraph)
        .collect()
}

/// Prose of a document: paragraphs plus list item text, headings and
/// code excluded.
pub fn prose(md: &str) -> String {
    blocks(md)
        .into_iter()
        .filter_map(|b| match b.kind {
            BlockKind::Paragraph => Some(b.text.to_string()),
            BlockKind::List => Some(list_items(b.text).join("\n")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Item texts of a list block, markers removed.
pub fn list_items(block: &str) -> Vec<&str> {
    block
        .lines()
        .filter(|l| is_list_item(l))
        .map(|l| {
            let marker = LIST_MARKER_RE.find(l).map(|m| m.end()).unwrap_or(0);
            l[marker..].trim()
        })
        .collect()
}

/// Whether the text contains a Markdown table with a header separator row.
pub fn has_table(md: &str) -> bool {
    blocks(md)
        .iter()
        .any(|b| b.kind == BlockKind::Table && table_has_header(b.text))
}

/// A table's second line must be a `|---|---|` separator.
pub fn table_has_header(table: &str) -> bool {
    static SEP_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?\s*$").expect("valid regex")
    });
    table.lines().nth(1).is_some_and(|l| SEP_RE.is_match(l))
}

// ---------------------------------------------------------------------------
// Headings and sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub offset: usize,
}

pub fn headings(md: &str) -> Vec<Heading> {
    blocks(md)
        .into_iter()
        .filter_map(|b| match b.kind {
            BlockKind::Heading(level) => parse_heading(b.text).map(|(_, text)| Heading {
                level,
                text: text.to_string(),
                offset: b.offset,
            }),
            _ => None,
        })
        .collect()
}

/// One headed section of a document (H2 or deeper).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSection {
    pub level: u8,
    pub heading: String,
    /// Text between this heading and the next heading of any level.
    pub body: String,
    pub offset: usize,
}

/// A document split at its headings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    /// Text of the first H1.
    pub title: Option<String>,
    /// Number of H1 headings.
    pub h1_count: usize,
    /// Body text before the first H2+ heading.
    pub intro: String,
    pub sections: Vec<DocSection>,
}

/// Split a document at every heading. H1s become the title; the text before
/// the first deeper heading is the intro.
pub fn outline(md: &str) -> Outline {
    let mut outline = Outline::default();
    let heads = headings(md);

    let body_between = |from: usize, to: usize| -> String {
        let start = md[from..].find('\n').map(|i| from + i + 1).unwrap_or(md.len());
        md[start.min(to)..to].trim().to_string()
    };

    let first_sub = heads.iter().position(|h| h.level > 1);
    let intro_end = first_sub.map(|i| heads[i].offset).unwrap_or(md.len());

    let mut intro_parts = Vec::new();
    let mut cursor = 0;
    for h in heads.iter().filter(|h| h.level == 1) {
        outline.h1_count += 1;
        if outline.title.is_none() {
            outline.title = Some(h.text.clone());
        }
        if h.offset <= intro_end {
            let before = md[cursor.min(h.offset)..h.offset].trim();
            if !before.is_empty() {
                intro_parts.push(before.to_string());
            }
            cursor = md[h.offset..]
                .find('\n')
                .map(|i| h.offset + i + 1)
                .unwrap_or(md.len());
        }
    }
    let tail = md[cursor.min(intro_end)..intro_end].trim();
    if !tail.is_empty() {
        intro_parts.push(tail.to_string());
    }
    outline.intro = intro_parts.join("\n\n");

    let subs: Vec<&Heading> = heads.iter().filter(|h| h.level > 1).collect();
    for h in &subs {
        let next = heads
            .iter()
            .find(|n| n.offset > h.offset)
            .map(|n| n.offset)
            .unwrap_or(md.len());
        outline.sections.push(DocSection {
            level: h.level,
            heading: h.text.clone(),
            body: body_between(h.offset, next),
            offset: h.offset,
        });
    }
    outline
}

// ---------------------------------------------------------------------------
// Sentences and words
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    pub text: &'a str,
    pub offset: usize,
}

const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "etc.", "vs.", "dr.", "mr.", "mrs.", "ms.", "st.", "approx.", "no.", "fig.",
];

fn push_sentence<'a>(text: &'a str, from: usize, to: usize, out: &mut Vec<Sentence<'a>>) {
    let raw = &text[from..to];
    let trimmed = raw.trim_start();
    let lead = raw.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    if trimmed.chars().any(char::is_alphanumeric) {
        out.push(Sentence {
            text: trimmed,
            offset: from + lead,
        });
    }
}

/// Split a prose block into sentences on `.`, `!` or `?` followed by
/// whitespace or the end of text.
pub fn sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut out = Vec::new();
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let end = i + ch.len_utf8();
        let next = text[end..].chars().next();
        if !next.is_none_or(char::is_whitespace) {
            continue;
        }
        let candidate = &text[start..end];
        let last_word = candidate
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_lowercase();
        if ch == '.' && ABBREVIATIONS.contains(&last_word.as_str()) {
            continue;
        }
        push_sentence(text, start, end, &mut out);
        start = end;
    }
    if start < text.len() {
        push_sentence(text, start, text.len(), &mut out);
    }
    out
}

/// Sentences of every paragraph, offsets relative to `md`.
pub fn prose_sentences(md: &str) -> Vec<Sentence<'_>> {
    paragraphs(md)
        .into_iter()
        .flat_map(|p| {
            sentences(p.text).into_iter().map(move |s| Sentence {
                text: s.text,
                offset: p.offset + s.offset,
            })
        })
        .collect()
}

/// First prose sentence of a section body.
pub fn first_sentence(md: &str) -> Option<Sentence<'_>> {
    prose_sentences(md).into_iter().next()
}

/// Whitespace-separated words with surrounding punctuation removed.
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn word_count(text: &str) -> usize {
    words(text).len()
}

/// Lowercase, possessive- and plural-folded token.
pub fn normalize_token(word: &str) -> String {
    let mut t = word.to_lowercase();
    for suffix in ["'s", "\u{2019}s"] {
        if let Some(stripped) = t.strip_suffix(suffix) {
            t = stripped.to_string();
        }
    }
    if t.len() > 4 && t.ends_with('s') && !["ss", "us", "is"].iter().any(|x| t.ends_with(x)) {
        t.pop();
    }
    t
}

/// Normalized tokens of a text.
pub fn tokens(text: &str) -> Vec<String> {
    words(&strip_inline(text))
        .into_iter()
        .map(normalize_token)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokens(text).into_iter().collect()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "for", "with", "by", "at",
    "from", "as", "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "these",
    "those", "what", "which", "who", "whom", "how", "why", "when", "where", "do", "doe", "does",
    "did", "can", "could", "should", "would", "will", "your", "you", "our", "their", "about",
    "into", "than", "then", "there", "here", "vs", "versus", "best", "guide", "need",
    "know", "should", "much", "many", "more", "most", "some", "any", "all",
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Distinct content terms of a heading or phrase, in order.
pub fn salient_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !is_stopword(t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Whether `haystack` contains `needle` as whole words, case-insensitive.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    find_phrase(haystack, needle).is_some()
}

/// Byte offset of the first whole-word, case-insensitive match.
pub fn find_phrase(haystack: &str, needle: &str) -> Option<usize> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)\b{}\b", regex::escape(needle));
    Regex::new(&pattern).ok()?.find(haystack).map(|m| m.start())
}

/// Remove inline Markdown: links keep their anchor, emphasis and code
/// markers are dropped.
pub fn strip_inline(text: &str) -> String {
    LINK_RE
        .replace_all(text, "$1")
        .replace("**", "")
        .replace("__", "")
        .replace(['*', '`'], "")
}

/// Collapse whitespace runs for display.
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `n` characters of `text`.
pub fn char_prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Links and counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub anchor: String,
    pub target: String,
    pub offset: usize,
}

pub fn links(md: &str) -> Vec<Link> {
    LINK_RE
        .captures_iter(md)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(Link {
                anchor: c.get(1)?.as_str().trim().to_string(),
                target: c.get(2)?.as_str().trim().to_string(),
                offset: whole.start(),
            })
        })
        .collect()
}

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty",
];

/// The last item count stated in a list preamble ("five steps", "the 3 types").
pub fn stated_count(text: &str) -> Option<usize> {
    words(text).into_iter().rev().find_map(|w| {
        let lower = w.to_lowercase();
        if let Some(n) = NUMBER_WORDS.iter().position(|n| *n == lower) {
            return Some(n);
        }
        if lower.len() <= 2 {
            return lower.parse().ok();
        }
        None
    })
}

pub const PRONOUNS: &[&str] = &[
    "it", "its", "they", "them", "their", "theirs", "he", "him", "his", "she", "her", "hers",
    "this", "that", "these", "those", "we", "us", "our",
];

pub fn is_pronoun(word: &str) -> bool {
    PRONOUNS.contains(&word.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Solar Panels\n\nSolar panels convert light. They last long.\n\n## How they work\n\nPhotovoltaic cells create current.\n\n### Cells\n\n- one\n- two\n  continued\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";

    #[test]
    fn block_kinds() {
        let kinds: Vec<BlockKind> = blocks(DOC).iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            [
                BlockKind::Heading(1),
                BlockKind::Paragraph,
                BlockKind::Heading(2),
                BlockKind::Paragraph,
                BlockKind::Heading(3),
                BlockKind::List,
                BlockKind::Table,
            ]
        );
    }

    #[test]
    fn block_offsets_point_into_source() {
        for b in blocks(DOC) {
            assert_eq!(&DOC[b.offset..b.offset + b.text.len()], b.text);
        }
    }

    #[test]
    fn code_blocks_hide_headings() {
        let md = "```\n# not a heading\n```\n\nText.";
        let b = blocks(md);
        assert_eq!(b[0].kind, BlockKind::Code);
        assert!(headings(md).is_empty());
    }

    #[test]
    fn outline_splits_intro_and_sections() {
        let o = outline(DOC);
        assert_eq!(o.title.as_deref(), Some("Solar Panels"));
        assert_eq!(o.h1_count, 1);
        assert_eq!(o.intro, "Solar panels convert light. They last long.");
        assert_eq!(o.sections.len(), 2);
        assert_eq!(o.sections[0].heading, "How they work");
        assert_eq!(o.sections[0].body, "Photovoltaic cells create current.");
        assert_eq!(o.sections[1].level, 3);
        assert!(o.sections[1].body.starts_with("- one"));
    }

    #[test]
    fn sentence_split_respects_abbreviations() {
        let s = sentences("Panels vary, e.g. mono and poly. Costs fall! Why? Because.");
        let texts: Vec<&str> = s.iter().map(|s| s.text).collect();
        assert_eq!(
            texts,
            ["Panels vary, e.g. mono and poly.", "Costs fall!", "Why?", "Because."]
        );
        assert_eq!(s[1].offset, 33);
    }

    #[test]
    fn decimal_numbers_do_not_split() {
        let s = sentences("Efficiency is 22.5 percent today. Next.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn salient_terms_drop_stopwords() {
        assert_eq!(
            salient_terms("What is the cost of solar panels?"),
            ["cost", "solar", "panel"]
        );
    }

    #[test]
    fn stated_counts() {
        assert_eq!(stated_count("Here are the five steps:"), Some(5));
        assert_eq!(stated_count("The 3 main types of panel"), Some(3));
        assert_eq!(stated_count("Types of panel in 2024"), None);
    }

    #[test]
    fn links_and_inline_stripping() {
        let md = "See [the guide](https://x.test/guide) and **bold** `code`.";
        let l = links(md);
        assert_eq!(l.len(), 1);
        assert_eq!(l[0].anchor, "the guide");
        assert_eq!(l[0].target, "https://x.test/guide");
        assert_eq!(strip_inline(md), "See the guide and bold code.");
    }

    #[test]
    fn table_header_detection() {
        assert!(has_table("| a | b |\n|---|:---:|\n| 1 | 2 |"));
        assert!(!has_table("| a | b |\n| 1 | 2 |"));
    }

    #[test]
    fn phrase_matching_is_whole_word() {
        assert!(contains_phrase("Solar Panel costs vary", "solar panel"));
        assert!(!contains_phrase("Solar Panelling", "solar panel"));
        assert_eq!(char_prefix("héllo", 2), "hé");
    }
}
