//! Draft assembly from sections, and the reverse split after document passes.

use tracing::warn;

use articleforge_rules::text;
use articleforge_shared::Section;

/// Render the article: H1 title, then every section's heading and latest
/// content in stored order.
pub fn assemble(title: &str, sections: &[Section]) -> String {
    let mut out = format!("# {}\n", title.trim());
    for s in sections {
        let level = usize::from(s.level.clamp(2, 6));
        out.push('\n');
        out.push_str(&"#".repeat(level));
        out.push(' ');
        out.push_str(s.heading.trim());
        out.push('\n');
        if let Some(body) = s.current_content().map(str::trim).filter(|b| !b.is_empty()) {
            out.push('\n');
            out.push_str(body);
            out.push('\n');
        }
    }
    out
}

/// Pair stored sections with their bodies in a rewritten draft.
///
/// Sections are matched by heading when the draft keeps every stored heading,
/// even if it moved them. Otherwise, when the draft has as many sections as
/// the store, pairing is positional so renamed headings still match; with a
/// different count, unmatched sections are left out.
pub fn match_sections<'a>(stored: &'a [Section], draft: &str) -> Vec<(&'a Section, String)> {
    let doc = text::outline(draft).sections;
    let stored_headings: Vec<String> = stored.iter().map(|s| normalize(&s.heading)).collect();
    let doc_headings: Vec<String> = doc.iter().map(|d| normalize(&d.heading)).collect();

    if doc.len() == stored.len() && !is_permutation(&stored_headings, &doc_headings) {
        let moved = doc_headings
            .iter()
            .enumerate()
            .filter(|(i, h)| stored_headings[*i] != **h && stored_headings.contains(h))
            .count();
        if moved > 0 {
            warn!(moved, "rewritten sections changed order, pairing by position");
        }
        return stored.iter().zip(doc).map(|(s, d)| (s, d.body)).collect();
    }

    if doc_headings != stored_headings && doc.len() == stored.len() {
        warn!("rewritten sections changed order, pairing by heading");
    }

    let mut used = vec![false; doc.len()];
    stored
        .iter()
        .zip(&stored_headings)
        .filter_map(|(s, wanted)| {
            let idx = doc_headings
                .iter()
                .enumerate()
                .position(|(i, h)| !used[i] && h == wanted)?;
            used[idx] = true;
            Some((s, doc[idx].body.clone()))
        })
        .collect()
}

fn normalize(heading: &str) -> String {
    heading.trim().to_lowercase()
}

fn is_permutation(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use articleforge_shared::{PassName, SectionUpdate};

    fn stored(key: &str, heading: &str, level: u8, body: Option<&str>) -> Section {
        let mut s = Section::new("job", key);
        let mut update = SectionUpdate::new();
        update.heading = Some(heading.into());
        update.level = Some(level);
        if let Some(b) = body {
            update = update.with_content(PassName::Draft, b);
        }
        s.apply(&update).unwrap();
        s
    }

    #[test]
    fn assembles_headings_by_level() {
        let sections = vec![
            stored("a", "What is a solar panel?", 2, Some("A solar panel is a module.\n")),
            stored("b", "Cells", 3, Some("Cells convert light.")),
            stored("c", "Pending", 2, None),
        ];
        assert_eq!(
            assemble("Solar Panels", &sections),
            "# Solar Panels\n\n## What is a solar panel?\n\nA solar panel is a module.\n\n\
             ### Cells\n\nCells convert light.\n\n## Pending\n"
        );
    }

    #[test]
    fn positional_match_survives_renamed_headings() {
        let sections = vec![stored("a", "Old A", 2, Some("x")), stored("b", "Old B", 2, Some("y"))];
        let draft = "# T\n\n## New A\n\nBody A.\n\n## New B\n\nBody B.\n";
        let pairs = match_sections(&sections, draft);
        let got: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(s, b)| (s.section_key.as_str(), b.as_str()))
            .collect();
        assert_eq!(got, [("a", "Body A."), ("b", "Body B.")]);
    }

    #[test]
    fn heading_match_when_counts_differ() {
        let sections = vec![
            stored("a", "Cost", 2, Some("x")),
            stored("b", "Lifespan", 2, Some("y")),
            stored("c", "Types", 2, Some("z")),
        ];
        let draft = "# T\n\n## lifespan\n\nTwenty five years.\n\n## Cost\n\nCheap.\n";
        let pairs = match_sections(&sections, draft);
        let got: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(s, b)| (s.section_key.as_str(), b.as_str()))
            .collect();
        assert_eq!(got, [("a", "Cheap."), ("b", "Twenty five years.")]);
    }

    #[test]
    fn reordered_sections_keep_their_bodies() {
        let sections = vec![
            stored("a", "Cost", 2, Some("x")),
            stored("b", "Lifespan", 2, Some("y")),
        ];
        let draft = "# T\n\n## Lifespan\n\nTwenty five years.\n\n## Cost\n\nCheap.\n";
        let pairs = match_sections(&sections, draft);
        let got: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(s, b)| (s.section_key.as_str(), b.as_str()))
            .collect();
        assert_eq!(got, [("a", "Cheap."), ("b", "Twenty five years.")]);
    }
}
