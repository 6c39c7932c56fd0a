//! Section ordering by attribute priority and query demand.
//!
//! Top-level sections are sorted by category rank (UNIQUE, ROOT, RARE,
//! COMMON, unclassified) and then by descending query priority. Deeper
//! sections travel with their parent and keep their relative order.

use std::cmp::Ordering;

use tracing::{debug, instrument};

use articleforge_shared::SectionDefinition;

/// A top-level section with the subsections that follow it.
struct Group {
    head: SectionDefinition,
    children: Vec<SectionDefinition>,
}

impl Group {
    fn cmp_priority(&self, other: &Self) -> Ordering {
        self.head
            .attribute_category
            .rank()
            .cmp(&other.head.attribute_category.rank())
            .then_with(|| other.head.query_priority.cmp(&self.head.query_priority))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeRanker;

impl AttributeRanker {
    pub fn new() -> Self {
        Self
    }

    /// Order sections and renumber `order`: top-level sections get
    /// `1..=n`, subsections `parent + k/100`.
    #[instrument(skip_all, fields(sections = sections.len()))]
    pub fn order(&self, sections: &[SectionDefinition]) -> Vec<SectionDefinition> {
        let mut input = sections.to_vec();
        input.sort_by(|a, b| a.order.total_cmp(&b.order));

        let top_level = input.iter().map(|s| s.level).min().unwrap_or(2);

        let mut groups: Vec<Group> = Vec::new();
        for section in input {
            match groups.last_mut() {
                Some(group) if section.level > top_level => group.children.push(section),
                // A leading subsection with no parent stands on its own.
                _ => groups.push(Group {
                    head: section,
                    children: Vec::new(),
                }),
            }
        }

        groups.sort_by(Group::cmp_priority);

        let mut out = Vec::new();
        for (i, group) in groups.into_iter().enumerate() {
            let base = (i + 1) as f64;
            let mut head = group.head;
            head.order = base;
            out.push(head);
            for (k, mut child) in group.children.into_iter().enumerate() {
                child.order = base + (k + 1) as f64 / 100.0;
                out.push(child);
            }
        }

        debug!(
            order = ?out.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            "sections ranked"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use articleforge_shared::{AttributeCategory, FormatCode};
    use proptest::prelude::*;

    fn def(key: &str, level: u8, order: f64, category: AttributeCategory, priority: u8) -> SectionDefinition {
        SectionDefinition {
            key: key.into(),
            heading: key.into(),
            level,
            order,
            attribute_category: category,
            format_code: FormatCode::Prose,
            required_phrases: Vec::new(),
            anchor_targets: Vec::new(),
            query_priority: priority,
        }
    }

    fn keys(sections: &[SectionDefinition]) -> Vec<&str> {
        sections.iter().map(|s| s.key.as_str()).collect()
    }

    #[test]
    fn sorts_by_category_then_priority() {
        use AttributeCategory::*;
        let input = vec![
            def("common", 2, 1.0, Common, 90),
            def("root-low", 2, 2.0, Root, 10),
            def("unclassified", 2, 3.0, Unclassified, 100),
            def("root-high", 2, 4.0, Root, 80),
            def("unique", 2, 5.0, Unique, 0),
            def("rare", 2, 6.0, Rare, 50),
        ];
        let out = AttributeRanker::new().order(&input);
        assert_eq!(
            keys(&out),
            ["unique", "root-high", "root-low", "rare", "common", "unclassified"]
        );
        let orders: Vec<f64> = out.iter().map(|s| s.order).collect();
        assert_eq!(orders, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn ties_keep_input_order() {
        use AttributeCategory::*;
        let input = vec![def("b", 2, 1.0, Rare, 5), def("a", 2, 2.0, Rare, 5)];
        assert_eq!(keys(&AttributeRanker::new().order(&input)), ["b", "a"]);
    }

    #[test]
    fn subsections_follow_their_parent() {
        use AttributeCategory::*;
        let input = vec![
            def("common", 2, 1.0, Common, 0),
            def("common-a", 3, 1.1, Unique, 0),
            def("common-b", 3, 1.2, Unclassified, 0),
            def("root", 2, 2.0, Root, 0),
            def("root-a", 3, 2.1, Rare, 0),
        ];
        let out = AttributeRanker::new().order(&input);
        assert_eq!(keys(&out), ["root", "root-a", "common", "common-a", "common-b"]);
        let expected = [1.0, 1.01, 2.0, 2.01, 2.02];
        for (s, want) in out.iter().zip(expected) {
            assert!((s.order - want).abs() < 1e-9, "{}: {}", s.key, s.order);
        }
    }

    #[test]
    fn input_is_first_sorted_by_order() {
        use AttributeCategory::*;
        let input = vec![
            def("child", 3, 1.5, Unclassified, 0),
            def("second", 2, 2.0, Rare, 0),
            def("first", 2, 1.0, Rare, 0),
        ];
        assert_eq!(
            keys(&AttributeRanker::new().order(&input)),
            ["first", "child", "second"]
        );
    }

    fn category() -> impl Strategy<Value = AttributeCategory> {
        prop_oneof![
            Just(AttributeCategory::Unique),
            Just(AttributeCategory::Root),
            Just(AttributeCategory::Rare),
            Just(AttributeCategory::Common),
            Just(AttributeCategory::Unclassified),
        ]
    }

    proptest! {
        #[test]
        fn top_level_ranks_never_decrease(
            specs in prop::collection::vec((category(), 0u8..=100, 2u8..=3), 0..24),
        ) {
            let input: Vec<SectionDefinition> = specs
                .iter()
                .enumerate()
                .map(|(i, (c, p, level))| def(&format!("s{i}"), *level, i as f64, *c, *p))
                .collect();
            let out = AttributeRanker::new().order(&input);
            prop_assert_eq!(out.len(), input.len());

            let top = out.iter().map(|s| s.level).min().unwrap_or(2);
            let ranks: Vec<u8> = out
                .iter()
                .filter(|s| s.level == top)
                .map(|s| s.attribute_category.rank())
                .collect();
            prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn permutations_rank_the_same(
            specs in prop::collection::vec((category(), 0u8..=100), 1..16),
            seed in any::<u64>(),
        ) {
            let input: Vec<SectionDefinition> = specs
                .iter()
                .enumerate()
                .map(|(i, (c, p))| def(&format!("s{i}"), 2, i as f64, *c, *p))
                .collect();
            // Rotate the stated order so the input arrives permuted.
            let shift = (seed % input.len() as u64) as usize;
            let mut permuted = input.clone();
            for (i, s) in permuted.iter_mut().enumerate() {
                s.order = ((i + shift) % input.len()) as f64;
            }

            let ranker = AttributeRanker::new();
            let signature = |sections: &[SectionDefinition]| -> Vec<(u8, u8)> {
                sections
                    .iter()
                    .map(|s| (s.attribute_category.rank(), s.query_priority))
                    .collect()
            };
            prop_assert_eq!(
                signature(&ranker.order(&input)),
                signature(&ranker.order(&permuted))
            );
        }
    }
}
