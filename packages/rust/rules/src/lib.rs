//! Deterministic content rules for ArticleForge.
//!
//! This crate provides:
//! - [`RulesValidator`]: ordered registry of per-section checks (passes 1-7)
//! - [`ContextChainer`]: discourse handoff between consecutive sections
//! - [`AuditEngine`]: the pass-8 document audit and compliance score
//! - [`text`]: Markdown/prose helpers the checks are built on
//!
//! Nothing here performs I/O; every function is pure and synchronous.

pub mod audit;
pub mod checks;
pub mod discourse;
pub mod text;
pub mod validator;

pub use audit::{AUDIT_RULES, AuditEngine, mentions_entity};
pub use discourse::{ContextChainer, MAX_OBJECT_WORDS, object_phrase};
pub use validator::{Check, RulesValidator, ValidationContext, has_errors, rule_score};

#[cfg(test)]
pub(crate) mod test_support {
    use articleforge_shared::{AttributeCategory, Brief, FormatCode, SectionDefinition};

    pub fn section(key: &str, heading: &str) -> SectionDefinition {
        SectionDefinition {
            key: key.into(),
            heading: heading.into(),
            level: 2,
            order: 0.0,
            attribute_category: AttributeCategory::Unclassified,
            format_code: FormatCode::Prose,
            required_phrases: Vec::new(),
            anchor_targets: Vec::new(),
            query_priority: 0,
        }
    }

    pub fn brief() -> Brief {
        Brief {
            id: "b1".into(),
            title: "Solar Panels".into(),
            central_entity: "solar panel".into(),
            target_word_count: None,
            eav_triples: Vec::new(),
            sections: vec![section("intro", "What is a solar panel?")],
        }
    }
}
