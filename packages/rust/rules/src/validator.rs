//! Check registry and the context checks run against.

use std::collections::BTreeMap;

use articleforge_shared::{
    AttributeCategory, Brief, EavTriple, SectionDefinition, Severity, ValidationViolation,
};

use crate::checks;

/// Everything a check may consult besides the text itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub section: &'a SectionDefinition,
    pub central_entity: &'a str,
    pub eav_triples: &'a [EavTriple],
    /// Whether this is the first section of the article.
    pub is_lead: bool,
    /// Categories of the sections placed before this one, in order.
    pub preceding: &'a [AttributeCategory],
}

impl<'a> ValidationContext<'a> {
    pub fn new(section: &'a SectionDefinition, brief: &'a Brief) -> Self {
        Self {
            section,
            central_entity: &brief.central_entity,
            eav_triples: &brief.eav_triples,
            is_lead: false,
            preceding: &[],
        }
    }

    pub fn lead(mut self, is_lead: bool) -> Self {
        self.is_lead = is_lead;
        self
    }

    pub fn after(mut self, preceding: &'a [AttributeCategory]) -> Self {
        self.preceding = preceding;
        self
    }
}

/// A pure, deterministic text check.
pub trait Check: Send + Sync {
    /// Stable rule identifier used in violations and scores.
    fn id(&self) -> &'static str;

    fn check(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation>;
}

/// Ordered registry of independent checks.
pub struct RulesValidator {
    checks: Vec<Box<dyn Check>>,
}

impl Default for RulesValidator {
    fn default() -> Self {
        Self {
            checks: checks::default_checks(),
        }
    }
}

impl RulesValidator {
    /// The full section check set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no checks.
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn with_check(mut self, check: Box<dyn Check>) -> Self {
        self.checks.push(check);
        self
    }

    /// Drop a check by id.
    pub fn without(mut self, id: &str) -> Self {
        self.checks.retain(|c| c.id() != id);
        self
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Check> {
        self.checks.iter().find(|c| c.id() == id).map(|c| c.as_ref())
    }

    /// Run every check and merge the findings in registry order.
    pub fn validate(&self, content: &str, ctx: &ValidationContext<'_>) -> Vec<ValidationViolation> {
        self.checks
            .iter()
            .flat_map(|c| c.check(content, ctx))
            .collect()
    }

    /// 0..=100 score per registered rule for a set of violations.
    pub fn scores(&self, violations: &[ValidationViolation]) -> BTreeMap<String, u8> {
        self.checks
            .iter()
            .map(|c| (c.id().to_string(), rule_score(c.id(), violations)))
            .collect()
    }
}

/// `100 - 25*errors - 10*warnings - 2*infos`, floored at zero.
pub fn rule_score(rule_id: &str, violations: &[ValidationViolation]) -> u8 {
    let penalty: u32 = violations
        .iter()
        .filter(|v| v.rule_id == rule_id)
        .map(|v| match v.severity {
            Severity::Error => 25,
            Severity::Warning => 10,
            Severity::Info => 2,
        })
        .sum();
    100u32.saturating_sub(penalty) as u8
}

/// Whether any violation blocks acceptance.
pub fn has_errors(violations: &[ValidationViolation]) -> bool {
    violations.iter().any(ValidationViolation::is_error)
}
