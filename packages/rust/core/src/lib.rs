//! Generation pipeline for ArticleForge.
//!
//! This crate ties the rules, providers and storage crates into the
//! eight-pass job lifecycle:
//! - [`Orchestrator`]: start, run, pause, cancel and resume jobs
//! - [`SectionGenerator`]: the pass-1 generate/validate/regenerate loop
//! - [`DocumentPasses`]: passes 2-7 with output caching
//! - [`AttributeRanker`]: section ordering
//! - [`assembler`]: draft assembly and the split back into sections
//! - [`BriefSource`]: brief loading

pub mod assembler;
pub mod brief;
pub mod orchestrator;
pub mod passes;
pub mod prompt;
pub mod ranker;
pub mod section;

pub use brief::{BriefSource, JsonBriefFile, parse_brief};
pub use orchestrator::{JobSnapshot, Orchestrator, ProgressReporter, RunOutcome, SilentProgress};
pub use passes::{DocumentPasses, PassOutcome};
pub use ranker::AttributeRanker;
pub use section::{SectionGenerator, SectionOutcome};
