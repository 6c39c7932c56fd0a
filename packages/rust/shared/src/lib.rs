//! Shared types, error model, and configuration for ArticleForge.
//!
//! This crate is the foundation depended on by all other ArticleForge crates.
//! It provides:
//! - [`ArticleForgeError`]: the unified error type
//! - Domain types ([`GenerationJob`], [`Section`], [`Brief`], [`SectionDefinition`], ...)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, PipelineConfig, PipelineSettings, ProviderConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_providers,
};
pub use error::{ArticleForgeError, Result};
pub use types::{
    AnchorTarget, AttributeCategory, AuditReport, AuditRuleResult, Brief, DiscourseContext,
    EavTriple, FormatCode, GenerationJob, JobId, JobStatus, JobUpdate, PASS_COUNT, PassName,
    PassState, PassStatus, ProviderKind, Section, SectionDefinition, SectionStatus, SectionUpdate,
    Severity, ValidationViolation,
};
