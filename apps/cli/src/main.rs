//! ArticleForge CLI: multi-pass article generation from structured briefs.
//!
//! Drafts each section against deterministic content rules, refines the
//! whole document through six rewrite passes and scores the result.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
