//! Clear command: drop a codebase's collection, snapshot and status.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use codeseek::core::config::Config;
use codeseek::core::engine::Engine;

pub struct ClearOptions {
    pub path: Option<String>,
    pub json: bool,
}

pub async fn run(options: ClearOptions) -> Result<()> {
    let path = PathBuf::from(options.path.unwrap_or_else(|| ".".to_string()));
    let engine = Engine::from_config(&Config::load()?)?;

    let stats = engine.indexer.clear(&path).await?;

    if options.json {
        println!(
            "{}",
            serde_json::json!({
                "cleared": stats.cleared,
                "remaining_indexed_codebases": stats.remaining_indexed_codebases,
            })
        );
        return Ok(());
    }

    if stats.cleared {
        println!(
            "{} Cleared index for {}",
            "✓".green().bold(),
            path.display().to_string().cyan()
        );
    } else {
        println!("{} Nothing to clear", "∅".dimmed());
    }
    println!(
        "   {} indexed codebases remaining",
        stats.remaining_indexed_codebases.to_string().cyan()
    );

    Ok(())
}
