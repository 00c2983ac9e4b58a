//! Full index command.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use codeseek::core::config::Config;
use codeseek::core::engine::Engine;
use codeseek::core::indexer::IndexOptions as CoreIndexOptions;

use crate::ui::progress::IndexProgress;

pub struct IndexOptions {
    pub path: Option<String>,
    /// Drop an existing collection first.
    pub force: bool,
    /// "ast" (default) or "langchain".
    pub splitter: String,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
    pub json: bool,
}

pub async fn run(options: IndexOptions) -> Result<()> {
    let path = PathBuf::from(options.path.unwrap_or_else(|| ".".to_string()));
    let engine = Engine::from_config(&Config::load()?)?;

    let core_options = CoreIndexOptions {
        force: options.force,
        splitter: options.splitter.parse()?,
        allowed_extensions: (!options.extensions.is_empty()).then_some(options.extensions),
        ignore_patterns: (!options.ignore.is_empty()).then_some(options.ignore),
    };

    if options.json {
        let stats = engine
            .indexer
            .index_codebase(&path, core_options, None, super::cancel_on_ctrl_c())
            .await?;
        println!(
            "{}",
            serde_json::json!({
                "indexed_files": stats.indexed_files,
                "total_chunks": stats.total_chunks,
                "status": stats.status.as_str(),
            })
        );
        return Ok(());
    }

    println!(
        "{} {} {}",
        "⚡".yellow(),
        "Indexing".cyan().bold(),
        path.display().to_string().dimmed()
    );

    let progress = IndexProgress::new("scanning");
    let result = engine
        .indexer
        .index_codebase(
            &path,
            core_options,
            Some(progress.callback()),
            super::cancel_on_ctrl_c(),
        )
        .await;

    match result {
        Ok(stats) => {
            progress.finish("done".to_string());
            println!(
                "{} Indexed {} files, {} chunks ({})",
                "✓".green().bold(),
                stats.indexed_files.to_string().cyan(),
                stats.total_chunks.to_string().cyan(),
                stats.status.as_str().yellow()
            );
            if stats.status.as_str() == "limit_reached" {
                println!(
                    "   {} the store hit its capacity; results cover the indexed prefix",
                    "⚠".yellow()
                );
            }
            Ok(())
        }
        Err(err) => {
            progress.abandon(format!("failed: {err}"));
            Err(err.into())
        }
    }
}
