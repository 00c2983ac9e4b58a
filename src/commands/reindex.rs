//! Incremental reindex command.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use codeseek::core::config::Config;
use codeseek::core::engine::Engine;

use crate::ui::progress::IndexProgress;

pub struct ReindexOptions {
    pub path: Option<String>,
    pub json: bool,
}

pub async fn run(options: ReindexOptions) -> Result<()> {
    let path = PathBuf::from(options.path.unwrap_or_else(|| ".".to_string()));
    let engine = Engine::from_config(&Config::load()?)?;

    if options.json {
        let stats = engine
            .indexer
            .reindex_by_change(&path, None, super::cancel_on_ctrl_c())
            .await?;
        println!(
            "{}",
            serde_json::json!({
                "added": stats.added,
                "modified": stats.modified,
                "removed": stats.removed,
            })
        );
        return Ok(());
    }

    println!(
        "{} {} {}",
        "⚡".yellow(),
        "Reindexing".cyan().bold(),
        path.display().to_string().dimmed()
    );

    let progress = IndexProgress::new("diffing");
    let result = engine
        .indexer
        .reindex_by_change(&path, Some(progress.callback()), super::cancel_on_ctrl_c())
        .await;

    match result {
        Ok(stats) => {
            progress.finish("done".to_string());
            if stats.added + stats.modified + stats.removed == 0 {
                println!("{} Nothing changed", "✓".green().bold());
            } else {
                println!(
                    "{} {} added, {} modified, {} removed",
                    "✓".green().bold(),
                    stats.added.to_string().green(),
                    stats.modified.to_string().yellow(),
                    stats.removed.to_string().red()
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
