//! Search command.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use codeseek::core::config::Config;
use codeseek::core::engine::Engine;
use codeseek::core::searcher::SearchOptions;

pub struct SearchCommandOptions {
    pub query: String,
    pub path: Option<String>,
    pub limit: usize,
    pub threshold: Option<f32>,
    pub extensions: Vec<String>,
    /// Print chunk bodies, not just locations.
    pub content: bool,
    pub json: bool,
}

pub async fn run(options: SearchCommandOptions) -> Result<()> {
    let path = PathBuf::from(options.path.unwrap_or_else(|| ".".to_string()));
    let engine = Engine::from_config(&Config::load()?)?;

    let response = engine
        .searcher
        .search(
            &path,
            &options.query,
            SearchOptions {
                limit: options.limit,
                threshold: options.threshold,
                extension_filter: (!options.extensions.is_empty()).then_some(options.extensions),
            },
            super::cancel_on_ctrl_c(),
        )
        .await?;

    if options.json {
        let rows: Vec<serde_json::Value> = response
            .results
            .iter()
            .map(|result| {
                serde_json::json!({
                    "relative_path": result.relative_path,
                    "start_line": result.start_line,
                    "end_line": result.end_line,
                    "language": result.language,
                    "score": result.score,
                    "content": result.content,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "indexing_in_progress": response.indexing,
                "results": rows,
            })
        );
        return Ok(());
    }

    if response.indexing {
        println!(
            "{} indexing still in progress, results may be partial",
            "⚠".yellow()
        );
    }

    if response.results.is_empty() {
        println!("{} No matches", "∅".dimmed());
        return Ok(());
    }

    for (rank, result) in response.results.iter().enumerate() {
        println!(
            "{} {}{}{} {} {}",
            format!("{:>2}.", rank + 1).dimmed(),
            result.relative_path.cyan().bold(),
            ":".dimmed(),
            format!("{}-{}", result.start_line, result.end_line).yellow(),
            result.language.dimmed(),
            format!("({:.3})", result.score).green()
        );
        if options.content {
            for line in result.content.lines() {
                println!("    {}", line.dimmed());
            }
            println!();
        }
    }

    Ok(())
}
