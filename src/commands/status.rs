//! Status command: one codebase or every registered one.

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use codeseek::core::config::Config;
use codeseek::core::engine::Engine;
use codeseek::core::status::CodebaseEntry;

pub struct StatusOptions {
    pub path: Option<String>,
    /// List every registered codebase instead of one root.
    pub all: bool,
    pub json: bool,
}

fn entry_json(entry: &CodebaseEntry) -> serde_json::Value {
    match entry {
        CodebaseEntry::Indexing { progress } => {
            serde_json::json!({ "state": "indexing", "progress": progress })
        }
        CodebaseEntry::Indexed {
            indexed_files,
            total_chunks,
            status,
        } => serde_json::json!({
            "state": "indexed",
            "indexed_files": indexed_files,
            "total_chunks": total_chunks,
            "status": status.as_str(),
        }),
        CodebaseEntry::IndexFailed {
            error_message,
            last_attempted_percentage,
        } => serde_json::json!({
            "state": "index_failed",
            "error": error_message,
            "last_attempted_percentage": last_attempted_percentage,
        }),
    }
}

fn print_entry(entry: &CodebaseEntry) {
    match entry {
        CodebaseEntry::Indexing { progress } => {
            println!("{} indexing ({progress:.1}%)", "…".yellow());
        }
        CodebaseEntry::Indexed {
            indexed_files,
            total_chunks,
            status,
        } => {
            println!(
                "{} indexed: {} files, {} chunks ({})",
                "✓".green().bold(),
                indexed_files.to_string().cyan(),
                total_chunks.to_string().cyan(),
                status.as_str().yellow()
            );
        }
        CodebaseEntry::IndexFailed {
            error_message,
            last_attempted_percentage,
        } => {
            println!(
                "{} failed at {last_attempted_percentage:.1}%: {error_message}",
                "✗".red().bold()
            );
        }
    }
}

pub async fn run(options: StatusOptions) -> Result<()> {
    let engine = Engine::from_config(&Config::load()?)?;

    if options.all {
        let entries = engine.indexer.registry().list();
        if options.json {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .map(|(root, entry)| (root.clone(), entry_json(entry)))
                .collect();
            println!("{}", serde_json::Value::Object(map));
            return Ok(());
        }
        if entries.is_empty() {
            println!("{} No codebases registered", "∅".dimmed());
            return Ok(());
        }
        for (root, entry) in entries {
            print!("{} ", root.cyan());
            print_entry(&entry);
        }
        return Ok(());
    }

    let path = PathBuf::from(options.path.unwrap_or_else(|| ".".to_string()));
    match engine.indexer.status(&path) {
        None => {
            if options.json {
                println!("{}", serde_json::json!({ "state": "not_found" }));
            } else {
                println!("{} Not indexed", "∅".dimmed());
            }
        }
        Some(entry) => {
            if options.json {
                println!("{}", entry_json(&entry));
            } else {
                print_entry(&entry);
            }
        }
    }

    Ok(())
}
