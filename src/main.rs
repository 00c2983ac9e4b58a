use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod ui;

use codeseek::core::config::Config;
use codeseek::core::engine::Engine;
use codeseek::core::logging;
use codeseek::mcp::McpServer;
use commands::{clear, config, index, reindex, search, status};

#[derive(Parser)]
#[command(name = "codeseek")]
#[command(about = "Semantic code search - AST-aware chunking, hybrid dense+BM25 retrieval")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a codebase for semantic search
    #[command(alias = "i")]
    Index {
        /// Path to index (defaults to current directory)
        path: Option<String>,

        /// Drop an existing index and start over
        #[arg(short, long)]
        force: bool,

        /// Chunking strategy: ast or langchain
        #[arg(long, default_value = "ast")]
        splitter: String,

        /// Restrict indexing to these extensions (e.g. rs, ts)
        #[arg(short = 't', long = "type", value_name = "EXT")]
        extensions: Vec<String>,

        /// Extra ignore patterns (gitignore syntax), appended to defaults
        #[arg(long = "ignore", value_name = "PATTERN")]
        ignore: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-index only files changed since the last run
    #[command(alias = "r")]
    Reindex {
        /// Path to reindex (defaults to current directory)
        path: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search an indexed codebase with natural language
    #[command(alias = "s")]
    Search {
        /// Natural language query
        query: String,

        /// Path to search in (defaults to current directory)
        path: Option<String>,

        /// Maximum number of results
        #[arg(short = 'm', long, default_value = "10")]
        limit: usize,

        /// Minimum fused score
        #[arg(long)]
        threshold: Option<f32>,

        /// Keep only these extensions (each with a leading dot, e.g. .rs)
        #[arg(short = 't', long = "type", value_name = "EXT")]
        extensions: Vec<String>,

        /// Show chunk contents
        #[arg(short = 'c', long)]
        content: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a codebase's index, snapshot and status
    Clear {
        /// Path to clear (defaults to current directory)
        path: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show indexing status
    #[command(alias = "st")]
    Status {
        /// Path to inspect (defaults to current directory)
        path: Option<String>,

        /// List every registered codebase
        #[arg(short, long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configure provider, model and store settings
    #[command(alias = "c")]
    Config {
        /// Set the embedding API key
        #[arg(long)]
        api_key: Option<String>,

        /// Set the embedding model
        #[arg(long)]
        model: Option<String>,

        /// Set a custom API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Set the embedding provider (openai, ollama or null)
        #[arg(long)]
        provider: Option<String>,

        /// Set the Ollama endpoint
        #[arg(long)]
        ollama_url: Option<String>,

        /// Set the directory holding collections and snapshots
        #[arg(long)]
        store_dir: Option<String>,

        /// Set the per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Show the current configuration
        #[arg(long)]
        show: bool,
    },

    /// Run as an MCP server over stdio
    #[command(name = "mcp-server")]
    McpServer,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            path,
            force,
            splitter,
            extensions,
            ignore,
            json,
        } => {
            index::run(index::IndexOptions {
                path,
                force,
                splitter,
                extensions,
                ignore,
                json,
            })
            .await?;
        }
        Commands::Reindex { path, json } => {
            reindex::run(reindex::ReindexOptions { path, json }).await?;
        }
        Commands::Search {
            query,
            path,
            limit,
            threshold,
            extensions,
            content,
            json,
        } => {
            search::run(search::SearchCommandOptions {
                query,
                path,
                limit,
                threshold,
                extensions,
                content,
                json,
            })
            .await?;
        }
        Commands::Clear { path, json } => {
            clear::run(clear::ClearOptions { path, json }).await?;
        }
        Commands::Status { path, all, json } => {
            status::run(status::StatusOptions { path, all, json }).await?;
        }
        Commands::Config {
            api_key,
            model,
            base_url,
            provider,
            ollama_url,
            store_dir,
            timeout,
            show,
        } => {
            config::run(config::ConfigOptions {
                api_key,
                model,
                base_url,
                provider,
                ollama_url,
                store_dir,
                timeout_secs: timeout,
                show,
            })
            .await?;
        }
        Commands::McpServer => {
            let engine = Engine::from_config(&Config::load()?)?;
            McpServer::new(engine).run().await?;
        }
    }

    Ok(())
}
