//! Config command.

use anyhow::Result;
use colored::Colorize;

use codeseek::core::config::Config;

pub struct ConfigOptions {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub provider: Option<String>,
    pub ollama_url: Option<String>,
    pub store_dir: Option<String>,
    pub timeout_secs: Option<u64>,
    pub show: bool,
}

pub async fn run(options: ConfigOptions) -> Result<()> {
    let mut config = Config::load()?;
    let mut changed = false;

    if let Some(api_key) = options.api_key {
        config.api_key = Some(api_key);
        changed = true;
    }
    if let Some(model) = options.model {
        config.model = model;
        changed = true;
    }
    if let Some(base_url) = options.base_url {
        config.base_url = Some(base_url);
        changed = true;
    }
    if let Some(provider) = options.provider {
        config.provider = provider;
        changed = true;
    }
    if let Some(ollama_url) = options.ollama_url {
        config.ollama_url = Some(ollama_url);
        changed = true;
    }
    if let Some(store_dir) = options.store_dir {
        config.store_dir = Some(store_dir.into());
        changed = true;
    }
    if let Some(timeout_secs) = options.timeout_secs {
        config.request_timeout_secs = timeout_secs;
        changed = true;
    }

    if changed {
        config.save()?;
        println!("{} Configuration saved", "✓".green().bold());
    }

    if options.show || !changed {
        println!("{}", "Configuration".cyan().bold());
        println!("  provider:  {}", config.provider.yellow());
        println!("  model:     {}", config.model.yellow());
        println!(
            "  api key:   {}",
            if config.get_api_key().is_some() {
                "set".green()
            } else {
                "not set".red()
            }
        );
        println!("  endpoint:  {}", config.get_base_url().dimmed());
        println!("  ollama:    {}", config.get_ollama_url().dimmed());
        println!(
            "  store dir: {}",
            config.store_dir()?.display().to_string().dimmed()
        );
        println!("  timeout:   {}s", config.request_timeout_secs);
    }

    Ok(())
}
