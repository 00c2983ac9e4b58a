//! Tracing subscriber setup.
//!
//! Two environment variables drive output: `CODESEEK_LOG` selects the level
//! (debug|info|warn|error) and `CODESEEK_ENV` selects the format -
//! `production` emits JSON lines, anything else a human-readable format.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let level = std::env::var("CODESEEK_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let production = std::env::var("CODESEEK_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    if production {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .ok();
    }
}
