//! Terminal progress rendering for long-running index operations.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use codeseek::core::indexer::{Progress, ProgressCallback};

/// Indeterminate spinner that switches to a percentage bar once the run
/// reports totals.
pub struct IndexProgress {
    bar: Arc<ProgressBar>,
}

impl IndexProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos:>3}% ({elapsed})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
        );
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar: Arc::new(bar) }
    }

    /// Callback to hand to the indexer.
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |progress: Progress| {
            bar.set_position(progress.percentage as u64);
            bar.set_message(format!(
                "{} {}/{}",
                progress.phase, progress.processed, progress.total
            ));
        })
    }

    pub fn finish(&self, message: String) {
        self.bar.set_position(100);
        self.bar.finish_with_message(message);
    }

    pub fn abandon(&self, message: String) {
        self.bar.abandon_with_message(message);
    }
}
