//! Progress reporting for long index and erase runs.
//!
//! The sink is an observability hook, not a correctness requirement: the
//! indexer and eraser call it at their batch boundaries and anything the
//! sink does (or fails to do) has no effect on the run.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives batch-boundary notifications from index and erase runs.
pub trait ProgressSink {
    /// A file-insert batch was flushed; `count` files handled so far.
    fn on_files(&self, _count: u64) {}

    /// The index transaction was committed mid-run.
    fn on_commit(&self, _count: u64) {}

    /// Mirror rows were erased; `count` directories removed so far.
    fn on_erased(&self, _count: u64) {}

    /// Free-form status line.
    fn on_message(&self, _message: &str) {}
}

/// Sink that ignores everything. Used in tests and under `--quiet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Console sink rendering a single spinner line via indicatif.
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    /// Create a console sink. With `quiet` set the bar is hidden and all
    /// notifications are dropped.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::default_spinner());
            bar
        };
        Self { bar }
    }

    /// Clear the spinner line, leaving the terminal clean for the final
    /// summary output.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_files(&self, count: u64) {
        self.bar.set_message(format!("{count} files indexed"));
        self.bar.tick();
    }

    fn on_commit(&self, count: u64) {
        self.bar.set_message(format!("{count} files indexed (committed)"));
        self.bar.tick();
    }

    fn on_erased(&self, count: u64) {
        self.bar.set_message(format!("{count} stale directories erased"));
        self.bar.tick();
    }

    fn on_message(&self, message: &str) {
        self.bar.set_message(message.to_owned());
        self.bar.tick();
    }
}
