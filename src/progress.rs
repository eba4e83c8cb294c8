//! Progress tracking and reporting

use indicatif::{ProgressBar, ProgressStyle};

/// Counts finished workers on a terminal progress bar
#[derive(Clone)]
pub struct ProgressTracker {
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a tracker expecting `total_workers` completions
    #[must_use]
    pub fn new(total_workers: u64) -> Self {
        let pb = ProgressBar::new(total_workers);
        // The template is a literal; fall back to the default style if it ever fails to parse
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} workers {msg}")
            .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("#>-"));
        pb.set_style(style);

        Self { progress_bar: pb }
    }

    /// Record one finished worker
    pub fn worker_done(&self) {
        self.progress_bar.inc(1);
    }

    /// Workers recorded so far
    #[must_use]
    pub fn finished(&self) -> u64 {
        self.progress_bar.position()
    }

    /// Complete the bar and leave it on screen
    pub fn finish(&self) {
        self.progress_bar.finish_with_message("done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_workers() {
        let tracker = ProgressTracker::new(3);
        let clone = tracker.clone();
        tracker.worker_done();
        clone.worker_done();
        assert_eq!(tracker.finished(), 2);
        tracker.finish();
        assert!(clone.progress_bar.is_finished());
    }
}
