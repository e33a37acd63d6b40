use corpus_graph::ExecutionBatch;
use corpus_orchestrator::{ProgressSink, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};

/// Terminal progress bar fed by the executor
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total_files: u64, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total_files)
        };
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} files ({elapsed})")
            .unwrap_or_else(|e| {
                log::debug!("Falling back to default progress style: {e}");
                ProgressStyle::default_bar()
            })
            .progress_chars("=>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.bar.set_length(update.total_files as u64);
        self.bar.set_position(update.completed_files as u64);
    }

    fn on_batch_start(&self, batch: &ExecutionBatch, total_batches: usize) {
        let kind = if batch.forced { " (cycle)" } else { "" };
        self.bar
            .set_message(format!("batch {}/{total_batches}{kind}", batch.index + 1));
    }

    fn on_finish(&self, _update: &ProgressUpdate) {
        self.bar.finish_and_clear();
    }
}
