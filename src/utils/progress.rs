use indicatif::ProgressBar;
use indicatif::ProgressStyle;

use uref_orchestrator::ProgressEvent;
use uref_orchestrator::ProgressSink;

/// Renders core progress events as an indicatif bar.
#[derive(Debug)]
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::with_template("{prefix:>12} [{bar:40}] {pos}/{len} {wide_msg}")
                .expect("progress template is valid")
                .progress_chars("=> "),
        );

        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn report(&self, event: ProgressEvent) {
        if self.bar.is_hidden() {
            self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }

        self.bar.set_prefix(event.stage.to_string());
        if event.total > 0 {
            self.bar.set_length(event.total as u64);
        }
        self.bar.set_position(event.processed as u64);
        self.bar.set_message(event.message);
    }
}
