use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const SITE_TEMPLATE: &str = "{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sites";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

/// Terminal progress for per-site fetch loops and model fitting.
/// A quiet reporter draws nothing.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// Bar over `sites` weather locations.
    pub fn new(sites: u64, message: &str, quiet: bool) -> Self {
        Self::start(quiet, message, || {
            let style = ProgressStyle::default_bar()
                .template(SITE_TEMPLATE)
                .map(|s| s.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            ProgressBar::new(sites).with_style(style)
        })
    }

    pub fn new_spinner(message: &str, quiet: bool) -> Self {
        Self::start(quiet, message, || {
            let style = ProgressStyle::default_spinner()
                .template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            ProgressBar::new_spinner().with_style(style)
        })
    }

    fn start(quiet: bool, message: &str, make: impl FnOnce() -> ProgressBar) -> Self {
        let bar = (!quiet).then(|| {
            let bar = make().with_message(message.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    pub fn is_quiet(&self) -> bool {
        self.bar.is_none()
    }

    /// One more site done.
    pub fn increment(&self, delta: u64) {
        self.bar.iter().for_each(|bar| bar.inc(delta));
    }

    pub fn set_message(&self, message: &str) {
        self.bar.iter().for_each(|bar| bar.set_message(message.to_string()));
    }

    pub fn finish_with_message(&self, message: &str) {
        self.bar
            .iter()
            .for_each(|bar| bar.finish_with_message(message.to_string()));
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            if !bar.is_finished() {
                bar.finish_and_clear();
            }
        }
    }
}
