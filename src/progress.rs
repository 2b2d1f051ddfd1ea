use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes:>12} {bytes_per_sec:>12} {msg}";

/// Download progress for one conversion round.
///
/// With a known total the ratio advances per chunk; without one the bar is an
/// indeterminate spinner until the round completes.
pub struct ProgressIndicator {
    draw_hidden: bool,
    bar: Option<ProgressBar>,
    received: u64,
    total: Option<u64>,
}

impl ProgressIndicator {
    pub fn new() -> Self {
        Self {
            draw_hidden: false,
            bar: None,
            received: 0,
            total: None,
        }
    }

    /// Tracks progress without drawing anything.
    pub fn hidden() -> Self {
        Self {
            draw_hidden: true,
            ..Self::new()
        }
    }

    pub fn show(&mut self, total: Option<u64>, message: &str) {
        self.hide();
        self.received = 0;
        self.total = total.filter(|t| *t > 0);

        let bar = match self.total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                    bar.set_style(style.progress_chars("=>-"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        if self.draw_hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        }
        bar.set_message(message.to_string());
        self.bar = Some(bar);
    }

    pub fn advance(&mut self, bytes: u64) {
        self.received += bytes;
        if let Some(bar) = &self.bar {
            bar.inc(bytes);
        }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Fraction received, or `None` while indeterminate.
    pub fn ratio(&self) -> Option<f64> {
        self.total
            .map(|total| (self.received as f64 / total as f64).min(1.0))
    }

    pub fn hide(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }

    /// Borrows the indicator for one round; it is hidden when the guard drops.
    pub fn guard(&mut self) -> ProgressGuard<'_> {
        ProgressGuard { indicator: self }
    }
}

impl Default for ProgressIndicator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressGuard<'a> {
    indicator: &'a mut ProgressIndicator,
}

impl Deref for ProgressGuard<'_> {
    type Target = ProgressIndicator;

    fn deref(&self) -> &Self::Target {
        self.indicator
    }
}

impl DerefMut for ProgressGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.indicator
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.indicator.hide();
    }
}
