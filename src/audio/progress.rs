use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Receives human-readable status lines at coarse analysis milestones.
pub trait Progress {
    fn report(&self, message: &str);
}

impl<F: Fn(&str)> Progress for F {
    fn report(&self, message: &str) {
        self(message)
    }
}

#[allow(dead_code)]
pub struct Silent;

impl Progress for Silent {
    fn report(&self, _message: &str) {}
}

/// One spinner line per input, prefixed with the input name.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new(multi: &MultiProgress, name: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {prefix}: {msg}") {
            bar.set_style(style);
        }
        bar.set_prefix(name.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self, message: String) {
        self.bar.finish_with_message(message);
    }
}

impl Progress for Spinner {
    fn report(&self, message: &str) {
        log::debug!("{}", message);
        self.bar.set_message(message.to_string());
    }
}
