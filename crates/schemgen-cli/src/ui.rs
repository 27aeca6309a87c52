//! Console output: a spinner for each pipeline stage and colored status lines.

use colored::ColoredString;
pub use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use once_cell::sync::Lazy;
use std::time::Duration;

static MULTI: Lazy<MultiProgress> = Lazy::new(MultiProgress::new);

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Green,
    Yellow,
    Red,
    Cyan,
}

pub trait StyledText {
    fn with_style(self, style: Style) -> ColoredString;
}

impl<T: AsRef<str>> StyledText for T {
    fn with_style(self, style: Style) -> ColoredString {
        let text = self.as_ref();
        match style {
            Style::Green => text.green(),
            Style::Yellow => text.yellow(),
            Style::Red => text.red(),
            Style::Cyan => text.cyan(),
        }
    }
}

pub mod icons {
    use colored::Colorize;

    pub fn success() -> String {
        "✓".green().to_string()
    }

    pub fn error() -> String {
        "✗".red().to_string()
    }

    pub fn warning() -> String {
        "!".yellow().to_string()
    }

    pub fn arrow() -> &'static str {
        "→"
    }
}

/// Indeterminate progress for one pipeline stage.
pub struct Spinner {
    progress_bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let progress_bar = MULTI.add(ProgressBar::new_spinner());
        // The template is a constant; a bad one only loses the styling.
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            progress_bar.set_style(style.tick_chars(TICK_CHARS));
        }
        progress_bar.set_message(message.into());
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        Spinner { progress_bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.progress_bar.set_message(message.into());
    }

    /// Run `f` with the spinner hidden so printed lines stay intact.
    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.progress_bar.set_draw_target(ProgressDrawTarget::hidden());
        let result = f();
        self.progress_bar.set_draw_target(ProgressDrawTarget::stderr());
        self.progress_bar.tick();
        result
    }

    /// Print a line above the spinner.
    pub fn println(&self, line: impl AsRef<str>) {
        self.suspend(|| println!("{}", line.as_ref()));
    }

    pub fn finish(self) {
        self.progress_bar.finish_and_clear();
    }
}
