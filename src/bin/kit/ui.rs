//! Terminal output: logging setup, colours and the indicatif progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use scriptkit::TaskProgress;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

pub fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
pub fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
pub fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
pub fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
pub fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Logging ──────────────────────────────────────────────────────────────────

/// Install the stderr subscriber.
///
/// Library INFO logs are suppressed while a progress bar is on screen; the
/// bar carries the feedback. `--verbose` always wins, `RUST_LOG` beats both.
pub fn init_logging(verbose: bool, quiet: bool, show_progress: bool) {
    let filter = if verbose {
        "debug"
    } else if quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

// ── Progress bar ─────────────────────────────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// How positions reported by the library should be displayed.
#[derive(Debug, Clone, Copy)]
pub enum Unit {
    /// Download sizes.
    Bytes,
    /// Whole items: pages, requests, diagrams.
    Count(&'static str),
    /// Fraction of a known total (media milliseconds, per-mille).
    Percent,
}

/// [`TaskProgress`] drawn as a single indicatif bar on stderr.
pub struct BarProgress {
    bar: ProgressBar,
    unit: Unit,
}

impl BarProgress {
    /// Starts as a spinner; becomes a bar once the total is known.
    pub fn new(unit: Unit, prefix: &str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix(prefix.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar, unit })
    }

    fn bar_style(&self) -> ProgressStyle {
        let counter = match self.unit {
            Unit::Bytes => "{bytes}/{total_bytes}".to_string(),
            Unit::Count(noun) => format!("{{pos:>3}}/{{len}} {noun}"),
            Unit::Percent => "{percent:>3}%".to_string(),
        };
        let template = format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {counter}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}  {{msg:.dim}}"
        );
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS)
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

impl TaskProgress for BarProgress {
    fn on_start(&self, label: &str, total: Option<u64>) {
        self.bar.set_prefix(label.to_string());
        match total {
            Some(t) if t > 0 => {
                self.bar.set_length(t);
                self.bar.set_style(self.bar_style());
            }
            _ => self.bar.set_style(spinner_style()),
        }
        self.bar.reset_eta();
    }

    fn on_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    fn on_advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn on_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_finish(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

/// Human-readable byte count.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
