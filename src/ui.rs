// UI module for consistent terminal output with progress bars and styling
//
// Spinners, per-package transfer bars and the checkmark/arrow message helpers.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use crate::download::TransferProgress;
use crate::install::{ItemState, QueueItem, QueueObserver};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Spinner style similar to uv/pnpm
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Check if stderr is a TTY (for interactive output)
fn is_tty() -> bool {
    Term::stderr().is_term()
}

/// Create a styled spinner for async operations
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if !is_tty() {
        // Messages are printed directly when finishing instead
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars(SPINNER_CHARS)
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());

    if is_tty() {
        pb.enable_steady_tick(Duration::from_millis(80));
    }

    pb
}

/// Create a progress bar for downloads with size
pub fn download_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} {msg} [{bar:25.cyan/dim}] {bytes}/{total_bytes} {prefix:.dim}")
            .unwrap()
            .tick_chars(SPINNER_CHARS)
            .progress_chars("━━╺"),
    );
    pb
}

/// Human readable byte count, e.g. `1.4 GB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Print an info/action message with arrow
pub fn action(message: &str) {
    println!("{} {}", style("→").cyan(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("{} {}", style("⚠").yellow(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red(), message);
}

/// Print a header/section message
pub fn header(message: &str) {
    println!("{}", style(message).bold());
}

/// Print a dimmed/secondary message
pub fn dim(message: &str) {
    println!("{}", style(message).dim());
}

/// Print a status message (for dry-run, etc.)
pub fn status(prefix: &str, message: &str) {
    println!("{} {}", style(prefix).cyan().bold(), message);
}

/// Print a plain line, used for tabular listings
pub fn line(message: &str) {
    println!("{}", message);
}

/// Finish a spinner with success
pub fn finish_spinner_success(pb: &ProgressBar, message: &str) {
    let msg = format!("{} {}", style("✓").green(), message);
    if is_tty() {
        pb.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
        pb.finish_with_message(msg);
    } else {
        pb.finish_and_clear();
        println!("{}", msg);
    }
}

/// Finish a spinner with error
pub fn finish_spinner_error(pb: &ProgressBar, message: &str) {
    let msg = format!("{} {}", style("✗").red(), message);
    if is_tty() {
        pb.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
        pb.finish_with_message(msg);
    } else {
        pb.finish_and_clear();
        eprintln!("{}", msg);
    }
}

/// Clear a progress bar without leaving a message
pub fn clear_bar(pb: &ProgressBar) {
    pb.finish_and_clear();
}

/// Renders queue progress: a transfer bar per downloading package and a spinner
/// per installing package.
pub struct QueueProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl Default for QueueProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueProgress {
    pub fn new() -> Self {
        let multi = if is_tty() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Remove any bar still on screen, e.g. after an aborted run
    pub fn clear(&self) {
        if let Ok(mut bars) = self.bars.lock() {
            for (_, pb) in bars.drain() {
                clear_bar(&pb);
            }
        }
    }

    fn replace_bar(&self, id: &str, pb: Option<ProgressBar>) -> Option<ProgressBar> {
        let mut bars = self.bars.lock().ok()?;
        match pb {
            Some(pb) => bars.insert(id.to_string(), pb),
            None => bars.remove(id),
        }
    }
}

impl QueueObserver for QueueProgress {
    fn state_changed(&self, item: &QueueItem, previous: ItemState) {
        let id = item.id();
        match item.state {
            ItemState::Hashing if previous == ItemState::WaitingForDownload => {
                let pb = self
                    .multi
                    .add(download_bar(item.package.info().download_size));
                pb.set_message(format!("{} {}", id, style("verifying").dim()));
                if let Some(old) = self.replace_bar(id, Some(pb)) {
                    clear_bar(&old);
                }
            }
            ItemState::Hashing | ItemState::Downloading => {
                if let Ok(bars) = self.bars.lock() {
                    if let Some(pb) = bars.get(id) {
                        pb.set_message(format!("{} {}", id, style(item.state).dim()));
                    }
                }
            }
            ItemState::WaitingForDownload => {
                // A retry leaves the bar on screen until the next attempt starts
            }
            ItemState::WaitingForInstall => {
                if let Some(pb) = self.replace_bar(id, None) {
                    let message = format!("{} {}", id, style("downloaded").dim());
                    finish_spinner_success(&pb, &message);
                }
            }
            ItemState::Installing => {
                let pb = self.multi.add(spinner(&format!("Installing {}", id)));
                if let Some(old) = self.replace_bar(id, Some(pb)) {
                    clear_bar(&old);
                }
            }
            ItemState::Complete => {
                let message = if previous == ItemState::Installing {
                    format!("{} {}", id, style("installed").dim())
                } else {
                    format!("{} {}", id, style("downloaded").dim())
                };
                match self.replace_bar(id, None) {
                    Some(pb) => finish_spinner_success(&pb, &message),
                    None => success(&message),
                }
            }
        }
    }

    fn transfer(&self, id: &str, progress: &TransferProgress) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(id) {
                pb.set_length(progress.bytes_total());
                pb.set_position(progress.bytes_processed());
                let speed = progress.bytes_per_second();
                if speed > 0 {
                    pb.set_prefix(format!("{}/s", format_bytes(speed)));
                }
            }
        }
    }

    fn retrying(&self, item: &QueueItem) {
        let message = format!("{} {}", item.id(), item.status_text());
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(item.id()) {
                pb.reset();
                pb.println(format!("{} {}", style("⚠").yellow(), message));
                return;
            }
        }
        warning(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
    }
}
