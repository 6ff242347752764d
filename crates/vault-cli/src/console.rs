//! Colored progress output on stderr

use colored::Colorize;
use vault_core::ProgressSink;

/// [`ProgressSink`] writing to stderr, leaving stdout for results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn log(&self, message: &str) {
        eprintln!("{} {}", "=>".blue().bold(), message);
    }

    fn log_with_progress(&self, message: &str, percent: u8) {
        eprintln!("{} {} {}", "=>".blue().bold(), format!("[{percent:>3}%]").dimmed(), message);
    }

    fn log_done(&self, failed: bool) {
        if failed {
            eprintln!("{} Synchronization finished with errors", "FAILED".red().bold());
        } else {
            eprintln!("{} Synchronization finished", "OK".green().bold());
        }
    }
}
