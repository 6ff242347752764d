//! Progress reporting

use tracing::{error, info};

/// Receives human-readable progress from a running session.
///
/// The session never assumes anything about presentation; a console, a
/// log file or a test recorder can sit behind this trait.
pub trait ProgressSink: Send + Sync {
    fn log(&self, message: &str);

    /// A message tied to an overall completion percentage (0-100).
    fn log_with_progress(&self, message: &str, percent: u8);

    /// Called exactly once when a run ends, `failed` when it reported
    /// errors or did not complete.
    fn log_done(&self, failed: bool);
}

/// Forwards progress to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn log(&self, message: &str) {
        info!("{message}");
    }

    fn log_with_progress(&self, message: &str, percent: u8) {
        info!(percent, "{message}");
    }

    fn log_done(&self, failed: bool) {
        if failed {
            error!("synchronization finished with errors");
        } else {
            info!("synchronization finished");
        }
    }
}

/// Integer percentage of `done` out of `total`; an empty job is complete.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(5, 4), 100);
    }
}
