//! Collaborators that record what the engine asked of them.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use vault_fs::NormalizedPath;
use vault_core::{CancellationToken, CommandRunner, ProgressSink, StateStore};

/// [`ProgressSink`] that keeps every message.
///
/// Optionally cancels a token on the first progress percentage, which lets
/// tests interrupt a session in the middle of its download phase.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    messages: Mutex<Vec<String>>,
    percents: Mutex<Vec<u8>>,
    done: Mutex<Vec<bool>>,
    cancel_on_progress: Option<CancellationToken>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_progress: Some(token),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.percents.lock().unwrap().clone()
    }

    /// Values passed to `log_done`, one per finished run.
    pub fn done(&self) -> Vec<bool> {
        self.done.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn log(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn log_with_progress(&self, message: &str, percent: u8) {
        self.log(message);
        self.percents.lock().unwrap().push(percent);
        if let Some(token) = &self.cancel_on_progress {
            token.cancel();
        }
    }

    fn log_done(&self, failed: bool) {
        self.done.lock().unwrap().push(failed);
    }
}

/// [`CommandRunner`] that records paths instead of spawning processes.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<NormalizedPath>>,
    fail: bool,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner whose every command fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn runs(&self) -> Vec<NormalizedPath> {
        self.runs.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &NormalizedPath) -> std::io::Result<()> {
        self.runs.lock().unwrap().push(program.clone());
        if self.fail {
            Err(std::io::Error::other("exit status 1"))
        } else {
            Ok(())
        }
    }
}

/// [`StateStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    last: Mutex<Option<DateTime<Utc>>>,
    writes: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last(at: DateTime<Utc>) -> Self {
        Self {
            last: Mutex::new(Some(at)),
            writes: Mutex::new(0),
        }
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        *self.last.lock().unwrap()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl StateStore for MemoryStateStore {
    fn last_synchronized(&self) -> vault_core::Result<Option<DateTime<Utc>>> {
        Ok(self.last())
    }

    fn set_last_synchronized(&self, at: DateTime<Utc>) -> vault_core::Result<()> {
        *self.last.lock().unwrap() = Some(at);
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}
