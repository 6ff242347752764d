//! Run summary

use serde::Serialize;

use crate::plan::SyncPlan;
use crate::repository::MasterId;

/// Outcome of one synchronization run.
///
/// Built fresh for every run and filled by each phase in turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Files that passed the rule filters
    pub considered: usize,
    pub downloaded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    /// Local files and folders removed by deletes and mirror cleanup
    pub deleted: usize,
    /// Human-readable problems, in the order they happened
    pub errors: Vec<String>,
    pub failed_ids: Vec<MasterId>,
}

impl RunResult {
    /// Start a result from what planning found, carrying over its errors.
    pub fn from_plan(plan: &SyncPlan) -> Self {
        Self {
            considered: plan.considered,
            up_to_date: plan.up_to_date,
            errors: plan.errors.clone(),
            ..Self::default()
        }
    }

    /// Record a file that could not be put in place.
    pub fn fail(&mut self, id: MasterId, message: impl Into<String>) {
        if !self.failed_ids.contains(&id) {
            self.failed_ids.push(id);
            self.failed += 1;
        }
        self.errors.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn has_failed(&self, id: MasterId) -> bool {
        self.failed_ids.contains(&id)
    }

    /// True when nothing went wrong anywhere in the run.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.failed_ids.is_empty()
    }
}
