//! One synchronization run, end to end

use chrono::Utc;
use tracing::{info, warn};
use vault_fs::{NormalizedPath, RobustnessConfig};

use super::{BatchExecutor, CommandRunner, ExecutorOptions, ProcessRunner, RunResult};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::plan::{PlannerOptions, SyncPlan, SyncPlanner};
use crate::preflight::{self, ReachabilityProbe};
use crate::progress::ProgressSink;
use crate::repository::Repository;
use crate::rules::SyncRule;
use crate::state::StateStore;

static PROCESS_RUNNER: ProcessRunner = ProcessRunner;

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub vault_root: NormalizedPath,
    pub temp_root: NormalizedPath,
    pub batch_size: usize,
    pub io: RobustnessConfig,
    pub network: RobustnessConfig,
}

impl SessionConfig {
    pub fn new(vault_root: impl Into<NormalizedPath>) -> Self {
        let planner = PlannerOptions::new(vault_root.into());
        let executor = ExecutorOptions::default();
        Self {
            vault_root: planner.vault_root,
            temp_root: planner.temp_root,
            batch_size: executor.batch_size,
            io: executor.io,
            network: executor.network,
        }
    }

    fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            vault_root: self.vault_root.clone(),
            temp_root: self.temp_root.clone(),
            io: self.io,
            network: self.network,
        }
    }

    fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            batch_size: self.batch_size,
            io: self.io,
            network: self.network,
        }
    }
}

/// Owns one run: plan, download, materialize, clean up, record.
///
/// The session is cheap to build and holds only borrowed collaborators, so
/// a [`RetryDriver`](super::RetryDriver) builds a fresh one per attempt or
/// reuses the same one; either way each [`run`](Self::run) starts from
/// scratch and re-detects what still needs doing.
pub struct SynchronizationSession<'a> {
    repository: &'a dyn Repository,
    progress: &'a dyn ProgressSink,
    state: &'a dyn StateStore,
    runner: &'a dyn CommandRunner,
    rules: Vec<SyncRule>,
    config: SessionConfig,
    probes: Vec<Box<dyn ReachabilityProbe>>,
    cancel: CancellationToken,
}

impl<'a> SynchronizationSession<'a> {
    pub fn new(
        repository: &'a dyn Repository,
        progress: &'a dyn ProgressSink,
        state: &'a dyn StateStore,
        rules: Vec<SyncRule>,
        config: SessionConfig,
    ) -> Self {
        Self {
            repository,
            progress,
            state,
            runner: &PROCESS_RUNNER,
            rules,
            config,
            probes: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_runner(mut self, runner: &'a dyn CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn ReachabilityProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Build the plan without touching the local tree.
    pub fn plan(&self) -> Result<SyncPlan> {
        SyncPlanner::new(self.repository, self.config.planner_options())
            .with_cancellation(self.cancel.clone())
            .plan(&self.rules)
    }

    /// Run once. Session-level failures (authentication, a missing required
    /// file, unreachable servers, cancellation) come back as `Err`; all
    /// other problems are collected in the returned [`RunResult`].
    pub fn run(&self) -> Result<RunResult> {
        let outcome = self.run_phases();
        match &outcome {
            Ok(result) => self.progress.log_done(!result.is_clean()),
            Err(_) => self.progress.log_done(true),
        }
        outcome
    }

    fn run_phases(&self) -> Result<RunResult> {
        let started = Utc::now();
        preflight::check_reachable(&self.probes)?;

        match self.state.last_synchronized()? {
            Some(at) => info!(last = %at, "previous synchronization"),
            None => info!("no previous synchronization recorded"),
        }

        self.cancel.check()?;
        self.progress.log(&format!("Planning {} rules", self.rules.len()));
        let plan = self.plan()?;
        self.cancel.check()?;

        let mut result = RunResult::from_plan(&plan);
        self.progress.log(&format!(
            "{} files to download, {} up to date",
            plan.downloads.len(),
            plan.up_to_date
        ));

        let executor = BatchExecutor::new(
            self.repository,
            self.progress,
            self.runner,
            self.config.executor_options(),
        )
        .with_cancellation(self.cancel.clone());
        executor.download(&plan.downloads, &mut result)?;

        self.cancel.check()?;
        executor.materialize(&plan, &mut result);
        executor.finish(&plan, &mut result);

        if result.is_clean() {
            self.state.set_last_synchronized(started)?;
        } else {
            warn!(errors = result.errors.len(), failed = result.failed, "run had errors, timestamp not recorded");
        }

        info!(
            considered = result.considered,
            downloaded = result.downloaded,
            up_to_date = result.up_to_date,
            failed = result.failed,
            deleted = result.deleted,
            "synchronization summary"
        );
        Ok(result)
    }
}
