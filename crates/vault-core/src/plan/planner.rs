//! Building a [`SyncPlan`] from rules and the vault

use std::collections::HashSet;

use tracing::{debug, error, info, warn};
use vault_fs::{NormalizedPath, RobustnessConfig, io};

use super::{
    ChangeDetector, DeleteAction, DeleteReason, DownloadAction, FolderCreateAction, LocalPathMapper,
    MirrorTracker, SyncPlan,
};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::repository::{
    LastRelevantVersion, MasterId, RemoteFileRecord, RemoteFolder, RepoResult, Repository, RepositoryError,
};
use crate::rules::{PathMatcher, SyncRule};
use crate::vault_path;

/// Settings the planner needs besides the rules.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Local folder the vault root `$` maps to
    pub vault_root: NormalizedPath,
    /// Where rules with `download_to_temp` stage their files
    pub temp_root: NormalizedPath,
    /// Retries for local filesystem reads
    pub io: RobustnessConfig,
    /// Immediate retries for transient repository failures
    pub network: RobustnessConfig,
}

impl PlannerOptions {
    pub fn new(vault_root: NormalizedPath) -> Self {
        let temp_root = NormalizedPath::new(std::env::temp_dir().join("vault-sync"));
        Self {
            vault_root,
            temp_root,
            io: RobustnessConfig::default(),
            network: RobustnessConfig::with_retries(3),
        }
    }
}

/// A rule's scope after looking it up in the vault.
enum Scope {
    Folder(RemoteFolder),
    File { folder: RemoteFolder, record: RemoteFileRecord },
}

impl Scope {
    fn folder(&self) -> &RemoteFolder {
        match self {
            Scope::Folder(folder) | Scope::File { folder, .. } => folder,
        }
    }
}

/// State shared across rules within one plan.
#[derive(Default)]
struct PlanState {
    claimed: HashSet<MasterId>,
    checked_folders: HashSet<String>,
}

/// What one rule contributes. Merged into the plan only if the whole rule
/// planned without error.
#[derive(Default)]
struct RuleOutput {
    downloads: Vec<DownloadAction>,
    folders: Vec<FolderCreateAction>,
    deletes: Vec<DeleteAction>,
    considered: usize,
    up_to_date: usize,
    errors: Vec<String>,
    claimed: HashSet<MasterId>,
    checked_folders: HashSet<String>,
    reached_folders: HashSet<String>,
}

/// Per-rule working context.
struct RuleContext<'r> {
    index: usize,
    rule: &'r SyncRule,
    matcher: PathMatcher,
    mapper: LocalPathMapper,
    mirror: MirrorTracker,
    out: RuleOutput,
}

/// Turns rules and the vault listing into an ordered [`SyncPlan`].
///
/// Rules are processed in declaration order. A file (by master id) is
/// claimed by the first rule that selects it; later rules skip it. Errors
/// confined to one rule are recorded in the plan and the rule is dropped;
/// session-level errors (authentication, a missing required file,
/// cancellation) abort planning.
pub struct SyncPlanner<'a> {
    repository: &'a dyn Repository,
    options: PlannerOptions,
    cancel: CancellationToken,
}

impl<'a> SyncPlanner<'a> {
    pub fn new(repository: &'a dyn Repository, options: PlannerOptions) -> Self {
        Self {
            repository,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Build the plan for `rules`.
    pub fn plan(&self, rules: &[SyncRule]) -> Result<SyncPlan> {
        let mut plan = SyncPlan {
            rule_count: rules.len(),
            ..SyncPlan::default()
        };
        let mut state = PlanState::default();

        for (index, rule) in rules.iter().enumerate() {
            self.cancel.check()?;
            let rule = rule.clone().normalized();

            match self.plan_rule(index, &rule, &state) {
                Ok((out, mirrors)) => {
                    info!(
                        rule = rule.label(),
                        downloads = out.downloads.len(),
                        up_to_date = out.up_to_date,
                        deletes = out.deletes.len(),
                        mirrors = mirrors.len(),
                        "planned rule"
                    );
                    state.claimed.extend(out.claimed);
                    state.checked_folders.extend(out.checked_folders);
                    plan.downloads.extend(out.downloads);
                    plan.folders.extend(out.folders);
                    plan.deletes.extend(out.deletes);
                    plan.mirrors.extend(mirrors);
                    plan.considered += out.considered;
                    plan.up_to_date += out.up_to_date;
                    plan.errors.extend(out.errors);
                }
                Err(e) if e.is_session_level() => return Err(e),
                Err(e) => {
                    error!(rule = rule.label(), error = %e, "rule skipped");
                    plan.errors.push(format!("{}: {}", rule.label(), e));
                }
            }
        }

        Ok(plan)
    }

    fn plan_rule(
        &self,
        index: usize,
        rule: &SyncRule,
        state: &PlanState,
    ) -> Result<(RuleOutput, Vec<super::MirrorCleanupAction>)> {
        rule.validate()?;
        let scope = self.resolve(rule)?;

        let mut mapper = LocalPathMapper::new(rule, &self.options.vault_root);
        if let Scope::File { folder, .. } = &scope {
            mapper = mapper.with_scope_folder(folder.path.clone());
        }
        let mut ctx = RuleContext {
            index,
            rule,
            matcher: PathMatcher::new(rule),
            mapper,
            mirror: MirrorTracker::new(rule),
            out: RuleOutput::default(),
        };

        for record in self.candidates(rule, &scope, state)? {
            if !ctx.matcher.matches(&record.folder_path, &record.name, false) {
                continue;
            }
            let master_id = record.master_id;
            self.consider(&mut ctx, state, record)?;

            if rule.children_of_matches {
                let children = self.remote("children", || self.repository.children(master_id))?;
                for child in children {
                    ctx.out.checked_folders.insert(vault_path::key(&child.folder_path));
                    if ctx.matcher.matches(&child.folder_path, &child.name, true) {
                        self.consider(&mut ctx, state, child)?;
                    }
                }
            }
        }

        if rule.is_folder_mode()
            && let Scope::Folder(folder) = &scope
        {
            self.plan_folders(&mut ctx, folder)?;
        }

        for literal in &rule.delete_paths {
            match self.resolve_delete(&ctx.mapper, literal)? {
                Some(path) => ctx.out.deletes.push(DeleteAction {
                    rule_index: index,
                    path,
                    reason: DeleteReason::Configured,
                }),
                None => debug!(rule = rule.label(), path = %literal, "nothing to delete"),
            }
        }

        ctx.mirror.synthesize_empty_mirrors();
        let mirrors = ctx.mirror.into_actions(index, &ctx.mapper);
        Ok((ctx.out, mirrors))
    }

    /// Look the scope up as a folder first, then as a file.
    fn resolve(&self, rule: &SyncRule) -> Result<Scope> {
        if let Some(folder) = self.remote("find_folder", || self.repository.find_folder(&rule.scope))? {
            return Ok(Scope::Folder(folder));
        }

        let (parent, name) = vault_path::split(&rule.scope);
        if !parent.is_empty()
            && let Some(folder) = self.remote("find_folder", || self.repository.find_folder(parent))?
            && let Some(record) = self.remote("find_file", || self.repository.find_file(&folder, name))?
        {
            return Ok(Scope::File { folder, record });
        }

        if rule.required {
            Err(Error::RequiredFileMissing {
                path: rule.scope.clone(),
            })
        } else {
            Err(Error::ScopeNotFound {
                path: rule.scope.clone(),
            })
        }
    }

    fn candidates(&self, rule: &SyncRule, scope: &Scope, state: &PlanState) -> Result<Vec<RemoteFileRecord>> {
        match scope {
            Scope::File { record, .. } => Ok(vec![record.clone()]),
            Scope::Folder(folder) => {
                let covered = state.checked_folders.contains(&vault_path::key(&folder.path));
                if covered && !rule.recursive && !rule.is_folder_mode() {
                    debug!(rule = rule.label(), folder = %folder.path, "folder already covered by an earlier expansion");
                    return Ok(Vec::new());
                }
                self.remote("list_files", || self.repository.list_files(folder, rule.recursive))
            }
        }
    }

    /// Lifecycle gate, claim, mirror bookkeeping and change detection for
    /// one selected file.
    fn consider(&self, ctx: &mut RuleContext<'_>, state: &PlanState, record: RemoteFileRecord) -> Result<()> {
        let id = record.master_id;
        if state.claimed.contains(&id) || ctx.out.claimed.contains(&id) {
            debug!(rule = ctx.rule.label(), file = %record.full_path(), "claimed by an earlier match");
            ctx.mirror.record_file(&record.folder_path, &record.name);
            return Ok(());
        }

        let record = match &ctx.rule.lifecycle {
            None => record,
            Some(filter) => {
                let resolved = self.remote("last_relevant_version", || {
                    self.repository.last_relevant_version(id, &filter.allowed, &filter.obsolete)
                })?;
                match resolved {
                    LastRelevantVersion::Version(version) => version,
                    LastRelevantVersion::Obsolete => {
                        debug!(file = %record.full_path(), "obsolete, scheduling local delete");
                        // later rules must not download it again
                        ctx.out.claimed.insert(id);
                        ctx.out.deletes.push(DeleteAction {
                            rule_index: ctx.index,
                            path: ctx.mapper.map_file(&record),
                            reason: DeleteReason::Obsolete,
                        });
                        return Ok(());
                    }
                    LastRelevantVersion::None => {
                        debug!(file = %record.full_path(), "no released version");
                        return Ok(());
                    }
                }
            }
        };

        ctx.out.considered += 1;
        ctx.out.claimed.insert(id);
        ctx.out.reached_folders.insert(vault_path::key(&record.folder_path));
        ctx.mirror.record_file(&record.folder_path, &record.name);

        let destination = ctx.mapper.map_file(&record);
        let detector = ChangeDetector::new(self.repository, self.options.io, self.options.network);
        let needed = match detector.needs_download(ctx.rule, &record, &destination) {
            Ok(needed) => needed,
            Err(e) if e.is_session_level() => return Err(e),
            Err(e) => {
                // an unreadable local copy cannot be trusted
                warn!(file = %destination, error = %e, "local checksum failed, downloading again");
                ctx.out
                    .errors
                    .push(format!("{}: checksum of {} failed: {}", ctx.rule.label(), destination, e));
                true
            }
        };

        if !needed {
            ctx.out.up_to_date += 1;
            return Ok(());
        }

        let staging = ctx
            .rule
            .download_to_temp
            .then(|| self.options.temp_root.join(&id.to_string()).join(&record.name));
        ctx.out.downloads.push(DownloadAction {
            rule_index: ctx.index,
            run_after: ctx.rule.runs_on_download(&record.name),
            writable: ctx.rule.writable,
            component: ctx.rule.component.clone(),
            record,
            destination,
            staging,
        });
        Ok(())
    }

    /// Folder-mode rules: register sub-folders with the mirror tracker and
    /// make sure folders that receive no files still exist locally.
    fn plan_folders(&self, ctx: &mut RuleContext<'_>, scope: &RemoteFolder) -> Result<()> {
        ctx.mirror.register_folder(&scope.path);

        let folders = self.remote("list_folders", || {
            self.repository.list_folders(scope, ctx.rule.recursive)
        })?;
        for folder in folders {
            if !ctx.matcher.matches_folder(&folder.path) {
                continue;
            }
            ctx.mirror.register_folder(&folder.path);

            let reached = ctx
                .out
                .reached_folders
                .iter()
                .any(|f| vault_path::is_within(f, &vault_path::key(&folder.path)));
            if !reached {
                ctx.out.folders.push(FolderCreateAction {
                    rule_index: ctx.index,
                    path: ctx.mapper.map_folder(&folder.path),
                });
            }
        }
        Ok(())
    }

    /// First existing of: the mapped location of the path (output root and
    /// folder mappings applied), then the literal path (vault-rooted paths
    /// map onto the vault root, relative paths resolve against it).
    fn resolve_delete(&self, mapper: &LocalPathMapper, literal: &str) -> Result<Option<NormalizedPath>> {
        let normalized = vault_path::normalize(literal);
        let raw = NormalizedPath::new(literal);

        let candidates = if vault_path::is_within(&normalized, vault_path::ROOT) {
            vec![
                mapper.map_path(&normalized),
                self.options.vault_root.join(vault_path::strip_root(&normalized)),
            ]
        } else if raw.is_absolute() {
            vec![raw]
        } else {
            let mut relative = Vec::with_capacity(2);
            if let Some(root) = mapper.output_root() {
                relative.push(root.join(literal));
            }
            relative.push(self.options.vault_root.join(literal));
            relative
        };

        for candidate in candidates {
            if io::exists(&candidate, self.options.io)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn remote<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> RepoResult<T>,
    {
        Ok(self.options.network.retry_if(what, RepositoryError::is_transient, op)?)
    }
}
