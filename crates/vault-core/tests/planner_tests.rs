//! Tests for turning rules and a vault listing into a plan

use pretty_assertions::assert_eq;
use vault_fs::NormalizedPath;
use vault_core::{
    CancellationToken, DeleteReason, Error, FolderMapping, LifecycleFilter, PlannerOptions, SyncPlan, SyncPlanner,
    SyncRule,
};
use vault_test_utils::{LocalTree, MemoryRepository};

fn designs_vault() -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.add_file("$/Designs/a.iam", b"assembly a");
    repo.add_file("$/Designs/b.ipt", b"part b");
    repo.add_file("$/Designs/sub/c.iam", b"assembly c");
    repo
}

fn plan(repo: &MemoryRepository, tree: &LocalTree, rules: &[SyncRule]) -> SyncPlan {
    let mut options = PlannerOptions::new(tree.root());
    options.temp_root = tree.root().join("staging");
    SyncPlanner::new(repo, options).plan(rules).unwrap()
}

fn downloaded_paths(plan: &SyncPlan) -> Vec<String> {
    plan.downloads.iter().map(|d| d.record.full_path()).collect()
}

fn iam_rule(recursive: bool) -> SyncRule {
    SyncRule {
        extensions: vec![".iam".into()],
        recursive,
        ..SyncRule::new("$/Designs")
    }
}

mod scope_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_non_recursive_rule_takes_only_direct_matches() {
        let repo = designs_vault();
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[iam_rule(false)]);

        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/a.iam"]);
        assert_eq!(plan.downloads[0].destination, tree.root().join("Designs/a.iam"));
        assert!(plan.errors.is_empty());
    }

    #[test]
    fn test_recursive_rule_descends() {
        let repo = designs_vault();
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[iam_rule(true)]);

        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/a.iam", "$/Designs/sub/c.iam"]);
        assert_eq!(plan.considered, 2);
    }

    #[test]
    fn test_excludes_win_over_extensions() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rule = SyncRule {
            exclude: vec!["/SUB/".into()],
            ..iam_rule(true)
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/a.iam"]);
    }

    #[test]
    fn test_single_file_scope() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rule = SyncRule {
            output_root: Some(tree.root().join("out").as_str().to_string()),
            ..SyncRule::new("$/Designs/b.ipt")
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/b.ipt"]);
        assert_eq!(plan.downloads[0].destination, tree.root().join("out/b.ipt"));
    }

    #[test]
    fn test_missing_scope_is_recorded_and_later_rules_still_run() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rules = [SyncRule::new("$/Nowhere"), iam_rule(false)];

        let plan = plan(&repo, &tree, &rules);

        assert_eq!(plan.errors.len(), 1);
        assert!(plan.errors[0].contains("$/Nowhere"));
        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/a.iam"]);
    }

    #[test]
    fn test_missing_required_file_aborts_planning() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rule = SyncRule {
            required: true,
            ..SyncRule::new("$/Designs/missing.iam")
        };

        let options = PlannerOptions::new(tree.root());
        let err = SyncPlanner::new(&repo, options).plan(&[rule]).unwrap_err();

        assert!(matches!(err, Error::RequiredFileMissing { ref path } if path == "$/Designs/missing.iam"));
    }

    #[test]
    fn test_invalid_rule_is_skipped() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rules = [SyncRule::new("Designs"), iam_rule(false)];

        let plan = plan(&repo, &tree, &rules);

        assert_eq!(plan.errors.len(), 1);
        assert!(plan.errors[0].contains("not rooted"));
        assert_eq!(plan.downloads.len(), 1);
        assert_eq!(plan.downloads[0].rule_index, 1);
    }

    #[test]
    fn test_scope_lookup_is_case_insensitive() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rule = SyncRule {
            extensions: vec![".IAM".into()],
            ..SyncRule::new("$\\designs\\")
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/a.iam"]);
    }
}

mod dedup_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_rule_claims_a_file() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let first = SyncRule {
            component: Some("first".into()),
            ..iam_rule(true)
        };
        let second = SyncRule {
            component: Some("second".into()),
            recursive: true,
            ..SyncRule::new("$/Designs")
        };

        let plan = plan(&repo, &tree, &[first, second]);

        let mut ids: Vec<_> = plan.downloads.iter().map(|d| d.master_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), plan.downloads.len());
        let owners: Vec<(String, usize)> = plan
            .downloads
            .iter()
            .map(|d| (d.record.name.clone(), d.rule_index))
            .collect();
        assert_eq!(
            owners,
            vec![
                ("a.iam".to_string(), 0),
                ("c.iam".to_string(), 0),
                ("b.ipt".to_string(), 1),
            ]
        );
        assert_eq!(plan.downloads[2].component.as_deref(), Some("second"));
    }

    #[test]
    fn test_children_are_expanded_and_claimed() {
        let repo = designs_vault();
        let library = repo.add_file("$/Library/bolt.iam", b"bolt");
        repo.add_child(repo.id_of("$/Designs/a.iam"), library);
        let tree = LocalTree::new();
        let rule = SyncRule {
            children_of_matches: true,
            ..iam_rule(false)
        };

        let plan = plan(&repo, &tree, &[rule, SyncRule::new("$/Library")]);

        assert_eq!(downloaded_paths(&plan), vec!["$/Designs/a.iam", "$/Library/bolt.iam"]);
        assert!(plan.downloads.iter().all(|d| d.rule_index == 0));
        assert_eq!(plan.downloads[1].destination, tree.root().join("Library/bolt.iam"));
    }
}

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn released_only() -> SyncRule {
        SyncRule {
            lifecycle: Some(LifecycleFilter {
                allowed: vec!["Released".into()],
                obsolete: vec!["Obsolete".into()],
            }),
            ..SyncRule::new("$/Designs")
        }
    }

    #[test]
    fn test_latest_released_version_is_downloaded() {
        let repo = MemoryRepository::new();
        repo.add_file("$/Designs/a.iam", b"v1");
        repo.set_state("$/Designs/a.iam", "Released");
        repo.update_file("$/Designs/a.iam", b"v2 work in progress");
        let latest = repo.record("$/Designs/a.iam");
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[released_only()]);

        assert_eq!(plan.downloads.len(), 1);
        assert_ne!(plan.downloads[0].record.checksum, latest.checksum);
        assert_eq!(plan.downloads[0].record.lifecycle_state.as_deref(), Some("Released"));
    }

    #[test]
    fn test_obsolete_file_is_scheduled_for_deletion() {
        let repo = MemoryRepository::new();
        repo.add_file("$/Designs/a.iam", b"v1");
        repo.set_state("$/Designs/a.iam", "Obsolete");
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[released_only()]);

        assert!(plan.downloads.is_empty());
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].reason, DeleteReason::Obsolete);
        assert_eq!(plan.deletes[0].path, tree.root().join("Designs/a.iam"));
    }

    #[test]
    fn test_obsolete_verdict_claims_the_file_for_later_rules() {
        let repo = MemoryRepository::new();
        repo.add_file("$/Designs/a.iam", b"v1");
        repo.set_state("$/Designs/a.iam", "Obsolete");
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[released_only(), SyncRule::new("$/Designs")]);

        assert!(plan.downloads.is_empty());
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].rule_index, 0);
        assert_eq!(plan.deletes[0].reason, DeleteReason::Obsolete);
    }

    #[test]
    fn test_never_released_file_is_skipped() {
        let repo = MemoryRepository::new();
        repo.add_file("$/Designs/a.iam", b"draft");
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[released_only()]);

        assert!(plan.is_empty());
        assert_eq!(plan.considered, 0);
    }
}

mod mapping_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_folder_mapping_overrides_default_location() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let elsewhere = tree.root().join("elsewhere");
        let rule = SyncRule {
            folder_mappings: vec![FolderMapping {
                remote: "$/Designs/sub".into(),
                local: elsewhere.as_str().to_string(),
            }],
            ..iam_rule(true)
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(plan.downloads[0].destination, tree.root().join("Designs/a.iam"));
        assert_eq!(plan.downloads[1].destination, elsewhere.join("c.iam"));
    }

    #[test]
    fn test_staged_downloads_target_the_temp_root() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rule = SyncRule {
            download_to_temp: true,
            ..iam_rule(false)
        };

        let plan = plan(&repo, &tree, &[rule]);

        let action = &plan.downloads[0];
        let staging = action.staging.clone().unwrap();
        assert!(staging.as_str().starts_with(tree.root().join("staging").as_str()));
        assert_eq!(staging.file_name(), Some("a.iam"));
        assert_eq!(action.target(), &staging);
        assert_eq!(plan.staged().count(), 1);
    }
}

mod delete_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_output_root_candidate_wins_over_literal() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        tree.write("out/old.dwg", b"old");
        tree.write("Designs/old.dwg", b"old");
        let rule = SyncRule {
            output_root: Some(tree.root().join("out").as_str().to_string()),
            delete_paths: vec!["$/Designs/old.dwg".into()],
            ..iam_rule(false)
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].reason, DeleteReason::Configured);
        assert_eq!(plan.deletes[0].path, tree.root().join("out/old.dwg"));
    }

    #[test]
    fn test_literal_path_used_when_output_root_has_nothing() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        tree.write("Designs/old.dwg", b"old");
        let rule = SyncRule {
            output_root: Some(tree.root().join("out").as_str().to_string()),
            delete_paths: vec!["$/Designs/old.dwg".into()],
            ..iam_rule(false)
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(plan.deletes[0].path, tree.root().join("Designs/old.dwg"));
    }

    #[test]
    fn test_folder_mapping_applies_to_delete_paths() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        tree.write("legacy/x.dwg", b"old");
        let rule = SyncRule {
            folder_mappings: vec![FolderMapping {
                remote: "$/Designs/Old".into(),
                local: tree.root().join("legacy").as_str().to_string(),
            }],
            delete_paths: vec!["$/Designs/Old/x.dwg".into()],
            ..iam_rule(false)
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].path, tree.root().join("legacy/x.dwg"));
    }

    #[test]
    fn test_absent_delete_path_yields_no_action() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let rule = SyncRule {
            delete_paths: vec!["$/Designs/never.dwg".into()],
            ..iam_rule(false)
        };

        let plan = plan(&repo, &tree, &[rule]);

        assert!(plan.deletes.is_empty());
    }
}

mod folder_mode_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_vault_folders_are_created() {
        let repo = designs_vault();
        repo.add_folder("$/Designs/empty");
        let tree = LocalTree::new();
        let rule = SyncRule {
            extensions: vec!["/".into()],
            recursive: true,
            ..SyncRule::new("$/Designs")
        };

        let plan = plan(&repo, &tree, &[rule]);

        let folders: Vec<NormalizedPath> = plan.folders.iter().map(|f| f.path.clone()).collect();
        assert_eq!(folders, vec![tree.root().join("Designs/empty")]);
        assert_eq!(plan.downloads.len(), 3);
    }

    #[test]
    fn test_mirror_roots_produce_cleanup_entries() {
        let repo = MemoryRepository::new();
        repo.add_file("$/Designs/out/x.txt", b"x");
        repo.add_file("$/Designs/out/deep/er/y.txt", b"y");
        let tree = LocalTree::new();
        let rule = SyncRule {
            mirror_roots: vec!["$/Designs/out".into()],
            recursive: true,
            ..SyncRule::new("$/Designs")
        };

        let plan = plan(&repo, &tree, &[rule]);

        let remotes: Vec<&str> = plan.mirrors.iter().map(|m| m.remote_folder.as_str()).collect();
        assert_eq!(remotes, vec!["$/Designs/out", "$/Designs/out/deep", "$/Designs/out/deep/er"]);
        assert!(plan.mirrors[0].keep_files.contains("x.txt"));
        assert!(plan.mirrors[0].keep_dirs.contains("deep"));
        assert!(plan.mirrors[1].keep_files.is_empty());
    }
}

mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_authentication_failure_aborts() {
        let repo = designs_vault();
        repo.fail_authentication(true);
        let tree = LocalTree::new();

        let err = SyncPlanner::new(&repo, PlannerOptions::new(tree.root()))
            .plan(&[iam_rule(false)])
            .unwrap_err();

        assert!(err.is_session_level());
    }

    #[test]
    fn test_transient_lookup_failures_are_retried() {
        let repo = designs_vault();
        repo.fail_lookups(2);
        let tree = LocalTree::new();

        let plan = plan(&repo, &tree, &[iam_rule(false)]);

        assert!(plan.errors.is_empty());
        assert_eq!(plan.downloads.len(), 1);
        assert_eq!(repo.lookups(), 3);
    }

    #[test]
    fn test_cancelled_token_interrupts() {
        let repo = designs_vault();
        let tree = LocalTree::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = SyncPlanner::new(&repo, PlannerOptions::new(tree.root()))
            .with_cancellation(token)
            .plan(&[iam_rule(false)])
            .unwrap_err();

        assert!(matches!(err, Error::Interrupted));
    }
}

mod dedup_properties {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use vault_core::vault_path;

    /// Vault files and the lifecycle state of their only version.
    const FILES: [(&str, Option<&str>); 6] = [
        ("$/A/one.iam", Some("Released")),
        ("$/A/two.ipt", Some("Obsolete")),
        ("$/A/B/three.iam", None),
        ("$/A/B/four.dwg", Some("Released")),
        ("$/A/B/C/five.iam", Some("Obsolete")),
        ("$/A/C/six.ipt", None),
    ];
    const SCOPES: [&str; 4] = ["$/A", "$/A/B", "$/A/B/C", "$/A/C"];
    const EXTENSIONS: [&str; 3] = [".iam", ".ipt", ".dwg"];

    fn rule_strategy() -> impl Strategy<Value = SyncRule> {
        (
            0..SCOPES.len(),
            proptest::option::of(0..EXTENSIONS.len()),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(scope, extension, recursive, gated)| SyncRule {
                extensions: extension.map(|e| vec![EXTENSIONS[e].to_string()]).unwrap_or_default(),
                recursive,
                lifecycle: gated.then(|| LifecycleFilter {
                    allowed: vec!["Released".into()],
                    obsolete: vec!["Obsolete".into()],
                }),
                ..SyncRule::new(SCOPES[scope])
            })
    }

    fn selects(rule: &SyncRule, file: &str) -> bool {
        let (folder, name) = vault_path::split(file);
        let in_scope = if rule.recursive {
            vault_path::is_within(folder, &rule.scope)
        } else {
            vault_path::eq_ci(folder, &rule.scope)
        };
        in_scope && vault_core::PathMatcher::new(rule).matches(folder, name, false)
    }

    /// The rule that claims `file` and whether it downloads (`true`) or
    /// deletes it as obsolete (`false`). Gated rules pass over files that
    /// were never released.
    fn claimant(rules: &[SyncRule], file: &str, state: Option<&str>) -> Option<(usize, bool)> {
        rules.iter().enumerate().find_map(|(index, rule)| {
            if !selects(rule, file) {
                return None;
            }
            match (&rule.lifecycle, state) {
                (None, _) | (Some(_), Some("Released")) => Some((index, true)),
                (Some(_), Some(_)) => Some((index, false)),
                (Some(_), None) => None,
            }
        })
    }

    proptest! {
        #[test]
        fn each_file_is_claimed_once_by_the_earliest_matching_rule(
            rules in proptest::collection::vec(rule_strategy(), 1..5)
        ) {
            let repo = MemoryRepository::new();
            for (file, state) in FILES {
                repo.add_file(file, file.as_bytes());
                if let Some(state) = state {
                    repo.set_state(file, state);
                }
            }
            let tree = LocalTree::new();

            let plan = plan(&repo, &tree, &rules);

            let mut seen = std::collections::HashSet::new();
            for action in &plan.downloads {
                prop_assert!(seen.insert(action.master_id()));
            }

            for (file, state) in FILES {
                let id = repo.id_of(file);
                let local = tree.root().join(vault_path::strip_root(file));
                let downloads: Vec<usize> = plan
                    .downloads
                    .iter()
                    .filter(|d| d.master_id() == id)
                    .map(|d| d.rule_index)
                    .collect();
                let deletes: Vec<usize> = plan
                    .deletes
                    .iter()
                    .filter(|d| d.reason == DeleteReason::Obsolete && d.path == local)
                    .map(|d| d.rule_index)
                    .collect();

                match claimant(&rules, file, state) {
                    Some((index, true)) => {
                        prop_assert_eq!(downloads, vec![index]);
                        prop_assert!(deletes.is_empty());
                    }
                    Some((index, false)) => {
                        prop_assert!(downloads.is_empty());
                        prop_assert_eq!(deletes, vec![index]);
                    }
                    None => {
                        prop_assert!(downloads.is_empty());
                        prop_assert!(deletes.is_empty());
                    }
                }
            }
        }
    }
}
