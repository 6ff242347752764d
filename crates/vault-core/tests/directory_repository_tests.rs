//! Tests for the directory-backed repository

use vault_core::{
    DirectoryRepository, DownloadItem, LastRelevantVersion, LifecycleFilter, Repository, SessionConfig, SyncRule,
    SynchronizationSession,
};
use vault_test_utils::{LocalTree, MemoryStateStore, RecordingProgress};

fn exported_vault() -> LocalTree {
    let export = LocalTree::new();
    export.write("Designs/a.iam", b"assembly");
    export.write("Designs/sub/c.iam", b"sub assembly");
    export.write("Docs/readme.txt", b"hello");
    export
}

#[test]
fn test_lookups_map_vault_paths_to_directories() {
    let export = exported_vault();
    let repo = DirectoryRepository::new(export.root());

    let root = repo.find_folder("$").unwrap().unwrap();
    let designs = repo.find_folder("$/Designs").unwrap().unwrap();

    assert_eq!(root.path, "$");
    assert!(repo.find_folder("$/Missing").unwrap().is_none());
    assert!(repo.find_file(&designs, "a.iam").unwrap().is_some());
    assert!(repo.find_file(&designs, "nope.iam").unwrap().is_none());
}

#[test]
fn test_listings_respect_recursion() {
    let export = exported_vault();
    let repo = DirectoryRepository::new(export.root());
    let designs = repo.find_folder("$/Designs").unwrap().unwrap();

    let flat: Vec<String> = repo.list_files(&designs, false).unwrap().iter().map(|r| r.full_path()).collect();
    let deep: Vec<String> = repo.list_files(&designs, true).unwrap().iter().map(|r| r.full_path()).collect();
    let folders: Vec<String> = repo.list_folders(&designs, true).unwrap().into_iter().map(|f| f.path).collect();

    assert_eq!(flat, vec!["$/Designs/a.iam"]);
    assert_eq!(deep, vec!["$/Designs/a.iam", "$/Designs/sub/c.iam"]);
    assert_eq!(folders, vec!["$/Designs/sub"]);
}

#[test]
fn test_ids_are_stable_and_versions_relevant() {
    let export = exported_vault();
    let repo = DirectoryRepository::new(export.root());
    let designs = repo.find_folder("$/Designs").unwrap().unwrap();

    let first = repo.find_file(&designs, "a.iam").unwrap().unwrap();
    let again = DirectoryRepository::new(export.root())
        .find_file(&designs, "a.iam")
        .unwrap()
        .unwrap();
    assert_eq!(first.master_id, again.master_id);

    let version = repo.last_relevant_version(first.master_id, &[], &[]).unwrap();
    assert_eq!(version, LastRelevantVersion::Version(first.clone()));
}

#[test]
fn test_stateless_files_never_pass_an_allowed_state_filter() {
    let export = exported_vault();
    let repo = DirectoryRepository::new(export.root());
    let designs = repo.find_folder("$/Designs").unwrap().unwrap();
    let record = repo.find_file(&designs, "a.iam").unwrap().unwrap();

    let released = repo
        .last_relevant_version(record.master_id, &["Released".to_string()], &["Obsolete".to_string()])
        .unwrap();
    let open = repo
        .last_relevant_version(record.master_id, &[], &["Obsolete".to_string()])
        .unwrap();

    assert_eq!(released, LastRelevantVersion::None);
    assert_eq!(open, LastRelevantVersion::Version(record));
}

#[test]
fn test_download_copies_and_verifies() {
    let export = exported_vault();
    let local = LocalTree::new();
    let repo = DirectoryRepository::new(export.root());
    let docs = repo.find_folder("$/Docs").unwrap().unwrap();
    let record = repo.find_file(&docs, "readme.txt").unwrap().unwrap();
    let mut stale = record.clone();
    stale.checksum = "sha256:0000".into();

    let failed = repo
        .download_batch(&[
            DownloadItem {
                record: record.clone(),
                target: local.root().join("ok/readme.txt"),
            },
            DownloadItem {
                record: stale,
                target: local.root().join("bad/readme.txt"),
            },
        ])
        .unwrap();

    assert_eq!(failed, vec![record.master_id]);
    assert_eq!(local.read("ok/readme.txt"), b"hello");
    let checksum = repo.local_checksum(&local.root().join("ok/readme.txt")).unwrap();
    assert_eq!(checksum, record.checksum);
}

#[test]
fn test_full_session_against_exported_directory() {
    let export = exported_vault();
    let local = LocalTree::new();
    let repo = DirectoryRepository::new(export.root());
    let progress = RecordingProgress::new();
    let state = MemoryStateStore::new();
    let rules = vec![SyncRule {
        recursive: true,
        writable: true,
        ..SyncRule::new("$/Designs")
    }];

    let session = SynchronizationSession::new(&repo, &progress, &state, rules, SessionConfig::new(local.root()));
    let first = session.run().unwrap();
    let second = session.run().unwrap();

    assert_eq!(first.downloaded, 2);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.up_to_date, 2);
    assert_eq!(local.read("Designs/sub/c.iam"), b"sub assembly");
    assert!(!local.exists("Docs"));
}

#[test]
fn test_released_only_rule_downloads_nothing_from_an_export() {
    let export = exported_vault();
    let local = LocalTree::new();
    let repo = DirectoryRepository::new(export.root());
    let progress = RecordingProgress::new();
    let state = MemoryStateStore::new();
    let rules = vec![SyncRule {
        recursive: true,
        lifecycle: Some(LifecycleFilter {
            allowed: vec!["Released".into()],
            obsolete: vec![],
        }),
        ..SyncRule::new("$/Designs")
    }];

    let result = SynchronizationSession::new(&repo, &progress, &state, rules, SessionConfig::new(local.root()))
        .run()
        .unwrap();

    assert_eq!(result.downloaded, 0);
    assert_eq!(result.considered, 0);
    assert!(!local.exists("Designs/a.iam"));
}
