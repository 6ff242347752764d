//! CLI end-to-end tests that invoke the compiled `vault-sync` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the vault-sync binary
fn vault_cmd() -> Command {
    let mut cmd = Command::cargo_bin("vault-sync").expect("Failed to find vault-sync binary");
    cmd.env_remove("VAULT_SYNC_CONFIG").env("RUST_LOG", "warn");
    cmd
}

/// A temp dir holding an exported vault, a local root and a config file.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(rules: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let export = dir.path().join("export");
        for (path, content) in [
            ("Designs/a.iam", "assembly"),
            ("Designs/b.ipt", "part"),
            ("Designs/sub/c.iam", "sub assembly"),
        ] {
            let file = export.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }

        let config = format!(
            r#"vault_root = "local"
state_file = "state/state.toml"
temp_root = "staging"

[repository]
path = "export"

[retry]
max_retries = 1
fixed_delay_secs = 0

{rules}"#
        );
        fs::write(dir.path().join("sync.toml"), config).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("sync.toml")
    }

    fn local(&self, relative: &str) -> PathBuf {
        self.dir.path().join("local").join(relative)
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

const IAM_RULE: &str = r#"[[rules]]
scope = "$/Designs"
extensions = [".iam"]
recursive = true
writable = true
"#;

// ============================================================================
// sync Command Tests
// ============================================================================

#[test]
fn test_sync_downloads_and_reports_json() {
    let fixture = Fixture::new(IAM_RULE);

    let output = vault_cmd()
        .args(["sync", "--json", "--config"])
        .arg(fixture.config())
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["downloaded"], 2);
    assert_eq!(summary["failed"], 0);
    assert_eq!(fs::read_to_string(fixture.local("Designs/sub/c.iam")).unwrap(), "sub assembly");
    assert!(!fixture.local("Designs/b.ipt").exists());
    assert!(fixture.root().join("state/state.toml").exists());
}

#[test]
fn test_second_sync_downloads_nothing() {
    let fixture = Fixture::new(IAM_RULE);
    vault_cmd().args(["sync", "--config"]).arg(fixture.config()).assert().success();

    vault_cmd()
        .args(["sync", "--json", "--config"])
        .arg(fixture.config())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"downloaded\": 0"))
        .stdout(predicate::str::contains("\"up_to_date\": 2"));
}

#[test]
fn test_sync_with_missing_scope_exits_with_failure() {
    let fixture = Fixture::new(&format!("{IAM_RULE}\n[[rules]]\nscope = \"$/Nowhere\"\n"));

    vault_cmd()
        .args(["sync", "--no-retry", "--config"])
        .arg(fixture.config())
        .assert()
        .failure()
        .stdout(predicate::str::contains("$/Nowhere"));

    assert!(fixture.local("Designs/a.iam").exists());
    assert!(!fixture.root().join("state/state.toml").exists());
}

#[test]
fn test_missing_required_file_is_an_error() {
    let fixture = Fixture::new("[[rules]]\nscope = \"$/Designs/missing.iam\"\nrequired = true\n");

    vault_cmd()
        .args(["sync", "--config"])
        .arg(fixture.config())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Required file not found"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("sync.toml");
    fs::write(&config, "vault_root = [").unwrap();

    vault_cmd()
        .args(["sync", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// ============================================================================
// plan Command Tests
// ============================================================================

#[test]
fn test_plan_lists_downloads_without_touching_disk() {
    let fixture = Fixture::new(IAM_RULE);

    vault_cmd()
        .args(["plan", "--config"])
        .arg(fixture.config())
        .assert()
        .success()
        .stdout(predicate::str::contains("$/Designs/a.iam"))
        .stdout(predicate::str::contains("2 to download"));

    assert!(!fixture.local("Designs").exists());
}

#[test]
fn test_plan_json_is_machine_readable() {
    let fixture = Fixture::new(IAM_RULE);

    let output = vault_cmd()
        .args(["plan", "--json", "--config"])
        .arg(fixture.config())
        .output()
        .unwrap();

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["downloads"].as_array().unwrap().len(), 2);
    assert_eq!(plan["rule_count"], 1);
}

#[test]
fn test_no_command_shows_usage() {
    vault_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
