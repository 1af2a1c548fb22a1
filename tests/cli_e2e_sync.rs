//! End-to-end tests for the `sync` command
//!
//! These tests invoke the actual CLI binary against local git fixtures and
//! validate its behavior from a user's perspective. No network access is
//! required: the "remote" is a repository on the local filesystem.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;

/// Run git in `dir`, panicking on failure. Fixture setup only.
fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Create a local "remote" repository with one commit on `master`.
fn create_origin(dir: &Path) {
    git(dir, &["init", "--initial-branch=master"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "# fixture\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "initial commit"]);
}

fn file_url(dir: &Path) -> String {
    format!("file://{}", dir.display())
}

/// Test that --help flag shows help information
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_help() {
    let mut cmd = cargo_bin_cmd!("hostup");

    cmd.arg("sync")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Synchronize the provisioning repository",
        ));
}

/// Test that a malformed URL is rejected before any git work
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_rejects_malformed_url() {
    let mut cmd = cargo_bin_cmd!("hostup");

    cmd.arg("sync")
        .arg("--repo-url")
        .arg("not a url")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid repository URL"));
}

/// Test that an explicit config path must exist
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_missing_config_file() {
    let mut cmd = cargo_bin_cmd!("hostup");

    cmd.arg("sync")
        .arg("--config")
        .arg("/nonexistent/hostup.toml")
        .assert()
        .failure();
}

/// Test that a missing checkout is cloned and the delegate runs inside it
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_clones_when_absent_and_delegates() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--exec")
        .arg("touch delegate-ran")
        .arg("--quiet")
        .assert()
        .success();

    clone.child("README.md").assert(predicate::path::is_file());
    clone
        .child("delegate-ran")
        .assert(predicate::path::is_file());
}

/// Test that a second sync of an existing checkout is a no-op
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    let clone = temp.child("clone");

    for _ in 0..2 {
        let mut cmd = cargo_bin_cmd!("hostup");
        cmd.arg("sync")
            .arg("--repo-url")
            .arg(file_url(origin.path()))
            .arg("--repo-path")
            .arg(clone.path())
            .arg("--quiet")
            .assert()
            .success();
    }

    clone.child("README.md").assert(predicate::path::is_file());
}

/// Test that a requested tag is checked out
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_checks_out_tag() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    git(origin.path(), &["tag", "v1.0.0"]);
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("v1.0.0")
        .arg("--quiet")
        .assert()
        .success();

    let described = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .current_dir(clone.path())
        .output()
        .unwrap();
    assert_eq!(
        String::from_utf8_lossy(&described.stdout).trim(),
        "v1.0.0"
    );
}

/// Test that re-syncing an existing checkout at the requested tag succeeds
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_tag_resync_is_idempotent() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    git(origin.path(), &["tag", "v1.0.0"]);
    let clone = temp.child("clone");

    // The second run finds a detached HEAD already at the tag; it must
    // not pull or invent a branch to delete
    for _ in 0..2 {
        let mut cmd = cargo_bin_cmd!("hostup");
        cmd.arg("sync")
            .arg("--repo-url")
            .arg(file_url(origin.path()))
            .arg("--repo-path")
            .arg(clone.path())
            .arg("--repo-version")
            .arg("v1.0.0")
            .arg("--quiet")
            .assert()
            .success();
    }

    let described = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .current_dir(clone.path())
        .output()
        .unwrap();
    assert_eq!(
        String::from_utf8_lossy(&described.stdout).trim(),
        "v1.0.0"
    );
}

/// Test that a matching branch is fast-forwarded to new upstream commits
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_fast_forwards_matching_branch() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("master")
        .arg("--quiet")
        .assert()
        .success();

    // New upstream commit after the initial clone
    std::fs::write(origin.path().join("new-file.txt"), "new\n").unwrap();
    git(origin.path(), &["add", "."]);
    git(origin.path(), &["commit", "-m", "add new file"]);

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("master")
        .arg("--quiet")
        .assert()
        .success();

    clone
        .child("new-file.txt")
        .assert(predicate::path::is_file());
}

/// Test that a diverged non-default branch is repaired by rebuilding it
/// from the remote
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_repairs_diverged_branch() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    git(origin.path(), &["checkout", "-b", "feature"]);
    std::fs::write(origin.path().join("feature.txt"), "v1\n").unwrap();
    git(origin.path(), &["add", "."]);
    git(origin.path(), &["commit", "-m", "feature work"]);
    git(origin.path(), &["checkout", "master"]);
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("feature")
        .arg("--quiet")
        .assert()
        .success();

    // Rewrite the upstream branch so the local one diverges
    git(origin.path(), &["checkout", "feature"]);
    git(origin.path(), &["commit", "--amend", "-m", "rewritten feature work"]);
    std::fs::write(origin.path().join("feature.txt"), "v2\n").unwrap();
    git(origin.path(), &["add", "."]);
    git(origin.path(), &["commit", "--amend", "--no-edit"]);
    git(origin.path(), &["checkout", "master"]);

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("feature")
        .arg("--quiet")
        .assert()
        .success();

    let content = std::fs::read_to_string(clone.path().join("feature.txt")).unwrap();
    assert_eq!(content, "v2\n");
}

/// Test that a diverged default branch converges on the remote
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_repairs_diverged_default_branch() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("master")
        .arg("--quiet")
        .assert()
        .success();

    // Local-only commit on master plus a new upstream commit: the
    // fast-forward pull cannot apply
    git(clone.path(), &["config", "user.email", "test@example.com"]);
    git(clone.path(), &["config", "user.name", "Test"]);
    std::fs::write(clone.path().join("local.txt"), "local\n").unwrap();
    git(clone.path(), &["add", "."]);
    git(clone.path(), &["commit", "-m", "local-only work"]);
    std::fs::write(origin.path().join("upstream.txt"), "upstream\n").unwrap();
    git(origin.path(), &["add", "."]);
    git(origin.path(), &["commit", "-m", "upstream work"]);

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--repo-version")
        .arg("master")
        .arg("--quiet")
        .assert()
        .success();

    // The checkout matches the remote: upstream work present, the
    // local-only commit discarded
    clone
        .child("upstream.txt")
        .assert(predicate::path::is_file());
    clone
        .child("local.txt")
        .assert(predicate::path::missing());
}

/// Test that the delegate's non-zero exit code becomes the process exit code
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_propagates_delegate_exit_code() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--exec")
        .arg("false")
        .arg("--quiet")
        .assert()
        .failure()
        .code(1);
}

/// Test that arguments after `--` reach the delegate verbatim
#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_sync_forwards_trailing_arguments() {
    let temp = assert_fs::TempDir::new().unwrap();
    let origin = temp.child("origin");
    origin.create_dir_all().unwrap();
    create_origin(origin.path());
    let clone = temp.child("clone");

    let mut cmd = cargo_bin_cmd!("hostup");
    cmd.arg("sync")
        .arg("--repo-url")
        .arg(file_url(origin.path()))
        .arg("--repo-path")
        .arg(clone.path())
        .arg("--exec")
        .arg("touch")
        .arg("--quiet")
        .arg("--")
        .arg("forwarded-marker")
        .assert()
        .success();

    clone
        .child("forwarded-marker")
        .assert(predicate::path::is_file());
}
