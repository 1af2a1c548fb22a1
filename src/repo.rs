//! # Idempotent Remote-Repository Synchronizer
//!
//! This module ensures a local working copy matches a requested remote
//! revision before control is handed to the delegate program. It is a small
//! state machine over the local path:
//!
//! ```text
//! Absent -> ClonedAtUnknownRevision -> ClonedAtRequestedRevision
//! ```
//!
//! `ensure_cloned` performs the first transition (and is a no-op when the
//! path already exists); `ensure_revision` performs the second (and is a
//! no-op when no revision was requested).
//!
//! ## Design
//!
//! The synchronizer is built around a trait-based design that separates the
//! reconciliation logic from the concrete Git and dependency operations:
//!
//! - **`GitOperations`**: the Git actions the synchronizer needs (clone,
//!   identity queries, checkout, pull, branch deletion). The default
//!   implementation, [`SystemGit`], shells out to the system `git` through
//!   the command runner using argument-vector invocations.
//! - **`DependencyOperations`**: ensures the version-control tool exists
//!   before the first clone. The default implementation defers to
//!   [`crate::deps::ensure_installed`].
//!
//! In tests both traits are replaced with mocks, so reconciliation
//! scenarios (fast-forward, diverged history, repair failure) are exercised
//! without real repositories.
//!
//! ## Reconciliation
//!
//! The current identity of a clone is the exact tag matching `HEAD` when
//! one exists, otherwise the current branch name. A matching tag is final:
//! tags do not move, so there is nothing to pull (and `HEAD` is detached at
//! a tag, where a pull could not work anyway). A matching branch may still
//! be behind its remote, so it is pulled with `--ff-only`. A failing pull
//! means the local branch has diverged; the one bounded repair rebuilds the
//! branch from its remote:
//!
//! - a non-default branch is rebuilt by checking out the default branch,
//!   pulling it, deleting the stale local branch, and re-checking-out the
//!   requested revision;
//! - the default branch itself has nowhere to stand aside to, so it is
//!   rebuilt in place with `git fetch` + `git reset --hard origin/<branch>`.
//!
//! Either way local commits on the stale branch are discarded; that is
//! logged at warn level first. A failure inside the repair is fatal.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::probes::HostProbes;
use crate::runner::{execute, run, run_output, run_output_ok, Invocation};

/// What to synchronize, built once per invocation from process arguments.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub remote_url: String,
    pub local_path: PathBuf,
    /// Tag, branch, or commit-ish. `None` means "leave as-is".
    pub revision: Option<String>,
}

/// Trait for git operations - allows mocking in tests
pub trait GitOperations {
    /// Clone `url` into `path` (full clone; the working copy is reused and
    /// reconciled on later runs).
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()>;

    /// The tag exactly matching `HEAD`, when one exists.
    fn exact_tag(&self, path: &Path) -> Option<String>;

    /// The currently checked-out branch name.
    fn current_branch(&self, path: &Path) -> Result<String>;

    /// The remote's default branch (e.g. `main`).
    fn default_branch(&self, path: &Path) -> Result<String>;

    /// Check out a revision (tag, branch, or commit-ish).
    fn checkout(&self, path: &Path, revision: &str) -> Result<()>;

    /// Fast-forward the current branch from its remote.
    fn pull(&self, path: &Path) -> Result<()>;

    /// Delete a local branch, discarding any local commits on it.
    fn delete_branch(&self, path: &Path, branch: &str) -> Result<()>;

    /// Update remote-tracking refs without touching the working copy.
    fn fetch(&self, path: &Path) -> Result<()>;

    /// Hard-reset the current branch to its remote-tracking ref,
    /// discarding any local commits.
    fn reset_to_remote(&self, path: &Path, branch: &str) -> Result<()>;
}

/// Trait for dependency operations - allows mocking in tests
pub trait DependencyOperations {
    fn ensure_installed(&self, tool: &str) -> Result<()>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command through the command runner.
pub struct SystemGit;

impl GitOperations for SystemGit {
    fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let target = path.display().to_string();
        let inv = Invocation::argv(["git", "clone", url, &target]);
        let outcome = execute(&inv)?;
        if outcome.succeeded {
            return Ok(());
        }
        // Surface a pointer for the common authentication failures; the
        // system git handles SSH keys, credential helpers and tokens, so a
        // refusal here is almost always a credentials problem.
        let hint = if outcome.stderr.contains("Authentication failed")
            || outcome.stderr.contains("Permission denied")
            || outcome.stderr.contains("Could not read from remote repository")
        {
            Some(
                "for private repos, make sure an SSH key or access token is configured"
                    .to_string(),
            )
        } else {
            None
        };
        Err(Error::Clone {
            url: url.to_string(),
            path: path.to_path_buf(),
            message: outcome.stderr.trim().to_string(),
            hint,
        })
    }

    fn exact_tag(&self, path: &Path) -> Option<String> {
        run_output_ok(
            &Invocation::argv(["git", "describe", "--tags", "--exact-match"]).current_dir(path),
        )
    }

    fn current_branch(&self, path: &Path) -> Result<String> {
        run_output(&Invocation::argv(["git", "rev-parse", "--abbrev-ref", "HEAD"]).current_dir(path))
    }

    fn default_branch(&self, path: &Path) -> Result<String> {
        // `origin/HEAD` is set by clone; fall back to asking the remote
        // when it has been pruned locally.
        if let Some(full) = run_output_ok(
            &Invocation::argv(["git", "symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
                .current_dir(path),
        ) {
            if let Some(branch) = full.strip_prefix("origin/") {
                return Ok(branch.to_string());
            }
        }
        let listing =
            run_output(&Invocation::argv(["git", "remote", "show", "origin"]).current_dir(path))?;
        listing
            .lines()
            .find_map(|line| line.trim().strip_prefix("HEAD branch: "))
            .map(str::to_string)
            .ok_or_else(|| Error::Command {
                command: "git remote show origin".to_string(),
                stdout: listing.clone(),
                stderr: "no HEAD branch in remote listing".to_string(),
            })
    }

    fn checkout(&self, path: &Path, revision: &str) -> Result<()> {
        run(&Invocation::argv(["git", "checkout", revision]).current_dir(path))
    }

    fn pull(&self, path: &Path) -> Result<()> {
        run(&Invocation::argv(["git", "pull", "--ff-only"]).current_dir(path))
    }

    fn delete_branch(&self, path: &Path, branch: &str) -> Result<()> {
        run(&Invocation::argv(["git", "branch", "-D", branch]).current_dir(path))
    }

    fn fetch(&self, path: &Path) -> Result<()> {
        run(&Invocation::argv(["git", "fetch"]).current_dir(path))
    }

    fn reset_to_remote(&self, path: &Path, branch: &str) -> Result<()> {
        let target = format!("origin/{branch}");
        run(&Invocation::argv(["git", "reset", "--hard", &target]).current_dir(path))
    }
}

/// The default implementation of `DependencyOperations`, backed by the apt
/// ensurer.
pub struct SystemDeps<'a> {
    probes: &'a HostProbes,
}

impl<'a> SystemDeps<'a> {
    pub fn new(probes: &'a HostProbes) -> Self {
        Self { probes }
    }
}

impl DependencyOperations for SystemDeps<'_> {
    fn ensure_installed(&self, tool: &str) -> Result<()> {
        crate::deps::ensure_installed(tool, self.probes)
    }
}

/// The synchronizer itself: a [`SyncRequest`] plus the operations it drives.
pub struct Synchronizer<'a> {
    request: SyncRequest,
    git: Box<dyn GitOperations + 'a>,
    deps: Box<dyn DependencyOperations + 'a>,
}

impl<'a> Synchronizer<'a> {
    /// Create a synchronizer backed by the system git and apt.
    pub fn new(request: SyncRequest, probes: &'a HostProbes) -> Synchronizer<'a> {
        Synchronizer {
            request,
            git: Box::new(SystemGit),
            deps: Box::new(SystemDeps::new(probes)),
        }
    }

    /// Creates a `Synchronizer` with custom operations.
    ///
    /// This is primarily used for testing to inject mock operations.
    #[cfg(test)]
    pub fn with_operations(
        request: SyncRequest,
        git: Box<dyn GitOperations + 'a>,
        deps: Box<dyn DependencyOperations + 'a>,
    ) -> Synchronizer<'a> {
        Synchronizer { request, git, deps }
    }

    /// Synchronize: ensure the clone exists, then ensure the revision.
    pub fn sync(&self) -> Result<()> {
        self.ensure_cloned()?;
        self.ensure_revision()
    }

    /// Ensure a clone exists at the local path.
    ///
    /// Idempotent: when the path is already a directory nothing happens,
    /// including no dependency checks.
    pub fn ensure_cloned(&self) -> Result<()> {
        let path = &self.request.local_path;
        if path.is_dir() {
            log::info!("{:?} is already cloned", path.display().to_string());
            return Ok(());
        }
        self.deps.ensure_installed("git")?;
        log::info!(
            "cloning {:?} to {:?}...",
            self.request.remote_url,
            path.display().to_string()
        );
        self.git.clone_repo(&self.request.remote_url, path)
    }

    /// Ensure the working copy's resolved identity equals the requested
    /// revision. No-op when no revision was requested.
    pub fn ensure_revision(&self) -> Result<()> {
        let Some(revision) = &self.request.revision else {
            return Ok(());
        };
        let path = &self.request.local_path;
        // An exact tag match is final: tags do not move, and `HEAD` is
        // detached at one, so there is nothing to pull.
        if let Some(tag) = self.git.exact_tag(path) {
            if tag == *revision {
                log::info!(
                    "{:?} is already at tag {:?}",
                    path.display().to_string(),
                    revision
                );
                return Ok(());
            }
            log::info!("switching {:?} to {:?}...", tag, revision);
            return self
                .git
                .checkout(path, revision)
                .map_err(|e| self.reconcile_error(revision, e));
        }
        let branch = self.git.current_branch(path)?;
        if branch == *revision {
            log::info!(
                "{:?} is already on {:?}; fast-forwarding...",
                path.display().to_string(),
                revision
            );
            if let Err(pull_error) = self.git.pull(path) {
                log::warn!(
                    "fast-forward of {:?} failed ({}); repairing diverged history...",
                    revision,
                    pull_error
                );
                self.repair(revision)?;
            }
        } else {
            log::info!("switching {:?} to {:?}...", branch, revision);
            self.git
                .checkout(path, revision)
                .map_err(|e| self.reconcile_error(revision, e))?;
        }
        Ok(())
    }

    /// The one bounded repair for a diverged branch: rebuild it from its
    /// remote. A non-default branch is deleted and re-checked-out from
    /// behind the default branch; the default branch has nowhere to stand
    /// aside to, so it is hard-reset in place. A failure anywhere here is
    /// fatal.
    fn repair(&self, revision: &str) -> Result<()> {
        let path = &self.request.local_path;
        let default = self
            .git
            .default_branch(path)
            .map_err(|e| self.reconcile_error(revision, e))?;
        log::warn!(
            "rebuilding stale local branch {:?}; local commits on it are discarded",
            revision
        );
        if *revision == default {
            self.git
                .fetch(path)
                .map_err(|e| self.reconcile_error(revision, e))?;
            return self
                .git
                .reset_to_remote(path, revision)
                .map_err(|e| self.reconcile_error(revision, e));
        }
        self.git
            .checkout(path, &default)
            .map_err(|e| self.reconcile_error(revision, e))?;
        self.git
            .pull(path)
            .map_err(|e| self.reconcile_error(revision, e))?;
        self.git
            .delete_branch(path, revision)
            .map_err(|e| self.reconcile_error(revision, e))?;
        self.git
            .checkout(path, revision)
            .map_err(|e| self.reconcile_error(revision, e))
    }

    fn reconcile_error(&self, revision: &str, error: Error) -> Error {
        Error::Reconcile {
            path: self.request.local_path.clone(),
            revision: revision.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Mock git operations for testing, recording every call in order.
    struct MockGit {
        calls: Rc<RefCell<Vec<String>>>,
        exact_tag: Option<String>,
        branch: String,
        default_branch: String,
        pull_results: RefCell<Vec<bool>>,
        checkout_fails: bool,
        delete_fails: bool,
        reset_fails: bool,
    }

    impl MockGit {
        fn new(calls: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                calls,
                exact_tag: None,
                branch: "main".to_string(),
                default_branch: "main".to_string(),
                pull_results: RefCell::new(vec![]),
                checkout_fails: false,
                delete_fails: false,
                reset_fails: false,
            }
        }

        fn command_error(what: &str) -> Error {
            Error::Command {
                command: what.to_string(),
                stdout: String::new(),
                stderr: format!("{what} failed"),
            }
        }
    }

    impl GitOperations for MockGit {
        fn clone_repo(&self, url: &str, _path: &Path) -> Result<()> {
            self.calls.borrow_mut().push(format!("clone {url}"));
            Ok(())
        }

        fn exact_tag(&self, _path: &Path) -> Option<String> {
            self.calls.borrow_mut().push("exact_tag".to_string());
            self.exact_tag.clone()
        }

        fn current_branch(&self, _path: &Path) -> Result<String> {
            self.calls.borrow_mut().push("current_branch".to_string());
            Ok(self.branch.clone())
        }

        fn default_branch(&self, _path: &Path) -> Result<String> {
            self.calls.borrow_mut().push("default_branch".to_string());
            Ok(self.default_branch.clone())
        }

        fn checkout(&self, _path: &Path, revision: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("checkout {revision}"));
            if self.checkout_fails {
                Err(Self::command_error("checkout"))
            } else {
                Ok(())
            }
        }

        fn pull(&self, _path: &Path) -> Result<()> {
            self.calls.borrow_mut().push("pull".to_string());
            let ok = self.pull_results.borrow_mut().pop().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(Self::command_error("pull"))
            }
        }

        fn delete_branch(&self, _path: &Path, branch: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("delete {branch}"));
            if self.delete_fails {
                Err(Self::command_error("branch -D"))
            } else {
                Ok(())
            }
        }

        fn fetch(&self, _path: &Path) -> Result<()> {
            self.calls.borrow_mut().push("fetch".to_string());
            Ok(())
        }

        fn reset_to_remote(&self, _path: &Path, branch: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("reset origin/{branch}"));
            if self.reset_fails {
                Err(Self::command_error("reset --hard"))
            } else {
                Ok(())
            }
        }
    }

    /// Mock dependency operations recording ensured tools.
    struct MockDeps {
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl DependencyOperations for MockDeps {
        fn ensure_installed(&self, tool: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("ensure {tool}"));
            Ok(())
        }
    }

    fn synchronizer_for(
        local_path: PathBuf,
        revision: Option<&str>,
        configure: impl FnOnce(&mut MockGit),
    ) -> (Synchronizer<'static>, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut git = MockGit::new(calls.clone());
        configure(&mut git);
        let deps = MockDeps {
            calls: calls.clone(),
        };
        let request = SyncRequest {
            remote_url: "https://example.com/provision.git".to_string(),
            local_path,
            revision: revision.map(str::to_string),
        };
        (
            Synchronizer::with_operations(request, Box::new(git), Box::new(deps)),
            calls,
        )
    }

    #[test]
    fn test_ensure_cloned_when_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clone");
        let (sync, calls) = synchronizer_for(path, None, |_| {});

        sync.ensure_cloned().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                "ensure git".to_string(),
                "clone https://example.com/provision.git".to_string(),
            ]
        );
    }

    #[test]
    fn test_ensure_cloned_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), None, |_| {});

        sync.ensure_cloned().unwrap();
        sync.ensure_cloned().unwrap();

        // Existing directory: no dependency check, no clone
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_ensure_revision_no_op_without_request() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), None, |_| {});

        sync.ensure_revision().unwrap();

        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_ensure_revision_checks_out_different_revision() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("v1.2.0"), |git| {
            git.branch = "main".to_string();
        });

        sync.ensure_revision().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                "exact_tag".to_string(),
                "current_branch".to_string(),
                "checkout v1.2.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_ensure_revision_matching_tag_is_final() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("v1.2.0"), |git| {
            git.exact_tag = Some("v1.2.0".to_string());
        });

        sync.ensure_revision().unwrap();

        // Tags do not move and HEAD is detached at one: no pull, no
        // checkout, no branch query
        assert_eq!(*calls.borrow(), vec!["exact_tag".to_string()]);
    }

    #[test]
    fn test_ensure_revision_tag_resync_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("v1.0.0"), |git| {
            git.exact_tag = Some("v1.0.0".to_string());
        });

        // Re-running against an existing checkout at the tag must not try
        // to pull a detached HEAD or delete a branch named after the tag
        sync.sync().unwrap();
        sync.sync().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec!["exact_tag".to_string(), "exact_tag".to_string()]
        );
    }

    #[test]
    fn test_ensure_revision_checks_out_away_from_tag() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("v2.0.0"), |git| {
            git.exact_tag = Some("v1.0.0".to_string());
        });

        sync.ensure_revision().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec!["exact_tag".to_string(), "checkout v2.0.0".to_string()]
        );
    }

    #[test]
    fn test_ensure_revision_fast_forwards_matching_branch() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("main"), |git| {
            git.branch = "main".to_string();
        });

        sync.ensure_revision().unwrap();

        let calls = calls.borrow();
        assert!(calls.contains(&"pull".to_string()));
        // No branch deletion on a clean fast-forward
        assert!(!calls.iter().any(|c| c.starts_with("delete")));
    }

    #[test]
    fn test_ensure_revision_repairs_diverged_branch() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("feature"), |git| {
            git.branch = "feature".to_string();
            // First pull (the fast-forward) fails; the repair pull succeeds.
            // Results are popped from the back.
            git.pull_results = RefCell::new(vec![true, false]);
        });

        sync.ensure_revision().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                "exact_tag".to_string(),
                "current_branch".to_string(),
                "pull".to_string(),
                "default_branch".to_string(),
                "checkout main".to_string(),
                "pull".to_string(),
                "delete feature".to_string(),
                "checkout feature".to_string(),
            ]
        );
    }

    #[test]
    fn test_ensure_revision_resets_diverged_default_branch() {
        let temp = TempDir::new().unwrap();
        let (sync, calls) = synchronizer_for(temp.path().to_path_buf(), Some("main"), |git| {
            git.branch = "main".to_string();
            git.pull_results = RefCell::new(vec![false]);
        });

        sync.ensure_revision().unwrap();

        // The default branch cannot stand aside to itself; it is rebuilt
        // in place from the remote-tracking ref
        assert_eq!(
            *calls.borrow(),
            vec![
                "exact_tag".to_string(),
                "current_branch".to_string(),
                "pull".to_string(),
                "default_branch".to_string(),
                "fetch".to_string(),
                "reset origin/main".to_string(),
            ]
        );
    }

    #[test]
    fn test_repair_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let (sync, _calls) = synchronizer_for(temp.path().to_path_buf(), Some("feature"), |git| {
            git.branch = "feature".to_string();
            // Both the fast-forward pull and the repair pull fail
            git.pull_results = RefCell::new(vec![false, false]);
        });

        let err = sync.ensure_revision().unwrap_err();
        assert!(matches!(err, Error::Reconcile { .. }));
    }

    #[test]
    fn test_repair_reset_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let (sync, _calls) = synchronizer_for(temp.path().to_path_buf(), Some("main"), |git| {
            git.branch = "main".to_string();
            git.pull_results = RefCell::new(vec![false]);
            git.reset_fails = true;
        });

        let err = sync.ensure_revision().unwrap_err();
        assert!(matches!(err, Error::Reconcile { .. }));
    }

    #[test]
    fn test_repair_delete_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let (sync, _calls) = synchronizer_for(temp.path().to_path_buf(), Some("feature"), |git| {
            git.branch = "feature".to_string();
            git.pull_results = RefCell::new(vec![true, false]);
            git.delete_fails = true;
        });

        let err = sync.ensure_revision().unwrap_err();
        assert!(matches!(err, Error::Reconcile { .. }));
    }

    #[test]
    fn test_checkout_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let (sync, _calls) = synchronizer_for(temp.path().to_path_buf(), Some("v9.9.9"), |git| {
            git.checkout_fails = true;
        });

        let err = sync.ensure_revision().unwrap_err();
        match err {
            Error::Reconcile { revision, .. } => assert_eq!(revision, "v9.9.9"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sync_runs_clone_then_revision() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clone");
        let (sync, calls) = synchronizer_for(path, Some("v1.0.0"), |git| {
            git.exact_tag = Some("v1.0.0".to_string());
        });

        sync.sync().unwrap();

        let calls = calls.borrow();
        assert_eq!(calls[0], "ensure git");
        assert!(calls[1].starts_with("clone"));
        assert_eq!(calls[2], "exact_tag");
    }
}
