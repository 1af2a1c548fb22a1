//! # Dependency Ensurer
//!
//! Idempotently ensures a system tool is present before it is needed. The
//! existence probe is a `PATH` lookup through the `which` crate; only when
//! the tool is absent does anything shell out (`apt update` followed by
//! `apt install`). Privilege is escalated with `sudo` when the session is
//! not already running as root.

use crate::error::{Error, Result};
use crate::probes::HostProbes;
use crate::runner::{run, run_output_ok, Invocation};

/// Check whether a tool resolves on the executable search path.
pub fn is_installed(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Ensure `tool` is installed.
///
/// Idempotent: when the tool already resolves, this performs zero
/// subprocess calls beyond the `PATH` lookup.
pub fn ensure_installed(tool: &str, probes: &HostProbes) -> Result<()> {
    if is_installed(tool) {
        log::debug!("{:?} is already installed", tool);
        return Ok(());
    }
    log::info!("updating 'apt'...");
    apt_update(probes).map_err(|e| dependency_error(tool, e))?;
    log::info!("installing {:?}...", tool);
    apt_install(tool, probes).map_err(|e| dependency_error(tool, e))?;
    Ok(())
}

/// Run `apt update -y`.
pub fn apt_update(probes: &HostProbes) -> Result<()> {
    run(&apt_invocation(&["apt", "update", "-y"], probes.is_root()))
}

/// Run `apt install -y <pkg>`.
pub fn apt_install(pkg: &str, probes: &HostProbes) -> Result<()> {
    run(&apt_invocation(
        &["apt", "install", "-y", pkg],
        probes.is_root(),
    ))
}

/// Whether a package is installed according to `apt list --installed`.
///
/// `apt list` always prints a `Listing...` header, so presence is judged by
/// a line naming the package rather than by non-empty output.
pub fn apt_installed(pkg: &str) -> bool {
    run_output_ok(&Invocation::argv(["apt", "list", "--installed", pkg]))
        .is_some_and(|out| out.lines().any(|line| line.starts_with(&format!("{pkg}/"))))
}

/// Install a downloaded `.deb` with `dpkg -i`.
pub fn dpkg_install(path: &std::path::Path, probes: &HostProbes) -> Result<()> {
    let path = path.display().to_string();
    run(&apt_invocation(&["dpkg", "-i", &path], probes.is_root()))
}

/// Build a privileged invocation, prefixing `sudo` when not running as
/// root.
fn apt_invocation(parts: &[&str], is_root: bool) -> Invocation {
    if is_root {
        Invocation::argv(parts.iter().copied())
    } else {
        Invocation::argv(std::iter::once("sudo").chain(parts.iter().copied()))
    }
}

fn dependency_error(tool: &str, error: Error) -> Error {
    Error::Dependency {
        tool: tool.to_string(),
        message: error.to_string(),
    }
}
