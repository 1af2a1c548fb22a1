//! Default values for hostup configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// The remote provisioning repository synchronized when `--repo-url` is not
/// given.
pub const DEFAULT_REPO_URL: &str = "https://github.com/hostup-dev/provision.git";

/// Returns the default local path for the synchronized clone.
///
/// The clone persists across invocations; re-running `hostup sync` reuses
/// it instead of re-cloning.
pub fn default_repo_path() -> PathBuf {
    std::env::temp_dir().join("hostup-provision")
}

/// Returns the default settings file location.
///
/// Uses the platform-appropriate config directory:
/// - Linux: `~/.config/hostup/config.toml` (XDG Base Directory)
/// - macOS: `~/Library/Application Support/hostup/config.toml`
///
/// Falls back to `hostup.toml` in the current directory if the platform
/// config directory cannot be determined. The file is allowed to be absent;
/// compiled-in defaults apply then.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("hostup").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("hostup.toml"))
}
