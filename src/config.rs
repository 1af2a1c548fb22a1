//! # Settings
//!
//! The settings file (`config.toml`) carries the handful of values a host
//! provisioning run needs but that do not belong on the command line:
//! download limits, the SSH known-hosts inventory, the subnet table, and an
//! optional delegate command for `hostup sync`.
//!
//! Every field has a default, so a missing settings file is not an error;
//! `Settings::load` falls back to the compiled-in defaults. A present but
//! malformed file is an error with a hint, because silently ignoring a file
//! the operator wrote is worse than stopping.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level settings, one struct per TOML section.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub downloads: Downloads,
    #[serde(default)]
    pub ssh: Ssh,
    #[serde(default)]
    pub subnets: Subnets,
    #[serde(default)]
    pub delegate: Delegate,
}

/// Limits for release downloads.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Downloads {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// SSH host inventory and retry policy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Ssh {
    /// Hosts whose keys are scanned into `/etc/ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts: Vec<KnownHost>,
    /// Attempts per host before the scan is considered failed.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct KnownHost {
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Third-octet assignments for the known subnets.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Subnets {
    #[serde(default = "default_subnet_qrt")]
    pub qrt: u8,
    #[serde(default = "default_subnet_main")]
    pub main: u8,
    #[serde(default = "default_subnet_test")]
    pub test: u8,
}

/// The program `hostup sync` hands off to after synchronization.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Delegate {
    /// Program to run inside the synchronized tree. `None` means sync-only.
    #[serde(default)]
    pub command: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_tries() -> u32 {
    5
}

fn default_subnet_qrt() -> u8 {
    10
}

fn default_subnet_main() -> u8 {
    1
}

fn default_subnet_test() -> u8 {
    2
}

impl Default for Downloads {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Ssh {
    fn default() -> Self {
        Self {
            known_hosts: Vec::new(),
            max_tries: default_max_tries(),
        }
    }
}

impl Default for Subnets {
    fn default() -> Self {
        Self {
            qrt: default_subnet_qrt(),
            main: default_subnet_main(),
            test: default_subnet_test(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn parse(text: &str) -> Result<Settings> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
            hint: Some("sections are [downloads], [ssh], [subnets] and [delegate]".to_string()),
        })
    }

    /// Load settings from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            hint: None,
        })?;
        Self::parse(&text)
    }

    /// Load settings from an optional path, falling back to the default
    /// location and finally to compiled-in defaults.
    ///
    /// An explicitly requested file must exist; the default location is
    /// allowed to be absent.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = crate::defaults::default_config_path();
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    Ok(Settings::default())
                }
            }
        }
    }
}
