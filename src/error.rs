//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `hostup` application. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the application. Each variant corresponds to a specific
//!   type of error and includes contextual information to aid in debugging.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the application to simplify function signatures and ensure
//!   type safety.
//!
//! The taxonomy follows the provisioning flow: a subprocess either succeeded
//! or the run is over, except where a call site explicitly tolerated the
//! failure. `Command` carries both captured output streams so a fatal
//! diagnostic can show everything the child process said. `Reconcile` marks
//! the one bounded-repair path in the synchronizer; when it is returned the
//! repair attempt has already been spent.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for hostup operations
#[derive(Error, Debug)]
pub enum Error {
    /// A subprocess exited with a non-zero status and the call site did not
    /// tolerate failure.
    ///
    /// Both captured streams are included; they are also logged as a
    /// diagnostic block before this error propagates.
    #[error("command failed: {command}")]
    Command {
        command: String,
        stdout: String,
        stderr: String,
    },

    /// A subprocess could not be spawned at all (program missing, permission
    /// denied on the binary, ...).
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An error occurred while cloning the provisioning repository.
    #[error("git clone error for {url} -> {}: {message}{}", path.display(), hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Clone {
        url: String,
        path: PathBuf,
        message: String,
        /// Optional hint for how to resolve the clone issue
        hint: Option<String>,
    },

    /// Revision reconciliation failed even after the bounded repair attempt
    /// (checkout default branch, pull, delete stale branch, re-checkout).
    #[error("failed to reconcile {} to revision {revision:?}: {message}", path.display())]
    Reconcile {
        path: PathBuf,
        revision: String,
        message: String,
    },

    /// A required tool could not be installed.
    #[error("failed to install dependency {tool:?}: {message}")]
    Dependency { tool: String, message: String },

    /// The host's subnet could not be determined.
    #[error("subnet detection error: {message}")]
    Subnet { message: String },

    /// A download from a remote release failed.
    #[error("download error for {url}: {message}")]
    Download { url: String, message: String },

    /// A template referenced a placeholder with no value.
    #[error("template processing error: {message}{}", variable.as_ref().map(|v| format!(" (variable: {})", v)).unwrap_or_default())]
    Template {
        message: String,
        /// The template variable that caused the error, if applicable
        variable: Option<String>,
    },

    /// An error occurred while loading the settings file.
    #[error("configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A TOML parsing error, wrapped from `toml::de::Error`.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An HTTP error, wrapped from `reqwest::Error`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
