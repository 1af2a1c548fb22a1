//! # Hostup Library
//!
//! This library provides the core functionality for idempotent host
//! provisioning. It is designed to be used by the `hostup` command-line tool
//! but the pieces are usable on their own: every operation can be run any
//! number of times and converges on the same host state.
//!
//! ## Core Concepts
//!
//! The library is built around a few key concepts:
//!
//! - **Command Runner (`runner`)**: The single choke point for subprocess
//!   execution. Argument-vector invocations by default, with a raw-shell
//!   escape hatch for the few call sites that need pipelines.
//! - **Host Probes (`probes`)**: Lazily-computed facts about the current
//!   host (root, container, VM, Proxmox node, subnet), owned by the session
//!   rather than cached globally.
//! - **Repository Synchronizer (`repo`)**: Brings a local checkout of a
//!   remote Git repository to a requested revision, with bounded repair of
//!   diverged local histories. Backed by trait seams so the logic is
//!   testable without network access.
//! - **Delegating Launcher (`launch`)**: Hands control to a program inside
//!   the synchronized checkout, forwarding unrecognized CLI arguments
//!   verbatim and propagating the child's exit code.
//! - **Host Setup (`setups`, `installs`, `proxmox`)**: Idempotent
//!   provisioning tasks - users, SSH configuration, resolv.conf, Docker,
//!   starship, Proxmox node preparation.
//!
//! ## Execution Flow
//!
//! The `sync` command runs the following high-level steps:
//!
//! 1.  **Ensure dependency**: Install `git` via apt if it is missing.
//! 2.  **Ensure clone**: Clone the remote repository if the local path does
//!     not exist yet.
//! 3.  **Reconcile revision**: Fast-forward to the requested revision,
//!     repairing a diverged local branch once before giving up.
//! 4.  **Delegate**: Execute the configured program inside the checkout.

pub mod config;
pub mod defaults;
pub mod deps;
pub mod error;
pub mod files;
pub mod installs;
pub mod launch;
pub mod output;
pub mod probes;
pub mod proxmox;
pub mod repo;
pub mod runner;
pub mod setups;
