//! Sync command implementation
//!
//! The sync command runs the full provisioning hand-off:
//! 1. Ensure `git` is installed
//! 2. Ensure the provisioning repository is cloned
//! 3. Reconcile the checkout with the requested revision
//! 4. Delegate to the configured program inside the checkout

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use url::Url;

use hostup::config::Settings;
use hostup::defaults;
use hostup::error::Error;
use hostup::launch;
use hostup::output::OutputConfig;
use hostup::probes::HostProbes;
use hostup::repo::{SyncRequest, Synchronizer};

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Remote repository URL
    #[arg(long, value_name = "URL", env = "HOSTUP_REPO_URL",
          default_value = defaults::DEFAULT_REPO_URL)]
    pub repo_url: String,

    /// Local checkout path (defaults to a fixed temp directory)
    #[arg(long, value_name = "PATH", env = "HOSTUP_REPO_PATH")]
    pub repo_path: Option<PathBuf>,

    /// Tag or branch to reconcile the checkout with
    #[arg(long, value_name = "REVISION")]
    pub repo_version: Option<String>,

    /// Program to run inside the checkout after synchronization
    #[arg(long, value_name = "PROGRAM")]
    pub exec: Option<String>,

    /// Path to config file
    #[arg(short, long, value_name = "PATH", env = "HOSTUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Arguments after `--` are forwarded verbatim to the delegate
    #[arg(last = true, value_name = "ARGS")]
    pub forwarded: Vec<String>,
}

/// Execute the sync command
pub fn execute(args: SyncArgs, output: &OutputConfig) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;

    // Reject malformed URLs before any subprocess work
    Url::parse(&args.repo_url)
        .map_err(Error::from)
        .with_context(|| format!("invalid repository URL: {}", args.repo_url))?;

    let local_path = args
        .repo_path
        .clone()
        .unwrap_or_else(defaults::default_repo_path);

    if !args.quiet {
        println!(
            "{} Synchronizing {} -> {}",
            output.symbol("🔄", "[SYNC]"),
            args.repo_url,
            local_path.display()
        );
    }

    let probes = HostProbes::new();
    let request = SyncRequest {
        remote_url: args.repo_url.clone(),
        local_path: local_path.clone(),
        revision: args.repo_version.clone(),
    };
    Synchronizer::new(request, &probes).sync()?;

    let program = args.exec.clone().or_else(|| settings.delegate.command.clone());
    let Some(program) = program else {
        log::info!(
            "no delegate configured; ignoring {} forwarded argument(s)",
            args.forwarded.len()
        );
        if !args.quiet {
            println!("{} Synchronized (no delegate)", output.symbol("✅", "[OK]"));
        }
        return Ok(());
    };

    let code = launch::delegate(&local_path, &program, &args.forwarded)?;
    if code != 0 {
        // Make the outer process indistinguishable from the delegate
        std::process::exit(code);
    }

    if !args.quiet {
        println!("{} Synchronized and delegated", output.symbol("✅", "[OK]"));
    }
    Ok(())
}
