//! Install command implementation
//!
//! Flags select idempotent task groups; `--all` selects every group. Tasks
//! always run in a fixed order (users before files that reference them,
//! SSH before anything that restarts sshd twice) so repeated invocations
//! with different flag subsets converge on the same host state.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use hostup::config::Settings;
use hostup::installs;
use hostup::output::OutputConfig;
use hostup::probes::HostProbes;
use hostup::proxmox;
use hostup::setups::Host;

/// Arguments for the install command
#[derive(Args, Debug, Default)]
pub struct InstallArgs {
    /// Create the non-root user
    #[arg(long)]
    pub create_non_root: bool,

    /// Set the password for root and the non-root user
    #[arg(long, value_name = "PASSWORD", env = "HOSTUP_PASSWORD")]
    pub password: Option<String>,

    /// Deploy the shell profile and subnet export
    #[arg(long)]
    pub profile: bool,

    /// Deploy the subnet-templated resolv.conf
    #[arg(long)]
    pub resolv_conf: bool,

    /// Deploy SSH client/server configuration and known hosts
    #[arg(long)]
    pub ssh: bool,

    /// Install Docker from the official apt repository
    #[arg(long)]
    pub docker: bool,

    /// Install the starship prompt
    #[arg(long)]
    pub starship: bool,

    /// Install nfs-common
    #[arg(long)]
    pub nfs_common: bool,

    /// Prepare a Proxmox node (sources, storage, fake subscription)
    #[arg(long)]
    pub proxmox: bool,

    /// Password for the PBS storage entry
    #[arg(long, value_name = "PASSWORD", env = "HOSTUP_PBS_PASSWORD")]
    pub pbs_password: Option<String>,

    /// Run every task group
    #[arg(long)]
    pub all: bool,

    /// Path to config file
    #[arg(short, long, value_name = "PATH", env = "HOSTUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// A single selected task group, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    CreateNonRoot,
    Password,
    Profile,
    ResolvConf,
    Ssh,
    Docker,
    Starship,
    NfsCommon,
    Proxmox,
}

impl Task {
    fn description(&self) -> &'static str {
        match self {
            Task::CreateNonRoot => "create non-root user",
            Task::Password => "set passwords",
            Task::Profile => "deploy shell profile",
            Task::ResolvConf => "deploy resolv.conf",
            Task::Ssh => "deploy SSH configuration",
            Task::Docker => "install Docker",
            Task::Starship => "install starship",
            Task::NfsCommon => "install nfs-common",
            Task::Proxmox => "prepare Proxmox node",
        }
    }
}

/// Resolve flags into an ordered task plan.
///
/// `--all` selects every group, but the Proxmox group only runs on a host
/// the probes recognize as a Proxmox node unless `--proxmox` was given
/// explicitly.
fn plan(args: &InstallArgs, is_proxmox_node: bool) -> Vec<Task> {
    let mut tasks = Vec::new();
    let all = args.all;

    if args.create_non_root || all {
        tasks.push(Task::CreateNonRoot);
    }
    if args.password.is_some() {
        tasks.push(Task::Password);
    }
    if args.profile || all {
        tasks.push(Task::Profile);
    }
    if args.resolv_conf || all {
        tasks.push(Task::ResolvConf);
    }
    if args.ssh || all {
        tasks.push(Task::Ssh);
    }
    if args.docker || all {
        tasks.push(Task::Docker);
    }
    if args.starship || all {
        tasks.push(Task::Starship);
    }
    if args.nfs_common || all {
        tasks.push(Task::NfsCommon);
    }
    if args.proxmox || (all && is_proxmox_node) {
        tasks.push(Task::Proxmox);
    }

    tasks
}

/// Execute the install command
pub fn execute(args: InstallArgs, output: &OutputConfig) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let probes = HostProbes::new();
    let host = Host::new(&settings, &probes);

    let tasks = plan(&args, probes.is_proxmox());
    if tasks.is_empty() {
        log::warn!("no task groups selected; pass --all or individual flags");
        return Ok(());
    }

    for task in &tasks {
        if !args.quiet {
            println!("{} {}", output.symbol("🔧", "[TASK]"), task.description());
        }
        match task {
            Task::CreateNonRoot => host.create_non_root()?,
            Task::Password => host.set_password(args.password.as_deref())?,
            Task::Profile => {
                host.setup_profile()?;
                host.setup_subnet_profile()?;
            }
            Task::ResolvConf => host.setup_resolv_conf()?,
            Task::Ssh => {
                host.setup_ssh_config_d()?;
                host.setup_sshd_config_d()?;
                host.setup_ssh_authorized_keys()?;
                host.setup_ssh_known_hosts()?;
            }
            Task::Docker => installs::install_docker(&host)?,
            Task::Starship => installs::install_starship(&host)?,
            Task::NfsCommon => installs::install_nfs_common(&host)?,
            Task::Proxmox => {
                if !probes.is_proxmox() {
                    log::warn!("/etc/pve not found; skipping Proxmox preparation");
                } else {
                    proxmox::setup_proxmox(&host, args.pbs_password.as_deref())?;
                }
            }
        }
    }

    if !args.quiet {
        println!(
            "{} {} task group(s) completed",
            output.symbol("✅", "[OK]"),
            tasks.len()
        );
    }
    Ok(())
}
