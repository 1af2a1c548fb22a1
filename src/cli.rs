//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use hostup::output::OutputConfig;

use crate::commands;

/// Hostup - Idempotent host provisioning
#[derive(Parser, Debug)]
#[command(name = "hostup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synchronize the provisioning repository and hand off to it
    Sync(commands::sync::SyncArgs),

    /// Run idempotent host installation tasks
    Install(commands::install::InstallArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let output = OutputConfig::from_env_and_flag(&self.color);

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.log_level),
        );
        if !output.use_color {
            builder.write_style(env_logger::WriteStyle::Never);
        }
        builder.init();

        match self.command {
            Commands::Sync(args) => commands::sync::execute(args, &output),
            Commands::Install(args) => commands::install::execute(args, &output),
        }
    }
}
