//! # Delegating Launcher
//!
//! After the repository synchronizer has brought a checkout up to date, the
//! launcher hands control to a program inside it. The program is a
//! whitespace-split command line from configuration or the CLI; any
//! arguments the outer CLI did not recognize are appended verbatim, which
//! lets callers pass flags through without the outer tool knowing them.
//!
//! A child that runs and fails is not an error here: the launcher reports
//! the child's exit code so the process can exit with it, mirroring what
//! running the delegate by hand would do.

use std::path::Path;

use crate::error::{Error, Result};
use crate::runner::{execute, Invocation};

/// Run `program` inside `working_dir`, appending `forwarded` arguments
/// verbatim.
///
/// `program` is split on whitespace; forwarded arguments are appended as-is
/// with no further splitting. Returns the child's exit code (`0` on
/// success); `Err` is reserved for an empty program or a child that could
/// not be spawned.
pub fn delegate(working_dir: &Path, program: &str, forwarded: &[String]) -> Result<i32> {
    let mut parts: Vec<String> = program.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        return Err(Error::Config {
            message: "delegate program is empty".to_string(),
            hint: Some(
                "set `--exec` or the `[delegate] command` configuration key".to_string(),
            ),
        });
    }
    parts.extend(forwarded.iter().cloned());

    let invocation = Invocation::argv(parts).current_dir(working_dir);
    log::info!("delegating to {:?} in {}", invocation.describe(), working_dir.display());

    let outcome = execute(&invocation)?;
    if outcome.succeeded {
        Ok(0)
    } else {
        let code = outcome.code.unwrap_or(1);
        log::error!(
            "delegate {:?} exited with code {}",
            invocation.describe(),
            code
        );
        if !outcome.stderr.is_empty() {
            log::error!("{}", outcome.stderr.trim_end());
        }
        Ok(code)
    }
}
