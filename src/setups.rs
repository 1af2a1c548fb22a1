//! # Host Setup Tasks
//!
//! The setup half of the installer: user creation, passwords, SSH client
//! and daemon configuration, DNS, and the profile environment. Each task is
//! idempotent; config deployments are guarded by [`crate::files::is_copied`]
//! and command-based tasks by an existence probe, so re-running the
//! installer converges instead of repeating work.
//!
//! Payloads are embedded at compile time from the top-level `configs/`
//! directory. A [`Host`] carries the session's settings and probes plus a
//! root prefix; the prefix is `/` in production and a temporary directory
//! in tests, which also disables service restarts (there is no live daemon
//! under a staging root).

use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::files::{copy, is_copied, substitute, touch, vars};
use crate::probes::{detect_subnet, HostProbes};
use crate::runner::{run, run_ok, Invocation};

/// The privileged account every host has.
pub const ROOT: &str = "root";
/// The unprivileged account this installer creates.
pub const NONROOT: &str = "nonroot";

const PROFILE_DEFAULT: &str = include_str!("../configs/profile/default.sh");
const PROFILE_SUBNET: &str = include_str!("../configs/profile/subnet.sh");
const RESOLV_CONF: &str = include_str!("../configs/networking/resolv.conf");
const SSH_CONFIG: &str = include_str!("../configs/ssh/ssh_config.conf");
const SSHD_CONFIG: &str = include_str!("../configs/ssh/sshd_config.conf");
const AUTHORIZED_KEYS: &str = include_str!("../configs/ssh/authorized_keys");

/// A provisioning target: settings, probes, and the filesystem root the
/// tasks write under.
pub struct Host<'a> {
    pub settings: &'a Settings,
    pub probes: &'a HostProbes,
    root: PathBuf,
}

impl<'a> Host<'a> {
    pub fn new(settings: &'a Settings, probes: &'a HostProbes) -> Host<'a> {
        Host {
            settings,
            probes,
            root: PathBuf::from("/"),
        }
    }

    /// Target a staging root instead of the live filesystem (tests).
    #[cfg(test)]
    pub fn with_root<P: AsRef<Path>>(
        settings: &'a Settings,
        probes: &'a HostProbes,
        root: P,
    ) -> Host<'a> {
        Host {
            settings,
            probes,
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve an absolute destination under the host root.
    pub fn path(&self, dest: &str) -> PathBuf {
        self.root.join(dest.trim_start_matches('/'))
    }

    fn is_live(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Create the `nonroot` user with a home and sudo membership.
    pub fn create_non_root(&self) -> Result<()> {
        if self.has_non_root() {
            log::info!("{:?} already exists", NONROOT);
            return Ok(());
        }
        log::info!("creating {:?}...", NONROOT);
        run(&Invocation::argv([
            "useradd",
            "--create-home",
            "--shell",
            "/bin/bash",
            NONROOT,
        ]))?;
        run(&Invocation::argv(["usermod", "-aG", "sudo", NONROOT]))
    }

    /// Whether the `nonroot` user exists.
    pub fn has_non_root(&self) -> bool {
        run_ok(&Invocation::argv(["id", "-u", NONROOT]))
    }

    /// Set the password for root and, when present, nonroot.
    pub fn set_password(&self, password: Option<&str>) -> Result<()> {
        let Some(password) = password else {
            log::info!("skipping password(s)");
            return Ok(());
        };
        self.set_password_one(ROOT, password)?;
        if self.has_non_root() {
            self.set_password_one(NONROOT, password)
        } else {
            log::info!("skipping {:?}; user does not exist", NONROOT);
            Ok(())
        }
    }

    fn set_password_one(&self, username: &str, password: &str) -> Result<()> {
        log::info!("setting {:?} password...", username);
        // chpasswd reads `user:password` pairs on stdin; this is one of the
        // few call sites that needs the shell
        run(&Invocation::shell(chpasswd_pipeline(username, password)))
    }

    /// Deploy the default login profile.
    pub fn setup_profile(&self) -> Result<()> {
        self.deploy(PROFILE_DEFAULT, "/etc/profile.d/default.sh")
    }

    /// Export the detected subnet into login environments.
    ///
    /// Warns and skips when the subnet cannot be determined; a host off the
    /// known subnets is still provisionable.
    pub fn setup_subnet_profile(&self) -> Result<()> {
        let subnet = match detect_subnet(self.settings) {
            Ok(subnet) => subnet,
            Err(e) => {
                log::warn!("unable to determine subnet: {e}");
                return Ok(());
            }
        };
        let text = substitute(
            PROFILE_SUBNET,
            &vars([("subnet", subnet.name().to_string())]),
        )?;
        self.deploy(&text, "/etc/profile.d/subnet.sh")
    }

    /// Point DNS at the subnet's resolver and pin the file immutable.
    pub fn setup_resolv_conf(&self) -> Result<()> {
        let subnet = match detect_subnet(self.settings) {
            Ok(subnet) => subnet,
            Err(e) => {
                log::warn!("unable to determine subnet: {e}");
                return Ok(());
            }
        };
        let text = substitute(
            RESOLV_CONF,
            &vars([
                ("n", subnet.third_octet(self.settings).to_string()),
                ("subnet", subnet.name().to_string()),
            ]),
        )?;
        let dest = self.path("/etc/resolv.conf");
        if is_copied(&text, &dest) {
            log::info!("{:?} is already copied", dest.display().to_string());
            return Ok(());
        }
        log::info!("copying {:?}...", dest.display().to_string());
        self.set_mutable(&dest);
        copy(&text, &dest)?;
        self.set_immutable(&dest);
        Ok(())
    }

    /// Deploy the SSH client defaults.
    pub fn setup_ssh_config_d(&self) -> Result<()> {
        self.deploy_and_restart_sshd(SSH_CONFIG, "/etc/ssh/ssh_config.d/default.conf")
    }

    /// Deploy the SSH daemon defaults.
    pub fn setup_sshd_config_d(&self) -> Result<()> {
        self.deploy_and_restart_sshd(SSHD_CONFIG, "/etc/ssh/sshd_config.d/default.conf")
    }

    /// Deploy the shared authorized_keys file.
    pub fn setup_ssh_authorized_keys(&self) -> Result<()> {
        self.deploy(AUTHORIZED_KEYS, "/etc/ssh/authorized_keys")
    }

    /// Scan the configured hosts' keys into `/etc/ssh/known_hosts`.
    ///
    /// Each host gets `ssh.max_tries` attempts; exhausting them is fatal.
    pub fn setup_ssh_known_hosts(&self) -> Result<()> {
        let dest = self.path("/etc/ssh/known_hosts");
        touch(&dest)?;
        for known_host in &self.settings.ssh.known_hosts {
            self.scan_known_host(&known_host.hostname, known_host.port, &dest)?;
        }
        self.restart_sshd();
        Ok(())
    }

    fn scan_known_host(&self, hostname: &str, port: Option<u16>, dest: &Path) -> Result<()> {
        // Drop a stale key first; failure just means there was none
        let _ = run_ok(&Invocation::argv(["ssh-keygen", "-R", hostname]));
        let cmd = keyscan_pipeline(hostname, port, dest);
        let max_tries = self.settings.ssh.max_tries;
        for _ in 0..max_tries {
            if run_ok(&Invocation::shell(&cmd)) {
                return Ok(());
            }
        }
        Err(Error::Command {
            command: cmd.clone(),
            stdout: String::new(),
            stderr: format!("failed after {max_tries} tries"),
        })
    }

    fn deploy(&self, text: &str, dest: &str) -> Result<()> {
        let dest = self.path(dest);
        if is_copied(text, &dest) {
            log::info!("{:?} is already copied", dest.display().to_string());
            return Ok(());
        }
        log::info!("copying {:?}...", dest.display().to_string());
        copy(text, &dest)
    }

    fn deploy_and_restart_sshd(&self, text: &str, dest: &str) -> Result<()> {
        let dest_path = self.path(dest);
        if is_copied(text, &dest_path) {
            log::info!("{:?} is already copied", dest_path.display().to_string());
            return Ok(());
        }
        log::info!("copying {:?}...", dest_path.display().to_string());
        copy(text, &dest_path)?;
        self.restart_sshd();
        Ok(())
    }

    /// Restart sshd; only meaningful on the live filesystem.
    fn restart_sshd(&self) {
        if !self.is_live() {
            log::debug!("staging root; skipping sshd restart");
            return;
        }
        if !run_ok(&Invocation::argv(["systemctl", "restart", "sshd"])) {
            log::warn!("failed to restart sshd");
        }
    }

    /// `chattr -i`, best effort (unsupported on some filesystems).
    fn set_mutable(&self, path: &Path) {
        if !self.is_live() {
            return;
        }
        if path.is_file() {
            let target = path.display().to_string();
            let _ = run_ok(&Invocation::argv(["chattr", "-i", &target]));
        }
    }

    /// `chattr +i`, best effort. Keeps DHCP clients from rewriting the
    /// resolver configuration.
    fn set_immutable(&self, path: &Path) {
        if !self.is_live() {
            return;
        }
        let target = path.display().to_string();
        if !run_ok(&Invocation::argv(["chattr", "+i", &target])) {
            log::warn!("failed to set {:?} immutable", target);
        }
    }
}

fn chpasswd_pipeline(username: &str, password: &str) -> String {
    format!("echo '{username}:{password}' | chpasswd")
}

fn keyscan_pipeline(hostname: &str, port: Option<u16>, dest: &Path) -> String {
    let mut parts = vec!["ssh-keyscan -H -q -t ed25519".to_string()];
    if let Some(port) = port {
        parts.push(format!("-p {port}"));
    }
    parts.push(format!("{hostname} >> {}", dest.display()));
    parts.join(" ")
}
