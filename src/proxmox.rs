//! # Proxmox Node Setup
//!
//! Proxmox-specific provisioning: drop the enterprise apt sources, install
//! the fake subscription shim, deploy the storage configuration, and write
//! the Proxmox Backup Server password file. Only invoked when the host
//! probes report a Proxmox node.

use crate::deps::dpkg_install;
use crate::error::Result;
use crate::files::{copy, is_copied, substitute, touch, vars};
use crate::installs::github_download;
use crate::setups::Host;

const STORAGE_CFG: &str = include_str!("../configs/proxmox/storage.cfg");
const PBS_PASSWORD: &str = include_str!("../configs/proxmox/pbs-data.pw");

/// Marker dropped after the fake-subscription shim is installed, so the
/// download is not repeated on every run.
const FAKE_SUBSCRIPTION_MARKER: &str = "/etc/pve/.pve_fake_subscription_ran";

pub fn setup_proxmox(host: &Host, pbs_password: Option<&str>) -> Result<()> {
    log::info!("setting up Proxmox...");
    remove_enterprise_sources(host)?;
    setup_fake_subscription(host)?;
    setup_storage_cfg(host)?;
    setup_pbs_password(host, pbs_password)?;
    log::info!("finished setting up Proxmox");
    Ok(())
}

/// Remove the enterprise apt sources a stock install ships with.
fn remove_enterprise_sources(host: &Host) -> Result<()> {
    let paths: Vec<_> = ["ceph", "pve-enterprise"]
        .iter()
        .map(|name| host.path(&format!("/etc/apt/sources.list.d/{name}.sources")))
        .filter(|path| path.is_file())
        .collect();
    if paths.is_empty() {
        log::info!("'apt' sources already removed");
        return Ok(());
    }
    log::info!("removing 'apt' sources...");
    for path in paths {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

/// Install the fake-subscription shim once, guarded by a marker file.
fn setup_fake_subscription(host: &Host) -> Result<()> {
    let marker = host.path(FAKE_SUBSCRIPTION_MARKER);
    if marker.exists() {
        log::info!("fake subscription shim is already installed");
        return Ok(());
    }
    let (_dir, deb) = github_download(
        "jamesits",
        "pve-fake-subscription",
        "pve-fake-subscription_${tag_without}+git-1_all.deb",
        host,
    )?;
    dpkg_install(&deb, host.probes)?;
    touch(&marker)
}

fn setup_storage_cfg(host: &Host) -> Result<()> {
    let dest = host.path("/etc/pve/storage.cfg");
    if is_copied(STORAGE_CFG, &dest) {
        log::info!("{:?} is already copied", dest.display().to_string());
        return Ok(());
    }
    log::info!("copying {:?}...", dest.display().to_string());
    copy(STORAGE_CFG, &dest)
}

/// Write the PBS storage password file, or skip when no password is given.
fn setup_pbs_password(host: &Host, password: Option<&str>) -> Result<()> {
    let dest = host.path("/etc/pve/priv/storage/pbs-data.pw");
    let Some(password) = password else {
        log::info!("skipping {:?}", dest.display().to_string());
        return Ok(());
    };
    log::info!("writing {:?}...", dest.display().to_string());
    let text = substitute(PBS_PASSWORD, &vars([("password", password.to_string())]))?;
    copy(&text, &dest)
}
