//! # Tool Installation
//!
//! The install half of the installer: docker, starship, nfs-common, and a
//! small GitHub release downloader used for tools that ship as `.deb`
//! assets rather than apt packages. Every installer is guarded by an
//! existence check so re-runs converge.
//!
//! The docker and starship installers pipe vendor scripts and here-docs
//! through the shell; those invocations use the runner's raw-shell escape
//! hatch and trust their (compiled-in) input.

use std::path::PathBuf;

use crate::deps::{apt_install, apt_installed, is_installed};
use crate::error::{Error, Result};
use crate::files::{add_mode, substitute, vars};
use crate::runner::{run, Invocation};
use crate::setups::{Host, NONROOT};

const STARSHIP_CONFIG: &str = include_str!("../configs/starship/starship.toml");

const DOCKER_SOURCES: &str = r#"tee /etc/apt/sources.list.d/docker.sources <<DOCKEREOF
Types: deb
URIs: https://download.docker.com/linux/debian
Suites: $(. /etc/os-release && echo "$VERSION_CODENAME")
Components: stable
Signed-By: /etc/apt/keyrings/docker.asc
DOCKEREOF"#;

/// Install docker from the official apt repository.
pub fn install_docker(host: &Host) -> Result<()> {
    if is_installed("docker") {
        log::info!("'docker' is already installed");
    } else {
        log::info!("installing 'docker'...");
        run(&Invocation::shell(
            "for pkg in docker.io docker-doc docker-compose podman-docker containerd runc; do apt-get remove -y $pkg; done",
        ))?;
        run(&Invocation::argv(["apt-get", "update"]))?;
        run(&Invocation::argv([
            "apt-get",
            "install",
            "-y",
            "ca-certificates",
            "curl",
        ]))?;
        run(&Invocation::argv([
            "install",
            "-m",
            "0755",
            "-d",
            "/etc/apt/keyrings",
        ]))?;
        run(&Invocation::argv([
            "curl",
            "-fsSL",
            "https://download.docker.com/linux/debian/gpg",
            "-o",
            "/etc/apt/keyrings/docker.asc",
        ]))?;
        run(&Invocation::argv([
            "chmod",
            "a+r",
            "/etc/apt/keyrings/docker.asc",
        ]))?;
        run(&Invocation::shell(DOCKER_SOURCES))?;
        run(&Invocation::argv(["apt-get", "update"]))?;
        run(&Invocation::argv([
            "apt-get",
            "install",
            "-y",
            "docker-ce",
            "docker-ce-cli",
            "containerd.io",
            "docker-buildx-plugin",
            "docker-compose-plugin",
        ]))?;
    }
    if host.has_non_root() {
        run(&Invocation::argv(["usermod", "-aG", "docker", NONROOT]))?;
    }
    Ok(())
}

/// Install the starship prompt and deploy its system-wide configuration.
pub fn install_starship(host: &Host) -> Result<()> {
    if is_installed("starship") {
        log::info!("'starship' is already installed");
    } else {
        log::info!("installing 'starship'...");
        run(&Invocation::shell(
            "curl -sS https://starship.rs/install.sh | sh -s -- -b /usr/local/bin -y",
        ))?;
    }
    deploy_starship_config(host)
}

/// Deploy `/etc/starship.toml`, guarded by the usual content check.
pub fn deploy_starship_config(host: &Host) -> Result<()> {
    let dest = host.path("/etc/starship.toml");
    if crate::files::is_copied(STARSHIP_CONFIG, &dest) {
        log::info!("{:?} is already copied", dest.display().to_string());
        return Ok(());
    }
    log::info!("copying {:?}...", dest.display().to_string());
    crate::files::copy(STARSHIP_CONFIG, &dest)
}

/// Install nfs-common via apt.
pub fn install_nfs_common(host: &Host) -> Result<()> {
    if apt_installed("nfs-common") {
        log::info!("'nfs-common' is already installed");
        return Ok(());
    }
    log::info!("installing 'nfs-common'...");
    apt_install("nfs-common", host.probes)
}

/// Download the latest release asset of a GitHub project to a temporary
/// directory and mark it executable.
///
/// The asset template may reference `${tag}` (e.g. `v1.2.3`) and
/// `${tag_without}` (the tag with a leading `v` stripped). The temporary
/// directory is returned alongside the file path; the file lives only as
/// long as the directory.
pub fn github_download(
    owner: &str,
    repo: &str,
    asset_template: &str,
    host: &Host,
) -> Result<(tempfile::TempDir, PathBuf)> {
    let releases = format!("{owner}/{repo}/releases");
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("hostup/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(
            host.settings.downloads.timeout_secs,
        ))
        .build()?;

    let api_url = format!("https://api.github.com/repos/{releases}/latest");
    let release: serde_json::Value = checked(client.get(&api_url).send()?, &api_url)?.json()?;
    let tag = release["tag_name"].as_str().ok_or_else(|| Error::Download {
        url: api_url.clone(),
        message: "release metadata has no tag_name".to_string(),
    })?;

    let filename = release_asset_name(asset_template, tag)?;
    let asset_url = format!("https://github.com/{releases}/download/{tag}/{filename}");
    log::info!("downloading {:?}...", asset_url);
    let bytes = checked(client.get(&asset_url).send()?, &asset_url)?.bytes()?;

    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join(&filename);
    std::fs::write(&path, &bytes)?;
    add_mode(&path, 0o100)?;
    Ok((dir, path))
}

/// Render a release asset template against a tag.
fn release_asset_name(template: &str, tag: &str) -> Result<String> {
    substitute(
        template,
        &vars([
            ("tag", tag.to_string()),
            ("tag_without", tag.trim_start_matches('v').to_string()),
        ]),
    )
}

fn checked(
    response: reqwest::blocking::Response,
    url: &str,
) -> Result<reqwest::blocking::Response> {
    response.error_for_status().map_err(|e| Error::Download {
        url: url.to_string(),
        message: e.to_string(),
    })
}
