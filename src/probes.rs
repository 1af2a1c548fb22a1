//! # Host Environment Probes
//!
//! Environment facts that are expensive to determine (each one shells out or
//! opens a socket) but stable for the lifetime of a provisioning run:
//! whether the host is an LXC container, a KVM guest, a Proxmox node,
//! whether we are root, and which subnet the host sits on.
//!
//! The probes live on a [`HostProbes`] value owned by the provisioning
//! session rather than in process-wide globals; each fact is computed at
//! most once through a `OnceCell`. A probe that fails (for example
//! `systemd-detect-virt` missing on a non-systemd host) reads as `false`.

use std::cell::OnceCell;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::runner::{run_output_ok, Invocation};

/// The subnets a host can be provisioned into.
///
/// Each subnet owns a third-octet value in the settings file; detection maps
/// the host's local address back through that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subnet {
    Qrt,
    Main,
    Test,
}

impl Subnet {
    /// All subnets, in settings order.
    pub const ALL: [Subnet; 3] = [Subnet::Qrt, Subnet::Main, Subnet::Test];

    /// The subnet's name as it appears in the settings file and the
    /// `SUBNET` environment variable.
    pub fn name(&self) -> &'static str {
        match self {
            Subnet::Qrt => "qrt",
            Subnet::Main => "main",
            Subnet::Test => "test",
        }
    }

    /// Parse a subnet from its name.
    pub fn from_name(name: &str) -> Option<Subnet> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// The third octet assigned to this subnet.
    pub fn third_octet(&self, settings: &Settings) -> u8 {
        match self {
            Subnet::Qrt => settings.subnets.qrt,
            Subnet::Main => settings.subnets.main,
            Subnet::Test => settings.subnets.test,
        }
    }
}

/// Lazily-computed host facts, owned by the provisioning session.
#[derive(Debug, Default)]
pub struct HostProbes {
    pve_dir: Option<PathBuf>,
    lxc: OnceCell<bool>,
    vm: OnceCell<bool>,
    proxmox: OnceCell<bool>,
    root: OnceCell<bool>,
}

impl HostProbes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the Proxmox marker directory (used by tests).
    #[cfg(test)]
    pub fn with_pve_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            pve_dir: Some(dir.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Whether the host is an LXC container.
    pub fn is_lxc(&self) -> bool {
        *self.lxc.get_or_init(|| {
            run_output_ok(&Invocation::argv(["systemd-detect-virt", "--container"]))
                .is_some_and(|out| out == "lxc")
        })
    }

    /// Whether the host is a KVM virtual machine.
    pub fn is_vm(&self) -> bool {
        *self.vm.get_or_init(|| {
            run_output_ok(&Invocation::argv(["systemd-detect-virt", "--vm"]))
                .is_some_and(|out| out == "kvm")
        })
    }

    /// Whether the host is a Proxmox node (`/etc/pve` exists).
    pub fn is_proxmox(&self) -> bool {
        *self.proxmox.get_or_init(|| {
            self.pve_dir
                .as_deref()
                .unwrap_or(Path::new("/etc/pve"))
                .is_dir()
        })
    }

    /// Whether the current effective user is root.
    pub fn is_root(&self) -> bool {
        *self
            .root
            .get_or_init(|| run_output_ok(&Invocation::argv(["id", "-u"])).is_some_and(|out| out == "0"))
    }
}

/// Determine the host's subnet.
///
/// The `SUBNET` environment variable wins when set; otherwise the local
/// address used to reach a public resolver is inspected and its third octet
/// mapped through the settings' subnet table.
pub fn detect_subnet(settings: &Settings) -> Result<Subnet> {
    if let Ok(name) = std::env::var("SUBNET") {
        return Subnet::from_name(&name).ok_or_else(|| Error::Subnet {
            message: format!("invalid SUBNET environment variable; got {name:?}"),
        });
    }
    let ip = local_ipv4()?;
    let octet = ip.octets()[2];
    Subnet::ALL
        .into_iter()
        .find(|s| s.third_octet(settings) == octet)
        .ok_or_else(|| Error::Subnet {
            message: format!("invalid IP; got {ip}"),
        })
}

/// The local IPv4 address the host would use to reach the internet.
///
/// Connecting a UDP socket performs no I/O; it only selects a route.
fn local_ipv4() -> Result<std::net::Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| Error::Subnet {
        message: format!("failed to bind probe socket: {e}"),
    })?;
    socket.connect("1.1.1.1:80").map_err(|e| Error::Subnet {
        message: format!("failed to route probe socket: {e}"),
    })?;
    match socket.local_addr() {
        Ok(std::net::SocketAddr::V4(addr)) => Ok(*addr.ip()),
        Ok(addr) => Err(Error::Subnet {
            message: format!("expected an IPv4 local address; got {addr}"),
        }),
        Err(e) => Err(Error::Subnet {
            message: format!("failed to read local address: {e}"),
        }),
    }
}
