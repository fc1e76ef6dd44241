//! Configuration files: host inventory, format plan, and the on-host layout.
//!
//! Files are JSON. Loading returns `anyhow` errors with file context; lookups
//! that tasks depend on (a host id that is not in the inventory) return
//! catalog errors so callers can branch on the kind.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{self, ErrorKind};
use crate::host::HostBinding;

/// Image used when the format config does not name one.
pub const DEFAULT_CONTAINER_IMAGE: &str = "opencurvedocker/curvebs:v1.2";

/// All hosts fleetadm may act on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub hosts: Vec<HostBinding>,
}

impl Inventory {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read inventory from {:?}", path.as_ref()))?;
        let inventory: Self =
            serde_json::from_str(&content).context("Failed to parse inventory JSON")?;
        inventory.validate()?;
        Ok(inventory)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.host.trim().is_empty() {
                bail!("Inventory contains a host with an empty id");
            }
            if !seen.insert(host.host.as_str()) {
                bail!("Duplicate host '{}' in inventory", host.host);
            }
            if !host.local && (host.hostname.trim().is_empty() || host.user.trim().is_empty()) {
                bail!("Host '{}' needs both hostname and user", host.host);
            }
        }
        Ok(())
    }

    /// Binding for `host`, or a `host-not-found` error.
    pub fn host(&self, host: &str) -> error::Result<&HostBinding> {
        self.hosts
            .iter()
            .find(|h| h.host == host)
            .ok_or_else(|| ErrorKind::HostNotFound.error().field("host", host))
    }
}

/// Format plan as written by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfigFile {
    pub host: Vec<String>,
    /// `device:mount_point:usage_percent`
    pub disk: Vec<String>,
    #[serde(default)]
    pub container_image: Option<String>,
}

/// One device to format on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatEntry {
    pub host: String,
    pub device: String,
    pub mount_point: String,
    pub usage_percent: u8,
    pub container_image: String,
}

impl FormatEntry {
    /// Parse `device:mount_point:usage_percent` for `host`.
    pub fn parse(host: &str, disk: &str, container_image: &str) -> Result<Self> {
        let parts: Vec<&str> = disk.split(':').collect();
        let [device, mount_point, percent] = parts.as_slice() else {
            bail!("Invalid disk '{}', expected device:mount_point:usage_percent", disk);
        };
        if !device.starts_with('/') {
            bail!("Device '{}' must be an absolute path", device);
        }
        if !mount_point.starts_with('/') || *mount_point == "/" {
            bail!("Mount point '{}' must be an absolute path other than /", mount_point);
        }
        let usage_percent: u8 = percent
            .parse()
            .with_context(|| format!("Invalid usage percent '{}' in '{}'", percent, disk))?;
        if !(1..=100).contains(&usage_percent) {
            bail!("Usage percent {} out of range 1..=100", usage_percent);
        }
        Ok(Self {
            host: host.to_string(),
            device: device.to_string(),
            mount_point: mount_point.to_string(),
            usage_percent,
            container_image: container_image.to_string(),
        })
    }
}

/// Expanded format plan: one entry per (host, disk) pair.
#[derive(Debug, Clone, Default)]
pub struct FormatConfig {
    pub entries: Vec<FormatEntry>,
}

impl FormatConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read format config from {:?}", path.as_ref()))?;
        let file: FormatConfigFile =
            serde_json::from_str(&content).context("Failed to parse format config JSON")?;
        Self::from_file(&file)
    }

    pub fn from_file(file: &FormatConfigFile) -> Result<Self> {
        if file.host.is_empty() || file.disk.is_empty() {
            bail!("Format config needs at least one host and one disk");
        }
        let image = file
            .container_image
            .as_deref()
            .unwrap_or(DEFAULT_CONTAINER_IMAGE);
        let mut entries = Vec::new();
        for host in &file.host {
            for disk in &file.disk {
                entries.push(FormatEntry::parse(host, disk, image)?);
            }
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert((&entry.host, &entry.device)) {
                bail!("Device {} listed twice for host {}", entry.device, entry.host);
            }
        }
        Ok(Self { entries })
    }
}

/// Paths on the target host and inside the service image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub tools_bin_dir: String,
    pub format_binary_path: String,
    pub chunkfile_pool_root_dir: String,
    pub chunkfile_pool_dir: String,
    pub chunkfile_pool_meta_path: String,
    pub fstab_path: String,
}

impl Layout {
    /// Layout of an image rooted at `root` (e.g. `/curvebs`).
    pub fn with_root(root: &str) -> Self {
        let data = format!("{}/chunkserver/data", root);
        Self {
            tools_bin_dir: format!("{}/tools/sbin", root),
            format_binary_path: format!("{}/tools/sbin/curve_format", root),
            chunkfile_pool_dir: format!("{}/chunkfilepool", data),
            chunkfile_pool_meta_path: format!("{}/chunkfilepool.meta", data),
            chunkfile_pool_root_dir: data,
            fstab_path: "/etc/fstab".to_string(),
        }
    }

    pub fn format_script_path(&self) -> String {
        format!("{}/format.sh", self.tools_bin_dir)
    }

    pub fn target_script_path(&self) -> String {
        format!("{}/target.sh", self.tools_bin_dir)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::with_root("/curvebs")
    }
}
