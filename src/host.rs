//! Host bindings: how to reach a host and how to run commands on it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Container engine binary used on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Engine {
    #[default]
    Docker,
    Podman,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

/// Connection and execution parameters for one host.
///
/// Resolved once from the inventory and bound to every task that targets the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Inventory identifier (e.g. `node1`).
    pub host: String,
    /// Address passed to ssh.
    pub hostname: String,
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub private_key_file: Option<String>,
    #[serde(default)]
    pub forward_agent: bool,
    /// Run remote commands through `sudo`.
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub engine: Engine,
    /// Seconds before ssh gives up connecting.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Execute with local `bash` instead of ssh.
    #[serde(default)]
    pub local: bool,
}

impl HostBinding {
    /// Binding for a host reached over ssh with default options.
    pub fn new(host: impl Into<String>, hostname: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            hostname: hostname.into(),
            user: user.into(),
            ssh_port: default_ssh_port(),
            private_key_file: None,
            forward_agent: false,
            sudo: false,
            engine: Engine::default(),
            connect_timeout: default_connect_timeout(),
            local: false,
        }
    }

    /// `user@hostname` as given to ssh.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.hostname)
    }
}
