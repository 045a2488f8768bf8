//! Configuration loaded from `vos.toml`.
//!
//! Every table and key is optional; missing values fall back to the
//! defaults below, which describe a single computer with a root account and
//! one standard user.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, VosError};
use crate::network::HostEntry;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VosConfig {
    pub shell: ShellConfig,
    pub computer: ComputerConfig,
    pub network: NetworkConfig,
}

impl VosConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| VosError::Config(format!("vos.toml: {e}")))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml(&text)
    }
}

/// Interactive shell behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Prompt used when the host context supplies none.
    pub prompt: String,
    /// Prompt shown while a quote or escape is still open.
    pub continuation_prompt: String,
    /// Window title set when a session starts.
    pub default_title: String,
    /// Summarize uncaught errors instead of ending the session.
    pub graceful_errors: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "$ ".to_string(),
            continuation_prompt: " --> ".to_string(),
            default_title: "Terminal".to_string(),
            graceful_errors: true,
        }
    }
}

/// Authorization tier of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeLevel {
    Root,
    #[default]
    Standard,
}

/// One `[[computer.user]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub privilege: PrivilegeLevel,
    /// Home directory; derived from the name when omitted.
    #[serde(default)]
    pub home: Option<String>,
}

impl UserConfig {
    pub fn new(id: u32, name: &str, privilege: PrivilegeLevel) -> Self {
        Self {
            id,
            name: name.to_string(),
            privilege,
            home: None,
        }
    }

    /// The configured home directory, or `/root` / `/home/<name>`.
    pub fn home_dir(&self) -> String {
        match &self.home {
            Some(home) => home.clone(),
            None if self.privilege == PrivilegeLevel::Root => "/root".to_string(),
            None => format!("/home/{}", self.name),
        }
    }
}

/// Backing store for a `[[computer.mount]]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// A fresh, empty in-memory file system.
    Memory,
    /// The world's narrative-device file system.
    Devices,
}

/// One `[[computer.mount]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    pub path: String,
    pub kind: MountKind,
}

/// The simulated computer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComputerConfig {
    pub hostname: String,
    /// Identifier other computers use to address this one under a devices mount.
    pub narrative_id: Option<String>,
    /// Username logged in by the terminal; the first standard user otherwise.
    pub login: Option<String>,
    /// Default `PATH` for login processes.
    pub search_path: String,
    #[serde(rename = "user")]
    pub users: Vec<UserConfig>,
    /// Directories created at boot.
    #[serde(rename = "directory")]
    pub directories: Vec<String>,
    #[serde(rename = "mount")]
    pub mounts: Vec<MountConfig>,
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            narrative_id: None,
            login: None,
            search_path: "/bin:/usr/bin".to_string(),
            users: vec![
                UserConfig::new(0, "root", PrivilegeLevel::Root),
                UserConfig::new(1000, "user", PrivilegeLevel::Standard),
            ],
            directories: ["/bin", "/usr/bin", "/etc", "/tmp", "/home"]
                .into_iter()
                .map(String::from)
                .collect(),
            mounts: Vec::new(),
        }
    }
}

/// Hosts reachable through the simulated network.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: Vec<HostEntry>,
}
