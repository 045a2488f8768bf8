//! Network-connection collaborator.
//!
//! Topology (ISPs, LANs, port forwarding) lives outside VOS. Programs only
//! need to ask whether a host answers, resolve a name, and open or listen on
//! a port, so that is all this trait exposes.

use std::cell::RefCell;
use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::{Result, VosError};

/// A connection from one computer to the simulated network.
pub trait NetworkConnection {
    /// Resolve a hostname to an address. Addresses resolve to themselves.
    fn resolve(&self, host: &str) -> Option<String>;

    /// Whether `address` answers.
    fn ping(&self, address: &str) -> bool;

    /// Open a connection to `address:port`.
    fn connect(&self, address: &str, port: u16) -> Result<()>;

    /// Start listening on a local port.
    fn listen(&self, port: u16) -> Result<()>;
}

/// A `[[network.host]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    /// Human-readable name (e.g., "mainframe").
    pub name: String,
    /// Address the name resolves to.
    pub address: String,
    /// Ports accepting connections.
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// A fixed host table.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    hosts: Vec<HostEntry>,
    listening: RefCell<BTreeSet<u16>>,
}

impl StaticNetwork {
    pub fn new(hosts: Vec<HostEntry>) -> Self {
        Self {
            hosts,
            listening: RefCell::new(BTreeSet::new()),
        }
    }

    fn host(&self, address: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.address == address)
    }

    /// Ports opened through `listen`.
    pub fn listening_ports(&self) -> Vec<u16> {
        self.listening.borrow().iter().copied().collect()
    }
}

impl NetworkConnection for StaticNetwork {
    fn resolve(&self, host: &str) -> Option<String> {
        self.hosts
            .iter()
            .find(|h| h.name == host || h.address == host)
            .map(|h| h.address.clone())
    }

    fn ping(&self, address: &str) -> bool {
        self.host(address).is_some()
    }

    fn connect(&self, address: &str, port: u16) -> Result<()> {
        match self.host(address) {
            Some(h) if h.ports.contains(&port) => Ok(()),
            Some(_) => Err(VosError::Command(format!(
                "connect to {address} port {port}: Connection refused"
            ))),
            None => Err(VosError::Command(format!(
                "connect to {address}: No route to host"
            ))),
        }
    }

    fn listen(&self, port: u16) -> Result<()> {
        if !self.listening.borrow_mut().insert(port) {
            return Err(VosError::Command(format!(
                "listen on port {port}: Address already in use"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net() -> StaticNetwork {
        StaticNetwork::new(vec![HostEntry {
            name: "mainframe".into(),
            address: "10.0.0.5".into(),
            ports: vec![22],
        }])
    }

    #[test]
    fn resolve_by_name_and_address() {
        let n = net();
        assert_eq!(n.resolve("mainframe").as_deref(), Some("10.0.0.5"));
        assert_eq!(n.resolve("10.0.0.5").as_deref(), Some("10.0.0.5"));
        assert_eq!(n.resolve("nowhere"), None);
    }

    #[test]
    fn ping_known_hosts_only() {
        let n = net();
        assert!(n.ping("10.0.0.5"));
        assert!(!n.ping("10.0.0.6"));
    }

    #[test]
    fn connect_checks_ports() {
        let n = net();
        assert!(n.connect("10.0.0.5", 22).is_ok());
        assert!(n.connect("10.0.0.5", 80).is_err());
        assert!(n.connect("10.9.9.9", 22).is_err());
    }

    #[test]
    fn listen_rejects_duplicates() {
        let n = net();
        n.listen(8080).unwrap();
        assert!(n.listen(8080).is_err());
        assert_eq!(n.listening_ports(), vec![8080]);
    }

    #[test]
    fn host_entry_parses_from_toml() {
        let entry: HostEntry =
            toml::from_str("name = \"gw\"\naddress = \"10.0.0.1\"\n").unwrap();
        assert_eq!(entry.name, "gw");
        assert!(entry.ports.is_empty());
    }
}
