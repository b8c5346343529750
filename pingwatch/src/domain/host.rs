//! Monitored hosts and the registry loaded at startup.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A monitored host. Identity is the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Human-friendly name used in notifications.
    pub name: String,
    /// IP address or hostname handed to the prober.
    pub address: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Ordered, validated, immutable list of monitored hosts.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    hosts: Vec<Host>,
}

impl HostRegistry {
    /// Validate and build the registry.
    ///
    /// Names and addresses are trimmed; blank values, duplicate addresses and
    /// an empty host list are configuration errors.
    pub fn new(hosts: Vec<Host>) -> Result<Self> {
        if hosts.is_empty() {
            return Err(Error::config("no hosts configured"));
        }

        let mut seen = HashSet::with_capacity(hosts.len());
        let mut normalized = Vec::with_capacity(hosts.len());

        for (index, host) in hosts.into_iter().enumerate() {
            let name = host.name.trim().to_string();
            let address = host.address.trim().to_string();

            if name.is_empty() {
                return Err(Error::config(format!("host #{} has an empty name", index + 1)));
            }
            if address.is_empty() {
                return Err(Error::config(format!("host '{name}' has an empty address")));
            }
            // Hostnames are case-insensitive.
            if !seen.insert(address.to_ascii_lowercase()) {
                return Err(Error::config(format!(
                    "duplicate host address '{address}' (host '{name}')"
                )));
            }

            let description = host
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());

            normalized.push(Host {
                name,
                address,
                description,
            });
        }

        Ok(Self { hosts: normalized })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Host> {
        self.hosts.get(index)
    }

    /// Hosts in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }
}
