//! Core data model for fleetboot
//!
//! Values here are produced fresh on every bootstrap run. Nothing is cached
//! across reconciliation steps since fleet and peer membership change
//! concurrently.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Lifecycle state of a fleet instance as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Instance is booting
    Pending,
    /// Instance is running
    Running,
    /// Terminating, stopped, shutting down, or anything else
    Other(String),
}

impl LifecycleState {
    /// Parse a control-plane state name
    pub fn from_name(name: &str) -> Self {
        match name {
            "pending" => LifecycleState::Pending,
            "running" => LifecycleState::Running,
            other => LifecycleState::Other(other.to_string()),
        }
    }

    /// Only pending and running members take part in the cluster
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Pending | LifecycleState::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Pending => write!(f, "pending"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Other(name) => write!(f, "{}", name),
        }
    }
}

/// One instance of the scaling group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FleetMember {
    /// Private IPv4 address
    pub address: Ipv4Addr,
    /// Lifecycle state at query time
    pub state: LifecycleState,
}

impl FleetMember {
    pub fn new(address: Ipv4Addr, state: LifecycleState) -> Self {
        Self { address, state }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// Active addresses of a roster, ascending and without duplicates
pub fn active_addresses(members: &[FleetMember]) -> Vec<Ipv4Addr> {
    let active: BTreeSet<Ipv4Addr> = members
        .iter()
        .filter(|m| m.is_active())
        .map(|m| m.address)
        .collect();
    active.into_iter().collect()
}

/// A member as reported live by a running peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerClusterMember {
    /// Opaque member id assigned by the peer cluster
    pub id: String,
    /// Member name; empty for members that were added but never started
    #[serde(default)]
    pub name: String,
    /// Advertised peer URLs
    #[serde(rename = "peerURLs", default)]
    pub peer_urls: BTreeSet<String>,
}

impl PeerClusterMember {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            peer_urls: BTreeSet::new(),
        }
    }

    pub fn with_peer_url(mut self, url: impl Into<String>) -> Self {
        self.peer_urls.insert(url.into());
        self
    }
}

/// Whether this node starts a new cluster or joins a running one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterJoinState {
    New,
    Existing,
}

impl ClusterJoinState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterJoinState::New => "new",
            ClusterJoinState::Existing => "existing",
        }
    }
}

impl fmt::Display for ClusterJoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DNS record type managed by the discovery directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Srv,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Srv => "SRV",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-qualified record as sent to the DNS provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    /// Fully-qualified record name
    pub name: String,
    pub record_type: RecordType,
    /// Record values, ordered and unique
    pub values: Vec<String>,
    pub ttl: i64,
}

impl DiscoveryRecord {
    /// Build a record, dropping repeated values while keeping first-seen order
    pub fn new(
        name: impl Into<String>,
        record_type: RecordType,
        values: impl IntoIterator<Item = String>,
        ttl: i64,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let values = values
            .into_iter()
            .filter(|v| seen.insert(v.clone()))
            .collect();
        Self {
            name: name.into(),
            record_type,
            values,
            ttl,
        }
    }
}
