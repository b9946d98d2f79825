//! # fleetboot
//!
//! Bootstraps a peer-store node running in an elastic scaling group. The
//! scaling group is the desired cluster membership, DNS is the discovery
//! mechanism, and the member list of any live peer is the actual membership.
//!
//! One run resolves the node's identity, publishes discovery records, decides
//! whether to start or join the cluster, repairs membership and finally execs
//! the peer-store with a fully formed environment.

#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod identity;
pub mod config;
pub mod cloud;
pub mod discovery;
pub mod peer;
pub mod reconcile;
pub mod launch;
/// Command-line interface and argument parsing
pub mod cli;
/// Command execution and orchestration
pub mod commands;

// Re-export main types
pub use types::{ClusterJoinState, DiscoveryRecord, FleetMember, LifecycleState, PeerClusterMember, RecordType};
pub use error::{BootError, BootResult, DirectoryError, LaunchError};
pub use identity::{hexify, IdentityScheme, PeerIdentity};
pub use config::{BootConfig, TlsConfig, SETTLE_DELAY};
pub use cloud::{FleetRoster, StaticFleetRoster};
pub use discovery::{DiscoveryDirectory, DnsProvider, MemoryDnsProvider};
pub use peer::{MemoryPeerCluster, PeerAdmin, PeerClusterClient, PeerConnector, Unreachable};
pub use reconcile::{Outcome, ReconcileReport, ReconciliationEngine};
pub use launch::{LaunchPlan, LaunchPlanner};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
