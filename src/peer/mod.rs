//! Peer administrative endpoint access
//!
//! Every fault talking to a peer is turned into a value: listing yields
//! [`Unreachable`], mutations yield `false`. Reconciliation keeps probing other
//! candidates instead of unwinding.

pub mod client;
pub mod memory;

pub use client::{admin_url, HttpPeerConnector, PeerClusterClient};
pub use memory::{MemoryPeerCluster, PeerCall};

use async_trait::async_trait;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::types::PeerClusterMember;

/// A candidate peer could not answer right now.
///
/// Not a cluster-wide failure; the caller moves on to the next candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("peer {address} unreachable: {reason}")]
pub struct Unreachable {
    pub address: Ipv4Addr,
    pub reason: String,
}

impl Unreachable {
    pub fn new(address: Ipv4Addr, reason: impl Into<String>) -> Self {
        Self {
            address,
            reason: reason.into(),
        }
    }
}

/// Administrative operations on one peer
#[async_trait]
pub trait PeerAdmin: Send + Sync {
    /// Address this client is bound to
    fn address(&self) -> Ipv4Addr;

    /// Current membership as seen by this peer
    async fn list_members(&self) -> Result<Vec<PeerClusterMember>, Unreachable>;

    /// Register a new member by its advertised peer URL
    async fn add_member(&self, peer_url: &str) -> bool;

    /// Remove a member by id
    async fn remove_member(&self, id: &str) -> bool;
}

/// Factory for clients bound to a given peer address
pub trait PeerConnector: Send + Sync {
    type Client: PeerAdmin;

    fn connect(&self, address: Ipv4Addr) -> Self::Client;
}
