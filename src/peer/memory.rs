//! In-memory peer cluster
//!
//! Every connected client shares one member list. Only addresses marked
//! reachable answer; everything else behaves like a node whose peer-store is
//! not running yet.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{PeerAdmin, PeerConnector, Unreachable};
use crate::types::PeerClusterMember;

/// One administrative call, as recorded by [`MemoryPeerCluster`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    List(Ipv4Addr),
    Add(String),
    Remove(String),
}

#[derive(Debug, Default)]
struct ClusterState {
    members: Vec<PeerClusterMember>,
    reachable: BTreeSet<Ipv4Addr>,
    calls: Vec<PeerCall>,
    next_id: u64,
    reject_mutations: bool,
}

/// Shared member list reachable through a set of addresses
#[derive(Debug, Clone, Default)]
pub struct MemoryPeerCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryPeerCluster {
    pub fn new(members: Vec<PeerClusterMember>, reachable: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        let state = ClusterState {
            members,
            reachable: reachable.into_iter().collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Refuse every add and remove
    pub async fn reject_mutations(&self) {
        self.state.lock().await.reject_mutations = true;
    }

    pub async fn set_reachable(&self, reachable: impl IntoIterator<Item = Ipv4Addr>) {
        self.state.lock().await.reachable = reachable.into_iter().collect();
    }

    pub async fn members(&self) -> Vec<PeerClusterMember> {
        self.state.lock().await.members.clone()
    }

    /// Every call received, in order
    pub async fn calls(&self) -> Vec<PeerCall> {
        self.state.lock().await.calls.clone()
    }

    /// Add and remove calls only
    pub async fn mutations(&self) -> Vec<PeerCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| !matches!(c, PeerCall::List(_)))
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

impl PeerConnector for MemoryPeerCluster {
    type Client = MemoryPeer;

    fn connect(&self, address: Ipv4Addr) -> MemoryPeer {
        MemoryPeer {
            cluster: self.clone(),
            address,
        }
    }
}

/// Client bound to one address of a [`MemoryPeerCluster`]
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    cluster: MemoryPeerCluster,
    address: Ipv4Addr,
}

#[async_trait]
impl PeerAdmin for MemoryPeer {
    fn address(&self) -> Ipv4Addr {
        self.address
    }

    async fn list_members(&self) -> Result<Vec<PeerClusterMember>, Unreachable> {
        let mut state = self.cluster.state.lock().await;
        state.calls.push(PeerCall::List(self.address));
        if !state.reachable.contains(&self.address) {
            return Err(Unreachable::new(self.address, "connection refused"));
        }
        Ok(state.members.clone())
    }

    async fn add_member(&self, peer_url: &str) -> bool {
        let mut state = self.cluster.state.lock().await;
        state.calls.push(PeerCall::Add(peer_url.to_string()));
        if state.reject_mutations || !state.reachable.contains(&self.address) {
            return false;
        }
        state.next_id += 1;
        let member = PeerClusterMember::new(format!("{:016x}", state.next_id), "").with_peer_url(peer_url);
        state.members.push(member);
        true
    }

    async fn remove_member(&self, id: &str) -> bool {
        let mut state = self.cluster.state.lock().await;
        state.calls.push(PeerCall::Remove(id.to_string()));
        if state.reject_mutations || !state.reachable.contains(&self.address) {
            return false;
        }
        let before = state.members.len();
        state.members.retain(|m| m.id != id);
        state.members.len() != before
    }
}
