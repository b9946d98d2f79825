//! Cluster-join decision and membership reconciliation
//!
//! The engine walks `Probing -> Deciding -> Reconciling -> Converged` once per
//! bootstrap run. The fleet roster is the desired membership, the member list
//! of the first peer that answers is the actual membership. Convergence is
//! best-effort: a failed add or remove is logged and the remaining steps still
//! run. Whatever is left over is repaired by the next node that bootstraps.

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use std::fmt;
use std::net::Ipv4Addr;

use crate::cloud::FleetRoster;
use crate::error::BootResult;
use crate::identity::{IdentityScheme, PeerIdentity};
use crate::peer::{PeerAdmin, PeerConnector};
use crate::types::{ClusterJoinState, PeerClusterMember};

/// Engine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Probing,
    Deciding,
    Reconciling,
    Converged,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Probing => "probing",
            EngineState::Deciding => "deciding",
            EngineState::Reconciling => "reconciling",
            EngineState::Converged => "converged",
        };
        f.write_str(name)
    }
}

/// How candidates are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// One at a time in ascending address order, first answer wins
    #[default]
    Sequential,
    /// All at once, first answer wins. Which peer that is depends on timing,
    /// so [`Outcome::answered_by`] can differ between runs.
    Concurrent,
}

/// Peer that answered the probe and what it reported
#[derive(Debug)]
pub struct Probe<C> {
    pub peer: C,
    pub members: Vec<PeerClusterMember>,
}

/// Removals and additions needed to converge observed onto desired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub removals: Vec<PeerClusterMember>,
    pub additions: Vec<PeerIdentity>,
    /// Removals were dropped because they would have emptied the cluster
    pub guarded: bool,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

/// What reconciliation actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Peer URLs added
    pub added: Vec<String>,
    /// Member ids removed
    pub removed: Vec<String>,
    /// Peer URLs or member ids whose mutation failed
    pub failed: Vec<String>,
    pub guarded: bool,
}

/// Terminal result of an engine run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub join_state: ClusterJoinState,
    pub reconciliation_attempted: bool,
    /// Address of the peer that answered, if any. Only deterministic under
    /// [`ProbeMode::Sequential`].
    pub answered_by: Option<Ipv4Addr>,
    pub report: ReconcileReport,
}

/// A member stands for a desired identity if its name matches, or, for
/// members that were added but never started (empty name), if it already
/// advertises the identity's peer URL.
pub fn member_matches(member: &PeerClusterMember, identity: &PeerIdentity) -> bool {
    (!member.name.is_empty() && member.name == identity.name) || member.peer_urls.contains(&identity.peer_url)
}

/// Join state from the probe result.
///
/// No answer means this node starts the cluster. If a peer answered, a list
/// that already names this node yields `New` and one that does not yields
/// `Existing`.
pub fn decide_join_state(self_name: &str, observed: Option<&[PeerClusterMember]>) -> ClusterJoinState {
    match observed {
        None => ClusterJoinState::New,
        Some(members) if members.iter().any(|m| m.name == self_name) => ClusterJoinState::New,
        Some(_) => ClusterJoinState::Existing,
    }
}

/// Removals for observed members outside `desired`, additions for desired
/// identities missing from `observed`. Both sides are computed from the same
/// observed list.
pub fn plan_reconciliation(desired: &[PeerIdentity], observed: &[PeerClusterMember]) -> ReconcilePlan {
    let mut removals: Vec<PeerClusterMember> = observed
        .iter()
        .filter(|m| !desired.iter().any(|d| member_matches(m, d)))
        .cloned()
        .collect();

    let additions = desired
        .iter()
        .filter(|d| !observed.iter().any(|m| member_matches(m, d)))
        .cloned()
        .collect();

    // Never remove every member at once
    let guarded = !observed.is_empty() && removals.len() == observed.len();
    if guarded {
        removals.clear();
    }

    ReconcilePlan {
        removals,
        additions,
        guarded,
    }
}

/// Drives one node's join decision and membership convergence
pub struct ReconciliationEngine<R: FleetRoster, C: PeerConnector> {
    roster: R,
    connector: C,
    scheme: IdentityScheme,
    self_address: Ipv4Addr,
    probe_mode: ProbeMode,
    state: EngineState,
}

impl<R: FleetRoster, C: PeerConnector> ReconciliationEngine<R, C> {
    pub fn new(roster: R, connector: C, scheme: IdentityScheme, self_address: Ipv4Addr) -> Self {
        Self {
            roster,
            connector,
            scheme,
            self_address,
            probe_mode: ProbeMode::default(),
            state: EngineState::Probing,
        }
    }

    pub fn with_probe_mode(mut self, mode: ProbeMode) -> Self {
        self.probe_mode = mode;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn roster(&self) -> &R {
        &self.roster
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn transition(&mut self, next: EngineState) {
        debug!("reconciliation {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run the state machine to completion
    pub async fn run(&mut self) -> BootResult<Outcome> {
        self.state = EngineState::Probing;
        let candidates = self.roster.active_addresses().await?;
        info!("probing {} candidate peers", candidates.len());
        let probe = self.probe(&candidates).await;

        self.transition(EngineState::Deciding);
        let self_name = self.scheme.name(self.self_address);
        let join_state = decide_join_state(&self_name, probe.as_ref().map(|p| p.members.as_slice()));
        let answered_by = probe.as_ref().map(|p| p.peer.address());
        match answered_by {
            Some(address) => info!("peer {} answered; joining as {}", address, join_state),
            None => info!("no peer answered; starting a {} cluster", join_state),
        }

        let mut outcome = Outcome {
            join_state,
            reconciliation_attempted: false,
            answered_by,
            report: ReconcileReport::default(),
        };

        if let (ClusterJoinState::Existing, Some(probe)) = (join_state, probe) {
            self.transition(EngineState::Reconciling);
            outcome.reconciliation_attempted = true;
            outcome.report = self.reconcile(&probe.peer).await?;
        }

        self.transition(EngineState::Converged);
        Ok(outcome)
    }

    /// First candidate that answers `list_members`, if any
    pub async fn probe(&self, candidates: &[Ipv4Addr]) -> Option<Probe<C::Client>> {
        match self.probe_mode {
            ProbeMode::Sequential => {
                for address in candidates {
                    let peer = self.connector.connect(*address);
                    match peer.list_members().await {
                        Ok(members) => return Some(Probe { peer, members }),
                        Err(unreachable) => debug!("{}", unreachable),
                    }
                }
                None
            }
            ProbeMode::Concurrent => {
                let mut pending: FuturesUnordered<_> = candidates
                    .iter()
                    .map(|address| {
                        let peer = self.connector.connect(*address);
                        async move {
                            let result = peer.list_members().await;
                            (peer, result)
                        }
                    })
                    .collect();

                while let Some((peer, result)) = pending.next().await {
                    match result {
                        Ok(members) => return Some(Probe { peer, members }),
                        Err(unreachable) => debug!("{}", unreachable),
                    }
                }
                None
            }
        }
    }

    /// Converge `peer`'s membership onto the current fleet roster.
    ///
    /// Roster failures are fatal. A peer that stops answering between probe
    /// and re-list leaves the cluster untouched.
    pub async fn reconcile(&self, peer: &C::Client) -> BootResult<ReconcileReport> {
        let desired = self.scheme.identities(&self.roster.active_addresses().await?);

        let observed = match peer.list_members().await {
            Ok(members) => members,
            Err(unreachable) => {
                warn!("skipping reconciliation: {}", unreachable);
                return Ok(ReconcileReport::default());
            }
        };

        let plan = plan_reconciliation(&desired, &observed);
        if plan.guarded {
            warn!(
                "none of the {} observed members is in the fleet; refusing to remove them all",
                observed.len()
            );
        }
        if plan.is_empty() {
            info!("peer membership already matches the fleet");
        }

        let mut report = ReconcileReport {
            guarded: plan.guarded,
            ..Default::default()
        };

        for member in &plan.removals {
            info!("removing stale member {} ({})", member.name, member.id);
            if peer.remove_member(&member.id).await {
                report.removed.push(member.id.clone());
            } else {
                warn!("failed to remove member {}", member.id);
                report.failed.push(member.id.clone());
            }
        }

        for identity in &plan.additions {
            info!("adding member {} at {}", identity.name, identity.peer_url);
            if peer.add_member(&identity.peer_url).await {
                report.added.push(identity.peer_url.clone());
            } else {
                warn!("failed to add member {}", identity.peer_url);
                report.failed.push(identity.peer_url.clone());
            }
        }

        Ok(report)
    }
}
