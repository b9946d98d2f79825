//! Fleet roster: the authoritative list of scaling-group members
//!
//! The roster is the desired membership. It is re-read whenever it is needed
//! and never cached between reconciliation steps.

use async_trait::async_trait;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client as Ec2Client;
use log::{debug, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{BootError, BootResult};
use crate::types::{active_addresses, FleetMember, LifecycleState};

/// Source of scaling-group members
#[async_trait]
pub trait FleetRoster: Send + Sync {
    /// Every member of the group, whatever its lifecycle state
    async fn members(&self) -> BootResult<Vec<FleetMember>>;

    /// Active member addresses, ascending
    async fn active_addresses(&self) -> BootResult<Vec<Ipv4Addr>> {
        let members = self.members().await?;
        Ok(active_addresses(&members))
    }
}

/// Roster backed by EC2 instance tags
#[derive(Debug, Clone)]
pub struct Ec2FleetRoster {
    client: Ec2Client,
    group_tag: String,
    group: String,
}

impl Ec2FleetRoster {
    pub fn new(client: Ec2Client, group_tag: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            client,
            group_tag: group_tag.into(),
            group: group.into(),
        }
    }

    /// Build the roster for the group the given instance belongs to
    pub async fn for_instance(client: Ec2Client, group_tag: &str, instance_id: &str) -> BootResult<Self> {
        let resp = client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| BootError::Transport(format!("describe {}: {}", instance_id, DisplayErrorContext(&e))))?;

        let group = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .flat_map(|i| i.tags())
            .find(|t| t.key() == Some(group_tag))
            .and_then(|t| t.value())
            .ok_or_else(|| BootError::Config(format!("instance {} has no {} tag", instance_id, group_tag)))?
            .to_string();

        debug!("instance {} belongs to group {}", instance_id, group);
        Ok(Self::new(client, group_tag, group))
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

#[async_trait]
impl FleetRoster for Ec2FleetRoster {
    async fn members(&self) -> BootResult<Vec<FleetMember>> {
        let filter = Filter::builder()
            .name(format!("tag:{}", self.group_tag))
            .values(self.group.clone())
            .build();

        let mut members = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let resp = self
                .client
                .describe_instances()
                .filters(filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| BootError::Transport(format!("describe group {}: {}", self.group, DisplayErrorContext(&e))))?;

            for instance in resp.reservations().iter().flat_map(|r| r.instances()) {
                // Terminated instances no longer carry a private address
                let Some(raw) = instance.private_ip_address() else {
                    continue;
                };
                let address: Ipv4Addr = match raw.parse() {
                    Ok(address) => address,
                    Err(_) => {
                        warn!("skipping instance with unparsable address {}", raw);
                        continue;
                    }
                };
                let state = instance
                    .state()
                    .and_then(|s| s.name())
                    .map(|n| LifecycleState::from_name(n.as_str()))
                    .unwrap_or_else(|| LifecycleState::Other("unknown".to_string()));
                members.push(FleetMember::new(address, state));
            }

            match resp.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("group {} has {} members", self.group, members.len());
        Ok(members)
    }
}

/// Fixed roster, replaceable at runtime
#[derive(Debug, Clone, Default)]
pub struct StaticFleetRoster {
    members: Arc<RwLock<Vec<FleetMember>>>,
}

impl StaticFleetRoster {
    pub fn new(members: Vec<FleetMember>) -> Self {
        Self {
            members: Arc::new(RwLock::new(members)),
        }
    }

    /// Replace the roster, e.g. to simulate a scale event between reads
    pub async fn set_members(&self, members: Vec<FleetMember>) {
        *self.members.write().await = members;
    }
}

#[async_trait]
impl FleetRoster for StaticFleetRoster {
    async fn members(&self) -> BootResult<Vec<FleetMember>> {
        Ok(self.members.read().await.clone())
    }
}
