//! In-memory DNS provider with Route53 replace/delete semantics

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ChangeAction, DnsProvider, HostedZone};
use crate::error::{DirectoryError, DirectoryResult};
use crate::types::{DiscoveryRecord, RecordType};

type RecordKey = (String, String, RecordType);

/// Provider that keeps records in a map, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryDnsProvider {
    zones: Vec<HostedZone>,
    records: Arc<RwLock<BTreeMap<RecordKey, DiscoveryRecord>>>,
    changes: Arc<RwLock<Vec<(ChangeAction, DiscoveryRecord)>>>,
    fail_changes: bool,
}

impl MemoryDnsProvider {
    pub fn new(zones: Vec<HostedZone>) -> Self {
        Self {
            zones,
            ..Default::default()
        }
    }

    /// Reject every change, as a provider outage would
    pub fn failing(mut self) -> Self {
        self.fail_changes = true;
        self
    }

    pub async fn record(&self, name: &str, record_type: RecordType) -> Option<DiscoveryRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|((_, n, t), _)| n == name && *t == record_type)
            .map(|(_, r)| r.clone())
    }

    pub async fn records(&self) -> Vec<DiscoveryRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Every change received, in order
    pub async fn changes(&self) -> Vec<(ChangeAction, DiscoveryRecord)> {
        self.changes.read().await.clone()
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn hosted_zones(&self) -> DirectoryResult<Vec<HostedZone>> {
        Ok(self.zones.clone())
    }

    async fn change(&self, zone_id: &str, action: ChangeAction, record: &DiscoveryRecord) -> DirectoryResult<()> {
        if self.fail_changes {
            return Err(DirectoryError::Provider(format!("change to {} rejected", record.name)));
        }
        if !self.zones.iter().any(|z| z.id == zone_id) {
            return Err(DirectoryError::Provider(format!("no such hosted zone: {}", zone_id)));
        }

        self.changes.write().await.push((action, record.clone()));

        let key = (zone_id.to_string(), record.name.clone(), record.record_type);
        let mut records = self.records.write().await;
        match action {
            ChangeAction::Upsert => {
                records.insert(key, record.clone());
            }
            ChangeAction::Delete => {
                records.remove(&key);
            }
        }
        Ok(())
    }
}
