//! DNS-based discovery directory
//!
//! Publishes per-node, aggregate and SRV records under a base domain so peers
//! and clients can find each other. The domain is resolved against the
//! provider's hosted zones by longest-suffix match; every record name is built
//! as `label.<labels>.<zone>`.
//!
//! Upserts replace the whole value set of a name+type. Deletes of records that
//! do not exist succeed. Provider failures are fatal and never retried here.

pub mod memory;
pub mod route53;

pub use memory::MemoryDnsProvider;
pub use route53::Route53Provider;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{DirectoryError, DirectoryResult};
use crate::identity::PeerIdentity;
use crate::types::{DiscoveryRecord, RecordType};

/// Mutation kind sent to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    Upsert,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Upsert => write!(f, "UPSERT"),
            ChangeAction::Delete => write!(f, "DELETE"),
        }
    }
}

/// A hosted zone known to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Provider zone id, without any path prefix
    pub id: String,
    /// Zone apex, without trailing dot
    pub name: String,
}

impl HostedZone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into().trim_end_matches('.').to_string(),
        }
    }
}

/// Backend that stores the records
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn hosted_zones(&self) -> DirectoryResult<Vec<HostedZone>>;

    /// Apply a single change. Deleting a missing record must succeed.
    async fn change(&self, zone_id: &str, action: ChangeAction, record: &DiscoveryRecord) -> DirectoryResult<()>;
}

/// Split of a domain into the labels below its hosted zone and the zone itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneResolution {
    /// Labels between the record label and the zone apex, dot-joined
    pub labels: String,
    pub zone: HostedZone,
}

impl ZoneResolution {
    /// Longest-suffix match of `domain` against `zones`.
    ///
    /// A suffix matching more than one zone (split-horizon duplicates) is
    /// skipped, and the search continues with the next shorter suffix.
    pub fn resolve(domain: &str, zones: &[HostedZone]) -> DirectoryResult<Self> {
        let domain = domain.trim_end_matches('.');
        let parts: Vec<&str> = domain.split('.').filter(|p| !p.is_empty()).collect();

        for i in 0..parts.len() {
            let candidate = parts[i..].join(".");
            let mut matches = zones.iter().filter(|z| z.name.eq_ignore_ascii_case(&candidate));
            if let (Some(zone), None) = (matches.next(), matches.next()) {
                return Ok(Self {
                    labels: parts[..i].join("."),
                    zone: zone.clone(),
                });
            }
        }

        Err(DirectoryError::ZoneNotFound(domain.to_string()))
    }

    /// `label.<labels>.<zone>`, skipping empty parts
    pub fn record_name(&self, label: &str) -> String {
        [label, self.labels.as_str(), self.zone.name.as_str()]
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// One SRV target: `priority weight port target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SrvEntry {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

impl SrvEntry {
    pub fn new(priority: u16, weight: u16, port: u16, target: impl Into<String>) -> Self {
        Self {
            priority,
            weight,
            port,
            target: target.into(),
        }
    }
}

impl fmt::Display for SrvEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.priority, self.weight, self.port, self.target)
    }
}

/// Equal-weight SRV entries for identities, in the given order
pub fn service_entries(identities: &[PeerIdentity], port: u16) -> Vec<SrvEntry> {
    identities
        .iter()
        .map(|id| SrvEntry::new(0, 0, port, id.host.clone()))
        .collect()
}

/// SRV label for the peer-to-peer service, e.g. `_etcd-server-ssl._tcp`
pub fn server_service_label(service: &str) -> String {
    format!("_{}-server-ssl._tcp", service)
}

/// SRV label for the client service, e.g. `_etcd-client-ssl._tcp`
pub fn client_service_label(service: &str) -> String {
    format!("_{}-client-ssl._tcp", service)
}

/// Discovery directory bound to one resolved domain
#[derive(Debug)]
pub struct DiscoveryDirectory<P: DnsProvider> {
    provider: P,
    resolution: ZoneResolution,
    ttl: i64,
}

impl<P: DnsProvider> DiscoveryDirectory<P> {
    /// Resolve `domain` against the provider's zones
    pub async fn open(provider: P, domain: &str, ttl: i64) -> DirectoryResult<Self> {
        let zones = provider.hosted_zones().await?;
        let resolution = ZoneResolution::resolve(domain, &zones)?;
        debug!(
            "domain {} resolved to zone {} ({}) with labels '{}'",
            domain, resolution.zone.name, resolution.zone.id, resolution.labels
        );
        Ok(Self {
            provider,
            resolution,
            ttl,
        })
    }

    pub fn resolution(&self) -> &ZoneResolution {
        &self.resolution
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn record_name(&self, label: &str) -> String {
        self.resolution.record_name(label)
    }

    async fn apply(&self, action: ChangeAction, record: DiscoveryRecord) -> DirectoryResult<()> {
        if record.values.is_empty() {
            debug!("skipping {} of {} {}: no values", action, record.record_type, record.name);
            return Ok(());
        }
        info!("{} {} {} -> {}", action, record.record_type, record.name, record.values.join(", "));
        if let Ok(json) = serde_json::to_string(&record) {
            debug!("change batch: {}", json);
        }
        self.provider
            .change(&self.resolution.zone.id, action, &record)
            .await
    }

    /// Replace the A record `label` with `addresses`
    pub async fn upsert_address(&self, label: &str, ttl: i64, addresses: &[Ipv4Addr]) -> DirectoryResult<()> {
        let record = DiscoveryRecord::new(
            self.record_name(label),
            RecordType::A,
            addresses.iter().map(|a| a.to_string()),
            ttl,
        );
        self.apply(ChangeAction::Upsert, record).await
    }

    /// Delete the A record `label` holding `addresses`
    pub async fn delete_address(&self, label: &str, addresses: &[Ipv4Addr]) -> DirectoryResult<()> {
        let record = DiscoveryRecord::new(
            self.record_name(label),
            RecordType::A,
            addresses.iter().map(|a| a.to_string()),
            self.ttl,
        );
        self.apply(ChangeAction::Delete, record).await
    }

    /// Replace the SRV record `label` with `entries`
    pub async fn upsert_service(&self, label: &str, entries: &[SrvEntry]) -> DirectoryResult<()> {
        let record = DiscoveryRecord::new(
            self.record_name(label),
            RecordType::Srv,
            entries.iter().map(|e| e.to_string()),
            self.ttl,
        );
        self.apply(ChangeAction::Upsert, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> Vec<HostedZone> {
        vec![
            HostedZone::new("Z1", "example.com."),
            HostedZone::new("Z2", "prod.example.com."),
            HostedZone::new("Z3", "other.org."),
        ]
    }

    #[test]
    fn test_longest_suffix_wins() {
        let resolution = ZoneResolution::resolve("etcd.prod.example.com", &zones()).unwrap();
        assert_eq!(resolution.zone.id, "Z2");
        assert_eq!(resolution.labels, "etcd");
        assert_eq!(resolution.record_name("etcd-0a000001"), "etcd-0a000001.etcd.prod.example.com");
    }

    #[test]
    fn test_domain_is_zone_apex() {
        let resolution = ZoneResolution::resolve("example.com", &zones()).unwrap();
        assert_eq!(resolution.zone.id, "Z1");
        assert_eq!(resolution.labels, "");
        assert_eq!(resolution.record_name("etcd"), "etcd.example.com");
    }

    #[test]
    fn test_multiple_labels() {
        let resolution = ZoneResolution::resolve("a.b.example.com.", &zones()).unwrap();
        assert_eq!(resolution.zone.id, "Z1");
        assert_eq!(resolution.labels, "a.b");
    }

    #[test]
    fn test_ambiguous_suffix_falls_through() {
        let zones = vec![
            HostedZone::new("Z1", "example.com"),
            HostedZone::new("Z2a", "prod.example.com"),
            HostedZone::new("Z2b", "prod.example.com"),
        ];
        let resolution = ZoneResolution::resolve("etcd.prod.example.com", &zones).unwrap();
        assert_eq!(resolution.zone.id, "Z1");
        assert_eq!(resolution.labels, "etcd.prod");
    }

    #[test]
    fn test_unknown_domain() {
        let result = ZoneResolution::resolve("cluster.example.net", &zones());
        assert!(matches!(result, Err(DirectoryError::ZoneNotFound(_))));
    }

    #[test]
    fn test_srv_entry_format() {
        let entry = SrvEntry::new(0, 0, 2380, "etcd-0a000001.example.com");
        assert_eq!(entry.to_string(), "0 0 2380 etcd-0a000001.example.com");
    }

    #[test]
    fn test_service_labels() {
        assert_eq!(server_service_label("etcd"), "_etcd-server-ssl._tcp");
        assert_eq!(client_service_label("etcd"), "_etcd-client-ssl._tcp");
    }
}
