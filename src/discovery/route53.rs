//! Route53 implementation of [`DnsProvider`]

use async_trait::async_trait;
use aws_sdk_route53::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_route53::types::{
    Change, ChangeAction as Route53Action, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client;
use log::debug;

use super::{ChangeAction, DnsProvider, HostedZone};
use crate::error::{DirectoryError, DirectoryResult};
use crate::types::{DiscoveryRecord, RecordType};

const ZONE_ID_PREFIX: &str = "/hostedzone/";

/// DNS provider backed by Route53 hosted zones
#[derive(Debug, Clone)]
pub struct Route53Provider {
    client: Client,
}

impl Route53Provider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// `/hostedzone/Z123` -> `Z123`
pub fn strip_zone_id(id: &str) -> &str {
    id.strip_prefix(ZONE_ID_PREFIX).unwrap_or(id)
}

/// Route53 answers a DELETE of a missing record with an InvalidChangeBatch
/// whose message says the record "was not found".
pub fn is_missing_record(message: &str) -> bool {
    message.contains("not found")
}

fn invalid(record: &DiscoveryRecord, err: impl std::fmt::Display) -> DirectoryError {
    DirectoryError::InvalidRecord {
        name: record.name.clone(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn hosted_zones(&self) -> DirectoryResult<Vec<HostedZone>> {
        let mut zones = Vec::new();
        let mut next_name: Option<String> = None;
        let mut next_id: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_hosted_zones_by_name()
                .set_dns_name(next_name.take())
                .set_hosted_zone_id(next_id.take())
                .send()
                .await
                .map_err(|e| DirectoryError::Provider(DisplayErrorContext(&e).to_string()))?;

            zones.extend(
                resp.hosted_zones()
                    .iter()
                    .map(|z| HostedZone::new(strip_zone_id(z.id()), z.name())),
            );

            if !resp.is_truncated() {
                break;
            }
            next_name = resp.next_dns_name().map(str::to_string);
            next_id = resp.next_hosted_zone_id().map(str::to_string);
            if next_name.is_none() {
                break;
            }
        }

        debug!("provider lists {} hosted zones", zones.len());
        Ok(zones)
    }

    async fn change(&self, zone_id: &str, action: ChangeAction, record: &DiscoveryRecord) -> DirectoryResult<()> {
        let resource_records = record
            .values
            .iter()
            .map(|v| ResourceRecord::builder().value(v).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(record, e))?;

        let rr_type = match record.record_type {
            RecordType::A => RrType::A,
            RecordType::Srv => RrType::Srv,
        };
        let record_set = ResourceRecordSet::builder()
            .name(&record.name)
            .r#type(rr_type)
            .ttl(record.ttl)
            .set_resource_records(Some(resource_records))
            .build()
            .map_err(|e| invalid(record, e))?;

        let change = Change::builder()
            .action(match action {
                ChangeAction::Upsert => Route53Action::Upsert,
                ChangeAction::Delete => Route53Action::Delete,
            })
            .resource_record_set(record_set)
            .build()
            .map_err(|e| invalid(record, e))?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| invalid(record, e))?;

        match self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                if action == ChangeAction::Delete {
                    if let Some(service) = err.as_service_error() {
                        if service.is_invalid_change_batch()
                            && service.message().map(is_missing_record).unwrap_or(false)
                        {
                            debug!("{} {} already absent", record.record_type, record.name);
                            return Ok(());
                        }
                    }
                }
                Err(DirectoryError::Provider(DisplayErrorContext(&err).to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_zone_id() {
        assert_eq!(strip_zone_id("/hostedzone/Z0123456789"), "Z0123456789");
        assert_eq!(strip_zone_id("Z0123456789"), "Z0123456789");
    }

    #[test]
    fn test_missing_record_detection() {
        assert!(is_missing_record(
            "Tried to delete resource record set [name='etcd-0a000001.example.com.', type='A'] but it was not found"
        ));
        assert!(!is_missing_record("RRSet of type A with DNS name x is not permitted"));
    }
}
