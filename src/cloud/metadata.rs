//! Instance metadata service client
//!
//! Requests an IMDSv2 session token first and falls back to plain v1 reads if
//! the token endpoint does not answer.

use log::debug;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{BootError, BootResult};

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Who this node is, as far as the control plane is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub instance_id: String,
    pub region: String,
    pub address: Ipv4Addr,
}

/// Client for the link-local metadata endpoint
#[derive(Debug, Clone)]
pub struct InstanceMetadata {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl InstanceMetadata {
    /// Create a client and try to obtain a session token
    pub async fn connect(base_url: &str) -> BootResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let token = match client
            .put(format!("{}{}", base_url, TOKEN_PATH))
            .header(TOKEN_TTL_HEADER, "300")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                debug!("metadata token request returned {}, using v1 reads", resp.status());
                None
            }
            Err(e) => {
                debug!("metadata token request failed ({}), using v1 reads", e);
                None
            }
        };

        Ok(Self { client, base_url, token })
    }

    async fn get_text(&self, path: &str) -> BootResult<String> {
        let url = format!("{}/latest/meta-data/{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(BootError::Metadata(format!("{} returned {}", url, resp.status())));
        }
        Ok(resp.text().await?.trim().to_string())
    }

    pub async fn instance_id(&self) -> BootResult<String> {
        self.get_text("instance-id").await
    }

    pub async fn region(&self) -> BootResult<String> {
        let zone = self.get_text("placement/availability-zone").await?;
        region_from_zone(&zone)
    }

    pub async fn private_ipv4(&self) -> BootResult<Ipv4Addr> {
        let raw = self.get_text("local-ipv4").await?;
        raw.parse()
            .map_err(|_| BootError::Metadata(format!("invalid local-ipv4: {}", raw)))
    }

    /// Resolve instance id, region and private address in one go
    pub async fn resolve(&self) -> BootResult<NodeIdentity> {
        Ok(NodeIdentity {
            instance_id: self.instance_id().await?,
            region: self.region().await?,
            address: self.private_ipv4().await?,
        })
    }
}

/// `us-east-1a` -> `us-east-1`
pub fn region_from_zone(zone: &str) -> BootResult<String> {
    let mut chars = zone.chars();
    match chars.next_back() {
        Some(last) if last.is_ascii_alphabetic() && !chars.as_str().is_empty() => {
            Ok(chars.as_str().to_string())
        }
        _ => Err(BootError::Metadata(format!("invalid availability zone: {}", zone))),
    }
}
