//! HTTP client for a peer's members API
//!
//! `GET {members}` lists, `POST {members}` with `{"peerURLs":[..]}` adds,
//! `DELETE {members}/{id}` removes.

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use super::{PeerAdmin, PeerConnector, Unreachable};
use crate::config::{BootConfig, TlsConfig};
use crate::error::{BootError, BootResult};
use crate::identity::IdentityScheme;
use crate::types::PeerClusterMember;

#[derive(Debug, Deserialize)]
struct MemberList {
    #[serde(default)]
    members: Vec<PeerClusterMember>,
}

#[derive(Debug, Serialize)]
struct AddMemberRequest<'a> {
    #[serde(rename = "peerURLs")]
    peer_urls: [&'a str; 1],
}

/// Members endpoint of the peer at `address`
///
/// Follows the same transport the launched peers listen with. Over TLS the
/// peer is dialed by its published host name so the certificate can match.
pub fn admin_url(tls: &TlsConfig, identities: &IdentityScheme, address: Ipv4Addr, members_path: &str) -> String {
    match tls.url_scheme() {
        "https" => format!("{}{}", identities.identity(address).client_url, members_path),
        scheme => format!("{}://{}:{}{}", scheme, address, identities.client_port(), members_path),
    }
}

/// Builds [`PeerClusterClient`]s sharing one HTTP client and TLS setup
#[derive(Debug, Clone)]
pub struct HttpPeerConnector {
    http: reqwest::Client,
    tls: TlsConfig,
    identities: IdentityScheme,
    members_path: String,
}

impl HttpPeerConnector {
    pub fn new(
        identities: &IdentityScheme,
        members_path: &str,
        timeout: Duration,
        tls: &TlsConfig,
    ) -> BootResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(pem) = tls.ca_pem()? {
            let ca = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| BootError::Config(format!("CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(ca);
        }
        if let Some(pem) = tls.identity_pem()? {
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| BootError::Config(format!("client identity: {}", e)))?;
            builder = builder.identity(identity);
        }

        Ok(Self {
            http: builder.build()?,
            tls: tls.clone(),
            identities: identities.clone(),
            members_path: members_path.to_string(),
        })
    }

    pub fn from_config(config: &BootConfig, identities: &IdentityScheme, tls: &TlsConfig) -> BootResult<Self> {
        Self::new(identities, &config.members_path, config.peer_timeout(), tls)
    }
}

impl PeerConnector for HttpPeerConnector {
    type Client = PeerClusterClient;

    fn connect(&self, address: Ipv4Addr) -> PeerClusterClient {
        PeerClusterClient {
            http: self.http.clone(),
            address,
            members_url: admin_url(&self.tls, &self.identities, address, &self.members_path),
        }
    }
}

/// Client bound to one peer's administrative endpoint
#[derive(Debug, Clone)]
pub struct PeerClusterClient {
    http: reqwest::Client,
    address: Ipv4Addr,
    members_url: String,
}

impl PeerClusterClient {
    pub fn members_url(&self) -> &str {
        &self.members_url
    }
}

#[async_trait]
impl PeerAdmin for PeerClusterClient {
    fn address(&self) -> Ipv4Addr {
        self.address
    }

    async fn list_members(&self) -> Result<Vec<PeerClusterMember>, Unreachable> {
        let resp = self
            .http
            .get(&self.members_url)
            .send()
            .await
            .map_err(|e| Unreachable::new(self.address, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Unreachable::new(self.address, format!("status {}", resp.status())));
        }

        let list: MemberList = resp
            .json()
            .await
            .map_err(|e| Unreachable::new(self.address, format!("malformed member list: {}", e)))?;

        debug!("peer {} reports {} members", self.address, list.members.len());
        Ok(list.members)
    }

    async fn add_member(&self, peer_url: &str) -> bool {
        let body = AddMemberRequest { peer_urls: [peer_url] };
        match self.http.post(&self.members_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("peer {} refused to add {}: {}", self.address, peer_url, resp.status());
                false
            }
            Err(e) => {
                warn!("peer {} failed to add {}: {}", self.address, peer_url, e);
                false
            }
        }
    }

    async fn remove_member(&self, id: &str) -> bool {
        let url = format!("{}/{}", self.members_url, id);
        match self.http.delete(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("peer {} refused to remove {}: {}", self.address, id, resp.status());
                false
            }
            Err(e) => {
                warn!("peer {} failed to remove {}: {}", self.address, id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::LaunchPlanner;
    use crate::types::ClusterJoinState;
    use std::path::PathBuf;

    fn identities() -> IdentityScheme {
        IdentityScheme::new("etcd", "example.com")
    }

    #[test]
    fn test_plain_http_without_ca() {
        let connector =
            HttpPeerConnector::new(&identities(), "/v2/members", Duration::from_secs(1), &TlsConfig::default()).unwrap();
        let client = connector.connect(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(client.members_url(), "http://10.0.0.1:2379/v2/members");
        assert_eq!(client.address(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_ca_alone_stays_on_plain_http() {
        let tls = TlsConfig::new(Some("/nonexistent/ca.pem".to_string()), None, None);
        assert_eq!(
            admin_url(&tls, &identities(), Ipv4Addr::new(10, 0, 0, 1), "/v2/members"),
            "http://10.0.0.1:2379/v2/members"
        );
    }

    #[test]
    fn test_tls_dials_host_name() {
        let tls = TlsConfig::new(
            None,
            Some(PathBuf::from("/etc/ssl/node.pem")),
            Some(PathBuf::from("/etc/ssl/node-key.pem")),
        );
        assert_eq!(
            admin_url(&tls, &identities(), Ipv4Addr::new(10, 0, 0, 1), "/v2/members"),
            "https://etcd-0a000001.example.com:2379/v2/members"
        );
    }

    #[test]
    fn test_dialed_scheme_matches_listeners() {
        let config = BootConfig::default();
        let identities = identities();
        let address = Ipv4Addr::new(10, 0, 0, 7);
        let ca = Some("/etc/ssl/ca.pem".to_string());
        let cert = Some(PathBuf::from("/etc/ssl/node.pem"));
        let key = Some(PathBuf::from("/etc/ssl/node-key.pem"));

        let combinations = [
            TlsConfig::default(),
            TlsConfig::new(ca.clone(), None, None),
            TlsConfig::new(None, cert.clone(), key.clone()),
            TlsConfig::new(ca, cert, key),
        ];
        for tls in &combinations {
            let plan = LaunchPlanner::new(&config, &identities, tls).plan(address, ClusterJoinState::New, Vec::new());
            let dialed = admin_url(tls, &identities, address, &config.members_path);

            for listener in ["ETCD_LISTEN_CLIENT_URLS", "ETCD_LISTEN_PEER_URLS"] {
                let listen = plan.get(listener).unwrap();
                let listen_scheme = listen.split("://").next().unwrap();
                let dialed_scheme = dialed.split("://").next().unwrap();
                assert_eq!(listen_scheme, dialed_scheme, "{:?}", tls);
            }
        }
    }

    #[test]
    fn test_connector_uses_listen_scheme() {
        // Connectors needing PEM material are covered through admin_url above
        let config = BootConfig::default();
        let identities = identities();
        let address = Ipv4Addr::new(10, 0, 0, 7);
        let tls = TlsConfig::default();

        let connector = HttpPeerConnector::from_config(&config, &identities, &tls).unwrap();
        let plan = LaunchPlanner::new(&config, &identities, &tls).plan(address, ClusterJoinState::New, Vec::new());

        let client = connector.connect(address);
        let listen = plan.get("ETCD_LISTEN_CLIENT_URLS").unwrap();
        assert!(client.members_url().starts_with("http://"));
        assert!(listen.starts_with("http://"));
    }

    #[test]
    fn test_add_member_payload() {
        let body = AddMemberRequest {
            peer_urls: ["https://etcd-0a000003.example.com:2380"],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"peerURLs":["https://etcd-0a000003.example.com:2380"]}"#
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let connector =
            HttpPeerConnector::new(&identities().with_ports(2380, 1), "/v2/members", Duration::from_millis(500), &TlsConfig::default())
                .unwrap();
        let client = connector.connect(Ipv4Addr::new(127, 0, 0, 1));

        let err = client.list_members().await.unwrap_err();
        assert_eq!(err.address, Ipv4Addr::new(127, 0, 0, 1));
        assert!(!client.add_member("https://x:2380").await);
        assert!(!client.remove_member("abc").await);
    }
}
