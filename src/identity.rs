//! Deterministic peer naming
//!
//! A member's name and URLs are a pure function of the configured prefix, the
//! domain and its private address. Self, fleet and peer-list matching all go
//! through [`IdentityScheme`] so the derived strings are bit-identical.

use std::net::Ipv4Addr;

/// Default peer-to-peer port of the peer-store
pub const DEFAULT_PEER_PORT: u16 = 2380;

/// Default client port of the peer-store
pub const DEFAULT_CLIENT_PORT: u16 = 2379;

/// Lowercase hex of the four octets, e.g. `10.0.0.1` -> `0a000001`
pub fn hexify(address: Ipv4Addr) -> String {
    hex::encode(address.octets())
}

/// Identity of one member, derived from its address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    pub address: Ipv4Addr,
    /// `prefix-hex(address)`
    pub name: String,
    /// `name.domain`
    pub host: String,
    /// `https://name.domain:peer_port`
    pub peer_url: String,
    /// `https://name.domain:client_port`
    pub client_url: String,
}

/// Naming parameters shared by every identity in one bootstrap run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityScheme {
    prefix: String,
    domain: String,
    peer_port: u16,
    client_port: u16,
}

impl IdentityScheme {
    pub fn new(prefix: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            domain: domain.into().trim_end_matches('.').to_string(),
            peer_port: DEFAULT_PEER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
        }
    }

    pub fn with_ports(mut self, peer_port: u16, client_port: u16) -> Self {
        self.peer_port = peer_port;
        self.client_port = client_port;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn peer_port(&self) -> u16 {
        self.peer_port
    }

    pub fn client_port(&self) -> u16 {
        self.client_port
    }

    /// Member name for an address
    pub fn name(&self, address: Ipv4Addr) -> String {
        format!("{}-{}", self.prefix, hexify(address))
    }

    /// Full identity for an address
    pub fn identity(&self, address: Ipv4Addr) -> PeerIdentity {
        let name = self.name(address);
        let host = format!("{}.{}", name, self.domain);
        PeerIdentity {
            address,
            peer_url: format!("https://{}:{}", host, self.peer_port),
            client_url: format!("https://{}:{}", host, self.client_port),
            name,
            host,
        }
    }

    /// Identities for a roster, in roster order
    pub fn identities(&self, addresses: &[Ipv4Addr]) -> Vec<PeerIdentity> {
        addresses.iter().map(|a| self.identity(*a)).collect()
    }

    /// Token shared by every member of the cluster: `prefix.domain`
    pub fn cluster_token(&self) -> String {
        format!("{}.{}", self.prefix, self.domain)
    }
}
