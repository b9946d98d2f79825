//! Bootstrap configuration
//!
//! Every field has a default so the binary runs with no config file at all.
//! A TOML file passed with `--config` overrides individual fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BootError, BootResult};

/// Pause after publishing DNS records and before probing peers.
///
/// The directory is eventually consistent; peers resolving the new names right
/// after an upsert may see stale answers. This is accepted latency, not a retry.
pub const SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Tunables for one bootstrap run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Service label used in SRV record names (`_<service>-server-ssl._tcp`)
    pub service: String,
    /// Prefix of the environment variables handed to the peer-store
    pub env_prefix: String,
    pub client_port: u16,
    pub peer_port: u16,
    /// TTL of every record written to the directory
    pub record_ttl: i64,
    pub settle_delay_secs: u64,
    /// Per-request timeout towards a peer's administrative endpoint
    pub peer_timeout_secs: u64,
    /// Administrative members collection on each peer
    pub members_path: String,
    /// Probe all candidate peers at once, first answer wins
    pub probe_concurrently: bool,
    pub data_dir: PathBuf,
    /// Peer-store executable
    pub binary: PathBuf,
    pub argv0: String,
    pub metadata_url: String,
    /// Instance tag carrying the scaling group name
    pub group_tag: String,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            service: "etcd".to_string(),
            env_prefix: "ETCD".to_string(),
            client_port: crate::identity::DEFAULT_CLIENT_PORT,
            peer_port: crate::identity::DEFAULT_PEER_PORT,
            record_ttl: 60,
            settle_delay_secs: SETTLE_DELAY.as_secs(),
            peer_timeout_secs: 5,
            members_path: "/v2/members".to_string(),
            probe_concurrently: false,
            data_dir: PathBuf::from("/var/lib/etcd"),
            binary: PathBuf::from("/etcd"),
            argv0: "etcd".to_string(),
            metadata_url: "http://169.254.169.254".to_string(),
            group_tag: "aws:autoscaling:groupName".to_string(),
        }
    }
}

impl BootConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> BootResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BootError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> BootResult<Self> {
        let config: BootConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, or the given file when present
    pub fn load(path: Option<&Path>) -> BootResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> BootResult<()> {
        if self.service.is_empty() {
            return Err(BootError::Config("service must not be empty".to_string()));
        }
        if self.env_prefix.is_empty() {
            return Err(BootError::Config("env_prefix must not be empty".to_string()));
        }
        if self.peer_port == 0 || self.client_port == 0 {
            return Err(BootError::Config("ports must be non-zero".to_string()));
        }
        if self.record_ttl <= 0 {
            return Err(BootError::Config("record_ttl must be positive".to_string()));
        }
        if !self.members_path.starts_with('/') {
            return Err(BootError::Config(format!(
                "members_path must be absolute: {}",
                self.members_path
            )));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

/// Transport security towards peers.
///
/// Built once from the command line and handed to both the peer connector and
/// the launch planner. A node can only serve TLS with a certificate and key,
/// so those two decide the transport for listeners and for probes alike; the
/// CA bundle only adds trust roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to a PEM bundle, or the PEM content itself
    pub ca_bundle: Option<String>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl TlsConfig {
    pub fn new(ca_bundle: Option<String>, client_cert: Option<PathBuf>, client_key: Option<PathBuf>) -> Self {
        Self {
            ca_bundle: ca_bundle.filter(|s| !s.trim().is_empty()),
            client_cert,
            client_key,
        }
    }

    /// Both halves of the client identity are present
    pub fn is_mutual(&self) -> bool {
        self.client_cert.is_some() && self.client_key.is_some()
    }

    /// Peers listen with TLS
    pub fn is_enabled(&self) -> bool {
        self.is_mutual()
    }

    /// URL scheme spoken on every peer's client and peer ports
    pub fn url_scheme(&self) -> &'static str {
        if self.is_enabled() {
            "https"
        } else {
            "http"
        }
    }

    fn ca_is_inline(&self) -> bool {
        self.ca_bundle
            .as_deref()
            .map(|s| s.trim_start().starts_with("-----BEGIN"))
            .unwrap_or(false)
    }

    /// CA bundle file location, when given as a path
    pub fn ca_path(&self) -> Option<PathBuf> {
        if self.ca_is_inline() {
            return None;
        }
        self.ca_bundle.as_ref().map(PathBuf::from)
    }

    /// CA bundle PEM bytes
    pub fn ca_pem(&self) -> BootResult<Option<Vec<u8>>> {
        match &self.ca_bundle {
            None => Ok(None),
            Some(inline) if self.ca_is_inline() => Ok(Some(inline.as_bytes().to_vec())),
            Some(path) => fs::read(path)
                .map(Some)
                .map_err(|e| BootError::Config(format!("CA bundle {}: {}", path, e))),
        }
    }

    /// Client certificate followed by its key, as one PEM buffer
    pub fn identity_pem(&self) -> BootResult<Option<Vec<u8>>> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = fs::read(cert)
                    .map_err(|e| BootError::Config(format!("client cert {}: {}", cert.display(), e)))?;
                pem.push(b'\n');
                pem.extend(
                    fs::read(key)
                        .map_err(|e| BootError::Config(format!("client key {}: {}", key.display(), e)))?,
                );
                Ok(Some(pem))
            }
            (None, None) => Ok(None),
            _ => Err(BootError::Config(
                "client certificate and key must be given together".to_string(),
            )),
        }
    }
}
