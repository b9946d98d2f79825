//! Launch environment assembly and hand-off to the peer-store
//!
//! Planning is pure. [`exec`] replaces the current process image and only
//! returns on failure.

use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::config::{BootConfig, TlsConfig};
use crate::error::LaunchError;
use crate::identity::IdentityScheme;
use crate::types::ClusterJoinState;

/// Everything needed to start the peer-store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub binary: PathBuf,
    pub argv0: String,
    /// Passthrough arguments, after `argv0`
    pub args: Vec<String>,
    /// The complete environment of the new process
    pub env: BTreeMap<String, String>,
}

impl LaunchPlan {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// `argv0` followed by the passthrough arguments
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.argv0.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Builds [`LaunchPlan`]s for one node
#[derive(Debug, Clone)]
pub struct LaunchPlanner<'a> {
    config: &'a BootConfig,
    scheme: &'a IdentityScheme,
    tls: &'a TlsConfig,
}

impl<'a> LaunchPlanner<'a> {
    pub fn new(config: &'a BootConfig, scheme: &'a IdentityScheme, tls: &'a TlsConfig) -> Self {
        Self { config, scheme, tls }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.config.env_prefix, suffix)
    }

    pub fn plan(&self, self_address: Ipv4Addr, join_state: ClusterJoinState, args: Vec<String>) -> LaunchPlan {
        let identity = self.scheme.identity(self_address);
        let listen_scheme = self.tls.url_scheme();

        let mut env = BTreeMap::new();
        let mut set = |suffix: &str, value: String| {
            env.insert(self.key(suffix), value);
        };

        set("NAME", identity.name.clone());
        set("DATA_DIR", self.config.data_dir.display().to_string());
        set("ADVERTISE_CLIENT_URLS", identity.client_url.clone());
        set("INITIAL_ADVERTISE_PEER_URLS", identity.peer_url.clone());
        set(
            "LISTEN_PEER_URLS",
            format!("{}://0.0.0.0:{}", listen_scheme, self.scheme.peer_port()),
        );
        set(
            "LISTEN_CLIENT_URLS",
            format!("{}://0.0.0.0:{}", listen_scheme, self.scheme.client_port()),
        );
        set("DISCOVERY_SRV", self.scheme.domain().to_string());
        set("INITIAL_CLUSTER_STATE", join_state.to_string());
        set("INITIAL_CLUSTER_TOKEN", self.scheme.cluster_token());

        if let Some(ca) = self.tls.ca_path() {
            set("TRUSTED_CA_FILE", ca.display().to_string());
            set("PEER_TRUSTED_CA_FILE", ca.display().to_string());
        }
        if let Some(cert) = &self.tls.client_cert {
            set("CERT_FILE", cert.display().to_string());
            set("PEER_CERT_FILE", cert.display().to_string());
        }
        if let Some(key) = &self.tls.client_key {
            set("KEY_FILE", key.display().to_string());
            set("PEER_KEY_FILE", key.display().to_string());
        }

        LaunchPlan {
            binary: self.config.binary.clone(),
            argv0: self.config.argv0.clone(),
            args,
            env,
        }
    }
}

/// Fail early if `path` is missing or not executable
pub fn check_binary(path: &Path) -> Result<(), LaunchError> {
    let metadata = std::fs::metadata(path).map_err(|_| LaunchError::BinaryNotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(LaunchError::NotExecutable(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(LaunchError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

#[cfg(unix)]
fn to_cstring(value: String) -> Result<std::ffi::CString, LaunchError> {
    std::ffi::CString::new(value).map_err(|e| LaunchError::InvalidArgument(e.to_string()))
}

/// Replace this process with the peer-store
#[cfg(unix)]
pub fn exec(plan: &LaunchPlan) -> Result<Infallible, LaunchError> {
    use nix::unistd::execve;

    let path = to_cstring(plan.binary.display().to_string())?;
    let argv = plan
        .argv()
        .into_iter()
        .map(|a| to_cstring(a.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let env = plan
        .env
        .iter()
        .map(|(k, v)| to_cstring(format!("{}={}", k, v)))
        .collect::<Result<Vec<_>, _>>()?;

    info!("exec {} with {} arguments", plan.binary.display(), plan.args.len());
    execve(&path, &argv, &env).map_err(|errno| LaunchError::Exec(format!("{}: {}", plan.binary.display(), errno)))
}

#[cfg(not(unix))]
pub fn exec(plan: &LaunchPlan) -> Result<Infallible, LaunchError> {
    Err(LaunchError::Exec(format!(
        "{}: process replacement is only supported on unix",
        plan.binary.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner_parts() -> (BootConfig, IdentityScheme) {
        (BootConfig::default(), IdentityScheme::new("etcd", "example.com"))
    }

    #[test]
    fn test_plan_environment() {
        let (config, scheme) = planner_parts();
        let tls = TlsConfig::default();
        let plan = LaunchPlanner::new(&config, &scheme, &tls).plan(
            Ipv4Addr::new(10, 0, 0, 1),
            ClusterJoinState::Existing,
            vec!["--debug".to_string()],
        );

        assert_eq!(plan.get("ETCD_NAME"), Some("etcd-0a000001"));
        assert_eq!(plan.get("ETCD_DATA_DIR"), Some("/var/lib/etcd"));
        assert_eq!(
            plan.get("ETCD_ADVERTISE_CLIENT_URLS"),
            Some("https://etcd-0a000001.example.com:2379")
        );
        assert_eq!(
            plan.get("ETCD_INITIAL_ADVERTISE_PEER_URLS"),
            Some("https://etcd-0a000001.example.com:2380")
        );
        assert_eq!(plan.get("ETCD_LISTEN_PEER_URLS"), Some("http://0.0.0.0:2380"));
        assert_eq!(plan.get("ETCD_LISTEN_CLIENT_URLS"), Some("http://0.0.0.0:2379"));
        assert_eq!(plan.get("ETCD_DISCOVERY_SRV"), Some("example.com"));
        assert_eq!(plan.get("ETCD_INITIAL_CLUSTER_STATE"), Some("existing"));
        assert_eq!(plan.get("ETCD_INITIAL_CLUSTER_TOKEN"), Some("etcd.example.com"));
        assert!(plan.get("ETCD_TRUSTED_CA_FILE").is_none());
        assert_eq!(plan.argv(), vec!["etcd", "--debug"]);
    }

    #[test]
    fn test_plan_tls_files() {
        let (config, scheme) = planner_parts();
        let tls = TlsConfig::new(
            Some("/etc/ssl/ca.pem".to_string()),
            Some(PathBuf::from("/etc/ssl/node.pem")),
            Some(PathBuf::from("/etc/ssl/node-key.pem")),
        );
        let plan = LaunchPlanner::new(&config, &scheme, &tls).plan(
            Ipv4Addr::new(10, 0, 0, 2),
            ClusterJoinState::New,
            Vec::new(),
        );

        assert_eq!(plan.get("ETCD_TRUSTED_CA_FILE"), Some("/etc/ssl/ca.pem"));
        assert_eq!(plan.get("ETCD_PEER_TRUSTED_CA_FILE"), Some("/etc/ssl/ca.pem"));
        assert_eq!(plan.get("ETCD_CERT_FILE"), Some("/etc/ssl/node.pem"));
        assert_eq!(plan.get("ETCD_PEER_KEY_FILE"), Some("/etc/ssl/node-key.pem"));
        assert_eq!(plan.get("ETCD_LISTEN_PEER_URLS"), Some("https://0.0.0.0:2380"));
        assert_eq!(plan.get("ETCD_INITIAL_CLUSTER_STATE"), Some("new"));
    }

    #[test]
    fn test_inline_ca_has_no_file_var() {
        let (config, scheme) = planner_parts();
        let tls = TlsConfig::new(Some("-----BEGIN CERTIFICATE-----\n".to_string()), None, None);
        let plan = LaunchPlanner::new(&config, &scheme, &tls).plan(
            Ipv4Addr::new(10, 0, 0, 2),
            ClusterJoinState::New,
            Vec::new(),
        );
        assert!(plan.get("ETCD_TRUSTED_CA_FILE").is_none());
    }

    #[test]
    fn test_custom_env_prefix() {
        let config = BootConfig {
            env_prefix: "KV".to_string(),
            ..BootConfig::default()
        };
        let scheme = IdentityScheme::new("kv", "example.com");
        let tls = TlsConfig::default();
        let plan = LaunchPlanner::new(&config, &scheme, &tls).plan(
            Ipv4Addr::new(10, 0, 0, 2),
            ClusterJoinState::New,
            Vec::new(),
        );
        assert_eq!(plan.get("KV_NAME"), Some("kv-0a000002"));
        assert!(plan.env.keys().all(|k| k.starts_with("KV_")));
    }

    #[test]
    fn test_check_missing_binary() {
        let result = check_binary(Path::new("/nonexistent/etcd"));
        assert!(matches!(result, Err(LaunchError::BinaryNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_binary_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path();

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(check_binary(path), Err(LaunchError::NotExecutable(_))));

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(check_binary(path).is_ok());
    }

    #[test]
    fn test_directory_is_not_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(check_binary(dir.path()), Err(LaunchError::NotExecutable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_rejects_nul_in_env() {
        let mut env = BTreeMap::new();
        env.insert("ETCD_NAME".to_string(), "bad\0name".to_string());
        let plan = LaunchPlan {
            binary: PathBuf::from("/nonexistent/etcd"),
            argv0: "etcd".to_string(),
            args: Vec::new(),
            env,
        };
        assert!(matches!(exec(&plan), Err(LaunchError::InvalidArgument(_))));
    }
}
