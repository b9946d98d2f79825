//! Error types for fleetboot
//!
//! Failures talking to the cloud control plane or the discovery directory are
//! fatal and abort the bootstrap run. Peer failures are not errors at all: they
//! surface as [`crate::peer::Unreachable`] values or `false` results.

use std::path::PathBuf;
use thiserror::Error;

/// Exit status for a malformed invocation
pub const USAGE_EXIT_CODE: i32 = 101;

/// Exit status for every other fatal error
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Main error type for bootstrap operations
#[derive(Error, Debug)]
pub enum BootError {
    /// Network or timeout failure talking to the control plane
    #[error("Transport error: {0}")]
    Transport(String),

    /// Instance metadata could not be resolved
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Discovery directory rejected or failed a mutation
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Peer-store binary could not be launched
    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed invocation
    #[error("{0}")]
    Usage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BootError::Usage(_) => USAGE_EXIT_CODE,
            _ => FAILURE_EXIT_CODE,
        }
    }
}

/// Discovery directory errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// No hosted zone is a suffix of the requested domain
    #[error("No hosted zone found for domain {0}")]
    ZoneNotFound(String),

    /// A record could not be assembled
    #[error("Invalid record {name}: {reason}")]
    InvalidRecord { name: String, reason: String },

    /// The DNS provider rejected the request
    #[error("Provider error: {0}")]
    Provider(String),
}

/// Peer-store launch errors
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Target binary does not exist
    #[error("Binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// Target binary exists but cannot be executed
    #[error("Binary is not executable: {}", .0.display())]
    NotExecutable(PathBuf),

    /// An argument or environment entry contains an interior NUL byte
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// exec itself failed
    #[error("Exec failed: {0}")]
    Exec(String),
}

impl From<reqwest::Error> for BootError {
    fn from(err: reqwest::Error) -> Self {
        BootError::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for BootError {
    fn from(err: toml::de::Error) -> Self {
        BootError::Config(err.to_string())
    }
}

/// Result type for bootstrap operations
pub type BootResult<T> = Result<T, BootError>;

/// Result type for discovery directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_exit_101() {
        let err = BootError::Usage("Usage: boot <up|down> <prefix> <domain>".to_string());
        assert_eq!(err.exit_code(), 101);
    }

    #[test]
    fn test_fatal_errors_exit_nonzero() {
        let err = BootError::Directory(DirectoryError::ZoneNotFound("example.com".to_string()));
        assert_eq!(err.exit_code(), FAILURE_EXIT_CODE);
        assert!(err.to_string().contains("example.com"));

        let err = BootError::Launch(LaunchError::BinaryNotFound(PathBuf::from("/etcd")));
        assert_ne!(err.exit_code(), 0);
        assert_eq!(err.to_string(), "Launch error: Binary not found: /etcd");
    }
}
