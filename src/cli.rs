use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::TlsConfig;
use crate::error::BootError;

/// One-line usage printed for any malformed invocation
pub const USAGE: &str = "Usage: boot <up|down> <prefix> <domain> [peer-store args...]";

/// boot - peer-store cluster bootstrapper
/// Publishes this node in DNS, reconciles cluster membership against the fleet
/// and hands off to the peer-store
#[derive(Parser, Debug)]
#[command(name = "boot")]
#[command(author = "Fleetboot Team")]
#[command(version = "0.1.0")]
#[command(about = "Bootstrap a peer-store node from its scaling group and DNS")]
#[command(long_about = "
boot discovers the members of this instance's scaling group, publishes
per-node, aggregate and SRV records for them, decides whether to start or
join the peer cluster, repairs its membership and execs the peer-store.

Usage examples:
  boot up etcd cluster.example.com                 # Bootstrap and launch
  boot up etcd cluster.example.com --auto-compaction-retention=1
  boot down etcd cluster.example.com               # Withdraw this node's A record
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// CA bundle used to verify peers, as a path or inline PEM
    #[arg(long, global = true, env = "BOOT_CA_BUNDLE")]
    pub ca_bundle: Option<String>,

    /// Client certificate presented to peers
    #[arg(long, global = true, env = "BOOT_CLIENT_CERT")]
    pub client_cert: Option<PathBuf>,

    /// Key of the client certificate
    #[arg(long, global = true, env = "BOOT_CLIENT_KEY")]
    pub client_key: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Publish, reconcile and launch the peer-store
    Up {
        /// Member name prefix
        prefix: String,

        /// Base discovery domain
        domain: String,

        /// Arguments passed through to the peer-store
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Remove this node's address record
    Down {
        /// Member name prefix
        prefix: String,

        /// Base discovery domain
        domain: String,
    },
}

impl Commands {
    pub fn prefix(&self) -> &str {
        match self {
            Commands::Up { prefix, .. } | Commands::Down { prefix, .. } => prefix,
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Commands::Up { domain, .. } | Commands::Down { domain, .. } => domain,
        }
    }
}

impl Cli {
    /// Transport security assembled from the command line and environment
    pub fn tls(&self) -> TlsConfig {
        TlsConfig::new(
            self.ca_bundle.clone(),
            self.client_cert.clone(),
            self.client_key.clone(),
        )
    }
}

/// Outcome of argument parsing
#[derive(Debug)]
pub enum Invocation {
    Run(Cli),
    /// Help or version was requested; the text is already rendered
    Informational(String),
}

/// Parse `args`, mapping every malformed invocation to [`BootError::Usage`]
pub fn parse_from<I, T>(args: I) -> Result<Invocation, BootError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Invocation::Run(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                Ok(Invocation::Informational(err.render().to_string()))
            }
            _ => Err(BootError::Usage(USAGE.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::USAGE_EXIT_CODE;

    fn run(args: &[&str]) -> Cli {
        match parse_from(args) {
            Ok(Invocation::Run(cli)) => cli,
            other => panic!("Expected a runnable invocation, got {:?}", other),
        }
    }

    #[test]
    fn test_up_with_passthrough() {
        let cli = run(&["boot", "up", "etcd", "example.com", "--snapshot-count", "5000"]);
        assert_eq!(
            cli.command,
            Commands::Up {
                prefix: "etcd".to_string(),
                domain: "example.com".to_string(),
                args: vec!["--snapshot-count".to_string(), "5000".to_string()],
            }
        );
    }

    #[test]
    fn test_down() {
        let cli = run(&["boot", "down", "etcd", "example.com"]);
        assert_eq!(cli.command.prefix(), "etcd");
        assert_eq!(cli.command.domain(), "example.com");
        assert!(matches!(cli.command, Commands::Down { .. }));
    }

    #[test]
    fn test_global_flags() {
        let cli = run(&["boot", "--verbose", "--config", "/etc/boot.toml", "up", "etcd", "example.com"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/boot.toml")));
    }

    #[test]
    fn test_tls_from_flags() {
        let cli = run(&[
            "boot",
            "--ca-bundle",
            "/etc/ssl/ca.pem",
            "--client-cert",
            "/etc/ssl/node.pem",
            "--client-key",
            "/etc/ssl/node-key.pem",
            "up",
            "etcd",
            "example.com",
        ]);
        let tls = cli.tls();
        assert!(tls.is_mutual());
        assert_eq!(tls.url_scheme(), "https");
    }

    #[test]
    fn test_malformed_invocations() {
        for args in [
            vec!["boot"],
            vec!["boot", "sideways", "etcd", "example.com"],
            vec!["boot", "up", "etcd"],
            vec!["boot", "down"],
            vec!["boot", "down", "etcd", "example.com", "extra"],
        ] {
            let err = parse_from(&args).unwrap_err();
            assert_eq!(err.exit_code(), USAGE_EXIT_CODE, "{:?}", args);
            assert_eq!(err.to_string(), USAGE);
        }
    }

    #[test]
    fn test_help_is_informational() {
        assert!(matches!(parse_from(["boot", "--help"]), Ok(Invocation::Informational(_))));
        assert!(matches!(parse_from(["boot", "--version"]), Ok(Invocation::Informational(_))));
    }
}
