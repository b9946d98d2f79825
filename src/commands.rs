//! `up` and `down` orchestration
//!
//! The async building blocks are generic over the roster, DNS provider and
//! peer connector; [`execute_command`] wires them to EC2, Route53 and HTTP.

use log::info;
use std::net::Ipv4Addr;

use crate::cli::{Cli, Commands};
use crate::cloud::{load_sdk_config, Ec2FleetRoster, FleetRoster, InstanceMetadata, NodeIdentity};
use crate::config::{BootConfig, TlsConfig};
use crate::discovery::{
    client_service_label, server_service_label, service_entries, DiscoveryDirectory, DnsProvider, Route53Provider,
};
use crate::error::{BootError, BootResult};
use crate::identity::IdentityScheme;
use crate::launch::{self, LaunchPlan, LaunchPlanner};
use crate::peer::{HttpPeerConnector, PeerConnector};
use crate::reconcile::{Outcome, ProbeMode, ReconciliationEngine};

/// Publish per-node A records, the aggregate A record and both SRV records
/// for `active`.
pub async fn publish_records<P: DnsProvider>(
    directory: &DiscoveryDirectory<P>,
    scheme: &IdentityScheme,
    config: &BootConfig,
    active: &[Ipv4Addr],
) -> BootResult<()> {
    for address in active {
        directory
            .upsert_address(&scheme.name(*address), config.record_ttl, &[*address])
            .await?;
    }
    directory
        .upsert_address(scheme.prefix(), config.record_ttl, active)
        .await?;

    let identities = scheme.identities(active);
    directory
        .upsert_service(
            &server_service_label(&config.service),
            &service_entries(&identities, scheme.peer_port()),
        )
        .await?;
    directory
        .upsert_service(
            &client_service_label(&config.service),
            &service_entries(&identities, scheme.client_port()),
        )
        .await?;
    Ok(())
}

/// Everything `up` does before launching: publish, settle, reconcile
///
/// The peer-store binary is checked first so a node that cannot launch
/// leaves DNS and the cluster untouched.
pub async fn bootstrap<R, P, C>(
    roster: R,
    directory: &DiscoveryDirectory<P>,
    connector: C,
    scheme: &IdentityScheme,
    config: &BootConfig,
    self_address: Ipv4Addr,
) -> BootResult<Outcome>
where
    R: FleetRoster,
    P: DnsProvider,
    C: PeerConnector,
{
    launch::check_binary(&config.binary)?;

    let active = roster.active_addresses().await?;
    info!("fleet has {} active members", active.len());

    publish_records(directory, scheme, config, &active).await?;

    let delay = config.settle_delay();
    if !delay.is_zero() {
        info!("waiting {}s for the directory to settle", delay.as_secs());
        tokio::time::sleep(delay).await;
    }

    let probe_mode = if config.probe_concurrently {
        ProbeMode::Concurrent
    } else {
        ProbeMode::Sequential
    };
    let mut engine = ReconciliationEngine::new(roster, connector, scheme.clone(), self_address).with_probe_mode(probe_mode);
    let outcome = engine.run().await?;

    if outcome.reconciliation_attempted {
        let report = &outcome.report;
        info!(
            "reconciliation: {} added, {} removed, {} failed",
            report.added.len(),
            report.removed.len(),
            report.failed.len()
        );
    }
    Ok(outcome)
}

/// `down`: withdraw this node's per-node A record
pub async fn withdraw<P: DnsProvider>(
    directory: &DiscoveryDirectory<P>,
    scheme: &IdentityScheme,
    self_address: Ipv4Addr,
) -> BootResult<()> {
    directory
        .delete_address(&scheme.name(self_address), &[self_address])
        .await?;
    Ok(())
}

async fn resolve_node(config: &BootConfig) -> BootResult<NodeIdentity> {
    let metadata = InstanceMetadata::connect(&config.metadata_url).await?;
    let node = metadata.resolve().await?;
    info!(
        "running as {} ({}) in {}",
        node.instance_id, node.address, node.region
    );
    Ok(node)
}

async fn execute_up(
    config: &BootConfig,
    tls: &TlsConfig,
    scheme: &IdentityScheme,
    domain: &str,
    args: Vec<String>,
) -> BootResult<LaunchPlan> {
    let node = resolve_node(config).await?;
    let sdk = load_sdk_config(&node.region).await;

    let roster = Ec2FleetRoster::for_instance(
        aws_sdk_ec2::Client::new(&sdk),
        &config.group_tag,
        &node.instance_id,
    )
    .await?;
    info!("scaling group {}", roster.group());

    let provider = Route53Provider::new(aws_sdk_route53::Client::new(&sdk));
    let directory = DiscoveryDirectory::open(provider, domain, config.record_ttl).await?;
    let connector = HttpPeerConnector::from_config(config, scheme, tls)?;

    let outcome = bootstrap(roster, &directory, connector, scheme, config, node.address).await?;
    Ok(LaunchPlanner::new(config, scheme, tls).plan(node.address, outcome.join_state, args))
}

async fn execute_down(config: &BootConfig, scheme: &IdentityScheme, domain: &str) -> BootResult<()> {
    let node = resolve_node(config).await?;
    let sdk = load_sdk_config(&node.region).await;
    let provider = Route53Provider::new(aws_sdk_route53::Client::new(&sdk));
    let directory = DiscoveryDirectory::open(provider, domain, config.record_ttl).await?;
    withdraw(&directory, scheme, node.address).await
}

/// Log the plan, check the binary and replace this process with it
pub fn hand_off(plan: &LaunchPlan) -> BootResult<()> {
    let env = serde_json::to_string_pretty(&plan.env).map_err(|e| BootError::Config(e.to_string()))?;
    info!("peer-store environment:\n{}", env);

    launch::check_binary(&plan.binary)?;
    match launch::exec(plan) {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}

pub fn execute_command(cli: Cli) -> BootResult<()> {
    let config = BootConfig::load(cli.config.as_deref())?;
    let tls = cli.tls();
    let scheme = IdentityScheme::new(cli.command.prefix(), cli.command.domain())
        .with_ports(config.peer_port, config.client_port);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Up { domain, args, .. } => {
            let plan = rt.block_on(execute_up(&config, &tls, &scheme, &domain, args))?;
            drop(rt);
            hand_off(&plan)
        }
        Commands::Down { domain, .. } => rt.block_on(execute_down(&config, &scheme, &domain)),
    }
}
