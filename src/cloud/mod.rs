//! Cloud control-plane collaborators
//!
//! Instance metadata tells a node who it is; the fleet roster tells it who its
//! peers should be. Both are read-only and any failure here aborts the run.

pub mod fleet;
pub mod metadata;

pub use fleet::{Ec2FleetRoster, FleetRoster, StaticFleetRoster};
pub use metadata::{InstanceMetadata, NodeIdentity};

use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Shared SDK configuration for the EC2 and Route53 clients
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}
