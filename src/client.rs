use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Region, Client};
use tracing::info;

use crate::config::PurgeConfig;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Build the S3 client once per process.
///
/// The configured region wins, then the environment's provider chain, then
/// [`DEFAULT_REGION`]. An endpoint override (localstack) switches to
/// path-style addressing.
pub async fn get_client(config: &PurgeConfig) -> Client {
    let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));

    let shared_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
    if let Some(endpoint) = &config.s3_endpoint {
        info!(endpoint = %endpoint, "using custom S3 endpoint");
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    Client::from_conf(builder.build())
}
