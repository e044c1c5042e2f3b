#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! AWS-backed implementations of the token store and role assumption.

mod dynamo;
mod sts;

pub use self::{dynamo::DynamoStore, sts::StsAssumer};
use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Loads shared AWS configuration from the environment, optionally pinning the region.
pub async fn load_config(region: Option<String>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}
