use config::{builder::DefaultState, ConfigBuilder, Environment};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::request::PurgeRequest;
use crate::store::{BucketRole, BucketTarget, MAX_DELETE_BATCH};

/// Placeholder in key templates, replaced by the dataset path (`12` or `12/3`).
pub const DATASET_PLACEHOLDER: &str = "{dataset}";

/// Environment variables are read as `PURGE_<KEY>`, e.g. `PURGE_PUBLISH_BUCKET`.
pub const ENV_PREFIX: &str = "PURGE";

/// Raw settings as they come out of the environment.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub service_name: String,
    pub tier: String,
    pub region: Option<String>,
    pub s3_endpoint: Option<String>,

    pub publish_bucket: String,
    pub publish_key_template: String,
    pub publish_versioned: bool,
    pub publish_requester_pays: bool,

    pub embargo_bucket: Option<String>,
    pub embargo_key_template: String,
    pub embargo_versioned: bool,
    pub embargo_requester_pays: bool,

    pub asset_bucket: Option<String>,
    pub asset_key_template: String,
    pub asset_versioned: bool,
    pub asset_requester_pays: bool,

    pub batch_size: usize,
    pub listing_attempts: usize,
    pub log_level: String,
    pub log_json: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_builder(
            with_defaults(config::Config::builder())?
                .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)),
        )
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Register the default value of every optional setting.
pub fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    Ok(builder
        .set_default("service_name", "discover-purge")?
        .set_default("tier", "dev")?
        .set_default("publish_key_template", "{dataset}/")?
        .set_default("publish_versioned", false)?
        .set_default("publish_requester_pays", true)?
        .set_default("embargo_key_template", "{dataset}/")?
        .set_default("embargo_versioned", false)?
        .set_default("embargo_requester_pays", true)?
        .set_default("asset_key_template", "dataset-assets/{dataset}/")?
        .set_default("asset_versioned", false)?
        .set_default("asset_requester_pays", false)?
        .set_default("batch_size", MAX_DELETE_BATCH as i64)?
        .set_default("listing_attempts", 3_i64)?
        .set_default("log_level", "info")?
        .set_default("log_json", true)?)
}

/// A key prefix with a single `{dataset}` placeholder.
///
/// The placeholder must occupy a whole path segment and the template must end
/// with `/`, so the prefix of dataset `1/10` can never match keys of `1/100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    head: String,
    tail: String,
}

impl KeyTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let (head, tail) = template.split_once(DATASET_PLACEHOLDER).ok_or_else(|| {
            Error::invalid_config(format!(
                "key template `{template}` has no {DATASET_PLACEHOLDER} placeholder"
            ))
        })?;
        if tail.contains(DATASET_PLACEHOLDER) {
            return Err(Error::invalid_config(format!(
                "key template `{template}` has more than one {DATASET_PLACEHOLDER} placeholder"
            )));
        }
        if !(head.is_empty() || head.ends_with('/')) || !tail.starts_with('/') || !tail.ends_with('/') {
            return Err(Error::invalid_config(format!(
                "key template `{template}` must keep {DATASET_PLACEHOLDER} in its own path segment and end with `/`"
            )));
        }
        if head.starts_with('/') {
            return Err(Error::invalid_config(format!(
                "key template `{template}` must not start with `/`"
            )));
        }
        Ok(Self {
            head: head.to_owned(),
            tail: tail.to_owned(),
        })
    }

    pub fn render(&self, dataset_path: &str) -> String {
        format!("{}{}{}", self.head, dataset_path, self.tail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    pub role: BucketRole,
    pub name: String,
    pub key_template: KeyTemplate,
    pub versioned: bool,
    pub requester_pays: bool,
}

impl BucketConfig {
    fn new(role: BucketRole, name: &str, template: &str, versioned: bool, requester_pays: bool) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_config(format!("{role} bucket name is empty")));
        }
        Ok(Self {
            role,
            name: name.to_owned(),
            key_template: KeyTemplate::parse(template)?,
            versioned,
            requester_pays,
        })
    }
}

/// Validated process configuration, built once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeConfig {
    pub service_name: String,
    pub tier: String,
    pub region: Option<String>,
    pub s3_endpoint: Option<String>,
    /// in role order: publish, embargo, asset
    pub buckets: Vec<BucketConfig>,
    pub batch_size: usize,
    pub listing_attempts: usize,
    pub log_level: String,
    pub log_json: bool,
}

impl PurgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::try_from(Settings::from_env()?)
    }

    /// `<service>-<tier>`, the name the function logs under.
    pub fn full_service_name(&self) -> String {
        format!("{}-{}", self.service_name, self.tier)
    }

    /// The bucket/prefix pairs that hold the requested dataset, in role order.
    pub fn targets(&self, request: &PurgeRequest) -> Result<Vec<BucketTarget>> {
        if let Some(tier) = &request.tier {
            if *tier != self.tier {
                return Err(Error::invalid_request(format!(
                    "request for tier `{tier}` sent to tier `{}`",
                    self.tier
                )));
            }
        }
        let dataset_path = request.dataset.to_string();
        Ok(self
            .buckets
            .iter()
            .map(|bucket| BucketTarget {
                role: bucket.role,
                bucket: bucket.name.clone(),
                prefix: bucket.key_template.render(&dataset_path),
                versioned: bucket.versioned,
                requester_pays: bucket.requester_pays,
            })
            .collect())
    }
}

impl TryFrom<Settings> for PurgeConfig {
    type Error = Error;

    fn try_from(s: Settings) -> Result<Self> {
        if s.batch_size == 0 || s.batch_size > MAX_DELETE_BATCH {
            return Err(Error::invalid_config(format!(
                "batch_size must be between 1 and {MAX_DELETE_BATCH}, got {}",
                s.batch_size
            )));
        }
        if s.listing_attempts == 0 {
            return Err(Error::invalid_config("listing_attempts must be at least 1"));
        }
        if s.tier.trim().is_empty() {
            return Err(Error::invalid_config("tier is empty"));
        }

        let mut buckets = vec![BucketConfig::new(
            BucketRole::Publish,
            &s.publish_bucket,
            &s.publish_key_template,
            s.publish_versioned,
            s.publish_requester_pays,
        )?];
        if let Some(name) = &s.embargo_bucket {
            buckets.push(BucketConfig::new(
                BucketRole::Embargo,
                name,
                &s.embargo_key_template,
                s.embargo_versioned,
                s.embargo_requester_pays,
            )?);
        }
        if let Some(name) = &s.asset_bucket {
            buckets.push(BucketConfig::new(
                BucketRole::Asset,
                name,
                &s.asset_key_template,
                s.asset_versioned,
                s.asset_requester_pays,
            )?);
        }

        Ok(Self {
            service_name: s.service_name,
            tier: s.tier,
            region: s.region.filter(|r| !r.trim().is_empty()),
            s3_endpoint: s.s3_endpoint.filter(|e| !e.trim().is_empty()),
            buckets,
            batch_size: s.batch_size,
            listing_attempts: s.listing_attempts,
            log_level: s.log_level,
            log_json: s.log_json,
        })
    }
}
