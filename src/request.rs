use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Payload the orchestrator sends to the function. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurgeEvent {
    #[serde(default)]
    pub dataset_id: Option<Value>,
    #[serde(default)]
    pub version_id: Option<Value>,
    #[serde(default)]
    pub tier: Option<String>,
    /// `"<dataset>/<version>"`, accepted when `dataset_id` is absent.
    #[serde(default)]
    pub s3_key_prefix: Option<String>,
}

/// A validated dataset id, optionally narrowed to one published version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetId {
    id: u64,
    version: Option<u64>,
}

impl DatasetId {
    pub fn new(id: u64, version: Option<u64>) -> Self {
        Self { id, version }
    }

    /// Parse the legacy `"<dataset>/<version>"` key prefix. A trailing slash is tolerated.
    pub fn from_key_prefix(prefix: &str) -> Result<Self> {
        let trimmed = prefix.trim().strip_suffix('/').unwrap_or(prefix.trim());
        let mut segments = trimmed.split('/');
        let id = match segments.next() {
            Some(segment) => parse_id("s3_key_prefix", segment)?,
            None => return Err(Error::invalid_request("s3_key_prefix is empty")),
        };
        let version = segments
            .next()
            .map(|segment| parse_id("s3_key_prefix", segment))
            .transpose()?;
        if segments.next().is_some() {
            return Err(Error::invalid_request(format!(
                "s3_key_prefix `{prefix}` has more than two segments"
            )));
        }
        Ok(Self { id, version })
    }
}

/// Renders the dataset path used in key templates: `12` or `12/3`.
impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}/{}", self.id, version),
            None => write!(f, "{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub dataset: DatasetId,
    pub tier: Option<String>,
}

impl PurgeRequest {
    pub fn new(dataset: DatasetId) -> Self {
        Self { dataset, tier: None }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }
}

impl TryFrom<PurgeEvent> for PurgeRequest {
    type Error = Error;

    fn try_from(event: PurgeEvent) -> Result<Self> {
        let dataset = match (&event.dataset_id, &event.s3_key_prefix) {
            (Some(id), _) => {
                let id = id_from_value("dataset_id", id)?;
                let version = event
                    .version_id
                    .as_ref()
                    .filter(|v| !v.is_null())
                    .map(|v| id_from_value("version_id", v))
                    .transpose()?;
                DatasetId::new(id, version)
            }
            (None, Some(prefix)) => {
                if event.version_id.as_ref().is_some_and(|v| !v.is_null()) {
                    return Err(Error::invalid_request(
                        "version_id can not be combined with s3_key_prefix",
                    ));
                }
                DatasetId::from_key_prefix(prefix)?
            }
            (None, None) => return Err(Error::invalid_request("missing dataset_id")),
        };

        let tier = match event.tier {
            Some(tier) if tier.trim().is_empty() => {
                return Err(Error::invalid_request("tier must not be empty"))
            }
            tier => tier,
        };

        Ok(Self { dataset, tier })
    }
}

fn id_from_value(field: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            Error::invalid_request(format!("{field} must be a non-negative integer, got {n}"))
        }),
        Value::String(s) => parse_id(field, s),
        Value::Null => Err(Error::invalid_request(format!("missing {field}"))),
        other => Err(Error::invalid_request(format!(
            "{field} must be a number or a string, got {other}"
        ))),
    }
}

fn parse_id(field: &str, raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::invalid_request(format!("{field} is empty")));
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_request(format!(
            "{field} `{raw}` is not numeric"
        )));
    }
    // an id must render back to the exact segment it was parsed from
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(Error::invalid_request(format!(
            "{field} `{raw}` has a leading zero"
        )));
    }
    raw.parse::<u64>()
        .map_err(|err| Error::invalid_request(format!("{field} `{raw}`: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(payload: Value) -> Result<PurgeRequest> {
        let event: PurgeEvent = serde_json::from_value(payload).expect("payload is an object");
        PurgeRequest::try_from(event)
    }

    #[test]
    fn accepts_string_and_numeric_ids() {
        let a = request(json!({"dataset_id": "12345"})).unwrap();
        let b = request(json!({"dataset_id": 12345})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dataset.to_string(), "12345");
    }

    #[test]
    fn version_narrows_the_dataset_path() {
        let req = request(json!({"dataset_id": 1, "version_id": "10", "tier": "prod"})).unwrap();
        assert_eq!(req.dataset.to_string(), "1/10");
        assert_eq!(req.tier.as_deref(), Some("prod"));
    }

    #[test]
    fn legacy_key_prefix_with_trailing_slash() {
        let req = request(json!({"s3_key_prefix": "1/10/", "s3_bucket": "ignored"})).unwrap();
        assert_eq!(req.dataset, DatasetId::new(1, Some(10)));
    }

    #[test]
    fn zero_is_a_valid_id() {
        let req = request(json!({"s3_key_prefix": "0/0"})).unwrap();
        assert_eq!(req.dataset.to_string(), "0/0");
    }

    #[test]
    fn rejects_malformed_ids() {
        for payload in [
            json!({}),
            json!({"dataset_id": ""}),
            json!({"dataset_id": "  "}),
            json!({"dataset_id": "12a"}),
            json!({"dataset_id": -4}),
            json!({"dataset_id": 1.5}),
            json!({"dataset_id": null}),
            json!({"dataset_id": [1]}),
            json!({"dataset_id": 1, "version_id": "x"}),
            json!({"s3_key_prefix": "/"}),
            json!({"s3_key_prefix": "1/2/3"}),
            json!({"s3_key_prefix": "007/1/"}),
            json!({"s3_key_prefix": "7/01"}),
            json!({"dataset_id": "0012345"}),
            json!({"dataset_id": 1, "version_id": "010"}),
            json!({"s3_key_prefix": "1/10", "version_id": 3}),
            json!({"dataset_id": 1, "tier": ""}),
        ] {
            let err = request(payload.clone()).unwrap_err();
            assert!(err.is_invalid_request(), "{payload} gave {err}");
        }
    }
}
