use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Maximum number of keys S3 accepts in a single DeleteObjects request.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Number of keys requested per list page.
pub const LIST_PAGE_SIZE: i32 = 1000;

/// S3 error codes that mean the caller is not allowed to touch the bucket.
const AUTHORIZATION_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "AccountProblem",
    "InvalidToken",
    "ExpiredToken",
];

pub fn is_authorization_code(code: &str) -> bool {
    AUTHORIZATION_CODES.contains(&code)
}

/// Logical role of a bucket in the publishing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketRole {
    Publish,
    Embargo,
    Asset,
}

impl fmt::Display for BucketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BucketRole::Publish => "publish",
            BucketRole::Embargo => "embargo",
            BucketRole::Asset => "asset",
        };
        f.write_str(name)
    }
}

/// A bucket together with the prefix that holds one dataset's objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTarget {
    pub role: BucketRole,
    pub bucket: String,
    pub prefix: String,
    /// list and delete every object version instead of the current objects
    pub versioned: bool,
    pub requester_pays: bool,
}

/// A key in a bucket, pinned to a version when listed from a versioned bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    key: String,
    version_id: Option<String>,
}

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    pub fn with_version(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(version) => write!(f, "{}?versionId={}", self.key, version),
            None => f.write_str(&self.key),
        }
    }
}

/// Where the next list page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// ListObjectsV2 continuation token.
    Continuation(String),
    /// ListObjectVersions key and version-id markers.
    Versions {
        key_marker: String,
        version_id_marker: Option<String>,
    },
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub keys: Vec<ObjectKey>,
    /// `None` once the listing is exhausted.
    pub next: Option<PageCursor>,
}

/// A key the storage service refused to delete inside an otherwise accepted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyError {
    /// `None` when the service did not say which key failed.
    pub key: Option<ObjectKey>,
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("access to bucket `{bucket}` denied: {message}")]
    Authorization {
        bucket: String,
        code: Option<String>,
        message: String,
    },

    #[error("request to bucket `{bucket}` failed: {message}")]
    Service {
        bucket: String,
        code: Option<String>,
        message: String,
    },
}

impl StoreError {
    /// Classify a service failure by its S3 error code.
    pub fn from_code(bucket: &str, code: Option<&str>, message: impl Into<String>) -> Self {
        let bucket = bucket.to_owned();
        let message = message.into();
        match code {
            Some(c) if is_authorization_code(c) => StoreError::Authorization {
                bucket,
                code: Some(c.to_owned()),
                message,
            },
            _ => StoreError::Service {
                bucket,
                code: code.map(str::to_owned),
                message,
            },
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, StoreError::Authorization { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Authorization { code, .. } | StoreError::Service { code, .. } => code.as_deref(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StoreError::Authorization { message, .. } | StoreError::Service { message, .. } => message,
        }
    }
}

/// The two object-storage calls the purger needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys under `target.prefix`, starting at `cursor`
    /// (or at the beginning when `None`).
    async fn list_page(&self, target: &BucketTarget, cursor: Option<&PageCursor>) -> Result<ListPage, StoreError>;

    /// Delete at most [`MAX_DELETE_BATCH`] keys in one request.
    /// Returns the keys that could not be deleted; an `Err` means the request as a whole failed.
    async fn delete_batch(&self, target: &BucketTarget, keys: &[ObjectKey]) -> Result<Vec<KeyError>, StoreError>;
}
