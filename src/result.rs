use serde::Serialize;

use crate::store::{is_authorization_code, BucketRole, BucketTarget, ObjectKey, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// the listing of a bucket could not be completed
    Listing,
    /// a key could not be deleted
    Delete,
    /// permission denied on the bucket
    Authorization,
}

impl FailureKind {
    pub fn for_listing(err: &StoreError) -> Self {
        if err.is_authorization() {
            FailureKind::Authorization
        } else {
            FailureKind::Listing
        }
    }

    pub fn for_delete(err: &StoreError) -> Self {
        if err.is_authorization() {
            FailureKind::Authorization
        } else {
            FailureKind::Delete
        }
    }

    /// Kind of a per-key error reported inside a DeleteObjects response.
    pub fn for_key_code(code: Option<&str>) -> Self {
        match code {
            Some(code) if is_authorization_code(code) => FailureKind::Authorization,
            _ => FailureKind::Delete,
        }
    }
}

/// One thing that was not cleaned up. `key` is `None` for bucket-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub bucket: String,
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub kind: FailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl Failure {
    pub fn for_key(target: &BucketTarget, key: &ObjectKey, kind: FailureKind, code: Option<&str>, message: &str) -> Self {
        Self {
            bucket: target.bucket.clone(),
            key: Some(key.key().to_owned()),
            version_id: key.version_id().map(str::to_owned),
            kind,
            code: code.map(str::to_owned),
            message: message.to_owned(),
        }
    }

    pub fn for_bucket(target: &BucketTarget, kind: FailureKind, code: Option<&str>, message: &str) -> Self {
        Self {
            bucket: target.bucket.clone(),
            key: None,
            version_id: None,
            kind,
            code: code.map(str::to_owned),
            message: message.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketReport {
    pub role: BucketRole,
    pub bucket: String,
    pub prefix: String,
    pub deleted: usize,
    /// batch-delete requests sent
    pub batches: usize,
    pub listing_attempts: usize,
    /// the listing never completed, so keys may remain that were not even enumerated
    pub failed: bool,
}

/// Outcome of one purge invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeResult {
    /// dataset path, `12` or `12/3`
    pub dataset: String,
    pub deleted: usize,
    pub success: bool,
    pub buckets: Vec<BucketReport>,
    pub failures: Vec<Failure>,
}

impl PurgeResult {
    pub fn new(dataset: String, reports: Vec<(BucketReport, Vec<Failure>)>) -> Self {
        let mut buckets = Vec::with_capacity(reports.len());
        let mut failures = Vec::new();
        for (report, bucket_failures) in reports {
            buckets.push(report);
            failures.extend(bucket_failures);
        }
        let deleted = buckets.iter().map(|b| b.deleted).sum();
        let success = failures.is_empty() && !buckets.iter().any(|b| b.failed);
        Self {
            dataset,
            deleted,
            success,
            buckets,
            failures,
        }
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketReport> {
        self.buckets.iter().find(|b| b.bucket == name)
    }
}
