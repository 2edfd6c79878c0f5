use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use dataset_purger::config::{with_defaults, Settings};
use dataset_purger::{BucketTarget, KeyError, ListPage, ObjectKey, ObjectStore, PageCursor, PurgeConfig, StoreError};

pub const PUBLISH_BUCKET: &str = "test-discover-publish";
pub const EMBARGO_BUCKET: &str = "test-discover-embargo";
pub const ASSET_BUCKET: &str = "test-discover-assets";

/// A store call, as seen by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { bucket: String, prefix: String, requester_pays: bool },
    Delete { bucket: String, keys: usize, requester_pays: bool },
}

/// Fail listing page `at_page` of a bucket `times` times.
struct ListingFault {
    at_page: usize,
    times: usize,
    code: &'static str,
}

/// An in-memory bucket store with S3-like paging and fault injection.
pub struct MemoryStore {
    page_size: usize,
    buckets: Mutex<HashMap<String, BTreeSet<ObjectKey>>>,
    calls: Mutex<Vec<Call>>,
    listing_faults: Mutex<HashMap<String, ListingFault>>,
    pages_served: Mutex<HashMap<String, usize>>,
    locked_keys: Mutex<HashSet<String>>,
    denied_buckets: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            buckets: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            listing_faults: Mutex::new(HashMap::new()),
            pages_served: Mutex::new(HashMap::new()),
            locked_keys: Mutex::new(HashSet::new()),
            denied_buckets: Mutex::new(HashSet::new()),
        }
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.lock().unwrap().entry(bucket.to_owned()).or_default();
    }

    pub fn put(&self, bucket: &str, key: impl Into<String>) {
        self.put_key(bucket, ObjectKey::new(key));
    }

    pub fn put_key(&self, bucket: &str, key: ObjectKey) {
        self.buckets.lock().unwrap().entry(bucket.to_owned()).or_default().insert(key);
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|keys| keys.iter().map(|k| k.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self, bucket: &str) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { bucket: b, keys, .. } if b == bucket => Some(keys),
                _ => None,
            })
            .collect()
    }

    pub fn fail_listing(&self, bucket: &str, at_page: usize, times: usize) {
        self.listing_faults.lock().unwrap().insert(
            bucket.to_owned(),
            ListingFault { at_page, times, code: "InternalError" },
        );
    }

    pub fn deny(&self, bucket: &str) {
        self.denied_buckets.lock().unwrap().insert(bucket.to_owned());
    }

    pub fn lock_key(&self, key: &str) {
        self.locked_keys.lock().unwrap().insert(key.to_owned());
    }

    pub fn unlock_key(&self, key: &str) {
        self.locked_keys.lock().unwrap().remove(key);
    }

    fn check_access(&self, bucket: &str) -> Result<(), StoreError> {
        if self.denied_buckets.lock().unwrap().contains(bucket) {
            return Err(StoreError::from_code(bucket, Some("AccessDenied"), "Access Denied"));
        }
        if !self.buckets.lock().unwrap().contains_key(bucket) {
            return Err(StoreError::from_code(
                bucket,
                Some("NoSuchBucket"),
                "The specified bucket does not exist",
            ));
        }
        Ok(())
    }
}

/// Position of the last key of a page, packed into a cursor.
fn cursor_for(key: &ObjectKey, versioned: bool) -> PageCursor {
    if versioned {
        PageCursor::Versions {
            key_marker: key.key().to_owned(),
            version_id_marker: key.version_id().map(str::to_owned),
        }
    } else {
        PageCursor::Continuation(key.key().to_owned())
    }
}

fn key_after_cursor(key: &ObjectKey, cursor: Option<&PageCursor>) -> bool {
    match cursor {
        None => true,
        Some(PageCursor::Continuation(last)) => key.key() > last.as_str(),
        Some(PageCursor::Versions { key_marker, version_id_marker }) => {
            let last = match version_id_marker {
                Some(v) => ObjectKey::with_version(key_marker.clone(), v.clone()),
                None => ObjectKey::new(key_marker.clone()),
            };
            *key > last
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(&self, target: &BucketTarget, cursor: Option<&PageCursor>) -> Result<ListPage, StoreError> {
        self.calls.lock().unwrap().push(Call::List {
            bucket: target.bucket.clone(),
            prefix: target.prefix.clone(),
            requester_pays: target.requester_pays,
        });
        self.check_access(&target.bucket)?;

        // a listing without cursor starts over at page 0
        let page_index = {
            let mut served = self.pages_served.lock().unwrap();
            let count = served.entry(target.bucket.clone()).or_default();
            if cursor.is_none() {
                *count = 0;
            }
            *count += 1;
            *count - 1
        };
        if let Some(fault) = self.listing_faults.lock().unwrap().get_mut(&target.bucket) {
            if fault.times > 0 && fault.at_page == page_index {
                fault.times -= 1;
                return Err(StoreError::from_code(&target.bucket, Some(fault.code), "We encountered an internal error"));
            }
        }

        let buckets = self.buckets.lock().unwrap();
        let remaining: Vec<ObjectKey> = buckets[&target.bucket]
            .iter()
            .filter(|k| k.key().starts_with(&target.prefix))
            .filter(|k| target.versioned || k.version_id().is_none())
            .filter(|k| key_after_cursor(k, cursor))
            .cloned()
            .collect();

        let page: Vec<ObjectKey> = remaining.iter().take(self.page_size).cloned().collect();
        let next = if remaining.len() > self.page_size {
            page.last().map(|last| cursor_for(last, target.versioned))
        } else {
            None
        };
        Ok(ListPage { keys: page, next })
    }

    async fn delete_batch(&self, target: &BucketTarget, keys: &[ObjectKey]) -> Result<Vec<KeyError>, StoreError> {
        self.calls.lock().unwrap().push(Call::Delete {
            bucket: target.bucket.clone(),
            keys: keys.len(),
            requester_pays: target.requester_pays,
        });
        assert!(keys.len() <= 1000, "S3 rejects batches over 1000 keys");
        self.check_access(&target.bucket)?;

        let locked = self.locked_keys.lock().unwrap();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(target.bucket.clone()).or_default();
        let mut errors = Vec::new();
        for key in keys {
            if locked.contains(key.key()) {
                errors.push(KeyError {
                    key: Some(key.clone()),
                    code: Some("InternalError".to_owned()),
                    message: "We encountered an internal error".to_owned(),
                });
            } else {
                bucket.remove(key);
            }
        }
        Ok(errors)
    }
}

/// Configuration with all three test buckets and default key templates.
pub fn purge_config() -> PurgeConfig {
    purge_config_with(&[])
}

pub fn purge_config_with(overrides: &[(&str, &str)]) -> PurgeConfig {
    let mut builder = with_defaults(config::Config::builder())
        .unwrap()
        .set_override("publish_bucket", PUBLISH_BUCKET)
        .unwrap()
        .set_override("embargo_bucket", EMBARGO_BUCKET)
        .unwrap()
        .set_override("asset_bucket", ASSET_BUCKET)
        .unwrap();
    for (key, value) in overrides {
        builder = builder.set_override(*key, *value).unwrap();
    }
    PurgeConfig::try_from(Settings::from_builder(builder).unwrap()).unwrap()
}

/// A store with the three configured buckets, all empty.
pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    for bucket in [PUBLISH_BUCKET, EMBARGO_BUCKET, ASSET_BUCKET] {
        store.create_bucket(bucket);
    }
    store
}
