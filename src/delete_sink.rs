use std::collections::BTreeMap;
use std::mem;

use tracing::{debug, warn};

use crate::result::{Failure, FailureKind};
use crate::store::{BucketTarget, KeyError, ObjectKey, ObjectStore, MAX_DELETE_BATCH};

/// What a [`DeleteSink`] did to one bucket.
#[derive(Debug, Default)]
pub struct SinkReport {
    pub deleted: usize,
    pub batches: usize,
    /// keys that are still present after their last delete attempt
    pub failures: BTreeMap<ObjectKey, Failure>,
    /// per-key errors that named no key of the batch they came back for
    pub unmatched: Vec<Failure>,
}

/// Collects keys and deletes them in batches of at most `batch_size`.
///
/// The buffer carries over between list pages, so `n` keys always cost
/// `ceil(n / batch_size)` delete requests. A failing batch is recorded and
/// never stops the next one.
pub struct DeleteSink<'a, S: ?Sized> {
    store: &'a S,
    target: &'a BucketTarget,
    batch_size: usize,
    buffer: Vec<ObjectKey>,
    report: SinkReport,
}

impl<'a, S> DeleteSink<'a, S>
where
    S: ObjectStore + ?Sized,
{
    pub fn new(store: &'a S, target: &'a BucketTarget, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, MAX_DELETE_BATCH);
        Self {
            store,
            target,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            report: SinkReport::default(),
        }
    }

    /// Queue a key, sending a batch once the buffer is full.
    pub async fn push(&mut self, key: ObjectKey) {
        self.buffer.push(key);
        if self.buffer.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Delete whatever is buffered.
    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        self.report.batches += 1;

        debug!(
            bucket = %self.target.bucket,
            batch = self.report.batches,
            keys = batch.len(),
            "sending batch delete"
        );

        match self.store.delete_batch(self.target, &batch).await {
            Ok(errors) => self.record_batch(batch, errors),
            Err(err) => {
                warn!(
                    bucket = %self.target.bucket,
                    keys = batch.len(),
                    error = %err,
                    "batch delete request failed"
                );
                let kind = FailureKind::for_delete(&err);
                for key in batch {
                    let failure = Failure::for_key(self.target, &key, kind, err.code(), err.message());
                    self.report.failures.insert(key, failure);
                }
            }
        }
    }

    /// Flush the remaining keys and hand back the report.
    pub async fn close(mut self) -> SinkReport {
        self.flush().await;
        self.report
    }

    fn record_batch(&mut self, batch: Vec<ObjectKey>, errors: Vec<KeyError>) {
        let mut keyless = Vec::new();
        let mut errors: BTreeMap<ObjectKey, KeyError> = errors
            .into_iter()
            .filter_map(|err| match err.key.clone() {
                Some(key) => Some((key, err)),
                None => {
                    keyless.push(err);
                    None
                }
            })
            .collect();

        for key in batch {
            match errors.remove(&key) {
                Some(err) => {
                    warn!(
                        bucket = %self.target.bucket,
                        key = %key,
                        code = err.code.as_deref().unwrap_or("unknown"),
                        message = %err.message,
                        "object failed in batch delete"
                    );
                    let kind = FailureKind::for_key_code(err.code.as_deref());
                    let failure = Failure::for_key(self.target, &key, kind, err.code.as_deref(), &err.message);
                    self.report.failures.insert(key, failure);
                }
                None => {
                    self.report.failures.remove(&key);
                    self.report.deleted += 1;
                }
            }
        }

        for err in keyless.into_iter().chain(errors.into_values()) {
            warn!(
                bucket = %self.target.bucket,
                key = ?err.key,
                code = err.code.as_deref().unwrap_or("unknown"),
                message = %err.message,
                "batch delete error for a key outside the batch"
            );
            let kind = FailureKind::for_key_code(err.code.as_deref());
            let failure = match &err.key {
                Some(key) => Failure::for_key(self.target, key, kind, err.code.as_deref(), &err.message),
                None => Failure::for_bucket(self.target, kind, err.code.as_deref(), &err.message),
            };
            self.report.unmatched.push(failure);
        }
    }
}
