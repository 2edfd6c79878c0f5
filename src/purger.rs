use std::pin::pin;
use std::time::Instant;

use futures::future::join_all;
use futures::TryStreamExt;
use tracing::{info, warn};

use crate::config::PurgeConfig;
use crate::delete_sink::DeleteSink;
use crate::error::Result;
use crate::request::{PurgeEvent, PurgeRequest};
use crate::result::{BucketReport, Failure, FailureKind, PurgeResult};
use crate::source;
use crate::store::{BucketTarget, ObjectStore, StoreError};

/// Parse an invocation payload and purge the dataset it names.
///
/// A malformed payload fails with [`Error::InvalidRequest`](crate::Error::InvalidRequest)
/// before the store is called.
pub async fn purge_event<S>(store: &S, config: &PurgeConfig, event: PurgeEvent) -> Result<PurgeResult>
where
    S: ObjectStore + ?Sized,
{
    let request = PurgeRequest::try_from(event)?;
    purge(store, config, &request).await
}

/// Delete every object of the requested dataset from every configured bucket.
///
/// Only an invalid request is returned as an error. Storage failures are
/// collected into the result and the remaining batches and buckets are still
/// attempted.
pub async fn purge<S>(store: &S, config: &PurgeConfig, request: &PurgeRequest) -> Result<PurgeResult>
where
    S: ObjectStore + ?Sized,
{
    let targets = config.targets(request)?;
    let start = Instant::now();

    let reports = join_all(
        targets
            .iter()
            .map(|target| purge_target(store, target, config.batch_size, config.listing_attempts)),
    )
    .await;

    let result = PurgeResult::new(request.dataset.to_string(), reports);
    info!(
        dataset = %result.dataset,
        deleted = result.deleted,
        failures = result.failures.len(),
        success = result.success,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "purge finished"
    );
    Ok(result)
}

async fn purge_target<S>(store: &S, target: &BucketTarget, batch_size: usize, max_attempts: usize) -> (BucketReport, Vec<Failure>)
where
    S: ObjectStore + ?Sized,
{
    info!(
        role = %target.role,
        bucket = %target.bucket,
        prefix = %target.prefix,
        versioned = target.versioned,
        "deleting objects"
    );

    let mut sink = DeleteSink::new(store, target, batch_size);
    let mut attempts = 0;
    let mut listing_error = None;

    loop {
        attempts += 1;
        match drain_listing(store, target, &mut sink).await {
            Ok(()) => break,
            Err(err) => {
                // keys enumerated before the failure still get their delete attempt
                sink.flush().await;
                if err.is_authorization() || attempts >= max_attempts {
                    warn!(bucket = %target.bucket, attempts, error = %err, "giving up on bucket listing");
                    listing_error = Some(err);
                    break;
                }
                warn!(bucket = %target.bucket, attempts, error = %err, "listing failed, restarting from the first page");
            }
        }
    }

    let report = sink.close().await;
    let mut failures: Vec<Failure> = report.failures.into_values().chain(report.unmatched).collect();
    if let Some(err) = &listing_error {
        failures.push(Failure::for_bucket(
            target,
            FailureKind::for_listing(err),
            err.code(),
            err.message(),
        ));
    }

    info!(
        bucket = %target.bucket,
        deleted = report.deleted,
        batches = report.batches,
        failures = failures.len(),
        "bucket done"
    );

    let bucket_report = BucketReport {
        role: target.role,
        bucket: target.bucket.clone(),
        prefix: target.prefix.clone(),
        deleted: report.deleted,
        batches: report.batches,
        listing_attempts: attempts,
        failed: listing_error.is_some(),
    };
    (bucket_report, failures)
}

/// Run one full listing of the prefix, feeding every key into the sink.
async fn drain_listing<S>(store: &S, target: &BucketTarget, sink: &mut DeleteSink<'_, S>) -> Result<(), StoreError>
where
    S: ObjectStore + ?Sized,
{
    let mut pages = pin!(source::list_keys(store, target));
    while let Some(keys) = pages.try_next().await? {
        for key in keys {
            sink.push(key).await;
        }
    }
    Ok(())
}
