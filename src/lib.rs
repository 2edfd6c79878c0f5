//! Removes a published dataset's objects from the publish, embargo and asset
//! buckets.
//!
//! The flow is a lazy paginated listing per bucket ([`source::list_keys`])
//! feeding a batching deleter ([`delete_sink::DeleteSink`]), driven by
//! [`purge`]. Storage failures are collected into the [`PurgeResult`]
//! instead of aborting the run, and running the purge again on a cleaned
//! dataset deletes nothing and succeeds.

pub mod client;
pub mod config;
pub mod delete_sink;
pub mod error;
pub mod purger;
pub mod request;
pub mod result;
pub mod s3_aux;
pub mod source;
pub mod store;

pub use client::get_client;
pub use config::PurgeConfig;
pub use error::{Error, Result};
pub use purger::{purge, purge_event};
pub use request::{DatasetId, PurgeEvent, PurgeRequest};
pub use result::{BucketReport, Failure, FailureKind, PurgeResult};
pub use store::{BucketRole, BucketTarget, KeyError, ListPage, ObjectKey, ObjectStore, PageCursor, StoreError};
