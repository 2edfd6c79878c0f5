use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{Delete, ObjectIdentifier, RequestPayer};
use aws_sdk_s3::Client;

use crate::store::{
    BucketTarget, KeyError, ListPage, ObjectKey, ObjectStore, PageCursor, StoreError, LIST_PAGE_SIZE,
};

/// Turn an SDK failure into a [`StoreError`], keeping the S3 error code when the service sent one.
fn store_error<E>(bucket: &str, err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err.as_service_error() {
        Some(service_err) => StoreError::from_code(
            bucket,
            service_err.code(),
            service_err.message().unwrap_or("no message").to_owned(),
        ),
        None => StoreError::from_code(bucket, None, DisplayErrorContext(&err).to_string()),
    }
}

fn request_payer(target: &BucketTarget) -> Option<RequestPayer> {
    target.requester_pays.then_some(RequestPayer::Requester)
}

async fn list_objects(client: &Client, target: &BucketTarget, cursor: Option<&PageCursor>) -> Result<ListPage, StoreError> {
    let token = match cursor {
        Some(PageCursor::Continuation(token)) => Some(token.clone()),
        _ => None,
    };
    let output = client
        .list_objects_v2()
        .bucket(&target.bucket)
        .prefix(&target.prefix)
        .max_keys(LIST_PAGE_SIZE)
        .set_continuation_token(token)
        .set_request_payer(request_payer(target))
        .send()
        .await
        .map_err(|err| store_error(&target.bucket, err))?;

    let keys = output
        .contents()
        .iter()
        .filter_map(|obj| obj.key())
        .map(ObjectKey::new)
        .collect();
    let next = output
        .next_continuation_token()
        .map(|token| PageCursor::Continuation(token.to_owned()));

    Ok(ListPage { keys, next })
}

/// Every version and delete marker under the prefix, so nothing survives in the bucket's history.
async fn list_versions(client: &Client, target: &BucketTarget, cursor: Option<&PageCursor>) -> Result<ListPage, StoreError> {
    let (key_marker, version_id_marker) = match cursor {
        Some(PageCursor::Versions { key_marker, version_id_marker }) => {
            (Some(key_marker.clone()), version_id_marker.clone())
        }
        _ => (None, None),
    };
    let output = client
        .list_object_versions()
        .bucket(&target.bucket)
        .prefix(&target.prefix)
        .max_keys(LIST_PAGE_SIZE)
        .set_key_marker(key_marker)
        .set_version_id_marker(version_id_marker)
        .set_request_payer(request_payer(target))
        .send()
        .await
        .map_err(|err| store_error(&target.bucket, err))?;

    let versions = output
        .versions()
        .iter()
        .filter_map(|v| Some(versioned_key(v.key()?, v.version_id())));
    let markers = output
        .delete_markers()
        .iter()
        .filter_map(|m| Some(versioned_key(m.key()?, m.version_id())));
    let keys = versions.chain(markers).collect();

    let next = output.next_key_marker().map(|key_marker| PageCursor::Versions {
        key_marker: key_marker.to_owned(),
        version_id_marker: output.next_version_id_marker().map(str::to_owned),
    });

    Ok(ListPage { keys, next })
}

fn versioned_key(key: &str, version_id: Option<&str>) -> ObjectKey {
    match version_id {
        Some(version) => ObjectKey::with_version(key, version),
        None => ObjectKey::new(key),
    }
}

#[async_trait]
impl ObjectStore for Client {
    async fn list_page(&self, target: &BucketTarget, cursor: Option<&PageCursor>) -> Result<ListPage, StoreError> {
        if target.versioned {
            list_versions(self, target, cursor).await
        } else {
            list_objects(self, target, cursor).await
        }
    }

    async fn delete_batch(&self, target: &BucketTarget, keys: &[ObjectKey]) -> Result<Vec<KeyError>, StoreError> {
        let build_error = |err: aws_sdk_s3::error::BuildError| StoreError::from_code(&target.bucket, None, err.to_string());

        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(key.key())
                    .set_version_id(key.version_id().map(str::to_owned))
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;
        // quiet mode: only the failures come back
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(build_error)?;

        let output = self
            .delete_objects()
            .bucket(&target.bucket)
            .delete(delete)
            .set_request_payer(request_payer(target))
            .send()
            .await
            .map_err(|err| store_error(&target.bucket, err))?;

        Ok(output
            .errors()
            .iter()
            .map(|err| KeyError {
                key: err.key().map(|key| versioned_key(key, err.version_id())),
                code: err.code().map(str::to_owned),
                message: err.message().unwrap_or("no message").to_owned(),
            })
            .collect())
    }
}
