//! Upload orchestration
//!
//! The object-level dispatcher, the multi-part session state machine, and
//! the per-object state record they both write into.

mod multipart;
mod state;
mod uploader;

pub use multipart::{MultipartUpload, PartOutcome};
pub use state::UploadState;
pub use uploader::{UploadOutcome, Uploader};

use std::future::Future;
use std::time::Duration;

use aws_sdk_s3::operation::get_object_attributes::GetObjectAttributesOutput;
use aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder;
use aws_sdk_s3::operation::upload_part::builders::UploadPartFluentBuilder;
use aws_sdk_s3::types::builders::CompletedPartBuilder;
use aws_sdk_s3::types::ObjectAttributes;
use aws_sdk_s3::Client;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Result, UploadError};
use crate::hash::{ChecksumAlgorithm, RequestChecksums};

/// Fetches the server-side attributes recorded in the manifest for a
/// finished object: ETag, checksum, object parts, and object size.
///
/// Some servers reject the attribute list when the SDK splits it across
/// multiple header lines, so the values are merged client-side into one
/// comma-separated header before the request is signed.
pub(crate) async fn fetch_object_attributes(
    client: &Client,
    bucket: &str,
    key: &str,
    max_parts: i32,
) -> Result<GetObjectAttributesOutput> {
    debug!("fetching attributes for object {}/{}", bucket, key);

    client
        .get_object_attributes()
        .bucket(bucket)
        .key(key)
        .max_parts(max_parts)
        .object_attributes(ObjectAttributes::Etag)
        .object_attributes(ObjectAttributes::Checksum)
        .object_attributes(ObjectAttributes::ObjectParts)
        .object_attributes(ObjectAttributes::ObjectSize)
        .customize()
        .mutate_request(|request| {
            const HEADER: &str = "x-amz-object-attributes";
            let merged = request.headers().get_all(HEADER).collect::<Vec<_>>().join(",");
            if !merged.is_empty() {
                request.headers_mut().insert(HEADER, merged);
            }
        })
        .send()
        .await
        .map_err(|err| UploadError::ObjectAttributes(Box::new(err)))
}

/// Stamps the Content-MD5 and algorithm checksum fields onto a PutObject
/// request.
pub(crate) fn stamp_put_object(
    builder: PutObjectFluentBuilder,
    sums: &RequestChecksums,
) -> PutObjectFluentBuilder {
    let builder = builder.content_md5(sums.content_md5.clone());
    match sums.algorithm {
        ChecksumAlgorithm::Sha256 => builder.checksum_sha256(sums.checksum.clone()),
        ChecksumAlgorithm::Sha1 => builder.checksum_sha1(sums.checksum.clone()),
        ChecksumAlgorithm::Crc32C => builder.checksum_crc32_c(sums.checksum.clone()),
        ChecksumAlgorithm::Crc32 => builder.checksum_crc32(sums.checksum.clone()),
        ChecksumAlgorithm::Md5 => builder,
    }
}

/// Stamps the Content-MD5 and algorithm checksum fields onto an
/// UploadPart request.
pub(crate) fn stamp_upload_part(
    builder: UploadPartFluentBuilder,
    sums: &RequestChecksums,
) -> UploadPartFluentBuilder {
    let builder = builder.content_md5(sums.content_md5.clone());
    match sums.algorithm {
        ChecksumAlgorithm::Sha256 => builder.checksum_sha256(sums.checksum.clone()),
        ChecksumAlgorithm::Sha1 => builder.checksum_sha1(sums.checksum.clone()),
        ChecksumAlgorithm::Crc32C => builder.checksum_crc32_c(sums.checksum.clone()),
        ChecksumAlgorithm::Crc32 => builder.checksum_crc32(sums.checksum.clone()),
        ChecksumAlgorithm::Md5 => builder,
    }
}

/// Stamps the algorithm checksum field onto a CompletedPart record.
pub(crate) fn stamp_completed_part(
    builder: CompletedPartBuilder,
    algorithm: ChecksumAlgorithm,
    checksum: String,
) -> CompletedPartBuilder {
    match algorithm {
        ChecksumAlgorithm::Sha256 => builder.checksum_sha256(checksum),
        ChecksumAlgorithm::Sha1 => builder.checksum_sha1(checksum),
        ChecksumAlgorithm::Crc32C => builder.checksum_crc32_c(checksum),
        ChecksumAlgorithm::Crc32 => builder.checksum_crc32(checksum),
        ChecksumAlgorithm::Md5 => builder,
    }
}

/// Runs a future under an optional deadline. A zero timeout means no
/// deadline; expiry maps to the distinguished timeout error.
pub(crate) async fn deadline<T, F>(timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return future.await;
    }

    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(UploadError::Timeout { limit: timeout }),
    }
}

/// Counts submitted-but-unfinished work items and lets waiters block
/// until the count drains to zero.
#[derive(Clone)]
pub(crate) struct PendingCounter {
    count: watch::Sender<usize>,
}

impl PendingCounter {
    pub(crate) fn new() -> Self {
        let (count, _) = watch::channel(0);
        PendingCounter { count }
    }

    pub(crate) fn add(&self) {
        self.count.send_modify(|n| *n += 1);
    }

    pub(crate) fn done(&self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Resolves once the pending count reaches zero.
    pub(crate) async fn drained(&self) {
        let mut receiver = self.count.subscribe();
        // we hold the sender, so wait_for cannot fail
        let _ = receiver.wait_for(|n| *n == 0).await;
    }
}
