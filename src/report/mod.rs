//! Upload outcome reporting
//!
//! Projects a terminal [`UploadState`] into a serializable record:
//! locally computed checksums, the server-returned object attributes, and
//! one named field per failure category.

mod manifest;

pub use manifest::{ManifestFormat, ManifestWriter};

use std::str::FromStr;
use std::sync::Arc;

use aws_sdk_s3::operation::get_object_attributes::GetObjectAttributesOutput;
use aws_sdk_s3::types::Checksum as AwsChecksum;
use aws_sdk_s3::types::ObjectPart as AwsObjectPart;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::UploadError;
use crate::hash::{Base64Sum, ChecksumAlgorithm, HashSum, ObjectHasher};
use crate::upload::UploadState;

/// A serializable record of one object upload's outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectReport {
    pub bucket: String,
    pub key: String,
    /// Present only for multi-part sessions that reached neither terminal
    /// transition; these still hold server-side storage.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub upload_id: String,
    pub completed: bool,
    pub aborted: bool,
    /// Locally computed whole-body and composite checksums.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_checksums: Option<ObjectChecksums>,
    /// The single algorithm checksum the server stores for the object:
    /// the whole-body digest for single-part objects, the composite for
    /// multi-part ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_checksum: Option<ObjectChecksums>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_attributes: Option<ObjectAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ObjectErrors>,
}

impl ObjectReport {
    /// Projects a terminal upload state into a report record.
    pub fn new(state: &UploadState) -> Result<Self, Arc<UploadError>> {
        struct Snapshot {
            bucket: String,
            key: String,
            upload_id: String,
            is_put: bool,
            is_multipart: bool,
            completed: bool,
            aborted: bool,
            part_errors: Vec<UploadPartError>,
            put_error: String,
            complete_error: String,
            abort_error: String,
            attributes_error: Option<Arc<UploadError>>,
            attributes_output: Option<GetObjectAttributesOutput>,
        }

        let snap = state.with_inner(|inner| {
            let is_put = inner.is_put;
            let is_multipart = inner.create_output.is_some();

            let completed = (is_put && inner.put_output.is_some() && inner.put_error.is_none())
                || (is_multipart
                    && inner.complete_output.is_some()
                    && inner.complete_error.is_none());

            let aborted = (is_put && inner.put_error.is_some())
                || (is_multipart && inner.abort_output.is_some() && inner.abort_error.is_none());

            let upload_id = if is_multipart && !(completed || aborted) {
                inner.upload_id.clone().unwrap_or_default()
            } else {
                String::new()
            };

            let mut part_errors: Vec<UploadPartError> = inner
                .part_errors
                .iter()
                .map(|(part_number, err)| UploadPartError {
                    part_number: *part_number,
                    error: err.to_string(),
                })
                .collect();
            part_errors.sort_unstable_by_key(|err| err.part_number);

            Snapshot {
                bucket: inner.bucket.clone(),
                key: inner.key.clone(),
                upload_id,
                is_put,
                is_multipart,
                completed,
                aborted,
                part_errors,
                put_error: error_string(&inner.put_error),
                complete_error: error_string(&inner.complete_error),
                abort_error: error_string(&inner.abort_error),
                attributes_error: inner.attributes_error.clone(),
                attributes_output: inner.attributes_output.clone(),
            }
        });

        if !snap.is_put && !snap.is_multipart {
            return Err(Arc::new(UploadError::InvalidManifest {
                reason: "upload state is neither a put-object nor a multi-part object".to_string(),
            }));
        }

        let mut full_checksums = None;
        let mut object_checksum = None;
        let mut object_attributes = None;

        if snap.completed {
            if let Some(err) = snap.attributes_error {
                return Err(err);
            }

            let hasher = state.hasher().lock();
            full_checksums = Some(ObjectChecksums::from_hasher(&hasher));

            object_checksum = Some(if hasher.count() == 1 {
                ObjectChecksums::for_algorithm(hasher.algorithm(), hasher.sum())
            } else {
                ObjectChecksums::for_algorithm(hasher.algorithm(), hasher.sum_of_sums())
            });

            let output = snap.attributes_output.as_ref().ok_or_else(|| {
                Arc::new(UploadError::InvalidManifest {
                    reason: "completed upload is missing its object attributes".to_string(),
                })
            })?;
            object_attributes = Some(ObjectAttributes::from_output(&hasher, output)?);
        }

        let errors = ObjectErrors {
            put_object_error: snap.put_error,
            upload_part_errors: snap.part_errors,
            complete_multipart_upload_error: snap.complete_error,
            abort_multipart_upload_error: snap.abort_error,
            get_object_attributes_error: state
                .with_inner(|inner| error_string(&inner.attributes_error)),
        };
        let errors = if errors.is_empty() { None } else { Some(errors) };

        Ok(ObjectReport {
            bucket: snap.bucket,
            key: snap.key,
            upload_id: snap.upload_id,
            completed: snap.completed,
            aborted: snap.aborted,
            full_checksums,
            object_checksum,
            object_attributes,
            errors,
        })
    }
}

/// Human-readable renderings of one checksum.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectChecksum {
    pub hex: String,
    pub base64: String,
}

impl ObjectChecksum {
    pub fn new(sum: &HashSum) -> Self {
        ObjectChecksum {
            hex: sum.hex(),
            base64: sum.base64(),
        }
    }
}

/// One checksum per algorithm, with unset algorithms omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectChecksums {
    #[serde(rename = "ChecksumMD5", skip_serializing_if = "Option::is_none")]
    pub checksum_md5: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumCRC32", skip_serializing_if = "Option::is_none")]
    pub checksum_crc32: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumCRC32C", skip_serializing_if = "Option::is_none")]
    pub checksum_crc32c: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumSHA1", skip_serializing_if = "Option::is_none")]
    pub checksum_sha1: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumSHA256", skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<ObjectChecksum>,
}

impl ObjectChecksums {
    /// A record holding `sum` in the field for `algorithm`.
    pub fn for_algorithm(algorithm: ChecksumAlgorithm, sum: HashSum) -> Self {
        let mut checksums = ObjectChecksums::default();
        checksums.set(algorithm, ObjectChecksum::new(&sum));
        checksums
    }

    /// The locally computed whole-body checksums: MD5 plus the selected
    /// algorithm.
    pub fn from_hasher(hasher: &ObjectHasher) -> Self {
        let mut checksums = ObjectChecksums::default();
        checksums.checksum_md5 = Some(ObjectChecksum::new(&hasher.md5_sum()));
        checksums.set(hasher.algorithm(), ObjectChecksum::new(&hasher.sum()));
        checksums
    }

    /// Decodes a server-returned attribute checksum block.
    pub fn from_attributes(checksum: &AwsChecksum) -> Result<Self, Arc<UploadError>> {
        let (algorithm, encoded) = if let Some(value) = checksum.checksum_crc32() {
            (ChecksumAlgorithm::Crc32, value)
        } else if let Some(value) = checksum.checksum_crc32_c() {
            (ChecksumAlgorithm::Crc32C, value)
        } else if let Some(value) = checksum.checksum_sha1() {
            (ChecksumAlgorithm::Sha1, value)
        } else if let Some(value) = checksum.checksum_sha256() {
            (ChecksumAlgorithm::Sha256, value)
        } else {
            return Err(Arc::new(UploadError::InvalidManifest {
                reason: format!("unknown checksum block: {checksum:?}"),
            }));
        };

        let sum = Base64Sum::from_str(encoded).map_err(|err| {
            Arc::new(UploadError::InvalidManifest {
                reason: format!("error decoding checksum {encoded:?}: {err}"),
            })
        })?;

        Ok(Self::for_algorithm(algorithm, sum.0))
    }

    fn set(&mut self, algorithm: ChecksumAlgorithm, checksum: ObjectChecksum) {
        match algorithm {
            ChecksumAlgorithm::Md5 => self.checksum_md5 = Some(checksum),
            ChecksumAlgorithm::Crc32 => self.checksum_crc32 = Some(checksum),
            ChecksumAlgorithm::Crc32C => self.checksum_crc32c = Some(checksum),
            ChecksumAlgorithm::Sha1 => self.checksum_sha1 = Some(checksum),
            ChecksumAlgorithm::Sha256 => self.checksum_sha256 = Some(checksum),
        }
    }
}

/// The server-side metadata captured after a completed upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_marker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ObjectChecksums>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_parts: Option<ObjectPartAttributes>,
}

impl ObjectAttributes {
    pub fn from_output(
        hasher: &ObjectHasher,
        output: &GetObjectAttributesOutput,
    ) -> Result<Self, Arc<UploadError>> {
        let checksum = match output.checksum() {
            Some(checksum) => Some(ObjectChecksums::from_attributes(checksum)?),
            None => None,
        };

        Ok(ObjectAttributes {
            delete_marker: output.delete_marker(),
            version_id: output.version_id().map(str::to_string),
            last_modified: output
                .last_modified()
                .and_then(|dt| dt.to_chrono_utc().ok()),
            e_tag: output.e_tag().map(str::to_string),
            checksum,
            object_parts: output
                .object_parts()
                .map(|parts| ObjectPartAttributes::from_parts(hasher, parts)),
        })
    }
}

/// The per-part attribute listing for a multi-part object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectPartAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_parts_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<ObjectPartReport>>,
}

impl ObjectPartAttributes {
    fn from_parts(
        hasher: &ObjectHasher,
        parts: &aws_sdk_s3::types::GetObjectAttributesParts,
    ) -> Self {
        let reported: Vec<ObjectPartReport> = parts
            .parts()
            .iter()
            .filter(|part| part.part_number().is_some())
            .map(|part| ObjectPartReport::from_part(hasher, part))
            .collect();

        ObjectPartAttributes {
            is_truncated: parts.is_truncated(),
            total_parts_count: parts.total_parts_count(),
            parts: (!reported.is_empty()).then_some(reported),
        }
    }
}

/// One part as the server reports it, with the locally computed MD5
/// alongside the server checksums.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectPartReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(rename = "ChecksumCRC32", skip_serializing_if = "Option::is_none")]
    pub checksum_crc32: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumCRC32C", skip_serializing_if = "Option::is_none")]
    pub checksum_crc32c: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumSHA1", skip_serializing_if = "Option::is_none")]
    pub checksum_sha1: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumSHA256", skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<ObjectChecksum>,
    #[serde(rename = "ChecksumMD5", skip_serializing_if = "Option::is_none")]
    pub checksum_md5: Option<ObjectChecksum>,
}

impl ObjectPartReport {
    fn from_part(hasher: &ObjectHasher, part: &AwsObjectPart) -> Self {
        // a server checksum that fails to decode as base64 violates the
        // protocol contract and cannot be reported meaningfully
        let decode = |value: Option<&str>| {
            value.map(|value| {
                let sum = Base64Sum::from_str(value).unwrap_or_else(|err| {
                    panic!("invalid base64 checksum returned by server: {value}: {err}")
                });
                ObjectChecksum::new(&sum.0)
            })
        };

        let checksum_md5 = part
            .part_number()
            .map(|part_number| ObjectChecksum::new(&hasher.md5_part_sum(part_number)));

        ObjectPartReport {
            part_number: part.part_number(),
            size: part.size(),
            checksum_crc32: decode(part.checksum_crc32()),
            checksum_crc32c: decode(part.checksum_crc32_c()),
            checksum_sha1: decode(part.checksum_sha1()),
            checksum_sha256: decode(part.checksum_sha256()),
            checksum_md5,
        }
    }
}

/// An error recorded for one uploaded part. Part numbers use the wire
/// protocol's 1-indexed convention.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadPartError {
    pub part_number: i32,
    pub error: String,
}

/// Every failure recorded in an upload state, one named field per
/// category. The whole block is omitted from reports when empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectErrors {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub put_object_error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upload_part_errors: Vec<UploadPartError>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub complete_multipart_upload_error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub abort_multipart_upload_error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub get_object_attributes_error: String,
}

impl ObjectErrors {
    pub fn is_empty(&self) -> bool {
        self.put_object_error.is_empty()
            && self.upload_part_errors.is_empty()
            && self.complete_multipart_upload_error.is_empty()
            && self.abort_multipart_upload_error.is_empty()
            && self.get_object_attributes_error.is_empty()
    }
}

fn error_string(error: &Option<Arc<UploadError>>) -> String {
    error.as_ref().map(|err| err.to_string()).unwrap_or_default()
}
