//! Per-object upload state
//!
//! One record per attempted object, carrying everything needed to reason
//! about the outcome: the wire responses and errors of every operation,
//! keyed per part for the multi-part path, plus the hasher that observed
//! the body bytes. All access goes through the state's mutex.

use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadOutput;
use aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadOutput;
use aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadOutput;
use aws_sdk_s3::operation::get_object_attributes::GetObjectAttributesOutput;
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::operation::upload_part::UploadPartOutput;
use aws_sdk_s3::types::CompletedPart;
use parking_lot::Mutex;

use crate::error::{Result, UploadError};
use crate::hash::SharedHasher;
use crate::upload::stamp_completed_part;

/// Tracks the state of an attempt to create an object or a multi-part
/// object.
#[derive(Debug)]
pub struct UploadState {
    hasher: SharedHasher,
    inner: Mutex<StateInner>,
}

#[derive(Default, Debug)]
pub(crate) struct StateInner {
    pub(crate) bucket: String,
    pub(crate) key: String,

    /// true when this state belongs to the single-shot path
    pub(crate) is_put: bool,
    pub(crate) put_output: Option<PutObjectOutput>,
    pub(crate) put_error: Option<Arc<UploadError>>,

    pub(crate) upload_id: Option<String>,
    pub(crate) create_output: Option<CreateMultipartUploadOutput>,

    pub(crate) part_outputs: HashMap<i32, UploadPartOutput>,
    pub(crate) part_errors: HashMap<i32, Arc<UploadError>>,

    pub(crate) complete_output: Option<CompleteMultipartUploadOutput>,
    pub(crate) complete_error: Option<Arc<UploadError>>,

    pub(crate) abort_output: Option<AbortMultipartUploadOutput>,
    pub(crate) abort_error: Option<Arc<UploadError>>,

    pub(crate) attributes_output: Option<GetObjectAttributesOutput>,
    pub(crate) attributes_error: Option<Arc<UploadError>>,
}

impl UploadState {
    /// State for a single-shot PutObject attempt.
    pub(crate) fn for_put_object(bucket: &str, key: &str, hasher: SharedHasher) -> Self {
        UploadState {
            hasher,
            inner: Mutex::new(StateInner {
                bucket: bucket.to_string(),
                key: key.to_string(),
                is_put: true,
                ..StateInner::default()
            }),
        }
    }

    /// State for a created multi-part session.
    pub(crate) fn for_multipart(
        bucket: &str,
        key: &str,
        hasher: SharedHasher,
        upload_id: String,
        create_output: CreateMultipartUploadOutput,
    ) -> Self {
        UploadState {
            hasher,
            inner: Mutex::new(StateInner {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: Some(upload_id),
                create_output: Some(create_output),
                ..StateInner::default()
            }),
        }
    }

    pub fn bucket(&self) -> String {
        self.inner.lock().bucket.clone()
    }

    pub fn key(&self) -> String {
        self.inner.lock().key.clone()
    }

    /// The server-issued upload id, for multi-part states.
    pub fn upload_id(&self) -> Option<String> {
        self.inner.lock().upload_id.clone()
    }

    /// The hasher that observed this object's bytes.
    pub fn hasher(&self) -> &SharedHasher {
        &self.hasher
    }

    pub(crate) fn set_put_results(
        &self,
        output: Option<PutObjectOutput>,
        error: Option<Arc<UploadError>>,
    ) {
        let mut inner = self.inner.lock();
        inner.put_output = output;
        inner.put_error = error;
    }

    /// Records the outcome of one part: either the wire response, or the
    /// error that stopped the part before or during dispatch.
    pub(crate) fn set_part_results(
        &self,
        part_number: i32,
        output: Option<UploadPartOutput>,
        error: Option<Arc<UploadError>>,
    ) {
        let mut inner = self.inner.lock();
        if let Some(output) = output {
            inner.part_outputs.insert(part_number, output);
        } else {
            inner.part_outputs.remove(&part_number);
        }
        if let Some(error) = error {
            inner.part_errors.insert(part_number, error);
        } else {
            inner.part_errors.remove(&part_number);
        }
    }

    /// The recorded outcome for one part. Only guaranteed to be present
    /// after the session's `wait` has unblocked or the part's result
    /// channel has yielded.
    pub fn part_results(
        &self,
        part_number: i32,
    ) -> (Option<UploadPartOutput>, Option<Arc<UploadError>>) {
        let inner = self.inner.lock();
        (
            inner.part_outputs.get(&part_number).cloned(),
            inner.part_errors.get(&part_number).cloned(),
        )
    }

    pub(crate) fn set_complete_results(
        &self,
        output: Option<CompleteMultipartUploadOutput>,
        error: Option<Arc<UploadError>>,
    ) {
        let mut inner = self.inner.lock();
        inner.complete_output = output;
        inner.complete_error = error;
    }

    pub(crate) fn has_complete_output(&self) -> bool {
        self.inner.lock().complete_output.is_some()
    }

    pub(crate) fn set_abort_results(
        &self,
        output: Option<AbortMultipartUploadOutput>,
        error: Option<Arc<UploadError>>,
    ) {
        let mut inner = self.inner.lock();
        inner.abort_output = output;
        inner.abort_error = error;
    }

    pub(crate) fn set_attributes_results(
        &self,
        output: Option<GetObjectAttributesOutput>,
        error: Option<Arc<UploadError>>,
    ) {
        let mut inner = self.inner.lock();
        inner.attributes_output = output;
        inner.attributes_error = error;
    }

    /// Every recorded per-operation error: the put error, the per-part
    /// errors in part order, then the complete and abort errors.
    pub fn errors(&self) -> Vec<Arc<UploadError>> {
        let inner = self.inner.lock();
        let mut errors = Vec::new();

        if let Some(error) = &inner.put_error {
            errors.push(error.clone());
        }

        let mut part_numbers: Vec<i32> = inner.part_errors.keys().copied().collect();
        part_numbers.sort_unstable();
        for part_number in part_numbers {
            errors.push(inner.part_errors[&part_number].clone());
        }

        if let Some(error) = &inner.complete_error {
            errors.push(error.clone());
        }
        if let Some(error) = &inner.abort_error {
            errors.push(error.clone());
        }

        errors
    }

    /// Projects a value out of the raw state record.
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&StateInner) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Assembles the completed-part list for CompleteMultipartUpload:
    /// parts sorted by number, each with its server ETag and per-part
    /// checksum, after asserting the numbers form a dense 1..=N sequence.
    pub(crate) fn completed_parts(&self) -> Result<Vec<CompletedPart>> {
        // snapshot under the state lock, stamp checksums after releasing
        // it so the two mutexes are never held together
        let recorded: Vec<(i32, Option<String>)> = {
            let inner = self.inner.lock();
            let mut recorded: Vec<(i32, Option<String>)> = inner
                .part_outputs
                .iter()
                .map(|(part_number, output)| {
                    (*part_number, output.e_tag().map(str::to_string))
                })
                .collect();
            recorded.sort_unstable_by_key(|(part_number, _)| *part_number);
            recorded
        };

        for (index, (part_number, _)) in recorded.iter().enumerate() {
            let expected = index as i32 + 1;
            if *part_number != expected {
                return Err(UploadError::OutOfOrderPart {
                    found: *part_number,
                    expected,
                });
            }
        }

        let hasher = self.hasher.lock();
        let completed = recorded
            .into_iter()
            .map(|(part_number, e_tag)| {
                let mut builder = CompletedPart::builder().part_number(part_number);
                if let Some(e_tag) = e_tag {
                    builder = builder.e_tag(e_tag);
                }
                stamp_completed_part(
                    builder,
                    hasher.algorithm(),
                    hasher.part_sum(part_number).base64(),
                )
                .build()
            })
            .collect();

        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{ChecksumAlgorithm, ObjectHasher};

    fn multipart_state(part_count: usize) -> UploadState {
        let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 4);
        for _ in 0..part_count {
            hasher.update(b"aaaa");
        }

        UploadState::for_multipart(
            "bucket",
            "key",
            Arc::new(parking_lot::Mutex::new(hasher)),
            "upload-id".to_string(),
            CreateMultipartUploadOutput::builder()
                .upload_id("upload-id")
                .build(),
        )
    }

    fn part_output(e_tag: &str) -> UploadPartOutput {
        UploadPartOutput::builder().e_tag(e_tag).build()
    }

    #[test]
    fn completed_parts_sorted_and_stamped() {
        let state = multipart_state(3);
        state.set_part_results(2, Some(part_output("e2")), None);
        state.set_part_results(1, Some(part_output("e1")), None);
        state.set_part_results(3, Some(part_output("e3")), None);

        let parts = state.completed_parts().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].part_number(), Some(1));
        assert_eq!(parts[2].part_number(), Some(3));
        assert_eq!(parts[0].e_tag(), Some("e1"));

        let expected = state.hasher().lock().part_sum(1).base64();
        assert_eq!(parts[0].checksum_sha256(), Some(expected.as_str()));
    }

    #[test]
    fn completed_parts_rejects_gaps() {
        let state = multipart_state(4);
        state.set_part_results(1, Some(part_output("e1")), None);
        state.set_part_results(2, Some(part_output("e2")), None);
        state.set_part_results(4, Some(part_output("e4")), None);

        let err = state.completed_parts().unwrap_err();
        assert!(matches!(
            err,
            UploadError::OutOfOrderPart {
                found: 4,
                expected: 3
            }
        ));
    }

    #[test]
    fn completed_parts_rejects_missing_first_part() {
        let state = multipart_state(2);
        state.set_part_results(2, Some(part_output("e2")), None);

        let err = state.completed_parts().unwrap_err();
        assert!(matches!(
            err,
            UploadError::OutOfOrderPart {
                found: 2,
                expected: 1
            }
        ));
    }

    #[test]
    fn errors_collects_in_operation_order() {
        let state = multipart_state(2);
        state.set_part_results(
            2,
            None,
            Some(Arc::new(UploadError::Canceled {
                cause: "test".to_string(),
            })),
        );
        state.set_complete_results(
            None,
            Some(Arc::new(UploadError::OutOfOrderPart {
                found: 2,
                expected: 1,
            })),
        );

        let errors = state.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].is_canceled());
        assert!(matches!(*errors[1], UploadError::OutOfOrderPart { .. }));
    }

    #[test]
    fn part_results_read_back() {
        let state = multipart_state(1);
        state.set_part_results(1, Some(part_output("e1")), None);

        let (output, error) = state.part_results(1);
        assert_eq!(output.unwrap().e_tag(), Some("e1"));
        assert!(error.is_none());

        let (output, error) = state.part_results(9);
        assert!(output.is_none());
        assert!(error.is_none());
    }
}
