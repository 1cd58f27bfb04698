//! Multi-part upload session
//!
//! One live session per multi-part object, keyed by the server-issued
//! upload id. Parts are submitted into a queue drained by a fixed pool of
//! part workers; results land in the shared [`UploadState`] and on a
//! per-submission channel. Completion and abort run against a fresh
//! background scope so cleanup is always possible after a cancel.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::CompletedMultipartUpload;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::config::UploaderConfig;
use crate::error::{Result, UploadError};
use crate::hash::{RequestChecksums, SharedHasher};
use crate::pool::ClientPool;
use crate::upload::state::UploadState;
use crate::upload::{deadline, fetch_object_attributes, stamp_upload_part, PendingCounter};

/// Result of one part submission, as delivered on its channel. The same
/// outcome is recorded in the session's [`UploadState`].
pub type PartOutcome = std::result::Result<(), Arc<UploadError>>;

/// A part waiting for a worker, with everything needed to dispatch it.
struct QueuedPart {
    part_number: i32,
    body: ByteStream,
    content_length: i64,
    checksums: RequestChecksums,
    done: oneshot::Sender<PartOutcome>,
}

/// Manages the upload of one multi-part object. Callers submit parts via
/// [`upload_part`](Self::upload_part), then [`wait`](Self::wait) for the
/// queue to drain before [`complete_upload`](Self::complete_upload) or
/// [`abort_upload`](Self::abort_upload).
pub struct MultipartUpload {
    state: Arc<UploadState>,
    upload_id: String,
    bucket: String,
    key: String,

    cancel: CancelSignal,
    queue: async_channel::Sender<QueuedPart>,
    pending: PendingCounter,
    part_ids: Mutex<PartIdSequence>,

    /// serializes complete and abort attempts
    finalize: tokio::sync::Mutex<()>,

    config: UploaderConfig,
    clients: Arc<ClientPool>,
}

impl MultipartUpload {
    /// Issues CreateMultipartUpload and starts the session's part workers
    /// on success. The session's scope is derived from `cancel`.
    pub async fn create(
        cancel: &CancelSignal,
        hasher: SharedHasher,
        bucket: &str,
        key: &str,
        content_type: &str,
        config: &UploaderConfig,
        clients: &Arc<ClientPool>,
    ) -> Result<Arc<Self>> {
        let client = clients.get();

        let mut request = client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type);
        if let Some(algorithm) = config.checksum_algorithm.aws_type() {
            request = request.checksum_algorithm(algorithm);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.canceled() => Err(cancel.cancel_error()),
            result = request.send() => {
                result.map_err(|err| UploadError::CreateUpload(Box::new(err)))
            }
        };
        clients.put(client);
        let output = result?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| UploadError::CreateUpload("no upload id in response".into()))?
            .to_string();

        info!(
            "started upload of multi-part object {}/{} using upload id {}",
            bucket, key, upload_id
        );

        let state = Arc::new(UploadState::for_multipart(
            bucket,
            key,
            hasher,
            upload_id.clone(),
            output,
        ));

        Ok(Self::start(
            state,
            upload_id,
            cancel.child(),
            config.clone(),
            clients.clone(),
        ))
    }

    /// Wires up a session around an already-created upload and spawns its
    /// part workers.
    pub(crate) fn start(
        state: Arc<UploadState>,
        upload_id: String,
        cancel: CancelSignal,
        config: UploaderConfig,
        clients: Arc<ClientPool>,
    ) -> Arc<Self> {
        let (queue, receiver) = async_channel::bounded(1);

        let session = Arc::new(MultipartUpload {
            bucket: state.bucket(),
            key: state.key(),
            state,
            upload_id,
            cancel,
            queue,
            pending: PendingCounter::new(),
            part_ids: Mutex::new(PartIdSequence::new(config.max_part_id)),
            finalize: tokio::sync::Mutex::new(()),
            config,
            clients,
        });

        for _ in 0..session.config.concurrent_parts {
            tokio::spawn(Arc::clone(&session).run_worker(receiver.clone()));
        }

        session
    }

    /// The server-issued upload id. Invalidated once the upload is
    /// completed or aborted.
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> &Arc<UploadState> {
        &self.state
    }

    /// The next part number, starting at 1 and capped at the configured
    /// maximum. At the cap every call returns the max-parts error.
    pub fn next_part_id(&self) -> Result<i32> {
        self.part_ids.lock().next()
    }

    /// Cancels the session: queued-but-undispatched parts are recorded
    /// with the cancellation cause and no further parts are dispatched.
    /// `complete_upload` and `abort_upload` remain callable.
    pub fn cancel(&self, cause: impl Into<String>) {
        self.queue.close();
        self.cancel.cancel(cause);
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Submits a part for upload by the session's workers. The returned
    /// channel may optionally be awaited for the part's outcome; the same
    /// outcome is recorded in the session state either way.
    pub async fn upload_part(
        &self,
        part_number: i32,
        body: ByteStream,
        content_length: i64,
        checksums: RequestChecksums,
    ) -> oneshot::Receiver<PartOutcome> {
        self.pending.add();

        let (done, outcome) = oneshot::channel();
        let queued = QueuedPart {
            part_number,
            body,
            content_length,
            checksums,
            done,
        };

        // a canceled session closes the queue, which also unblocks any
        // submission already waiting for a worker
        if let Err(async_channel::SendError(queued)) = self.queue.send(queued).await {
            self.reject_part(queued);
        }

        outcome
    }

    /// Blocks until every submitted part has finished or been rejected,
    /// or the session is canceled, or the timeout (zero: none) expires.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.canceled() => Err(self.cancel.cancel_error()),
            _ = self.pending.drained() => Ok(()),
            _ = tokio::time::sleep(timeout), if !timeout.is_zero() => {
                Err(UploadError::Timeout { limit: timeout })
            }
        }
    }

    /// Completes the upload: asserts part density, attaches ETags and
    /// per-part checksums, issues CompleteMultipartUpload, and on success
    /// fetches the object attributes for the manifest. Call only after
    /// `wait` has returned without error.
    pub async fn complete_upload(&self, timeout: Duration) -> std::result::Result<(), Arc<UploadError>> {
        let _guard = self.finalize.lock().await;

        let parts = match self.state.completed_parts() {
            Ok(parts) => parts,
            Err(err) => {
                let err = Arc::new(err);
                self.state.set_complete_results(None, Some(err.clone()));
                return Err(err);
            }
        };

        info!(
            "completing upload for multi-part object {}/{} using upload id {}",
            self.bucket, self.key, self.upload_id
        );

        let client = self.clients.get();
        let result = deadline(timeout, async {
            let output = client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map_err(|err| UploadError::CompleteUpload(Box::new(err)))?;

            self.state.set_complete_results(Some(output), None);

            match fetch_object_attributes(&client, &self.bucket, &self.key, self.config.max_part_id)
                .await
            {
                Ok(attributes) => self.state.set_attributes_results(Some(attributes), None),
                Err(err) => self.state.set_attributes_results(None, Some(Arc::new(err))),
            }

            Ok(())
        })
        .await;
        self.clients.put(client);

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = Arc::new(err);
                if self.state.has_complete_output() {
                    // the complete call itself succeeded; the deadline
                    // expired during the attributes fetch
                    self.state.set_attributes_results(None, Some(err.clone()));
                } else {
                    self.state.set_complete_results(None, Some(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Aborts the upload. Server errors are recorded but the attempt
    /// itself is the contract; the session should be considered resolved
    /// either way.
    pub async fn abort_upload(&self, timeout: Duration) -> std::result::Result<(), Arc<UploadError>> {
        let _guard = self.finalize.lock().await;

        info!(
            "aborting upload of multi-part object {}/{} using upload id {}",
            self.bucket, self.key, self.upload_id
        );

        let client = self.clients.get();
        let result = deadline(timeout, async {
            client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .send()
                .await
                .map_err(|err| UploadError::AbortUpload(Box::new(err)))
        })
        .await;
        self.clients.put(client);

        match result {
            Ok(output) => {
                self.state.set_abort_results(Some(output), None);
                Ok(())
            }
            Err(err) => {
                let err = Arc::new(err);
                self.state.set_abort_results(None, Some(err.clone()));
                Err(err)
            }
        }
    }

    async fn run_worker(self: Arc<Self>, receiver: async_channel::Receiver<QueuedPart>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.canceled() => break,
                queued = receiver.recv() => match queued {
                    Ok(queued) => self.dispatch_part(queued).await,
                    Err(_) => return,
                }
            }
        }

        // the session was canceled: reject everything still queued so
        // every submission's channel eventually yields
        receiver.close();
        while let Ok(queued) = receiver.try_recv() {
            self.reject_part(queued);
        }
    }

    async fn dispatch_part(&self, queued: QueuedPart) {
        debug!(
            "starting upload of {}/{} part {} using upload id {}",
            self.bucket, self.key, queued.part_number, self.upload_id
        );

        let client = self.clients.get();
        let request = stamp_upload_part(
            client
                .upload_part()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&self.upload_id)
                .part_number(queued.part_number)
                .content_length(queued.content_length)
                .body(queued.body),
            &queued.checksums,
        );

        let result = tokio::select! {
            biased;
            _ = self.cancel.canceled() => Err(self.cancel.cancel_error()),
            result = request.send() => result.map_err(|err| UploadError::UploadPart {
                part_number: queued.part_number,
                source: Box::new(err),
            }),
        };
        self.clients.put(client);

        match result {
            Ok(output) => {
                self.state
                    .set_part_results(queued.part_number, Some(output), None);
                let _ = queued.done.send(Ok(()));
            }
            Err(err) => {
                let err = Arc::new(err);
                self.state
                    .set_part_results(queued.part_number, None, Some(err.clone()));
                let _ = queued.done.send(Err(err));
            }
        }

        self.pending.done();
    }

    /// Records the cancellation cause as a queued part's result without
    /// dispatching it.
    fn reject_part(&self, queued: QueuedPart) {
        let err = Arc::new(self.cancel.cancel_error());
        self.state
            .set_part_results(queued.part_number, None, Some(err.clone()));
        let _ = queued.done.send(Err(err));
        self.pending.done();
    }
}

/// Monotonic part-number sequence capped at a configured maximum.
#[derive(Debug)]
pub(crate) struct PartIdSequence {
    last: i32,
    max: i32,
}

impl PartIdSequence {
    pub(crate) fn new(max: i32) -> Self {
        PartIdSequence { last: 0, max }
    }

    pub(crate) fn next(&mut self) -> Result<i32> {
        if self.last == self.max {
            return Err(UploadError::MaxPartId { max: self.max });
        }

        self.last += 1;
        Ok(self.last)
    }
}
