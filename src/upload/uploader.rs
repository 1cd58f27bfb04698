//! Object-level upload dispatcher
//!
//! Fans queued uploads out over a pool of object workers. Each worker
//! adapts its input into a part source, hashes slices as they are
//! produced, and routes the object through a single PutObject or a
//! multi-part session depending on the observed size. Multi-part
//! sessions are registered for shutdown-time abort until they complete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::primitives::ByteStream;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cancel::CancelSignal;
use crate::config::UploaderConfig;
use crate::error::{Result, UploadError};
use crate::hash::{HashWriter, ObjectHasher, SharedHasher};
use crate::media_type::MediaTypes;
use crate::pool::{BufferPool, ClientPool};
use crate::source::{PartSlice, PartSource, UploadBody};
use crate::upload::multipart::MultipartUpload;
use crate::upload::state::UploadState;
use crate::upload::{fetch_object_attributes, stamp_put_object, PendingCounter};

/// The final disposition of one queued upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub bucket: String,
    pub key: String,
    /// The per-object state record; absent when the upload failed before
    /// any wire operation was attempted.
    pub state: Option<Arc<UploadState>>,
    pub error: Option<Arc<UploadError>>,
}

struct QueuedUpload {
    cancel: CancelSignal,
    body: UploadBody,
    bucket: String,
    key: String,
    done: oneshot::Sender<UploadOutcome>,
}

/// Accepts queued uploads and processes them as single-shot or
/// multi-part objects across a pool of object workers.
pub struct Uploader {
    shared: Arc<Shared>,
}

struct Shared {
    config: UploaderConfig,
    clients: Arc<ClientPool>,
    media_types: Arc<MediaTypes>,

    /// buffers for in-memory part spooling, sized to the part size
    part_pool: Arc<BufferPool>,
    /// buffers for copy loops, sized to the copy buffer size
    copy_pool: Arc<BufferPool>,

    cancel: CancelSignal,
    queue: async_channel::Sender<QueuedUpload>,
    pending: PendingCounter,

    /// in-flight multi-part sessions by upload id; entries are cleanup
    /// obligations until the session completes
    abortable: Mutex<HashMap<String, Arc<MultipartUpload>>>,
}

impl Uploader {
    /// Starts an uploader with `concurrent_objects` workers. Its scope is
    /// derived from `cancel`; canceling the parent stops the workers and
    /// rejects anything still queued.
    pub fn new(
        cancel: &CancelSignal,
        config: UploaderConfig,
        clients: Arc<ClientPool>,
        media_types: Arc<MediaTypes>,
    ) -> Result<Self> {
        config.validate()?;

        let (queue, receiver) = async_channel::bounded(1);
        let shared = Arc::new(Shared {
            part_pool: BufferPool::new(config.part_size as usize),
            copy_pool: BufferPool::new(config.copy_buffer_size),
            clients,
            media_types,
            cancel: cancel.child(),
            queue,
            pending: PendingCounter::new(),
            abortable: Mutex::new(HashMap::new()),
            config,
        });

        for _ in 0..shared.config.concurrent_objects {
            tokio::spawn(run_object_worker(shared.clone(), receiver.clone()));
        }

        Ok(Uploader { shared })
    }

    /// Queues one upload and returns a channel that yields its outcome.
    /// Canceling `cancel` cancels this upload; canceling the uploader's
    /// parent scope rejects it if it has not started.
    pub async fn upload(
        &self,
        cancel: CancelSignal,
        body: UploadBody,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> oneshot::Receiver<UploadOutcome> {
        self.shared.pending.add();

        let (done, outcome) = oneshot::channel();
        let queued = QueuedUpload {
            cancel,
            body,
            bucket: bucket.into(),
            key: key.into(),
            done,
        };

        if let Err(async_channel::SendError(queued)) = self.shared.queue.send(queued).await {
            self.shared.reject_upload(queued);
        }

        outcome
    }

    /// Blocks until every queued upload has finished, or the uploader's
    /// scope is canceled, or the timeout (zero: none) expires. Check
    /// [`pending`](Self::pending) afterwards for sessions that still need
    /// to be aborted.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.shared.cancel.canceled() => Err(self.shared.cancel.cancel_error()),
            _ = self.shared.pending.drained() => Ok(()),
            _ = tokio::time::sleep(timeout), if !timeout.is_zero() => {
                Err(UploadError::Timeout { limit: timeout })
            }
        }
    }

    /// Stops accepting uploads and stops the object workers. In-flight
    /// wire calls are not interrupted.
    pub fn close(&self) {
        self.shared.queue.close();
        self.shared.cancel.cancel("uploader closed");
    }

    /// Upload ids of multi-part sessions that are in flight or that
    /// failed before completing.
    pub fn pending(&self) -> Vec<String> {
        self.shared.abortable.lock().keys().cloned().collect()
    }

    /// The `bucket/key` target of a pending session.
    pub fn pending_target(&self, upload_id: &str) -> Option<String> {
        self.shared
            .abortable
            .lock()
            .get(upload_id)
            .map(|session| format!("{}/{}", session.bucket(), session.key()))
    }

    /// Best-effort abort of every pending session, serialized, each
    /// attempt bounded by the abort timeout. Canceling `cancel` gives up
    /// on the remaining sessions.
    pub async fn abort_pending(&self, cancel: &CancelSignal) {
        let sessions: Vec<Arc<MultipartUpload>> =
            self.shared.abortable.lock().values().cloned().collect();

        for session in sessions {
            info!(
                "attempting to abort pending upload: {}/{} (upload id {})",
                session.bucket(),
                session.key(),
                session.upload_id()
            );

            tokio::select! {
                biased;
                _ = cancel.canceled() => {
                    warn!("giving up on pending aborts");
                    return;
                }
                _ = session.abort_upload(self.shared.config.abort_upload_timeout) => {}
            }

            self.shared
                .abortable
                .lock()
                .remove(session.upload_id());
        }
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn reject_upload(&self, queued: QueuedUpload) {
        let err = Arc::new(self.cancel.cancel_error());
        let _ = queued.done.send(UploadOutcome {
            bucket: queued.bucket,
            key: queued.key,
            state: None,
            error: Some(err),
        });
        self.pending.done();
    }

    fn register_abortable(&self, session: &Arc<MultipartUpload>) {
        self.abortable
            .lock()
            .insert(session.upload_id().to_string(), session.clone());
    }

    fn unregister_abortable(&self, session: &MultipartUpload) {
        self.abortable.lock().remove(session.upload_id());
    }
}

async fn run_object_worker(shared: Arc<Shared>, receiver: async_channel::Receiver<QueuedUpload>) {
    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.canceled() => break,
            queued = receiver.recv() => match queued {
                Ok(queued) => process_upload(&shared, queued).await,
                Err(_) => return,
            }
        }
    }

    // the uploader was canceled: reject anything still queued
    receiver.close();
    while let Ok(queued) = receiver.try_recv() {
        shared.reject_upload(queued);
    }
}

async fn process_upload(shared: &Arc<Shared>, queued: QueuedUpload) {
    let QueuedUpload {
        cancel,
        body,
        bucket,
        key,
        done,
    } = queued;

    let mut session: Option<Arc<MultipartUpload>> = None;
    let (state, error) = dispatch_object(shared, &cancel, body, &bucket, &key, &mut session).await;

    // the session keeps its workers only as long as the dispatcher needs
    // them; abort and complete run against fresh scopes regardless
    if let Some(session) = &session {
        session.cancel("upload dispatcher finished");
    }

    let _ = done.send(UploadOutcome {
        bucket,
        key,
        state,
        error,
    });
    shared.pending.done();
}

type DispatchOutcome = (Option<Arc<UploadState>>, Option<Arc<UploadError>>);

/// Runs the dispatch algorithm for one object: adapt the input into a
/// part source, hash slices as they are produced, and decide between the
/// single-shot and multi-part paths by read-ahead.
async fn dispatch_object(
    shared: &Arc<Shared>,
    cancel: &CancelSignal,
    body: UploadBody,
    bucket: &str,
    key: &str,
    session_out: &mut Option<Arc<MultipartUpload>>,
) -> DispatchOutcome {
    let config = &shared.config;

    let source = if config.use_memory_buffers {
        PartSource::memory(body, config.part_size, shared.part_pool.clone()).await
    } else {
        PartSource::tempfile(
            body,
            config.part_size,
            config.use_temp_dir.clone(),
            shared.copy_pool.clone(),
        )
        .await
    };
    let mut source = match source {
        Ok(source) => source,
        Err(err) => return (None, Some(Arc::new(err))),
    };

    let hasher: SharedHasher = Arc::new(Mutex::new(ObjectHasher::new(
        config.checksum_algorithm,
        config.part_size,
    )));

    // holds the read-ahead slice used to distinguish "exactly one full
    // part" from "more parts follow"
    let mut peeked: Option<Option<PartSlice>> = None;

    loop {
        let next = match peeked.take() {
            Some(slice) => slice,
            None => match source.next().await {
                Ok(slice) => slice,
                Err(err) => {
                    let state = session_out.as_ref().map(|s| s.state().clone());
                    return (state, Some(Arc::new(err)));
                }
            },
        };

        let Some(slice) = next else {
            if session_out.is_none() {
                // zero-length input: the digests are the digests of the
                // empty string
                hasher.lock().update(&[]);
                return put_object(shared, cancel, None, bucket, key, &hasher).await;
            }
            break;
        };

        if let Err(err) = hash_slice(&slice, &hasher, &shared.copy_pool).await {
            let state = session_out.as_ref().map(|s| s.state().clone());
            return (state, Some(Arc::new(err)));
        }

        let session = match session_out {
            Some(session) => session.clone(),
            None => {
                // single-part check: a first slice under the part size, or
                // exactly at it with nothing after, goes through PutObject
                if hasher.lock().part_size(1) < config.part_size {
                    return put_object(shared, cancel, Some(slice), bucket, key, &hasher).await;
                }

                let second = match source.next().await {
                    Ok(second) => second,
                    Err(err) => return (None, Some(Arc::new(err))),
                };
                if second.is_none() {
                    return put_object(shared, cancel, Some(slice), bucket, key, &hasher).await;
                }
                peeked = Some(second);

                let content_type = shared.media_types.lookup(key);
                let created = MultipartUpload::create(
                    cancel,
                    hasher.clone(),
                    bucket,
                    key,
                    &content_type,
                    config,
                    &shared.clients,
                )
                .await;

                match created {
                    Ok(session) => {
                        shared.register_abortable(&session);
                        *session_out = Some(session.clone());
                        session
                    }
                    Err(err) => return (None, Some(Arc::new(err))),
                }
            }
        };

        let part_number = match session.next_part_id() {
            Ok(part_number) => part_number,
            Err(err) => return (Some(session.state().clone()), Some(Arc::new(err))),
        };

        let checksums = hasher.lock().upload_part_checksums(part_number);
        let body = match slice.byte_stream().await {
            Ok(body) => body,
            Err(err) => return (Some(session.state().clone()), Some(Arc::new(err))),
        };

        let outcome = session
            .upload_part(part_number, body, slice.len() as i64, checksums)
            .await;

        // close the slice as soon as its part has a result, releasing the
        // spool file or pooled buffer
        tokio::spawn(async move {
            let _ = outcome.await;
            let mut slice = slice;
            let _ = slice.close();
        });
    }

    let Some(session) = session_out.as_ref().cloned() else {
        return (None, None);
    };

    if let Err(err) = session.wait(config.upload_part_timeout).await {
        return (Some(session.state().clone()), Some(Arc::new(err)));
    }

    if session.state().errors().is_empty() {
        let _ = session.complete_upload(config.complete_upload_timeout).await;
        if session.state().errors().is_empty() {
            shared.unregister_abortable(&session);
        }
    }

    let state = session.state().clone();
    (Some(state.clone()), join_errors(&state))
}

/// Uploads a slice (or an empty body) as a stand-alone object via
/// PutObject, stamping the full-body checksums, and fetches the object
/// attributes on success.
async fn put_object(
    shared: &Arc<Shared>,
    cancel: &CancelSignal,
    slice: Option<PartSlice>,
    bucket: &str,
    key: &str,
    hasher: &SharedHasher,
) -> DispatchOutcome {
    let state = Arc::new(UploadState::for_put_object(bucket, key, hasher.clone()));

    let (body, content_length) = match &slice {
        Some(slice) => match slice.byte_stream().await {
            Ok(body) => (body, slice.len() as i64),
            Err(err) => {
                let err = Arc::new(err);
                state.set_put_results(None, Some(err.clone()));
                return (Some(state), Some(err));
            }
        },
        None => (ByteStream::from_static(b""), 0),
    };

    let checksums = hasher.lock().put_object_checksums();
    let content_type = shared.media_types.lookup(key);

    info!("started upload for object {}/{}", bucket, key);

    let client = shared.clients.get();
    let request = stamp_put_object(
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_length(content_length)
            .body(body),
        &checksums,
    );

    let result = tokio::select! {
        biased;
        _ = cancel.canceled() => Err(cancel.cancel_error()),
        result = request.send() => result.map_err(|err| UploadError::PutObject(Box::new(err))),
    };

    let outcome = match result {
        Ok(output) => {
            state.set_put_results(Some(output), None);

            let attributes = tokio::select! {
                biased;
                _ = cancel.canceled() => Err(cancel.cancel_error()),
                result = fetch_object_attributes(
                    &client, bucket, key, shared.config.max_part_id,
                ) => result,
            };
            match attributes {
                Ok(attributes) => state.set_attributes_results(Some(attributes), None),
                Err(err) => state.set_attributes_results(None, Some(Arc::new(err))),
            }

            (Some(state), None)
        }
        Err(err) => {
            let err = Arc::new(err);
            state.set_put_results(None, Some(err.clone()));
            (Some(state), Some(err))
        }
    };
    shared.clients.put(client);

    drop(slice);
    outcome
}

/// Copies a slice through the hash writer using a pooled buffer.
async fn hash_slice(
    slice: &PartSlice,
    hasher: &SharedHasher,
    copy_pool: &Arc<BufferPool>,
) -> Result<()> {
    let mut reader = slice.reader().await?;
    let mut writer = HashWriter::new(hasher.clone());

    let mut chunk = copy_pool.get(copy_pool.capacity());
    let copied = async {
        loop {
            chunk.clear();
            let n = reader.read_buf(&mut chunk).await?;
            if n == 0 {
                return Ok::<(), std::io::Error>(());
            }
            writer.write_all(&chunk).await?;
        }
    }
    .await;
    copy_pool.put(chunk);

    copied?;
    Ok(())
}

/// Joins every recorded per-operation error into the object's final
/// result, or `None` when the upload is clean.
fn join_errors(state: &UploadState) -> Option<Arc<UploadError>> {
    let errors = state.errors();
    if errors.is_empty() {
        return None;
    }

    Some(Arc::new(UploadError::ObjectFailed {
        errors: errors.iter().map(|err| err.to_string()).collect(),
    }))
}
