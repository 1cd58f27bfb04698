//! Error types for the uploader
//!
//! One taxonomy covering input, validation, wire protocol, upload state,
//! and concurrency failures.

use std::time::Duration;

use thiserror::Error;

/// Boxed error source, used to capture SDK failures per wire operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Primary error type for all upload operations
#[derive(Debug, Error)]
pub enum UploadError {
    // ========== Input / IO ==========
    /// Reading the source stream, or creating/writing a spool file
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Validation ==========
    /// Object key failed UTF-8 / control-character / length validation
    #[error("invalid object key: {reason}")]
    InvalidKey { reason: String },

    /// A configuration option is out of range or unrecognized
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A manifest record could not be produced
    #[error("invalid manifest record: {reason}")]
    InvalidManifest { reason: String },

    // ========== Protocol ==========
    /// PutObject call failed
    #[error("put object error: {0}")]
    PutObject(#[source] BoxError),

    /// CreateMultipartUpload call failed
    #[error("create multi-part upload error: {0}")]
    CreateUpload(#[source] BoxError),

    /// UploadPart call failed for one part
    #[error("upload part {part_number} error: {source}")]
    UploadPart {
        part_number: i32,
        #[source]
        source: BoxError,
    },

    /// CompleteMultipartUpload call failed
    #[error("complete multi-part upload error: {0}")]
    CompleteUpload(#[source] BoxError),

    /// AbortMultipartUpload call failed
    #[error("abort multi-part upload error: {0}")]
    AbortUpload(#[source] BoxError),

    /// GetObjectAttributes call failed
    #[error("get object attributes error: {0}")]
    ObjectAttributes(#[source] BoxError),

    // ========== State ==========
    /// Recorded part numbers are not a dense 1..=N sequence
    #[error("out-of-order partID: {found} (expected {expected})")]
    OutOfOrderPart { found: i32, expected: i32 },

    /// The part-number sequence reached its configured cap
    #[error("partID limit reached: {max}")]
    MaxPartId { max: i32 },

    // ========== Concurrency ==========
    /// The parent scope was canceled; carries the cancellation cause
    #[error("canceled: {cause}")]
    Canceled { cause: String },

    /// A per-operation timeout expired
    #[error("timeout after {limit:?}")]
    Timeout { limit: Duration },

    // ========== Aggregate ==========
    /// Joined per-operation errors for one failed object upload
    #[error("object upload failed: {}", .errors.join("; "))]
    ObjectFailed { errors: Vec<String> },
}

impl UploadError {
    /// Returns true if this error carries a cancellation cause
    pub fn is_canceled(&self) -> bool {
        matches!(self, UploadError::Canceled { .. })
    }

    /// Returns true if this error is an expired per-operation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, UploadError::Timeout { .. })
    }
}

/// Result type alias for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;
