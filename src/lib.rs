//! Concurrent S3 uploader core
//!
//! Streams input byte streams into an S3-compatible object store,
//! computing per-part and whole-body checksums on the fly and emitting a
//! verifiable manifest record for every completed object:
//! - bounded part sources over random-access or sequential inputs
//! - incremental per-part + whole-body hashing, including the composite
//!   (hash-of-hashes) checksum and ETag reconstruction
//! - a multi-part state machine with worker fan-out, cancellation, and
//!   ordered completion
//! - an object-level dispatcher choosing between single-shot and
//!   multi-part protocols by observed stream size

pub mod cancel;
pub mod config;
pub mod error;
pub mod hash;
pub mod key;
pub mod media_type;
pub mod pool;
pub mod report;
pub mod source;
pub mod upload;

pub use cancel::CancelSignal;
pub use config::{
    parse_byte_size, UploaderConfig, DEFAULT_COPY_BUFFER_SIZE, DEFAULT_MAX_PART_ID,
    DEFAULT_PART_SIZE, MAX_PART_SIZE, MIN_PART_SIZE,
};
pub use error::{Result, UploadError};
pub use hash::{ChecksumAlgorithm, HashSum, ObjectHasher};
pub use key::{normalize_key, MAX_KEY_BYTES};
pub use media_type::MediaTypes;
pub use pool::{BufferPool, ClientPool};
pub use report::{ManifestFormat, ManifestWriter, ObjectReport};
pub use source::{PartSlice, PartSource, UploadBody};
pub use upload::{MultipartUpload, UploadOutcome, UploadState, Uploader};
