//! Uploader configuration
//!
//! Plain options struct with validation; byte sizes parse from their
//! human-readable forms.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bytesize::ByteSize;

use crate::error::{Result, UploadError};
use crate::hash::ChecksumAlgorithm;
use crate::report::ManifestFormat;

/// Minimum allowed size of a part in bytes (the S3 floor).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum allowed size of a part in bytes (the S3 ceiling).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default part size in bytes.
pub const DEFAULT_PART_SIZE: u64 = MAX_PART_SIZE;

/// Default size of the buffers used to copy between an input stream and a
/// spool file or memory buffer.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Default (and maximum) cap on the number of parts in a multi-part
/// upload.
pub const DEFAULT_MAX_PART_ID: i32 = 10_000;

/// Options controlling the upload process.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Target S3 bucket.
    pub bucket: String,

    /// Explicit object key, or a key prefix when it ends in `/`. Optional
    /// when callers derive keys from file paths themselves.
    pub key: Option<String>,

    /// Size in bytes of individual parts of a multi-part upload, clamped
    /// to [`MIN_PART_SIZE`]..=[`MAX_PART_SIZE`].
    pub part_size: u64,

    /// Cap on the number of parts created per object.
    pub max_part_id: i32,

    /// Number of object uploads processed in parallel.
    pub concurrent_objects: usize,

    /// Number of part workers per multi-part session. Pools are not
    /// shared between sessions.
    pub concurrent_parts: usize,

    /// Checksum algorithm used to validate each uploaded part and the
    /// whole body. MD5 is always computed alongside.
    pub checksum_algorithm: ChecksumAlgorithm,

    /// Spool input streams through memory buffers instead of temp files.
    pub use_memory_buffers: bool,

    /// Directory for spool files; the OS default when unset.
    pub use_temp_dir: Option<PathBuf>,

    /// Size of the internal copy buffers.
    pub copy_buffer_size: usize,

    /// Maximum time to wait for the part uploads of one object. Zero
    /// means no timeout.
    pub upload_part_timeout: Duration,

    /// Maximum time for CompleteMultipartUpload (and its follow-up
    /// attributes fetch). Zero means no timeout.
    pub complete_upload_timeout: Duration,

    /// Maximum time per AbortMultipartUpload. Zero means no timeout.
    pub abort_upload_timeout: Duration,

    /// Leave pending multi-part sessions on the server at shutdown
    /// instead of aborting them.
    pub leave_parts_on_error: bool,

    /// Percent-encode invalid UTF-8 bytes and control characters in keys
    /// instead of rejecting them.
    pub encode_key: bool,

    /// Use virtual-host style addressing instead of path style.
    pub disable_path_style: bool,

    /// Use one shared wire client instead of a pool of clients.
    pub disable_client_pool: bool,

    /// Manifest output format.
    pub manifest: ManifestFormat,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        UploaderConfig {
            bucket: String::new(),
            key: None,
            part_size: DEFAULT_PART_SIZE,
            max_part_id: DEFAULT_MAX_PART_ID,
            concurrent_objects: 1,
            concurrent_parts: 1,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            use_memory_buffers: false,
            use_temp_dir: None,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            upload_part_timeout: Duration::ZERO,
            complete_upload_timeout: Duration::ZERO,
            abort_upload_timeout: Duration::ZERO,
            leave_parts_on_error: false,
            encode_key: false,
            disable_path_style: false,
            disable_client_pool: false,
            manifest: ManifestFormat::None,
        }
    }
}

impl UploaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(UploadError::InvalidConfig {
                reason: "bucket is required".to_string(),
            });
        }

        if self.part_size < MIN_PART_SIZE || self.part_size > MAX_PART_SIZE {
            return Err(UploadError::InvalidConfig {
                reason: format!(
                    "part size must be between {} and {}: got {}",
                    ByteSize::b(MIN_PART_SIZE),
                    ByteSize::b(MAX_PART_SIZE),
                    ByteSize::b(self.part_size)
                ),
            });
        }

        if self.max_part_id < 1 || self.max_part_id > DEFAULT_MAX_PART_ID {
            return Err(UploadError::InvalidConfig {
                reason: format!(
                    "max part id must be >= 1 and <= {}: got {}",
                    DEFAULT_MAX_PART_ID, self.max_part_id
                ),
            });
        }

        if self.concurrent_objects < 1 || self.concurrent_parts < 1 {
            return Err(UploadError::InvalidConfig {
                reason: "concurrency must be at least 1".to_string(),
            });
        }

        if self.copy_buffer_size == 0 {
            return Err(UploadError::InvalidConfig {
                reason: "copy buffer size must be non-zero".to_string(),
            });
        }

        if self.checksum_algorithm.aws_type().is_none() {
            return Err(UploadError::InvalidConfig {
                reason: "checksum algorithm must be one of CRC32, CRC32C, SHA1, SHA256"
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Parses a human readable byte count, e.g. `5MiB` or `5 GiB`.
pub fn parse_byte_size(text: &str) -> Result<u64> {
    ByteSize::from_str(&text.replace(' ', ""))
        .map(|size| size.as_u64())
        .map_err(|err| UploadError::InvalidConfig {
            reason: format!("invalid byte size: {text}: {err}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> UploaderConfig {
        UploaderConfig {
            bucket: "b".to_string(),
            ..UploaderConfig::default()
        }
    }

    #[test]
    fn default_config_validates_with_bucket() {
        assert!(valid().validate().is_ok());
        assert!(UploaderConfig::default().validate().is_err());
    }

    #[test]
    fn part_size_bounds() {
        let mut config = valid();
        config.part_size = MIN_PART_SIZE - 1;
        assert!(config.validate().is_err());

        config.part_size = MIN_PART_SIZE;
        assert!(config.validate().is_ok());

        config.part_size = MAX_PART_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_part_id_bounds() {
        let mut config = valid();
        config.max_part_id = 0;
        assert!(config.validate().is_err());

        config.max_part_id = DEFAULT_MAX_PART_ID + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn md5_is_not_a_selectable_algorithm() {
        let mut config = valid();
        config.checksum_algorithm = ChecksumAlgorithm::Md5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_byte_sizes() {
        assert_eq!(parse_byte_size("5MiB").unwrap(), 5 * 1024 * 1024);
        assert_eq!(parse_byte_size("5 GiB").unwrap(), 5 * 1024 * 1024 * 1024);
        assert_eq!(parse_byte_size("1024").unwrap(), 1024);
        assert!(parse_byte_size("five").is_err());
    }
}
