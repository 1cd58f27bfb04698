//! Checksum algorithm selection and digest state
//!
//! MD5 has no remote counterpart; it is computed locally for ETag
//! reconstruction and optional validation.

use std::fmt;
use std::str::FromStr;

use aws_sdk_s3::types::ChecksumAlgorithm as AwsChecksumAlgorithm;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::UploadError;
use crate::hash::HashSum;

/// A named checksum algorithm and, if available, its AWS counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    Md5,
    Crc32,
    Crc32C,
    Sha1,
    #[default]
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "MD5",
            ChecksumAlgorithm::Crc32 => "CRC32",
            ChecksumAlgorithm::Crc32C => "CRC32C",
            ChecksumAlgorithm::Sha1 => "SHA1",
            ChecksumAlgorithm::Sha256 => "SHA256",
        }
    }

    /// The counterpart AWS checksum algorithm, if one is defined.
    /// MD5 is transmitted via `Content-MD5` and has no counterpart.
    pub fn aws_type(&self) -> Option<AwsChecksumAlgorithm> {
        match self {
            ChecksumAlgorithm::Md5 => None,
            ChecksumAlgorithm::Crc32 => Some(AwsChecksumAlgorithm::Crc32),
            ChecksumAlgorithm::Crc32C => Some(AwsChecksumAlgorithm::Crc32C),
            ChecksumAlgorithm::Sha1 => Some(AwsChecksumAlgorithm::Sha1),
            ChecksumAlgorithm::Sha256 => Some(AwsChecksumAlgorithm::Sha256),
        }
    }

    /// Fresh digest state for this algorithm.
    pub fn hasher(&self) -> DigestState {
        match self {
            ChecksumAlgorithm::Md5 => DigestState::Md5(Md5::new()),
            ChecksumAlgorithm::Crc32 => DigestState::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32C => DigestState::Crc32C(0),
            ChecksumAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(ChecksumAlgorithm::Md5),
            "CRC32" => Ok(ChecksumAlgorithm::Crc32),
            "CRC32C" => Ok(ChecksumAlgorithm::Crc32C),
            "SHA1" => Ok(ChecksumAlgorithm::Sha1),
            "SHA256" => Ok(ChecksumAlgorithm::Sha256),
            _ => Err(UploadError::InvalidConfig {
                reason: format!(
                    "unknown checksum algorithm: {s} (valid: CRC32, CRC32C, SHA1, SHA256)"
                ),
            }),
        }
    }
}

/// Incremental digest state for one checksum algorithm.
///
/// `sum` snapshots the digest without consuming the state, so more bytes
/// may be written afterwards. CRC digests render big-endian, matching the
/// base64 encoding S3 expects in its checksum headers.
#[derive(Clone)]
pub enum DigestState {
    Md5(Md5),
    Crc32(crc32fast::Hasher),
    Crc32C(u32),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl DigestState {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Md5(h) => h.update(data),
            DigestState::Crc32(h) => h.update(data),
            DigestState::Crc32C(state) => *state = crc32c::crc32c_append(*state, data),
            DigestState::Sha1(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
        }
    }

    pub fn sum(&self) -> HashSum {
        match self {
            DigestState::Md5(h) => HashSum::new(h.clone().finalize().to_vec()),
            DigestState::Crc32(h) => HashSum::new(h.clone().finalize().to_be_bytes().to_vec()),
            DigestState::Crc32C(state) => HashSum::new(state.to_be_bytes().to_vec()),
            DigestState::Sha1(h) => HashSum::new(h.clone().finalize().to_vec()),
            DigestState::Sha256(h) => HashSum::new(h.clone().finalize().to_vec()),
        }
    }
}

impl fmt::Debug for DigestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestState::Md5(_) => "Md5",
            DigestState::Crc32(_) => "Crc32",
            DigestState::Crc32C(_) => "Crc32C",
            DigestState::Sha1(_) => "Sha1",
            DigestState::Sha256(_) => "Sha256",
        };
        f.debug_tuple(name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
        let mut state = algorithm.hasher();
        state.update(data);
        state.sum().hex()
    }

    #[test]
    fn known_vectors() {
        // standard CRC check value for "123456789"
        assert_eq!(digest_hex(ChecksumAlgorithm::Crc32, b"123456789"), "cbf43926");
        assert_eq!(digest_hex(ChecksumAlgorithm::Crc32C, b"123456789"), "e3069283");

        assert_eq!(
            digest_hex(ChecksumAlgorithm::Md5, b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            digest_hex(ChecksumAlgorithm::Sha1, b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digest_hex(ChecksumAlgorithm::Sha256, b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sum_does_not_consume_state() {
        let mut state = ChecksumAlgorithm::Sha256.hasher();
        state.update(b"hello");
        let first = state.sum();
        assert_eq!(first, state.sum());

        state.update(b" world");
        assert_ne!(first, state.sum());
    }

    #[test]
    fn parse_names() {
        assert_eq!(
            "crc32c".parse::<ChecksumAlgorithm>().unwrap(),
            ChecksumAlgorithm::Crc32C
        );
        assert_eq!(
            "SHA256".parse::<ChecksumAlgorithm>().unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert!("sha512".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn aws_counterparts() {
        assert!(ChecksumAlgorithm::Md5.aws_type().is_none());
        assert_eq!(
            ChecksumAlgorithm::Sha256.aws_type(),
            Some(AwsChecksumAlgorithm::Sha256)
        );
    }
}
