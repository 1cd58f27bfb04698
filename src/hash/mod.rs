//! Checksum primitives
//!
//! Per-part and whole-body digests under a selectable algorithm, computed
//! in parallel with MD5 for ETag reconstruction.

mod algorithm;
mod object;
mod parts;
mod sum;

pub use algorithm::{ChecksumAlgorithm, DigestState};
pub use object::{
    HashReader, HashWriter, ObjectHasher, RequestChecksums, SharedHasher,
};
pub use parts::PartHasher;
pub use sum::{Base64Sum, HashSum, HexSum};
