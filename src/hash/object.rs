//! Whole-object hashing with S3-shaped checksum projections
//!
//! [`ObjectHasher`] feeds every byte to four digests at once: the full
//! body and the per-part digests, each under the selected algorithm and
//! under MD5. The reader and writer adapters let the same hasher sit on
//! either side of a copy.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::hash::{ChecksumAlgorithm, DigestState, HashSum, PartHasher};

/// An [`ObjectHasher`] shared between the dispatcher, its adapters, and
/// the upload state that reports on it.
pub type SharedHasher = Arc<Mutex<ObjectHasher>>;

/// Computes the per-part and full-body checksums for one uploaded object.
#[derive(Debug, Clone)]
pub struct ObjectHasher {
    full_algo: DigestState,
    algo_parts: PartHasher,
    full_md5: DigestState,
    md5_parts: PartHasher,
}

impl ObjectHasher {
    pub fn new(algorithm: ChecksumAlgorithm, part_size: u64) -> Self {
        ObjectHasher {
            full_algo: algorithm.hasher(),
            algo_parts: PartHasher::new(algorithm, part_size),
            full_md5: ChecksumAlgorithm::Md5.hasher(),
            md5_parts: PartHasher::new(ChecksumAlgorithm::Md5, part_size),
        }
    }

    /// Adds bytes to all four running digests.
    pub fn update(&mut self, buf: &[u8]) {
        self.full_algo.update(buf);
        self.algo_parts.update(buf);
        self.full_md5.update(buf);
        self.md5_parts.update(buf);
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algo_parts.algorithm()
    }

    /// Number of parts hashed. Part numbers run from 1 to this value.
    pub fn count(&self) -> usize {
        self.algo_parts.count()
    }

    /// Total bytes hashed across all parts.
    pub fn size(&self) -> u64 {
        (1..=self.count() as i32).map(|i| self.part_size(i)).sum()
    }

    pub fn part_size(&self, part_number: i32) -> u64 {
        self.algo_parts.part_size(part_number)
    }

    /// Full-body digest under the configured algorithm.
    pub fn sum(&self) -> HashSum {
        self.full_algo.sum()
    }

    pub fn part_sum(&self, part_number: i32) -> HashSum {
        self.algo_parts.part_sum(part_number)
    }

    /// The composite (hash-of-hashes) digest under the configured
    /// algorithm; S3's object-level checksum for multi-part uploads.
    pub fn sum_of_sums(&self) -> HashSum {
        self.algo_parts.sum_of_sums()
    }

    /// Full-body MD5 digest.
    pub fn md5_sum(&self) -> HashSum {
        self.full_md5.sum()
    }

    pub fn md5_part_sum(&self, part_number: i32) -> HashSum {
        self.md5_parts.part_sum(part_number)
    }

    /// The hex MD5 hash-of-hashes plus part count, as servers render the
    /// ETag of a multi-part object.
    pub fn etag(&self) -> String {
        format!(
            "{}-{}",
            self.md5_parts.sum_of_sums().hex(),
            self.md5_parts.count()
        )
    }

    /// Checksum fields for a PutObject request, from the full-body sums.
    pub fn put_object_checksums(&self) -> RequestChecksums {
        RequestChecksums {
            content_md5: self.md5_sum().base64(),
            algorithm: self.algorithm(),
            checksum: self.sum().base64(),
        }
    }

    /// Checksum fields for an UploadPart request or CompletedPart record,
    /// from the sums for `part_number`.
    pub fn upload_part_checksums(&self, part_number: i32) -> RequestChecksums {
        RequestChecksums {
            content_md5: self.md5_part_sum(part_number).base64(),
            algorithm: self.algorithm(),
            checksum: self.part_sum(part_number).base64(),
        }
    }
}

/// Base64 checksum fields ready to stamp onto a wire request: the
/// `Content-MD5` value plus the value for the one `Checksum*` field the
/// selected algorithm maps to.
#[derive(Debug, Clone)]
pub struct RequestChecksums {
    pub content_md5: String,
    pub algorithm: ChecksumAlgorithm,
    pub checksum: String,
}

/// Hashes every byte written to it.
pub struct HashWriter {
    hasher: SharedHasher,
}

impl HashWriter {
    pub fn new(hasher: SharedHasher) -> Self {
        HashWriter { hasher }
    }
}

impl AsyncWrite for HashWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.hasher.lock().update(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Hashes every byte read through it from the underlying reader.
pub struct HashReader<R> {
    inner: R,
    hasher: SharedHasher,
}

impl<R> HashReader<R> {
    pub fn new(inner: R, hasher: SharedHasher) -> Self {
        HashReader { inner, hasher }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let filled = buf.filled();
                if filled.len() > before {
                    me.hasher.lock().update(&filled[before..]);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn sha256_hex(data: &[u8]) -> String {
        let mut h = ChecksumAlgorithm::Sha256.hasher();
        h.update(data);
        h.sum().hex()
    }

    #[test]
    fn tracks_full_and_part_sums_in_parallel() {
        let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 4);
        hasher.update(b"aaaabb");

        assert_eq!(hasher.count(), 2);
        assert_eq!(hasher.size(), 6);
        assert_eq!(hasher.sum().hex(), sha256_hex(b"aaaabb"));
        assert_eq!(hasher.part_sum(1).hex(), sha256_hex(b"aaaa"));

        // MD5 sibling digests cover the same bytes
        let mut md5 = ChecksumAlgorithm::Md5.hasher();
        md5.update(b"aaaabb");
        assert_eq!(hasher.md5_sum(), md5.sum());
    }

    #[test]
    fn etag_is_md5_sum_of_sums_and_count() {
        let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 4);
        hasher.update(b"aaaabbbbcc");

        let mut concat = Vec::new();
        for part_number in 1..=3 {
            concat.extend_from_slice(hasher.md5_part_sum(part_number).bytes());
        }
        let mut md5 = ChecksumAlgorithm::Md5.hasher();
        md5.update(&concat);

        assert_eq!(hasher.etag(), format!("{}-3", md5.sum().hex()));
    }

    #[test]
    fn request_checksums_are_base64() {
        let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 4);
        hasher.update(b"abc");

        let sums = hasher.put_object_checksums();
        assert_eq!(sums.content_md5, hasher.md5_sum().base64());
        assert_eq!(sums.checksum, hasher.sum().base64());

        let part = hasher.upload_part_checksums(1);
        assert_eq!(part.checksum, hasher.part_sum(1).base64());
    }

    #[tokio::test]
    async fn writer_adapter_hashes_written_bytes() {
        let hasher: SharedHasher =
            Arc::new(Mutex::new(ObjectHasher::new(ChecksumAlgorithm::Sha256, 4)));
        let mut writer = HashWriter::new(hasher.clone());

        writer.write_all(b"aaaabb").await.unwrap();

        let hasher = hasher.lock();
        assert_eq!(hasher.count(), 2);
        assert_eq!(hasher.sum().hex(), sha256_hex(b"aaaabb"));
    }

    #[tokio::test]
    async fn reader_adapter_hashes_read_bytes() {
        let hasher: SharedHasher =
            Arc::new(Mutex::new(ObjectHasher::new(ChecksumAlgorithm::Sha256, 4)));
        let mut reader = HashReader::new(&b"aaaabb"[..], hasher.clone());

        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();

        assert_eq!(sink, b"aaaabb");
        assert_eq!(hasher.lock().sum().hex(), sha256_hex(b"aaaabb"));
    }
}
