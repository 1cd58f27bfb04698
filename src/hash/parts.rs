//! Per-part running digests for a multi-part object

use crate::hash::{ChecksumAlgorithm, DigestState, HashSum};

/// The digest of a single part in a multi-part object.
#[derive(Debug, Clone)]
struct HashPart {
    /// bytes written to this part so far
    n: u64,
    digest: DigestState,
}

/// Maintains per-part digests under one algorithm, splitting the byte
/// stream exactly at `part_size` boundaries.
///
/// The trailing part stays open while it holds fewer than `part_size`
/// bytes; a write that crosses the boundary is split so that each part
/// digests exactly the bytes routed to it.
#[derive(Debug, Clone)]
pub struct PartHasher {
    algorithm: ChecksumAlgorithm,
    part_size: u64,
    parts: Vec<HashPart>,
    /// whether the last element of `parts` accepts more bytes
    open: bool,
}

impl PartHasher {
    pub fn new(algorithm: ChecksumAlgorithm, part_size: u64) -> Self {
        PartHasher {
            algorithm,
            part_size,
            parts: Vec::new(),
            open: false,
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Number of parts started so far, including the open one.
    pub fn count(&self) -> usize {
        self.parts.len()
    }

    /// Bytes routed to part `part_number`. Part numbers are 1-indexed and
    /// valid in `1..=count()`.
    pub fn part_size(&self, part_number: i32) -> u64 {
        self.parts[(part_number - 1) as usize].n
    }

    /// Digest of part `part_number`. Part numbers are 1-indexed and valid
    /// in `1..=count()`.
    pub fn part_sum(&self, part_number: i32) -> HashSum {
        self.parts[(part_number - 1) as usize].digest.sum()
    }

    /// The hash-of-hashes digest: the digest of the concatenation of all
    /// per-part digests, under the same algorithm.
    pub fn sum_of_sums(&self) -> HashSum {
        let mut hoh = self.algorithm.hasher();
        for part in &self.parts {
            hoh.update(part.digest.sum().bytes());
        }
        hoh.sum()
    }

    /// Adds bytes to the running digests, starting a new part whenever the
    /// current one reaches `part_size`. An empty write still opens a part,
    /// so an empty input yields one zero-length part.
    pub fn update(&mut self, mut buf: &[u8]) {
        if !self.open {
            self.start_part();
        }

        while !buf.is_empty() {
            if !self.open {
                self.start_part();
            }

            let last = self.parts.len() - 1;
            let part = &mut self.parts[last];

            let room = self.part_size - part.n;
            let n = (buf.len() as u64).min(room) as usize;

            part.digest.update(&buf[..n]);
            part.n += n as u64;

            if part.n == self.part_size {
                self.open = false;
            }

            buf = &buf[n..];
        }
    }

    fn start_part(&mut self) {
        self.parts.push(HashPart {
            n: 0,
            digest: self.algorithm.hasher(),
        });
        self.open = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha256_of(data: &[u8]) -> HashSum {
        let mut h = ChecksumAlgorithm::Sha256.hasher();
        h.update(data);
        h.sum()
    }

    #[test]
    fn splits_at_part_boundaries() {
        let mut hasher = PartHasher::new(ChecksumAlgorithm::Sha256, 4);
        hasher.update(b"aaaabbbbcc");

        assert_eq!(hasher.count(), 3);
        assert_eq!(hasher.part_size(1), 4);
        assert_eq!(hasher.part_size(2), 4);
        assert_eq!(hasher.part_size(3), 2);
        assert_eq!(hasher.part_sum(1), sha256_of(b"aaaa"));
        assert_eq!(hasher.part_sum(2), sha256_of(b"bbbb"));
        assert_eq!(hasher.part_sum(3), sha256_of(b"cc"));
    }

    #[test]
    fn exact_multiple_closes_trailing_part() {
        let mut hasher = PartHasher::new(ChecksumAlgorithm::Sha256, 4);
        hasher.update(b"aaaabbbb");

        assert_eq!(hasher.count(), 2);
        assert_eq!(hasher.part_size(2), 4);
    }

    #[test]
    fn empty_write_opens_a_part() {
        let mut hasher = PartHasher::new(ChecksumAlgorithm::Md5, 4);
        hasher.update(b"");

        assert_eq!(hasher.count(), 1);
        assert_eq!(hasher.part_size(1), 0);
        assert_eq!(hasher.part_sum(1).hex(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn chunking_does_not_change_sums() {
        let data: Vec<u8> = (0u16..600).map(|v| (v % 251) as u8).collect();

        let mut whole = PartHasher::new(ChecksumAlgorithm::Sha256, 100);
        whole.update(&data);

        let mut pieces = PartHasher::new(ChecksumAlgorithm::Sha256, 100);
        for chunk in data.chunks(7) {
            pieces.update(chunk);
        }

        assert_eq!(whole.count(), pieces.count());
        assert_eq!(whole.sum_of_sums(), pieces.sum_of_sums());
        for part_number in 1..=whole.count() as i32 {
            assert_eq!(whole.part_sum(part_number), pieces.part_sum(part_number));
            assert_eq!(whole.part_size(part_number), pieces.part_size(part_number));
        }
    }

    #[test]
    fn sum_of_sums_hashes_the_part_digests() {
        let mut hasher = PartHasher::new(ChecksumAlgorithm::Sha256, 4);
        hasher.update(b"aaaabb");

        let mut concat = Vec::new();
        concat.extend_from_slice(sha256_of(b"aaaa").bytes());
        concat.extend_from_slice(sha256_of(b"bb").bytes());

        assert_eq!(hasher.sum_of_sums(), sha256_of(&concat));
    }
}
