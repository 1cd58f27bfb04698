//! Unit tests for the multi-part hashing pipeline

use proptest::prelude::*;

use s3up::{ChecksumAlgorithm, ObjectHasher};

const KIB: u64 = 1024;

fn sha256(data: &[u8]) -> s3up::HashSum {
    let mut digest = ChecksumAlgorithm::Sha256.hasher();
    digest.update(data);
    digest.sum()
}

fn md5(data: &[u8]) -> s3up::HashSum {
    let mut digest = ChecksumAlgorithm::Md5.hasher();
    digest.update(data);
    digest.sum()
}

#[test]
fn empty_input_digests_the_empty_string() {
    let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 5 * KIB);
    hasher.update(&[]);

    assert_eq!(hasher.count(), 1);
    assert_eq!(hasher.size(), 0);
    assert_eq!(hasher.md5_sum().hex(), "d41d8cd98f00b204e9800998ecf8427e");
    assert_eq!(
        hasher.sum().base64(),
        "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
    );

    let sums = hasher.put_object_checksums();
    assert_eq!(sums.content_md5, hasher.md5_sum().base64());
}

#[test]
fn input_under_the_part_size_is_a_single_part() {
    let data = vec![0x5au8; 4 * KIB as usize];
    let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 5 * KIB);
    hasher.update(&data);

    assert_eq!(hasher.count(), 1);
    assert_eq!(hasher.part_size(1), 4 * KIB);
    assert_eq!(hasher.sum(), sha256(&data));
    assert_eq!(hasher.sum(), hasher.part_sum(1));
}

#[test]
fn exact_multiple_produces_dense_parts_and_composite_checksum() {
    // 15 units over a 5-unit part size: parts 1..=3
    let data: Vec<u8> = (0..15 * KIB).map(|i| (i % 251) as u8).collect();
    let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 5 * KIB);
    hasher.update(&data);

    assert_eq!(hasher.count(), 3);
    for part_number in 1..=3 {
        assert_eq!(hasher.part_size(part_number), 5 * KIB);
    }

    // the composite equals the digest of the concatenated part digests
    let mut concat = Vec::new();
    for part_number in 1..=3 {
        let start = (part_number - 1) as usize * 5 * KIB as usize;
        let part = &data[start..start + 5 * KIB as usize];
        assert_eq!(hasher.part_sum(part_number), sha256(part));
        concat.extend_from_slice(sha256(part).bytes());
    }
    assert_eq!(hasher.sum_of_sums(), sha256(&concat));

    // and the ETag is the hex MD5 hash-of-hashes plus the part count
    let mut md5_concat = Vec::new();
    for part_number in 1..=3 {
        md5_concat.extend_from_slice(hasher.md5_part_sum(part_number).bytes());
    }
    assert_eq!(hasher.etag(), format!("{}-3", md5(&md5_concat).hex()));
}

#[test]
fn ragged_input_leaves_a_short_trailing_part() {
    // 12 units over a 5-unit part size: 5, 5, 2
    let data = vec![1u8; 12 * KIB as usize];
    let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, 5 * KIB);
    hasher.update(&data);

    assert_eq!(hasher.count(), 3);
    assert_eq!(hasher.part_size(1), 5 * KIB);
    assert_eq!(hasher.part_size(2), 5 * KIB);
    assert_eq!(hasher.part_size(3), 2 * KIB);
    assert_eq!(hasher.size(), 12 * KIB);
}

#[test]
fn full_digest_is_independent_of_part_size() {
    let data: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();

    let mut sums = Vec::new();
    for part_size in [1u64, 7, 256, 1024, 4096] {
        let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Crc32C, part_size);
        hasher.update(&data);
        sums.push(hasher.sum());
    }

    assert!(sums.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn all_algorithms_agree_between_full_and_single_part() {
    let data = b"the quick brown fox";
    for algorithm in [
        ChecksumAlgorithm::Crc32,
        ChecksumAlgorithm::Crc32C,
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha256,
    ] {
        let mut hasher = ObjectHasher::new(algorithm, 1024);
        hasher.update(data);
        assert_eq!(hasher.count(), 1);
        assert_eq!(hasher.sum(), hasher.part_sum(1), "{algorithm}");
    }
}

proptest! {
    /// Feeding the same bytes in any chunking produces identical per-part
    /// digests, sizes, composite checksum, and full digest.
    #[test]
    fn chunking_never_changes_the_digests(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        part_size in 1u64..64,
        chunk in 1usize..97,
    ) {
        let mut whole = ObjectHasher::new(ChecksumAlgorithm::Sha256, part_size);
        whole.update(&data);

        let mut pieces = ObjectHasher::new(ChecksumAlgorithm::Sha256, part_size);
        if data.is_empty() {
            pieces.update(&data);
        } else {
            for piece in data.chunks(chunk) {
                pieces.update(piece);
            }
        }

        prop_assert_eq!(whole.count(), pieces.count());
        prop_assert_eq!(whole.sum(), pieces.sum());
        prop_assert_eq!(whole.sum_of_sums(), pieces.sum_of_sums());
        prop_assert_eq!(whole.md5_sum(), pieces.md5_sum());
        prop_assert_eq!(whole.etag(), pieces.etag());
        for part_number in 1..=whole.count() as i32 {
            prop_assert_eq!(whole.part_size(part_number), pieces.part_size(part_number));
            prop_assert_eq!(whole.part_sum(part_number), pieces.part_sum(part_number));
        }
    }

    /// The part sizes always partition the input: every part except the
    /// last is exactly part_size, and the sizes sum to the input length.
    #[test]
    fn part_sizes_partition_the_input(
        data in proptest::collection::vec(any::<u8>(), 1..2048),
        part_size in 1u64..64,
    ) {
        let mut hasher = ObjectHasher::new(ChecksumAlgorithm::Sha256, part_size);
        hasher.update(&data);

        let count = hasher.count() as i32;
        let mut total = 0;
        for part_number in 1..=count {
            let size = hasher.part_size(part_number);
            if part_number < count {
                prop_assert_eq!(size, part_size);
            } else {
                prop_assert!(size > 0 && size <= part_size);
            }
            total += size;
        }
        prop_assert_eq!(total, data.len() as u64);
    }
}
