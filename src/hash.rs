//! Streaming digests and exclusion-range hashing
//!
//! Asset hashing never loads the whole source: bytes are pulled through
//! [`AssetIo::read_range`] in 1 MiB chunks and fed to the hasher, skipping
//! the exclusion ranges. Zero-length exclusions flagged as offset markers
//! splice the excluded box's start offset into the stream instead, so that
//! reordering otherwise-excluded regions still invalidates the digest.

use byteorder::{BigEndian, WriteBytesExt};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{
    asset::AssetIo,
    error::{Error, Result},
};

/// Chunk size for pulling asset bytes while hashing (1 MiB)
pub const HASH_CHUNK_SIZE: u64 = 1024 * 1024;

/// Hash algorithms accepted in claims and hash assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a C2PA algorithm identifier (`sha256`, `sha384`, `sha512`)
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(Error::AlgorithmUnsupported(other.to_string())),
        }
    }

    /// The C2PA identifier for this algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Streaming digest over one of the supported algorithms
pub enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    /// Create a streaming hasher for `alg`
    pub fn new(alg: HashAlgorithm) -> Self {
        match alg {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    /// Feed a chunk of data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// Consume the hasher and return the digest
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }

    /// The algorithm this hasher runs
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha256(_) => HashAlgorithm::Sha256,
            Self::Sha384(_) => HashAlgorithm::Sha384,
            Self::Sha512(_) => HashAlgorithm::Sha512,
        }
    }
}

/// One-shot digest of a byte slice
pub fn hash_bytes(data: &[u8], alg: HashAlgorithm) -> Vec<u8> {
    let mut hasher = Hasher::new(alg);
    hasher.update(data);
    hasher.finalize()
}

/// An exclusion range applied while hashing an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exclusion {
    pub start: u64,
    pub length: u64,

    /// Zero-length marker: splice the 8-byte big-endian `start` offset into
    /// the digest stream instead of reading bytes
    pub offset_marker: bool,
}

impl Exclusion {
    /// A plain skip-these-bytes exclusion
    pub fn new(start: u64, length: u64) -> Self {
        Self {
            start,
            length,
            offset_marker: false,
        }
    }

    /// An offset marker at `start`
    pub fn offset_marker(start: u64) -> Self {
        Self {
            start,
            length: 0,
            offset_marker: true,
        }
    }
}

/// Digest an asset while skipping exclusion ranges
///
/// Exclusions are sorted by start offset internally, so callers may pass
/// them in any order. Ranges must not overlap once sorted. For each offset
/// marker the 8-byte big-endian start offset is hashed in place of asset
/// bytes.
pub fn hash_asset_with_exclusions(
    asset: &dyn AssetIo,
    exclusions: &[Exclusion],
    alg: HashAlgorithm,
) -> Result<Vec<u8>> {
    let mut sorted: Vec<Exclusion> = exclusions.to_vec();
    sorted.sort_by_key(|e| (e.start, e.length));

    let total = asset.len();
    let mut hasher = Hasher::new(alg);
    let mut pos: u64 = 0;

    for exclusion in &sorted {
        if exclusion.start < pos {
            return Err(Error::Other(format!(
                "overlapping exclusion at offset {}",
                exclusion.start
            )));
        }
        if exclusion.start > total {
            return Err(Error::Other(format!(
                "exclusion at offset {} is past the end of the asset",
                exclusion.start
            )));
        }

        hash_range(asset, &mut hasher, pos, exclusion.start - pos)?;

        if exclusion.offset_marker {
            let mut marker = Vec::with_capacity(8);
            marker.write_u64::<BigEndian>(exclusion.start)?;
            hasher.update(&marker);
        }

        pos = exclusion.start + exclusion.length;
        if pos > total {
            return Err(Error::Other(format!(
                "exclusion at offset {} extends past the end of the asset",
                exclusion.start
            )));
        }
    }

    hash_range(asset, &mut hasher, pos, total - pos)?;
    Ok(hasher.finalize())
}

/// Digest a single contiguous range of the asset, chunked
pub(crate) fn hash_range(
    asset: &dyn AssetIo,
    hasher: &mut Hasher,
    offset: u64,
    length: u64,
) -> Result<()> {
    let mut pos = offset;
    let end = offset + length;
    while pos < end {
        let chunk = (end - pos).min(HASH_CHUNK_SIZE);
        let data = asset.read_range(pos, chunk)?;
        hasher.update(&data);
        pos += chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SliceAsset<'a>(&'a [u8]);

    impl AssetIo for SliceAsset<'_> {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }

        fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
            let start = offset as usize;
            let end = start + length as usize;
            self.0
                .get(start..end)
                .map(|s| s.to_vec())
                .ok_or_else(|| Error::Other("range out of bounds".to_string()))
        }
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        assert!(HashAlgorithm::from_name("sha256").is_ok());
        let err = HashAlgorithm::from_name("md5").unwrap_err();
        assert!(matches!(err, Error::AlgorithmUnsupported(ref name) if name == "md5"));
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(hash_bytes(b"abc", HashAlgorithm::Sha256).len(), 32);
        assert_eq!(hash_bytes(b"abc", HashAlgorithm::Sha384).len(), 48);
        assert_eq!(hash_bytes(b"abc", HashAlgorithm::Sha512).len(), 64);
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = hash_bytes(b"abc", HashAlgorithm::Sha256);
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_exclusion_skips_bytes() {
        let data = b"hello, excluded world";
        let asset = SliceAsset(data);

        // Exclude ", excluded" (offset 5, length 10)
        let digest = hash_asset_with_exclusions(
            &asset,
            &[Exclusion::new(5, 10)],
            HashAlgorithm::Sha256,
        )
        .unwrap();

        assert_eq!(digest, hash_bytes(b"hello world", HashAlgorithm::Sha256));
    }

    #[test]
    fn test_exclusion_order_does_not_matter() {
        let data: Vec<u8> = (0u8..=255).collect();
        let asset = SliceAsset(&data);

        let a = [Exclusion::new(10, 5), Exclusion::new(100, 20)];
        let b = [Exclusion::new(100, 20), Exclusion::new(10, 5)];

        let da = hash_asset_with_exclusions(&asset, &a, HashAlgorithm::Sha256).unwrap();
        let db = hash_asset_with_exclusions(&asset, &b, HashAlgorithm::Sha256).unwrap();
        assert_eq!(da, db);
    }

    #[test]
    fn test_overlapping_exclusions_rejected() {
        let data = vec![0u8; 64];
        let asset = SliceAsset(&data);

        let result = hash_asset_with_exclusions(
            &asset,
            &[Exclusion::new(0, 10), Exclusion::new(5, 10)],
            HashAlgorithm::Sha256,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_offset_marker_splices_position() {
        let data = b"abcdef";
        let asset = SliceAsset(data);

        let digest = hash_asset_with_exclusions(
            &asset,
            &[Exclusion::offset_marker(3)],
            HashAlgorithm::Sha256,
        )
        .unwrap();

        // Equivalent to hashing "abc" + be64(3) + "def"
        let mut expected = Hasher::new(HashAlgorithm::Sha256);
        expected.update(b"abc");
        expected.update(&3u64.to_be_bytes());
        expected.update(b"def");
        assert_eq!(digest, expected.finalize());
    }

    #[test]
    fn test_exclusion_past_end_rejected() {
        let data = vec![0u8; 16];
        let asset = SliceAsset(&data);

        assert!(hash_asset_with_exclusions(
            &asset,
            &[Exclusion::new(12, 10)],
            HashAlgorithm::Sha256
        )
        .is_err());
    }
}
