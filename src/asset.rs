//! Consumed asset interfaces
//!
//! The engine never parses media containers itself. A format handler (JPEG,
//! PNG, BMFF) sits on the other side of [`AssetIo`]: it locates the manifest
//! JUMBF, reserves space for it, and exposes byte ranges of the final layout.
//! BMFF handlers additionally expose the box tree through [`BmffAssetIo`].

use crate::error::{Error, Result};

/// A byte range in an asset (offset and size)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset from start of the asset
    pub offset: u64,
    /// Size in bytes
    pub size: u64,
}

impl ByteRange {
    /// Create a new byte range
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset of this range
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// Check if this range is immediately followed by another (contiguous)
    pub fn is_contiguous_with(&self, other: &ByteRange) -> bool {
        self.end_offset() == other.offset
    }

    /// Check if this range fully contains another
    pub fn contains(&self, other: &ByteRange) -> bool {
        other.offset >= self.offset && other.end_offset() <= self.end_offset()
    }
}

/// Random-access view of a media asset plus manifest-space management
///
/// Read methods reflect the *final* layout: once `ensure_manifest_space` has
/// reserved room for the JUMBF blob, all offsets returned by the handler
/// (including `hash_exclusion_range`) are stable, so hashes taken over the
/// asset remain correct after the manifest is written.
pub trait AssetIo {
    /// Total asset length in bytes
    fn len(&self) -> u64;

    /// Whether the asset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `length` bytes starting at `offset`
    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// The embedded manifest store JUMBF, if the asset carries one
    fn manifest_jumbf(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Reserve room for a JUMBF blob of exactly `len` bytes
    ///
    /// Updates internal offsets so subsequent reads reflect the final layout.
    fn ensure_manifest_space(&mut self, _len: u64) -> Result<()> {
        Err(Error::AssetUnsupported("manifest space reservation"))
    }

    /// Write the final JUMBF into the reserved region
    fn write_manifest_jumbf(&mut self, _bytes: &[u8]) -> Result<()> {
        Err(Error::AssetUnsupported("manifest writing"))
    }

    /// The reserved manifest region, used as the single data-hash exclusion
    fn hash_exclusion_range(&self) -> Option<ByteRange> {
        None
    }
}

/// A FullBox header: version byte plus 3-byte flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullBoxInfo {
    pub version: u8,
    pub flags: [u8; 3],
}

/// One box in a BMFF tree, as reported by the format handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmffBox {
    /// Four-character box type (e.g. "ftyp", "mdat")
    pub box_type: String,

    /// Extended type for `uuid` boxes
    pub user_type: Option<[u8; 16]>,

    /// Offset of the box header from start of the asset
    pub offset: u64,

    /// Total box size including header
    pub size: u64,

    /// Offset of the box payload (after header, and after the FullBox
    /// version/flags when present)
    pub payload_offset: u64,

    /// Version/flags when the box is a FullBox
    pub full_box: Option<FullBoxInfo>,
}

impl BmffBox {
    /// Byte range covered by the whole box
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.size)
    }

    /// Size of the payload after the header
    pub fn payload_size(&self) -> u64 {
        self.size.saturating_sub(self.payload_offset - self.offset)
    }
}

/// BMFF extension of [`AssetIo`]: box lookup by xpath
///
/// An xpath is a slash-separated path of box types from the root, with
/// optional `[n]` indices to select among repeated siblings, e.g.
/// `/moov/trak[1]/mdia`.
pub trait BmffAssetIo: AssetIo {
    /// The first box matching `xpath`, if any
    fn box_by_path(&self, xpath: &str) -> Result<Option<BmffBox>>;

    /// All boxes matching `xpath`
    fn boxes_by_path(&self, xpath: &str) -> Result<Vec<BmffBox>>;

    /// All top-level boxes in file order
    fn top_level_boxes(&self) -> Result<Vec<BmffBox>>;
}

/// Borrowed asset handle passed into a validation run
///
/// Hard bindings pick the interface they need: DataHash works over any
/// [`AssetIo`], BMFF hashes require the box tree.
#[derive(Clone, Copy)]
pub enum AssetRef<'a> {
    /// Plain byte-oriented asset (JPEG, PNG, ...)
    Data(&'a dyn AssetIo),

    /// BMFF asset with box-tree access (MP4, HEIC, ...)
    Bmff(&'a dyn BmffAssetIo),
}

impl<'a> AssetRef<'a> {
    /// The byte-oriented view of the asset
    pub fn io(&self) -> &'a dyn AssetIo {
        match self {
            AssetRef::Data(io) => *io,
            AssetRef::Bmff(io) => *io,
        }
    }

    /// The BMFF view, when the asset has one
    pub fn bmff(&self) -> Option<&'a dyn BmffAssetIo> {
        match self {
            AssetRef::Data(_) => None,
            AssetRef::Bmff(io) => Some(*io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_end_and_contains() {
        let range = ByteRange::new(100, 50);
        assert_eq!(range.end_offset(), 150);
        assert!(range.contains(&ByteRange::new(120, 30)));
        assert!(!range.contains(&ByteRange::new(120, 31)));
        assert!(range.is_contiguous_with(&ByteRange::new(150, 10)));
    }

    #[test]
    fn test_bmff_box_payload_size() {
        let bx = BmffBox {
            box_type: "mdat".to_string(),
            user_type: None,
            offset: 32,
            size: 108,
            payload_offset: 40,
            full_box: None,
        };
        assert_eq!(bx.payload_size(), 100);
        assert_eq!(bx.range(), ByteRange::new(32, 108));
    }
}
