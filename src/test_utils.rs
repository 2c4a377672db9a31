//! Test utilities: in-memory assets and signing credentials.
//!
//! This module provides the asset implementations the test suite signs and
//! validates against:
//! - [`MemoryAsset`]: a byte-oriented asset with a manifest insertion point,
//!   standing in for a JPEG/PNG handler
//! - [`MemoryBmffAsset`]: a synthesized MP4 box tree with manifest embedding
//!   in a top-level C2PA `uuid` box
//! - deterministic test signers over freshly generated keys
//!
//! Everything here is behind the `test-utils` feature (enabled by default,
//! disable with `--no-default-features` for production builds).

use pkcs8::EncodePrivateKey;
use spki::EncodePublicKey;

use crate::{
    asset::{AssetIo, BmffAssetIo, BmffBox, ByteRange, FullBoxInfo},
    cose::Signer,
    crypto::SigningAlg,
    error::{Error, Result},
};

/// Extended type of the C2PA BMFF `uuid` box
pub const C2PA_BMFF_UUID: [u8; 16] = [
    0xD8, 0xFE, 0xC3, 0xD6, 0x1B, 0x0E, 0x48, 0x3C, 0x92, 0x97, 0x58, 0x28, 0x87, 0x7E, 0xC4,
    0x81,
];

/// A byte-oriented asset with a manifest insertion point
///
/// Models what a JPEG or PNG handler exposes: the manifest JUMBF lives in a
/// reserved region inside the byte stream, and that region is the single
/// data-hash exclusion.
#[derive(Debug, Clone)]
pub struct MemoryAsset {
    data: Vec<u8>,
    manifest_range: Option<ByteRange>,
    has_manifest: bool,
    insert_offset: u64,
}

impl MemoryAsset {
    /// Wrap content bytes; the manifest insertion point sits after the
    /// first two bytes (a stand-in for the JPEG SOI marker)
    pub fn new(content: Vec<u8>) -> Self {
        let insert_offset = content.len().min(2) as u64;
        Self {
            data: content,
            manifest_range: None,
            has_manifest: false,
            insert_offset,
        }
    }

    /// The current asset bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Flip one byte, for tamper tests
    pub fn flip_byte(&mut self, offset: u64) {
        self.data[offset as usize] ^= 0xFF;
    }

    /// Overwrite one byte, for tamper tests that must keep text valid
    pub fn set_byte(&mut self, offset: u64, value: u8) {
        self.data[offset as usize] = value;
    }

    /// The first content offset outside the reserved manifest region
    pub fn first_content_offset(&self) -> u64 {
        match self.manifest_range {
            Some(range) if range.offset == 0 => range.end_offset(),
            _ => 0,
        }
    }
}

impl AssetIo for MemoryAsset {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start
            .checked_add(length as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::Other(format!("read past end of asset at {offset}")))?;
        Ok(self.data[start..end].to_vec())
    }

    fn manifest_jumbf(&self) -> Result<Option<Vec<u8>>> {
        match self.manifest_range {
            Some(range) if self.has_manifest => {
                Ok(Some(self.read_range(range.offset, range.size)?))
            }
            _ => Ok(None),
        }
    }

    fn ensure_manifest_space(&mut self, len: u64) -> Result<()> {
        if let Some(range) = self.manifest_range.take() {
            self.data
                .drain(range.offset as usize..range.end_offset() as usize);
        }
        let at = self.insert_offset as usize;
        self.data.splice(at..at, std::iter::repeat(0u8).take(len as usize));
        self.manifest_range = Some(ByteRange::new(self.insert_offset, len));
        self.has_manifest = false;
        Ok(())
    }

    fn write_manifest_jumbf(&mut self, bytes: &[u8]) -> Result<()> {
        let range = self
            .manifest_range
            .ok_or(Error::AssetUnsupported("write without reservation"))?;
        if bytes.len() as u64 != range.size {
            return Err(Error::Other(format!(
                "manifest is {} bytes but the reservation is {}",
                bytes.len(),
                range.size
            )));
        }
        self.data[range.offset as usize..range.end_offset() as usize].copy_from_slice(bytes);
        self.has_manifest = true;
        Ok(())
    }

    fn hash_exclusion_range(&self) -> Option<ByteRange> {
        self.manifest_range
    }
}

// BMFF box types that contain child boxes
const CONTAINER_TYPES: &[&str] = &["moov", "trak", "mdia", "minf", "stbl"];

// FullBox types whose payload starts with version/flags
const FULL_BOX_TYPES: &[&str] = &["mvhd", "tkhd", "mdhd", "pssh"];

/// A synthesized BMFF (MP4) asset with box-tree access
///
/// The manifest is embedded the way BMFF C2PA embedding works on disk: a
/// top-level `uuid` box with the C2PA extended type whose payload is
/// version/flags, a purpose string, a merkle offset and the JUMBF data.
#[derive(Debug, Clone)]
pub struct MemoryBmffAsset {
    data: Vec<u8>,
    manifest_data_range: Option<ByteRange>,
}

fn push_box(out: &mut Vec<u8>, box_type: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(payload);
}

impl MemoryBmffAsset {
    /// Build a small MP4: `ftyp`, `moov` (mvhd + trak/tkhd), `free`, and an
    /// `mdat` with `mdat_len` bytes of deterministic payload
    pub fn sample_mp4(mdat_len: usize) -> Self {
        let mut data = Vec::new();

        let mut ftyp = Vec::new();
        ftyp.extend_from_slice(b"isom");
        ftyp.extend_from_slice(&0u32.to_be_bytes());
        ftyp.extend_from_slice(b"isommp42");
        push_box(&mut data, b"ftyp", &ftyp);

        let mut mvhd = vec![0u8; 4]; // version 0, flags 0
        mvhd.extend_from_slice(&[0u8; 96]);
        let mut mvhd_box = Vec::new();
        push_box(&mut mvhd_box, b"mvhd", &mvhd);

        let mut tkhd = vec![0u8; 4];
        tkhd.extend_from_slice(&[0u8; 80]);
        let mut trak_payload = Vec::new();
        push_box(&mut trak_payload, b"tkhd", &tkhd);
        let mut trak_box = Vec::new();
        push_box(&mut trak_box, b"trak", &trak_payload);

        let mut moov_payload = Vec::new();
        moov_payload.extend_from_slice(&mvhd_box);
        moov_payload.extend_from_slice(&trak_box);
        push_box(&mut data, b"moov", &moov_payload);

        push_box(&mut data, b"free", &[0u8; 16]);

        let mdat: Vec<u8> = (0..mdat_len).map(|i| (i * 7 + 3) as u8).collect();
        push_box(&mut data, b"mdat", &mdat);

        Self {
            data,
            manifest_data_range: None,
        }
    }

    /// The current asset bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Flip a byte inside the first `mdat` payload
    pub fn tamper_mdat(&mut self, payload_offset: u64) {
        let mdat = self
            .top_level_boxes()
            .unwrap()
            .into_iter()
            .find(|b| b.box_type == "mdat")
            .expect("sample has an mdat");
        let at = (mdat.payload_offset + payload_offset) as usize;
        self.data[at] ^= 0xFF;
    }

    /// A copy with two top-level boxes' byte ranges swapped
    pub fn with_swapped_top_level_boxes(&self, first: &str, second: &str) -> Self {
        let boxes = self.top_level_boxes().unwrap();
        let a = boxes.iter().find(|b| b.box_type == first).expect("box present");
        let b = boxes.iter().find(|b| b.box_type == second).expect("box present");
        let (a, b) = if a.offset < b.offset { (a, b) } else { (b, a) };

        let mut data = Vec::with_capacity(self.data.len());
        data.extend_from_slice(&self.data[..a.offset as usize]);
        data.extend_from_slice(&self.data[b.offset as usize..b.range().end_offset() as usize]);
        data.extend_from_slice(
            &self.data[a.range().end_offset() as usize..b.offset as usize],
        );
        data.extend_from_slice(&self.data[a.offset as usize..a.range().end_offset() as usize]);
        data.extend_from_slice(&self.data[b.range().end_offset() as usize..]);

        Self {
            data,
            manifest_data_range: None,
        }
    }

    fn c2pa_uuid_box(&self) -> Option<BmffBox> {
        self.top_level_boxes()
            .ok()?
            .into_iter()
            .find(|b| b.box_type == "uuid" && b.user_type == Some(C2PA_BMFF_UUID))
    }

    fn scan(&self, start: u64, end: u64) -> Result<Vec<BmffBox>> {
        let mut boxes = Vec::new();
        let mut pos = start;
        while pos + 8 <= end {
            let size = u32::from_be_bytes(
                self.data[pos as usize..pos as usize + 4].try_into().unwrap(),
            ) as u64;
            let box_type: String = self.data[pos as usize + 4..pos as usize + 8]
                .iter()
                .map(|b| *b as char)
                .collect();
            if size < 8 || pos + size > end {
                return Err(Error::Other(format!(
                    "malformed box `{box_type}` at offset {pos}"
                )));
            }

            let mut payload_offset = pos + 8;
            let mut user_type = None;
            if box_type == "uuid" {
                if size < 24 {
                    return Err(Error::Other(format!("short uuid box at offset {pos}")));
                }
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(&self.data[payload_offset as usize..payload_offset as usize + 16]);
                user_type = Some(uuid);
                payload_offset += 16;
            }

            let mut full_box = None;
            if FULL_BOX_TYPES.contains(&box_type.as_str()) && size >= (payload_offset - pos) + 4 {
                let raw = &self.data[payload_offset as usize..payload_offset as usize + 4];
                full_box = Some(FullBoxInfo {
                    version: raw[0],
                    flags: [raw[1], raw[2], raw[3]],
                });
                payload_offset += 4;
            }

            boxes.push(BmffBox {
                box_type,
                user_type,
                offset: pos,
                size,
                payload_offset,
                full_box,
            });
            pos += size;
        }
        Ok(boxes)
    }

    fn children_of(&self, parent: &BmffBox) -> Result<Vec<BmffBox>> {
        if !CONTAINER_TYPES.contains(&parent.box_type.as_str()) {
            return Ok(Vec::new());
        }
        self.scan(parent.payload_offset, parent.offset + parent.size)
    }

    /// Resolve one xpath segment (`type` or `type[n]`, 0-based index)
    fn segment_matches(segment: &str) -> (&str, Option<usize>) {
        match segment.split_once('[') {
            Some((name, index)) => {
                let index = index.trim_end_matches(']').parse().ok();
                (name, index)
            }
            None => (segment, None),
        }
    }
}

impl AssetIo for MemoryBmffAsset {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = offset as usize;
        let end = start
            .checked_add(length as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::Other(format!("read past end of asset at {offset}")))?;
        Ok(self.data[start..end].to_vec())
    }

    fn manifest_jumbf(&self) -> Result<Option<Vec<u8>>> {
        match self.manifest_data_range {
            Some(range) => {
                let bytes = self.read_range(range.offset, range.size)?;
                if bytes.iter().all(|b| *b == 0) {
                    Ok(None) // reserved but not yet written
                } else {
                    Ok(Some(bytes))
                }
            }
            None => Ok(None),
        }
    }

    fn ensure_manifest_space(&mut self, len: u64) -> Result<()> {
        if let Some(existing) = self.c2pa_uuid_box() {
            self.data
                .drain(existing.offset as usize..existing.range().end_offset() as usize);
            self.manifest_data_range = None;
        }

        // header + extended type + version/flags + purpose + merkle offset
        let mut payload = Vec::new();
        payload.extend_from_slice(&C2PA_BMFF_UUID);
        payload.extend_from_slice(&[0u8; 4]); // version/flags
        payload.extend_from_slice(b"manifest\0");
        payload.extend_from_slice(&0u64.to_be_bytes()); // merkle offset
        let data_offset = self.data.len() as u64 + 8 + payload.len() as u64;
        payload.extend_from_slice(&vec![0u8; len as usize]);
        push_box(&mut self.data, b"uuid", &payload);

        self.manifest_data_range = Some(ByteRange::new(data_offset, len));
        Ok(())
    }

    fn write_manifest_jumbf(&mut self, bytes: &[u8]) -> Result<()> {
        let range = self
            .manifest_data_range
            .ok_or(Error::AssetUnsupported("write without reservation"))?;
        if bytes.len() as u64 != range.size {
            return Err(Error::Other(format!(
                "manifest is {} bytes but the reservation is {}",
                bytes.len(),
                range.size
            )));
        }
        self.data[range.offset as usize..range.end_offset() as usize].copy_from_slice(bytes);
        Ok(())
    }

    fn hash_exclusion_range(&self) -> Option<ByteRange> {
        // the whole uuid box, not just the JUMBF payload
        self.c2pa_uuid_box().map(|b| b.range())
    }
}

impl BmffAssetIo for MemoryBmffAsset {
    fn box_by_path(&self, xpath: &str) -> Result<Option<BmffBox>> {
        Ok(self.boxes_by_path(xpath)?.into_iter().next())
    }

    fn boxes_by_path(&self, xpath: &str) -> Result<Vec<BmffBox>> {
        let segments: Vec<&str> = xpath
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let mut current = self.top_level_boxes()?;
        for (depth, segment) in segments.iter().enumerate() {
            let (name, index) = Self::segment_matches(segment);
            let mut matched: Vec<BmffBox> = current
                .iter()
                .filter(|b| b.box_type == name)
                .cloned()
                .collect();
            if let Some(index) = index {
                matched = matched.into_iter().skip(index).take(1).collect();
            }
            if depth == segments.len() - 1 {
                return Ok(matched);
            }
            let mut next = Vec::new();
            for bx in &matched {
                next.extend(self.children_of(bx)?);
            }
            current = next;
        }
        Ok(Vec::new())
    }

    fn top_level_boxes(&self) -> Result<Vec<BmffBox>> {
        self.scan(0, self.data.len() as u64)
    }
}

/// A throwaway ES256 signer whose x5chain carries the bare public key
pub fn test_signer_es256() -> Signer {
    let sk = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
    let private_der = sk.to_pkcs8_der().unwrap().as_bytes().to_vec();
    let public_der = sk
        .verifying_key()
        .to_public_key_der()
        .unwrap()
        .as_bytes()
        .to_vec();
    Signer::from_keys(SigningAlg::Es256, private_der, vec![public_der])
}

/// A throwaway Ed25519 signer whose x5chain carries the bare public key
pub fn test_signer_ed25519() -> Signer {
    let sk = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    let private_der = sk.to_pkcs8_der().unwrap().as_bytes().to_vec();
    let public_der = sk
        .verifying_key()
        .to_public_key_der()
        .unwrap()
        .as_bytes()
        .to_vec();
    Signer::from_keys(SigningAlg::Ed25519, private_der, vec![public_der])
}

/// Deterministic content bytes for JPEG-like test assets
pub fn sample_image_bytes(len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
    if data.len() >= 2 {
        // JPEG SOI stand-in
        data[0] = 0xFF;
        data[1] = 0xD8;
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_asset_reservation_flow() {
        let mut asset = MemoryAsset::new(sample_image_bytes(64));
        assert!(asset.manifest_jumbf().unwrap().is_none());

        asset.ensure_manifest_space(16).unwrap();
        assert_eq!(asset.len(), 80);
        assert_eq!(asset.hash_exclusion_range(), Some(ByteRange::new(2, 16)));

        asset.write_manifest_jumbf(&[0xAB; 16]).unwrap();
        assert_eq!(asset.manifest_jumbf().unwrap().unwrap(), vec![0xAB; 16]);

        // re-reserving replaces the region
        asset.ensure_manifest_space(8).unwrap();
        assert_eq!(asset.len(), 72);
        assert!(asset.manifest_jumbf().unwrap().is_none());
    }

    #[test]
    fn test_memory_asset_rejects_wrong_write_size() {
        let mut asset = MemoryAsset::new(sample_image_bytes(32));
        asset.ensure_manifest_space(16).unwrap();
        assert!(asset.write_manifest_jumbf(&[0u8; 15]).is_err());
    }

    #[test]
    fn test_bmff_top_level_scan() {
        let asset = MemoryBmffAsset::sample_mp4(100);
        let boxes = asset.top_level_boxes().unwrap();
        let types: Vec<&str> = boxes.iter().map(|b| b.box_type.as_str()).collect();
        assert_eq!(types, vec!["ftyp", "moov", "free", "mdat"]);
    }

    #[test]
    fn test_bmff_xpath_resolution() {
        let asset = MemoryBmffAsset::sample_mp4(100);

        let mvhd = asset.box_by_path("/moov/mvhd").unwrap().unwrap();
        assert_eq!(mvhd.box_type, "mvhd");
        assert_eq!(mvhd.full_box, Some(FullBoxInfo { version: 0, flags: [0, 0, 0] }));

        let tkhd = asset.box_by_path("/moov/trak[0]/tkhd").unwrap().unwrap();
        assert_eq!(tkhd.box_type, "tkhd");

        assert!(asset.box_by_path("/moov/none").unwrap().is_none());
    }

    #[test]
    fn test_bmff_manifest_embedding() {
        let mut asset = MemoryBmffAsset::sample_mp4(64);
        asset.ensure_manifest_space(32).unwrap();

        let uuid_box = asset.c2pa_uuid_box().unwrap();
        assert_eq!(uuid_box.user_type, Some(C2PA_BMFF_UUID));
        assert_eq!(asset.hash_exclusion_range(), Some(uuid_box.range()));

        asset.write_manifest_jumbf(&[0x42; 32]).unwrap();
        assert_eq!(asset.manifest_jumbf().unwrap().unwrap(), vec![0x42; 32]);

        // reservation is replaced, not duplicated
        asset.ensure_manifest_space(16).unwrap();
        let uuids: Vec<BmffBox> = asset
            .top_level_boxes()
            .unwrap()
            .into_iter()
            .filter(|b| b.box_type == "uuid")
            .collect();
        assert_eq!(uuids.len(), 1);
    }

    #[test]
    fn test_bmff_box_swap() {
        let asset = MemoryBmffAsset::sample_mp4(64);
        let swapped = asset.with_swapped_top_level_boxes("free", "mdat");
        let types: Vec<String> = swapped
            .top_level_boxes()
            .unwrap()
            .into_iter()
            .map(|b| b.box_type)
            .collect();
        assert_eq!(types, vec!["ftyp", "moov", "mdat", "free"]);
        assert_eq!(swapped.len(), asset.len());
    }
}
