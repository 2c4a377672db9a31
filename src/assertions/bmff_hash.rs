//! BMFF hash assertion: the hard binding for ISO base-media assets
//!
//! Exclusions are box-path based rather than byte-range based: each entry
//! names an xpath and optional conditions (size, FullBox version/flags,
//! data probes) that the located box must satisfy. Non-excluded top-level
//! boxes contribute an offset marker to the hash stream so reordering them
//! invalidates the digest. Streamed `mdat` content is bound through Merkle
//! maps whose leaf hashes are compared directly.

use serde::{Deserialize, Serialize};

use crate::{
    asset::{AssetIo, BmffAssetIo, BmffBox, ByteRange},
    cose::fit_to_size,
    error::{Error, Result},
    hash::{hash_asset_with_exclusions, hash_bytes, Exclusion, HashAlgorithm, Hasher},
    jumbf::{ChildBox, SuperBox, CBOR_ASSERTION_UUID},
    merkle::{BlockSizing, StreamingChunkHasher},
    status::{ValidationCode, ValidationReport},
};

use super::labels;

const BMFF_HASH_PADDING: usize = 128;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct DataMatchWire {
    offset: u64,
    #[serde(with = "serde_bytes")]
    value: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct SubsetWire {
    offset: u64,
    length: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ExclusionWire {
    xpath: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<serde_bytes::ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Vec<DataMatchWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subset: Option<Vec<SubsetWire>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct MerkleMapWire {
    #[serde(rename = "uniqueId")]
    unique_id: u32,
    #[serde(rename = "localId")]
    local_id: u32,
    count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(rename = "initHash", skip_serializing_if = "Option::is_none")]
    init_hash: Option<serde_bytes::ByteBuf>,
    hashes: Vec<serde_bytes::ByteBuf>,
    #[serde(rename = "fixedBlockSize", skip_serializing_if = "Option::is_none")]
    fixed_block_size: Option<u64>,
    #[serde(rename = "variableBlockSizes", skip_serializing_if = "Option::is_none")]
    variable_block_sizes: Option<Vec<u64>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct BmffHashWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusions: Option<Vec<ExclusionWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<serde_bytes::ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merkle: Option<Vec<MerkleMapWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pad: Option<serde_bytes::ByteBuf>,
}

/// A byte probe inside a candidate exclusion box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMatch {
    /// Offset relative to the box start
    pub offset: u64,
    pub value: Vec<u8>,
}

/// A sub-range of a matched box to exclude instead of the whole box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetRange {
    /// Offset relative to the box start
    pub offset: u64,
    /// Length; zero means the remainder of the box
    pub length: u64,
}

/// One box-path-based exclusion entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmffExclusion {
    /// Box path, e.g. `/uuid` or `/moov/trak[1]/mdia`
    pub xpath: String,

    /// Required exact box size
    pub length: Option<u64>,

    /// Required FullBox version
    pub version: Option<u8>,

    /// Required FullBox flags
    pub flags: Option<[u8; 3]>,

    /// `true` (default): flags must equal; `false`: bitwise-AND must equal
    pub exact: bool,

    /// Byte probes that must all match
    pub data: Vec<DataMatch>,

    /// Partial exclusion ranges; empty excludes the whole box
    pub subset: Vec<SubsetRange>,
}

impl BmffExclusion {
    /// Exclude every box matching `xpath`
    pub fn new(xpath: impl Into<String>) -> Self {
        Self {
            xpath: xpath.into(),
            length: None,
            version: None,
            flags: None,
            exact: true,
            data: Vec::new(),
            subset: Vec::new(),
        }
    }

    /// Whether `bx` satisfies every condition of this entry
    fn matches(&self, bx: &BmffBox, asset: &dyn BmffAssetIo) -> Result<bool> {
        if let Some(length) = self.length {
            if length != bx.size {
                return Ok(false);
            }
        }
        if let Some(version) = self.version {
            match bx.full_box {
                Some(fb) if fb.version == version => {}
                _ => return Ok(false),
            }
        }
        if let Some(flags) = self.flags {
            let Some(fb) = bx.full_box else {
                return Ok(false);
            };
            let matched = if self.exact {
                fb.flags == flags
            } else {
                [
                    fb.flags[0] & flags[0],
                    fb.flags[1] & flags[1],
                    fb.flags[2] & flags[2],
                ] == flags
            };
            if !matched {
                return Ok(false);
            }
        }
        for probe in &self.data {
            if probe.offset + probe.value.len() as u64 > bx.size {
                return Ok(false);
            }
            let bytes = asset.read_range(bx.offset + probe.offset, probe.value.len() as u64)?;
            if bytes != probe.value {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// One per-track Merkle record over streamed `mdat` chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleMap {
    pub unique_id: u32,

    /// Track id
    pub local_id: u32,

    /// Declared chunk count; must equal `hashes.len()`
    pub count: u32,

    /// Digest algorithm; inherits from the assertion when absent
    pub alg: Option<HashAlgorithm>,

    /// Digest of the initialization segment (fMP4)
    pub init_hash: Option<Vec<u8>>,

    /// Leaf hashes compared directly against recomputed chunk digests
    pub hashes: Vec<Vec<u8>>,

    pub fixed_block_size: Option<u64>,
    pub variable_block_sizes: Option<Vec<u64>>,
}

impl MerkleMap {
    /// Chunk offsets/lengths over an `mdat` payload, or `None` when the
    /// sizing declaration is unusable
    fn chunk_ranges(&self, mdat: &BmffBox) -> Option<Vec<ByteRange>> {
        let payload_start = mdat.payload_offset;
        let payload_len = mdat.payload_size();

        match (&self.fixed_block_size, &self.variable_block_sizes) {
            (Some(size), None) => {
                if *size == 0 {
                    return None;
                }
                let mut ranges = Vec::with_capacity(self.count as usize);
                let mut pos = 0u64;
                for _ in 0..self.count {
                    if pos >= payload_len {
                        return None;
                    }
                    let len = (*size).min(payload_len - pos);
                    ranges.push(ByteRange::new(payload_start + pos, len));
                    pos += len;
                }
                Some(ranges)
            }
            (None, Some(sizes)) => {
                if sizes.len() != self.count as usize {
                    return None;
                }
                let mut ranges = Vec::with_capacity(sizes.len());
                let mut pos = 0u64;
                for size in sizes {
                    if *size == 0 || pos + size > payload_len {
                        return None;
                    }
                    ranges.push(ByteRange::new(payload_start + pos, *size));
                    pos += size;
                }
                Some(ranges)
            }
            _ => None,
        }
    }
}

/// Hard-binding assertion for BMFF assets (v2 and v3)
#[derive(Debug, Clone)]
pub struct BmffHashAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,

    /// Assertion version, 2 or 3
    pub version: u8,

    pub name: Option<String>,
    pub algorithm: Option<HashAlgorithm>,

    /// Flat hash over the non-excluded stream; absent in Merkle mode
    pub hash: Option<Vec<u8>>,

    pub exclusions: Vec<BmffExclusion>,

    /// Merkle maps, one per streamed `mdat`
    pub merkle: Option<Vec<MerkleMap>>,

    pub padding_length: usize,

    pub(crate) source_box: Option<SuperBox>,
}

impl BmffHashAssertion {
    /// A fresh v2 or v3 assertion with no binding computed yet
    pub fn new(version: u8, alg: HashAlgorithm) -> Result<Self> {
        let label = match version {
            2 => labels::BMFF_HASH_V2,
            3 => labels::BMFF_HASH_V3,
            other => {
                return Err(Error::AssertionInvalid {
                    label: labels::BMFF_HASH_V2.to_string(),
                    reason: format!("unsupported BMFF hash version {other}"),
                })
            }
        };
        Ok(Self {
            label: label.to_string(),
            label_suffix: None,
            version,
            name: None,
            algorithm: Some(alg),
            hash: Some(vec![0; alg.digest_len()]),
            exclusions: Vec::new(),
            merkle: None,
            padding_length: BMFF_HASH_PADDING,
            source_box: None,
        })
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        let version = match base_label {
            labels::BMFF_HASH_V2 => 2,
            labels::BMFF_HASH_V3 => 3,
            other => {
                return Err(Error::AssertionInvalid {
                    label: other.to_string(),
                    reason: "not a BMFF hash label".to_string(),
                })
            }
        };
        let invalid = |reason: String| Error::AssertionInvalid {
            label: base_label.to_string(),
            reason,
        };

        let cbor = sb
            .cbor_content()
            .ok_or_else(|| invalid("missing CBOR content box".to_string()))?;
        let wire: BmffHashWire =
            serde_cbor::from_slice(cbor).map_err(|e| invalid(format!("bad CBOR: {e}")))?;

        let mut exclusions = Vec::new();
        for entry in wire.exclusions.unwrap_or_default() {
            let flags = match entry.flags {
                Some(raw) => {
                    let bytes: [u8; 3] = raw
                        .as_slice()
                        .try_into()
                        .map_err(|_| invalid("flags must be exactly 3 bytes".to_string()))?;
                    Some(bytes)
                }
                None => None,
            };
            exclusions.push(BmffExclusion {
                xpath: entry.xpath,
                length: entry.length,
                version: entry.version,
                flags,
                exact: entry.exact.unwrap_or(true),
                data: entry
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|d| DataMatch {
                        offset: d.offset,
                        value: d.value,
                    })
                    .collect(),
                subset: entry
                    .subset
                    .unwrap_or_default()
                    .into_iter()
                    .map(|s| SubsetRange {
                        offset: s.offset,
                        length: s.length,
                    })
                    .collect(),
            });
        }

        let merkle = match wire.merkle {
            Some(maps) => {
                let mut parsed = Vec::with_capacity(maps.len());
                for map in maps {
                    parsed.push(MerkleMap {
                        unique_id: map.unique_id,
                        local_id: map.local_id,
                        count: map.count,
                        alg: map.alg.as_deref().map(HashAlgorithm::from_name).transpose()?,
                        init_hash: map.init_hash.map(|b| b.into_vec()),
                        hashes: map.hashes.into_iter().map(|b| b.into_vec()).collect(),
                        fixed_block_size: map.fixed_block_size,
                        variable_block_sizes: map.variable_block_sizes,
                    });
                }
                Some(parsed)
            }
            None => None,
        };

        if let Some(pad) = &wire.pad {
            if pad.iter().any(|b| *b != 0) {
                return Err(invalid("pad contains non-zero bytes".to_string()));
            }
        }

        Ok(Self {
            label: base_label.to_string(),
            label_suffix: suffix,
            version,
            name: wire.name,
            algorithm: wire.alg.as_deref().map(HashAlgorithm::from_name).transpose()?,
            hash: wire.hash.map(|b| b.into_vec()),
            exclusions,
            merkle,
            padding_length: wire.pad.map(|p| p.len()).unwrap_or(0),
            source_box: Some(sb.clone()),
        })
    }

    fn wire(&self, pad: usize) -> BmffHashWire {
        BmffHashWire {
            exclusions: if self.exclusions.is_empty() {
                None
            } else {
                Some(
                    self.exclusions
                        .iter()
                        .map(|e| ExclusionWire {
                            xpath: e.xpath.clone(),
                            length: e.length,
                            version: e.version,
                            flags: e.flags.map(|f| serde_bytes::ByteBuf::from(f.to_vec())),
                            exact: if e.exact { None } else { Some(false) },
                            data: if e.data.is_empty() {
                                None
                            } else {
                                Some(
                                    e.data
                                        .iter()
                                        .map(|d| DataMatchWire {
                                            offset: d.offset,
                                            value: d.value.clone(),
                                        })
                                        .collect(),
                                )
                            },
                            subset: if e.subset.is_empty() {
                                None
                            } else {
                                Some(
                                    e.subset
                                        .iter()
                                        .map(|s| SubsetWire {
                                            offset: s.offset,
                                            length: s.length,
                                        })
                                        .collect(),
                                )
                            },
                        })
                        .collect(),
                )
            },
            alg: self.algorithm.map(|a| a.as_str().to_string()),
            hash: self
                .hash
                .as_ref()
                .map(|h| serde_bytes::ByteBuf::from(h.clone())),
            merkle: self.merkle.as_ref().map(|maps| {
                maps.iter()
                    .map(|m| MerkleMapWire {
                        unique_id: m.unique_id,
                        local_id: m.local_id,
                        count: m.count,
                        alg: m.alg.map(|a| a.as_str().to_string()),
                        init_hash: m
                            .init_hash
                            .as_ref()
                            .map(|h| serde_bytes::ByteBuf::from(h.clone())),
                        hashes: m
                            .hashes
                            .iter()
                            .map(|h| serde_bytes::ByteBuf::from(h.clone()))
                            .collect(),
                        fixed_block_size: m.fixed_block_size,
                        variable_block_sizes: m.variable_block_sizes.clone(),
                    })
                    .collect()
            }),
            name: self.name.clone(),
            pad: Some(serde_bytes::ByteBuf::from(vec![0; pad])),
        }
    }

    /// The full wire label
    pub fn full_label(&self) -> String {
        super::full_label(&self.label, self.label_suffix)
    }

    /// Serialize into the assertion superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let cbor = serde_cbor::to_vec(&self.wire(self.padding_length))?;
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, self.full_label());
        sb.push_child(ChildBox::Cbor(cbor));
        Ok(sb)
    }

    /// Resolve exclusion entries against the box tree: returns the hash
    /// exclusions (whole boxes and subsets) plus offset markers for every
    /// non-excluded top-level box
    fn resolve_exclusions(&self, asset: &dyn BmffAssetIo) -> Result<Vec<Exclusion>> {
        let mut ranges: Vec<Exclusion> = Vec::new();
        let mut whole_boxes: Vec<ByteRange> = Vec::new();

        for entry in &self.exclusions {
            for bx in asset.boxes_by_path(&entry.xpath)? {
                if !entry.matches(&bx, asset)? {
                    continue;
                }
                if entry.subset.is_empty() {
                    ranges.push(Exclusion::new(bx.offset, bx.size));
                    whole_boxes.push(bx.range());
                } else {
                    for subset in &entry.subset {
                        if subset.offset >= bx.size {
                            continue;
                        }
                        let remainder = bx.size - subset.offset;
                        let length = if subset.length == 0 {
                            remainder
                        } else {
                            subset.length.min(remainder)
                        };
                        ranges.push(Exclusion::new(bx.offset + subset.offset, length));
                    }
                }
            }
        }

        for bx in asset.top_level_boxes()? {
            let excluded = whole_boxes.iter().any(|range| *range == bx.range());
            if !excluded {
                ranges.push(Exclusion::offset_marker(bx.offset));
            }
        }

        Ok(ranges)
    }

    /// Hash the initialization segment (`ftyp` + `moov`, with `pssh` and
    /// `uuid` children excluded)
    fn init_segment_hash(&self, asset: &dyn BmffAssetIo, alg: HashAlgorithm) -> Result<Vec<u8>> {
        let mut spans: Vec<ByteRange> = Vec::new();
        for bx in asset.top_level_boxes()? {
            if bx.box_type == "ftyp" || bx.box_type == "moov" {
                spans.push(bx.range());
            }
        }

        let mut excluded: Vec<ByteRange> = Vec::new();
        for path in ["/moov/pssh", "/moov/uuid"] {
            for bx in asset.boxes_by_path(path)? {
                excluded.push(bx.range());
            }
        }
        excluded.sort_by_key(|r| r.offset);

        let mut hasher = Hasher::new(alg);
        for span in spans {
            let mut pos = span.offset;
            let end = span.end_offset();
            for skip in excluded.iter().filter(|r| r.offset >= span.offset && r.end_offset() <= end) {
                if skip.offset > pos {
                    let data = asset.read_range(pos, skip.offset - pos)?;
                    hasher.update(&data);
                }
                pos = skip.end_offset();
            }
            if end > pos {
                let data = asset.read_range(pos, end - pos)?;
                hasher.update(&data);
            }
        }
        Ok(hasher.finalize())
    }

    /// Validate this binding against the asset's box tree
    pub fn validate_against_asset(
        &self,
        asset: &dyn BmffAssetIo,
        default_alg: Option<HashAlgorithm>,
        report: &mut ValidationReport,
        uri: &str,
    ) {
        let alg = match self.algorithm.or(default_alg) {
            Some(alg) => alg,
            None => {
                report.add(
                    ValidationCode::AlgorithmUnsupported,
                    Some(uri.to_string()),
                    "no hash algorithm on assertion or claim",
                );
                return;
            }
        };

        if let Some(maps) = &self.merkle {
            self.validate_merkle(asset, maps, alg, report, uri);
            return;
        }

        let Some(expected) = &self.hash else {
            report.add(
                ValidationCode::AssertionBmffHashMalformed,
                Some(uri.to_string()),
                "assertion has neither a hash nor merkle maps",
            );
            return;
        };

        let exclusions = match self.resolve_exclusions(asset) {
            Ok(exclusions) => exclusions,
            Err(err) => {
                report.add(
                    ValidationCode::AssertionBmffHashMalformed,
                    Some(uri.to_string()),
                    format!("cannot resolve exclusions: {err}"),
                );
                return;
            }
        };

        match hash_asset_with_exclusions(asset, &exclusions, alg) {
            Ok(digest) if digest == *expected => {
                report.add(
                    ValidationCode::AssertionBmffHashMatch,
                    Some(uri.to_string()),
                    "BMFF stream hash matches",
                );
            }
            Ok(_) => {
                report.add(
                    ValidationCode::AssertionBmffHashMismatch,
                    Some(uri.to_string()),
                    "BMFF stream bytes do not match the declared hash",
                );
            }
            Err(err) => {
                report.add(
                    ValidationCode::AssertionBmffHashMismatch,
                    Some(uri.to_string()),
                    format!("cannot hash asset: {err}"),
                );
            }
        }
    }

    fn validate_merkle(
        &self,
        asset: &dyn BmffAssetIo,
        maps: &[MerkleMap],
        assertion_alg: HashAlgorithm,
        report: &mut ValidationReport,
        uri: &str,
    ) {
        let mdats: Vec<BmffBox> = match asset.top_level_boxes() {
            Ok(boxes) => boxes.into_iter().filter(|b| b.box_type == "mdat").collect(),
            Err(err) => {
                report.add(
                    ValidationCode::AssertionBmffHashMalformed,
                    Some(uri.to_string()),
                    format!("cannot enumerate boxes: {err}"),
                );
                return;
            }
        };

        for (index, map) in maps.iter().enumerate() {
            let alg = map.alg.unwrap_or(assertion_alg);

            if map.count as usize != map.hashes.len() {
                report.add(
                    ValidationCode::AssertionBmffHashMalformed,
                    Some(uri.to_string()),
                    format!(
                        "merkle map {index} declares {} chunks but carries {} hashes",
                        map.count,
                        map.hashes.len()
                    ),
                );
                return;
            }

            let Some(mdat) = mdats.get(index) else {
                report.add(
                    ValidationCode::AssertionBmffHashMalformed,
                    Some(uri.to_string()),
                    format!("merkle map {index} has no matching mdat box"),
                );
                return;
            };

            let Some(ranges) = map.chunk_ranges(mdat) else {
                report.add(
                    ValidationCode::AssertionBmffHashMalformed,
                    Some(uri.to_string()),
                    format!("merkle map {index} block sizing does not fit the mdat payload"),
                );
                return;
            };

            for (chunk, range) in ranges.iter().enumerate() {
                let data = match asset.read_range(range.offset, range.size) {
                    Ok(data) => data,
                    Err(err) => {
                        report.add(
                            ValidationCode::AssertionBmffHashMismatch,
                            Some(uri.to_string()),
                            format!("cannot read chunk {chunk}: {err}"),
                        );
                        return;
                    }
                };
                if hash_bytes(&data, alg) != map.hashes[chunk] {
                    report.add(
                        ValidationCode::AssertionBmffHashMismatch,
                        Some(uri.to_string()),
                        format!("chunk {chunk} of merkle map {index} does not match"),
                    );
                    return;
                }
            }

            if let Some(expected) = &map.init_hash {
                match self.init_segment_hash(asset, alg) {
                    Ok(digest) if digest == *expected => {}
                    Ok(_) => {
                        report.add(
                            ValidationCode::AssertionBmffHashMismatch,
                            Some(uri.to_string()),
                            "initialization segment does not match",
                        );
                        return;
                    }
                    Err(err) => {
                        report.add(
                            ValidationCode::AssertionBmffHashMismatch,
                            Some(uri.to_string()),
                            format!("cannot hash initialization segment: {err}"),
                        );
                        return;
                    }
                }
            }
        }

        report.add(
            ValidationCode::AssertionBmffHashMatch,
            Some(uri.to_string()),
            "all merkle chunks match",
        );
    }

    /// Compute the flat hash against the asset during signing, keeping the
    /// assertion envelope at its measured size
    pub fn update_with_asset(&mut self, asset: &dyn BmffAssetIo) -> Result<()> {
        let alg = self
            .algorithm
            .ok_or(Error::RequiredFieldMissing("BMFF hash algorithm"))?;
        let target = self.to_jumbf()?.measured_size()?;
        let reserved = self.padding_length as u64;

        let exclusions = self.resolve_exclusions(asset)?;
        self.hash = Some(hash_asset_with_exclusions(asset, &exclusions, alg)?);
        self.source_box = None;

        let label = self.full_label();
        let size_with = |pad: usize| -> Result<u64> {
            let cbor = serde_cbor::to_vec(&self.wire(pad))?;
            let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, label.clone());
            sb.push_child(ChildBox::Cbor(cbor));
            sb.measured_size()
        };

        let pad = fit_to_size(target, size_with).map_err(|e| match e {
            Error::InsufficientPadding { needed, .. } => {
                Error::InsufficientPadding { needed, reserved }
            }
            other => other,
        })?;
        self.padding_length = pad;
        Ok(())
    }

    /// Build a Merkle map over the `index`-th `mdat` box with fixed-size
    /// chunks, replacing the flat hash
    pub fn add_merkle_map_for_mdat(
        &mut self,
        asset: &dyn BmffAssetIo,
        index: usize,
        local_id: u32,
        block_size: u64,
        with_init_hash: bool,
    ) -> Result<()> {
        let alg = self
            .algorithm
            .ok_or(Error::RequiredFieldMissing("BMFF hash algorithm"))?;
        let mdats: Vec<BmffBox> = asset
            .top_level_boxes()?
            .into_iter()
            .filter(|b| b.box_type == "mdat")
            .collect();
        let mdat = mdats.get(index).ok_or_else(|| Error::AssertionInvalid {
            label: self.label.clone(),
            reason: format!("no mdat box at index {index}"),
        })?;

        let mut streamer = StreamingChunkHasher::new(alg, BlockSizing::Fixed(block_size));
        let mut pos = mdat.payload_offset;
        let end = mdat.offset + mdat.size;
        while pos < end {
            let len = (end - pos).min(crate::hash::HASH_CHUNK_SIZE);
            streamer.update(&asset.read_range(pos, len)?);
            pos += len;
        }
        let (hashes, _) = streamer.finish()?;

        let init_hash = if with_init_hash {
            Some(self.init_segment_hash(asset, alg)?)
        } else {
            None
        };

        let map = MerkleMap {
            unique_id: index as u32 + 1,
            local_id,
            count: hashes.len() as u32,
            alg: None,
            init_hash,
            hashes,
            fixed_block_size: Some(block_size),
            variable_block_sizes: None,
        };

        self.hash = None;
        self.merkle.get_or_insert_with(Vec::new).push(map);
        self.source_box = None;
        Ok(())
    }
}

#[cfg(all(test, feature = "test-utils"))]
mod tests {
    use super::*;
    use crate::test_utils::MemoryBmffAsset;

    const ALG: HashAlgorithm = HashAlgorithm::Sha256;

    fn signed_flat_assertion(asset: &MemoryBmffAsset) -> BmffHashAssertion {
        let mut assertion = BmffHashAssertion::new(2, ALG).unwrap();
        assertion.exclusions.push(BmffExclusion::new("/uuid"));
        assertion.update_with_asset(asset).unwrap();
        assertion
    }

    #[test]
    fn test_flat_hash_matches_and_detects_tamper() {
        let mut asset = MemoryBmffAsset::sample_mp4(512);
        asset.ensure_manifest_space(64).unwrap();

        let assertion = signed_flat_assertion(&asset);

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&asset, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionBmffHashMatch));

        // flip a byte inside the mdat payload
        let mut tampered = asset.clone();
        tampered.tamper_mdat(3);

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&tampered, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionBmffHashMismatch));
        assert!(!report.is_valid());
    }

    #[test]
    fn test_reordering_top_level_boxes_invalidates_hash() {
        let mut asset = MemoryBmffAsset::sample_mp4(256);
        asset.ensure_manifest_space(64).unwrap();
        let assertion = signed_flat_assertion(&asset);

        let swapped = asset.with_swapped_top_level_boxes("free", "mdat");
        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&swapped, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionBmffHashMismatch));
    }

    #[test]
    fn test_merkle_map_validation() {
        let asset = MemoryBmffAsset::sample_mp4(512);

        let mut assertion = BmffHashAssertion::new(2, ALG).unwrap();
        assertion
            .add_merkle_map_for_mdat(&asset, 0, 1, 64, true)
            .unwrap();
        assert!(assertion.hash.is_none());

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&asset, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionBmffHashMatch));

        // tamper one mdat byte: the owning chunk hash must mismatch
        let mut tampered = asset.clone();
        tampered.tamper_mdat(0);
        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&tampered, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionBmffHashMismatch));
    }

    #[test]
    fn test_merkle_count_mismatch_is_malformed() {
        let asset = MemoryBmffAsset::sample_mp4(256);

        let mut assertion = BmffHashAssertion::new(2, ALG).unwrap();
        assertion
            .add_merkle_map_for_mdat(&asset, 0, 1, 64, false)
            .unwrap();
        if let Some(maps) = &mut assertion.merkle {
            maps[0].count += 1;
        }

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&asset, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionBmffHashMalformed));
    }

    #[test]
    fn test_jumbf_roundtrip_with_merkle() {
        let asset = MemoryBmffAsset::sample_mp4(512);

        let mut assertion = BmffHashAssertion::new(3, ALG).unwrap();
        assertion.exclusions.push(BmffExclusion::new("/uuid"));
        assertion
            .add_merkle_map_for_mdat(&asset, 0, 2, 100, true)
            .unwrap();

        let sb = assertion.to_jumbf().unwrap();
        let parsed = BmffHashAssertion::from_jumbf(&sb, labels::BMFF_HASH_V3, None).unwrap();
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.merkle, assertion.merkle);
        assert_eq!(parsed.exclusions, assertion.exclusions);
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_exclusion_conditions() {
        let mut asset = MemoryBmffAsset::sample_mp4(256);
        asset.ensure_manifest_space(16).unwrap();

        // unconditioned: the uuid box is excluded whole
        let mut assertion = BmffHashAssertion::new(2, ALG).unwrap();
        assertion.exclusions.push(BmffExclusion::new("/uuid"));
        let resolved = assertion.resolve_exclusions(&asset).unwrap();
        assert!(resolved.iter().any(|e| !e.offset_marker));

        // a FullBox version condition no plain uuid box satisfies: the
        // exclusion resolves to nothing and only markers remain
        let mut conditioned = BmffExclusion::new("/uuid");
        conditioned.version = Some(1);
        let mut assertion = BmffHashAssertion::new(2, ALG).unwrap();
        assertion.exclusions.push(conditioned);
        let resolved = assertion.resolve_exclusions(&asset).unwrap();
        assert!(resolved.iter().all(|e| e.offset_marker));

        // a data probe that matches the uuid extended type excludes it again
        let mut probed = BmffExclusion::new("/uuid");
        probed.data.push(DataMatch {
            offset: 8,
            value: crate::test_utils::C2PA_BMFF_UUID.to_vec(),
        });
        let mut assertion = BmffHashAssertion::new(2, ALG).unwrap();
        assertion.exclusions.push(probed);
        let resolved = assertion.resolve_exclusions(&asset).unwrap();
        assert!(resolved.iter().any(|e| !e.offset_marker));
    }
}
