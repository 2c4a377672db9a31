//! DataHash assertion: the exclusion-range hard binding
//!
//! Binds the manifest to the asset bytes outside a set of exclusion ranges
//! (in practice a single range: the reserved manifest region). The `pad`
//! field absorbs CBOR growth when exclusions and hash are filled in during
//! signing, keeping the assertion's JUMBF envelope at its reserved size.

use serde::{Deserialize, Serialize};

use crate::{
    asset::{AssetIo, ByteRange},
    cose::fit_to_size,
    error::{Error, Result},
    hash::{hash_asset_with_exclusions, Exclusion, HashAlgorithm},
    jumbf::{ChildBox, SuperBox, CBOR_ASSERTION_UUID},
    status::{ValidationCode, ValidationReport},
};

use super::labels;

/// Default pad reserved in a freshly built assertion, sized to absorb the
/// exclusion range added at signing time
const DATA_HASH_PADDING: usize = 128;

#[derive(Serialize, Deserialize)]
struct ExclusionWire {
    start: u64,
    length: u64,
}

#[derive(Serialize, Deserialize)]
struct DataHashWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusions: Option<Vec<ExclusionWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(with = "serde_bytes")]
    hash: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pad: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pad2: Option<serde_bytes::ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

/// Hard-binding assertion hashing the asset under exclusion ranges
#[derive(Debug, Clone)]
pub struct DataHashAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,
    pub name: Option<String>,

    /// Digest algorithm; `None` inherits the claim default
    pub algorithm: Option<HashAlgorithm>,

    /// Digest of the asset outside the exclusions
    pub hash: Vec<u8>,

    /// Ordered, non-overlapping exclusion ranges
    pub exclusions: Vec<ByteRange>,

    /// Reserved zero bytes absorbing CBOR growth at signing time
    pub padding_length: usize,

    /// Secondary reservation, rarely used
    pub padding2_length: Option<usize>,

    pub(crate) source_box: Option<SuperBox>,
}

impl DataHashAssertion {
    /// A fresh assertion with a zero-filled hash, ready for
    /// [`update_with_asset`](Self::update_with_asset) during signing
    pub fn new(alg: HashAlgorithm) -> Self {
        Self {
            label: labels::DATA_HASH.to_string(),
            label_suffix: None,
            name: None,
            algorithm: Some(alg),
            hash: vec![0; alg.digest_len()],
            exclusions: Vec::new(),
            padding_length: DATA_HASH_PADDING,
            padding2_length: None,
            source_box: None,
        }
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, suffix: Option<u32>) -> Result<Self> {
        let invalid = |reason: &str| Error::AssertionInvalid {
            label: labels::DATA_HASH.to_string(),
            reason: reason.to_string(),
        };

        let cbor = sb
            .cbor_content()
            .ok_or_else(|| invalid("missing CBOR content box"))?;
        let wire: DataHashWire =
            serde_cbor::from_slice(cbor).map_err(|e| invalid(&format!("bad CBOR: {e}")))?;

        let algorithm = wire
            .alg
            .as_deref()
            .map(HashAlgorithm::from_name)
            .transpose()?;
        if let Some(alg) = algorithm {
            if wire.hash.len() != alg.digest_len() {
                return Err(invalid(&format!(
                    "hash is {} bytes, {} requires {}",
                    wire.hash.len(),
                    alg.as_str(),
                    alg.digest_len()
                )));
            }
        }

        let mut exclusions: Vec<ByteRange> = Vec::new();
        for entry in wire.exclusions.unwrap_or_default() {
            if entry.length == 0 {
                return Err(invalid("exclusion length must be positive"));
            }
            exclusions.push(ByteRange::new(entry.start, entry.length));
        }
        exclusions.sort_by_key(|r| r.offset);
        for pair in exclusions.windows(2) {
            if pair[0].end_offset() > pair[1].offset {
                return Err(invalid("overlapping exclusions"));
            }
        }

        if wire.pad.iter().any(|b| *b != 0) {
            return Err(invalid("pad contains non-zero bytes"));
        }
        if let Some(pad2) = &wire.pad2 {
            if pad2.iter().any(|b| *b != 0) {
                return Err(invalid("pad2 contains non-zero bytes"));
            }
        }

        Ok(Self {
            label: labels::DATA_HASH.to_string(),
            label_suffix: suffix,
            name: wire.name,
            algorithm,
            hash: wire.hash,
            exclusions,
            padding_length: wire.pad.len(),
            padding2_length: wire.pad2.as_ref().map(|p| p.len()),
            source_box: Some(sb.clone()),
        })
    }

    fn wire(&self, pad: usize) -> DataHashWire {
        DataHashWire {
            exclusions: if self.exclusions.is_empty() {
                None
            } else {
                Some(
                    self.exclusions
                        .iter()
                        .map(|r| ExclusionWire {
                            start: r.offset,
                            length: r.size,
                        })
                        .collect(),
                )
            },
            alg: self.algorithm.map(|a| a.as_str().to_string()),
            hash: self.hash.clone(),
            pad: vec![0; pad],
            pad2: self
                .padding2_length
                .map(|len| serde_bytes::ByteBuf::from(vec![0; len])),
            name: self.name.clone(),
        }
    }

    /// The full wire label (`c2pa.hash.data` or `c2pa.hash.data__<n>`)
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

    /// Hash the asset under this assertion's exclusions and compare
    pub fn validate_against_asset(
        &self,
        asset: &dyn AssetIo,
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

        let exclusions: Vec<Exclusion> = self
            .exclusions
            .iter()
            .map(|r| Exclusion::new(r.offset, r.size))
            .collect();

        match hash_asset_with_exclusions(asset, &exclusions, alg) {
            Ok(digest) if digest == self.hash => {
                report.add(
                    ValidationCode::AssertionDataHashMatch,
                    Some(uri.to_string()),
                    "asset hash matches",
                );
            }
            Ok(_) => {
                report.add(
                    ValidationCode::AssertionDataHashMismatch,
                    Some(uri.to_string()),
                    "asset bytes do not match the declared hash",
                );
            }
            Err(err) => {
                report.add(
                    ValidationCode::AssertionDataHashMismatch,
                    Some(uri.to_string()),
                    format!("cannot hash asset: {err}"),
                );
            }
        }
    }

    /// Bind to the asset during signing
    ///
    /// Measures the current envelope, points the exclusions at the reserved
    /// manifest range, recomputes the hash, then shrinks the pad so the
    /// envelope keeps its measured size.
    pub fn update_with_asset(&mut self, asset: &dyn AssetIo) -> Result<()> {
        let alg = self
            .algorithm
            .ok_or(Error::RequiredFieldMissing("data hash algorithm"))?;
        let target = self.to_jumbf()?.measured_size()?;
        let reserved = self.padding_length as u64;

        let range = asset
            .hash_exclusion_range()
            .ok_or(Error::AssetUnsupported("manifest exclusion range"))?;
        self.exclusions = vec![range];
        self.hash = hash_asset_with_exclusions(
            asset,
            &[Exclusion::new(range.offset, range.size)],
            alg,
        )?;
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
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecAsset {
        data: Vec<u8>,
        reserved: Option<ByteRange>,
    }

    impl AssetIo for VecAsset {
        fn len(&self) -> u64 {
            self.data.len() as u64
        }

        fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
            let start = offset as usize;
            Ok(self.data[start..start + length as usize].to_vec())
        }

        fn hash_exclusion_range(&self) -> Option<ByteRange> {
            self.reserved
        }
    }

    fn asset_with_reservation() -> VecAsset {
        let mut data = vec![0x11u8; 256];
        // pretend bytes 64..96 are the reserved manifest region
        for byte in &mut data[64..96] {
            *byte = 0;
        }
        VecAsset {
            data,
            reserved: Some(ByteRange::new(64, 32)),
        }
    }

    #[test]
    fn test_update_then_validate_roundtrip() {
        let asset = asset_with_reservation();
        let mut assertion = DataHashAssertion::new(HashAlgorithm::Sha256);
        let reserved_size = assertion.to_jumbf().unwrap().measured_size().unwrap();

        assertion.update_with_asset(&asset).unwrap();
        assert_eq!(
            assertion.to_jumbf().unwrap().measured_size().unwrap(),
            reserved_size
        );
        assert_eq!(assertion.exclusions, vec![ByteRange::new(64, 32)]);

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&asset, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionDataHashMatch));
        assert!(report.is_valid());
    }

    #[test]
    fn test_tampered_asset_mismatches() {
        let mut asset = asset_with_reservation();
        let mut assertion = DataHashAssertion::new(HashAlgorithm::Sha256);
        assertion.update_with_asset(&asset).unwrap();

        // mutate one byte outside the exclusion
        asset.data[10] ^= 0xFF;

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&asset, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionDataHashMismatch));
        assert!(!report.is_valid());
    }

    #[test]
    fn test_mutation_inside_exclusion_still_matches() {
        let mut asset = asset_with_reservation();
        let mut assertion = DataHashAssertion::new(HashAlgorithm::Sha256);
        assertion.update_with_asset(&asset).unwrap();

        // the reserved region is excluded; writing there must not matter
        asset.data[70] = 0xEE;

        let mut report = ValidationReport::new();
        assertion.validate_against_asset(&asset, None, &mut report, "uri");
        assert!(report.has_code(ValidationCode::AssertionDataHashMatch));
    }

    #[test]
    fn test_jumbf_roundtrip() {
        let asset = asset_with_reservation();
        let mut assertion = DataHashAssertion::new(HashAlgorithm::Sha256);
        assertion.name = Some("jumbf manifest".to_string());
        assertion.update_with_asset(&asset).unwrap();

        let sb = assertion.to_jumbf().unwrap();
        let parsed = DataHashAssertion::from_jumbf(&sb, None).unwrap();
        assert_eq!(parsed.hash, assertion.hash);
        assert_eq!(parsed.exclusions, assertion.exclusions);
        assert_eq!(parsed.padding_length, assertion.padding_length);
        assert_eq!(parsed.name.as_deref(), Some("jumbf manifest"));

        // unchanged reparse emits identical bytes
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_overlapping_exclusions_rejected() {
        let wire = DataHashWire {
            exclusions: Some(vec![
                ExclusionWire {
                    start: 0,
                    length: 20,
                },
                ExclusionWire {
                    start: 10,
                    length: 20,
                },
            ]),
            alg: Some("sha256".to_string()),
            hash: vec![0; 32],
            pad: vec![0; 8],
            pad2: None,
            name: None,
        };
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, labels::DATA_HASH);
        sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&wire).unwrap()));

        let err = DataHashAssertion::from_jumbf(&sb, None).unwrap_err();
        assert!(err.to_string().contains("overlapping exclusions"));
    }

    #[test]
    fn test_wrong_hash_length_rejected() {
        let wire = DataHashWire {
            exclusions: None,
            alg: Some("sha256".to_string()),
            hash: vec![0; 20],
            pad: vec![0; 8],
            pad2: None,
            name: None,
        };
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, labels::DATA_HASH);
        sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&wire).unwrap()));
        assert!(DataHashAssertion::from_jumbf(&sb, None).is_err());
    }

    #[test]
    fn test_nonzero_pad_rejected() {
        let wire = DataHashWire {
            exclusions: None,
            alg: Some("sha256".to_string()),
            hash: vec![0; 32],
            pad: vec![0, 1, 0],
            pad2: None,
            name: None,
        };
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, labels::DATA_HASH);
        sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&wire).unwrap()));
        assert!(DataHashAssertion::from_jumbf(&sb, None).is_err());
    }
}
