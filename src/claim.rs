//! Claim parsing and emission
//!
//! The claim is the signed heart of a manifest: it lists hashed references
//! to the assertions it creates (and, for V2 claims, gathers), names its
//! signature box, and fixes the default hash algorithm. Its CBOR content
//! bytes are the detached payload of the claim signature, so they are
//! emitted once and retained verbatim; re-encoding between hashing and
//! signing would break byte stability.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    hash::HashAlgorithm,
    jumbf::{labels, ChildBox, SuperBox, CLAIM_UUID},
};

/// Claim serialization generations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimVersion {
    V1,
    V2,
}

/// A tamper-evident pointer: JUMBF URI plus digest of the referent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedUri {
    /// JUMBF URI, e.g. `self#jumbf=c2pa.assertions/c2pa.hash.data`
    pub url: String,

    /// Digest algorithm; `None` inherits the claim default
    pub alg: Option<HashAlgorithm>,

    /// Digest of the referenced component's bytes; zero-filled while
    /// building, filled in before signing
    pub hash: Vec<u8>,
}

impl HashedUri {
    /// Create a reference with an already-computed hash
    pub fn new(url: impl Into<String>, alg: Option<HashAlgorithm>, hash: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            alg,
            hash,
        }
    }

    /// Create a zero-filled placeholder reference for `alg`
    pub fn placeholder(url: impl Into<String>, alg: HashAlgorithm) -> Self {
        Self {
            url: url.into(),
            alg: None,
            hash: vec![0; alg.digest_len()],
        }
    }

    /// Whether the hash is still an all-zero placeholder
    pub fn is_placeholder(&self) -> bool {
        self.hash.iter().all(|b| *b == 0)
    }
}

/// Claim generator description (`claim_generator_info`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl GeneratorInfo {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Wire form of a hashed reference, shared by the claim and the assertions
/// that embed references (ingredients, actions)
#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct HashedUriWire {
    pub(crate) url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) alg: Option<String>,
    #[serde(with = "serde_bytes")]
    pub(crate) hash: Vec<u8>,
}

impl HashedUriWire {
    pub(crate) fn from_model(uri: &HashedUri) -> Self {
        Self {
            url: uri.url.clone(),
            alg: uri.alg.map(|a| a.as_str().to_string()),
            hash: uri.hash.clone(),
        }
    }

    pub(crate) fn into_model(self) -> Result<HashedUri> {
        Ok(HashedUri {
            url: self.url,
            alg: self.alg.as_deref().map(HashAlgorithm::from_name).transpose()?,
            hash: self.hash,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ClaimWireV1 {
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(rename = "instanceID")]
    instance_id: String,
    signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    claim_generator: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    claim_generator_info: Vec<GeneratorInfo>,
    #[serde(rename = "dc:format")]
    format: String,
    #[serde(rename = "dc:title", skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    assertions: Vec<HashedUriWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redacted_assertions: Option<Vec<HashedUriWire>>,
}

#[derive(Serialize, Deserialize)]
struct ClaimWireV2 {
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(rename = "instanceID")]
    instance_id: String,
    signature: String,
    claim_generator_info: GeneratorInfo,
    created_assertions: Vec<HashedUriWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gathered_assertions: Option<Vec<HashedUriWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redacted_assertions: Option<Vec<HashedUriWire>>,
    #[serde(rename = "dc:title", skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

/// The signed claim document of one manifest
#[derive(Debug, Clone)]
pub struct Claim {
    pub version: ClaimVersion,

    /// JUMBF label (`c2pa.claim` or `c2pa.claim.v2`)
    pub label: String,

    pub instance_id: String,
    pub title: Option<String>,

    /// Media type of the asset; mandatory on V1 claims
    pub format: Option<String>,

    /// Free-form generator string (V1)
    pub claim_generator: Option<String>,

    /// Structured generator records; V2 emits the first entry
    pub claim_generator_info: Vec<GeneratorInfo>,

    /// Default digest algorithm for hashed references
    pub default_algorithm: Option<HashAlgorithm>,

    /// JUMBF URI of the signature box
    pub signature_ref: String,

    /// References to the assertions this claim creates
    pub assertions: Vec<HashedUri>,

    /// Externally sourced assertion references (V2 only)
    pub gathered_assertions: Vec<HashedUri>,

    /// References to redacted assertions
    pub redacted_assertions: Vec<HashedUri>,

    raw_cbor: Option<Vec<u8>>,
    source_box: Option<SuperBox>,
}

impl Claim {
    /// Create an empty V1 claim
    pub fn new_v1(
        instance_id: impl Into<String>,
        format: impl Into<String>,
        claim_generator: impl Into<String>,
    ) -> Self {
        Self {
            version: ClaimVersion::V1,
            label: labels::CLAIM.to_string(),
            instance_id: instance_id.into(),
            title: None,
            format: Some(format.into()),
            claim_generator: Some(claim_generator.into()),
            claim_generator_info: Vec::new(),
            default_algorithm: Some(HashAlgorithm::Sha256),
            signature_ref: format!("self#jumbf={}", labels::SIGNATURE),
            assertions: Vec::new(),
            gathered_assertions: Vec::new(),
            redacted_assertions: Vec::new(),
            raw_cbor: None,
            source_box: None,
        }
    }

    /// Create an empty V2 claim
    pub fn new_v2(instance_id: impl Into<String>, generator: GeneratorInfo) -> Self {
        Self {
            version: ClaimVersion::V2,
            label: labels::CLAIM_V2.to_string(),
            instance_id: instance_id.into(),
            title: None,
            format: None,
            claim_generator: None,
            claim_generator_info: vec![generator],
            default_algorithm: Some(HashAlgorithm::Sha256),
            signature_ref: format!("self#jumbf={}", labels::SIGNATURE),
            assertions: Vec::new(),
            gathered_assertions: Vec::new(),
            redacted_assertions: Vec::new(),
            raw_cbor: None,
            source_box: None,
        }
    }

    /// Generate a V1 manifest label: `urn:uuid:<uuidv4>`
    pub fn generate_urn_v1() -> String {
        format!("urn:uuid:{}", Uuid::new_v4())
    }

    /// Generate a V2 manifest label:
    /// `urn:c2pa:<uuidv4>[:<generatorInfo>[:<versionReason>]]`
    pub fn generate_urn_v2(generator_info: Option<&str>, version_reason: Option<&str>) -> String {
        let mut urn = format!("urn:c2pa:{}", Uuid::new_v4());
        if let Some(info) = generator_info {
            urn.push(':');
            urn.push_str(info);
            if let Some(reason) = version_reason {
                urn.push(':');
                urn.push_str(reason);
            }
        }
        urn
    }

    /// Parse a claim from its JUMBF superbox
    pub fn from_jumbf(sb: &SuperBox) -> Result<Self> {
        let label = sb
            .label()
            .ok_or_else(|| Error::ClaimInvalid("claim box has no label".to_string()))?
            .to_string();
        if label != labels::CLAIM && label != labels::CLAIM_V2 {
            return Err(Error::ClaimInvalid(format!("unexpected claim label `{label}`")));
        }

        let cbor = sb
            .cbor_content()
            .ok_or_else(|| Error::ClaimInvalid("claim box has no CBOR content".to_string()))?;
        let value: serde_cbor::Value = serde_cbor::from_slice(cbor)
            .map_err(|e| Error::ClaimInvalid(format!("claim CBOR does not parse: {e}")))?;

        let has_key = |name: &str| match &value {
            serde_cbor::Value::Map(map) => map
                .keys()
                .any(|k| matches!(k, serde_cbor::Value::Text(t) if t == name)),
            _ => false,
        };
        if !matches!(&value, serde_cbor::Value::Map(_)) {
            return Err(Error::ClaimInvalid(
                "claim content is not a CBOR map".to_string(),
            ));
        }
        let is_v2 = has_key("created_assertions");
        let is_v1 = has_key("assertions");

        let mut claim = if is_v2 {
            let wire: ClaimWireV2 = serde_cbor::value::from_value(value)
                .map_err(|e| Error::ClaimInvalid(format!("bad V2 claim: {e}")))?;
            Self::from_wire_v2(wire)?
        } else if is_v1 {
            let wire: ClaimWireV1 = serde_cbor::value::from_value(value)
                .map_err(|e| Error::ClaimInvalid(format!("bad V1 claim: {e}")))?;
            Self::from_wire_v1(wire)?
        } else {
            return Err(Error::ClaimInvalid(
                "claim has neither `assertions` nor `created_assertions`".to_string(),
            ));
        };

        claim.label = label;
        claim.raw_cbor = Some(cbor.to_vec());
        claim.source_box = Some(sb.clone());
        Ok(claim)
    }

    fn from_wire_v1(wire: ClaimWireV1) -> Result<Self> {
        if wire.instance_id.is_empty() {
            return Err(Error::ClaimInvalid("instanceID is empty".to_string()));
        }
        Ok(Self {
            version: ClaimVersion::V1,
            label: labels::CLAIM.to_string(),
            instance_id: wire.instance_id,
            title: wire.title,
            format: Some(wire.format),
            claim_generator: wire.claim_generator,
            claim_generator_info: wire.claim_generator_info,
            default_algorithm: wire
                .alg
                .as_deref()
                .map(HashAlgorithm::from_name)
                .transpose()?,
            signature_ref: wire.signature,
            assertions: wire
                .assertions
                .into_iter()
                .map(HashedUriWire::into_model)
                .collect::<Result<_>>()?,
            gathered_assertions: Vec::new(),
            redacted_assertions: wire
                .redacted_assertions
                .unwrap_or_default()
                .into_iter()
                .map(HashedUriWire::into_model)
                .collect::<Result<_>>()?,
            raw_cbor: None,
            source_box: None,
        })
    }

    fn from_wire_v2(wire: ClaimWireV2) -> Result<Self> {
        if wire.instance_id.is_empty() {
            return Err(Error::ClaimInvalid("instanceID is empty".to_string()));
        }
        Ok(Self {
            version: ClaimVersion::V2,
            label: labels::CLAIM_V2.to_string(),
            instance_id: wire.instance_id,
            title: wire.title,
            format: None,
            claim_generator: None,
            claim_generator_info: vec![wire.claim_generator_info],
            default_algorithm: wire
                .alg
                .as_deref()
                .map(HashAlgorithm::from_name)
                .transpose()?,
            signature_ref: wire.signature,
            assertions: wire
                .created_assertions
                .into_iter()
                .map(HashedUriWire::into_model)
                .collect::<Result<_>>()?,
            gathered_assertions: wire
                .gathered_assertions
                .unwrap_or_default()
                .into_iter()
                .map(HashedUriWire::into_model)
                .collect::<Result<_>>()?,
            redacted_assertions: wire
                .redacted_assertions
                .unwrap_or_default()
                .into_iter()
                .map(HashedUriWire::into_model)
                .collect::<Result<_>>()?,
            raw_cbor: None,
            source_box: None,
        })
    }

    fn to_cbor_vec(&self) -> Result<Vec<u8>> {
        if self.instance_id.is_empty() {
            return Err(Error::RequiredFieldMissing("instanceID"));
        }
        // a reference's alg is omitted on the wire when it matches the
        // claim default
        let default_algorithm = self.default_algorithm;
        let wrap = |uris: &[HashedUri]| -> Vec<HashedUriWire> {
            uris.iter()
                .map(|uri| {
                    let mut wire = HashedUriWire::from_model(uri);
                    if uri.alg.is_some() && uri.alg == default_algorithm {
                        wire.alg = None;
                    }
                    wire
                })
                .collect()
        };

        match self.version {
            ClaimVersion::V1 => {
                let format = self
                    .format
                    .clone()
                    .ok_or(Error::RequiredFieldMissing("dc:format"))?;
                let wire = ClaimWireV1 {
                    alg: self.default_algorithm.map(|a| a.as_str().to_string()),
                    instance_id: self.instance_id.clone(),
                    signature: self.signature_ref.clone(),
                    claim_generator: self.claim_generator.clone(),
                    claim_generator_info: self.claim_generator_info.clone(),
                    format,
                    title: self.title.clone(),
                    assertions: wrap(&self.assertions),
                    redacted_assertions: if self.redacted_assertions.is_empty() {
                        None
                    } else {
                        Some(wrap(&self.redacted_assertions))
                    },
                };
                Ok(serde_cbor::to_vec(&wire)?)
            }
            ClaimVersion::V2 => {
                let generator = self
                    .claim_generator_info
                    .first()
                    .cloned()
                    .ok_or(Error::RequiredFieldMissing("claim_generator_info"))?;
                let wire = ClaimWireV2 {
                    alg: self.default_algorithm.map(|a| a.as_str().to_string()),
                    instance_id: self.instance_id.clone(),
                    signature: self.signature_ref.clone(),
                    claim_generator_info: generator,
                    created_assertions: wrap(&self.assertions),
                    gathered_assertions: if self.gathered_assertions.is_empty() {
                        None
                    } else {
                        Some(wrap(&self.gathered_assertions))
                    },
                    redacted_assertions: if self.redacted_assertions.is_empty() {
                        None
                    } else {
                        Some(wrap(&self.redacted_assertions))
                    },
                    title: self.title.clone(),
                };
                Ok(serde_cbor::to_vec(&wire)?)
            }
        }
    }

    /// Serialize the claim content and retain the bytes for signing
    ///
    /// Call after the hashed references are final; [`bytes`](Self::bytes)
    /// then returns exactly what was encoded.
    pub fn encode(&mut self) -> Result<()> {
        let bytes = self.to_cbor_vec()?;
        self.raw_cbor = Some(bytes);
        self.source_box = None;
        Ok(())
    }

    /// The exact claim content bytes (the signature's detached payload)
    pub fn bytes(&self) -> Result<&[u8]> {
        self.raw_cbor
            .as_deref()
            .ok_or_else(|| Error::Other("claim has not been encoded".to_string()))
    }

    /// Resolve the digest algorithm for one hashed reference
    pub fn resolve_alg(&self, uri: &HashedUri) -> Result<HashAlgorithm> {
        uri.alg
            .or(self.default_algorithm)
            .ok_or_else(|| Error::AlgorithmUnsupported("no algorithm on reference or claim".to_string()))
    }

    /// Mark the claim mutated: drops retained bytes so the next
    /// [`encode`](Self::encode) rebuilds them
    pub fn invalidate(&mut self) {
        self.raw_cbor = None;
        self.source_box = None;
    }

    /// Serialize into the claim JUMBF superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let cbor = match &self.raw_cbor {
            Some(raw) => raw.clone(),
            None => self.to_cbor_vec()?,
        };
        let mut sb = SuperBox::new(CLAIM_UUID, self.label.clone());
        sb.push_child(ChildBox::Cbor(cbor));
        Ok(sb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v1() -> Claim {
        let mut claim = Claim::new_v1(
            "xmp:iid:f7ba134b-8dec-4334-911d-a30409e32d8e",
            "image/jpeg",
            "test_app/1.0",
        );
        claim.assertions.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.hash.data",
            None,
            vec![0xAA; 32],
        ));
        claim
    }

    #[test]
    fn test_v1_roundtrip_preserves_bytes() {
        let mut claim = sample_v1();
        claim.encode().unwrap();
        let original = claim.bytes().unwrap().to_vec();

        let sb = claim.to_jumbf().unwrap();
        let parsed = Claim::from_jumbf(&sb).unwrap();

        assert_eq!(parsed.version, ClaimVersion::V1);
        assert_eq!(parsed.label, labels::CLAIM);
        assert_eq!(
            parsed.instance_id,
            "xmp:iid:f7ba134b-8dec-4334-911d-a30409e32d8e"
        );
        assert_eq!(parsed.default_algorithm, Some(HashAlgorithm::Sha256));
        assert_eq!(parsed.signature_ref, "self#jumbf=c2pa.signature");
        assert_eq!(parsed.assertions.len(), 1);
        assert_eq!(parsed.bytes().unwrap(), original.as_slice());

        // re-emission without mutation is byte-exact
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_v2_roundtrip() {
        let mut claim = Claim::new_v2(
            "xmp:iid:1281cf29-ecd5-487a-a119-f5ed31ba2d78",
            GeneratorInfo::new("test_app", Some("1.0".to_string())),
        );
        claim.assertions.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.hash.data",
            Some(HashAlgorithm::Sha384),
            vec![0xBB; 48],
        ));
        claim.gathered_assertions.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/cawg.metadata",
            None,
            vec![0xCC; 32],
        ));
        claim.encode().unwrap();

        let parsed = Claim::from_jumbf(&claim.to_jumbf().unwrap()).unwrap();
        assert_eq!(parsed.version, ClaimVersion::V2);
        assert_eq!(parsed.label, labels::CLAIM_V2);
        assert_eq!(parsed.claim_generator_info[0].name, "test_app");
        assert_eq!(parsed.assertions[0].alg, Some(HashAlgorithm::Sha384));
        assert_eq!(parsed.gathered_assertions.len(), 1);
    }

    #[test]
    fn test_alg_omitted_when_default() {
        let mut claim = sample_v1();
        claim.encode().unwrap();
        let parsed = Claim::from_jumbf(&claim.to_jumbf().unwrap()).unwrap();

        // reference without alg inherits the claim default
        assert_eq!(parsed.assertions[0].alg, None);
        assert_eq!(
            parsed.resolve_alg(&parsed.assertions[0]).unwrap(),
            HashAlgorithm::Sha256
        );
    }

    #[test]
    fn test_claim_without_instance_id_rejected() {
        let wire = serde_cbor::to_vec(&serde_cbor::Value::Map(
            [
                (
                    serde_cbor::Value::Text("signature".into()),
                    serde_cbor::Value::Text("self#jumbf=c2pa.signature".into()),
                ),
                (
                    serde_cbor::Value::Text("assertions".into()),
                    serde_cbor::Value::Array(vec![]),
                ),
                (
                    serde_cbor::Value::Text("dc:format".into()),
                    serde_cbor::Value::Text("image/jpeg".into()),
                ),
            ]
            .into_iter()
            .collect(),
        ))
        .unwrap();

        let mut sb = SuperBox::new(CLAIM_UUID, labels::CLAIM);
        sb.push_child(ChildBox::Cbor(wire));
        assert!(matches!(
            Claim::from_jumbf(&sb),
            Err(Error::ClaimInvalid(_))
        ));
    }

    #[test]
    fn test_claim_with_unknown_shape_rejected() {
        let mut sb = SuperBox::new(CLAIM_UUID, labels::CLAIM);
        sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&serde_cbor::Value::Map(
            Default::default(),
        ))
        .unwrap()));
        assert!(matches!(
            Claim::from_jumbf(&sb),
            Err(Error::ClaimInvalid(_))
        ));
    }

    #[test]
    fn test_unknown_algorithm_is_reported() {
        let wire = serde_cbor::to_vec(&serde_cbor::Value::Map(
            [
                (
                    serde_cbor::Value::Text("alg".into()),
                    serde_cbor::Value::Text("md5".into()),
                ),
                (
                    serde_cbor::Value::Text("instanceID".into()),
                    serde_cbor::Value::Text("xmp:iid:x".into()),
                ),
                (
                    serde_cbor::Value::Text("signature".into()),
                    serde_cbor::Value::Text("self#jumbf=c2pa.signature".into()),
                ),
                (
                    serde_cbor::Value::Text("dc:format".into()),
                    serde_cbor::Value::Text("image/jpeg".into()),
                ),
                (
                    serde_cbor::Value::Text("assertions".into()),
                    serde_cbor::Value::Array(vec![]),
                ),
            ]
            .into_iter()
            .collect(),
        ))
        .unwrap();

        let mut sb = SuperBox::new(CLAIM_UUID, labels::CLAIM);
        sb.push_child(ChildBox::Cbor(wire));
        assert!(matches!(
            Claim::from_jumbf(&sb),
            Err(Error::AlgorithmUnsupported(_))
        ));
    }

    #[test]
    fn test_urn_shapes() {
        let v1 = Claim::generate_urn_v1();
        assert!(v1.starts_with("urn:uuid:"));
        assert_eq!(v1.len(), "urn:uuid:".len() + 36);

        let v2 = Claim::generate_urn_v2(None, None);
        assert!(v2.starts_with("urn:c2pa:"));

        let with_info = Claim::generate_urn_v2(Some("acme"), Some("1"));
        assert!(with_info.ends_with(":acme:1"));
    }
}
