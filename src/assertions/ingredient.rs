//! Ingredient assertion: lineage references to prior manifests and assets
//!
//! An ingredient names its relationship to the current asset and may point
//! at the manifest that travelled with it. Validation checks that the
//! referenced manifest exists in the enclosing store and still digests to
//! the recorded hash; the caller recurses into that manifest afterwards.

use serde::{Deserialize, Serialize};

use crate::{
    claim::{HashedUri, HashedUriWire},
    error::{Error, Result},
    hash::{hash_bytes, HashAlgorithm},
    jumbf::{ChildBox, SuperBox, CBOR_ASSERTION_UUID},
    status::{ValidationCode, ValidationReport},
    store::ManifestStore,
};

use super::labels;

/// How an ingredient relates to the asset the manifest is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// The asset this manifest was derived from
    ParentOf,
    /// A component placed into the asset
    ComponentOf,
    /// An input to a computation that produced the asset
    InputTo,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentOf => "parentOf",
            Self::ComponentOf => "componentOf",
            Self::InputTo => "inputTo",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "parentOf" => Ok(Self::ParentOf),
            "componentOf" => Ok(Self::ComponentOf),
            "inputTo" => Ok(Self::InputTo),
            other => Err(Error::AssertionInvalid {
                label: labels::INGREDIENT.to_string(),
                reason: format!("unknown relationship `{other}`"),
            }),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IngredientWireV1 {
    #[serde(rename = "dc:title", skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "dc:format", skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(rename = "documentID", skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
    #[serde(rename = "instanceID", skip_serializing_if = "Option::is_none")]
    instance_id: Option<String>,
    relationship: String,
    #[serde(rename = "c2pa_manifest", skip_serializing_if = "Option::is_none")]
    active_manifest: Option<HashedUriWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<HashedUriWire>,
    #[serde(rename = "validationStatus", skip_serializing_if = "Option::is_none")]
    validation_status: Option<serde_cbor::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashedUriWire>,
}

#[derive(Serialize, Deserialize)]
struct IngredientWireV3 {
    #[serde(rename = "dc:title", skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(rename = "dc:format", skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(rename = "instanceID", skip_serializing_if = "Option::is_none")]
    instance_id: Option<String>,
    relationship: String,
    #[serde(rename = "activeManifest", skip_serializing_if = "Option::is_none")]
    active_manifest: Option<HashedUriWire>,
    #[serde(rename = "claimSignature", skip_serializing_if = "Option::is_none")]
    claim_signature: Option<HashedUriWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<HashedUriWire>,
    #[serde(rename = "validationResults", skip_serializing_if = "Option::is_none")]
    validation_results: Option<serde_cbor::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<HashedUriWire>,
}

/// Reference to a prior manifest or asset used to produce this asset
#[derive(Debug, Clone)]
pub struct IngredientAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,

    /// Serialization generation: 1, 2 or 3
    pub version: u8,

    pub title: Option<String>,
    pub format: Option<String>,
    pub document_id: Option<String>,
    pub instance_id: Option<String>,

    pub relationship: Relationship,

    /// Pointer to the ingredient's manifest in this store
    pub active_manifest: Option<HashedUri>,

    /// Pointer to the ingredient's claim signature (V3)
    pub claim_signature: Option<HashedUri>,

    /// Pointer to a thumbnail assertion for the ingredient
    pub thumbnail: Option<HashedUri>,

    /// Pointer to embedded ingredient data
    pub data: Option<HashedUri>,

    /// Validation results embedded from a prior run, kept opaque
    pub validation_results: Option<serde_cbor::Value>,

    pub(crate) source_box: Option<SuperBox>,
}

impl IngredientAssertion {
    /// A fresh ingredient with the given relationship
    pub fn new(version: u8, relationship: Relationship) -> Self {
        let label = match version {
            1 => labels::INGREDIENT,
            2 => labels::INGREDIENT_V2,
            _ => labels::INGREDIENT_V3,
        };
        Self {
            label: label.to_string(),
            label_suffix: None,
            version: version.clamp(1, 3),
            title: None,
            format: None,
            document_id: None,
            instance_id: None,
            relationship,
            active_manifest: None,
            claim_signature: None,
            thumbnail: None,
            data: None,
            validation_results: None,
            source_box: None,
        }
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        let version = match base_label {
            labels::INGREDIENT => 1,
            labels::INGREDIENT_V2 => 2,
            labels::INGREDIENT_V3 => 3,
            other => {
                return Err(Error::AssertionInvalid {
                    label: other.to_string(),
                    reason: "not an ingredient label".to_string(),
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

        let mut assertion = if version == 3 {
            let wire: IngredientWireV3 =
                serde_cbor::from_slice(cbor).map_err(|e| invalid(format!("bad CBOR: {e}")))?;
            Self {
                label: base_label.to_string(),
                label_suffix: suffix,
                version,
                title: wire.title,
                format: wire.format,
                document_id: None,
                instance_id: wire.instance_id,
                relationship: Relationship::from_name(&wire.relationship)?,
                active_manifest: wire.active_manifest.map(|w| w.into_model()).transpose()?,
                claim_signature: wire.claim_signature.map(|w| w.into_model()).transpose()?,
                thumbnail: wire.thumbnail.map(|w| w.into_model()).transpose()?,
                data: wire.data.map(|w| w.into_model()).transpose()?,
                validation_results: wire.validation_results,
                source_box: None,
            }
        } else {
            let wire: IngredientWireV1 =
                serde_cbor::from_slice(cbor).map_err(|e| invalid(format!("bad CBOR: {e}")))?;
            Self {
                label: base_label.to_string(),
                label_suffix: suffix,
                version,
                title: wire.title,
                format: wire.format,
                document_id: wire.document_id,
                instance_id: wire.instance_id,
                relationship: Relationship::from_name(&wire.relationship)?,
                active_manifest: wire.active_manifest.map(|w| w.into_model()).transpose()?,
                claim_signature: None,
                thumbnail: wire.thumbnail.map(|w| w.into_model()).transpose()?,
                data: wire.data.map(|w| w.into_model()).transpose()?,
                validation_results: wire.validation_status,
                source_box: None,
            }
        };

        assertion.source_box = Some(sb.clone());
        Ok(assertion)
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

        let cbor = if self.version == 3 {
            serde_cbor::to_vec(&IngredientWireV3 {
                title: self.title.clone(),
                format: self.format.clone(),
                instance_id: self.instance_id.clone(),
                relationship: self.relationship.as_str().to_string(),
                active_manifest: self.active_manifest.as_ref().map(HashedUriWire::from_model),
                claim_signature: self.claim_signature.as_ref().map(HashedUriWire::from_model),
                thumbnail: self.thumbnail.as_ref().map(HashedUriWire::from_model),
                validation_results: self.validation_results.clone(),
                data: self.data.as_ref().map(HashedUriWire::from_model),
            })?
        } else {
            serde_cbor::to_vec(&IngredientWireV1 {
                title: self.title.clone(),
                format: self.format.clone(),
                document_id: self.document_id.clone(),
                instance_id: self.instance_id.clone(),
                relationship: self.relationship.as_str().to_string(),
                active_manifest: self.active_manifest.as_ref().map(HashedUriWire::from_model),
                thumbnail: self.thumbnail.as_ref().map(HashedUriWire::from_model),
                validation_status: self.validation_results.clone(),
                data: self.data.as_ref().map(HashedUriWire::from_model),
            })?
        };

        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, self.full_label());
        sb.push_child(ChildBox::Cbor(cbor));
        Ok(sb)
    }

    /// Validate the ingredient's manifest reference against the store
    ///
    /// Returns the label of the referenced manifest when it resolved and
    /// hash-verified, so the caller can recurse into its lineage.
    pub fn validate(
        &self,
        store: &ManifestStore,
        default_alg: Option<HashAlgorithm>,
        report: &mut ValidationReport,
        uri: &str,
    ) -> Option<String> {
        let Some(reference) = &self.active_manifest else {
            report.add(
                ValidationCode::IngredientUnknownProvenance,
                Some(uri.to_string()),
                "ingredient carries no manifest reference",
            );
            return None;
        };

        let Some(label) = manifest_label_from_uri(&reference.url) else {
            report.add(
                ValidationCode::IngredientManifestMissing,
                Some(uri.to_string()),
                format!("`{}` is not a manifest URI", reference.url),
            );
            return None;
        };

        let Some(manifest) = store.manifest_by_label(&label) else {
            report.add(
                ValidationCode::IngredientManifestMissing,
                Some(uri.to_string()),
                format!("manifest `{label}` is not in this store"),
            );
            return None;
        };

        let alg = match reference.alg.or(default_alg) {
            Some(alg) => alg,
            None => {
                report.add(
                    ValidationCode::AlgorithmUnsupported,
                    Some(uri.to_string()),
                    "no algorithm for the ingredient manifest reference",
                );
                return None;
            }
        };

        let manifest_bytes = match manifest.bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                report.add(
                    ValidationCode::IngredientManifestMismatch,
                    Some(uri.to_string()),
                    format!("cannot serialize ingredient manifest: {err}"),
                );
                return None;
            }
        };

        if hash_bytes(&manifest_bytes, alg) != reference.hash {
            report.add(
                ValidationCode::IngredientManifestMismatch,
                Some(uri.to_string()),
                format!("manifest `{label}` does not digest to the recorded hash"),
            );
            return None;
        }

        report.add(
            ValidationCode::IngredientManifestValidated,
            Some(uri.to_string()),
            format!("ingredient manifest `{label}` hash-verified"),
        );

        if self.claim_signature.is_some() {
            match manifest.verify_claim_signature_quiet() {
                Ok(true) => {
                    report.add(
                        ValidationCode::IngredientClaimSignatureValidated,
                        Some(uri.to_string()),
                        "ingredient claim signature verified",
                    );
                }
                Ok(false) => {
                    report.add(
                        ValidationCode::IngredientClaimSignatureMismatch,
                        Some(uri.to_string()),
                        "ingredient claim signature does not verify",
                    );
                }
                Err(_) => {
                    report.add(
                        ValidationCode::IngredientClaimSignatureMissing,
                        Some(uri.to_string()),
                        "ingredient manifest has no usable claim signature",
                    );
                }
            }
        }

        Some(label)
    }
}

/// Extract the manifest label from a cross-manifest JUMBF URI
/// (`self#jumbf=/c2pa/<label>[/...]`)
pub(crate) fn manifest_label_from_uri(url: &str) -> Option<String> {
    let path = url.strip_prefix("self#jumbf=")?;
    let rest = path.strip_prefix("/c2pa/")?;
    let label = rest.split('/').next()?;
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_names() {
        assert_eq!(Relationship::ParentOf.as_str(), "parentOf");
        assert_eq!(
            Relationship::from_name("componentOf").unwrap(),
            Relationship::ComponentOf
        );
        assert!(Relationship::from_name("siblingOf").is_err());
    }

    #[test]
    fn test_manifest_label_from_uri() {
        assert_eq!(
            manifest_label_from_uri("self#jumbf=/c2pa/urn:uuid:1234/c2pa.claim"),
            Some("urn:uuid:1234".to_string())
        );
        assert_eq!(
            manifest_label_from_uri("self#jumbf=/c2pa/urn:uuid:1234"),
            Some("urn:uuid:1234".to_string())
        );
        assert_eq!(manifest_label_from_uri("self#jumbf=c2pa.assertions/x"), None);
        assert_eq!(manifest_label_from_uri("http://example.com"), None);
    }

    #[test]
    fn test_v1_roundtrip() {
        let mut ingredient = IngredientAssertion::new(1, Relationship::ParentOf);
        ingredient.title = Some("parent.jpg".to_string());
        ingredient.format = Some("image/jpeg".to_string());
        ingredient.document_id = Some("xmp:did:cb9f5498-67cf-42d0-ae1a-419fb76105e5".to_string());
        ingredient.active_manifest = Some(HashedUri::new(
            "self#jumbf=/c2pa/urn:uuid:5678",
            None,
            vec![0xAB; 32],
        ));

        let sb = ingredient.to_jumbf().unwrap();
        let parsed = IngredientAssertion::from_jumbf(&sb, labels::INGREDIENT, None).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.relationship, Relationship::ParentOf);
        assert_eq!(parsed.title.as_deref(), Some("parent.jpg"));
        assert_eq!(
            parsed.active_manifest.as_ref().unwrap().url,
            "self#jumbf=/c2pa/urn:uuid:5678"
        );
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_v3_roundtrip_with_claim_signature() {
        let mut ingredient = IngredientAssertion::new(3, Relationship::ComponentOf);
        ingredient.active_manifest = Some(HashedUri::new(
            "self#jumbf=/c2pa/urn:c2pa:9999",
            None,
            vec![0xCD; 32],
        ));
        ingredient.claim_signature = Some(HashedUri::new(
            "self#jumbf=/c2pa/urn:c2pa:9999/c2pa.signature",
            None,
            vec![0xEF; 32],
        ));

        let sb = ingredient.to_jumbf().unwrap();
        let parsed = IngredientAssertion::from_jumbf(&sb, labels::INGREDIENT_V3, None).unwrap();
        assert_eq!(parsed.version, 3);
        assert!(parsed.claim_signature.is_some());
    }

    #[test]
    fn test_unknown_relationship_rejected() {
        let wire = serde_cbor::to_vec(&serde_cbor::Value::Map(
            [(
                serde_cbor::Value::Text("relationship".into()),
                serde_cbor::Value::Text("friendOf".into()),
            )]
            .into_iter()
            .collect(),
        ))
        .unwrap();
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, labels::INGREDIENT);
        sb.push_child(ChildBox::Cbor(wire));
        assert!(IngredientAssertion::from_jumbf(&sb, labels::INGREDIENT, None).is_err());
    }
}
