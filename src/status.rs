//! Validation status codes and the append-only validation report
//!
//! Every observable outcome of a validation run is a [`StatusEntry`] carrying
//! one code from the closed C2PA status-code set, the JUMBF URI it applies to
//! (when there is one) and a human-readable explanation. A report stays valid
//! as long as it only accumulates success and informational codes.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Closed set of C2PA validation status codes
///
/// The serialized form of each variant is the exact status-code string from
/// the C2PA specification; nothing outside this set is ever emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCode {
    // Success and informational codes
    #[serde(rename = "claimSignature.validated")]
    ClaimSignatureValidated,
    #[serde(rename = "claimSignature.insideValidity")]
    ClaimSignatureInsideValidity,
    #[serde(rename = "signingCredential.trusted")]
    SigningCredentialTrusted,
    #[serde(rename = "signingCredential.ocsp.notRevoked")]
    SigningCredentialNotRevoked,
    #[serde(rename = "timeStamp.validated")]
    TimeStampValidated,
    #[serde(rename = "timeStamp.trusted")]
    TimeStampTrusted,
    #[serde(rename = "assertion.hashedURI.match")]
    AssertionHashedUriMatch,
    #[serde(rename = "assertion.dataHash.match")]
    AssertionDataHashMatch,
    #[serde(rename = "assertion.bmffHash.match")]
    AssertionBmffHashMatch,
    #[serde(rename = "assertion.accessible")]
    AssertionAccessible,
    #[serde(rename = "ingredient.manifest.validated")]
    IngredientManifestValidated,
    #[serde(rename = "ingredient.claimSignature.validated")]
    IngredientClaimSignatureValidated,
    #[serde(rename = "ingredient.unknownProvenance")]
    IngredientUnknownProvenance,

    // Failure codes
    #[serde(rename = "claim.missing")]
    ClaimMissing,
    #[serde(rename = "claim.multiple")]
    ClaimMultiple,
    #[serde(rename = "claim.hardBindings.missing")]
    ClaimHardBindingsMissing,
    #[serde(rename = "claim.cbor.invalid")]
    ClaimCborInvalid,
    #[serde(rename = "claimSignature.missing")]
    ClaimSignatureMissing,
    #[serde(rename = "claimSignature.mismatch")]
    ClaimSignatureMismatch,
    #[serde(rename = "manifest.multipleParents")]
    ManifestMultipleParents,
    #[serde(rename = "manifest.update.invalid")]
    ManifestUpdateInvalid,
    #[serde(rename = "manifest.update.wrongParents")]
    ManifestUpdateWrongParents,
    #[serde(rename = "signingCredential.untrusted")]
    SigningCredentialUntrusted,
    #[serde(rename = "signingCredential.invalid")]
    SigningCredentialInvalid,
    #[serde(rename = "assertion.hashedURI.mismatch")]
    AssertionHashedUriMismatch,
    #[serde(rename = "assertion.missing")]
    AssertionMissing,
    #[serde(rename = "assertion.multipleHardBindings")]
    AssertionMultipleHardBindings,
    #[serde(rename = "assertion.notRedacted")]
    AssertionNotRedacted,
    #[serde(rename = "assertion.selfRedacted")]
    AssertionSelfRedacted,
    #[serde(rename = "assertion.cbor.invalid")]
    AssertionCborInvalid,
    #[serde(rename = "assertion.json.invalid")]
    AssertionJsonInvalid,
    #[serde(rename = "assertion.action.ingredientMismatch")]
    AssertionActionIngredientMismatch,
    #[serde(rename = "assertion.action.malformed")]
    AssertionActionMalformed,
    #[serde(rename = "assertion.action.redacted")]
    AssertionActionRedacted,
    #[serde(rename = "assertion.action.redactionMismatch")]
    AssertionActionRedactionMismatch,
    #[serde(rename = "assertion.dataHash.mismatch")]
    AssertionDataHashMismatch,
    #[serde(rename = "assertion.bmffHash.malformed")]
    AssertionBmffHashMalformed,
    #[serde(rename = "assertion.bmffHash.mismatch")]
    AssertionBmffHashMismatch,
    #[serde(rename = "ingredient.manifest.missing")]
    IngredientManifestMissing,
    #[serde(rename = "ingredient.manifest.mismatch")]
    IngredientManifestMismatch,
    #[serde(rename = "ingredient.claimSignature.missing")]
    IngredientClaimSignatureMissing,
    #[serde(rename = "ingredient.claimSignature.mismatch")]
    IngredientClaimSignatureMismatch,
    #[serde(rename = "algorithm.unsupported")]
    AlgorithmUnsupported,
    #[serde(rename = "general.error")]
    GeneralError,
}

impl ValidationCode {
    /// The exact status-code string for this code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaimSignatureValidated => "claimSignature.validated",
            Self::ClaimSignatureInsideValidity => "claimSignature.insideValidity",
            Self::SigningCredentialTrusted => "signingCredential.trusted",
            Self::SigningCredentialNotRevoked => "signingCredential.ocsp.notRevoked",
            Self::TimeStampValidated => "timeStamp.validated",
            Self::TimeStampTrusted => "timeStamp.trusted",
            Self::AssertionHashedUriMatch => "assertion.hashedURI.match",
            Self::AssertionDataHashMatch => "assertion.dataHash.match",
            Self::AssertionBmffHashMatch => "assertion.bmffHash.match",
            Self::AssertionAccessible => "assertion.accessible",
            Self::IngredientManifestValidated => "ingredient.manifest.validated",
            Self::IngredientClaimSignatureValidated => "ingredient.claimSignature.validated",
            Self::IngredientUnknownProvenance => "ingredient.unknownProvenance",
            Self::ClaimMissing => "claim.missing",
            Self::ClaimMultiple => "claim.multiple",
            Self::ClaimHardBindingsMissing => "claim.hardBindings.missing",
            Self::ClaimCborInvalid => "claim.cbor.invalid",
            Self::ClaimSignatureMissing => "claimSignature.missing",
            Self::ClaimSignatureMismatch => "claimSignature.mismatch",
            Self::ManifestMultipleParents => "manifest.multipleParents",
            Self::ManifestUpdateInvalid => "manifest.update.invalid",
            Self::ManifestUpdateWrongParents => "manifest.update.wrongParents",
            Self::SigningCredentialUntrusted => "signingCredential.untrusted",
            Self::SigningCredentialInvalid => "signingCredential.invalid",
            Self::AssertionHashedUriMismatch => "assertion.hashedURI.mismatch",
            Self::AssertionMissing => "assertion.missing",
            Self::AssertionMultipleHardBindings => "assertion.multipleHardBindings",
            Self::AssertionNotRedacted => "assertion.notRedacted",
            Self::AssertionSelfRedacted => "assertion.selfRedacted",
            Self::AssertionCborInvalid => "assertion.cbor.invalid",
            Self::AssertionJsonInvalid => "assertion.json.invalid",
            Self::AssertionActionIngredientMismatch => "assertion.action.ingredientMismatch",
            Self::AssertionActionMalformed => "assertion.action.malformed",
            Self::AssertionActionRedacted => "assertion.action.redacted",
            Self::AssertionActionRedactionMismatch => "assertion.action.redactionMismatch",
            Self::AssertionDataHashMismatch => "assertion.dataHash.mismatch",
            Self::AssertionBmffHashMalformed => "assertion.bmffHash.malformed",
            Self::AssertionBmffHashMismatch => "assertion.bmffHash.mismatch",
            Self::IngredientManifestMissing => "ingredient.manifest.missing",
            Self::IngredientManifestMismatch => "ingredient.manifest.mismatch",
            Self::IngredientClaimSignatureMissing => "ingredient.claimSignature.missing",
            Self::IngredientClaimSignatureMismatch => "ingredient.claimSignature.mismatch",
            Self::AlgorithmUnsupported => "algorithm.unsupported",
            Self::GeneralError => "general.error",
        }
    }

    /// Whether this code marks the containing report invalid
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            Self::ClaimSignatureValidated
                | Self::ClaimSignatureInsideValidity
                | Self::SigningCredentialTrusted
                | Self::SigningCredentialNotRevoked
                | Self::TimeStampValidated
                | Self::TimeStampTrusted
                | Self::AssertionHashedUriMatch
                | Self::AssertionDataHashMatch
                | Self::AssertionBmffHashMatch
                | Self::AssertionAccessible
                | Self::IngredientManifestValidated
                | Self::IngredientClaimSignatureValidated
                | Self::IngredientUnknownProvenance
        )
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One validation outcome: code, the URI it applies to, and an explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub code: ValidationCode,

    /// JUMBF URI of the component this entry refers to, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub explanation: String,
}

/// Append-only sequence of validation outcomes
///
/// Entries appear in visit order; that ordering is part of the observable
/// contract. The report is valid while every entry carries a success or
/// informational code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    entries: Vec<StatusEntry>,
    valid: bool,
}

impl ValidationReport {
    /// Create an empty (valid) report
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            valid: true,
        }
    }

    /// Append an entry; a failure code marks the report invalid
    pub fn add(
        &mut self,
        code: ValidationCode,
        url: Option<String>,
        explanation: impl Into<String>,
    ) {
        let explanation = explanation.into();
        if code.is_failure() {
            tracing::warn!(code = code.as_str(), url = url.as_deref(), "{explanation}");
            self.valid = false;
        } else {
            tracing::debug!(code = code.as_str(), url = url.as_deref(), "{explanation}");
        }
        self.entries.push(StatusEntry {
            code,
            url,
            explanation,
        });
    }

    /// `true` while no failure code has been recorded
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Entries in the order they were recorded
    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Whether any entry carries the given code
    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    /// Append all entries of `other`, preserving order
    pub fn merge(&mut self, other: ValidationReport) {
        self.valid = self.valid && other.valid;
        self.entries.extend(other.entries);
    }

    /// Convert a structural error raised during parsing into a report entry
    ///
    /// Claim-shape problems map to `claim.cbor.invalid`, assertion-shape
    /// problems to `assertion.cbor.invalid`, unknown algorithms to
    /// `algorithm.unsupported`; everything else is a `general.error`.
    pub fn from_error(err: &Error) -> Self {
        let mut report = Self::new();
        let code = match err {
            Error::ClaimInvalid(_) => ValidationCode::ClaimCborInvalid,
            Error::AssertionInvalid { .. } => ValidationCode::AssertionCborInvalid,
            Error::Json(_) => ValidationCode::AssertionJsonInvalid,
            Error::AlgorithmUnsupported(_) => ValidationCode::AlgorithmUnsupported,
            _ => ValidationCode::GeneralError,
        };
        report.add(code, None, err.to_string());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings_are_exact() {
        assert_eq!(
            ValidationCode::ClaimSignatureValidated.as_str(),
            "claimSignature.validated"
        );
        assert_eq!(
            ValidationCode::AssertionHashedUriMismatch.as_str(),
            "assertion.hashedURI.mismatch"
        );
        assert_eq!(
            ValidationCode::SigningCredentialNotRevoked.as_str(),
            "signingCredential.ocsp.notRevoked"
        );
        assert_eq!(ValidationCode::GeneralError.as_str(), "general.error");
    }

    #[test]
    fn test_serde_uses_code_strings() {
        let json = serde_json::to_string(&ValidationCode::AssertionDataHashMatch).unwrap();
        assert_eq!(json, "\"assertion.dataHash.match\"");

        let back: ValidationCode = serde_json::from_str("\"claim.hardBindings.missing\"").unwrap();
        assert_eq!(back, ValidationCode::ClaimHardBindingsMissing);
    }

    #[test]
    fn test_failure_flips_validity() {
        let mut report = ValidationReport::new();
        assert!(report.is_valid());

        report.add(
            ValidationCode::AssertionDataHashMatch,
            Some("self#jumbf=c2pa.assertions/c2pa.hash.data".to_string()),
            "asset hash matches",
        );
        assert!(report.is_valid());

        report.add(
            ValidationCode::AssertionDataHashMismatch,
            None,
            "asset bytes were altered",
        );
        assert!(!report.is_valid());
        assert_eq!(report.entries().len(), 2);
    }

    #[test]
    fn test_merge_preserves_order_and_validity() {
        let mut first = ValidationReport::new();
        first.add(ValidationCode::ClaimSignatureValidated, None, "ok");

        let mut second = ValidationReport::new();
        second.add(ValidationCode::AssertionMissing, None, "gone");

        first.merge(second);
        assert!(!first.is_valid());
        assert_eq!(
            first.entries()[1].code,
            ValidationCode::AssertionMissing
        );
    }

    #[test]
    fn test_from_error_maps_claim_shape_problems() {
        let report = ValidationReport::from_error(&Error::ClaimInvalid("no instanceID".into()));
        assert!(report.has_code(ValidationCode::ClaimCborInvalid));
        assert!(!report.is_valid());
    }
}
