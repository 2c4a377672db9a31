//! Error types for c2pa-manifest

use std::io;

/// Result type for c2pa-manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, validating or signing manifests
///
/// Validation problems that map to a C2PA status code are reported through
/// [`crate::ValidationReport`] entries, not through this enum. An `Error`
/// surfacing from a validation run indicates a structural problem with the
/// input (converted to a `general.error` entry at the top level) or misuse
/// of the API by the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unknown hash algorithm identifier
    #[error("unsupported hash algorithm: {0}")]
    AlgorithmUnsupported(String),

    /// Unknown or unusable signing algorithm
    #[error("unsupported signing algorithm: {0}")]
    SigningAlgUnsupported(String),

    /// CBOR encoding or decoding failed
    #[error("CBOR error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// COSE envelope construction or parsing failed
    #[error("COSE error: {0}")]
    Cose(String),

    /// Signature primitive failure (bad key material, malformed signature)
    #[error("signature error: {0}")]
    Signature(String),

    /// Malformed JUMBF box
    #[error("invalid JUMBF box at offset {offset}: {reason}")]
    InvalidBox { offset: u64, reason: String },

    /// Assertion content does not match its declared shape
    #[error("assertion `{label}` is malformed: {reason}")]
    AssertionInvalid { label: String, reason: String },

    /// Claim content is missing a mandatory field or has the wrong shape
    #[error("claim is malformed: {0}")]
    ClaimInvalid(String),

    /// A field required for construction or emission is missing
    #[error("required field missing: {0}")]
    RequiredFieldMissing(&'static str),

    /// The reserved envelope cannot absorb the measured growth
    #[error("insufficient padding: envelope grew {needed} bytes past the {reserved} reserved")]
    InsufficientPadding { needed: u64, reserved: u64 },

    /// Merkle tree was built and can no longer be modified
    #[error("merkle tree is sealed; no further leaves may be added")]
    TreeSealed,

    /// Manifest has no claim attached
    #[error("manifest has no claim")]
    ClaimMissing,

    /// A JUMBF URI did not resolve and the operation cannot continue
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    /// V1 action serialization carries at most one ingredient reference
    #[error("a V1 action may reference at most one ingredient")]
    ActionIngredientCardinality,

    /// Unknown assertions preserve source bytes and refuse re-serialization
    #[error("assertion `{0}` is opaque and cannot be re-serialized")]
    OpaqueAssertion(String),

    /// The asset source does not support the requested operation
    #[error("asset does not support {0}")]
    AssetUnsupported(&'static str),

    /// Timestamp authority did not answer within the configured timeout
    #[error("timestamp service unavailable")]
    TimestampUnavailable,

    /// Catch-all for conditions with no more specific variant
    #[error("{0}")]
    Other(String),
}
