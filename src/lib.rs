//! Streaming validation and signing engine for C2PA manifests.
//!
//! This crate implements the C2PA manifest data model (manifest store,
//! manifests, claims, assertions, COSE signatures), the validation state
//! machine that checks signatures, hash bindings and ingredient lineage,
//! and the reserve-then-sign flow that embeds a manifest into an asset
//! without moving a single byte offset.
//!
//! # Design Principles
//!
//! - **Streaming**: asset bytes are pulled in bounded chunks through the
//!   [`AssetIo`] seam, never loaded wholesale
//! - **Byte stability**: parsed components retain their source bytes, so
//!   an unmutated store re-emits exactly; signing keeps the reserved
//!   envelope size through measured padding
//! - **Reportable validation**: anything that maps to a C2PA status code
//!   becomes a [`StatusEntry`], not an error; errors are for malformed
//!   structure and API misuse
//! - **Format agnostic**: JPEG/PNG/BMFF specifics live behind the
//!   [`AssetIo`]/[`BmffAssetIo`] traits
//!
//! # Example
//!
//! ```no_run
//! use c2pa_manifest::{
//!     assertions::{Action, ActionsAssertion, Assertion, DataHashAssertion, c2pa_action},
//!     Claim, HashAlgorithm, Manifest, ManifestStore, ManifestType,
//! };
//!
//! # #[cfg(feature = "test-utils")]
//! # fn main() -> c2pa_manifest::Result<()> {
//! # let mut asset = c2pa_manifest::test_utils::MemoryAsset::new(vec![0xFF, 0xD8, 0, 0]);
//! # let signer = c2pa_manifest::test_utils::test_signer_es256();
//! // Build a manifest with an edit history and a hard binding
//! let mut manifest = Manifest::new(ManifestType::Standard, Claim::generate_urn_v1());
//! manifest.set_claim(Claim::new_v1("xmp:iid:1234", "image/jpeg", "my_app/1.0"));
//!
//! let mut actions = ActionsAssertion::new(1);
//! actions.add_action(Action::new(c2pa_action::CREATED));
//! manifest.add_assertion(Assertion::Actions(actions))?;
//! manifest.add_assertion(Assertion::DataHash(DataHashAssertion::new(
//!     HashAlgorithm::Sha256,
//! )))?;
//!
//! // Sign and embed; then validate what was written
//! let mut store = ManifestStore::new();
//! store.push_manifest(manifest)?;
//! store.sign_and_embed(&mut asset, &signer)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "test-utils"))]
//! # fn main() {}
//! ```

mod asset;
mod claim;
mod cose;
mod crypto;
mod error;
mod hash;
mod jumbf;
mod manifest;
mod merkle;
mod status;
mod store;

pub mod assertions;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use asset::{AssetIo, AssetRef, BmffAssetIo, BmffBox, ByteRange, FullBoxInfo};
pub use claim::{Claim, ClaimVersion, GeneratorInfo, HashedUri};
pub use cose::{Signature, Signer, TimestampProvider, DEFAULT_TIMESTAMP_TIMEOUT};
pub use crypto::{
    ecdsa_der_to_p1363, ecdsa_p1363_to_der, normalize_rsa_spki, parse_credential, sign_raw,
    verify_cert_chain, verify_raw_signature, CredentialInfo, SigningAlg,
};
pub use error::{Error, Result};
pub use hash::{
    hash_asset_with_exclusions, hash_bytes, Exclusion, HashAlgorithm, Hasher, HASH_CHUNK_SIZE,
};
pub use jumbf::{
    labels as jumbf_labels, ChildBox, DescriptionBox, SuperBox, ASSERTION_STORE_UUID,
    CBOR_ASSERTION_UUID, CLAIM_UUID, EMBEDDED_FILE_UUID, INGREDIENT_UUID, JSON_ASSERTION_UUID,
    MANIFEST_STORE_UUID, MANIFEST_UUID, SIGNATURE_UUID, UPDATE_MANIFEST_UUID,
};
pub use manifest::{Component, Manifest, ManifestType};
pub use merkle::{BlockSizing, MerkleProof, MerkleTree, StreamingChunkHasher};
pub use status::{StatusEntry, ValidationCode, ValidationReport};
pub use store::ManifestStore;
