//! Manifest store: the outermost JUMBF superbox
//!
//! An ordered chain of manifests; the active manifest is the last one.
//! Labels are unique within a store and are the keys for cross-manifest
//! URI resolution. The store also drives the signing flow: reserve space
//! in the asset, bind the data hash, fill in hashed references, sign the
//! claim, write the final JUMBF back.

use std::collections::HashSet;

use crate::{
    asset::{AssetIo, AssetRef, BmffAssetIo},
    assertions::{labels as assertion_labels, Assertion},
    cose::{Signature, Signer},
    error::{Error, Result},
    jumbf::{self, ChildBox, SuperBox, MANIFEST_STORE_UUID},
    manifest::Manifest,
    status::{ValidationCode, ValidationReport},
};

/// Ordered chain of manifests embedded in one asset
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    manifests: Vec<Manifest>,
    source_box: Option<SuperBox>,
}

impl ManifestStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a store from the raw JUMBF blob extracted from an asset
    pub fn from_jumbf_bytes(bytes: &[u8]) -> Result<Self> {
        let sb = SuperBox::from_slice(bytes)?;
        if sb.description.uuid != MANIFEST_STORE_UUID {
            return Err(Error::InvalidBox {
                offset: 0,
                reason: "outermost box is not a manifest store".to_string(),
            });
        }

        let mut manifests = Vec::new();
        let mut labels = HashSet::new();
        for child in sb.child_superboxes() {
            let manifest = Manifest::from_jumbf(child)?;
            if !labels.insert(manifest.label.clone()) {
                return Err(Error::InvalidBox {
                    offset: 0,
                    reason: format!("duplicate manifest label `{}`", manifest.label),
                });
            }
            manifests.push(manifest);
        }

        tracing::debug!(manifests = manifests.len(), "parsed manifest store");
        Ok(Self {
            manifests,
            source_box: Some(sb),
        })
    }

    /// Read and parse the store embedded in an asset, if any
    pub fn from_asset(asset: &dyn AssetIo) -> Result<Option<Self>> {
        match asset.manifest_jumbf()? {
            Some(bytes) => Ok(Some(Self::from_jumbf_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize the outermost superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let mut sb = SuperBox::new(MANIFEST_STORE_UUID, jumbf::labels::MANIFEST_STORE);
        for manifest in &self.manifests {
            sb.push_child(ChildBox::SuperBox(manifest.to_jumbf()?));
        }
        Ok(sb)
    }

    /// Serialize to the raw JUMBF blob written into an asset
    pub fn to_jumbf_bytes(&self) -> Result<Vec<u8>> {
        self.to_jumbf()?.to_vec()
    }

    /// All manifests, oldest first
    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    /// The active manifest (the last in the chain)
    pub fn active_manifest(&self) -> Option<&Manifest> {
        self.manifests.last()
    }

    /// Mutable access to the active manifest; invalidates cached bytes
    pub fn active_manifest_mut(&mut self) -> Option<&mut Manifest> {
        self.source_box = None;
        self.manifests.last_mut()
    }

    /// Look up a manifest by its URN label
    pub fn manifest_by_label(&self, label: &str) -> Option<&Manifest> {
        self.manifests.iter().find(|m| m.label == label)
    }

    /// Append a manifest; labels must stay unique
    pub fn push_manifest(&mut self, manifest: Manifest) -> Result<()> {
        if manifest.label.is_empty() {
            return Err(Error::RequiredFieldMissing("manifest label"));
        }
        if self.manifest_by_label(&manifest.label).is_some() {
            return Err(Error::Other(format!(
                "duplicate manifest label `{}`",
                manifest.label
            )));
        }
        self.source_box = None;
        self.manifests.push(manifest);
        Ok(())
    }

    /// Validate the active manifest against the asset
    ///
    /// Structural errors raised while walking the store are converted into
    /// report entries; this never fails.
    pub fn validate(&self, asset: AssetRef<'_>) -> ValidationReport {
        let mut report = ValidationReport::new();
        match self.active_manifest() {
            None => {
                report.add(
                    ValidationCode::ClaimMissing,
                    None,
                    "manifest store contains no manifests",
                );
            }
            Some(manifest) => {
                if let Err(err) = manifest.validate(asset, self, &mut report) {
                    report.merge(ValidationReport::from_error(&err));
                }
            }
        }
        report
    }

    /// Attach the placeholder signature and encode the claim so the final
    /// store size is measurable, then reserve space in the asset
    fn reserve_in_asset(&mut self, asset: &mut dyn AssetIo, signer: &Signer) -> Result<u64> {
        let manifest = self.manifests.last_mut().ok_or(Error::ClaimMissing)?;
        manifest.set_signature(Signature::placeholder(signer)?);
        manifest.claim_mut().ok_or(Error::ClaimMissing)?.encode()?;

        self.source_box = None;
        let reserved = self.to_jumbf_bytes()?.len() as u64;
        asset.ensure_manifest_space(reserved)?;
        tracing::debug!(reserved, "manifest space reserved in asset");
        Ok(reserved)
    }

    /// Recompute hashed references, sign the claim in place and write the
    /// final JUMBF into the reservation
    fn sign_and_write(
        &mut self,
        asset: &mut dyn AssetIo,
        signer: &Signer,
        reserved: u64,
    ) -> Result<()> {
        let manifest = self.manifests.last_mut().ok_or(Error::ClaimMissing)?;
        manifest.update_hashed_references()?;
        let claim = manifest.claim_mut().ok_or(Error::ClaimMissing)?;
        claim.encode()?;
        let payload = claim.bytes()?.to_vec();

        manifest
            .signature_mut()
            .ok_or(Error::RequiredFieldMissing("signature"))?
            .sign(signer, &payload)?;

        self.source_box = None;
        let bytes = self.to_jumbf_bytes()?;
        if bytes.len() as u64 != reserved {
            return Err(Error::Other(format!(
                "manifest store changed size during signing ({} != {reserved})",
                bytes.len()
            )));
        }
        asset.write_manifest_jumbf(&bytes)?;
        tracing::debug!(bytes = bytes.len(), "manifest store embedded");
        Ok(())
    }

    /// Sign the active manifest and embed the store into a byte-oriented
    /// asset through its DataHash hard binding
    ///
    /// The flow keeps every byte offset stable: reserve space first, then
    /// bind the data hash against the final layout, recompute hashed
    /// references, sign the claim bytes in place, and write the JUMBF into
    /// the reservation.
    pub fn sign_and_embed(&mut self, asset: &mut dyn AssetIo, signer: &Signer) -> Result<()> {
        let reserved = self.reserve_in_asset(asset, signer)?;

        let manifest = self.manifests.last_mut().expect("reserve checked");
        match manifest
            .assertion_store_mut()
            .find_mut(assertion_labels::DATA_HASH)
        {
            Some(Assertion::DataHash(data_hash)) => data_hash.update_with_asset(asset)?,
            _ => return Err(Error::RequiredFieldMissing("data hash assertion")),
        }

        self.sign_and_write(asset, signer, reserved)
    }

    /// Sign an update manifest (no hard binding) and embed the store
    pub fn sign_and_embed_update(&mut self, asset: &mut dyn AssetIo, signer: &Signer) -> Result<()> {
        let reserved = self.reserve_in_asset(asset, signer)?;
        self.sign_and_write(asset, signer, reserved)
    }

    /// Sign the active manifest and embed the store into a BMFF asset
    /// through its BMFF hash hard binding
    pub fn sign_and_embed_bmff<A: BmffAssetIo>(
        &mut self,
        asset: &mut A,
        signer: &Signer,
    ) -> Result<()> {
        let reserved = self.reserve_in_asset(asset, signer)?;

        let manifest = self.manifests.last_mut().expect("reserve checked");
        let bmff_hash = manifest.assertion_store_mut().iter_mut().find_map(|a| match a {
            Assertion::BmffHash(bmff_hash) => Some(bmff_hash),
            _ => None,
        });
        match bmff_hash {
            Some(bmff_hash) => bmff_hash.update_with_asset(&*asset)?,
            None => return Err(Error::RequiredFieldMissing("BMFF hash assertion")),
        }

        self.sign_and_write(asset, signer, reserved)
    }
}
