//! Manifest aggregate and the per-manifest validation state machine
//!
//! A manifest owns exactly one claim, one assertion store and one signature,
//! reachable through a lazily rebuilt component store keyed by JUMBF-internal
//! path. Validation walks the states in order: signature, structural rules,
//! redactions, claimed and gathered references, then (only when everything
//! so far passed) the hard bindings against the asset and the ingredient
//! lineage.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::{
    asset::AssetRef,
    assertions::{
        self, c2pa_action, expected_relationship, requires_ingredient, takes_ingredients,
        Assertion, AssertionStore,
    },
    claim::{Claim, ClaimVersion, HashedUri},
    cose::Signature,
    error::{Error, Result},
    hash::{hash_bytes, HashAlgorithm},
    jumbf::{self, ChildBox, SuperBox, MANIFEST_UUID, UPDATE_MANIFEST_UUID},
    status::{ValidationCode, ValidationReport},
    store::ManifestStore,
};

/// Manifest flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    /// A full manifest with a hard binding to the asset
    Standard,

    /// An update manifest: no hard binding, exactly one parent ingredient
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ComponentKey {
    Claim,
    Signature,
    AssertionStore,
    Assertion(usize),
}

/// A borrowed manifest component resolved from a JUMBF URI
pub enum Component<'a> {
    Claim(&'a Claim),
    Signature(&'a Signature),
    AssertionStore(&'a AssertionStore),
    Assertion(&'a Assertion),
}

/// One signed unit: claim + assertion store + signature
#[derive(Debug, Clone)]
pub struct Manifest {
    pub manifest_type: ManifestType,

    /// Unique URN label, the key for cross-manifest resolution
    pub label: String,

    claim: Option<Claim>,
    claim_count: usize,
    signature: Option<Signature>,
    assertion_store: AssertionStore,
    source_box: Option<SuperBox>,

    // path -> component, rebuilt lazily after any mutation
    component_store: RefCell<Option<HashMap<String, ComponentKey>>>,
}

impl Manifest {
    /// Create an empty manifest with the given label
    pub fn new(manifest_type: ManifestType, label: impl Into<String>) -> Self {
        Self {
            manifest_type,
            label: label.into(),
            claim: None,
            claim_count: 0,
            signature: None,
            assertion_store: AssertionStore::new(),
            source_box: None,
            component_store: RefCell::new(None),
        }
    }

    /// Parse a manifest from its JUMBF superbox
    pub fn from_jumbf(sb: &SuperBox) -> Result<Self> {
        let manifest_type = if sb.description.uuid == MANIFEST_UUID {
            ManifestType::Standard
        } else if sb.description.uuid == UPDATE_MANIFEST_UUID {
            ManifestType::Update
        } else {
            return Err(Error::InvalidBox {
                offset: 0,
                reason: "superbox is not a manifest".to_string(),
            });
        };

        let label = sb
            .label()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::RequiredFieldMissing("manifest label"))?
            .to_string();

        let mut claim = None;
        let mut claim_count = 0;
        let mut signature = None;
        let mut assertion_store = None;

        for child in sb.child_superboxes() {
            match child.label() {
                Some(l) if l == jumbf::labels::CLAIM || l == jumbf::labels::CLAIM_V2 => {
                    claim_count += 1;
                    if claim.is_none() {
                        claim = Some(Claim::from_jumbf(child)?);
                    }
                }
                Some(jumbf::labels::SIGNATURE) => {
                    signature = Some(Signature::from_jumbf(child)?);
                }
                Some(jumbf::labels::ASSERTION_STORE) => {
                    assertion_store = Some(AssertionStore::from_jumbf(child)?);
                }
                _ => {
                    tracing::trace!(label = ?child.label(), "ignoring unrecognized manifest child");
                }
            }
        }

        Ok(Self {
            manifest_type,
            label,
            claim,
            claim_count,
            signature,
            assertion_store: assertion_store.unwrap_or_default(),
            source_box: Some(sb.clone()),
            component_store: RefCell::new(None),
        })
    }

    /// The claim, if one is attached
    pub fn claim(&self) -> Option<&Claim> {
        self.claim.as_ref()
    }

    /// Mutable claim access; invalidates cached bytes
    pub fn claim_mut(&mut self) -> Option<&mut Claim> {
        self.invalidate();
        self.claim.as_mut()
    }

    /// Attach a claim
    pub fn set_claim(&mut self, claim: Claim) {
        self.invalidate();
        self.claim_count = 1;
        self.claim = Some(claim);
    }

    /// The claim signature component
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Attach a signature component
    pub fn set_signature(&mut self, signature: Signature) {
        self.invalidate();
        self.signature = Some(signature);
    }

    pub(crate) fn signature_mut(&mut self) -> Option<&mut Signature> {
        self.invalidate();
        self.signature.as_mut()
    }

    /// The assertion store
    pub fn assertion_store(&self) -> &AssertionStore {
        &self.assertion_store
    }

    /// Mutable assertion store access; invalidates cached bytes
    pub fn assertion_store_mut(&mut self) -> &mut AssertionStore {
        self.invalidate();
        self.assertion_store.invalidate();
        &mut self.assertion_store
    }

    /// Add an assertion and record a placeholder reference in the claim
    ///
    /// Returns the JUMBF URI of the new assertion.
    pub fn add_assertion(&mut self, assertion: Assertion) -> Result<String> {
        self.invalidate();
        let alg = self
            .claim
            .as_ref()
            .and_then(|c| c.default_algorithm)
            .unwrap_or(HashAlgorithm::Sha256);
        self.assertion_store.push(assertion);
        let full_label = self
            .assertion_store
            .iter()
            .last()
            .map(|a| a.full_label())
            .unwrap_or_default();
        let uri = Self::assertion_uri(&full_label);
        if let Some(claim) = &mut self.claim {
            claim.invalidate();
            claim.assertions.push(HashedUri::placeholder(&uri, alg));
        }
        Ok(uri)
    }

    /// The JUMBF URI for an assertion wire label
    pub fn assertion_uri(full_label: &str) -> String {
        format!(
            "self#jumbf={}/{}",
            jumbf::labels::ASSERTION_STORE,
            full_label
        )
    }

    /// Drop cached serializations after a mutation
    pub fn invalidate(&mut self) {
        self.source_box = None;
        self.component_store.replace(None);
    }

    fn ensure_component_store(&self) {
        let mut cache = self.component_store.borrow_mut();
        if cache.is_some() {
            return;
        }
        let mut map = HashMap::new();
        if let Some(claim) = &self.claim {
            map.insert(claim.label.clone(), ComponentKey::Claim);
        }
        if let Some(signature) = &self.signature {
            map.insert(signature.label.clone(), ComponentKey::Signature);
        }
        map.insert(
            self.assertion_store.label.clone(),
            ComponentKey::AssertionStore,
        );
        for (index, assertion) in self.assertion_store.iter().enumerate() {
            map.insert(
                format!("{}/{}", self.assertion_store.label, assertion.full_label()),
                ComponentKey::Assertion(index),
            );
        }
        *cache = Some(map);
    }

    fn component_key(&self, path: &str) -> Option<ComponentKey> {
        self.ensure_component_store();
        self.component_store
            .borrow()
            .as_ref()
            .and_then(|map| map.get(path).cloned())
    }

    fn component_for_key(&self, key: ComponentKey) -> Option<Component<'_>> {
        match key {
            ComponentKey::Claim => self.claim.as_ref().map(Component::Claim),
            ComponentKey::Signature => self.signature.as_ref().map(Component::Signature),
            ComponentKey::AssertionStore => Some(Component::AssertionStore(&self.assertion_store)),
            ComponentKey::Assertion(index) => {
                self.assertion_store.iter().nth(index).map(Component::Assertion)
            }
        }
    }

    /// Resolve a `self#jumbf=` URI to a component
    ///
    /// Local paths are looked up in this manifest's component store.
    /// `/c2pa/<label>/...` paths resolve through `store` unless
    /// `same_manifest_only` is set. Unknown paths are `None`, not errors.
    pub fn get_component_by_url<'a>(
        &'a self,
        url: &str,
        same_manifest_only: bool,
        store: Option<&'a ManifestStore>,
    ) -> Option<Component<'a>> {
        let path = url.strip_prefix("self#jumbf=")?;

        if let Some(rest) = path.strip_prefix("/c2pa/") {
            if same_manifest_only {
                return None;
            }
            let (label, inner) = match rest.split_once('/') {
                Some((label, inner)) => (label, Some(inner)),
                None => (rest, None),
            };
            let manifest = store?.manifest_by_label(label)?;
            return match inner {
                Some(inner) => {
                    let key = manifest.component_key(inner)?;
                    manifest.component_for_key(key)
                }
                None => None,
            };
        }

        let key = self.component_key(path)?;
        self.component_for_key(key)
    }

    /// The exact serialized bytes of the component at `url`
    pub fn component_bytes(
        &self,
        url: &str,
        same_manifest_only: bool,
        store: Option<&ManifestStore>,
    ) -> Option<Result<Vec<u8>>> {
        let component = self.get_component_by_url(url, same_manifest_only, store)?;
        Some(match component {
            Component::Claim(claim) => claim.to_jumbf().and_then(|sb| sb.to_vec()),
            Component::Signature(signature) => signature.to_jumbf().and_then(|sb| sb.to_vec()),
            Component::AssertionStore(assertion_store) => {
                assertion_store.to_jumbf().and_then(|sb| sb.to_vec())
            }
            Component::Assertion(assertion) => assertion.bytes(),
        })
    }

    /// Serialize into the manifest superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let uuid = match self.manifest_type {
            ManifestType::Standard => MANIFEST_UUID,
            ManifestType::Update => UPDATE_MANIFEST_UUID,
        };
        let mut sb = SuperBox::new(uuid, self.label.clone());
        sb.push_child(ChildBox::SuperBox(self.assertion_store.to_jumbf()?));
        let claim = self.claim.as_ref().ok_or(Error::ClaimMissing)?;
        sb.push_child(ChildBox::SuperBox(claim.to_jumbf()?));
        if let Some(signature) = &self.signature {
            sb.push_child(ChildBox::SuperBox(signature.to_jumbf()?));
        }
        Ok(sb)
    }

    /// The exact manifest bytes (input to ingredient manifest digests)
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.to_jumbf()?.to_vec()
    }

    /// Recompute every claimed hashed reference from current component bytes
    ///
    /// Must run after all assertions are final and before
    /// [`Claim::encode`]; the claim signature covers these hashes.
    pub fn update_hashed_references(&mut self) -> Result<()> {
        self.invalidate();

        let hashes: Vec<Vec<u8>> = {
            let claim = self.claim.as_ref().ok_or(Error::ClaimMissing)?;
            let mut out = Vec::with_capacity(claim.assertions.len());
            for uri in &claim.assertions {
                let alg = uri.alg.or(claim.default_algorithm).ok_or_else(|| {
                    Error::AlgorithmUnsupported("no algorithm for hashed reference".to_string())
                })?;
                let bytes = self
                    .component_bytes(&uri.url, true, None)
                    .ok_or_else(|| Error::ComponentNotFound(uri.url.clone()))??;
                out.push(hash_bytes(&bytes, alg));
            }
            out
        };

        let claim = self.claim.as_mut().ok_or(Error::ClaimMissing)?;
        for (uri, hash) in claim.assertions.iter_mut().zip(hashes) {
            uri.hash = hash;
        }
        claim.invalidate();
        self.invalidate();
        Ok(())
    }

    /// Sign this manifest in place, without touching any asset
    ///
    /// Recomputes hashed references, encodes the claim, and attaches a
    /// freshly signed signature component. Hard bindings are not updated;
    /// use the store-level embed flows for that.
    pub fn sign(&mut self, signer: &crate::cose::Signer) -> Result<()> {
        self.update_hashed_references()?;
        let claim = self.claim_mut().ok_or(Error::ClaimMissing)?;
        claim.encode()?;
        let payload = claim.bytes()?.to_vec();

        let mut signature = Signature::placeholder(signer)?;
        signature.sign(signer, &payload)?;
        self.set_signature(signature);
        Ok(())
    }

    /// Verify the claim signature without reporting, for ingredient checks
    pub(crate) fn verify_claim_signature_quiet(&self) -> Result<bool> {
        let claim = self.claim.as_ref().ok_or(Error::ClaimMissing)?;
        let signature = match self.get_component_by_url(&claim.signature_ref, true, None) {
            Some(Component::Signature(signature)) => signature,
            _ => return Err(Error::ComponentNotFound(claim.signature_ref.clone())),
        };
        let mut report = ValidationReport::new();
        signature.verify(claim.bytes()?, &mut report, &claim.signature_ref);
        Ok(report.has_code(ValidationCode::ClaimSignatureValidated))
    }

    /// Run the full validation state machine against `asset`
    pub fn validate(
        &self,
        asset: AssetRef<'_>,
        store: &ManifestStore,
        report: &mut ValidationReport,
    ) -> Result<()> {
        tracing::debug!(label = %self.label, "validating manifest");

        let Some(claim) = &self.claim else {
            report.add(
                ValidationCode::ClaimMissing,
                None,
                format!("manifest `{}` has no claim", self.label),
            );
            return Ok(());
        };
        if self.claim_count > 1 {
            report.add(
                ValidationCode::ClaimMultiple,
                None,
                format!("manifest `{}` has {} claim boxes", self.label, self.claim_count),
            );
        }

        // 1: signature presence and verification over the claim bytes
        match self.get_component_by_url(&claim.signature_ref, true, None) {
            Some(Component::Signature(signature)) => {
                signature.verify(claim.bytes()?, report, &claim.signature_ref);
            }
            _ => {
                report.add(
                    ValidationCode::ClaimSignatureMissing,
                    Some(claim.signature_ref.clone()),
                    "claim signature reference does not resolve",
                );
            }
        }

        // 2: manifest-type structural rules
        self.validate_structure(report);

        // 3: redacted references
        self.validate_redactions(claim, store, report);

        // 4: claimed references and per-type rules
        self.validate_claimed_assertions(claim, store, report);

        // 5: gathered references (V2)
        for uri in &claim.gathered_assertions {
            self.validate_gathered_reference(claim, uri, report);
        }

        // 6: guarded continuation: do not touch the asset after errors
        if !report.is_valid() {
            return Ok(());
        }

        // 7: hard bindings against the asset
        self.validate_hard_bindings(claim, asset, report);

        // 8: ingredient lineage
        let mut visited = HashSet::new();
        visited.insert(self.label.clone());
        self.validate_ingredient_lineage(store, claim.default_algorithm, report, &mut visited);

        Ok(())
    }

    fn validate_structure(&self, report: &mut ValidationReport) {
        let hard_bindings = self.assertion_store.hard_bindings();
        let parent_count = self
            .assertion_store
            .iter()
            .filter(|a| matches!(a, Assertion::Ingredient(i) if i.relationship == assertions::Relationship::ParentOf))
            .count();

        match self.manifest_type {
            ManifestType::Standard => {
                if hard_bindings.is_empty() {
                    report.add(
                        ValidationCode::ClaimHardBindingsMissing,
                        None,
                        "standard manifest has no hard binding",
                    );
                } else if hard_bindings.len() > 1 {
                    report.add(
                        ValidationCode::AssertionMultipleHardBindings,
                        None,
                        format!("{} hard bindings present", hard_bindings.len()),
                    );
                }
                if parent_count > 1 {
                    report.add(
                        ValidationCode::ManifestMultipleParents,
                        None,
                        format!("{parent_count} parentOf ingredients present"),
                    );
                }
            }
            ManifestType::Update => {
                if !hard_bindings.is_empty() {
                    report.add(
                        ValidationCode::ManifestUpdateInvalid,
                        None,
                        "update manifest carries a hard binding",
                    );
                }
                let has_thumbnail = self
                    .assertion_store
                    .iter()
                    .any(|a| matches!(a, Assertion::Thumbnail(_)));
                if has_thumbnail {
                    report.add(
                        ValidationCode::ManifestUpdateInvalid,
                        None,
                        "update manifest carries a thumbnail",
                    );
                }
                let has_content_actions = self.assertion_store.iter().any(|a| match a {
                    Assertion::Actions(actions) => actions.actions.iter().any(|action| {
                        takes_ingredients(&action.action)
                            || action.action == c2pa_action::CREATED
                    }),
                    _ => false,
                });
                if has_content_actions {
                    report.add(
                        ValidationCode::ManifestUpdateInvalid,
                        None,
                        "update manifest carries content-changing actions",
                    );
                }
                if parent_count != 1 {
                    report.add(
                        ValidationCode::ManifestUpdateWrongParents,
                        None,
                        format!("update manifest has {parent_count} parentOf ingredients"),
                    );
                }
            }
        }
    }

    fn validate_redactions(
        &self,
        claim: &Claim,
        store: &ManifestStore,
        report: &mut ValidationReport,
    ) {
        for uri in &claim.redacted_assertions {
            let resolved = self.get_component_by_url(&uri.url, false, Some(store));
            let Some(Component::Assertion(assertion)) = resolved else {
                report.add(
                    ValidationCode::AssertionMissing,
                    Some(uri.url.clone()),
                    "redacted assertion does not resolve",
                );
                continue;
            };

            if matches!(assertion, Assertion::Actions(_)) {
                report.add(
                    ValidationCode::AssertionActionRedacted,
                    Some(uri.url.clone()),
                    "action assertions cannot be redacted",
                );
                continue;
            }

            if claim.assertions.iter().any(|a| a.url == uri.url) {
                report.add(
                    ValidationCode::AssertionSelfRedacted,
                    Some(uri.url.clone()),
                    "a claim cannot redact its own assertion",
                );
                continue;
            }

            self.validate_reference_target(claim, uri, report, false, Some(store));
        }
    }

    /// Hash-verify one gathered reference resolved within this manifest
    fn validate_gathered_reference(
        &self,
        claim: &Claim,
        uri: &HashedUri,
        report: &mut ValidationReport,
    ) {
        let resolved = self.get_component_by_url(&uri.url, true, None);
        if resolved.is_none() {
            report.add(
                ValidationCode::AssertionMissing,
                Some(uri.url.clone()),
                "gathered assertion does not resolve",
            );
            return;
        }
        report.add(
            ValidationCode::AssertionAccessible,
            Some(uri.url.clone()),
            "gathered assertion is accessible",
        );
        self.validate_reference_target(claim, uri, report, true, None);
    }

    fn validate_reference_target(
        &self,
        claim: &Claim,
        uri: &HashedUri,
        report: &mut ValidationReport,
        same_manifest_only: bool,
        store: Option<&ManifestStore>,
    ) {
        let alg = match claim.resolve_alg(uri) {
            Ok(alg) => alg,
            Err(err) => {
                report.add(
                    ValidationCode::AlgorithmUnsupported,
                    Some(uri.url.clone()),
                    err.to_string(),
                );
                return;
            }
        };
        let bytes = match self.component_bytes(&uri.url, same_manifest_only, store) {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                report.add(
                    ValidationCode::AssertionHashedUriMismatch,
                    Some(uri.url.clone()),
                    format!("cannot serialize referenced component: {err}"),
                );
                return;
            }
            None => {
                report.add(
                    ValidationCode::AssertionMissing,
                    Some(uri.url.clone()),
                    "referenced assertion does not resolve",
                );
                return;
            }
        };

        if hash_bytes(&bytes, alg) == uri.hash {
            report.add(
                ValidationCode::AssertionHashedUriMatch,
                Some(uri.url.clone()),
                "hashed reference verified",
            );
        } else {
            report.add(
                ValidationCode::AssertionHashedUriMismatch,
                Some(uri.url.clone()),
                "referenced bytes do not digest to the recorded hash",
            );
        }
    }

    fn validate_claimed_assertions(
        &self,
        claim: &Claim,
        store: &ManifestStore,
        report: &mut ValidationReport,
    ) {
        let mut action_assertion_count = 0usize;

        for uri in &claim.assertions {
            let resolved = self.get_component_by_url(&uri.url, true, None);
            let Some(Component::Assertion(assertion)) = resolved else {
                report.add(
                    ValidationCode::AssertionMissing,
                    Some(uri.url.clone()),
                    "claimed assertion does not resolve",
                );
                continue;
            };

            self.validate_reference_target(claim, uri, report, true, None);

            if let Assertion::Actions(actions) = assertion {
                action_assertion_count += 1;
                self.validate_actions(claim, actions, uri, store, report);
            }
        }

        if claim.version == ClaimVersion::V1 && action_assertion_count > 1 {
            report.add(
                ValidationCode::AssertionActionMalformed,
                None,
                format!("{action_assertion_count} action assertions on a V1 claim"),
            );
        }
    }

    fn validate_actions(
        &self,
        claim: &Claim,
        actions: &assertions::ActionsAssertion,
        assertion_uri: &HashedUri,
        store: &ManifestStore,
        report: &mut ValidationReport,
    ) {
        if self.manifest_type == ManifestType::Standard && !actions.has_origin_action() {
            report.add(
                ValidationCode::AssertionActionMalformed,
                Some(assertion_uri.url.clone()),
                "actions list has neither c2pa.created nor c2pa.opened",
            );
        }

        for action in &actions.actions {
            if takes_ingredients(&action.action) {
                if action.ingredients.is_empty() {
                    if requires_ingredient(&action.action) {
                        report.add(
                            ValidationCode::AssertionActionMalformed,
                            Some(assertion_uri.url.clone()),
                            format!("`{}` action references no ingredient", action.action),
                        );
                    }
                    continue;
                }

                for ingredient_uri in &action.ingredients {
                    let resolved =
                        self.get_component_by_url(&ingredient_uri.url, true, None);
                    let Some(Component::Assertion(Assertion::Ingredient(ingredient))) = resolved
                    else {
                        report.add(
                            ValidationCode::AssertionActionIngredientMismatch,
                            Some(ingredient_uri.url.clone()),
                            format!(
                                "`{}` action ingredient is not an ingredient assertion",
                                action.action
                            ),
                        );
                        continue;
                    };

                    if let Some(expected) = expected_relationship(&action.action) {
                        if ingredient.relationship != expected {
                            report.add(
                                ValidationCode::AssertionActionIngredientMismatch,
                                Some(ingredient_uri.url.clone()),
                                format!(
                                    "`{}` action needs a {} ingredient, found {}",
                                    action.action,
                                    expected.as_str(),
                                    ingredient.relationship.as_str()
                                ),
                            );
                        }
                    }

                    // the reference from the action into the claim store
                    self.validate_reference_target(claim, ingredient_uri, report, true, None);

                    // the ingredient's thumbnail, when it has one
                    if let Some(thumbnail) = &ingredient.thumbnail {
                        self.validate_reference_target(claim, thumbnail, report, true, None);
                    }
                }
            }

            if action.action == c2pa_action::REDACTED {
                let Some(redacted_url) = &action.redacted else {
                    report.add(
                        ValidationCode::AssertionActionRedactionMismatch,
                        Some(assertion_uri.url.clone()),
                        "c2pa.redacted action names no redacted assertion",
                    );
                    continue;
                };
                let resolves = self
                    .get_component_by_url(redacted_url, false, Some(store))
                    .is_some();
                if !resolves {
                    report.add(
                        ValidationCode::AssertionActionRedactionMismatch,
                        Some(redacted_url.clone()),
                        "redaction target does not resolve",
                    );
                }
            }
        }
    }

    fn validate_hard_bindings(
        &self,
        claim: &Claim,
        asset: AssetRef<'_>,
        report: &mut ValidationReport,
    ) {
        for uri in &claim.assertions {
            let resolved = self.get_component_by_url(&uri.url, true, None);
            match resolved {
                Some(Component::Assertion(Assertion::DataHash(data_hash))) => {
                    data_hash.validate_against_asset(
                        asset.io(),
                        claim.default_algorithm,
                        report,
                        &uri.url,
                    );
                }
                Some(Component::Assertion(Assertion::BmffHash(bmff_hash))) => {
                    match asset.bmff() {
                        Some(bmff) => {
                            bmff_hash.validate_against_asset(
                                bmff,
                                claim.default_algorithm,
                                report,
                                &uri.url,
                            );
                        }
                        None => {
                            report.add(
                                ValidationCode::AssertionBmffHashMalformed,
                                Some(uri.url.clone()),
                                "asset does not expose a BMFF box tree",
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    pub(crate) fn validate_ingredient_lineage(
        &self,
        store: &ManifestStore,
        default_alg: Option<HashAlgorithm>,
        report: &mut ValidationReport,
        visited: &mut HashSet<String>,
    ) {
        for assertion in self.assertion_store.iter() {
            let Assertion::Ingredient(ingredient) = assertion else {
                continue;
            };
            let uri = Self::assertion_uri(&assertion.full_label());
            let Some(label) = ingredient.validate(store, default_alg, report, &uri) else {
                continue;
            };
            if !visited.insert(label.clone()) {
                // malformed input could alias labels; never recurse twice
                continue;
            }
            if let Some(manifest) = store.manifest_by_label(&label) {
                let alg = manifest
                    .claim()
                    .and_then(|c| c.default_algorithm)
                    .or(default_alg);
                manifest.validate_ingredient_lineage(store, alg, report, visited);
            }
        }
    }
}
