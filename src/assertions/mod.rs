//! Typed assertions and the assertion store
//!
//! The store owns the manifest's assertions in declaration order and
//! dispatches parsing by description-box label (after stripping any
//! `__<n>` disambiguation suffix). Types nobody recognizes are preserved
//! verbatim as [`UnknownAssertion`]s.

mod actions;
mod bmff_hash;
mod creative_work;
mod data_hash;
mod ingredient;
mod metadata;
mod thumbnail;
mod training;
mod unknown;

pub use actions::{
    c2pa_action, expected_relationship, requires_ingredient, takes_ingredients, Action,
    ActionTemplate, ActionsAssertion,
};
pub use bmff_hash::{BmffExclusion, BmffHashAssertion, DataMatch, MerkleMap, SubsetRange};
pub use creative_work::CreativeWorkAssertion;
pub use data_hash::DataHashAssertion;
pub use ingredient::{IngredientAssertion, Relationship};
pub use metadata::{MetadataAssertion, MetadataKind};
pub use thumbnail::ThumbnailAssertion;
pub use training::{training_use, TrainingEntry, TrainingMiningAssertion, TrainingUse};
pub use unknown::UnknownAssertion;

use crate::{
    error::{Error, Result},
    jumbf::{self, SuperBox, ASSERTION_STORE_UUID},
};

/// Well-known assertion labels
pub mod labels {
    pub const ACTIONS: &str = "c2pa.actions";
    pub const ACTIONS_V2: &str = "c2pa.actions.v2";
    pub const DATA_HASH: &str = "c2pa.hash.data";
    pub const BMFF_HASH_V2: &str = "c2pa.hash.bmff.v2";
    pub const BMFF_HASH_V3: &str = "c2pa.hash.bmff.v3";
    pub const INGREDIENT: &str = "c2pa.ingredient";
    pub const INGREDIENT_V2: &str = "c2pa.ingredient.v2";
    pub const INGREDIENT_V3: &str = "c2pa.ingredient.v3";
    pub const CREATIVE_WORK: &str = "stds.schema-org.CreativeWork";
    pub const TRAINING_MINING: &str = "c2pa.training-mining";
    pub const CAWG_TRAINING_MINING: &str = "cawg.training-mining";
    pub const CLAIM_THUMBNAIL_PREFIX: &str = "c2pa.thumbnail.claim.";
    pub const INGREDIENT_THUMBNAIL_PREFIX: &str = "c2pa.thumbnail.ingredient";

    /// Labels handled by the metadata assertion
    pub const METADATA: &[&str] = &[
        "c2pa.metadata",
        "cawg.metadata",
        "stds.metadata",
        "stds.exif",
        "stds.iptc",
        "stds.iptc.photo-metadata",
    ];
}

/// Split a wire label into its base label and `__<n>` suffix
pub(crate) fn split_label(full: &str) -> (String, Option<u32>) {
    if let Some((base, suffix)) = full.rsplit_once("__") {
        if let Ok(n) = suffix.parse::<u32>() {
            return (base.to_string(), Some(n));
        }
    }
    (full.to_string(), None)
}

/// Compose a wire label from a base label and optional suffix
pub(crate) fn full_label(base: &str, suffix: Option<u32>) -> String {
    match suffix {
        Some(n) => format!("{base}__{n}"),
        None => base.to_string(),
    }
}

/// One assertion of any recognized (or preserved-unknown) type
#[derive(Debug, Clone)]
pub enum Assertion {
    DataHash(DataHashAssertion),
    BmffHash(BmffHashAssertion),
    Ingredient(IngredientAssertion),
    Actions(ActionsAssertion),
    Metadata(MetadataAssertion),
    Thumbnail(ThumbnailAssertion),
    CreativeWork(CreativeWorkAssertion),
    TrainingMining(TrainingMiningAssertion),
    Unknown(UnknownAssertion),
}

impl Assertion {
    /// Parse an assertion superbox, dispatching on its label
    pub fn from_jumbf(sb: &SuperBox) -> Result<Self> {
        let full = sb.label().ok_or_else(|| Error::AssertionInvalid {
            label: "<unlabeled>".to_string(),
            reason: "assertion box has no label".to_string(),
        })?;
        let (base, suffix) = split_label(full);

        let assertion = match base.as_str() {
            labels::ACTIONS | labels::ACTIONS_V2 => {
                Assertion::Actions(ActionsAssertion::from_jumbf(sb, &base, suffix)?)
            }
            labels::DATA_HASH => Assertion::DataHash(DataHashAssertion::from_jumbf(sb, suffix)?),
            labels::BMFF_HASH_V2 | labels::BMFF_HASH_V3 => {
                Assertion::BmffHash(BmffHashAssertion::from_jumbf(sb, &base, suffix)?)
            }
            labels::INGREDIENT | labels::INGREDIENT_V2 | labels::INGREDIENT_V3 => {
                Assertion::Ingredient(IngredientAssertion::from_jumbf(sb, &base, suffix)?)
            }
            labels::CREATIVE_WORK => {
                Assertion::CreativeWork(CreativeWorkAssertion::from_jumbf(sb, &base, suffix)?)
            }
            labels::TRAINING_MINING | labels::CAWG_TRAINING_MINING => {
                Assertion::TrainingMining(TrainingMiningAssertion::from_jumbf(sb, &base, suffix)?)
            }
            other if labels::METADATA.contains(&other) => {
                Assertion::Metadata(MetadataAssertion::from_jumbf(sb, &base, suffix)?)
            }
            other
                if other.starts_with(labels::CLAIM_THUMBNAIL_PREFIX)
                    || other.starts_with(labels::INGREDIENT_THUMBNAIL_PREFIX) =>
            {
                Assertion::Thumbnail(ThumbnailAssertion::from_jumbf(sb, &base, suffix)?)
            }
            other => Assertion::Unknown(UnknownAssertion::from_jumbf(sb, other, suffix)?),
        };
        Ok(assertion)
    }

    /// The base label
    pub fn label(&self) -> &str {
        match self {
            Self::DataHash(a) => &a.label,
            Self::BmffHash(a) => &a.label,
            Self::Ingredient(a) => &a.label,
            Self::Actions(a) => &a.label,
            Self::Metadata(a) => &a.label,
            Self::Thumbnail(a) => &a.label,
            Self::CreativeWork(a) => &a.label,
            Self::TrainingMining(a) => &a.label,
            Self::Unknown(a) => &a.label,
        }
    }

    /// The disambiguation suffix, if any
    pub fn label_suffix(&self) -> Option<u32> {
        match self {
            Self::DataHash(a) => a.label_suffix,
            Self::BmffHash(a) => a.label_suffix,
            Self::Ingredient(a) => a.label_suffix,
            Self::Actions(a) => a.label_suffix,
            Self::Metadata(a) => a.label_suffix,
            Self::Thumbnail(a) => a.label_suffix,
            Self::CreativeWork(a) => a.label_suffix,
            Self::TrainingMining(a) => a.label_suffix,
            Self::Unknown(a) => a.label_suffix,
        }
    }

    fn set_label_suffix(&mut self, suffix: Option<u32>) {
        match self {
            Self::DataHash(a) => a.label_suffix = suffix,
            Self::BmffHash(a) => a.label_suffix = suffix,
            Self::Ingredient(a) => a.label_suffix = suffix,
            Self::Actions(a) => a.label_suffix = suffix,
            Self::Metadata(a) => a.label_suffix = suffix,
            Self::Thumbnail(a) => a.label_suffix = suffix,
            Self::CreativeWork(a) => a.label_suffix = suffix,
            Self::TrainingMining(a) => a.label_suffix = suffix,
            Self::Unknown(a) => a.label_suffix = suffix,
        }
    }

    /// The wire label (`label` or `label__<suffix>`)
    pub fn full_label(&self) -> String {
        full_label(self.label(), self.label_suffix())
    }

    /// Whether this assertion is a hard binding to the asset bytes
    pub fn is_hard_binding(&self) -> bool {
        matches!(self, Self::DataHash(_) | Self::BmffHash(_))
    }

    /// Serialize into the assertion superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        match self {
            Self::DataHash(a) => a.to_jumbf(),
            Self::BmffHash(a) => a.to_jumbf(),
            Self::Ingredient(a) => a.to_jumbf(),
            Self::Actions(a) => a.to_jumbf(),
            Self::Metadata(a) => a.to_jumbf(),
            Self::Thumbnail(a) => a.to_jumbf(),
            Self::CreativeWork(a) => a.to_jumbf(),
            Self::TrainingMining(a) => a.to_jumbf(),
            Self::Unknown(a) => a.to_jumbf(),
        }
    }

    /// The exact serialized bytes of this assertion's superbox, the input
    /// to hashed-reference digests
    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.to_jumbf()?.to_vec()
    }
}

/// Ordered collection of a manifest's assertions
#[derive(Debug, Clone)]
pub struct AssertionStore {
    /// Store label, always `c2pa.assertions`
    pub label: String,

    assertions: Vec<Assertion>,
    source_box: Option<SuperBox>,
}

impl Default for AssertionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssertionStore {
    /// An empty store
    pub fn new() -> Self {
        Self {
            label: jumbf::labels::ASSERTION_STORE.to_string(),
            assertions: Vec::new(),
            source_box: None,
        }
    }

    /// Parse a store and all contained assertions from its superbox
    pub fn from_jumbf(sb: &SuperBox) -> Result<Self> {
        let label = sb.label().unwrap_or_default().to_string();
        if label != jumbf::labels::ASSERTION_STORE {
            return Err(Error::AssertionInvalid {
                label,
                reason: "assertion store label must be c2pa.assertions".to_string(),
            });
        }

        let mut assertions = Vec::new();
        for child in sb.child_superboxes() {
            assertions.push(Assertion::from_jumbf(child)?);
        }

        Ok(Self {
            label,
            assertions,
            source_box: Some(sb.clone()),
        })
    }

    /// Serialize the store and all assertions
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let mut sb = SuperBox::new(ASSERTION_STORE_UUID, self.label.clone());
        for assertion in &self.assertions {
            sb.push_child(jumbf::ChildBox::SuperBox(assertion.to_jumbf()?));
        }
        Ok(sb)
    }

    /// Append an assertion, assigning a `__<n>` suffix when the base label
    /// is already taken
    pub fn push(&mut self, mut assertion: Assertion) {
        self.source_box = None;
        let base = assertion.label().to_string();
        let taken = self
            .assertions
            .iter()
            .filter(|a| a.label() == base)
            .count();
        if taken > 0 {
            assertion.set_label_suffix(Some(taken as u32 + 1));
        }
        self.assertions.push(assertion);
    }

    /// Assertions in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter()
    }

    /// Number of assertions
    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    /// Whether the store holds no assertions
    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    /// Find an assertion by its wire label
    pub fn find(&self, full_label: &str) -> Option<&Assertion> {
        self.assertions.iter().find(|a| a.full_label() == full_label)
    }

    /// Find an assertion by wire label, mutably (drops cached store bytes)
    pub fn find_mut(&mut self, full_label: &str) -> Option<&mut Assertion> {
        self.source_box = None;
        self.assertions
            .iter_mut()
            .find(|a| a.full_label() == full_label)
    }

    /// Mutable iteration (drops cached store bytes)
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Assertion> {
        self.source_box = None;
        self.assertions.iter_mut()
    }

    /// The hard-binding assertions in the store
    pub fn hard_bindings(&self) -> Vec<&Assertion> {
        self.assertions.iter().filter(|a| a.is_hard_binding()).collect()
    }

    /// Drop cached source bytes after external mutation
    pub fn invalidate(&mut self) {
        self.source_box = None;
    }
}
