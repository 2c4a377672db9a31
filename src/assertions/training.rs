//! Training and data-mining assertion
//!
//! Declares per-use permissions (`allowed`, `notAllowed`, `constrained`)
//! for data mining and model training over the asset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    jumbf::{ChildBox, SuperBox, CBOR_ASSERTION_UUID},
};

/// Well-known entry keys
pub mod training_use {
    pub const DATA_MINING: &str = "c2pa.data_mining";
    pub const AI_TRAINING: &str = "c2pa.ai_training";
    pub const AI_GENERATIVE_TRAINING: &str = "c2pa.ai_generative_training";
    pub const AI_INFERENCE: &str = "c2pa.ai_inference";
}

/// Permission values for one use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingUse {
    #[serde(rename = "allowed")]
    Allowed,
    #[serde(rename = "notAllowed")]
    NotAllowed,
    #[serde(rename = "constrained")]
    Constrained,
}

/// One permission entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingEntry {
    #[serde(rename = "use")]
    pub use_value: TrainingUse,
    #[serde(rename = "constraint_info", skip_serializing_if = "Option::is_none")]
    pub constraint_info: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TrainingWire {
    entries: BTreeMap<String, TrainingEntry>,
}

/// Permissions for training and mining uses of the asset
#[derive(Debug, Clone)]
pub struct TrainingMiningAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,
    pub entries: BTreeMap<String, TrainingEntry>,
    pub(crate) source_box: Option<SuperBox>,
}

impl TrainingMiningAssertion {
    /// An empty assertion under `label` (`c2pa.training-mining` or
    /// `cawg.training-mining`)
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            label_suffix: None,
            entries: BTreeMap::new(),
            source_box: None,
        }
    }

    /// Set the permission for one use
    pub fn set_entry(
        &mut self,
        key: impl Into<String>,
        use_value: TrainingUse,
        constraint_info: Option<String>,
    ) -> &mut Self {
        self.source_box = None;
        self.entries.insert(
            key.into(),
            TrainingEntry {
                use_value,
                constraint_info,
            },
        );
        self
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        let cbor = sb.cbor_content().ok_or_else(|| Error::AssertionInvalid {
            label: base_label.to_string(),
            reason: "training-mining assertion has no CBOR content".to_string(),
        })?;
        let wire: TrainingWire = serde_cbor::from_slice(cbor).map_err(|e| Error::AssertionInvalid {
            label: base_label.to_string(),
            reason: format!("bad CBOR: {e}"),
        })?;
        Ok(Self {
            label: base_label.to_string(),
            label_suffix: suffix,
            entries: wire.entries,
            source_box: Some(sb.clone()),
        })
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
        let wire = TrainingWire {
            entries: self.entries.clone(),
        };
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, self.full_label());
        sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&wire)?));
        Ok(sb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::labels;

    #[test]
    fn test_roundtrip() {
        let mut assertion = TrainingMiningAssertion::new(labels::TRAINING_MINING);
        assertion
            .set_entry(
                training_use::AI_GENERATIVE_TRAINING,
                TrainingUse::NotAllowed,
                None,
            )
            .set_entry(
                training_use::DATA_MINING,
                TrainingUse::Constrained,
                Some("research only".to_string()),
            );

        let sb = assertion.to_jumbf().unwrap();
        let parsed =
            TrainingMiningAssertion::from_jumbf(&sb, labels::TRAINING_MINING, None).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(
            parsed.entries[training_use::AI_GENERATIVE_TRAINING].use_value,
            TrainingUse::NotAllowed
        );
        assert_eq!(
            parsed.entries[training_use::DATA_MINING]
                .constraint_info
                .as_deref(),
            Some("research only")
        );
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_missing_content_rejected() {
        let sb = SuperBox::new(CBOR_ASSERTION_UUID, labels::TRAINING_MINING);
        assert!(TrainingMiningAssertion::from_jumbf(&sb, labels::TRAINING_MINING, None).is_err());
    }
}
