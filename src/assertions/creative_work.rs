//! Schema.org CreativeWork assertion

use crate::{
    error::{Error, Result},
    jumbf::{ChildBox, SuperBox, JSON_ASSERTION_UUID},
};

use super::labels;

const SCHEMA_ORG_CONTEXT: &str = "https://schema.org";

/// A schema.org CreativeWork record (authors, publication facts)
#[derive(Debug, Clone)]
pub struct CreativeWorkAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,
    pub value: serde_json::Value,
    pub(crate) source_box: Option<SuperBox>,
}

impl CreativeWorkAssertion {
    /// A CreativeWork with the given authors (`@type`, `name` pairs)
    pub fn new(authors: &[(&str, &str)]) -> Self {
        let author_values: Vec<serde_json::Value> = authors
            .iter()
            .map(|(author_type, name)| {
                serde_json::json!({"@type": author_type, "name": name})
            })
            .collect();
        Self {
            label: labels::CREATIVE_WORK.to_string(),
            label_suffix: None,
            value: serde_json::json!({
                "@context": SCHEMA_ORG_CONTEXT,
                "@type": "CreativeWork",
                "author": author_values,
            }),
            source_box: None,
        }
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        let json = sb.json_content().ok_or_else(|| Error::AssertionInvalid {
            label: base_label.to_string(),
            reason: "CreativeWork assertion has no JSON content".to_string(),
        })?;
        let value: serde_json::Value = serde_json::from_slice(json)?;
        if !value.is_object() {
            return Err(Error::AssertionInvalid {
                label: base_label.to_string(),
                reason: "CreativeWork content is not a JSON object".to_string(),
            });
        }
        Ok(Self {
            label: base_label.to_string(),
            label_suffix: suffix,
            value,
            source_box: Some(sb.clone()),
        })
    }

    /// The full wire label
    pub fn full_label(&self) -> String {
        super::full_label(&self.label, self.label_suffix)
    }

    /// Author names, when present
    pub fn author_names(&self) -> Vec<&str> {
        self.value
            .get("author")
            .and_then(|a| a.as_array())
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|a| a.get("name").and_then(|n| n.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serialize into the assertion superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let mut sb = SuperBox::new(JSON_ASSERTION_UUID, self.full_label());
        sb.push_child(ChildBox::Json(serde_json::to_vec(&self.value)?));
        Ok(sb)
    }
}
