//! Metadata assertions (EXIF, IPTC, JSON-LD namespaces)
//!
//! Carries either JSON or CBOR content depending on the emitting namespace.
//! A minimal prefix expander resolves `@context` prefixes; full JSON-LD
//! processing is out of scope.

use crate::{
    error::{Error, Result},
    jumbf::{ChildBox, SuperBox, CBOR_ASSERTION_UUID, JSON_ASSERTION_UUID},
};

/// Which content-box flavor the assertion was stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Json,
    Cbor,
}

/// A namespaced metadata assertion
#[derive(Debug, Clone)]
pub struct MetadataAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,
    pub kind: MetadataKind,

    /// Parsed content; CBOR sources are converted to the JSON value model
    pub value: serde_json::Value,

    pub(crate) source_box: Option<SuperBox>,
}

impl MetadataAssertion {
    /// A fresh JSON metadata assertion under `label`
    pub fn new(label: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            label: label.into(),
            label_suffix: None,
            kind: MetadataKind::Json,
            value,
            source_box: None,
        }
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        if let Some(json) = sb.json_content() {
            let value: serde_json::Value = serde_json::from_slice(json)?;
            return Ok(Self {
                label: base_label.to_string(),
                label_suffix: suffix,
                kind: MetadataKind::Json,
                value,
                source_box: Some(sb.clone()),
            });
        }
        if let Some(cbor) = sb.cbor_content() {
            let value: serde_cbor::Value = serde_cbor::from_slice(cbor)?;
            return Ok(Self {
                label: base_label.to_string(),
                label_suffix: suffix,
                kind: MetadataKind::Cbor,
                value: cbor_to_json(value)?,
                source_box: Some(sb.clone()),
            });
        }
        Err(Error::AssertionInvalid {
            label: base_label.to_string(),
            reason: "metadata assertion has no JSON or CBOR content".to_string(),
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
        match self.kind {
            MetadataKind::Json => {
                let mut sb = SuperBox::new(JSON_ASSERTION_UUID, self.full_label());
                sb.push_child(ChildBox::Json(serde_json::to_vec(&self.value)?));
                Ok(sb)
            }
            MetadataKind::Cbor => {
                let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, self.full_label());
                sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&json_to_cbor(
                    &self.value,
                ))?));
                Ok(sb)
            }
        }
    }

    /// Expand prefixed keys through the `@context` table
    ///
    /// `{"@context": {"exif": "http://ns.adobe.com/exif/1.0/"},
    ///   "exif:FNumber": 4}` becomes
    /// `{..., "http://ns.adobe.com/exif/1.0/FNumber": 4}`.
    pub fn expanded(&self) -> serde_json::Value {
        let prefixes = match self.value.get("@context") {
            Some(serde_json::Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|uri| (k.clone(), uri.to_string())))
                .collect(),
            _ => std::collections::HashMap::new(),
        };
        expand_value(&self.value, &prefixes)
    }
}

fn expand_value(
    value: &serde_json::Value,
    prefixes: &std::collections::HashMap<String, String>,
) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let expanded_key = match key.split_once(':') {
                    Some((prefix, rest)) if prefixes.contains_key(prefix) => {
                        format!("{}{rest}", prefixes[prefix])
                    }
                    _ => key.clone(),
                };
                out.insert(expanded_key, expand_value(inner, prefixes));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|item| expand_value(item, prefixes)).collect(),
        ),
        other => other.clone(),
    }
}

/// Convert a CBOR value to the JSON value model
pub(crate) fn cbor_to_json(value: serde_cbor::Value) -> Result<serde_json::Value> {
    Ok(match value {
        serde_cbor::Value::Null => serde_json::Value::Null,
        serde_cbor::Value::Bool(b) => serde_json::Value::Bool(b),
        serde_cbor::Value::Integer(i) => {
            if let Ok(n) = i64::try_from(i) {
                serde_json::Value::Number(n.into())
            } else if let Ok(n) = u64::try_from(i) {
                serde_json::Value::Number(n.into())
            } else {
                return Err(Error::Other(format!("integer {i} does not fit JSON")));
            }
        }
        serde_cbor::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        serde_cbor::Value::Text(s) => serde_json::Value::String(s),
        serde_cbor::Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
        serde_cbor::Value::Array(items) => serde_json::Value::Array(
            items.into_iter().map(cbor_to_json).collect::<Result<_>>()?,
        ),
        serde_cbor::Value::Map(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let key = match key {
                    serde_cbor::Value::Text(t) => t,
                    other => {
                        return Err(Error::Other(format!("non-text CBOR map key {other:?}")))
                    }
                };
                out.insert(key, cbor_to_json(inner)?);
            }
            serde_json::Value::Object(out)
        }
        serde_cbor::Value::Tag(_, inner) => cbor_to_json(*inner)?,
        _ => serde_json::Value::Null,
    })
}

/// Convert a JSON value to the CBOR value model
pub(crate) fn json_to_cbor(value: &serde_json::Value) -> serde_cbor::Value {
    match value {
        serde_json::Value::Null => serde_cbor::Value::Null,
        serde_json::Value::Bool(b) => serde_cbor::Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_cbor::Value::Integer(i as i128)
            } else if let Some(u) = n.as_u64() {
                serde_cbor::Value::Integer(u as i128)
            } else {
                serde_cbor::Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => serde_cbor::Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            serde_cbor::Value::Array(items.iter().map(json_to_cbor).collect())
        }
        serde_json::Value::Object(map) => serde_cbor::Value::Map(
            map.iter()
                .map(|(k, v)| (serde_cbor::Value::Text(k.clone()), json_to_cbor(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_roundtrip() {
        let value = json!({"exif:FNumber": 4.0, "@context": {"exif": "http://ns.adobe.com/exif/1.0/"}});
        let assertion = MetadataAssertion::new("stds.exif", value.clone());

        let sb = assertion.to_jumbf().unwrap();
        let parsed = MetadataAssertion::from_jumbf(&sb, "stds.exif", None).unwrap();
        assert_eq!(parsed.kind, MetadataKind::Json);
        assert_eq!(parsed.value, value);
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_cbor_content_converted() {
        let cbor = serde_cbor::to_vec(&serde_cbor::Value::Map(
            [(
                serde_cbor::Value::Text("rating".into()),
                serde_cbor::Value::Integer(5),
            )]
            .into_iter()
            .collect(),
        ))
        .unwrap();
        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, "c2pa.metadata");
        sb.push_child(ChildBox::Cbor(cbor));

        let parsed = MetadataAssertion::from_jumbf(&sb, "c2pa.metadata", None).unwrap();
        assert_eq!(parsed.kind, MetadataKind::Cbor);
        assert_eq!(parsed.value, json!({"rating": 5}));
    }

    #[test]
    fn test_prefix_expansion() {
        let assertion = MetadataAssertion::new(
            "stds.exif",
            json!({
                "@context": {"exif": "http://ns.adobe.com/exif/1.0/"},
                "exif:FNumber": 4.0,
                "plain": true
            }),
        );
        let expanded = assertion.expanded();
        assert_eq!(
            expanded.get("http://ns.adobe.com/exif/1.0/FNumber"),
            Some(&json!(4.0))
        );
        assert_eq!(expanded.get("plain"), Some(&json!(true)));
        // unknown prefixes stay as-is
        assert!(expanded.get("exif:FNumber").is_none());
    }

    #[test]
    fn test_missing_content_rejected() {
        let sb = SuperBox::new(JSON_ASSERTION_UUID, "stds.iptc");
        assert!(MetadataAssertion::from_jumbf(&sb, "stds.iptc", None).is_err());
    }
}
