//! Opaque passthrough for unrecognized assertion types
//!
//! Unknown assertions keep their source box verbatim and refuse to build a
//! fresh serialization, so a store containing them can only be re-emitted
//! byte-exact.

use crate::{
    error::{Error, Result},
    jumbf::SuperBox,
};

/// An assertion of an unrecognized type, preserved byte-for-byte
#[derive(Debug, Clone)]
pub struct UnknownAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,
    source_box: SuperBox,
}

impl UnknownAssertion {
    /// Wrap an unrecognized assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        if sb.children.is_empty() {
            return Err(Error::AssertionInvalid {
                label: base_label.to_string(),
                reason: "assertion has no content box".to_string(),
            });
        }
        Ok(Self {
            label: base_label.to_string(),
            label_suffix: suffix,
            source_box: sb.clone(),
        })
    }

    /// The full wire label
    pub fn full_label(&self) -> String {
        super::full_label(&self.label, self.label_suffix)
    }

    /// The content-box type UUID
    pub fn uuid(&self) -> [u8; 16] {
        self.source_box.description.uuid
    }

    /// The preserved superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if self.source_box.raw().is_none() {
            return Err(Error::OpaqueAssertion(self.full_label()));
        }
        Ok(self.source_box.clone())
    }
}
