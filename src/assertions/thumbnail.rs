//! Thumbnail assertions: embedded preview images
//!
//! Stored as embedded-file boxes (a description box naming the media type
//! plus a binary data box). The label carries the flavor: claim thumbnails
//! use `c2pa.thumbnail.claim.<ext>`, ingredient thumbnails
//! `c2pa.thumbnail.ingredient[.<ext>]`.

use crate::{
    error::{Error, Result},
    jumbf::{ChildBox, SuperBox, EMBEDDED_FILE_UUID},
};

use super::labels;

/// An embedded preview image
#[derive(Debug, Clone)]
pub struct ThumbnailAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,
    pub media_type: String,
    pub file_name: Option<String>,
    pub data: Vec<u8>,
    pub(crate) source_box: Option<SuperBox>,
}

impl ThumbnailAssertion {
    /// A claim thumbnail with the given format extension (e.g. "jpeg")
    pub fn new_claim_thumbnail(extension: &str, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            label: format!("{}{extension}", labels::CLAIM_THUMBNAIL_PREFIX),
            label_suffix: None,
            media_type: media_type.into(),
            file_name: None,
            data,
            source_box: None,
        }
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        let (media_type, file_name, data) =
            sb.embedded_file_content().ok_or_else(|| Error::AssertionInvalid {
                label: base_label.to_string(),
                reason: "thumbnail assertion has no embedded file".to_string(),
            })?;
        Ok(Self {
            label: base_label.to_string(),
            label_suffix: suffix,
            media_type: media_type.to_string(),
            file_name: file_name.map(str::to_string),
            data: data.to_vec(),
            source_box: Some(sb.clone()),
        })
    }

    /// The full wire label
    pub fn full_label(&self) -> String {
        super::full_label(&self.label, self.label_suffix)
    }

    /// Whether this is a claim thumbnail
    pub fn is_claim_thumbnail(&self) -> bool {
        self.label.starts_with(labels::CLAIM_THUMBNAIL_PREFIX)
    }

    /// Whether this is an ingredient thumbnail
    pub fn is_ingredient_thumbnail(&self) -> bool {
        self.label.starts_with(labels::INGREDIENT_THUMBNAIL_PREFIX)
    }

    /// Serialize into the assertion superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }
        let mut sb = SuperBox::new(EMBEDDED_FILE_UUID, self.full_label());
        sb.push_child(ChildBox::EmbeddedFileDescription {
            media_type: self.media_type.clone(),
            file_name: self.file_name.clone(),
        });
        sb.push_child(ChildBox::BinaryData(self.data.clone()));
        Ok(sb)
    }
}
