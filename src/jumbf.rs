//! JUMBF container codec
//!
//! Typed super/description/content boxes as used by C2PA manifests. The
//! engine consumes this codec through its serializer, deserializer and
//! measurer only; box semantics live in the component types.
//!
//! Every parsed [`SuperBox`] retains its exact source bytes, so re-emitting
//! an unchanged box is byte-exact regardless of how its fields would
//! otherwise serialize.

use std::io::{Cursor, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Well-known JUMBF labels
pub mod labels {
    /// Label of the outermost manifest store box
    pub const MANIFEST_STORE: &str = "c2pa";
    /// Label of the claim box inside a manifest
    pub const CLAIM: &str = "c2pa.claim";
    /// Label of a V2 claim box
    pub const CLAIM_V2: &str = "c2pa.claim.v2";
    /// Label of the claim signature box
    pub const SIGNATURE: &str = "c2pa.signature";
    /// Label of the assertion store box
    pub const ASSERTION_STORE: &str = "c2pa.assertions";
}

const fn c2pa_uuid(tag: [u8; 4]) -> [u8; 16] {
    [
        tag[0], tag[1], tag[2], tag[3], 0x00, 0x11, 0x00, 0x10, 0x80, 0x00, 0x00, 0xAA, 0x00,
        0x38, 0x9B, 0x71,
    ]
}

/// Box type UUID of the outermost manifest store superbox
pub const MANIFEST_STORE_UUID: [u8; 16] = c2pa_uuid(*b"c2pa");
/// Box type UUID of a standard manifest
pub const MANIFEST_UUID: [u8; 16] = c2pa_uuid(*b"c2ma");
/// Box type UUID of an update manifest
pub const UPDATE_MANIFEST_UUID: [u8; 16] = c2pa_uuid(*b"c2um");
/// Box type UUID of an assertion store
pub const ASSERTION_STORE_UUID: [u8; 16] = c2pa_uuid(*b"c2as");
/// Box type UUID of a claim
pub const CLAIM_UUID: [u8; 16] = c2pa_uuid(*b"c2cl");
/// Box type UUID of a claim signature
pub const SIGNATURE_UUID: [u8; 16] = c2pa_uuid(*b"c2cs");
/// Box type UUID of a CBOR assertion
pub const CBOR_ASSERTION_UUID: [u8; 16] = c2pa_uuid(*b"cbor");
/// Box type UUID of a JSON assertion
pub const JSON_ASSERTION_UUID: [u8; 16] = c2pa_uuid(*b"json");
/// Box type UUID of an ingredient assertion carrying embedded data
pub const INGREDIENT_UUID: [u8; 16] = c2pa_uuid(*b"cain");
/// Box type UUID of an embedded-file assertion (thumbnails)
pub const EMBEDDED_FILE_UUID: [u8; 16] = [
    0x40, 0xCB, 0x0C, 0x32, 0xBB, 0x8A, 0x48, 0x9D, 0xA7, 0x0B, 0x2A, 0xD6, 0xF4, 0x7F, 0x43,
    0x69,
];

// description box toggles
const TOGGLE_REQUESTABLE: u8 = 0x01;
const TOGGLE_LABEL: u8 = 0x02;
const TOGGLE_ID: u8 = 0x04;
const TOGGLE_SIGNATURE: u8 = 0x08;

// embedded file description toggles
const TOGGLE_FILE_NAME: u8 = 0x01;

/// JUMBF description box (`jumd`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionBox {
    /// 16-byte content type of the enclosing superbox
    pub uuid: [u8; 16],

    /// Box label; C2PA components are always labeled
    pub label: Option<String>,

    /// Optional numeric id
    pub id: Option<u32>,

    /// Optional SHA-256 of the superbox payload
    pub hash: Option<[u8; 32]>,

    /// Whether the box is requestable through a URI
    pub requestable: bool,
}

impl DescriptionBox {
    /// A requestable, labeled description box
    pub fn new(uuid: [u8; 16], label: impl Into<String>) -> Self {
        Self {
            uuid,
            label: Some(label.into()),
            id: None,
            hash: None,
            requestable: true,
        }
    }

    fn parse(payload: &[u8], offset: u64) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let mut uuid = [0u8; 16];
        std::io::Read::read_exact(&mut cursor, &mut uuid).map_err(|_| Error::InvalidBox {
            offset,
            reason: "description box too short for uuid".to_string(),
        })?;
        let toggles = cursor.read_u8().map_err(|_| Error::InvalidBox {
            offset,
            reason: "description box missing toggles".to_string(),
        })?;

        let label = if toggles & TOGGLE_LABEL != 0 {
            Some(read_cstring(&mut cursor, offset)?)
        } else {
            None
        };
        let id = if toggles & TOGGLE_ID != 0 {
            Some(cursor.read_u32::<BigEndian>().map_err(|_| Error::InvalidBox {
                offset,
                reason: "description box missing id".to_string(),
            })?)
        } else {
            None
        };
        let hash = if toggles & TOGGLE_SIGNATURE != 0 {
            let mut digest = [0u8; 32];
            std::io::Read::read_exact(&mut cursor, &mut digest).map_err(|_| Error::InvalidBox {
                offset,
                reason: "description box missing signature digest".to_string(),
            })?;
            Some(digest)
        } else {
            None
        };

        Ok(Self {
            uuid,
            label,
            id,
            hash,
            requestable: toggles & TOGGLE_REQUESTABLE != 0,
        })
    }

    fn serialize_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut payload = Vec::with_capacity(32);
        payload.extend_from_slice(&self.uuid);

        let mut toggles = 0u8;
        if self.requestable {
            toggles |= TOGGLE_REQUESTABLE;
        }
        if self.label.is_some() {
            toggles |= TOGGLE_LABEL;
        }
        if self.id.is_some() {
            toggles |= TOGGLE_ID;
        }
        if self.hash.is_some() {
            toggles |= TOGGLE_SIGNATURE;
        }
        payload.push(toggles);

        if let Some(label) = &self.label {
            payload.extend_from_slice(label.as_bytes());
            payload.push(0);
        }
        if let Some(id) = self.id {
            payload.write_u32::<BigEndian>(id)?;
        }
        if let Some(hash) = &self.hash {
            payload.extend_from_slice(hash);
        }

        write_box(out, *b"jumd", &payload)
    }
}

/// A box nested inside a [`SuperBox`]
#[derive(Debug, Clone, PartialEq)]
pub enum ChildBox {
    /// Nested superbox
    SuperBox(SuperBox),

    /// CBOR content box (`cbor`)
    Cbor(Vec<u8>),

    /// JSON content box (`json`)
    Json(Vec<u8>),

    /// Embedded-file description box (`bfdb`)
    EmbeddedFileDescription {
        media_type: String,
        file_name: Option<String>,
    },

    /// Binary data box (`bidb`)
    BinaryData(Vec<u8>),

    /// Codestream content box (`jp2c`)
    Codestream(Vec<u8>),

    /// Any other box, preserved verbatim
    Unknown { box_type: [u8; 4], data: Vec<u8> },
}

impl ChildBox {
    fn serialize_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            ChildBox::SuperBox(sb) => {
                out.extend_from_slice(&sb.to_vec()?);
                Ok(())
            }
            ChildBox::Cbor(data) => write_box(out, *b"cbor", data),
            ChildBox::Json(data) => write_box(out, *b"json", data),
            ChildBox::EmbeddedFileDescription {
                media_type,
                file_name,
            } => {
                let mut payload = Vec::with_capacity(media_type.len() + 2);
                let mut toggles = 0u8;
                if file_name.is_some() {
                    toggles |= TOGGLE_FILE_NAME;
                }
                payload.push(toggles);
                payload.extend_from_slice(media_type.as_bytes());
                payload.push(0);
                if let Some(name) = file_name {
                    payload.extend_from_slice(name.as_bytes());
                    payload.push(0);
                }
                write_box(out, *b"bfdb", &payload)
            }
            ChildBox::BinaryData(data) => write_box(out, *b"bidb", data),
            ChildBox::Codestream(data) => write_box(out, *b"jp2c", data),
            ChildBox::Unknown { box_type, data } => write_box(out, *box_type, data),
        }
    }
}

/// JUMBF superbox (`jumb`): a description box plus ordered child boxes
#[derive(Debug, Clone, PartialEq)]
pub struct SuperBox {
    pub description: DescriptionBox,
    pub children: Vec<ChildBox>,
    raw: Option<Vec<u8>>,
}

impl SuperBox {
    /// Create an empty superbox with a requestable, labeled description
    pub fn new(uuid: [u8; 16], label: impl Into<String>) -> Self {
        Self {
            description: DescriptionBox::new(uuid, label),
            children: Vec::new(),
            raw: None,
        }
    }

    /// Parse a superbox spanning the entire slice
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let (sb, consumed) = Self::parse_at(data, 0)?;
        if consumed != data.len() as u64 {
            return Err(Error::InvalidBox {
                offset: consumed,
                reason: format!("{} trailing bytes after superbox", data.len() as u64 - consumed),
            });
        }
        Ok(sb)
    }

    /// Parse one superbox starting at `offset`, returning it and the number
    /// of bytes consumed
    fn parse_at(data: &[u8], offset: u64) -> Result<(Self, u64)> {
        let (box_type, payload, consumed) = read_box(data, offset)?;
        if box_type != b"jumb" {
            return Err(Error::InvalidBox {
                offset,
                reason: format!("expected jumb box, found {}", fourcc(box_type)),
            });
        }

        // first child must be the description box
        let (first_type, first_payload, first_len) = read_box(payload, offset + 8)?;
        if first_type != b"jumd" {
            return Err(Error::InvalidBox {
                offset: offset + 8,
                reason: "superbox does not start with a description box".to_string(),
            });
        }
        let description = DescriptionBox::parse(first_payload, offset + 8)?;

        let mut children = Vec::new();
        let mut pos = first_len;
        while pos < payload.len() as u64 {
            let child_offset = offset + 8 + pos;
            let (child_type, child_payload, child_len) = read_box(&payload[pos as usize..], child_offset)?;
            let child = match child_type {
                b"jumb" => {
                    let (sb, _) = Self::parse_at(&payload[pos as usize..], child_offset)?;
                    ChildBox::SuperBox(sb)
                }
                b"cbor" => ChildBox::Cbor(child_payload.to_vec()),
                b"json" => ChildBox::Json(child_payload.to_vec()),
                b"bidb" => ChildBox::BinaryData(child_payload.to_vec()),
                b"jp2c" => ChildBox::Codestream(child_payload.to_vec()),
                b"bfdb" => {
                    let mut cursor = Cursor::new(child_payload);
                    let toggles = cursor.read_u8().map_err(|_| Error::InvalidBox {
                        offset: child_offset,
                        reason: "embedded file description missing toggles".to_string(),
                    })?;
                    let media_type = read_cstring(&mut cursor, child_offset)?;
                    let file_name = if toggles & TOGGLE_FILE_NAME != 0 {
                        Some(read_cstring(&mut cursor, child_offset)?)
                    } else {
                        None
                    };
                    ChildBox::EmbeddedFileDescription {
                        media_type,
                        file_name,
                    }
                }
                other => ChildBox::Unknown {
                    box_type: *other,
                    data: child_payload.to_vec(),
                },
            };
            children.push(child);
            pos += child_len;
        }

        let raw = data[..consumed as usize].to_vec();
        Ok((
            Self {
                description,
                children,
                raw: Some(raw),
            },
            consumed,
        ))
    }

    /// Exact bytes: source bytes when unchanged, fresh serialization otherwise
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => self.serialize(),
        }
    }

    /// Serialize from the in-memory representation, ignoring cached bytes
    /// at this level (unchanged children still emit their own source bytes)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        self.description.serialize_into(&mut payload)?;
        for child in &self.children {
            child.serialize_into(&mut payload)?;
        }

        let mut out = Vec::with_capacity(payload.len() + 8);
        write_box(&mut out, *b"jumb", &payload)?;
        Ok(out)
    }

    /// Serialized size in bytes
    pub fn measured_size(&self) -> Result<u64> {
        Ok(self.to_vec()?.len() as u64)
    }

    /// The retained source bytes, if the box is unmutated
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Drop the cached source bytes after a mutation
    pub fn clear_raw(&mut self) {
        self.raw = None;
    }

    /// The description box label
    pub fn label(&self) -> Option<&str> {
        self.description.label.as_deref()
    }

    /// Append a child box (invalidates cached source bytes)
    pub fn push_child(&mut self, child: ChildBox) {
        self.raw = None;
        self.children.push(child);
    }

    /// Iterate nested superboxes in order
    pub fn child_superboxes(&self) -> impl Iterator<Item = &SuperBox> {
        self.children.iter().filter_map(|c| match c {
            ChildBox::SuperBox(sb) => Some(sb),
            _ => None,
        })
    }

    /// Find a nested superbox by its description label
    pub fn find_child(&self, label: &str) -> Option<&SuperBox> {
        self.child_superboxes().find(|sb| sb.label() == Some(label))
    }

    /// First CBOR content payload, if any
    pub fn cbor_content(&self) -> Option<&[u8]> {
        self.children.iter().find_map(|c| match c {
            ChildBox::Cbor(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// First JSON content payload, if any
    pub fn json_content(&self) -> Option<&[u8]> {
        self.children.iter().find_map(|c| match c {
            ChildBox::Json(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Embedded-file content: media type, optional file name, data bytes
    pub fn embedded_file_content(&self) -> Option<(&str, Option<&str>, &[u8])> {
        let mut media_type = None;
        let mut file_name = None;
        let mut data = None;
        for child in &self.children {
            match child {
                ChildBox::EmbeddedFileDescription {
                    media_type: mt,
                    file_name: fname,
                } => {
                    media_type = Some(mt.as_str());
                    file_name = fname.as_deref();
                }
                ChildBox::BinaryData(bytes) => data = Some(bytes.as_slice()),
                _ => {}
            }
        }
        Some((media_type?, file_name, data?))
    }
}

fn fourcc(bytes: &[u8; 4]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

/// Read one box at the start of `data`; returns (type, payload, total size)
fn read_box(data: &[u8], offset: u64) -> Result<(&[u8; 4], &[u8], u64)> {
    if data.len() < 8 {
        return Err(Error::InvalidBox {
            offset,
            reason: "truncated box header".to_string(),
        });
    }
    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as u64;
    let box_type: &[u8; 4] = data[4..8].try_into().unwrap();

    let (header_len, total) = match size {
        0 => (8u64, data.len() as u64), // box extends to the end of the blob
        1 => {
            if data.len() < 16 {
                return Err(Error::InvalidBox {
                    offset,
                    reason: "truncated large box header".to_string(),
                });
            }
            let large = u64::from_be_bytes(data[8..16].try_into().unwrap());
            (16u64, large)
        }
        n => (8u64, n),
    };

    if total < header_len || total > data.len() as u64 {
        return Err(Error::InvalidBox {
            offset,
            reason: format!("box size {total} exceeds available {} bytes", data.len()),
        });
    }

    Ok((
        box_type,
        &data[header_len as usize..total as usize],
        total,
    ))
}

/// Write one box (small 32-bit size form)
fn write_box(out: &mut Vec<u8>, box_type: [u8; 4], payload: &[u8]) -> Result<()> {
    let total = payload.len() as u64 + 8;
    if total > u32::MAX as u64 {
        return Err(Error::InvalidBox {
            offset: 0,
            reason: "box payload exceeds 32-bit size field".to_string(),
        });
    }
    out.write_u32::<BigEndian>(total as u32)?;
    out.write_all(&box_type)?;
    out.write_all(payload)?;
    Ok(())
}

fn read_cstring(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        match cursor.read_u8() {
            Ok(0) => break,
            Ok(b) => bytes.push(b),
            Err(_) => {
                return Err(Error::InvalidBox {
                    offset,
                    reason: "unterminated string".to_string(),
                })
            }
        }
    }
    String::from_utf8(bytes).map_err(|_| Error::InvalidBox {
        offset,
        reason: "string is not valid UTF-8".to_string(),
    })
}
