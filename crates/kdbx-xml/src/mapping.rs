//! Element ↔ object mappings for attachment and pool payload nodes.
//!
//! Mappings are structural only. They never touch the binary pool; the
//! document loader hands their output to a [`kdbx_pool::LoadContext`].

use kdbx_pool::{AttachmentReference, BinaryPayload};

use crate::codec::{decode_payload, encode_payload, format_bool, parse_bool};
use crate::element::XmlElement;
use crate::error::{Result, XmlError};

/// Two-way mapping between an element and an object.
pub trait ElementMapping: Sized {
    /// Local name of the element this mapping reads and writes.
    const ELEMENT: &'static str;

    /// Build the object from `element`. `location` names the enclosing owner
    /// for error messages.
    fn from_element(element: &XmlElement, location: &str) -> Result<Self>;

    fn to_element(&self) -> Result<XmlElement>;
}

/// Value side of an attachment node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryValue {
    /// `<Value Ref="n" />`
    Ref(u32),
    /// Legacy `<Value>base64</Value>` carrying the bytes directly.
    Inline(BinaryPayload),
}

/// An attachment node on an entry:
///
/// ```text
/// <Binary>
///     <Key>bash_profile</Key>
///     <Value Ref="0" />
/// </Binary>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRefNode {
    pub filename: String,
    pub value: BinaryValue,
}

impl BinaryRefNode {
    pub fn from_reference(reference: &AttachmentReference) -> Self {
        Self {
            filename: reference.filename().to_string(),
            value: BinaryValue::Ref(reference.pool_index()),
        }
    }
}

impl ElementMapping for BinaryRefNode {
    const ELEMENT: &'static str = "Binary";

    fn from_element(element: &XmlElement, location: &str) -> Result<Self> {
        let filename = element
            .child_text("Key")
            .ok_or_else(|| XmlError::MissingElement {
                element: "Key",
                location: location.to_string(),
            })?;
        let value = element
            .child("Value")
            .ok_or_else(|| XmlError::MissingElement {
                element: "Value",
                location: format!("{location}/{filename}"),
            })?;

        let value = match value.attribute("Ref") {
            Some(raw) => BinaryValue::Ref(raw.trim().parse::<u32>().map_err(|_| {
                XmlError::MalformedIndex {
                    owner: location.to_string(),
                    filename: filename.clone(),
                    value: raw.to_string(),
                }
            })?),
            None => {
                let compressed = value.attribute("Compressed").is_some_and(parse_bool);
                let bytes = decode_payload(&value.text(), compressed).map_err(|source| {
                    XmlError::InvalidPayload {
                        location: format!("{location}/{filename}"),
                        source,
                    }
                })?;
                BinaryValue::Inline(BinaryPayload::new(bytes))
            }
        };
        Ok(Self { filename, value })
    }

    fn to_element(&self) -> Result<XmlElement> {
        let value = match &self.value {
            BinaryValue::Ref(index) => {
                XmlElement::new("Value").with_attribute("Ref", index.to_string())
            }
            BinaryValue::Inline(payload) => {
                XmlElement::new("Value").with_text(encode_payload(payload.bytes(), false)?)
            }
        };
        Ok(XmlElement::new(Self::ELEMENT)
            .with_child(XmlElement::new("Key").with_text(self.filename.as_str()))
            .with_child(value))
    }
}

/// A payload declaration inside `<Meta><Binaries>`:
///
/// ```text
/// <Binary ID="0" Compressed="True">H4sIAAAAAAAA...</Binary>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadNode {
    pub index: u32,
    pub compressed: bool,
    pub payload: BinaryPayload,
}

impl ElementMapping for PayloadNode {
    const ELEMENT: &'static str = "Binary";

    fn from_element(element: &XmlElement, location: &str) -> Result<Self> {
        let raw = element
            .attribute("ID")
            .ok_or_else(|| XmlError::MissingAttribute {
                attribute: "ID",
                element: Self::ELEMENT,
                location: location.to_string(),
            })?;
        let index = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| XmlError::MalformedPoolIndex {
                value: raw.to_string(),
            })?;
        let compressed = element.attribute("Compressed").is_some_and(parse_bool);
        let bytes = decode_payload(&element.text(), compressed).map_err(|source| {
            XmlError::InvalidPayload {
                location: format!("{location}[ID={index}]"),
                source,
            }
        })?;
        Ok(Self {
            index,
            compressed,
            payload: BinaryPayload::new(bytes),
        })
    }

    fn to_element(&self) -> Result<XmlElement> {
        let mut element = XmlElement::new(Self::ELEMENT).with_attribute("ID", self.index.to_string());
        if self.compressed {
            element.set_attribute("Compressed", format_bool(true));
        }
        Ok(element.with_text(encode_payload(self.payload.bytes(), self.compressed)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::parse_document;

    #[test]
    fn reads_reference_node() {
        let element = parse_document(
            br#"<Binary><Key>bash_profile</Key><Value Ref="0" /></Binary>"#,
        )
        .unwrap();
        let node = BinaryRefNode::from_element(&element, "Root/Server").unwrap();
        assert_eq!(node.filename, "bash_profile");
        assert_eq!(node.value, BinaryValue::Ref(0));
    }

    #[test]
    fn malformed_reference_names_owner_and_file() {
        let element =
            parse_document(br#"<Binary><Key>id_rsa</Key><Value Ref="-1" /></Binary>"#).unwrap();
        match BinaryRefNode::from_element(&element, "Root/Server").unwrap_err() {
            XmlError::MalformedIndex {
                owner,
                filename,
                value,
            } => {
                assert_eq!(owner, "Root/Server");
                assert_eq!(filename, "id_rsa");
                assert_eq!(value, "-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_key_is_structural() {
        let element = parse_document(br#"<Binary><Value Ref="0" /></Binary>"#).unwrap();
        let error = BinaryRefNode::from_element(&element, "Root/Server").unwrap_err();
        assert!(matches!(error, XmlError::MissingElement { element: "Key", .. }));
    }

    #[test]
    fn reads_inline_value() {
        let element =
            parse_document(b"<Binary><Key>note.txt</Key><Value>SGVsbG8=</Value></Binary>").unwrap();
        let node = BinaryRefNode::from_element(&element, "Root/Server").unwrap();
        assert_eq!(
            node.value,
            BinaryValue::Inline(BinaryPayload::new(b"Hello".to_vec()))
        );
        // Inline nodes write back inline.
        let written = node.to_element().unwrap();
        assert_eq!(written.child_text("Value").as_deref(), Some("SGVsbG8="));
    }

    #[test]
    fn writes_reference_node() {
        let node = BinaryRefNode {
            filename: "bash_profile".into(),
            value: BinaryValue::Ref(2),
        };
        let element = node.to_element().unwrap();
        assert_eq!(element.child_text("Key").as_deref(), Some("bash_profile"));
        assert_eq!(element.child("Value").unwrap().attribute("Ref"), Some("2"));
    }

    #[test]
    fn payload_node_round_trip() {
        let node = PayloadNode {
            index: 5,
            compressed: true,
            payload: BinaryPayload::new(b"ssh-ed25519 AAAAC3Nza".to_vec()),
        };
        let element = node.to_element().unwrap();
        assert_eq!(element.attribute("Compressed"), Some("True"));
        assert_eq!(PayloadNode::from_element(&element, "Meta/Binaries").unwrap(), node);
    }

    #[test]
    fn payload_node_requires_id() {
        let element = parse_document(b"<Binary>SGVsbG8=</Binary>").unwrap();
        assert!(matches!(
            PayloadNode::from_element(&element, "Meta/Binaries").unwrap_err(),
            XmlError::MissingAttribute { attribute: "ID", .. }
        ));
    }

    #[test]
    fn payload_node_rejects_corrupt_content() {
        let element = parse_document(br#"<Binary ID="1" Compressed="True">SGVsbG8=</Binary>"#)
            .unwrap();
        assert!(matches!(
            PayloadNode::from_element(&element, "Meta/Binaries").unwrap_err(),
            XmlError::InvalidPayload { .. }
        ));
    }
}
