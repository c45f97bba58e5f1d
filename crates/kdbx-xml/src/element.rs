//! Owned element tree read and written with quick-xml.
//!
//! Only what the document layer needs: element names, attributes in source
//! order, text and child elements. Comments, processing instructions, the
//! DOCTYPE and the declaration are not kept, and CDATA sections become text.
//! Whitespace-only text inside an element that also has child elements is
//! treated as formatting and dropped.

use std::io::Write;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, XmlError};

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text));
        }
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(name, _)| *name == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a XmlElement> + use<'a, 'n> {
        self.elements().filter(move |element| element.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) if element.name == name => Some(element),
            _ => None,
        })
    }

    /// Position of the first child element called `name` within `children`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(element) if element.name == name))
    }

    /// Remove every child element called `name`, returning them with the
    /// position the first one occupied.
    pub fn take_children(&mut self, name: &str) -> (Option<usize>, Vec<XmlElement>) {
        let first = self.position_of(name);
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in std::mem::take(&mut self.children) {
            match node {
                XmlNode::Element(element) if element.name == name => taken.push(element),
                other => kept.push(other),
            }
        }
        self.children = kept;
        (first, taken)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Text of the child element called `name`.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(XmlElement::text)
    }

    /// Follow a path of child positions (indices into `children`).
    pub fn descend_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut current = self;
        for &position in path {
            current = match current.children.get_mut(position) {
                Some(XmlNode::Element(element)) => element,
                _ => return None,
            };
        }
        Some(current)
    }

    fn close(&mut self) {
        if self.elements().next().is_some() {
            self.children.retain(|node| match node {
                XmlNode::Text(text) => !text.trim().is_empty(),
                XmlNode::Element(_) => true,
            });
        }
    }
}

/// Parse a complete document and return its root element.
pub fn parse_document(xml: &[u8]) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut text = String::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                flush_text(&mut stack, &mut text);
                stack.push(open_element(&start, &reader)?);
            }
            Event::Empty(start) => {
                flush_text(&mut stack, &mut text);
                let element = open_element(&start, &reader)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                flush_text(&mut stack, &mut text);
                let mut element = stack.pop().ok_or_else(|| XmlError::Syntax {
                    message: "unexpected closing tag".to_string(),
                })?;
                element.close();
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(content) => {
                let decoded = content.decode().map_err(quick_xml::Error::from)?;
                text.push_str(&decoded);
            }
            Event::CData(content) => {
                text.push_str(&String::from_utf8_lossy(&content.into_inner()));
            }
            Event::GeneralRef(reference) => {
                let name = reference.decode().map_err(quick_xml::Error::from)?;
                text.push_str(&resolve_reference(&name)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Syntax {
            message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
        });
    }
    root.ok_or_else(|| XmlError::Syntax {
        message: "document has no root element".to_string(),
    })
}

/// Serialize `root` as a UTF-8 document with tab indentation.
pub fn write_document(root: &XmlElement) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
    write_element(&mut writer, root)?;
    Ok(writer.into_inner())
}

fn write_element<W: Write>(writer: &mut Writer<W>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(writer, child)?,
            XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

fn open_element(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<XmlElement> {
    let mut element = XmlElement::new(utf8(start.local_name().as_ref())?);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = utf8(attribute.key.as_ref())?;
        let value = attribute
            .decode_and_unescape_value(reader.decoder())
            .map_err(quick_xml::Error::from)?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn flush_text(stack: &mut [XmlElement], text: &mut String) {
    if text.is_empty() {
        return;
    }
    let content = std::mem::take(text);
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Text(content));
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(XmlError::Syntax {
                message: format!("second root element <{}>", element.name),
            });
        }
    }
    Ok(())
}

fn resolve_reference(name: &str) -> Result<String> {
    if let Some(code) = name.strip_prefix('#') {
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        return parsed
            .and_then(char::from_u32)
            .map(String::from)
            .ok_or_else(|| XmlError::Syntax {
                message: format!("invalid character reference &{name};"),
            });
    }
    resolve_predefined_entity(name)
        .map(str::to_string)
        .ok_or_else(|| XmlError::Syntax {
            message: format!("unknown entity &{name};"),
        })
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|error| XmlError::Syntax {
        message: error.to_string(),
    })
}
