//! Owned XML element trees.
//!
//! Extension data, waypoints and routes are carried through a merge without being
//! interpreted. They are stored as [`XmlNode`] trees that own all of their content, so
//! copying a node into another document never shares structure with the source.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ParseError, WriteError};

/// A namespaced element with attributes, text and child elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    /// Qualified name as written, e.g. `gpxtpx:hr`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Trimmed direct text content, if any.
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A leaf element `<prefix:name>text</prefix:name>`.
    pub fn leaf(prefix: &str, name: &str, text: impl Into<String>) -> Self {
        Self {
            name: format!("{prefix}:{name}"),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    /// Produce an independent copy of this subtree.
    pub fn deep_clone(&self) -> XmlNode {
        XmlNode {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            text: self.text.clone(),
            children: clone_nodes(&self.children),
        }
    }

    /// Rewrite element and attribute prefixes by `(from, to)` pairs. A subtree that
    /// redeclares `from` is left as is.
    pub fn rename_prefixes(&mut self, renames: &[(String, String)]) {
        let active: Vec<(String, String)> = renames
            .iter()
            .filter(|(from, _)| self.attribute(&format!("xmlns:{from}")).is_none())
            .cloned()
            .collect();
        if active.is_empty() {
            return;
        }

        rename_qualified(&mut self.name, &active);
        for (key, _) in &mut self.attributes {
            if !key.starts_with("xmlns:") {
                rename_qualified(key, &active);
            }
        }
        for child in &mut self.children {
            child.rename_prefixes(&active);
        }
    }
}

fn rename_qualified(name: &mut String, renames: &[(String, String)]) {
    let Some((prefix, local)) = name.split_once(':') else {
        return;
    };
    if let Some((_, to)) = renames.iter().find(|(from, _)| from == prefix) {
        let renamed = format!("{to}:{local}");
        *name = renamed;
    }
}

/// Deep-copy a sequence of nodes, e.g. a point's extensions.
pub fn clone_nodes(nodes: &[XmlNode]) -> Vec<XmlNode> {
    nodes.iter().map(XmlNode::deep_clone).collect()
}

/// Build a node from a start tag and read its content up to the matching end tag.
pub(crate) fn read_node<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
) -> Result<XmlNode, ParseError> {
    let mut node = node_from_start(start)?;
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => node.children.push(read_node(&e, reader)?),
            Event::Empty(e) => node.children.push(node_from_start(&e)?),
            Event::Text(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::GeneralRef(e) => push_entity(&mut text, e.as_ref(), e.resolve_char_ref()),
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::UnexpectedEof(node.name)),
            _ => {}
        }
    }

    let trimmed = text.trim();
    if !trimmed.is_empty() {
        node.text = Some(trimmed.to_string());
    }
    Ok(node)
}

/// Build a childless node from a start or empty tag.
pub(crate) fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode, ParseError> {
    let name = std::str::from_utf8(start.name().0)?.to_string();
    let mut node = XmlNode::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        let value = quick_xml::escape::unescape(raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        node.attributes.push((key, value));
    }
    Ok(node)
}

/// Append the text an entity reference stands for.
pub(crate) fn push_entity<E>(text: &mut String, name: &[u8], char_ref: Result<Option<char>, E>) {
    if let Ok(Some(ch)) = char_ref {
        text.push(ch);
        return;
    }
    match name {
        b"amp" => text.push('&'),
        b"lt" => text.push('<'),
        b"gt" => text.push('>'),
        b"quot" => text.push('"'),
        b"apos" => text.push('\''),
        _ => {}
    }
}

/// Serialize a node and its subtree.
pub(crate) fn write_node<W: Write>(writer: &mut Writer<W>, node: &XmlNode) -> Result<(), WriteError> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.text.is_none() && node.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(text) = &node.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    Ok(())
}
