//! The Xml/Xpath facade (spec §4.1, component C1).
//!
//! A process holds a single mutable DOM arena per parsed document. The arena is a flat
//! `Vec<Node>` addressed by [`NodeId`] rather than a pointer graph, so the "single
//! process-wide mutex around the XML library" design note (§5, §9) reduces to locking
//! one [`Dom`] for the duration of a handler — no interior `Rc<RefCell<_>>` graph to
//! poison or leak.

pub mod c14n;
pub mod querydashp;
pub mod schema;
pub mod xpath;

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName as QxName;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::common::error::HubError;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element {
        /// Qualified name, e.g. `"samlp:AuthnRequest"`.
        tag: String,
        attrs: Vec<Attr>,
        children: Vec<NodeId>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: Option<NodeId>,
}

/// A parsed, mutable XML document. Namespace prefixes are carried verbatim as part of
/// element/attribute names (no separate namespace-URI resolution table) — sufficient
/// for the fixed, well-known prefix set the hub emits and expects (`samlp:`, `saml:`,
/// `ds:`, `md:`, `wayf:`, ...), matching how the source system's own templates are
/// written.
#[derive(Debug, Clone, Default)]
pub struct Dom {
    nodes: Vec<Node>,
    pub root: Option<NodeId>,
    /// Declared `prefix -> namespace URI` bindings, used by `queryDashP` when it must
    /// create a new element so the new node ends up in the right registered namespace.
    pub namespaces: BTreeMap<String, String>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn register_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.insert(prefix.into(), uri.into());
    }

    pub fn tag_of(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { attrs, .. } => {
                attrs.iter().find(|a| a.name == name).map(|a| a.value.as_str())
            }
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.node_mut(id).data {
            if let Some(a) = attrs.iter_mut().find(|a| a.name == name) {
                a.value = value.to_string();
            } else {
                attrs.push(Attr {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).data {
            NodeData::Element { children, .. } => children,
            NodeData::Text(_) => &[],
        }
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| matches!(self.node(*c).data, NodeData::Element { .. }))
            .collect()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.node(id).data {
            NodeData::Text(t) => out.push_str(t),
            NodeData::Element { children, .. } => {
                for c in children.clone() {
                    self.collect_text(c, out);
                }
            }
        }
    }

    pub fn create_element(&mut self, parent: Option<NodeId>, tag: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            data: NodeData::Element {
                tag: tag.to_string(),
                attrs: Vec::new(),
                children: Vec::new(),
            },
            parent,
        });
        if let Some(p) = parent {
            if let NodeData::Element { children, .. } = &mut self.node_mut(p).data {
                children.push(id);
            }
        }
        id
    }

    /// Inserts `child` into `parent`'s child list at `index`, or at the end if `index`
    /// is `None` or out of range. Used by `queryDashP`'s `[0]` (append) semantics.
    pub fn insert_child_at(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if let NodeData::Element { children, .. } = &mut self.node_mut(parent).data {
            let idx = index.map(|i| i.min(children.len())).unwrap_or(children.len());
            children.insert(idx, child);
        }
    }

    pub fn create_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            data: NodeData::Text(text.to_string()),
            parent: Some(parent),
        });
        if let NodeData::Element { children, .. } = &mut self.node_mut(parent).data {
            children.push(id);
        }
        id
    }

    /// Sets the single text-node value of `id`, replacing any existing text children
    /// (queryDashP assigns the final path value this way).
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let NodeData::Element { children, .. } = &mut self.node_mut(id).data {
            children.retain(|c| !matches!(self.nodes[*c].data, NodeData::Text(_)));
        }
        self.create_text(id, text);
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let NodeData::Element { children, .. } = &mut self.node_mut(parent).data {
            children.retain(|c| *c != child);
        }
    }

    /// Deep-copies the subtree rooted at `id` (optionally truncated to `depth` levels,
    /// `None` meaning unlimited) and returns the new, unattached root id.
    pub fn copy_node(&mut self, id: NodeId, depth: Option<usize>) -> NodeId {
        self.copy_node_inner(id, depth, None)
    }

    fn copy_node_inner(&mut self, id: NodeId, depth: Option<usize>, parent: Option<NodeId>) -> NodeId {
        match self.node(id).data.clone() {
            NodeData::Text(t) => {
                let new_id = self.nodes.len();
                self.nodes.push(Node {
                    data: NodeData::Text(t),
                    parent,
                });
                new_id
            }
            NodeData::Element { tag, attrs, children } => {
                let new_id = self.nodes.len();
                self.nodes.push(Node {
                    data: NodeData::Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    },
                    parent,
                });
                let next_depth = depth.map(|d| d.saturating_sub(1));
                if depth != Some(0) {
                    for c in children {
                        let new_child = self.copy_node_inner(c, next_depth, Some(new_id));
                        if let NodeData::Element { children, .. } = &mut self.node_mut(new_id).data {
                            children.push(new_child);
                        }
                    }
                }
                new_id
            }
        }
    }
}

/// Parses a well-formed XML document into a [`Dom`]. Comments and processing
/// instructions are dropped (the hub never signs or reads them).
pub fn parse(bytes: &[u8]) -> Result<Dom, HubError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut dom = Dom::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let parent = stack.last().copied();
                let id = push_element(&mut dom, parent, &e)?;
                stack.push(id);
            }
            Ok(Event::Empty(e)) => {
                let parent = stack.last().copied();
                push_element(&mut dom, parent, &e)?;
            }
            Ok(Event::End(_)) => {
                let id = stack.pop();
                if stack.is_empty() {
                    dom.root = id;
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(&parent) = stack.last() {
                    let text = t
                        .unescape()
                        .map_err(|e| HubError::malformed(format!("xml text decode: {e}")))?
                        .into_owned();
                    if !text.trim().is_empty() {
                        dom.create_text(parent, &text);
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(&parent) = stack.last() {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    dom.create_text(parent, &text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(HubError::malformed(format!("xml parse error: {e}"))),
        }
        buf.clear();
    }

    if dom.root.is_none() {
        return Err(HubError::malformed("xml document has no root element"));
    }

    Ok(dom)
}

fn push_element(dom: &mut Dom, parent: Option<NodeId>, e: &BytesStart) -> Result<NodeId, HubError> {
    let tag = qname_to_string(e.name());
    let id = dom.create_element(parent, &tag);

    if let NodeData::Element { attrs, .. } = &mut dom.node_mut(id).data {
        for a in e.attributes().flatten() {
            let name = qname_to_string(QxName(a.key.as_ref()));
            let value = a
                .unescape_value()
                .map_err(|e| HubError::malformed(format!("xml attr decode: {e}")))?
                .into_owned();
            attrs.push(Attr { name, value });
        }
    }

    Ok(id)
}

fn qname_to_string(q: QxName) -> String {
    String::from_utf8_lossy(q.as_ref()).into_owned()
}

/// Serializes the subtree rooted at `id` back to bytes, XML-escaping text and
/// attribute values. Not the canonical form — see [`c14n::c14n_exclusive`] for that.
pub fn serialize(dom: &Dom, id: NodeId) -> Vec<u8> {
    let mut writer = Writer::new(Vec::new());
    write_node(dom, id, &mut writer);
    writer.into_inner()
}

fn write_node(dom: &Dom, id: NodeId, writer: &mut Writer<Vec<u8>>) {
    match &dom.node(id).data {
        NodeData::Text(t) => {
            let _ = writer.write_event(Event::Text(BytesText::new(t)));
        }
        NodeData::Element { tag, attrs, children } => {
            let mut start = BytesStart::new(tag.as_str());
            for a in attrs {
                start.push_attribute((a.name.as_str(), a.value.as_str()));
            }
            if children.is_empty() {
                let _ = writer.write_event(Event::Empty(start));
            } else {
                let _ = writer.write_event(Event::Start(start));
                for c in children.clone() {
                    write_node(dom, c, writer);
                }
                let _ = writer.write_event(Event::End(BytesEnd::new(tag.as_str())));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attrs() {
        let dom = parse(br#"<samlp:AuthnRequest ID="_abc" Version="2.0"><saml:Issuer>hub</saml:Issuer></samlp:AuthnRequest>"#).unwrap();
        let root = dom.root.unwrap();
        assert_eq!(dom.tag_of(root), Some("samlp:AuthnRequest"));
        assert_eq!(dom.attr(root, "ID"), Some("_abc"));
        let children = dom.element_children(root);
        assert_eq!(children.len(), 1);
        assert_eq!(dom.tag_of(children[0]), Some("saml:Issuer"));
        assert_eq!(dom.text_content(children[0]), "hub");
    }

    #[test]
    fn round_trips_through_serialize() {
        let dom = parse(br#"<a x="1"><b>text</b></a>"#).unwrap();
        let out = serialize(&dom, dom.root.unwrap());
        let reparsed = parse(&out).unwrap();
        assert_eq!(reparsed.attr(reparsed.root.unwrap(), "x"), Some("1"));
    }
}
