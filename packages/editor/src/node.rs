//! # Element Nodes
//!
//! Leaf data of the document tree: node identities, attributes, elements and
//! the insertion-point cursor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of an element within a [`Document`](crate::Document)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single name/value attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Element stored in the document arena
///
/// Attributes keep insertion order. The parent link is lookup-only; the
/// parent's child list is the source of truth for ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    id: NodeId,
    tag: String,
    attributes: Vec<Attribute>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl ElementNode {
    pub(crate) fn new(id: NodeId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Look up an attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.children
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    /// Swap in a new attribute list, returning the previous one
    pub(crate) fn replace_attributes(&mut self, attributes: Vec<Attribute>) -> Vec<Attribute> {
        std::mem::replace(&mut self.attributes, attributes)
    }
}

/// Cursor describing where new nodes attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertionPoint {
    pub parent: NodeId,
    pub index: usize,
}

impl InsertionPoint {
    pub fn new(parent: NodeId, index: usize) -> Self {
        Self { parent, index }
    }
}

/// Nested, serializable view of a subtree
///
/// Used for persistence and for comparing document states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementTree {
    pub id: NodeId,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementTree>,
}

impl ElementTree {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }
}
