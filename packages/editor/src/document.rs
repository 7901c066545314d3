//! # Document Tree
//!
//! Arena-backed element tree edited by the transaction layer.
//!
//! ## Ownership
//!
//! ```text
//! EditSession ──owns──▶ Document ──arena──▶ ElementNode*
//!                           ▲
//!                           └── mutated only by Transaction variants
//! ```
//!
//! Read access is public. Every mutating operation is `pub(crate)` so that
//! changes can only enter the tree through a transaction and therefore always
//! land in the undo history.
//!
//! ## Persistence
//!
//! Documents are stored as a flat [`DocumentRecord`]: one entry per node with
//! its ordered child ids. Nesting depth of the file stays constant no matter
//! how deep the element tree is.

use crate::node::{Attribute, ElementNode, ElementTree, NodeId};
use crate::transaction::TransactionError;
use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Element tree with a single root
#[derive(Debug, Clone)]
pub struct Document {
    root: NodeId,
    nodes: HashMap<NodeId, ElementNode>,
    next_id: u64,
}

/// A subtree removed from the document, kept so it can be reattached
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DetachedSubtree {
    pub parent: NodeId,
    pub index: usize,
    /// Nodes in preorder; the first entry is the subtree root
    pub nodes: Vec<ElementNode>,
}

/// Flat on-disk form of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub root: NodeId,
    /// Nodes in preorder, root first
    pub nodes: Vec<NodeRecord>,
}

/// One element of a [`DocumentRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
}

impl Document {
    /// Create a document containing only a root element
    pub fn new(root_tag: impl Into<String>) -> Self {
        let root = NodeId::new(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, ElementNode::new(root, root_tag));

        Self {
            root,
            nodes,
            next_id: 1,
        }
    }

    /// Rebuild a document from its nested form, keeping node ids
    pub fn from_tree(tree: &ElementTree) -> Result<Self, TransactionError> {
        let mut doc = Self {
            root: tree.id,
            nodes: HashMap::new(),
            next_id: 0,
        };
        doc.load_subtree(tree, None)?;
        doc.next_id = doc
            .nodes
            .keys()
            .map(|id| id.raw() + 1)
            .max()
            .unwrap_or(0);
        Ok(doc)
    }

    fn load_subtree(
        &mut self,
        tree: &ElementTree,
        parent: Option<NodeId>,
    ) -> Result<(), TransactionError> {
        if self.nodes.contains_key(&tree.id) {
            return Err(TransactionError::NodeExists(tree.id));
        }

        let mut node = ElementNode::new(tree.id, tree.tag.clone());
        node.set_parent(parent);
        node.replace_attributes(tree.attributes.clone());
        node.children_mut()
            .extend(tree.children.iter().map(|child| child.id));
        self.nodes.insert(tree.id, node);

        for child in &tree.children {
            self.load_subtree(child, Some(tree.id))?;
        }
        Ok(())
    }

    /// Rebuild a document from its flat form
    ///
    /// Every node must be reachable from the root exactly once.
    pub fn from_record(record: &DocumentRecord) -> Result<Self, EditorError> {
        let mut sources: HashMap<NodeId, &NodeRecord> = HashMap::with_capacity(record.nodes.len());
        for node in &record.nodes {
            if sources.insert(node.id, node).is_some() {
                return Err(EditorError::MalformedDocument(format!(
                    "node {} is defined more than once",
                    node.id
                )));
            }
        }

        let mut doc = Self {
            root: record.root,
            nodes: HashMap::with_capacity(sources.len()),
            next_id: 0,
        };
        let mut pending = vec![(record.root, None)];
        while let Some((id, parent)) = pending.pop() {
            let source = sources.get(&id).ok_or_else(|| {
                EditorError::MalformedDocument(format!("node {id} is referenced but not defined"))
            })?;
            if doc.nodes.contains_key(&id) {
                return Err(EditorError::MalformedDocument(format!(
                    "node {id} is linked more than once"
                )));
            }

            let mut node = ElementNode::new(id, source.tag.clone());
            node.set_parent(parent);
            node.replace_attributes(source.attributes.clone());
            node.children_mut().extend(source.children.iter().copied());
            pending.extend(source.children.iter().map(|child| (*child, Some(id))));
            doc.nodes.insert(id, node);
        }

        if doc.nodes.len() != sources.len() {
            return Err(EditorError::MalformedDocument(format!(
                "{} nodes are not reachable from the root",
                sources.len() - doc.nodes.len()
            )));
        }
        doc.next_id = doc
            .nodes
            .keys()
            .map(|id| id.raw() + 1)
            .max()
            .unwrap_or(0);
        Ok(doc)
    }

    /// Flat view of the whole document, nodes in preorder
    pub fn to_record(&self) -> DocumentRecord {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            pending.extend(node.children().iter().rev().copied());
            nodes.push(NodeRecord {
                id,
                tag: node.tag().to_string(),
                attributes: node.attributes().to_vec(),
                children: node.children().to_vec(),
            });
        }
        DocumentRecord {
            root: self.root,
            nodes,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&ElementNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Child ids of a node, in document order
    pub fn children(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(&id).map(|node| node.children())
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find the first node (in document order) carrying `name="value"`
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let node = self.nodes.get(&id)?;
            if node.attribute(name) == Some(value) {
                return Some(id);
            }
            pending.extend(node.children().iter().rev().copied());
        }
        None
    }

    /// Nested view of the whole document
    pub fn to_tree(&self) -> ElementTree {
        self.subtree(self.root).unwrap_or_else(|| ElementTree {
            id: self.root,
            tag: String::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        })
    }

    /// Nested view rooted at `id`
    pub fn subtree(&self, id: NodeId) -> Option<ElementTree> {
        let node = self.nodes.get(&id)?;
        Some(ElementTree {
            id,
            tag: node.tag().to_string(),
            attributes: node.attributes().to_vec(),
            children: node
                .children()
                .iter()
                .filter_map(|child| self.subtree(*child))
                .collect(),
        })
    }

    /// Hand out a fresh id; ids are never reused within a document
    pub(crate) fn reserve_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Keep the allocator ahead of ids that arrive from elsewhere
    fn claim_id(&mut self, id: NodeId) {
        self.next_id = self.next_id.max(id.raw() + 1);
    }

    /// Check that `(parent, index)` is a valid place to attach a node
    pub(crate) fn check_insertion(&self, parent: NodeId, index: usize) -> Result<(), TransactionError> {
        let node = self
            .nodes
            .get(&parent)
            .ok_or(TransactionError::ParentNotFound(parent))?;
        let len = node.children().len();
        if index > len {
            return Err(TransactionError::IndexOutOfBounds { parent, index, len });
        }
        Ok(())
    }

    pub(crate) fn insert_node(
        &mut self,
        mut node: ElementNode,
        parent: NodeId,
        index: usize,
    ) -> Result<(), TransactionError> {
        if self.nodes.contains_key(&node.id()) {
            return Err(TransactionError::NodeExists(node.id()));
        }
        self.check_insertion(parent, index)?;

        let id = node.id();
        node.set_parent(Some(parent));
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children_mut().insert(index, id);
        }
        self.claim_id(id);
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Unlink a node and remove it and all of its descendants from the arena
    pub(crate) fn detach_subtree(&mut self, id: NodeId) -> Result<DetachedSubtree, TransactionError> {
        if id == self.root {
            return Err(TransactionError::CannotRemoveRoot);
        }
        let parent = self
            .nodes
            .get(&id)
            .and_then(|node| node.parent())
            .ok_or(TransactionError::NodeNotFound(id))?;
        let siblings = self
            .nodes
            .get_mut(&parent)
            .ok_or(TransactionError::ParentNotFound(parent))?
            .children_mut();
        let index = siblings
            .iter()
            .position(|child| *child == id)
            .ok_or(TransactionError::NodeNotFound(id))?;
        siblings.remove(index);

        let mut nodes = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children().iter().rev().copied());
                nodes.push(node);
            }
        }

        Ok(DetachedSubtree {
            parent,
            index,
            nodes,
        })
    }

    /// Put a previously detached subtree back where it came from
    pub(crate) fn attach_subtree(&mut self, subtree: DetachedSubtree) -> Result<(), TransactionError> {
        let DetachedSubtree {
            parent,
            index,
            nodes,
        } = subtree;
        let Some(top) = nodes.first().map(|node| node.id()) else {
            return Ok(());
        };

        self.check_insertion(parent, index)?;
        if let Some(existing) = nodes.iter().find(|node| self.nodes.contains_key(&node.id())) {
            return Err(TransactionError::NodeExists(existing.id()));
        }

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children_mut().insert(index, top);
        }
        for node in nodes {
            self.claim_id(node.id());
            self.nodes.insert(node.id(), node);
        }
        Ok(())
    }

    /// Swap a node's attribute list, returning the previous one
    pub(crate) fn replace_attributes(
        &mut self,
        id: NodeId,
        attributes: Vec<Attribute>,
    ) -> Result<Vec<Attribute>, TransactionError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(TransactionError::NodeNotFound(id))?;
        Ok(node.replace_attributes(attributes))
    }
}

/// Documents compare by tree content; the id allocator is not part of the state
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.nodes == other.nodes
    }
}
