//! # Transactions
//!
//! Reversible units of document mutation.
//!
//! ## Lifecycle
//!
//! ```text
//! Fresh ──prepare──▶ Prepared ──execute──▶ Applied ◀──redo── Undone
//!   ▲                   │                     │                ▲
//!   └─────prepare───────┘                     └──────undo──────┘
//! ```
//!
//! - `prepare` validates inputs against the current document and captures
//!   the state needed to reverse the edit. It is the only step that raises
//!   validation errors.
//! - `execute` applies the edit exactly once.
//! - `undo` / `redo` move between the applied and undone states, reusing
//!   captured identifiers so references taken during `execute` stay valid.
//!
//! ## Aggregates
//!
//! An aggregate runs its children front to back and undoes them back to
//! front. Each child is prepared right before it executes, so a child may
//! target a node created by an earlier sibling. If any child fails, the
//! already-applied prefix is rolled back before the error is returned.

use crate::document::{DetachedSubtree, Document};
use crate::node::{Attribute, ElementNode, NodeId};
use crate::transaction_manager::StackKind;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error};

/// Position of a transaction in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    Fresh,
    Prepared,
    Applied,
    Undone,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Fresh => "fresh",
            TransactionState::Prepared => "prepared",
            TransactionState::Applied => "applied",
            TransactionState::Undone => "undone",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Parent not found: {0}")]
    ParentNotFound(NodeId),

    #[error("Index {index} out of bounds for {parent} with {len} children")]
    IndexOutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },

    #[error("Got {names} attribute names but {values} values")]
    AttributeLengthMismatch { names: usize, values: usize },

    #[error("Node already exists: {0}")]
    NodeExists(NodeId),

    #[error("Cannot remove the root node")]
    CannotRemoveRoot,

    #[error("Cannot {operation} a transaction that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TransactionState,
    },

    #[error("Nothing to {0}")]
    EmptyStack(StackKind),

    #[error("Aggregate child {index} failed: {source}")]
    Aggregate {
        index: usize,
        source: Box<TransactionError>,
    },
}

/// Coarse classification of [`TransactionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, raised by `prepare`
    Validation,
    /// Lifecycle step called out of order
    InvalidState,
    /// Undo/redo with empty history; recoverable
    EmptyStack,
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransactionError::InvalidState { .. } => ErrorKind::InvalidState,
            TransactionError::EmptyStack(_) => ErrorKind::EmptyStack,
            TransactionError::Aggregate { source, .. } => source.kind(),
            _ => ErrorKind::Validation,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::EmptyStack
    }
}

fn require_state(
    state: TransactionState,
    allowed: &[TransactionState],
    operation: &'static str,
) -> Result<(), TransactionError> {
    if allowed.contains(&state) {
        Ok(())
    } else {
        Err(TransactionError::InvalidState { operation, state })
    }
}

const PREPARABLE: &[TransactionState] = &[TransactionState::Fresh, TransactionState::Prepared];

/// Insert a new element at `(parent, index)`
///
/// The element's id is reserved when the transaction is built, so other
/// transactions can refer to it before it exists.
#[derive(Debug, Clone)]
pub struct CreateElement {
    id: NodeId,
    tag: String,
    parent: NodeId,
    index: usize,
    state: TransactionState,
}

impl CreateElement {
    pub fn new(doc: &mut Document, tag: impl Into<String>, parent: NodeId, index: usize) -> Self {
        Self {
            id: doc.reserve_id(),
            tag: tag.into(),
            parent,
            index,
            state: TransactionState::Fresh,
        }
    }

    /// Id the new element will carry once executed
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn prepare(&mut self, doc: &Document) -> Result<(), TransactionError> {
        require_state(self.state, PREPARABLE, "prepare")?;
        doc.check_insertion(self.parent, self.index)?;
        if doc.contains(self.id) {
            return Err(TransactionError::NodeExists(self.id));
        }
        self.state = TransactionState::Prepared;
        Ok(())
    }

    fn apply(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        doc.insert_node(ElementNode::new(self.id, self.tag.clone()), self.parent, self.index)?;
        self.state = TransactionState::Applied;
        Ok(())
    }

    fn undo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        require_state(self.state, &[TransactionState::Applied], "undo")?;
        doc.detach_subtree(self.id)?;
        self.state = TransactionState::Undone;
        Ok(())
    }
}

/// Replace or merge attributes on an existing element
#[derive(Debug, Clone)]
pub struct ChangeAttributes {
    node: NodeId,
    names: Vec<String>,
    values: Vec<String>,
    clear: bool,
    previous: Option<Vec<Attribute>>,
    state: TransactionState,
}

impl ChangeAttributes {
    /// `clear = true` replaces the attribute list; otherwise existing names
    /// are updated in place and new names appended.
    pub fn new<N, V>(node: NodeId, names: N, values: V, clear: bool) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            node,
            names: names.into_iter().map(Into::into).collect(),
            values: values.into_iter().map(Into::into).collect(),
            clear,
            previous: None,
            state: TransactionState::Fresh,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn prepare(&mut self, doc: &Document) -> Result<(), TransactionError> {
        require_state(self.state, PREPARABLE, "prepare")?;
        if self.names.len() != self.values.len() {
            return Err(TransactionError::AttributeLengthMismatch {
                names: self.names.len(),
                values: self.values.len(),
            });
        }
        let node = doc
            .get(self.node)
            .ok_or(TransactionError::NodeNotFound(self.node))?;
        self.previous = Some(node.attributes().to_vec());
        self.state = TransactionState::Prepared;
        Ok(())
    }

    fn next_attributes(&self, current: &[Attribute]) -> Vec<Attribute> {
        let mut attributes = if self.clear { Vec::new() } else { current.to_vec() };
        for (name, value) in self.names.iter().zip(&self.values) {
            match attributes.iter_mut().find(|attr| &attr.name == name) {
                Some(existing) => existing.value = value.clone(),
                None => attributes.push(Attribute::new(name.clone(), value.clone())),
            }
        }
        attributes
    }

    fn apply(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        let current = doc
            .get(self.node)
            .ok_or(TransactionError::NodeNotFound(self.node))?
            .attributes();
        let next = self.next_attributes(current);
        doc.replace_attributes(self.node, next)?;
        self.state = TransactionState::Applied;
        Ok(())
    }

    fn undo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        require_state(self.state, &[TransactionState::Applied], "undo")?;
        let previous = self.previous.clone().ok_or(TransactionError::InvalidState {
            operation: "undo",
            state: self.state,
        })?;
        doc.replace_attributes(self.node, previous)?;
        self.state = TransactionState::Undone;
        Ok(())
    }
}

/// Remove an element together with its subtree
#[derive(Debug, Clone)]
pub struct RemoveElement {
    node: NodeId,
    detached: Option<DetachedSubtree>,
    state: TransactionState,
}

impl RemoveElement {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            detached: None,
            state: TransactionState::Fresh,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn prepare(&mut self, doc: &Document) -> Result<(), TransactionError> {
        require_state(self.state, PREPARABLE, "prepare")?;
        if self.node == doc.root() {
            return Err(TransactionError::CannotRemoveRoot);
        }
        if !doc.contains(self.node) {
            return Err(TransactionError::NodeNotFound(self.node));
        }
        self.state = TransactionState::Prepared;
        Ok(())
    }

    fn apply(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        self.detached = Some(doc.detach_subtree(self.node)?);
        self.state = TransactionState::Applied;
        Ok(())
    }

    fn undo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        require_state(self.state, &[TransactionState::Applied], "undo")?;
        let detached = self.detached.take().ok_or(TransactionError::InvalidState {
            operation: "undo",
            state: self.state,
        })?;
        if let Err(e) = doc.attach_subtree(detached.clone()) {
            self.detached = Some(detached);
            return Err(e);
        }
        self.state = TransactionState::Undone;
        Ok(())
    }
}

/// Ordered group of transactions applied and reverted as one unit
#[derive(Debug, Clone)]
pub struct Aggregate {
    children: Vec<Transaction>,
    description: Option<String>,
    state: TransactionState,
}

impl Aggregate {
    pub fn new(children: Vec<Transaction>) -> Self {
        Self {
            children,
            description: None,
            state: TransactionState::Fresh,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn children(&self) -> &[Transaction] {
        &self.children
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn prepare(&mut self, _doc: &Document) -> Result<(), TransactionError> {
        require_state(self.state, PREPARABLE, "prepare")?;
        for child in &self.children {
            require_state(child.state(), PREPARABLE, "prepare")?;
        }
        self.state = TransactionState::Prepared;
        Ok(())
    }

    fn execute(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        for index in 0..self.children.len() {
            let child = &mut self.children[index];
            let result = child.prepare(doc).and_then(|()| child.execute(doc));
            if let Err(e) = result {
                debug!(index, error = %e, "Aggregate child failed, rolling back");
                self.rollback(doc, index);
                return Err(TransactionError::Aggregate {
                    index,
                    source: Box::new(e),
                });
            }
        }
        self.state = TransactionState::Applied;
        Ok(())
    }

    fn redo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        for index in 0..self.children.len() {
            if let Err(e) = self.children[index].redo(doc) {
                debug!(index, error = %e, "Aggregate child failed on redo, rolling back");
                self.rollback(doc, index);
                return Err(TransactionError::Aggregate {
                    index,
                    source: Box::new(e),
                });
            }
        }
        self.state = TransactionState::Applied;
        Ok(())
    }

    fn undo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        require_state(self.state, &[TransactionState::Applied], "undo")?;
        for index in (0..self.children.len()).rev() {
            if let Err(e) = self.children[index].undo(doc) {
                debug!(index, error = %e, "Aggregate child failed on undo, reapplying");
                self.reapply(doc, index + 1);
                return Err(TransactionError::Aggregate {
                    index,
                    source: Box::new(e),
                });
            }
        }
        self.state = TransactionState::Undone;
        Ok(())
    }

    /// Redo the children from `undone` onward, in order
    fn reapply(&mut self, doc: &mut Document, undone: usize) {
        for (offset, child) in self.children[undone..].iter_mut().enumerate() {
            if let Err(e) = child.redo(doc) {
                error!(index = undone + offset, error = %e, "Failed to reapply aggregate child");
            }
        }
    }

    /// Undo the first `applied` children in reverse order
    fn rollback(&mut self, doc: &mut Document, applied: usize) {
        for (index, child) in self.children[..applied].iter_mut().enumerate().rev() {
            if let Err(e) = child.undo(doc) {
                error!(index, error = %e, "Failed to roll back aggregate child");
            }
        }
    }
}

/// A reversible edit
#[derive(Debug, Clone)]
pub enum Transaction {
    CreateElement(CreateElement),
    ChangeAttributes(ChangeAttributes),
    RemoveElement(RemoveElement),
    Aggregate(Aggregate),
}

impl Transaction {
    /// Build a create-element transaction, reserving the new node's id
    pub fn create_element(
        doc: &mut Document,
        tag: impl Into<String>,
        parent: NodeId,
        index: usize,
    ) -> Self {
        CreateElement::new(doc, tag, parent, index).into()
    }

    pub fn change_attributes<N, V>(node: NodeId, names: N, values: V, clear: bool) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        ChangeAttributes::new(node, names, values, clear).into()
    }

    pub fn remove_element(node: NodeId) -> Self {
        RemoveElement::new(node).into()
    }

    pub fn aggregate(children: Vec<Transaction>) -> Self {
        Aggregate::new(children).into()
    }

    /// Debug name of the transaction kind
    pub fn name(&self) -> &'static str {
        match self {
            Transaction::CreateElement(_) => "CreateElement",
            Transaction::ChangeAttributes(_) => "ChangeAttributes",
            Transaction::RemoveElement(_) => "RemoveElement",
            Transaction::Aggregate(_) => "Aggregate",
        }
    }

    pub fn state(&self) -> TransactionState {
        match self {
            Transaction::CreateElement(t) => t.state,
            Transaction::ChangeAttributes(t) => t.state,
            Transaction::RemoveElement(t) => t.state,
            Transaction::Aggregate(t) => t.state,
        }
    }

    /// Human-readable label, if one was attached
    pub fn description(&self) -> Option<&str> {
        match self {
            Transaction::Aggregate(t) => t.description(),
            _ => None,
        }
    }

    /// Id of the element this transaction creates, if any
    pub fn created_node(&self) -> Option<NodeId> {
        match self {
            Transaction::CreateElement(t) => Some(t.node_id()),
            _ => None,
        }
    }

    /// Validate against `doc` and capture undo state
    pub fn prepare(&mut self, doc: &Document) -> Result<(), TransactionError> {
        match self {
            Transaction::CreateElement(t) => t.prepare(doc),
            Transaction::ChangeAttributes(t) => t.prepare(doc),
            Transaction::RemoveElement(t) => t.prepare(doc),
            Transaction::Aggregate(t) => t.prepare(doc),
        }
    }

    /// Apply the edit; must follow a successful `prepare`
    pub fn execute(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        require_state(self.state(), &[TransactionState::Prepared], "execute")?;
        match self {
            Transaction::CreateElement(t) => t.apply(doc),
            Transaction::ChangeAttributes(t) => t.apply(doc),
            Transaction::RemoveElement(t) => t.apply(doc),
            Transaction::Aggregate(t) => t.execute(doc),
        }
    }

    /// Revert the last `execute` or `redo`
    pub fn undo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        match self {
            Transaction::CreateElement(t) => t.undo(doc),
            Transaction::ChangeAttributes(t) => t.undo(doc),
            Transaction::RemoveElement(t) => t.undo(doc),
            Transaction::Aggregate(t) => t.undo(doc),
        }
    }

    /// Re-apply after an `undo`, keeping the same node ids
    pub fn redo(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        require_state(self.state(), &[TransactionState::Undone], "redo")?;
        match self {
            Transaction::CreateElement(t) => t.apply(doc),
            Transaction::ChangeAttributes(t) => t.apply(doc),
            Transaction::RemoveElement(t) => t.apply(doc),
            Transaction::Aggregate(t) => t.redo(doc),
        }
    }
}

impl From<CreateElement> for Transaction {
    fn from(t: CreateElement) -> Self {
        Transaction::CreateElement(t)
    }
}

impl From<ChangeAttributes> for Transaction {
    fn from(t: ChangeAttributes) -> Self {
        Transaction::ChangeAttributes(t)
    }
}

impl From<RemoveElement> for Transaction {
    fn from(t: RemoveElement) -> Self {
        Transaction::RemoveElement(t)
    }
}

impl From<Aggregate> for Transaction {
    fn from(t: Aggregate) -> Self {
        Transaction::Aggregate(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(txn: &mut Transaction, doc: &mut Document) -> Result<(), TransactionError> {
        txn.prepare(doc)?;
        txn.execute(doc)
    }

    #[test]
    fn test_create_element_inserts_at_index() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut first = Transaction::create_element(&mut doc, "button", root, 0);
        run(&mut first, &mut doc).unwrap();
        let mut second = Transaction::create_element(&mut doc, "textfield", root, 0);
        run(&mut second, &mut doc).unwrap();

        let children = doc.children(root).unwrap();
        assert_eq!(children, &[second.created_node().unwrap(), first.created_node().unwrap()]);
        assert_eq!(first.state(), TransactionState::Applied);
    }

    #[test]
    fn test_create_element_validates_insertion_point() {
        let mut doc = Document::new("window");
        let root = doc.root();

        let mut bad_index = Transaction::create_element(&mut doc, "button", root, 2);
        let err = bad_index.prepare(&doc).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(bad_index.state(), TransactionState::Fresh);

        let mut bad_parent = Transaction::create_element(&mut doc, "button", NodeId::new(99), 0);
        assert_eq!(
            bad_parent.prepare(&doc).unwrap_err(),
            TransactionError::ParentNotFound(NodeId::new(99))
        );
    }

    #[test]
    fn test_execute_requires_prepare() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut txn = Transaction::create_element(&mut doc, "button", root, 0);

        let err = txn.execute(&mut doc).unwrap_err();
        assert_eq!(
            err,
            TransactionError::InvalidState {
                operation: "execute",
                state: TransactionState::Fresh
            }
        );
    }

    #[test]
    fn test_execute_twice_is_invalid() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut txn = Transaction::create_element(&mut doc, "button", root, 0);
        run(&mut txn, &mut doc).unwrap();

        let err = txn.execute(&mut doc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(doc.children(root).unwrap().len(), 1);

        // Once applied, the transaction cannot be prepared again either
        assert_eq!(txn.prepare(&doc).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_prepare_can_be_repeated_before_execute() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut txn = Transaction::create_element(&mut doc, "button", root, 0);

        txn.prepare(&doc).unwrap();
        txn.prepare(&doc).unwrap();
        txn.execute(&mut doc).unwrap();
    }

    #[test]
    fn test_redo_requires_undo() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut txn = Transaction::create_element(&mut doc, "button", root, 0);
        run(&mut txn, &mut doc).unwrap();

        assert_eq!(txn.redo(&mut doc).unwrap_err().kind(), ErrorKind::InvalidState);
        txn.undo(&mut doc).unwrap();
        assert_eq!(txn.undo(&mut doc).unwrap_err().kind(), ErrorKind::InvalidState);
        txn.redo(&mut doc).unwrap();
    }

    #[test]
    fn test_change_attributes_merges_in_place() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut create = Transaction::create_element(&mut doc, "button", root, 0);
        run(&mut create, &mut doc).unwrap();
        let id = create.created_node().unwrap();

        let mut first = Transaction::change_attributes(id, ["value", "id"], ["Button 1", "button_1"], false);
        run(&mut first, &mut doc).unwrap();
        let mut second = Transaction::change_attributes(id, ["disabled", "value"], ["true", "Renamed"], false);
        run(&mut second, &mut doc).unwrap();

        let node = doc.get(id).unwrap();
        let names: Vec<&str> = node.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["value", "id", "disabled"]);
        assert_eq!(node.attribute("value"), Some("Renamed"));

        second.undo(&mut doc).unwrap();
        let node = doc.get(id).unwrap();
        assert_eq!(
            node.attributes(),
            &[Attribute::new("value", "Button 1"), Attribute::new("id", "button_1")]
        );
    }

    #[test]
    fn test_change_attributes_clear_replaces_list() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut seed = Transaction::change_attributes(root, ["title", "id"], ["Main", "main"], false);
        run(&mut seed, &mut doc).unwrap();

        let mut clear = Transaction::change_attributes(root, ["id"], ["replaced"], true);
        run(&mut clear, &mut doc).unwrap();
        assert_eq!(doc.get(root).unwrap().attributes(), &[Attribute::new("id", "replaced")]);

        clear.undo(&mut doc).unwrap();
        assert_eq!(doc.get(root).unwrap().attribute("title"), Some("Main"));
    }

    #[test]
    fn test_change_attributes_rejects_length_mismatch() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut txn = Transaction::change_attributes(root, ["a", "b"], ["1"], false);

        assert_eq!(
            txn.prepare(&doc).unwrap_err(),
            TransactionError::AttributeLengthMismatch { names: 2, values: 1 }
        );
    }

    #[test]
    fn test_remove_element_round_trip() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let group = CreateElement::new(&mut doc, "radiogroup", root, 0);
        let group_id = group.node_id();
        let radio = CreateElement::new(&mut doc, "radio", group_id, 0);
        let mut build = Transaction::aggregate(vec![group.into(), radio.into()]);
        run(&mut build, &mut doc).unwrap();
        let before = doc.clone();

        let mut remove = Transaction::remove_element(group_id);
        run(&mut remove, &mut doc).unwrap();
        assert!(doc.children(root).unwrap().is_empty());
        assert_eq!(doc.node_count(), 1);

        remove.undo(&mut doc).unwrap();
        assert_eq!(doc, before);

        remove.redo(&mut doc).unwrap();
        assert!(!doc.contains(group_id));
    }

    #[test]
    fn test_remove_root_is_rejected() {
        let mut doc = Document::new("window");
        let mut txn = Transaction::remove_element(doc.root());
        assert_eq!(txn.prepare(&doc).unwrap_err(), TransactionError::CannotRemoveRoot);
        assert!(run(&mut Transaction::remove_element(NodeId::new(7)), &mut doc).is_err());
    }

    #[test]
    fn test_aggregate_children_can_target_earlier_siblings() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let create = CreateElement::new(&mut doc, "button", root, 0);
        let id = create.node_id();
        let mut txn = Transaction::aggregate(vec![
            create.into(),
            Transaction::change_attributes(id, ["id"], ["button_1"], false),
        ]);

        run(&mut txn, &mut doc).unwrap();
        assert_eq!(doc.get(id).unwrap().attribute("id"), Some("button_1"));
    }

    #[test]
    fn test_aggregate_rolls_back_prefix_on_failure() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let before = doc.clone();
        let create = CreateElement::new(&mut doc, "button", root, 0);
        let id = create.node_id();
        let mut txn = Transaction::aggregate(vec![
            create.into(),
            Transaction::change_attributes(NodeId::new(404), ["id"], ["x"], false),
            Transaction::change_attributes(id, ["id"], ["never"], false),
        ]);

        txn.prepare(&doc).unwrap();
        let err = txn.execute(&mut doc).unwrap_err();
        match &err {
            TransactionError::Aggregate { index, source } => {
                assert_eq!(*index, 1);
                assert_eq!(**source, TransactionError::NodeNotFound(NodeId::new(404)));
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }
        assert!(err.is_validation());
        assert_eq!(doc, before);
        assert_eq!(txn.state(), TransactionState::Prepared);
    }

    #[test]
    fn test_aggregate_undo_runs_in_reverse() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let before = doc.clone();
        let outer = CreateElement::new(&mut doc, "box", root, 0);
        let outer_id = outer.node_id();
        let inner = CreateElement::new(&mut doc, "button", outer_id, 0);
        let inner_id = inner.node_id();
        let mut txn = Transaction::aggregate(vec![outer.into(), inner.into()]);

        run(&mut txn, &mut doc).unwrap();
        let after = doc.clone();

        // Undoing front to back would fail: the inner node is detached with its parent
        txn.undo(&mut doc).unwrap();
        assert_eq!(doc, before);

        txn.redo(&mut doc).unwrap();
        assert_eq!(doc, after);
        assert_eq!(doc.get(inner_id).unwrap().parent(), Some(outer_id));
    }

    #[test]
    fn test_aggregate_undo_failure_leaves_it_applied() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut label = Transaction::create_element(&mut doc, "label", root, 0);
        let label_id = label.created_node().unwrap();
        run(&mut label, &mut doc).unwrap();
        let before = doc.clone();

        let create = CreateElement::new(&mut doc, "button", root, 1);
        let button = create.node_id();
        let mut txn = Transaction::aggregate(vec![
            create.into(),
            Transaction::change_attributes(label_id, ["value"], ["Name"], false),
        ]);
        run(&mut txn, &mut doc).unwrap();
        let applied = doc.clone();

        // Pull the button out behind the transaction's back
        let detached = doc.detach_subtree(button).unwrap();

        let err = txn.undo(&mut doc).unwrap_err();
        match &err {
            TransactionError::Aggregate { index, source } => {
                assert_eq!(*index, 0);
                assert_eq!(**source, TransactionError::NodeNotFound(button));
            }
            other => panic!("expected aggregate error, got {other:?}"),
        }
        assert_eq!(txn.state(), TransactionState::Applied);
        assert_eq!(doc.get(label_id).unwrap().attribute("value"), Some("Name"));

        // Once the tree is consistent again the aggregate still undoes cleanly
        doc.attach_subtree(detached).unwrap();
        assert_eq!(doc, applied);
        txn.undo(&mut doc).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn test_create_element_from_another_document() {
        let mut scratch = Document::new("window");
        let mut doc = Document::new("window");
        let root = doc.root();

        // Both documents would hand out the same next id
        let mut foreign = Transaction::create_element(&mut scratch, "button", root, 0);
        run(&mut foreign, &mut doc).unwrap();
        let mut local = Transaction::create_element(&mut doc, "button", root, 1);
        run(&mut local, &mut doc).unwrap();

        assert_ne!(foreign.created_node(), local.created_node());
        assert_eq!(doc.children(root).unwrap().len(), 2);
    }

    #[test]
    fn test_aggregate_rejects_already_applied_child() {
        let mut doc = Document::new("window");
        let root = doc.root();
        let mut child = Transaction::create_element(&mut doc, "button", root, 0);
        run(&mut child, &mut doc).unwrap();

        let mut txn = Transaction::aggregate(vec![child]);
        assert_eq!(txn.prepare(&doc).unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_aggregate_description() {
        let txn: Transaction = Aggregate::new(vec![]).with_description("Insert button").into();
        assert_eq!(txn.description(), Some("Insert button"));
        assert_eq!(txn.name(), "Aggregate");
    }
}
