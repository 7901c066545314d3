//! # Edit Session Management
//!
//! An EditSession owns one document, its insertion-point cursor and the
//! transaction manager that records every change made to it.
//!
//! Sessions are either memory-backed (`new`) or file-backed (`load`), in
//! which case the tree is persisted as a flat JSON [`DocumentRecord`].
//!
//! The insertion point is kept valid across history changes: after every
//! successful do/undo/redo it is clamped to the parent's child count, or
//! cleared when the parent is no longer in the document.

use crate::document::{Document, DocumentRecord};
use crate::listener::TransactionListener;
use crate::node::{InsertionPoint, NodeId};
use crate::transaction::{CreateElement, ErrorKind, Transaction, TransactionError};
use crate::transaction_manager::TransactionManager;
use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info};

/// Construction options for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Tag of the root element for new documents
    pub root_tag: String,

    /// Maximum number of undo levels (0 = unlimited)
    pub max_undo_levels: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            root_tag: "window".to_string(),
            max_undo_levels: 100,
        }
    }
}

/// Single editing session over one document
#[derive(Debug)]
pub struct EditSession {
    /// Unique session identifier
    pub id: String,

    document: Document,
    manager: TransactionManager,
    insertion_point: Option<InsertionPoint>,

    /// Backing file, if any
    path: Option<PathBuf>,
    dirty: bool,
}

impl EditSession {
    /// Create a memory-backed session with default options
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_options(id, SessionOptions::default())
    }

    pub fn with_options(id: impl Into<String>, options: SessionOptions) -> Self {
        Self::from_document(id, Document::new(options.root_tag), options.max_undo_levels)
    }

    fn from_document(id: impl Into<String>, document: Document, max_undo_levels: usize) -> Self {
        Self {
            id: id.into(),
            document,
            manager: TransactionManager::with_max_levels(max_undo_levels),
            insertion_point: None,
            path: None,
            dirty: false,
        }
    }

    /// Open a file-backed session from a saved document
    pub fn load(
        id: impl Into<String>,
        path: impl AsRef<Path>,
        options: &SessionOptions,
    ) -> Result<Self, EditorError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let record: DocumentRecord = serde_json::from_str(&source)?;
        let document = Document::from_record(&record)?;
        info!(path = %path.display(), nodes = document.node_count(), "Loaded document");

        let mut session = Self::from_document(id, document, options.max_undo_levels);
        session.path = Some(path.to_path_buf());
        Ok(session)
    }

    /// Save to the backing file
    pub fn save(&mut self) -> Result<(), EditorError> {
        let path = self.path.clone().ok_or(EditorError::NotFileBacked)?;
        self.write_to(&path)
    }

    /// Save to `path` and make it the backing file
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), EditorError> {
        let path = path.as_ref().to_path_buf();
        self.write_to(&path)?;
        self.path = Some(path);
        Ok(())
    }

    fn write_to(&mut self, path: &Path) -> Result<(), EditorError> {
        let json = serde_json::to_string_pretty(&self.document.to_record())?;
        std::fs::write(path, json)?;
        self.dirty = false;
        info!(path = %path.display(), "Saved document");
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the document changed since it was loaded or saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current insertion point
    pub fn insertion_point(&self) -> Result<InsertionPoint, EditorError> {
        self.insertion_point.ok_or(EditorError::NoSelection)
    }

    /// Move the insertion point; the location must exist now
    pub fn set_insertion_point(&mut self, parent: NodeId, index: usize) -> Result<(), EditorError> {
        self.document.check_insertion(parent, index)?;
        self.insertion_point = Some(InsertionPoint::new(parent, index));
        debug!(session = %self.id, %parent, index, "Insertion point moved");
        Ok(())
    }

    pub fn clear_insertion_point(&mut self) {
        self.insertion_point = None;
    }

    /// Build a create-element transaction; the new id is reserved immediately
    ///
    /// Returns the concrete variant so callers can read
    /// [`CreateElement::node_id`] before wrapping it with `.into()`. Use
    /// [`Transaction::created_node`] once it is a `Transaction`.
    pub fn create_element(&mut self, tag: impl Into<String>, parent: NodeId, index: usize) -> CreateElement {
        CreateElement::new(&mut self.document, tag, parent, index)
    }

    pub fn change_attributes<N, V>(&self, node: NodeId, names: N, values: V, clear: bool) -> Transaction
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Transaction::change_attributes(node, names, values, clear)
    }

    pub fn remove_element(&self, node: NodeId) -> Transaction {
        Transaction::remove_element(node)
    }

    /// Run a transaction and record it for undo
    pub fn do_transaction(&mut self, transaction: Transaction) -> Result<(), EditorError> {
        self.manager.do_transaction(transaction, &mut self.document)?;
        self.changed();
        Ok(())
    }

    /// Run a transaction with `listener` registered for this call only
    pub fn do_transaction_observed(
        &mut self,
        transaction: Transaction,
        listener: &Rc<dyn TransactionListener>,
    ) -> Result<(), EditorError> {
        {
            let mut scoped = self.manager.scoped_listener(listener);
            scoped.do_transaction(transaction, &mut self.document)?;
        }
        self.changed();
        Ok(())
    }

    /// Undo the last transaction; `Ok(false)` when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let result = self.manager.undo_transaction(&mut self.document);
        self.settle(result)
    }

    /// Redo the last undone transaction; `Ok(false)` when there is nothing to redo
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let result = self.manager.redo_transaction(&mut self.document);
        self.settle(result)
    }

    fn settle(&mut self, result: Result<(), TransactionError>) -> Result<bool, EditorError> {
        match result {
            Ok(()) => {
                self.changed();
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::EmptyStack => {
                debug!(session = %self.id, "{}", e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn changed(&mut self) {
        self.dirty = true;
        self.revalidate_insertion_point();
    }

    fn revalidate_insertion_point(&mut self) {
        let Some(point) = self.insertion_point else {
            return;
        };
        match self.document.children(point.parent) {
            None => {
                debug!(session = %self.id, parent = %point.parent, "Insertion point parent removed");
                self.insertion_point = None;
            }
            Some(children) if point.index > children.len() => {
                let index = children.len();
                debug!(session = %self.id, parent = %point.parent, index, "Insertion point clamped");
                self.insertion_point = Some(InsertionPoint::new(point.parent, index));
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::TransactionLog;

    #[test]
    fn test_session_creation() {
        let session = EditSession::new("client-1");

        assert_eq!(session.id, "client-1");
        assert_eq!(session.document().node_count(), 1);
        assert_eq!(session.document().get(session.document().root()).unwrap().tag(), "window");
        assert!(!session.is_dirty());
        assert!(session.path().is_none());
    }

    #[test]
    fn test_insertion_point_requires_selection() {
        let mut session = EditSession::new("client-1");
        assert!(matches!(session.insertion_point(), Err(EditorError::NoSelection)));

        let root = session.document().root();
        session.set_insertion_point(root, 0).unwrap();
        assert_eq!(session.insertion_point().unwrap(), InsertionPoint::new(root, 0));

        session.clear_insertion_point();
        assert!(session.insertion_point().is_err());
    }

    #[test]
    fn test_insertion_point_is_validated() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();

        assert!(session.set_insertion_point(root, 1).is_err());
        assert!(session.set_insertion_point(NodeId::new(50), 0).is_err());
        assert!(session.insertion_point().is_err());
    }

    #[test]
    fn test_undo_reports_empty_history() {
        let mut session = EditSession::new("client-1");
        assert!(!session.undo().unwrap());
        assert!(!session.redo().unwrap());
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_transactions_mark_dirty() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();
        let create = session.create_element("button", root, 0);
        session.do_transaction(create.into()).unwrap();

        assert!(session.is_dirty());
        assert!(session.undo().unwrap());
        assert!(session.document().children(root).unwrap().is_empty());
    }

    #[test]
    fn test_observed_transaction_unregisters_listener() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();
        let log = Rc::new(TransactionLog::new());
        let listener: Rc<dyn TransactionListener> = log.clone();

        let create = session.create_element("button", root, 0);
        session.do_transaction_observed(create.into(), &listener).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(session.manager().listener_count(), 0);

        session.undo().unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_undo_clamps_insertion_point() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();
        let create = session.create_element("button", root, 0);
        session.do_transaction(create.into()).unwrap();
        session.set_insertion_point(root, 1).unwrap();

        session.undo().unwrap();
        assert_eq!(session.insertion_point().unwrap(), InsertionPoint::new(root, 0));

        // The clamped point is usable right away
        let again = session.create_element("button", root, 0);
        session.do_transaction(again.into()).unwrap();
        assert_eq!(session.document().children(root).unwrap().len(), 1);
    }

    #[test]
    fn test_removed_parent_clears_insertion_point() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();
        let create = session.create_element("box", root, 0);
        let panel = create.node_id();
        session.do_transaction(create.into()).unwrap();
        session.set_insertion_point(panel, 0).unwrap();

        let remove = session.remove_element(panel);
        session.do_transaction(remove).unwrap();
        assert!(matches!(session.insertion_point(), Err(EditorError::NoSelection)));

        // Restoring the parent does not bring the cursor back
        session.undo().unwrap();
        assert!(session.insertion_point().is_err());
    }

    #[test]
    fn test_insertion_point_unaffected_by_failed_transaction() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();
        session.set_insertion_point(root, 0).unwrap();

        let bad = session.create_element("button", root, 9);
        assert!(session.do_transaction(bad.into()).is_err());
        assert_eq!(session.insertion_point().unwrap(), InsertionPoint::new(root, 0));
    }

    #[test]
    fn test_created_node_matches_reserved_id() {
        let mut session = EditSession::new("client-1");
        let root = session.document().root();
        let create = session.create_element("button", root, 0);
        let id = create.node_id();

        let transaction: Transaction = create.into();
        assert_eq!(transaction.created_node(), Some(id));
        session.do_transaction(transaction).unwrap();
        assert!(session.document().contains(id));
    }

    #[test]
    fn test_save_requires_backing_file() {
        let mut session = EditSession::new("client-1");
        assert!(matches!(session.save(), Err(EditorError::NotFileBacked)));
    }

    #[test]
    fn test_custom_options() {
        let options = SessionOptions {
            root_tag: "dialog".to_string(),
            max_undo_levels: 5,
        };
        let session = EditSession::with_options("client-1", options);

        assert_eq!(session.document().get(session.document().root()).unwrap().tag(), "dialog");
        assert_eq!(session.manager().max_levels(), 5);
    }
}
