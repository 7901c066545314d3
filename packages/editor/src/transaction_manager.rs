//! # Transaction Manager
//!
//! Executes transactions and tracks them for undo/redo.
//!
//! ## Design
//!
//! - `do_transaction` prepares and executes, then pushes onto the undo stack
//! - Undo reverts the top transaction and moves it to the redo stack
//! - Redo re-applies it and moves it back
//! - New transactions clear the redo stack
//! - A failed transaction leaves both stacks untouched
//! - Listeners are held weakly and notified once per successful top-level call
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut manager = TransactionManager::new();
//! let mut doc = Document::new("window");
//!
//! let root = doc.root();
//! let txn = Transaction::create_element(&mut doc, "button", root, 0);
//! manager.do_transaction(txn, &mut doc)?;
//!
//! manager.undo_transaction(&mut doc)?;
//! manager.redo_transaction(&mut doc)?;
//! ```

use crate::document::Document;
use crate::listener::{Operation, TransactionListener};
use crate::transaction::{Transaction, TransactionError};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Which history stack an operation drew from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Undo,
    Redo,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Undo => f.write_str("undo"),
            StackKind::Redo => f.write_str("redo"),
        }
    }
}

/// Handle returned by [`TransactionManager::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Undo/redo history plus listener registry
#[derive(Debug)]
pub struct TransactionManager {
    /// Executed transactions (most recent last)
    undo_stack: Vec<Transaction>,

    /// Undone transactions (most recent last)
    redo_stack: Vec<Transaction>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    listeners: Vec<(ListenerId, Weak<dyn TransactionListener>)>,
    next_listener_id: u64,
}

impl TransactionManager {
    /// Create a manager with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Prepare and execute a transaction, recording it for undo
    pub fn do_transaction(
        &mut self,
        mut transaction: Transaction,
        doc: &mut Document,
    ) -> Result<(), TransactionError> {
        let result = transaction
            .prepare(doc)
            .and_then(|()| transaction.execute(doc));
        if let Err(e) = result {
            warn!(transaction = transaction.name(), error = %e, "Transaction failed");
            return Err(e);
        }

        debug!(
            transaction = transaction.name(),
            description = transaction.description(),
            "Transaction applied"
        );
        self.notify(Operation::Do, &transaction);
        self.undo_stack.push(transaction);

        // Trim if exceeded max levels
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // New action invalidates the future
        self.redo_stack.clear();
        Ok(())
    }

    /// Undo the most recent transaction
    pub fn undo_transaction(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        let mut transaction = self
            .undo_stack
            .pop()
            .ok_or(TransactionError::EmptyStack(StackKind::Undo))?;

        if let Err(e) = transaction.undo(doc) {
            warn!(transaction = transaction.name(), error = %e, "Undo failed");
            self.undo_stack.push(transaction);
            return Err(e);
        }

        debug!(transaction = transaction.name(), "Transaction undone");
        self.notify(Operation::Undo, &transaction);
        self.redo_stack.push(transaction);
        Ok(())
    }

    /// Redo the most recently undone transaction
    pub fn redo_transaction(&mut self, doc: &mut Document) -> Result<(), TransactionError> {
        let mut transaction = self
            .redo_stack
            .pop()
            .ok_or(TransactionError::EmptyStack(StackKind::Redo))?;

        if let Err(e) = transaction.redo(doc) {
            warn!(transaction = transaction.name(), error = %e, "Redo failed");
            self.redo_stack.push(transaction);
            return Err(e);
        }

        debug!(transaction = transaction.name(), "Transaction redone");
        self.notify(Operation::Redo, &transaction);
        self.undo_stack.push(transaction);
        Ok(())
    }

    /// Register a listener; the manager keeps only a weak reference
    pub fn add_listener(&mut self, listener: &Rc<dyn TransactionListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Rc::downgrade(listener)));
        id
    }

    /// Unregister a listener, returning whether it was registered
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        self.listeners.len() != before
    }

    /// Register a listener for the lifetime of the returned guard
    ///
    /// The guard derefs to the manager and unregisters the listener when
    /// dropped, including on early returns and error paths.
    pub fn scoped_listener(&mut self, listener: &Rc<dyn TransactionListener>) -> ScopedListener<'_> {
        let id = self.add_listener(listener);
        ScopedListener { manager: self, id }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify(&mut self, operation: Operation, transaction: &Transaction) {
        self.listeners.retain(|(_, listener)| listener.strong_count() > 0);
        for (_, listener) in &self.listeners {
            if let Some(listener) = listener.upgrade() {
                listener.on_transaction(operation, transaction);
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Description of the next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().and_then(Transaction::description)
    }

    /// Description of the next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().and_then(Transaction::description)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener registration bound to a scope
pub struct ScopedListener<'a> {
    manager: &'a mut TransactionManager,
    id: ListenerId,
}

impl ScopedListener<'_> {
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Deref for ScopedListener<'_> {
    type Target = TransactionManager;

    fn deref(&self) -> &TransactionManager {
        &*self.manager
    }
}

impl DerefMut for ScopedListener<'_> {
    fn deref_mut(&mut self) -> &mut TransactionManager {
        &mut *self.manager
    }
}

impl Drop for ScopedListener<'_> {
    fn drop(&mut self) {
        self.manager.remove_listener(self.id);
    }
}
