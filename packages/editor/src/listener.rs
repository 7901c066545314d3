use crate::transaction::Transaction;
use serde::Serialize;
use std::cell::RefCell;

/// Manager operation a listener is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Do,
    Undo,
    Redo,
}

/// Observer of transactions run through a [`TransactionManager`]
///
/// Listeners are held weakly by the manager and called once per top-level
/// operation, after it succeeded. Children of an aggregate are not reported
/// individually.
///
/// [`TransactionManager`]: crate::TransactionManager
pub trait TransactionListener: std::fmt::Debug {
    fn on_transaction(&self, operation: Operation, transaction: &Transaction);
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub operation: Operation,
    pub transaction: &'static str,
    pub description: Option<String>,
}

/// Listener that records every notification it receives
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: RefCell<Vec<LogEntry>>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl TransactionListener for TransactionLog {
    fn on_transaction(&self, operation: Operation, transaction: &Transaction) {
        self.entries.borrow_mut().push(LogEntry {
            operation,
            transaction: transaction.name(),
            description: transaction.description().map(str::to_string),
        });
    }
}
