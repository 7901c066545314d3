//! # Vixen Editor
//!
//! Transactional edit engine for element trees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ palette: commands → aggregate transactions  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ session: document + insertion point         │
//! │  - Build transactions (ids reserved early)  │
//! │  - Scoped listeners per call                │
//! │  - Load/save JSON documents                 │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ transaction manager: do / undo / redo       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ document: arena of element nodes            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Transactions are the only writers**: tree mutators are crate-private
//! 2. **Atomic aggregates**: a failing child rolls back its applied siblings
//! 3. **Stable ids**: redo reuses the ids handed out when a transaction was built
//! 4. **Failed calls leave no trace**: history is untouched when a transaction fails
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vixen_editor::{EditSession, Transaction};
//!
//! let mut session = EditSession::new("main");
//! let root = session.document().root();
//!
//! let button = session.create_element("button", root, 0);
//! let id = button.node_id();
//! let attrs = session.change_attributes(id, ["value", "id"], ["Button 1", "button_1"], false);
//! session.do_transaction(Transaction::aggregate(vec![button.into(), attrs]))?;
//!
//! session.undo()?;
//! ```

mod document;
mod errors;
mod listener;
mod node;
mod palette;
mod session;
mod transaction;
mod transaction_manager;

pub use document::{Document, DocumentRecord, NodeRecord};
pub use errors::EditorError;
pub use listener::{LogEntry, Operation, TransactionListener, TransactionLog};
pub use node::{Attribute, ElementNode, ElementTree, InsertionPoint, NodeId};
pub use palette::Palette;
pub use session::{EditSession, SessionOptions};
pub use transaction::{
    Aggregate, ChangeAttributes, CreateElement, ErrorKind, RemoveElement, Transaction,
    TransactionError, TransactionState,
};
pub use transaction_manager::{ListenerId, ScopedListener, StackKind, TransactionManager};
