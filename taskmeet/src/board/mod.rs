//! Kanban board reconciliation.
//!
//! The board mirrors the task store locally, turns drag-and-drop gestures
//! into status and order changes, and applies them optimistically. The
//! [`KanbanReconciler`] is a plain state machine that returns the
//! [`BoardCommand`]s to send; [`BoardSession`] drives it against a
//! [`TaskStore`] and performs the confirm-or-resync loop.

pub mod columns;
pub mod labels;
pub mod reconciler;
pub mod session;
pub mod store;

pub use columns::ColumnSet;
pub use labels::{Label, LabelRegistry};
pub use reconciler::{BoardCommand, Destination, DropOutcome, DropTarget, KanbanReconciler};
pub use session::{BoardNotice, BoardSession};
pub use store::{MemoryTaskStore, StoreError, TaskStore};

use thiserror::Error;

/// Errors returned by board column and label operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    /// Column name is empty after trimming.
    #[error("column name cannot be empty")]
    ColumnNameEmpty,
    /// A column with this name is already on the board.
    #[error("column already exists: {0}")]
    ColumnExists(String),
    /// The column is one of the default statuses.
    #[error("column {0} is protected and cannot be deleted")]
    ProtectedColumn(String),
    /// No column with this name.
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    /// A label with this name (case-insensitive) already exists.
    #[error("label already exists: {0}")]
    LabelExists(String),
    /// Label name is empty after trimming.
    #[error("label name cannot be empty")]
    LabelNameEmpty,
}

/// Which cards a viewer may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Admin view: every card can be moved.
    AllCards,
    /// Employee view: only cards assigned to the viewer.
    OwnCardsOnly,
}

/// The identity and permissions of whoever is looking at the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    /// Identity compared against `Task::assigned_to`.
    pub identity: String,
    /// Card access rule.
    pub scope: AccessScope,
}

impl Viewer {
    /// An admin viewer that may move every card.
    pub fn admin(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            scope: AccessScope::AllCards,
        }
    }

    /// An employee viewer restricted to their own cards.
    pub fn employee(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            scope: AccessScope::OwnCardsOnly,
        }
    }

    /// Returns true if this viewer may move a card assigned to `assignee`.
    #[must_use]
    pub fn may_move(&self, assignee: &str) -> bool {
        match self.scope {
            AccessScope::AllCards => true,
            AccessScope::OwnCardsOnly => self.identity == assignee,
        }
    }
}
