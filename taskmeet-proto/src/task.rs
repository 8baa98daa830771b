//! Board task model shared by the client and the task store.
//!
//! A [`Task`] lives in exactly one status column. The column names are
//! dynamic strings; three of them ([`STATUS_TODO`], [`STATUS_IN_PROGRESS`],
//! [`STATUS_DONE`]) always exist and cannot be removed from a board.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default column for new and unclassified work.
pub const STATUS_TODO: &str = "to-do";

/// Default column for work that has been started.
pub const STATUS_IN_PROGRESS: &str = "in-progress";

/// Terminal column. A task is `completed` iff it sits here.
pub const STATUS_DONE: &str = "done";

/// The protected default columns, in board order.
pub const DEFAULT_STATUSES: [&str; 3] = [STATUS_TODO, STATUS_IN_PROGRESS, STATUS_DONE];

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority. Only affects ordering inside a column.
///
/// The derived `Ord` puts `High` first, so sorting ascending yields the
/// visual order of a column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Rendered at the top of its column.
    High,
    /// Between high and low.
    Medium,
    /// Above unprioritized tasks.
    Low,
    /// No priority set.
    #[default]
    None,
}

impl Priority {
    /// Parses the lowercase name used by the task store.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A task as held by the task store and mirrored on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Short display title.
    pub title: String,
    /// Column name. A blank status is treated as the board's first column.
    pub status: String,
    /// Identity of the responsible participant.
    pub assigned_to: String,
    /// Intra-column sort key.
    pub priority: Priority,
    /// Derived from `status`: true iff the task is in [`STATUS_DONE`].
    pub completed: bool,
    /// Label names, resolved against the board's label registry.
    pub labels: Vec<String>,
}

impl Task {
    /// Creates a task in the to-do column with no priority and no labels.
    #[must_use]
    pub fn new(title: impl Into<String>, assigned_to: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            title: title.into(),
            status: STATUS_TODO.to_string(),
            assigned_to: assigned_to.into(),
            priority: Priority::None,
            completed: false,
            labels: Vec::new(),
        }
    }

    /// Builder: sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder: sets the status and keeps `completed` consistent with it.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self.completed = self.status == STATUS_DONE;
        self
    }

    /// Builder: attaches a label name.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(status) = &patch.status {
            self.status.clone_from(status);
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

/// Partial task update sent to the task store.
///
/// Only the fields the board is allowed to change are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New column name, if changed.
    pub status: Option<String>,
    /// New completion flag, if changed.
    pub completed: Option<bool>,
}

impl TaskPatch {
    /// Builds the patch for a move into `status`, deriving `completed`.
    #[must_use]
    pub fn move_to(status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            completed: Some(status == STATUS_DONE),
        }
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none() && self.completed.is_none()
    }
}
