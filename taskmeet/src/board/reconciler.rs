//! Drag-and-drop reconciliation for the Kanban board.
//!
//! [`KanbanReconciler`] holds the client-local copy of the board and turns
//! a drop gesture into exactly one of:
//!
//! - nothing at all (no destination, vanished task, or a card the viewer
//!   may not move);
//! - a reorder inside the card's column, reported with the column's full
//!   new order;
//! - a move to another column, reported as a `{status, completed}` patch.
//!
//! Changes are applied locally before the store confirms them. Each task
//! has at most one update in flight; further moves of the same task are
//! applied locally and queued until [`KanbanReconciler::confirm_update`].
//! A failed update leaves the board flagged for a full resync.
//!
//! Visual order inside a column is priority first (high to low), then the
//! order in which cards were loaded or dropped. The sort is recomputed on
//! every view, so moves between columns never carry order information.

use std::collections::{HashMap, VecDeque};

use taskmeet_proto::task::{STATUS_DONE, Task, TaskId, TaskPatch};

use super::{BoardError, ColumnSet, Viewer};

/// Where a card was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Over a column's empty area: append to that column.
    Column(String),
    /// Over another card: take that card's position in its column.
    Task(TaskId),
}

/// A resolved insertion point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    /// Target column name.
    pub column: String,
    /// Index in the column's visual order.
    pub index: usize,
}

/// An external call the board needs made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardCommand {
    /// Persist a status change.
    UpdateTask {
        /// Task to update.
        task_id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Persist the order of one column.
    SaveColumnOrder {
        /// Column name.
        column: String,
        /// Every task of the column in its new order.
        order: Vec<TaskId>,
    },
}

/// Result of [`KanbanReconciler::end_drag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Nothing changed; nothing to send.
    Ignored,
    /// The card moved within its column.
    Reordered(BoardCommand),
    /// The card moved to another column. `None` when its update is queued
    /// behind an earlier in-flight update of the same task.
    Moved(Option<BoardCommand>),
}

impl DropOutcome {
    /// The command to send right now, if any.
    #[must_use]
    pub const fn command(&self) -> Option<&BoardCommand> {
        match self {
            Self::Reordered(cmd) | Self::Moved(Some(cmd)) => Some(cmd),
            Self::Ignored | Self::Moved(None) => None,
        }
    }
}

/// Provisional updates of one task: the one awaiting the store, then the
/// ones waiting their turn.
#[derive(Debug)]
struct Provisional {
    in_flight: TaskPatch,
    queued: VecDeque<TaskPatch>,
}

/// Client-local board state and drop reconciliation.
#[derive(Debug)]
pub struct KanbanReconciler {
    viewer: Viewer,
    columns: ColumnSet,
    tasks: HashMap<TaskId, Task>,
    /// Load/drop sequence number per task; tie-break after priority.
    rank: HashMap<TaskId, u64>,
    next_rank: u64,
    dragging: Option<TaskId>,
    preview: Option<DropTarget>,
    provisional: HashMap<TaskId, Provisional>,
    needs_resync: bool,
}

impl KanbanReconciler {
    /// Creates an empty board with the default columns.
    #[must_use]
    pub fn new(viewer: Viewer) -> Self {
        Self::with_columns(viewer, ColumnSet::new())
    }

    /// Creates an empty board with a preconfigured column set.
    #[must_use]
    pub fn with_columns(viewer: Viewer, columns: ColumnSet) -> Self {
        Self {
            viewer,
            columns,
            tasks: HashMap::new(),
            rank: HashMap::new(),
            next_rank: 0,
            dragging: None,
            preview: None,
            provisional: HashMap::new(),
            needs_resync: false,
        }
    }

    /// Replaces the local copy with the store's authoritative task list.
    ///
    /// Discards every provisional change and clears the resync flag.
    /// Statuses seen on the tasks are added to the column set; a blank
    /// status falls back to the first column.
    pub fn resync(&mut self, tasks: Vec<Task>) {
        self.tasks.clear();
        self.rank.clear();
        self.provisional.clear();
        self.needs_resync = false;
        for task in tasks {
            self.upsert_task(task);
        }
        if let Some(id) = self.dragging
            && !self.tasks.contains_key(&id)
        {
            self.cancel_drag();
        }
        tracing::debug!(tasks = self.tasks.len(), "board resynchronized");
    }

    /// Inserts or replaces a single task, keeping its position if known.
    pub fn upsert_task(&mut self, mut task: Task) {
        self.normalize(&mut task);
        if !self.rank.contains_key(&task.id) {
            let rank = self.bump_rank();
            self.rank.insert(task.id, rank);
        }
        self.tasks.insert(task.id, task);
    }

    /// Removes a task from the local copy.
    pub fn remove_task(&mut self, task_id: &TaskId) -> Option<Task> {
        self.rank.remove(task_id);
        self.provisional.remove(task_id);
        if self.dragging.as_ref() == Some(task_id) {
            self.cancel_drag();
        }
        self.tasks.remove(task_id)
    }

    /// Records the card being dragged. Returns false, and records nothing,
    /// if the task is unknown or the viewer may not move it.
    ///
    /// A new drag replaces any uncommitted one.
    pub fn begin_drag(&mut self, task_id: TaskId) -> bool {
        self.preview = None;
        let movable = self
            .tasks
            .get(&task_id)
            .is_some_and(|t| self.viewer.may_move(&t.assigned_to));
        self.dragging = movable.then_some(task_id);
        movable
    }

    /// Computes the preview insertion point for the card being dragged.
    ///
    /// Never changes task state.
    pub fn drag_over(&mut self, destination: &Destination) -> Option<&DropTarget> {
        let task_id = self.dragging?;
        self.preview = self.resolve(destination);
        if self.preview.is_none() {
            tracing::trace!(task_id = %task_id, "drag over invalid destination");
        }
        self.preview.as_ref()
    }

    /// Abandons the current drag without committing anything.
    pub fn cancel_drag(&mut self) {
        self.dragging = None;
        self.preview = None;
    }

    /// The card currently being dragged.
    #[must_use]
    pub const fn dragging(&self) -> Option<&TaskId> {
        self.dragging.as_ref()
    }

    /// The last preview computed by [`drag_over`](Self::drag_over).
    #[must_use]
    pub const fn preview(&self) -> Option<&DropTarget> {
        self.preview.as_ref()
    }

    /// Commits a drop.
    ///
    /// `destination` is `None` when the card was released over nothing.
    pub fn end_drag(&mut self, task_id: TaskId, destination: Option<&Destination>) -> DropOutcome {
        self.cancel_drag();

        let Some(task) = self.tasks.get(&task_id) else {
            tracing::debug!(task_id = %task_id, "drop of unknown task ignored");
            return DropOutcome::Ignored;
        };
        if !self.viewer.may_move(&task.assigned_to) {
            return DropOutcome::Ignored;
        }
        let Some(target) = destination.and_then(|d| self.resolve(d)) else {
            return DropOutcome::Ignored;
        };

        // An orphaned status shows in the first column but is not in it, so
        // dropping there is a move.
        if target.column == task.status {
            self.reorder(task_id, &target)
        } else {
            self.move_to(task_id, &target.column)
        }
    }

    /// Marks the store's confirmation of the in-flight update for a task.
    ///
    /// Returns the next queued update to send, if any. When nothing else
    /// is queued, `authoritative` replaces the local copy.
    pub fn confirm_update(&mut self, authoritative: Task) -> Option<BoardCommand> {
        let task_id = authoritative.id;
        let Some(entry) = self.provisional.get_mut(&task_id) else {
            self.upsert_task(authoritative);
            return None;
        };
        if let Some(next) = entry.queued.pop_front() {
            entry.in_flight = next.clone();
            return Some(BoardCommand::UpdateTask {
                task_id,
                patch: next,
            });
        }
        self.provisional.remove(&task_id);
        self.upsert_task(authoritative);
        None
    }

    /// Records that an external call failed. Every provisional change is
    /// dropped and local state is no longer trusted until
    /// [`resync`](Self::resync).
    pub fn reject_update(&mut self) {
        self.provisional.clear();
        self.needs_resync = true;
    }

    /// True after a failed external call and before the next resync.
    #[must_use]
    pub const fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Number of tasks with an update awaiting confirmation.
    #[must_use]
    pub fn pending_updates(&self) -> usize {
        self.provisional.len()
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::ColumnExists`] if the name is taken.
    pub fn add_column(&mut self, name: &str) -> Result<(), BoardError> {
        self.columns.add(name)?;
        tracing::info!(column = %name.trim(), "column added");
        Ok(())
    }

    /// Removes a non-default column. Tasks keep their status and show in
    /// the first column until moved.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::ProtectedColumn`] for default statuses, or
    /// [`BoardError::ColumnNotFound`].
    pub fn delete_column(&mut self, name: &str) -> Result<(), BoardError> {
        self.columns.remove(name)?;
        tracing::info!(column = %name, "column deleted");
        Ok(())
    }

    /// The board's columns.
    #[must_use]
    pub const fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// The viewer this board was opened for.
    #[must_use]
    pub const fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Number of tasks on the board.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks of one column in visual order.
    #[must_use]
    pub fn column_view(&self, column: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| self.effective_column(t) == column)
            .collect();
        tasks.sort_by_key(|t| (t.priority, self.rank.get(&t.id).copied().unwrap_or(u64::MAX)));
        tasks
    }

    /// Every column with its tasks, in board order.
    #[must_use]
    pub fn board_view(&self) -> Vec<(&str, Vec<&Task>)> {
        self.columns
            .names()
            .iter()
            .map(|name| (name.as_str(), self.column_view(name)))
            .collect()
    }

    /// Column a task is shown in: its status, or the first column if the
    /// status is not on the board.
    fn effective_column<'a>(&'a self, task: &'a Task) -> &'a str {
        if self.columns.contains(&task.status) {
            &task.status
        } else {
            self.columns.first()
        }
    }

    fn resolve(&self, destination: &Destination) -> Option<DropTarget> {
        match destination {
            Destination::Column(name) => {
                if !self.columns.contains(name) {
                    return None;
                }
                Some(DropTarget {
                    column: name.clone(),
                    index: self.column_view(name).len(),
                })
            }
            Destination::Task(over) => {
                let over_task = self.tasks.get(over)?;
                let column = self.effective_column(over_task).to_string();
                let index = self.column_view(&column).iter().position(|t| t.id == *over)?;
                Some(DropTarget { column, index })
            }
        }
    }

    fn reorder(&mut self, task_id: TaskId, target: &DropTarget) -> DropOutcome {
        let mut order: Vec<TaskId> = self
            .column_view(&target.column)
            .iter()
            .map(|t| t.id)
            .collect();
        let Some(from) = order.iter().position(|id| *id == task_id) else {
            return DropOutcome::Ignored;
        };
        let before = order.clone();
        order.remove(from);
        let (lo, hi) = self.priority_band(&order, task_id);
        order.insert(target.index.clamp(lo, hi), task_id);
        if order == before {
            return DropOutcome::Ignored;
        }

        for id in &order {
            let rank = self.bump_rank();
            self.rank.insert(*id, rank);
        }
        tracing::debug!(
            task_id = %task_id,
            column = %target.column,
            index = target.index,
            "card reordered"
        );
        DropOutcome::Reordered(BoardCommand::SaveColumnOrder {
            column: target.column.clone(),
            order,
        })
    }

    /// Range of insertion indices in `order` that keep `task_id` among the
    /// cards of its own priority.
    fn priority_band(&self, order: &[TaskId], task_id: TaskId) -> (usize, usize) {
        let Some(priority) = self.tasks.get(&task_id).map(|t| t.priority) else {
            return (0, order.len());
        };
        let priority_of = |id: &TaskId| self.tasks.get(id).map(|t| t.priority);
        let lo = order
            .iter()
            .take_while(|id| priority_of(id).is_some_and(|p| p < priority))
            .count();
        let hi = order
            .iter()
            .take_while(|id| priority_of(id).is_some_and(|p| p <= priority))
            .count();
        (lo, hi)
    }

    fn move_to(&mut self, task_id: TaskId, column: &str) -> DropOutcome {
        let patch = TaskPatch::move_to(column);
        let rank = self.bump_rank();
        self.rank.insert(task_id, rank);
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.apply(&patch);
        }
        tracing::debug!(
            task_id = %task_id,
            column = %column,
            done = column == STATUS_DONE,
            "card moved"
        );

        if let Some(entry) = self.provisional.get_mut(&task_id) {
            entry.queued.push_back(patch);
            return DropOutcome::Moved(None);
        }
        self.provisional.insert(
            task_id,
            Provisional {
                in_flight: patch.clone(),
                queued: VecDeque::new(),
            },
        );
        DropOutcome::Moved(Some(BoardCommand::UpdateTask { task_id, patch }))
    }

    fn normalize(&mut self, task: &mut Task) {
        if task.status.trim().is_empty() {
            task.status = self.columns.first().to_string();
        } else {
            self.columns.observe(&task.status);
        }
        task.completed = task.status == STATUS_DONE;
    }

    fn bump_rank(&mut self) -> u64 {
        let rank = self.next_rank;
        self.next_rank += 1;
        rank
    }
}
