//! Task store abstraction.
//!
//! The board never owns task data. It reads and writes through a
//! [`TaskStore`], which may be a remote service or the in-process
//! [`MemoryTaskStore`] used by the CLI demo and tests.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use taskmeet_proto::task::{Task, TaskId, TaskPatch};

/// Errors reported by a task store.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// No task with this id.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The store could not be reached.
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the change.
    #[error("update rejected: {0}")]
    Rejected(String),
}

/// Async access to the authoritative task list.
pub trait TaskStore: Send + Sync {
    /// Fetch every task, in the store's order.
    fn list_tasks(&self) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Apply a partial update and return the stored task.
    fn update_task(
        &self,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> impl std::future::Future<Output = Result<Task, StoreError>> + Send;

    /// Persist the order of the tasks in one column.
    fn save_column_order(
        &self,
        column: &str,
        order: &[TaskId],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Default)]
struct MemoryInner {
    tasks: Vec<Task>,
    failing: bool,
    update_calls: usize,
    order_calls: usize,
}

/// In-process task store.
///
/// Can be switched into a failing mode to exercise the resync path.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryTaskStore {
    /// Creates a store seeded with `tasks`.
    #[must_use]
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                tasks,
                ..MemoryInner::default()
            }),
        }
    }

    /// Makes every following write fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Adds a task as if another client created it.
    pub fn insert(&self, task: Task) {
        self.inner.lock().tasks.push(task);
    }

    /// Removes a task as if another client deleted it.
    pub fn remove(&self, task_id: &TaskId) -> Option<Task> {
        let mut inner = self.inner.lock();
        let idx = inner.tasks.iter().position(|t| t.id == *task_id)?;
        Some(inner.tasks.remove(idx))
    }

    /// Snapshot of a stored task.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.iter().find(|t| t.id == *task_id).cloned()
    }

    /// Number of `update_task` calls received, including failed ones.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.inner.lock().update_calls
    }

    /// Number of `save_column_order` calls received, including failed ones.
    #[must_use]
    pub fn order_calls(&self) -> usize {
        self.inner.lock().order_calls
    }
}

impl TaskStore for MemoryTaskStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.inner.lock().tasks.clone())
    }

    async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut inner = self.inner.lock();
        inner.update_calls += 1;
        if inner.failing {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(StoreError::NotFound(task_id))?;
        task.apply(&patch);
        Ok(task.clone())
    }

    async fn save_column_order(&self, column: &str, order: &[TaskId]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.order_calls += 1;
        if inner.failing {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }

        // Rewrite the slots held by the listed tasks so they read back in
        // the saved order. Other tasks keep their positions.
        let wanted: HashSet<TaskId> = order.iter().copied().collect();
        let slots: Vec<usize> = inner
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| wanted.contains(&t.id))
            .map(|(i, _)| i)
            .collect();
        let mut by_id: HashMap<TaskId, Task> = slots
            .iter()
            .filter_map(|&i| inner.tasks.get(i).map(|t| (t.id, t.clone())))
            .collect();
        let ordered: Vec<Task> = order.iter().filter_map(|id| by_id.remove(id)).collect();
        for (slot, task) in slots.into_iter().zip(ordered) {
            if let Some(entry) = inner.tasks.get_mut(slot) {
                *entry = task;
            }
        }
        tracing::trace!(column = %column, tasks = order.len(), "column order saved");
        Ok(())
    }
}
