//! Async driver tying a [`KanbanReconciler`] to a [`TaskStore`].

use std::sync::Arc;

use taskmeet_proto::task::TaskId;

use super::{
    BoardCommand, ColumnSet, Destination, DropOutcome, KanbanReconciler, LabelRegistry,
    StoreError, TaskStore, Viewer,
};

/// What happened to a drop once the store was involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardNotice {
    /// The drop changed nothing.
    Unchanged,
    /// The change was applied and confirmed by the store.
    Saved,
    /// The store refused the change; the board was reloaded from the store.
    Resynced(StoreError),
}

/// One open board: local state, labels, and the store behind them.
pub struct BoardSession<S> {
    store: Arc<S>,
    board: KanbanReconciler,
    labels: LabelRegistry,
}

impl<S: TaskStore> BoardSession<S> {
    /// Opens a board for `viewer`. Call [`refresh`](Self::refresh) to load tasks.
    pub fn new(store: Arc<S>, viewer: Viewer, columns: ColumnSet) -> Self {
        Self {
            store,
            board: KanbanReconciler::with_columns(viewer, columns),
            labels: LabelRegistry::new(),
        }
    }

    /// Reloads every task from the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the local board is left untouched.
    pub async fn refresh(&mut self) -> Result<usize, StoreError> {
        let tasks = self.store.list_tasks().await?;
        self.board.resync(tasks);
        Ok(self.board.task_count())
    }

    /// Commits a drop and pushes the resulting change to the store.
    ///
    /// The board is updated before the store is called. If the store
    /// fails, the board is reloaded and the failure is reported as
    /// [`BoardNotice::Resynced`].
    ///
    /// # Errors
    ///
    /// Returns an error only if the reload after a failure also fails; the
    /// board then stays flagged for resync.
    pub async fn drop_card(
        &mut self,
        task_id: TaskId,
        destination: Option<&Destination>,
    ) -> Result<BoardNotice, StoreError> {
        let outcome = self.board.end_drag(task_id, destination);
        let mut next = match outcome {
            DropOutcome::Ignored | DropOutcome::Moved(None) => return Ok(BoardNotice::Unchanged),
            DropOutcome::Reordered(cmd) | DropOutcome::Moved(Some(cmd)) => Some(cmd),
        };

        while let Some(cmd) = next.take() {
            match self.execute(cmd).await {
                Ok(follow_up) => next = follow_up,
                Err(e) => {
                    tracing::warn!(
                        task_id = %task_id,
                        error = %e,
                        "board change failed, resyncing"
                    );
                    self.board.reject_update();
                    self.refresh().await?;
                    return Ok(BoardNotice::Resynced(e));
                }
            }
        }
        Ok(BoardNotice::Saved)
    }

    async fn execute(&mut self, cmd: BoardCommand) -> Result<Option<BoardCommand>, StoreError> {
        match cmd {
            BoardCommand::UpdateTask { task_id, patch } => {
                let stored = self.store.update_task(task_id, patch).await?;
                Ok(self.board.confirm_update(stored))
            }
            BoardCommand::SaveColumnOrder { column, order } => {
                self.store.save_column_order(&column, &order).await?;
                Ok(None)
            }
        }
    }

    /// The local board.
    pub const fn board(&self) -> &KanbanReconciler {
        &self.board
    }

    /// Mutable access for drag previews and column edits.
    pub const fn board_mut(&mut self) -> &mut KanbanReconciler {
        &mut self.board
    }

    /// Shared handle to this board's label palette.
    pub fn labels(&self) -> LabelRegistry {
        self.labels.clone()
    }

    /// The store behind this board.
    pub fn store(&self) -> &S {
        &self.store
    }
}
