//! Integration tests for board sessions over a task store.
//!
//! Exercises drag-and-drop through [`BoardSession`] against the in-memory
//! store, including the failure path that reloads the board.
//!
//! Verification command: `cargo test --test board_sync`

use std::sync::Arc;

use taskmeet::board::{
    BoardNotice, BoardSession, ColumnSet, Destination, MemoryTaskStore, StoreError, TaskStore,
    Viewer,
};
use taskmeet_proto::task::{
    Priority, STATUS_DONE, STATUS_IN_PROGRESS, STATUS_TODO, Task, TaskId,
};

async fn open(viewer: Viewer, tasks: Vec<Task>) -> BoardSession<MemoryTaskStore> {
    let store = Arc::new(MemoryTaskStore::new(tasks));
    let mut session = BoardSession::new(store, viewer, ColumnSet::new());
    session.refresh().await.unwrap();
    session
}

fn column_ids(session: &BoardSession<MemoryTaskStore>, column: &str) -> Vec<TaskId> {
    session.board().column_view(column).iter().map(|t| t.id).collect()
}

fn to(column: &str) -> Destination {
    Destination::Column(column.to_string())
}

#[tokio::test]
async fn move_across_columns_persists_status_and_completion() {
    let task = Task::new("Rapor yaz", "ayse");
    let mut session = open(Viewer::admin("yonetici"), vec![task.clone()]).await;

    assert_eq!(
        session.drop_card(task.id, Some(&to(STATUS_DONE))).await.unwrap(),
        BoardNotice::Saved
    );
    let stored = session.store().get(&task.id).unwrap();
    assert_eq!(stored.status, STATUS_DONE);
    assert!(stored.completed);

    assert_eq!(
        session.drop_card(task.id, Some(&to(STATUS_IN_PROGRESS))).await.unwrap(),
        BoardNotice::Saved
    );
    let stored = session.store().get(&task.id).unwrap();
    assert_eq!(stored.status, STATUS_IN_PROGRESS);
    assert!(!stored.completed);
    assert_eq!(session.store().update_calls(), 2);
    assert_eq!(session.store().order_calls(), 0);
}

#[tokio::test]
async fn reorder_survives_reload() {
    let a = Task::new("a", "x");
    let b = Task::new("b", "x");
    let c = Task::new("c", "x");
    let mut session = open(Viewer::admin("boss"), vec![a.clone(), b.clone(), c.clone()]).await;

    session.drop_card(c.id, Some(&Destination::Task(a.id))).await.unwrap();
    assert_eq!(column_ids(&session, STATUS_TODO), vec![c.id, a.id, b.id]);
    assert_eq!(session.store().order_calls(), 1);
    assert_eq!(session.store().update_calls(), 0);

    session.refresh().await.unwrap();
    assert_eq!(column_ids(&session, STATUS_TODO), vec![c.id, a.id, b.id]);
}

#[tokio::test]
async fn priority_still_wins_after_reorder() {
    let low = Task::new("low", "x").with_priority(Priority::Low);
    let high = Task::new("high", "x").with_priority(Priority::High);
    let mut session = open(Viewer::admin("boss"), vec![high.clone(), low.clone()]).await;

    // Dropping the low card onto the high one does not lift it above.
    assert_eq!(
        session.drop_card(low.id, Some(&Destination::Task(high.id))).await.unwrap(),
        BoardNotice::Unchanged
    );
    assert_eq!(column_ids(&session, STATUS_TODO), vec![high.id, low.id]);
    assert_eq!(session.store().order_calls(), 0);
}

#[tokio::test]
async fn saved_order_matches_what_the_board_shows() {
    let high = Task::new("high", "x").with_priority(Priority::High);
    let low1 = Task::new("low1", "x").with_priority(Priority::Low);
    let low2 = Task::new("low2", "x").with_priority(Priority::Low);
    let mut session = open(
        Viewer::admin("boss"),
        vec![low1.clone(), high.clone(), low2.clone()],
    )
    .await;

    session.drop_card(low2.id, Some(&Destination::Task(high.id))).await.unwrap();
    let shown = column_ids(&session, STATUS_TODO);
    assert_eq!(shown, vec![high.id, low2.id, low1.id]);

    let stored = session.store().list_tasks().await.unwrap();
    let stored: Vec<TaskId> = stored.iter().map(|t| t.id).collect();
    assert_eq!(stored, shown);
}

#[tokio::test]
async fn store_failure_rolls_back_and_reports() {
    let task = Task::new("x", "ayse");
    let other = Task::new("y", "ayse").with_status(STATUS_DONE);
    let mut session = open(Viewer::admin("boss"), vec![task.clone(), other.clone()]).await;
    session.store().set_failing(true);

    let notice = session.drop_card(task.id, Some(&to(STATUS_DONE))).await.unwrap();
    assert!(matches!(notice, BoardNotice::Resynced(StoreError::Unavailable(_))));
    assert_eq!(session.board().task(&task.id).unwrap().status, STATUS_TODO);

    let notice = session.drop_card(other.id, Some(&Destination::Task(task.id))).await.unwrap();
    assert!(matches!(notice, BoardNotice::Resynced(_)));
    assert_eq!(session.board().task(&other.id).unwrap().status, STATUS_DONE);

    session.store().set_failing(false);
    assert_eq!(
        session.drop_card(task.id, Some(&to(STATUS_DONE))).await.unwrap(),
        BoardNotice::Saved
    );
}

#[tokio::test]
async fn employee_moves_only_own_cards() {
    let mine = Task::new("mine", "ayse");
    let theirs = Task::new("theirs", "mehmet");
    let mut session = open(Viewer::employee("ayse"), vec![mine.clone(), theirs.clone()]).await;

    assert_eq!(
        session.drop_card(theirs.id, Some(&to(STATUS_DONE))).await.unwrap(),
        BoardNotice::Unchanged
    );
    assert_eq!(
        session.drop_card(theirs.id, Some(&Destination::Task(mine.id))).await.unwrap(),
        BoardNotice::Unchanged
    );
    assert_eq!(session.store().update_calls() + session.store().order_calls(), 0);
    assert_eq!(session.store().get(&theirs.id).unwrap(), theirs);

    assert_eq!(
        session.drop_card(mine.id, Some(&to(STATUS_DONE))).await.unwrap(),
        BoardNotice::Saved
    );
}

#[tokio::test]
async fn task_deleted_elsewhere_then_dropped_is_noop() {
    let task = Task::new("gone soon", "x");
    let keep = Task::new("keep", "x");
    let mut session = open(Viewer::admin("boss"), vec![task.clone(), keep.clone()]).await;

    session.board_mut().begin_drag(task.id);
    session.store().remove(&task.id);
    session.refresh().await.unwrap();

    assert_eq!(
        session.drop_card(task.id, Some(&to(STATUS_DONE))).await.unwrap(),
        BoardNotice::Unchanged
    );
    assert_eq!(session.store().update_calls(), 0);
    assert_eq!(session.store().list_tasks().await.unwrap(), vec![keep]);
}

#[tokio::test]
async fn custom_columns_appear_and_orphans_fall_back() {
    let task = Task::new("qa", "x").with_status("review");
    let mut session = open(Viewer::admin("boss"), vec![task.clone()]).await;

    let names: Vec<&str> = session.board().board_view().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec![STATUS_TODO, STATUS_IN_PROGRESS, STATUS_DONE, "review"]);

    session.board_mut().delete_column("review").unwrap();
    assert_eq!(column_ids(&session, STATUS_TODO), vec![task.id]);
    assert_eq!(session.board().task(&task.id).unwrap().status, "review");

    // Moving it into the column it is shown in rewrites the stored status.
    assert_eq!(
        session.drop_card(task.id, Some(&to(STATUS_TODO))).await.unwrap(),
        BoardNotice::Saved
    );
    assert_eq!(session.store().get(&task.id).unwrap().status, STATUS_TODO);
    session.refresh().await.unwrap();
    assert!(!session.board().columns().contains("review"));
}

#[tokio::test]
async fn card_labels_resolve_through_the_board_palette() {
    let task = Task::new("login form", "x")
        .with_label("frontend")
        .with_label("urgent");
    let session = open(Viewer::admin("boss"), vec![task.clone()]).await;
    session.labels().add("frontend", Some("#1e88e5")).unwrap();

    let card = session.board().task(&task.id).unwrap();
    let resolved = session.labels().resolve(&card.labels);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].name, "frontend");
    assert_eq!(resolved[0].color, "#1e88e5");

    // A label added later applies to cards already on the board.
    session.labels().add("urgent", None).unwrap();
    assert_eq!(session.labels().resolve(&card.labels).len(), 2);
}
