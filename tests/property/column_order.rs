//! Property tests for board column ordering and drop reconciliation.
//!
//! Uses proptest to verify:
//! 1. A column's view is sorted by priority, and equal priorities keep
//!    load order.
//! 2. Random sequences of drops never lose or duplicate a card, and a
//!    card's `completed` flag always matches its status.
//! 3. A viewer limited to their own cards never produces a command for
//!    someone else's card.
//! 4. Cards whose column was deleted stay visible in the first column and
//!    leave it through an ordinary move.
//! 5. A saved column order is always the order the board shows.

use proptest::prelude::*;
use taskmeet::board::{BoardCommand, Destination, DropOutcome, KanbanReconciler, Viewer};
use taskmeet_proto::task::{
    DEFAULT_STATUSES, Priority, STATUS_DONE, STATUS_IN_PROGRESS, STATUS_TODO, Task,
};

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::High),
        Just(Priority::Medium),
        Just(Priority::Low),
        Just(Priority::None),
    ]
}

fn arb_status() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(STATUS_TODO), Just(STATUS_IN_PROGRESS), Just(STATUS_DONE)]
}

const EXTRA_COLUMNS: [&str; 2] = ["review", "blocked"];

/// Like [`arb_tasks`], but some cards sit in columns that get deleted.
fn arb_tasks_with_extra_columns(max: usize) -> impl Strategy<Value = Vec<Task>> {
    let status = prop_oneof![
        arb_status(),
        Just(EXTRA_COLUMNS[0]),
        Just(EXTRA_COLUMNS[1]),
    ];
    prop::collection::vec((arb_priority(), status), 1..max).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (priority, status))| {
                Task::new(format!("task {i}"), "a")
                    .with_priority(priority)
                    .with_status(status)
            })
            .collect()
    })
}

/// Tasks assigned to "a" or "b" with random priorities and statuses.
fn arb_tasks(max: usize) -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec((arb_priority(), arb_status(), any::<bool>()), 1..max).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (priority, status, mine))| {
                Task::new(format!("task {i}"), if mine { "a" } else { "b" })
                    .with_priority(priority)
                    .with_status(status)
            })
            .collect()
    })
}

/// A drop gesture described by indices into the task list.
#[derive(Debug, Clone)]
enum Gesture {
    ToColumn { card: usize, column: usize },
    OntoCard { card: usize, over: usize },
    Nowhere { card: usize },
}

fn arb_gesture() -> impl Strategy<Value = Gesture> {
    prop_oneof![
        (any::<usize>(), 0..DEFAULT_STATUSES.len())
            .prop_map(|(card, column)| Gesture::ToColumn { card, column }),
        (any::<usize>(), any::<usize>()).prop_map(|(card, over)| Gesture::OntoCard { card, over }),
        any::<usize>().prop_map(|card| Gesture::Nowhere { card }),
    ]
}

fn apply(board: &mut KanbanReconciler, tasks: &[Task], gesture: &Gesture) -> DropOutcome {
    let pick = |i: usize| tasks[i % tasks.len()].id;
    match gesture {
        Gesture::ToColumn { card, column } => board.end_drag(
            pick(*card),
            Some(&Destination::Column(DEFAULT_STATUSES[*column].to_string())),
        ),
        Gesture::OntoCard { card, over } => {
            board.end_drag(pick(*card), Some(&Destination::Task(pick(*over))))
        }
        Gesture::Nowhere { card } => board.end_drag(pick(*card), None),
    }
}

fn assert_sorted_by_priority(board: &KanbanReconciler) {
    for (column, tasks) in board.board_view() {
        for pair in tasks.windows(2) {
            assert!(
                pair[0].priority <= pair[1].priority,
                "column {column} out of priority order: {:?} before {:?}",
                pair[0].priority,
                pair[1].priority
            );
        }
    }
}

proptest! {
    #[test]
    fn view_is_priority_then_load_order(tasks in arb_tasks(30)) {
        let mut board = KanbanReconciler::new(Viewer::admin("boss"));
        board.resync(tasks.clone());

        for status in DEFAULT_STATUSES {
            let view: Vec<_> = board.column_view(status).iter().map(|t| t.id).collect();
            let mut expected: Vec<(usize, &Task)> = tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| t.status == status)
                .collect();
            // Stable sort keeps load order among equal priorities.
            expected.sort_by_key(|(_, t)| t.priority);
            let expected: Vec<_> = expected.into_iter().map(|(_, t)| t.id).collect();
            prop_assert_eq!(view, expected);
        }
    }

    #[test]
    fn random_drops_keep_every_card_once(
        tasks in arb_tasks(12),
        gestures in prop::collection::vec(arb_gesture(), 0..40),
    ) {
        let mut board = KanbanReconciler::new(Viewer::admin("boss"));
        board.resync(tasks.clone());

        for gesture in &gestures {
            apply(&mut board, &tasks, gesture);
            assert_sorted_by_priority(&board);

            let mut shown: Vec<_> = board
                .board_view()
                .into_iter()
                .flat_map(|(_, col)| col.into_iter().map(|t| t.id))
                .collect();
            shown.sort();
            let mut all: Vec<_> = tasks.iter().map(|t| t.id).collect();
            all.sort();
            prop_assert_eq!(shown, all);

            for task in &tasks {
                let local = board.task(&task.id).unwrap();
                prop_assert_eq!(local.completed, local.status == STATUS_DONE);
            }
        }
    }

    #[test]
    fn employee_never_commands_foreign_cards(
        tasks in arb_tasks(12),
        gestures in prop::collection::vec(arb_gesture(), 0..40),
    ) {
        let mut board = KanbanReconciler::new(Viewer::employee("a"));
        board.resync(tasks.clone());

        for gesture in &gestures {
            let card = match gesture {
                Gesture::ToColumn { card, .. }
                | Gesture::OntoCard { card, .. }
                | Gesture::Nowhere { card } => &tasks[card % tasks.len()],
            };
            let before = board.task(&card.id).cloned();
            let outcome = apply(&mut board, &tasks, gesture);

            if card.assigned_to != "a" {
                prop_assert_eq!(&outcome, &DropOutcome::Ignored);
                prop_assert_eq!(board.task(&card.id).cloned(), before);
            }
            if let Some(BoardCommand::UpdateTask { task_id, .. }) = outcome.command() {
                prop_assert_eq!(board.task(task_id).unwrap().assigned_to.as_str(), "a");
            }
        }
    }

    #[test]
    fn dropping_on_nothing_never_changes_anything(tasks in arb_tasks(12), card in any::<usize>()) {
        let mut board = KanbanReconciler::new(Viewer::admin("boss"));
        board.resync(tasks.clone());
        let before: Vec<Vec<_>> = board
            .board_view()
            .into_iter()
            .map(|(_, col)| col.into_iter().cloned().collect())
            .collect();

        let outcome = apply(&mut board, &tasks, &Gesture::Nowhere { card });

        prop_assert_eq!(outcome, DropOutcome::Ignored);
        let after: Vec<Vec<_>> = board
            .board_view()
            .into_iter()
            .map(|(_, col)| col.into_iter().cloned().collect())
            .collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(board.pending_updates(), 0);
    }

    #[test]
    fn orphaned_cards_stay_visible_and_can_leave(
        tasks in arb_tasks_with_extra_columns(12),
        target in 0..DEFAULT_STATUSES.len(),
    ) {
        let mut board = KanbanReconciler::new(Viewer::admin("boss"));
        board.resync(tasks.clone());
        for column in EXTRA_COLUMNS {
            if board.columns().contains(column) {
                board.delete_column(column).unwrap();
            }
        }

        let first: Vec<_> = board.column_view(STATUS_TODO).iter().map(|t| t.id).collect();
        let shown: usize = board.board_view().iter().map(|(_, col)| col.len()).sum();
        prop_assert_eq!(shown, tasks.len());

        let column = DEFAULT_STATUSES[target];
        for task in tasks.iter().filter(|t| EXTRA_COLUMNS.contains(&t.status.as_str())) {
            prop_assert!(first.contains(&task.id));
            let outcome = board.end_drag(task.id, Some(&Destination::Column(column.to_string())));
            prop_assert!(matches!(outcome, DropOutcome::Moved(Some(_))));
            let local = board.task(&task.id).unwrap();
            prop_assert_eq!(local.status.as_str(), column);
            prop_assert_eq!(local.completed, column == STATUS_DONE);
        }
    }

    #[test]
    fn saved_order_is_the_visible_order(
        tasks in arb_tasks(12),
        gestures in prop::collection::vec(arb_gesture(), 0..40),
    ) {
        let mut board = KanbanReconciler::new(Viewer::admin("boss"));
        board.resync(tasks.clone());

        for gesture in &gestures {
            if let DropOutcome::Reordered(BoardCommand::SaveColumnOrder { column, order }) =
                apply(&mut board, &tasks, gesture)
            {
                let shown: Vec<_> = board.column_view(&column).iter().map(|t| t.id).collect();
                prop_assert_eq!(order, shown);
            }
        }
    }
}
