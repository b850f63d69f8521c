use rusqlite::Connection;
use taskboard_core::db::open_db_in_memory;
use taskboard_core::{
    BoardConfig, BoardContext, CapacityLimits, EntityKind, EventType, MoveOutcome, MoveRequest,
    OwnerToken, PositionAssignment, ServiceError, Subscription, TaskDraft, TransferRequest,
};
use uuid::Uuid;

fn setup() -> (Connection, BoardContext) {
    (
        open_db_in_memory().unwrap(),
        BoardContext::new(BoardConfig::default()).unwrap(),
    )
}

fn owner(name: &str) -> OwnerToken {
    OwnerToken::new(name)
}

/// Frames queued on `feed`, handshake pings skipped.
fn drain(feed: &mut Subscription) -> Vec<EventType> {
    let mut kinds = Vec::new();
    while let Some(frame) = feed.try_recv() {
        if frame.event.kind != EventType::Ping {
            kinds.push(frame.event.kind);
        }
    }
    kinds
}

fn assert_not_found(err: ServiceError, kind: EntityKind) {
    match err {
        ServiceError::NotFound { kind: found, .. } => assert_eq!(found, kind.as_str()),
        other => panic!("expected not found, got {other}"),
    }
}

#[test]
fn boards_append_in_creation_order_and_notify_owner() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let mut feed = ctx.hub().subscribe_owner(alice.clone());
    let boards = ctx.board_service(&conn);

    let first = boards.create_board(&alice, "  Roadmap ").unwrap();
    let second = boards.create_board(&alice, "Chores").unwrap();

    assert_eq!(first.name, "Roadmap");
    assert_eq!(first.position, Some(0));
    assert_eq!(second.position, Some(1));
    let listed: Vec<_> = boards
        .list_boards(&alice)
        .unwrap()
        .into_iter()
        .map(|board| board.id)
        .collect();
    assert_eq!(listed, vec![first.id, second.id]);
    assert_eq!(
        drain(&mut feed),
        vec![EventType::BoardsCreated, EventType::BoardsCreated]
    );
}

#[test]
fn blank_names_are_rejected_before_writing() {
    let (conn, ctx) = setup();
    let alice = owner("alice");

    let err = ctx.board_service(&conn).create_board(&alice, "   ").unwrap_err();
    assert!(matches!(err, ServiceError::InvalidName { .. }));
    assert!(ctx.board_service(&conn).list_boards(&alice).unwrap().is_empty());

    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let column = ctx
        .column_service(&conn)
        .create_column(&alice, board.id, "Todo")
        .unwrap();
    let err = ctx
        .task_service(&conn)
        .create_task(&alice, column.id, &TaskDraft::titled(""))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidName { .. }));
}

#[test]
fn other_owners_boards_read_as_not_found() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let mallory = owner("mallory");
    let board = ctx.board_service(&conn).create_board(&alice, "Private").unwrap();
    let column = ctx
        .column_service(&conn)
        .create_column(&alice, board.id, "Todo")
        .unwrap();
    let task = ctx
        .task_service(&conn)
        .create_task(&alice, column.id, &TaskDraft::titled("secret"))
        .unwrap();

    let boards = ctx.board_service(&conn);
    assert_not_found(boards.get_board(&mallory, board.id).unwrap_err(), EntityKind::Board);
    assert_not_found(
        boards.delete_board(&mallory, board.id).unwrap_err(),
        EntityKind::Board,
    );
    assert_not_found(
        ctx.column_service(&conn)
            .create_column(&mallory, board.id, "Sneaky")
            .unwrap_err(),
        EntityKind::Board,
    );
    assert_not_found(
        ctx.task_service(&conn)
            .get_task(&mallory, task.id)
            .unwrap_err(),
        EntityKind::Task,
    );
    assert!(boards.get_board(&alice, board.id).is_ok());
}

#[test]
fn column_move_notifies_board_once_and_skips_unchanged() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let columns = ctx.column_service(&conn);
    let todo = columns.create_column(&alice, board.id, "Todo").unwrap();
    let doing = columns.create_column(&alice, board.id, "Doing").unwrap();
    let done = columns.create_column(&alice, board.id, "Done").unwrap();
    let mut feed = ctx.hub().subscribe_board(board.id);

    let outcome = columns
        .move_column(
            &alice,
            MoveRequest {
                item_id: done.id,
                target_position: 0,
            },
        )
        .unwrap();
    assert_eq!(outcome, MoveOutcome::Moved);

    let outcome = columns
        .move_column(
            &alice,
            MoveRequest {
                item_id: done.id,
                target_position: 0,
            },
        )
        .unwrap();
    assert_eq!(outcome, MoveOutcome::Unchanged);

    let order: Vec<_> = columns
        .list_columns(&alice, board.id)
        .unwrap()
        .into_iter()
        .map(|column| (column.id, column.position))
        .collect();
    assert_eq!(
        order,
        vec![(done.id, Some(0)), (todo.id, Some(1)), (doing.id, Some(2))]
    );
    assert_eq!(drain(&mut feed), vec![EventType::ColumnsChanged]);
}

#[test]
fn deleting_a_column_compacts_siblings_and_removes_its_tasks() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let columns = ctx.column_service(&conn);
    let a = columns.create_column(&alice, board.id, "A").unwrap();
    let b = columns.create_column(&alice, board.id, "B").unwrap();
    let c = columns.create_column(&alice, board.id, "C").unwrap();
    let task = ctx
        .task_service(&conn)
        .create_task(&alice, b.id, &TaskDraft::titled("inside"))
        .unwrap();

    columns.delete_column(&alice, b.id).unwrap();

    let remaining: Vec<_> = columns
        .list_columns(&alice, board.id)
        .unwrap()
        .into_iter()
        .map(|column| (column.id, column.position))
        .collect();
    assert_eq!(remaining, vec![(a.id, Some(0)), (c.id, Some(1))]);
    assert_not_found(
        ctx.task_service(&conn).get_task(&alice, task.id).unwrap_err(),
        EntityKind::Task,
    );
}

#[test]
fn task_delete_compacts_and_returns_the_removed_task() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let column = ctx
        .column_service(&conn)
        .create_column(&alice, board.id, "Todo")
        .unwrap();
    let tasks = ctx.task_service(&conn);
    let ids: Vec<_> = ["t0", "t1", "t2", "t3"]
        .into_iter()
        .map(|title| {
            tasks
                .create_task(&alice, column.id, &TaskDraft::titled(title))
                .unwrap()
                .id
        })
        .collect();
    let mut feed = ctx.hub().subscribe_board(board.id);

    let removed = tasks.delete_task(&alice, ids[1]).unwrap();

    assert_eq!(removed.title, "t1");
    let remaining: Vec<_> = tasks
        .list_tasks(&alice, column.id)
        .unwrap()
        .into_iter()
        .map(|task| (task.id, task.position))
        .collect();
    assert_eq!(
        remaining,
        vec![(ids[0], Some(0)), (ids[2], Some(1)), (ids[3], Some(2))]
    );
    assert_eq!(drain(&mut feed), vec![EventType::TasksChanged]);
}

#[test]
fn transfer_between_boards_notifies_both_boards() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let boards = ctx.board_service(&conn);
    let left = boards.create_board(&alice, "Left").unwrap();
    let right = boards.create_board(&alice, "Right").unwrap();
    let columns = ctx.column_service(&conn);
    let source = columns.create_column(&alice, left.id, "Todo").unwrap();
    let destination = columns.create_column(&alice, right.id, "Todo").unwrap();
    let tasks = ctx.task_service(&conn);
    let moving = tasks
        .create_task(&alice, source.id, &TaskDraft::titled("moving"))
        .unwrap();
    let staying = tasks
        .create_task(&alice, source.id, &TaskDraft::titled("staying"))
        .unwrap();
    tasks
        .create_task(&alice, destination.id, &TaskDraft::titled("resident"))
        .unwrap();
    let mut left_feed = ctx.hub().subscribe_board(left.id);
    let mut right_feed = ctx.hub().subscribe_board(right.id);

    let outcome = tasks
        .transfer_task(
            &alice,
            TransferRequest {
                item_id: moving.id,
                target_scope_id: destination.id,
            },
        )
        .unwrap();

    assert_eq!(outcome, MoveOutcome::Moved);
    let moved = tasks.get_task(&alice, moving.id).unwrap();
    assert_eq!(moved.column_id, destination.id);
    assert_eq!(moved.position, Some(1));
    assert_eq!(tasks.get_task(&alice, staying.id).unwrap().position, Some(0));
    assert_eq!(drain(&mut left_feed), vec![EventType::TasksChanged]);
    assert_eq!(drain(&mut right_feed), vec![EventType::TasksChanged]);
}

#[test]
fn transfer_within_one_board_notifies_it_once() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let columns = ctx.column_service(&conn);
    let todo = columns.create_column(&alice, board.id, "Todo").unwrap();
    let done = columns.create_column(&alice, board.id, "Done").unwrap();
    let tasks = ctx.task_service(&conn);
    let task = tasks
        .create_task(&alice, todo.id, &TaskDraft::titled("ship"))
        .unwrap();
    let mut feed = ctx.hub().subscribe_board(board.id);

    let same = tasks
        .transfer_task(
            &alice,
            TransferRequest {
                item_id: task.id,
                target_scope_id: todo.id,
            },
        )
        .unwrap();
    assert_eq!(same, MoveOutcome::Unchanged);
    assert!(drain(&mut feed).is_empty());

    tasks
        .transfer_task(
            &alice,
            TransferRequest {
                item_id: task.id,
                target_scope_id: done.id,
            },
        )
        .unwrap();
    assert_eq!(drain(&mut feed), vec![EventType::TasksChanged]);
}

#[test]
fn capacity_limits_reject_creation_and_transfer() {
    let conn = open_db_in_memory().unwrap();
    let mut config = BoardConfig::default();
    config.limits = CapacityLimits {
        max_boards_per_owner: 1,
        max_columns_per_board: 2,
        max_tasks_per_column: 1,
    };
    let ctx = BoardContext::new(config).unwrap();
    let alice = owner("alice");

    let board = ctx.board_service(&conn).create_board(&alice, "Only").unwrap();
    let err = ctx.board_service(&conn).create_board(&alice, "Extra").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::CapacityExceeded {
            kind: EntityKind::Board,
            limit: 1,
            ..
        }
    ));

    let columns = ctx.column_service(&conn);
    let todo = columns.create_column(&alice, board.id, "Todo").unwrap();
    let done = columns.create_column(&alice, board.id, "Done").unwrap();
    assert!(matches!(
        columns.create_column(&alice, board.id, "Third").unwrap_err(),
        ServiceError::CapacityExceeded {
            kind: EntityKind::Column,
            ..
        }
    ));

    let tasks = ctx.task_service(&conn);
    let waiting = tasks
        .create_task(&alice, todo.id, &TaskDraft::titled("waiting"))
        .unwrap();
    let finished = tasks
        .create_task(&alice, done.id, &TaskDraft::titled("finished"))
        .unwrap();
    let err = tasks
        .transfer_task(
            &alice,
            TransferRequest {
                item_id: waiting.id,
                target_scope_id: done.id,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::CapacityExceeded {
            kind: EntityKind::Task,
            ..
        }
    ));
    assert_eq!(tasks.get_task(&alice, waiting.id).unwrap().column_id, todo.id);
    assert_eq!(tasks.get_task(&alice, finished.id).unwrap().position, Some(0));
}

#[test]
fn bulk_board_reorder_applies_and_skips_noop() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let boards = ctx.board_service(&conn);
    let a = boards.create_board(&alice, "A").unwrap();
    let b = boards.create_board(&alice, "B").unwrap();
    let c = boards.create_board(&alice, "C").unwrap();
    let mut feed = ctx.hub().subscribe_owner(alice.clone());

    let request = [
        PositionAssignment::new(c.id, 0),
        PositionAssignment::new(a.id, 1),
        PositionAssignment::new(b.id, 2),
    ];
    assert!(boards.reorder_boards(&alice, &request).unwrap());
    assert!(!boards.reorder_boards(&alice, &request).unwrap());

    let order: Vec<_> = boards
        .list_boards(&alice)
        .unwrap()
        .into_iter()
        .map(|board| board.id)
        .collect();
    assert_eq!(order, vec![c.id, a.id, b.id]);
    assert_eq!(drain(&mut feed), vec![EventType::BoardsUpdated]);
}

#[test]
fn bulk_reorder_with_foreign_board_is_rejected() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let bob = owner("bob");
    let boards = ctx.board_service(&conn);
    let mine = boards.create_board(&alice, "Mine").unwrap();
    let theirs = boards.create_board(&bob, "Theirs").unwrap();

    let err = boards
        .reorder_boards(
            &alice,
            &[
                PositionAssignment::new(theirs.id, 0),
                PositionAssignment::new(mine.id, 1),
            ],
        )
        .unwrap_err();
    assert_not_found(err, EntityKind::Board);
    assert_eq!(boards.get_board(&bob, theirs.id).unwrap().position, Some(0));
}

#[test]
fn task_reorder_rewrites_each_column_and_notifies_board_once() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let columns = ctx.column_service(&conn);
    let todo = columns.create_column(&alice, board.id, "Todo").unwrap();
    let done = columns.create_column(&alice, board.id, "Done").unwrap();
    let tasks = ctx.task_service(&conn);
    let t = |column: Uuid, title: &str| {
        tasks
            .create_task(&alice, column, &TaskDraft::titled(title))
            .unwrap()
            .id
    };
    let (a, b) = (t(todo.id, "a"), t(todo.id, "b"));
    let (x, y) = (t(done.id, "x"), t(done.id, "y"));
    let mut feed = ctx.hub().subscribe_board(board.id);

    let changed = tasks
        .reorder_tasks(
            &alice,
            &[
                PositionAssignment::new(b, 0),
                PositionAssignment::new(a, 1),
                PositionAssignment::new(y, 0),
                PositionAssignment::new(x, 1),
            ],
        )
        .unwrap();

    assert!(changed);
    let ids = |column: Uuid| -> Vec<Uuid> {
        tasks
            .list_tasks(&alice, column)
            .unwrap()
            .into_iter()
            .map(|task| task.id)
            .collect()
    };
    assert_eq!(ids(todo.id), vec![b, a]);
    assert_eq!(ids(done.id), vec![y, x]);
    assert_eq!(drain(&mut feed), vec![EventType::TasksChanged]);
}

#[test]
fn task_content_and_completion_updates() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let column = ctx
        .column_service(&conn)
        .create_column(&alice, board.id, "Todo")
        .unwrap();
    let tasks = ctx.task_service(&conn);
    let task = tasks
        .create_task(&alice, column.id, &TaskDraft::titled("draft"))
        .unwrap();

    let due = chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let updated = tasks
        .update_task(
            &alice,
            task.id,
            &TaskDraft {
                title: "final".to_string(),
                description: "details".to_string(),
                completed: false,
                due_date: Some(due),
            },
        )
        .unwrap();
    assert_eq!(updated.title, "final");
    assert_eq!(updated.due_date, Some(due));
    assert_eq!(updated.position, task.position);

    let completed = tasks.set_completed(&alice, task.id, true).unwrap();
    assert!(completed.completed);
    assert_eq!(completed.description, "details");
}

#[test]
fn attachments_are_validated_and_deduplicated() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let board = ctx.board_service(&conn).create_board(&alice, "Board").unwrap();
    let column = ctx
        .column_service(&conn)
        .create_column(&alice, board.id, "Todo")
        .unwrap();
    let tasks = ctx.task_service(&conn);
    let task = tasks
        .create_task(&alice, column.id, &TaskDraft::titled("with files"))
        .unwrap();

    tasks.add_attachment(&alice, task.id, "brief.pdf").unwrap();
    tasks.add_attachment(&alice, task.id, "photo 1.png").unwrap();
    let again = tasks.add_attachment(&alice, task.id, "brief.pdf").unwrap();
    assert_eq!(again.attachments, vec!["brief.pdf", "photo 1.png"]);

    let err = tasks
        .add_attachment(&alice, task.id, "../../etc/passwd")
        .unwrap_err();
    assert!(matches!(err, ServiceError::PathTraversal(_)));
    let err = tasks.add_attachment(&alice, task.id, "  ").unwrap_err();
    assert!(matches!(err, ServiceError::InvalidAttachmentName(_)));

    let removed = tasks.remove_attachment(&alice, task.id, "brief.pdf").unwrap();
    assert_eq!(removed.attachments, vec!["photo 1.png"]);
}

#[test]
fn deleting_a_board_compacts_remaining_boards_and_notifies() {
    let (conn, ctx) = setup();
    let alice = owner("alice");
    let boards = ctx.board_service(&conn);
    let first = boards.create_board(&alice, "First").unwrap();
    let second = boards.create_board(&alice, "Second").unwrap();
    let third = boards.create_board(&alice, "Third").unwrap();
    ctx.column_service(&conn)
        .create_column(&alice, second.id, "Todo")
        .unwrap();
    let mut owner_feed = ctx.hub().subscribe_owner(alice.clone());
    let mut board_feed = ctx.hub().subscribe_board(second.id);

    boards.delete_board(&alice, second.id).unwrap();

    let remaining: Vec<_> = boards
        .list_boards(&alice)
        .unwrap()
        .into_iter()
        .map(|board| (board.id, board.position))
        .collect();
    assert_eq!(remaining, vec![(first.id, Some(0)), (third.id, Some(1))]);
    assert_eq!(drain(&mut owner_feed), vec![EventType::BoardsDeleted]);
    assert_eq!(drain(&mut board_feed), vec![EventType::BoardsDeleted]);
    assert!(!ctx.backfill().is_initialized::<taskboard_core::Columns>(&second.id));
}

#[test]
fn listing_boards_for_unknown_owners_leaves_no_memo_behind() {
    let (conn, ctx) = setup();
    let boards = ctx.board_service(&conn);

    for n in 0..5 {
        assert!(boards
            .list_boards(&owner(&format!("visitor-{n}")))
            .unwrap()
            .is_empty());
    }
    assert_eq!(ctx.backfill().initialized_count(), 0);

    let alice = owner("alice");
    boards.create_board(&alice, "Board").unwrap();
    boards.list_boards(&alice).unwrap();
    assert_eq!(ctx.backfill().initialized_count(), 1);
}
