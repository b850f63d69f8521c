use rusqlite::{params, Connection};
use std::sync::{Arc, Barrier};
use std::thread;
use taskboard_core::db::{open_db, open_db_in_memory};
use taskboard_core::{
    BackfillOutcome, Boards, Columns, LegacyPositionBackfill, OwnerToken, PositionLedger,
    ReorderEngine, Tasks,
};
use uuid::Uuid;

const OWNER: &str = "legacy-owner";

fn insert_legacy_board(conn: &Connection, name: &str, position: Option<i64>) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT OR IGNORE INTO owners (owner_token) VALUES (?1);",
        [OWNER],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO boards (board_uuid, owner_token, name, position) VALUES (?1, ?2, ?3, ?4);",
        params![id.to_string(), OWNER, name, position],
    )
    .unwrap();
    id
}

fn insert_legacy_column(conn: &Connection, board: Uuid, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO board_columns (column_uuid, board_uuid, name) VALUES (?1, ?2, ?3);",
        params![id.to_string(), board.to_string(), name],
    )
    .unwrap();
    id
}

fn insert_legacy_task(conn: &Connection, column: Uuid, title: &str) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO tasks (task_uuid, column_uuid, title) VALUES (?1, ?2, ?3);",
        params![id.to_string(), column.to_string(), title],
    )
    .unwrap();
    id
}

fn board_positions(conn: &Connection) -> Vec<(String, Option<i64>)> {
    let mut stmt = conn
        .prepare(
            "SELECT name, position FROM boards
             WHERE owner_token = ?1
             ORDER BY position IS NULL ASC, position ASC;",
        )
        .unwrap();
    let rows = stmt
        .query_map([OWNER], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.map(Result::unwrap).collect()
}

fn task_positions(conn: &Connection, column: Uuid) -> Vec<(String, Option<i64>)> {
    let mut stmt = conn
        .prepare(
            "SELECT title, position FROM tasks
             WHERE column_uuid = ?1
             ORDER BY position IS NULL ASC, position ASC;",
        )
        .unwrap();
    let rows = stmt
        .query_map([column.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.map(Result::unwrap).collect()
}

#[test]
fn backfill_orders_by_name_case_insensitively() {
    let conn = open_db_in_memory().unwrap();
    insert_legacy_board(&conn, "charlie", None);
    insert_legacy_board(&conn, "Alpha", None);
    insert_legacy_board(&conn, "bravo", None);

    let backfill = LegacyPositionBackfill::new();
    let engine: ReorderEngine<Boards> = ReorderEngine::new(PositionLedger::new(0));
    let outcome = backfill
        .ensure(&conn, &engine, &OwnerToken::new(OWNER))
        .unwrap();

    assert_eq!(outcome, BackfillOutcome::Backfilled { assigned: 3 });
    assert_eq!(
        board_positions(&conn),
        vec![
            ("Alpha".to_string(), Some(0)),
            ("bravo".to_string(), Some(1)),
            ("charlie".to_string(), Some(2)),
        ]
    );
}

#[test]
fn backfill_places_legacy_rows_after_existing_positions() {
    let conn = open_db_in_memory().unwrap();
    insert_legacy_board(&conn, "kept-0", Some(0));
    insert_legacy_board(&conn, "kept-1", Some(1));
    insert_legacy_board(&conn, "zulu", None);
    insert_legacy_board(&conn, "echo", None);

    let backfill = LegacyPositionBackfill::new();
    let engine: ReorderEngine<Boards> = ReorderEngine::new(PositionLedger::new(0));
    backfill
        .ensure(&conn, &engine, &OwnerToken::new(OWNER))
        .unwrap();

    assert_eq!(
        board_positions(&conn),
        vec![
            ("kept-0".to_string(), Some(0)),
            ("kept-1".to_string(), Some(1)),
            ("echo".to_string(), Some(2)),
            ("zulu".to_string(), Some(3)),
        ]
    );
}

#[test]
fn backfill_runs_once_per_scope() {
    let conn = open_db_in_memory().unwrap();
    let board = insert_legacy_board(&conn, "Board", Some(0));
    let column = insert_legacy_column(&conn, board, "Todo");
    insert_legacy_task(&conn, column, "b");
    insert_legacy_task(&conn, column, "a");

    let backfill = LegacyPositionBackfill::new();
    let engine: ReorderEngine<Tasks> = ReorderEngine::new(PositionLedger::new(0));
    assert_eq!(
        backfill.ensure(&conn, &engine, &column).unwrap(),
        BackfillOutcome::Backfilled { assigned: 2 }
    );
    assert!(backfill.is_initialized::<Tasks>(&column));

    // Rows written behind the memo's back stay untouched until the memo is dropped.
    insert_legacy_task(&conn, column, "c");
    assert_eq!(
        backfill.ensure(&conn, &engine, &column).unwrap(),
        BackfillOutcome::AlreadyInitialized
    );
    assert_eq!(task_positions(&conn, column)[2], ("c".to_string(), None));

    backfill.forget::<Tasks>(&column);
    assert_eq!(
        backfill.ensure(&conn, &engine, &column).unwrap(),
        BackfillOutcome::Backfilled { assigned: 1 }
    );
    assert_eq!(
        task_positions(&conn, column),
        vec![
            ("a".to_string(), Some(0)),
            ("b".to_string(), Some(1)),
            ("c".to_string(), Some(2)),
        ]
    );
}

#[test]
fn backfill_of_fully_positioned_scope_assigns_nothing() {
    let conn = open_db_in_memory().unwrap();
    let board = insert_legacy_board(&conn, "Board", Some(0));

    let backfill = LegacyPositionBackfill::new();
    let engine: ReorderEngine<Columns> = ReorderEngine::new(PositionLedger::new(1));
    assert_eq!(
        backfill.ensure(&conn, &engine, &board).unwrap(),
        BackfillOutcome::Backfilled { assigned: 0 }
    );
    assert_eq!(backfill.initialized_count(), 1);
}

#[test]
fn backfill_memo_keys_are_per_kind() {
    let conn = open_db_in_memory().unwrap();
    let board = insert_legacy_board(&conn, "Board", None);
    let column = insert_legacy_column(&conn, board, "Todo");

    let backfill = LegacyPositionBackfill::new();
    let columns: ReorderEngine<Columns> = ReorderEngine::new(PositionLedger::new(0));
    backfill.ensure(&conn, &columns, &board).unwrap();

    assert!(backfill.is_initialized::<Columns>(&board));
    assert!(!backfill.is_initialized::<Tasks>(&column));
    assert!(!backfill.is_initialized::<Boards>(&OwnerToken::new(OWNER)));
}

#[test]
fn concurrent_callers_backfill_a_scope_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    let column = {
        let conn = open_db(&path).unwrap();
        let board = insert_legacy_board(&conn, "Board", Some(0));
        let column = insert_legacy_column(&conn, board, "Todo");
        for title in ["delta", "Alpha", "charlie", "bravo", "echo"] {
            insert_legacy_task(&conn, column, title);
        }
        column
    };

    let backfill = Arc::new(LegacyPositionBackfill::new());
    let engine: ReorderEngine<Tasks> = ReorderEngine::new(PositionLedger::new(0));
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let backfill = Arc::clone(&backfill);
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                barrier.wait();
                backfill.ensure(&conn, &engine, &column).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<BackfillOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let backfilled = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, BackfillOutcome::Backfilled { .. }))
        .count();
    assert_eq!(backfilled, 1);
    assert!(outcomes.contains(&BackfillOutcome::Backfilled { assigned: 5 }));

    let conn = open_db(&path).unwrap();
    let titles: Vec<(String, Option<i64>)> = task_positions(&conn, column);
    assert_eq!(
        titles,
        vec![
            ("Alpha".to_string(), Some(0)),
            ("bravo".to_string(), Some(1)),
            ("charlie".to_string(), Some(2)),
            ("delta".to_string(), Some(3)),
            ("echo".to_string(), Some(4)),
        ]
    );
}

#[test]
fn unknown_scopes_are_not_remembered() {
    let conn = open_db_in_memory().unwrap();
    let backfill = LegacyPositionBackfill::new();
    let boards: ReorderEngine<Boards> = ReorderEngine::new(PositionLedger::new(0));
    let tasks: ReorderEngine<Tasks> = ReorderEngine::new(PositionLedger::new(0));

    for n in 0..3 {
        let stranger = OwnerToken::new(format!("stranger-{n}"));
        assert_eq!(
            backfill.ensure(&conn, &boards, &stranger).unwrap(),
            BackfillOutcome::ScopeMissing
        );
        assert!(!backfill.is_initialized::<Boards>(&stranger));
    }
    assert_eq!(
        backfill.ensure(&conn, &tasks, &Uuid::new_v4()).unwrap(),
        BackfillOutcome::ScopeMissing
    );
    assert_eq!(backfill.initialized_count(), 0);

    // Once the owner exists the scope is backfilled and remembered.
    insert_legacy_board(&conn, "Board", None);
    let owner = OwnerToken::new(OWNER);
    assert_eq!(
        backfill.ensure(&conn, &boards, &owner).unwrap(),
        BackfillOutcome::Backfilled { assigned: 1 }
    );
    assert_eq!(backfill.initialized_count(), 1);
}
