//! CLI smoke entry point.
//!
//! # Responsibility
//! - Run one create/move/transfer cycle on an in-memory board and print the
//!   dirty events a subscriber would receive, in wire format.
//!
//! Usage: `taskboard_cli [LOG_DIR]`. Without a log directory logging stays off.

use log::info;
use taskboard_core::db::open_db_in_memory;
use taskboard_core::{
    init_logging, BoardConfig, BoardContext, MoveRequest, OwnerToken, Subscription, TaskDraft,
    TransferRequest,
};

fn main() {
    println!("taskboard_cli version={}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run() {
        eprintln!("smoke run failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = BoardConfig::default();
    config.logging.log_dir = std::env::args().nth(1);
    init_logging(&config.logging)?;

    let ctx = BoardContext::new(config)?;
    let conn = open_db_in_memory()?;
    let owner = OwnerToken::new("smoke-owner");

    let mut owner_feed = ctx.hub().subscribe_owner(owner.clone());
    let board = ctx.board_service(&conn).create_board(&owner, "Smoke")?;
    let mut board_feed = ctx.hub().subscribe_board(board.id);

    let columns = ctx.column_service(&conn);
    let todo = columns.create_column(&owner, board.id, "Todo")?;
    let done = columns.create_column(&owner, board.id, "Done")?;
    columns.move_column(
        &owner,
        MoveRequest {
            item_id: done.id,
            target_position: 0,
        },
    )?;

    let tasks = ctx.task_service(&conn);
    let first = tasks.create_task(&owner, todo.id, &TaskDraft::titled("first"))?;
    tasks.create_task(&owner, todo.id, &TaskDraft::titled("second"))?;
    tasks.transfer_task(
        &owner,
        TransferRequest {
            item_id: first.id,
            target_scope_id: done.id,
        },
    )?;

    for column in columns.list_columns(&owner, board.id)? {
        let titles: Vec<String> = tasks
            .list_tasks(&owner, column.id)?
            .into_iter()
            .map(|task| format!("{}@{}", task.title, task.position.unwrap_or(-1)))
            .collect();
        println!(
            "column {}@{}: [{}]",
            column.name,
            column.position.unwrap_or(-1),
            titles.join(", ")
        );
    }

    print_frames("owner", &mut owner_feed)?;
    print_frames("board", &mut board_feed)?;
    info!("event=cli_smoke module=cli status=ok board={}", board.id);
    Ok(())
}

fn print_frames(label: &str, feed: &mut Subscription) -> Result<(), Box<dyn std::error::Error>> {
    while let Some(frame) = feed.try_recv() {
        print!("[{label}] {}", frame.encode()?);
    }
    Ok(())
}
