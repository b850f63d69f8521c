//! Board use-case service.
//!
//! # Responsibility
//! - Create, list, rename, delete and bulk-reorder one owner's boards.
//! - Notify the owner's subscribers with `boards.*` events after commit.
//!
//! # Invariants
//! - An owner's boards stay contiguous from the configured board base.
//! - Board ids of other owners are indistinguishable from missing ones.

use crate::events::event::EventType;
use crate::model::board::{Board, BoardId, EntityKind, Owner, OwnerToken};
use crate::ordering::engine::PositionAssignment;
use crate::ordering::kind::{Columns, Tasks};
use crate::repo::board_repo::SqliteBoardRepository;
use crate::service::context::BoardContext;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::{begin_write, normalize_name};
use log::info;
use rusqlite::Connection;

pub struct BoardService<'a> {
    conn: &'a Connection,
    ctx: &'a BoardContext,
}

impl<'a> BoardService<'a> {
    pub fn new(conn: &'a Connection, ctx: &'a BoardContext) -> Self {
        Self { conn, ctx }
    }

    /// Registers `owner` on first sight and records activity.
    pub fn touch_owner(&self, owner: &OwnerToken) -> ServiceResult<Owner> {
        Ok(SqliteBoardRepository::new(self.conn).touch_owner(owner)?)
    }

    /// Lists the owner's boards by position, backfilling legacy rows first.
    pub fn list_boards(&self, owner: &OwnerToken) -> ServiceResult<Vec<Board>> {
        self.ctx
            .backfill()
            .ensure(self.conn, self.ctx.board_engine(), owner)?;
        Ok(SqliteBoardRepository::new(self.conn).list_boards(owner)?)
    }

    pub fn get_board(&self, owner: &OwnerToken, board: BoardId) -> ServiceResult<Board> {
        owned_board(&SqliteBoardRepository::new(self.conn), owner, board)
    }

    /// Appends a new board at the end of the owner's list.
    pub fn create_board(&self, owner: &OwnerToken, name: &str) -> ServiceResult<Board> {
        let name = normalize_name(name, "board name")?;
        self.touch_owner(owner)?;
        let engine = self.ctx.board_engine();
        self.ctx.backfill().ensure(self.conn, engine, owner)?;

        let tx = begin_write(self.conn)?;
        self.ctx.ensure_capacity(&tx, engine, owner)?;
        let position = engine.append_position(&tx, owner)?;
        let board = SqliteBoardRepository::new(&tx).insert_board(owner, &name, position)?;
        tx.commit()?;

        info!(
            "event=board_create module=service status=ok board={} position={position}",
            board.id
        );
        self.ctx.hub().emit_owner(owner, EventType::BoardsCreated);
        Ok(board)
    }

    pub fn rename_board(
        &self,
        owner: &OwnerToken,
        board: BoardId,
        name: &str,
    ) -> ServiceResult<Board> {
        let name = normalize_name(name, "board name")?;

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        owned_board(&repo, owner, board)?;
        repo.rename_board(board, &name)?;
        let renamed = owned_board(&repo, owner, board)?;
        tx.commit()?;

        info!("event=board_rename module=service status=ok board={board}");
        self.ctx.hub().emit_owner(owner, EventType::BoardsUpdated);
        Ok(renamed)
    }

    /// Deletes the board with its columns and tasks and closes the gap.
    pub fn delete_board(&self, owner: &OwnerToken, board: BoardId) -> ServiceResult<()> {
        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        owned_board(&repo, owner, board)?;
        let column_ids: Vec<_> = repo
            .list_columns(board)?
            .into_iter()
            .map(|column| column.id)
            .collect();
        self.ctx.board_engine().delete_and_compact(&tx, board)?;
        tx.commit()?;

        let backfill = self.ctx.backfill();
        backfill.forget::<Columns>(&board);
        for column in &column_ids {
            backfill.forget::<Tasks>(column);
        }
        info!(
            "event=board_delete module=service status=ok board={board} columns={}",
            column_ids.len()
        );
        let hub = self.ctx.hub();
        hub.emit_owner(owner, EventType::BoardsDeleted);
        // Viewers of the deleted board itself refetch and find it gone.
        hub.emit_board(board, EventType::BoardsDeleted);
        Ok(())
    }

    /// Applies a client-supplied board order. Returns whether anything moved.
    pub fn reorder_boards(
        &self,
        owner: &OwnerToken,
        assignments: &[PositionAssignment],
    ) -> ServiceResult<bool> {
        let engine = self.ctx.board_engine();
        self.ctx.backfill().ensure(self.conn, engine, owner)?;

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        for assignment in assignments {
            owned_board(&repo, owner, assignment.id)?;
        }
        let rewritten = engine.bulk_reorder(&tx, assignments)?;
        tx.commit()?;

        if rewritten.is_empty() {
            return Ok(false);
        }
        info!(
            "event=board_reorder module=service status=ok requested={}",
            assignments.len()
        );
        self.ctx.hub().emit_owner(owner, EventType::BoardsUpdated);
        Ok(true)
    }
}

/// Loads `board` if it exists and belongs to `owner`.
pub(crate) fn owned_board(
    repo: &SqliteBoardRepository<'_>,
    owner: &OwnerToken,
    board: BoardId,
) -> ServiceResult<Board> {
    match repo.get_board(board)? {
        Some(found) if found.owner == *owner => Ok(found),
        _ => Err(ServiceError::not_found(EntityKind::Board, board)),
    }
}
