//! Column use-case service.
//!
//! # Responsibility
//! - Create, list, rename, move and delete the columns of one board.
//! - Notify the board's subscribers with `columns.changed` after commit.

use crate::events::event::EventType;
use crate::model::board::{BoardId, Column, ColumnId, EntityKind, OwnerToken};
use crate::ordering::engine::MoveOutcome;
use crate::ordering::kind::Tasks;
use crate::repo::board_repo::SqliteBoardRepository;
use crate::service::board_service::owned_board;
use crate::service::context::BoardContext;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::request::MoveRequest;
use crate::service::{begin_write, normalize_name};
use log::info;
use rusqlite::Connection;

pub struct ColumnService<'a> {
    conn: &'a Connection,
    ctx: &'a BoardContext,
}

impl<'a> ColumnService<'a> {
    pub fn new(conn: &'a Connection, ctx: &'a BoardContext) -> Self {
        Self { conn, ctx }
    }

    pub fn list_columns(&self, owner: &OwnerToken, board: BoardId) -> ServiceResult<Vec<Column>> {
        let repo = SqliteBoardRepository::new(self.conn);
        owned_board(&repo, owner, board)?;
        self.ctx
            .backfill()
            .ensure(self.conn, self.ctx.column_engine(), &board)?;
        Ok(repo.list_columns(board)?)
    }

    pub fn create_column(
        &self,
        owner: &OwnerToken,
        board: BoardId,
        name: &str,
    ) -> ServiceResult<Column> {
        let name = normalize_name(name, "column name")?;
        owned_board(&SqliteBoardRepository::new(self.conn), owner, board)?;
        let engine = self.ctx.column_engine();
        self.ctx.backfill().ensure(self.conn, engine, &board)?;

        let tx = begin_write(self.conn)?;
        self.ctx.ensure_capacity(&tx, engine, &board)?;
        let position = engine.append_position(&tx, &board)?;
        let column = SqliteBoardRepository::new(&tx).insert_column(board, &name, position)?;
        tx.commit()?;

        info!(
            "event=column_create module=service status=ok board={board} column={} position={position}",
            column.id
        );
        self.ctx.hub().emit_board(board, EventType::ColumnsChanged);
        Ok(column)
    }

    pub fn rename_column(
        &self,
        owner: &OwnerToken,
        column: ColumnId,
        name: &str,
    ) -> ServiceResult<Column> {
        let name = normalize_name(name, "column name")?;

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        let existing = owned_column(&repo, owner, column)?;
        repo.rename_column(column, &name)?;
        let renamed = owned_column(&repo, owner, column)?;
        tx.commit()?;

        info!("event=column_rename module=service status=ok column={column}");
        self.ctx
            .hub()
            .emit_board(existing.board_id, EventType::ColumnsChanged);
        Ok(renamed)
    }

    /// Moves a column within its board; the target position is clamped.
    pub fn move_column(
        &self,
        owner: &OwnerToken,
        request: MoveRequest,
    ) -> ServiceResult<MoveOutcome> {
        let column = owned_column(
            &SqliteBoardRepository::new(self.conn),
            owner,
            request.item_id,
        )?;
        let engine = self.ctx.column_engine();
        self.ctx
            .backfill()
            .ensure(self.conn, engine, &column.board_id)?;

        let tx = begin_write(self.conn)?;
        let outcome = engine.move_within_scope(&tx, request.item_id, request.target_position)?;
        tx.commit()?;

        if outcome.is_moved() {
            info!(
                "event=column_move module=service status=ok column={} target={}",
                request.item_id, request.target_position
            );
            self.ctx
                .hub()
                .emit_board(column.board_id, EventType::ColumnsChanged);
        }
        Ok(outcome)
    }

    /// Deletes the column with its tasks and closes the gap.
    pub fn delete_column(&self, owner: &OwnerToken, column: ColumnId) -> ServiceResult<()> {
        let tx = begin_write(self.conn)?;
        let existing = owned_column(&SqliteBoardRepository::new(&tx), owner, column)?;
        self.ctx.column_engine().delete_and_compact(&tx, column)?;
        tx.commit()?;

        self.ctx.backfill().forget::<Tasks>(&column);
        info!(
            "event=column_delete module=service status=ok board={} column={column}",
            existing.board_id
        );
        self.ctx
            .hub()
            .emit_board(existing.board_id, EventType::ColumnsChanged);
        Ok(())
    }
}

/// Loads `column` if it exists on a board owned by `owner`.
pub(crate) fn owned_column(
    repo: &SqliteBoardRepository<'_>,
    owner: &OwnerToken,
    column: ColumnId,
) -> ServiceResult<Column> {
    let found = repo
        .get_column(column)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Column, column))?;
    match repo.owner_of_board(found.board_id)? {
        Some(board_owner) if board_owner == *owner => Ok(found),
        _ => Err(ServiceError::not_found(EntityKind::Column, column)),
    }
}
