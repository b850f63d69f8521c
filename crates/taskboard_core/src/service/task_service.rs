//! Task use-case service.
//!
//! # Responsibility
//! - Create, edit, complete, delete and order tasks inside columns.
//! - Move tasks between columns, including columns on other boards of the
//!   same owner.
//! - Maintain the per-task attachment file-name list.
//!
//! # Invariants
//! - Every board whose task list changed receives exactly one
//!   `tasks.changed` per call, after commit.
//! - A cross-column move always lands at the destination's tail.

use crate::events::event::EventType;
use crate::model::board::{BoardId, ColumnId, EntityKind, OwnerToken, Task, TaskDraft, TaskId};
use crate::ordering::engine::{MoveOutcome, PositionAssignment};
use crate::repo::board_repo::SqliteBoardRepository;
use crate::service::column_service::owned_column;
use crate::service::context::BoardContext;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::request::TransferRequest;
use crate::service::{begin_write, normalize_name};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::BTreeSet;

const MAX_ATTACHMENT_NAME_LEN: usize = 255;

static ATTACHMENT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._()\-]*$").expect("valid attachment name regex")
});

pub struct TaskService<'a> {
    conn: &'a Connection,
    ctx: &'a BoardContext,
}

impl<'a> TaskService<'a> {
    pub fn new(conn: &'a Connection, ctx: &'a BoardContext) -> Self {
        Self { conn, ctx }
    }

    /// Lists a column's tasks by position, backfilling legacy rows first.
    pub fn list_tasks(&self, owner: &OwnerToken, column: ColumnId) -> ServiceResult<Vec<Task>> {
        let repo = SqliteBoardRepository::new(self.conn);
        owned_column(&repo, owner, column)?;
        self.ctx
            .backfill()
            .ensure(self.conn, self.ctx.task_engine(), &column)?;
        Ok(repo.list_tasks(column)?)
    }

    pub fn get_task(&self, owner: &OwnerToken, task: TaskId) -> ServiceResult<Task> {
        owned_task(&SqliteBoardRepository::new(self.conn), owner, task).map(|(task, _)| task)
    }

    /// Appends a new task at the end of `column`.
    pub fn create_task(
        &self,
        owner: &OwnerToken,
        column: ColumnId,
        draft: &TaskDraft,
    ) -> ServiceResult<Task> {
        let draft = normalized_draft(draft)?;
        let board = owned_column(&SqliteBoardRepository::new(self.conn), owner, column)?.board_id;
        let engine = self.ctx.task_engine();
        self.ctx.backfill().ensure(self.conn, engine, &column)?;

        let tx = begin_write(self.conn)?;
        self.ctx.ensure_capacity(&tx, engine, &column)?;
        let position = engine.append_position(&tx, &column)?;
        let task = SqliteBoardRepository::new(&tx).insert_task(column, &draft, position)?;
        tx.commit()?;

        info!(
            "event=task_create module=service status=ok column={column} task={} position={position}",
            task.id
        );
        self.ctx.hub().emit_board(board, EventType::TasksChanged);
        Ok(task)
    }

    /// Replaces the task's title, description, completion and due date.
    pub fn update_task(
        &self,
        owner: &OwnerToken,
        task: TaskId,
        draft: &TaskDraft,
    ) -> ServiceResult<Task> {
        let draft = normalized_draft(draft)?;

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        let (_, board) = owned_task(&repo, owner, task)?;
        repo.update_task_content(task, &draft)?;
        let (updated, _) = owned_task(&repo, owner, task)?;
        tx.commit()?;

        info!("event=task_update module=service status=ok task={task}");
        self.ctx.hub().emit_board(board, EventType::TasksChanged);
        Ok(updated)
    }

    pub fn set_completed(
        &self,
        owner: &OwnerToken,
        task: TaskId,
        completed: bool,
    ) -> ServiceResult<Task> {
        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        let (existing, board) = owned_task(&repo, owner, task)?;
        if existing.completed == completed {
            return Ok(existing);
        }
        let draft = TaskDraft {
            title: existing.title,
            description: existing.description,
            completed,
            due_date: existing.due_date,
        };
        repo.update_task_content(task, &draft)?;
        let (updated, _) = owned_task(&repo, owner, task)?;
        tx.commit()?;

        info!("event=task_complete module=service status=ok task={task} completed={completed}");
        self.ctx.hub().emit_board(board, EventType::TasksChanged);
        Ok(updated)
    }

    /// Deletes the task and closes the gap in its column.
    pub fn delete_task(&self, owner: &OwnerToken, task: TaskId) -> ServiceResult<Task> {
        let tx = begin_write(self.conn)?;
        let (existing, board) = owned_task(&SqliteBoardRepository::new(&tx), owner, task)?;
        self.ctx.task_engine().delete_and_compact(&tx, task)?;
        tx.commit()?;

        info!(
            "event=task_delete module=service status=ok column={} task={task}",
            existing.column_id
        );
        self.ctx.hub().emit_board(board, EventType::TasksChanged);
        Ok(existing)
    }

    /// Moves a task to the tail of another column.
    ///
    /// Moving into the task's current column is a no-op.
    pub fn transfer_task(
        &self,
        owner: &OwnerToken,
        request: TransferRequest,
    ) -> ServiceResult<MoveOutcome> {
        let repo = SqliteBoardRepository::new(self.conn);
        let (task, source_board) = owned_task(&repo, owner, request.item_id)?;
        let destination = owned_column(&repo, owner, request.target_scope_id)?;
        if task.column_id == destination.id {
            return Ok(MoveOutcome::Unchanged);
        }
        let engine = self.ctx.task_engine();
        let backfill = self.ctx.backfill();
        backfill.ensure(self.conn, engine, &task.column_id)?;
        backfill.ensure(self.conn, engine, &destination.id)?;

        let tx = begin_write(self.conn)?;
        self.ctx.ensure_capacity(&tx, engine, &destination.id)?;
        let outcome = engine.move_across_scope(&tx, task.id, &destination.id)?;
        tx.commit()?;

        if outcome.is_moved() {
            info!(
                "event=task_transfer module=service status=ok task={} from={} to={}",
                task.id, task.column_id, destination.id
            );
            self.emit_tasks_changed([source_board, destination.board_id]);
        }
        Ok(outcome)
    }

    /// Applies a client-supplied task order. Returns whether anything moved.
    ///
    /// Assignments may span several columns; each column is renumbered on its
    /// own and members left out keep their relative order.
    pub fn reorder_tasks(
        &self,
        owner: &OwnerToken,
        assignments: &[PositionAssignment],
    ) -> ServiceResult<bool> {
        let engine = self.ctx.task_engine();
        let repo = SqliteBoardRepository::new(self.conn);
        let mut columns = BTreeSet::new();
        for assignment in assignments {
            let (task, _) = owned_task(&repo, owner, assignment.id)?;
            columns.insert(task.column_id);
        }
        for column in &columns {
            self.ctx.backfill().ensure(self.conn, engine, column)?;
        }

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        for assignment in assignments {
            owned_task(&repo, owner, assignment.id)?;
        }
        let rewritten = engine.bulk_reorder(&tx, assignments)?;
        let mut boards = BTreeSet::new();
        for column in &rewritten {
            if let Some(board) = repo.board_of_column(*column)? {
                boards.insert(board);
            }
        }
        tx.commit()?;

        if rewritten.is_empty() {
            return Ok(false);
        }
        info!(
            "event=task_reorder module=service status=ok requested={} columns={}",
            assignments.len(),
            rewritten.len()
        );
        self.emit_tasks_changed(boards);
        Ok(true)
    }

    /// Records an attachment file name on the task. Adding a name that is
    /// already present leaves the task untouched.
    pub fn add_attachment(
        &self,
        owner: &OwnerToken,
        task: TaskId,
        file_name: &str,
    ) -> ServiceResult<Task> {
        let file_name = validate_attachment_name(file_name)?;

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        let (mut existing, board) = owned_task(&repo, owner, task)?;
        if existing.attachments.iter().any(|name| *name == file_name) {
            return Ok(existing);
        }
        existing.attachments.push(file_name);
        repo.set_task_attachments(task, &existing.attachments)?;
        let (updated, _) = owned_task(&repo, owner, task)?;
        tx.commit()?;

        info!(
            "event=task_attach module=service status=ok task={task} attachments={}",
            updated.attachments.len()
        );
        self.ctx.hub().emit_board(board, EventType::TasksChanged);
        Ok(updated)
    }

    /// Drops an attachment file name from the task; unknown names are ignored.
    pub fn remove_attachment(
        &self,
        owner: &OwnerToken,
        task: TaskId,
        file_name: &str,
    ) -> ServiceResult<Task> {
        let file_name = validate_attachment_name(file_name)?;

        let tx = begin_write(self.conn)?;
        let repo = SqliteBoardRepository::new(&tx);
        let (mut existing, board) = owned_task(&repo, owner, task)?;
        let before = existing.attachments.len();
        existing.attachments.retain(|name| *name != file_name);
        if existing.attachments.len() == before {
            return Ok(existing);
        }
        repo.set_task_attachments(task, &existing.attachments)?;
        let (updated, _) = owned_task(&repo, owner, task)?;
        tx.commit()?;

        info!(
            "event=task_detach module=service status=ok task={task} attachments={}",
            updated.attachments.len()
        );
        self.ctx.hub().emit_board(board, EventType::TasksChanged);
        Ok(updated)
    }

    fn emit_tasks_changed(&self, boards: impl IntoIterator<Item = BoardId>) {
        let distinct: BTreeSet<BoardId> = boards.into_iter().collect();
        for board in distinct {
            self.ctx.hub().emit_board(board, EventType::TasksChanged);
        }
    }
}

/// Loads `task` with the id of its board if it belongs to `owner`.
fn owned_task(
    repo: &SqliteBoardRepository<'_>,
    owner: &OwnerToken,
    task: TaskId,
) -> ServiceResult<(Task, BoardId)> {
    let found = repo
        .get_task(task)?
        .ok_or_else(|| ServiceError::not_found(EntityKind::Task, task))?;
    let column = owned_column(repo, owner, found.column_id)
        .map_err(|_| ServiceError::not_found(EntityKind::Task, task))?;
    Ok((found, column.board_id))
}

fn normalized_draft(draft: &TaskDraft) -> ServiceResult<TaskDraft> {
    Ok(TaskDraft {
        title: normalize_name(&draft.title, "task title")?,
        ..draft.clone()
    })
}

/// Accepts a plain file name: no separators, no parent references, only
/// characters from the allowed set.
fn validate_attachment_name(value: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidAttachmentName(value.to_string()));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains("..") {
        return Err(ServiceError::PathTraversal(trimmed.to_string()));
    }
    if trimmed.len() > MAX_ATTACHMENT_NAME_LEN || !ATTACHMENT_NAME_RE.is_match(trimmed) {
        return Err(ServiceError::InvalidAttachmentName(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}
