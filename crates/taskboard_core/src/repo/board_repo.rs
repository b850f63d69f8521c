//! Owner, board, column and task records over SQLite.
//!
//! # Responsibility
//! - Insert, read and edit entity rows; keep SQL text inside this boundary.
//! - Leave every position change except the initial insert to the ordering
//!   engine.
//!
//! # Invariants
//! - Listings are deterministic: `position ASC` with unpositioned legacy rows
//!   last, then label, then id.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::model::board::{
    Board, BoardId, Column, ColumnId, Owner, OwnerToken, Task, TaskDraft, TaskId,
};
use crate::ordering::engine::{OrderError, OrderResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const BOARD_SELECT_SQL: &str = "SELECT
    board_uuid,
    owner_token,
    name,
    position,
    created_at,
    updated_at
FROM boards";

const COLUMN_SELECT_SQL: &str = "SELECT
    column_uuid,
    board_uuid,
    name,
    position,
    created_at,
    updated_at
FROM board_columns";

const TASK_SELECT_SQL: &str = "SELECT
    task_uuid,
    column_uuid,
    title,
    description,
    is_completed,
    position,
    due_date,
    attachments,
    created_at,
    updated_at
FROM tasks";

/// SQLite-backed entity records. Works on a plain connection or, through
/// deref, on an open transaction.
pub struct SqliteBoardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoardRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates the owner row on first sight, otherwise bumps `last_active_at`.
    pub fn touch_owner(&self, owner: &OwnerToken) -> OrderResult<Owner> {
        self.conn.execute(
            "INSERT INTO owners (owner_token) VALUES (?1)
             ON CONFLICT (owner_token) DO UPDATE
             SET last_active_at = (strftime('%s', 'now') * 1000);",
            [owner.as_str()],
        )?;
        self.get_owner(owner)?
            .ok_or_else(|| OrderError::InvalidData(format!("owner vanished after upsert: {owner}")))
    }

    pub fn get_owner(&self, owner: &OwnerToken) -> OrderResult<Option<Owner>> {
        let row = self
            .conn
            .query_row(
                "SELECT owner_token, created_at, last_active_at
                 FROM owners
                 WHERE owner_token = ?1;",
                [owner.as_str()],
                |row| {
                    Ok(Owner {
                        token: OwnerToken::new(row.get::<_, String>(0)?),
                        created_at: row.get(1)?,
                        last_active_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_board(
        &self,
        owner: &OwnerToken,
        name: &str,
        position: i64,
    ) -> OrderResult<Board> {
        let board_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO boards (board_uuid, owner_token, name, position)
             VALUES (?1, ?2, ?3, ?4);",
            params![board_uuid.to_string(), owner.as_str(), name, position],
        )?;
        self.get_board(board_uuid)?
            .ok_or_else(|| OrderError::InvalidData(format!("board vanished after insert: {board_uuid}")))
    }

    pub fn get_board(&self, id: BoardId) -> OrderResult<Option<Board>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOARD_SELECT_SQL} WHERE board_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_board_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_boards(&self, owner: &OwnerToken) -> OrderResult<Vec<Board>> {
        let mut stmt = self.conn.prepare(&format!(
            "{BOARD_SELECT_SQL}
             WHERE owner_token = ?1
             ORDER BY position IS NULL ASC, position ASC, lower(name) ASC, board_uuid ASC;"
        ))?;
        let mut rows = stmt.query([owner.as_str()])?;
        let mut boards = Vec::new();
        while let Some(row) = rows.next()? {
            boards.push(parse_board_row(row)?);
        }
        Ok(boards)
    }

    /// Returns `false` when the board does not exist.
    pub fn rename_board(&self, id: BoardId, name: &str) -> OrderResult<bool> {
        let changed = self.conn.execute(
            "UPDATE boards
             SET name = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE board_uuid = ?1;",
            params![id.to_string(), name],
        )?;
        Ok(changed > 0)
    }

    pub fn insert_column(&self, board: BoardId, name: &str, position: i64) -> OrderResult<Column> {
        let column_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO board_columns (column_uuid, board_uuid, name, position)
             VALUES (?1, ?2, ?3, ?4);",
            params![column_uuid.to_string(), board.to_string(), name, position],
        )?;
        self.get_column(column_uuid)?.ok_or_else(|| {
            OrderError::InvalidData(format!("column vanished after insert: {column_uuid}"))
        })
    }

    pub fn get_column(&self, id: ColumnId) -> OrderResult<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} WHERE column_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_column_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_columns(&self, board: BoardId) -> OrderResult<Vec<Column>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COLUMN_SELECT_SQL}
             WHERE board_uuid = ?1
             ORDER BY position IS NULL ASC, position ASC, lower(name) ASC, column_uuid ASC;"
        ))?;
        let mut rows = stmt.query([board.to_string()])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(parse_column_row(row)?);
        }
        Ok(columns)
    }

    pub fn rename_column(&self, id: ColumnId, name: &str) -> OrderResult<bool> {
        let changed = self.conn.execute(
            "UPDATE board_columns
             SET name = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE column_uuid = ?1;",
            params![id.to_string(), name],
        )?;
        Ok(changed > 0)
    }

    pub fn insert_task(
        &self,
        column: ColumnId,
        draft: &TaskDraft,
        position: i64,
    ) -> OrderResult<Task> {
        let task_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO tasks (
                task_uuid,
                column_uuid,
                title,
                description,
                is_completed,
                position,
                due_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                task_uuid.to_string(),
                column.to_string(),
                draft.title.as_str(),
                draft.description.as_str(),
                draft.completed,
                position,
                draft.due_date,
            ],
        )?;
        self.get_task(task_uuid)?
            .ok_or_else(|| OrderError::InvalidData(format!("task vanished after insert: {task_uuid}")))
    }

    pub fn get_task(&self, id: TaskId) -> OrderResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE task_uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_task_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_tasks(&self, column: ColumnId) -> OrderResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE column_uuid = ?1
             ORDER BY position IS NULL ASC, position ASC, lower(title) ASC, task_uuid ASC;"
        ))?;
        let mut rows = stmt.query([column.to_string()])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    /// Replaces title, description, completion and due date.
    pub fn update_task_content(&self, id: TaskId, draft: &TaskDraft) -> OrderResult<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET title = ?2,
                 description = ?3,
                 is_completed = ?4,
                 due_date = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE task_uuid = ?1;",
            params![
                id.to_string(),
                draft.title.as_str(),
                draft.description.as_str(),
                draft.completed,
                draft.due_date,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_task_attachments(&self, id: TaskId, attachments: &[String]) -> OrderResult<bool> {
        let encoded = serde_json::to_string(attachments)
            .map_err(|err| OrderError::InvalidData(format!("attachment list: {err}")))?;
        let changed = self.conn.execute(
            "UPDATE tasks
             SET attachments = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE task_uuid = ?1;",
            params![id.to_string(), encoded],
        )?;
        Ok(changed > 0)
    }

    /// Board that owns `column`, if the column exists.
    pub fn board_of_column(&self, column: ColumnId) -> OrderResult<Option<BoardId>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT board_uuid FROM board_columns WHERE column_uuid = ?1;",
                [column.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|text| parse_uuid(&text, "board_columns.board_uuid"))
            .transpose()
    }

    /// Owner of `board`, if the board exists.
    pub fn owner_of_board(&self, board: BoardId) -> OrderResult<Option<OwnerToken>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT owner_token FROM boards WHERE board_uuid = ?1;",
                [board.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(OwnerToken::new))
    }
}

fn parse_board_row(row: &Row<'_>) -> OrderResult<Board> {
    let id_text: String = row.get("board_uuid")?;
    Ok(Board {
        id: parse_uuid(&id_text, "boards.board_uuid")?,
        owner: OwnerToken::new(row.get::<_, String>("owner_token")?),
        name: row.get("name")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_column_row(row: &Row<'_>) -> OrderResult<Column> {
    let id_text: String = row.get("column_uuid")?;
    let board_text: String = row.get("board_uuid")?;
    Ok(Column {
        id: parse_uuid(&id_text, "board_columns.column_uuid")?,
        board_id: parse_uuid(&board_text, "board_columns.board_uuid")?,
        name: row.get("name")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_task_row(row: &Row<'_>) -> OrderResult<Task> {
    let id_text: String = row.get("task_uuid")?;
    let column_text: String = row.get("column_uuid")?;
    let completed = match row.get::<_, i64>("is_completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(OrderError::InvalidData(format!(
                "invalid is_completed value `{other}` in tasks.is_completed"
            )));
        }
    };
    let attachments_text: String = row.get("attachments")?;
    let attachments: Vec<String> = serde_json::from_str(&attachments_text).map_err(|err| {
        OrderError::InvalidData(format!("invalid attachment list in tasks.attachments: {err}"))
    })?;

    Ok(Task {
        id: parse_uuid(&id_text, "tasks.task_uuid")?,
        column_id: parse_uuid(&column_text, "tasks.column_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        completed,
        position: row.get("position")?,
        due_date: row.get("due_date")?,
        attachments,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> OrderResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| OrderError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
