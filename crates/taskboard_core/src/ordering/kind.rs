//! Per-entity-kind parameterization of the ordering engine.
//!
//! Boards, columns and tasks share one ordering algorithm; the only thing
//! that differs is where members live, which column groups them into scopes,
//! and how a scope id is written to and read from SQLite.

use crate::model::board::{BoardId, ColumnId, EntityKind, OwnerToken};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use uuid::Uuid;

/// Storage layout of one positioned entity kind.
///
/// Table and column names are compile-time constants and are the only
/// values interpolated into SQL text; all ids are bound as parameters.
pub trait OrderedKind {
    /// Identifier of the grouping that scopes this kind.
    type ScopeId: Clone + Eq + Ord + Hash + Debug + Display;

    const KIND: EntityKind;
    /// Table holding the positioned members.
    const TABLE: &'static str;
    const ID_COLUMN: &'static str;
    /// Member column referencing the scope.
    const SCOPE_COLUMN: &'static str;
    /// Human label used to order legacy backfills.
    const LABEL_COLUMN: &'static str;
    /// Table that owns scope ids, used for existence checks.
    const SCOPE_TABLE: &'static str;
    const SCOPE_TABLE_ID_COLUMN: &'static str;

    fn scope_to_sql(scope: &Self::ScopeId) -> String;
    fn scope_from_sql(value: &str) -> Option<Self::ScopeId>;
}

/// Boards, scoped by owner.
#[derive(Debug, Clone, Copy)]
pub struct Boards;

/// Columns, scoped by board.
#[derive(Debug, Clone, Copy)]
pub struct Columns;

/// Tasks, scoped by column.
#[derive(Debug, Clone, Copy)]
pub struct Tasks;

impl OrderedKind for Boards {
    type ScopeId = OwnerToken;

    const KIND: EntityKind = EntityKind::Board;
    const TABLE: &'static str = "boards";
    const ID_COLUMN: &'static str = "board_uuid";
    const SCOPE_COLUMN: &'static str = "owner_token";
    const LABEL_COLUMN: &'static str = "name";
    const SCOPE_TABLE: &'static str = "owners";
    const SCOPE_TABLE_ID_COLUMN: &'static str = "owner_token";

    fn scope_to_sql(scope: &Self::ScopeId) -> String {
        scope.as_str().to_string()
    }

    fn scope_from_sql(value: &str) -> Option<Self::ScopeId> {
        Some(OwnerToken::new(value))
    }
}

impl OrderedKind for Columns {
    type ScopeId = BoardId;

    const KIND: EntityKind = EntityKind::Column;
    const TABLE: &'static str = "board_columns";
    const ID_COLUMN: &'static str = "column_uuid";
    const SCOPE_COLUMN: &'static str = "board_uuid";
    const LABEL_COLUMN: &'static str = "name";
    const SCOPE_TABLE: &'static str = "boards";
    const SCOPE_TABLE_ID_COLUMN: &'static str = "board_uuid";

    fn scope_to_sql(scope: &Self::ScopeId) -> String {
        scope.to_string()
    }

    fn scope_from_sql(value: &str) -> Option<Self::ScopeId> {
        Uuid::parse_str(value).ok()
    }
}

impl OrderedKind for Tasks {
    type ScopeId = ColumnId;

    const KIND: EntityKind = EntityKind::Task;
    const TABLE: &'static str = "tasks";
    const ID_COLUMN: &'static str = "task_uuid";
    const SCOPE_COLUMN: &'static str = "column_uuid";
    const LABEL_COLUMN: &'static str = "title";
    const SCOPE_TABLE: &'static str = "board_columns";
    const SCOPE_TABLE_ID_COLUMN: &'static str = "column_uuid";

    fn scope_to_sql(scope: &Self::ScopeId) -> String {
        scope.to_string()
    }

    fn scope_from_sql(value: &str) -> Option<Self::ScopeId> {
        Uuid::parse_str(value).ok()
    }
}
