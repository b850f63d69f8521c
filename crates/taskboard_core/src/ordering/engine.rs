//! Generic reorder engine over positioned entity kinds.
//!
//! # Responsibility
//! - Implement append, move-within-scope, move-across-scope,
//!   delete-and-compact and bulk-reorder once for boards, columns and tasks.
//! - Keep every scope contiguous from the ledger base after each call.
//!
//! # Invariants
//! - Mutating operations take an open `Transaction`; the caller commits.
//!   Any error leaves the transaction to roll back, so no partial
//!   renumbering is ever persisted.
//! - Lookups that can fail with `ItemNotFound`/`ScopeNotFound` run before
//!   the first write of the call.
//! - Multi-row rewrites pass through a staging range first, so the
//!   `(scope, position)` unique index never sees a duplicate.

use crate::db::DbError;
use crate::model::board::EntityKind;
use crate::ordering::kind::OrderedKind;
use crate::ordering::ledger::{PositionLedger, Slot};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use uuid::Uuid;

pub type OrderResult<T> = Result<T, OrderError>;

/// Errors from ordering operations.
#[derive(Debug)]
pub enum OrderError {
    /// Underlying SQLite failure.
    Db(DbError),
    /// Referenced member does not exist.
    ItemNotFound { kind: EntityKind, id: Uuid },
    /// Referenced scope (owner, board or column) does not exist.
    ScopeNotFound { kind: EntityKind, scope: String },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for OrderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ItemNotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::ScopeNotFound { kind, scope } => {
                write!(f, "scope for {kind} not found: {scope}")
            }
            Self::InvalidData(message) => write!(f, "invalid ordering data: {message}"),
        }
    }
}

impl Error for OrderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for OrderError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for OrderError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Whether a move changed any stored position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Request matched the current state; nothing was written.
    Unchanged,
    Moved,
}

impl MoveOutcome {
    pub fn is_moved(self) -> bool {
        matches!(self, Self::Moved)
    }
}

/// Scope and position of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<S> {
    pub scope: S,
    pub position: Option<i64>,
}

/// One `{id, position}` pair of a bulk reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionAssignment {
    pub id: Uuid,
    pub position: i64,
}

impl PositionAssignment {
    pub fn new(id: Uuid, position: i64) -> Self {
        Self { id, position }
    }
}

/// Ordering operations for entity kind `K`.
#[derive(Debug, Clone, Copy)]
pub struct ReorderEngine<K: OrderedKind> {
    ledger: PositionLedger,
    kind: PhantomData<K>,
}

impl<K: OrderedKind> ReorderEngine<K> {
    pub fn new(ledger: PositionLedger) -> Self {
        Self {
            ledger,
            kind: PhantomData,
        }
    }

    pub fn ledger(&self) -> PositionLedger {
        self.ledger
    }

    /// Loads the scope and position of `item`.
    pub fn placement(&self, conn: &Connection, item: Uuid) -> OrderResult<Placement<K::ScopeId>> {
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                &format!(
                    "SELECT {scope}, position FROM {table} WHERE {id} = ?1;",
                    scope = K::SCOPE_COLUMN,
                    table = K::TABLE,
                    id = K::ID_COLUMN,
                ),
                [item.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (scope_text, position) = row.ok_or(OrderError::ItemNotFound {
            kind: K::KIND,
            id: item,
        })?;
        Ok(Placement {
            scope: parse_scope::<K>(&scope_text)?,
            position,
        })
    }

    /// Fails with `ScopeNotFound` when `scope` does not exist.
    pub fn ensure_scope_exists(&self, conn: &Connection, scope: &K::ScopeId) -> OrderResult<()> {
        let exists: i64 = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {table} WHERE {id} = ?1);",
                table = K::SCOPE_TABLE,
                id = K::SCOPE_TABLE_ID_COLUMN,
            ),
            [K::scope_to_sql(scope)],
            |row| row.get(0),
        )?;
        if exists == 1 {
            Ok(())
        } else {
            Err(OrderError::ScopeNotFound {
                kind: K::KIND,
                scope: scope.to_string(),
            })
        }
    }

    /// Lists scope members in display order.
    ///
    /// Unpositioned legacy rows sort last, by label then id.
    pub fn slots(&self, conn: &Connection, scope: &K::ScopeId) -> OrderResult<Vec<Slot>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {id}, position
             FROM {table}
             WHERE {scope} = ?1
             ORDER BY position IS NULL ASC, position ASC, lower({label}) ASC, {id} ASC;",
            id = K::ID_COLUMN,
            table = K::TABLE,
            scope = K::SCOPE_COLUMN,
            label = K::LABEL_COLUMN,
        ))?;
        let mut rows = stmt.query([K::scope_to_sql(scope)])?;
        let mut slots = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            slots.push(Slot::new(parse_member_id::<K>(&id_text)?, row.get(1)?));
        }
        Ok(slots)
    }

    /// Number of members currently in `scope`.
    pub fn member_count(&self, conn: &Connection, scope: &K::ScopeId) -> OrderResult<usize> {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {table} WHERE {scope} = ?1;",
                table = K::TABLE,
                scope = K::SCOPE_COLUMN,
            ),
            [K::scope_to_sql(scope)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Position a new member of `scope` should take.
    pub fn append_position(&self, tx: &Transaction<'_>, scope: &K::ScopeId) -> OrderResult<i64> {
        self.ensure_scope_exists(tx, scope)?;
        Ok(self.ledger.next_position(self.max_position(tx, scope)?))
    }

    /// Moves `item` to `target` inside its own scope and renumbers the scope.
    pub fn move_within_scope(
        &self,
        tx: &Transaction<'_>,
        item: Uuid,
        target: i64,
    ) -> OrderResult<MoveOutcome> {
        let placement = self.placement(tx, item)?;
        if placement.position == Some(target) {
            debug!(
                "event=order_move module=ordering status=skip kind={} item={item} reason=same_position",
                K::KIND
            );
            return Ok(MoveOutcome::Unchanged);
        }

        let slots = self.slots(tx, &placement.scope)?;
        let order: Vec<Uuid> = slots.iter().map(|slot| slot.id).collect();
        let next = self
            .ledger
            .reinsert(&order, item, target)
            .ok_or(OrderError::ItemNotFound {
                kind: K::KIND,
                id: item,
            })?;
        if self.ledger.is_settled(&slots, &next) {
            debug!(
                "event=order_move module=ordering status=skip kind={} item={item} reason=clamped_to_current",
                K::KIND
            );
            return Ok(MoveOutcome::Unchanged);
        }

        self.rewrite(tx, &next)?;
        debug!(
            "event=order_move module=ordering status=ok kind={} item={item} scope={} members={}",
            K::KIND,
            placement.scope,
            next.len()
        );
        Ok(MoveOutcome::Moved)
    }

    /// Moves `item` to the tail of `destination` and closes the gap it left.
    pub fn move_across_scope(
        &self,
        tx: &Transaction<'_>,
        item: Uuid,
        destination: &K::ScopeId,
    ) -> OrderResult<MoveOutcome> {
        let placement = self.placement(tx, item)?;
        if placement.scope == *destination {
            debug!(
                "event=order_transfer module=ordering status=skip kind={} item={item} reason=same_scope",
                K::KIND
            );
            return Ok(MoveOutcome::Unchanged);
        }
        self.ensure_scope_exists(tx, destination)?;

        let new_position = self
            .ledger
            .next_position(self.max_position(tx, destination)?);
        tx.execute(
            &format!(
                "UPDATE {table}
                 SET {scope} = ?2,
                     position = ?3,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE {id} = ?1;",
                table = K::TABLE,
                scope = K::SCOPE_COLUMN,
                id = K::ID_COLUMN,
            ),
            params![item.to_string(), K::scope_to_sql(destination), new_position],
        )?;

        let shifted = match placement.position {
            Some(vacated) => self.compact_after(tx, &placement.scope, vacated)?,
            None => 0,
        };
        debug!(
            "event=order_transfer module=ordering status=ok kind={} item={item} from={} to={destination} position={new_position} shifted={shifted}",
            K::KIND,
            placement.scope
        );
        Ok(MoveOutcome::Moved)
    }

    /// Deletes `item` and closes the gap in its former scope.
    ///
    /// Returns where the item was, so callers can route notifications.
    pub fn delete_and_compact(
        &self,
        tx: &Transaction<'_>,
        item: Uuid,
    ) -> OrderResult<Placement<K::ScopeId>> {
        let placement = self.placement(tx, item)?;
        tx.execute(
            &format!(
                "DELETE FROM {table} WHERE {id} = ?1;",
                table = K::TABLE,
                id = K::ID_COLUMN,
            ),
            [item.to_string()],
        )?;

        let shifted = match placement.position {
            Some(vacated) => self.compact_after(tx, &placement.scope, vacated)?,
            None => 0,
        };
        debug!(
            "event=order_delete module=ordering status=ok kind={} item={item} scope={} shifted={shifted}",
            K::KIND,
            placement.scope
        );
        Ok(placement)
    }

    /// Applies a client-supplied, possibly partial, position mapping.
    ///
    /// Returns the scopes whose stored order actually changed.
    pub fn bulk_reorder(
        &self,
        tx: &Transaction<'_>,
        assignments: &[PositionAssignment],
    ) -> OrderResult<Vec<K::ScopeId>> {
        let mut targets = HashMap::with_capacity(assignments.len());
        let mut scopes = BTreeSet::new();
        for assignment in assignments {
            let placement = self.placement(tx, assignment.id)?;
            scopes.insert(placement.scope);
            targets.insert(assignment.id, assignment.position);
        }

        let mut rewritten = Vec::new();
        for scope in scopes {
            let slots = self.slots(tx, &scope)?;
            let order = self.ledger.bulk_order(&slots, &targets);
            if self.ledger.is_settled(&slots, &order) {
                continue;
            }
            self.rewrite(tx, &order)?;
            debug!(
                "event=order_bulk module=ordering status=ok kind={} scope={scope} members={}",
                K::KIND,
                order.len()
            );
            rewritten.push(scope);
        }
        Ok(rewritten)
    }

    /// Writes `order` as the scope's final sequence in two phases: every
    /// member into the staging range, then every member to its settled slot.
    fn rewrite(&self, tx: &Transaction<'_>, order: &[Uuid]) -> OrderResult<()> {
        for (index, id) in order.iter().enumerate() {
            self.set_position(tx, *id, PositionLedger::staging_position(index))?;
        }
        for (index, id) in order.iter().enumerate() {
            self.set_position(tx, *id, self.ledger.position_at(index))?;
        }
        Ok(())
    }

    /// Decrements every member above `vacated`, lowest first, so each write
    /// lands on the slot the previous one just freed.
    fn compact_after(
        &self,
        tx: &Transaction<'_>,
        scope: &K::ScopeId,
        vacated: i64,
    ) -> OrderResult<usize> {
        let mut above = Vec::new();
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {id}, position
                 FROM {table}
                 WHERE {scope} = ?1
                   AND position > ?2
                 ORDER BY position ASC;",
                id = K::ID_COLUMN,
                table = K::TABLE,
                scope = K::SCOPE_COLUMN,
            ))?;
            let mut rows = stmt.query(params![K::scope_to_sql(scope), vacated])?;
            while let Some(row) = rows.next()? {
                let id_text: String = row.get(0)?;
                let position: i64 = row.get(1)?;
                above.push((parse_member_id::<K>(&id_text)?, position));
            }
        }

        for (id, position) in &above {
            self.set_position(tx, *id, position - 1)?;
        }
        Ok(above.len())
    }

    fn max_position(&self, conn: &Connection, scope: &K::ScopeId) -> OrderResult<Option<i64>> {
        let max = conn.query_row(
            &format!(
                "SELECT MAX(position) FROM {table} WHERE {scope} = ?1;",
                table = K::TABLE,
                scope = K::SCOPE_COLUMN,
            ),
            [K::scope_to_sql(scope)],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn set_position(&self, tx: &Transaction<'_>, id: Uuid, position: i64) -> OrderResult<()> {
        tx.execute(
            &format!(
                "UPDATE {table}
                 SET position = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE {id} = ?1;",
                table = K::TABLE,
                id = K::ID_COLUMN,
            ),
            params![id.to_string(), position],
        )?;
        Ok(())
    }
}

pub(crate) fn parse_member_id<K: OrderedKind>(value: &str) -> OrderResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        OrderError::InvalidData(format!(
            "invalid uuid `{value}` in {}.{}",
            K::TABLE,
            K::ID_COLUMN
        ))
    })
}

pub(crate) fn parse_scope<K: OrderedKind>(value: &str) -> OrderResult<K::ScopeId> {
    K::scope_from_sql(value).ok_or_else(|| {
        OrderError::InvalidData(format!(
            "invalid scope `{value}` in {}.{}",
            K::TABLE,
            K::SCOPE_COLUMN
        ))
    })
}
