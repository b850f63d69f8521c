//! Lazy, once-per-scope position backfill for legacy rows.
//!
//! # Responsibility
//! - Assign positions to rows created before positions existed, ordered by
//!   label case-insensitively, then id.
//! - Remember which scopes are already initialized so the check costs one
//!   concurrent-set lookup afterwards.
//!
//! # Invariants
//! - The claim mutex guards only the check-then-claim and release steps; it
//!   is never held while the scope's rows are read or written.
//! - Backfilled rows go after any positions the scope already holds, so the
//!   `(scope, position)` unique index is never violated.
//! - Only scopes that exist are remembered, so lookups for unknown owner
//!   tokens leave the memo unchanged.
//! - The memo is process-local. Several cooperating processes would need a
//!   durable per-scope flag instead.

use crate::ordering::engine::{parse_member_id, OrderError, OrderResult, ReorderEngine};
use crate::ordering::kind::OrderedKind;
use dashmap::DashSet;
use log::{debug, info};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of one `ensure` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Memo hit; nothing was read.
    AlreadyInitialized,
    /// Another thread holds the claim for this scope and is backfilling it.
    ClaimedElsewhere,
    /// This call ran the backfill and assigned `assigned` positions.
    Backfilled { assigned: usize },
    /// The scope does not exist; nothing was read or remembered.
    ScopeMissing,
}

/// Process-wide backfill memo shared by every service instance.
#[derive(Debug, Default)]
pub struct LegacyPositionBackfill {
    initialized: DashSet<String>,
    claims: Mutex<HashSet<String>>,
}

impl LegacyPositionBackfill {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backfills `scope` unless this process already did.
    ///
    /// `conn` must not be inside a transaction; the backfill commits its own
    /// immediate transaction.
    pub fn ensure<K: OrderedKind>(
        &self,
        conn: &Connection,
        engine: &ReorderEngine<K>,
        scope: &K::ScopeId,
    ) -> OrderResult<BackfillOutcome> {
        let key = memo_key::<K>(scope);
        if self.initialized.contains(&key) {
            return Ok(BackfillOutcome::AlreadyInitialized);
        }

        {
            let mut claims = self.lock_claims();
            if self.initialized.contains(&key) {
                return Ok(BackfillOutcome::AlreadyInitialized);
            }
            if !claims.insert(key.clone()) {
                debug!(
                    "event=backfill module=ordering status=skip kind={} scope={scope} reason=claimed",
                    K::KIND
                );
                return Ok(BackfillOutcome::ClaimedElsewhere);
            }
        }

        let result = backfill_scope(conn, engine, scope);

        let mut claims = self.lock_claims();
        claims.remove(&key);
        let Some(assigned) = result? else {
            debug!(
                "event=backfill module=ordering status=skip kind={} scope={scope} reason=scope_missing",
                K::KIND
            );
            return Ok(BackfillOutcome::ScopeMissing);
        };
        self.initialized.insert(key);
        drop(claims);

        if assigned > 0 {
            info!(
                "event=backfill module=ordering status=ok kind={} scope={scope} assigned={assigned}",
                K::KIND
            );
        }
        Ok(BackfillOutcome::Backfilled { assigned })
    }

    /// Returns whether `scope` is recorded as initialized.
    pub fn is_initialized<K: OrderedKind>(&self, scope: &K::ScopeId) -> bool {
        self.initialized.contains(&memo_key::<K>(scope))
    }

    /// Drops the memo entry for a deleted scope so the set does not grow
    /// without bound.
    pub fn forget<K: OrderedKind>(&self, scope: &K::ScopeId) {
        self.initialized.remove(&memo_key::<K>(scope));
    }

    pub fn initialized_count(&self) -> usize {
        self.initialized.len()
    }

    fn lock_claims(&self) -> MutexGuard<'_, HashSet<String>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn memo_key<K: OrderedKind>(scope: &K::ScopeId) -> String {
    format!("{}:{}", K::KIND, K::scope_to_sql(scope))
}

fn backfill_scope<K: OrderedKind>(
    conn: &Connection,
    engine: &ReorderEngine<K>,
    scope: &K::ScopeId,
) -> OrderResult<Option<usize>> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    match engine.ensure_scope_exists(&tx, scope) {
        Ok(()) => {}
        Err(OrderError::ScopeNotFound { .. }) => return Ok(None),
        Err(err) => return Err(err),
    }
    let scope_sql = K::scope_to_sql(scope);

    let mut pending = Vec::new();
    {
        let mut stmt = tx.prepare(&format!(
            "SELECT {id}
             FROM {table}
             WHERE {scope} = ?1
               AND position IS NULL
             ORDER BY lower({label}) ASC, {id} ASC;",
            id = K::ID_COLUMN,
            table = K::TABLE,
            scope = K::SCOPE_COLUMN,
            label = K::LABEL_COLUMN,
        ))?;
        let mut rows = stmt.query([scope_sql.as_str()])?;
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            pending.push(parse_member_id::<K>(&id_text)?);
        }
    }

    if pending.is_empty() {
        tx.commit()?;
        return Ok(Some(0));
    }

    let current_max: Option<i64> = tx.query_row(
        &format!(
            "SELECT MAX(position) FROM {table} WHERE {scope} = ?1;",
            table = K::TABLE,
            scope = K::SCOPE_COLUMN,
        ),
        [scope_sql.as_str()],
        |row| row.get(0),
    )?;
    let first = engine.ledger().next_position(current_max);

    for (offset, id) in pending.iter().enumerate() {
        tx.execute(
            &format!(
                "UPDATE {table}
                 SET position = ?2
                 WHERE {id} = ?1
                   AND position IS NULL;",
                table = K::TABLE,
                id = K::ID_COLUMN,
            ),
            params![id.to_string(), first + offset as i64],
        )?;
    }

    tx.commit()?;
    Ok(Some(pending.len()))
}
