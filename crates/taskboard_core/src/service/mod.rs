//! Mutation orchestration for boards, columns and tasks.
//!
//! # Responsibility
//! - Validate input and ownership, run the ordering engine inside one
//!   immediate transaction, commit, then emit a dirty event.
//!
//! # Invariants
//! - Events are emitted strictly after commit; a failed or skipped delivery
//!   never changes the mutation's result.
//! - Unchanged moves and reorders emit nothing.
//! - Resources owned by another owner are reported as `NotFound`.

pub mod board_service;
pub mod column_service;
pub mod context;
pub mod error;
pub mod request;
pub mod task_service;

use crate::service::error::{ServiceError, ServiceResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Opens the write transaction every mutating call runs in.
///
/// Immediate: the write lock is taken up front, so concurrent mutations of
/// the same database serialize instead of failing on lock upgrade.
fn begin_write(conn: &Connection) -> ServiceResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

fn normalize_name(value: &str, field: &'static str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidName { field });
    }
    Ok(trimmed.to_string())
}
