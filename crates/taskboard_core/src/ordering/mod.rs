//! Positional ordering for boards, columns and tasks.
//!
//! # Responsibility
//! - Keep each scope's positions unique and contiguous across appends,
//!   moves, transfers, deletions and bulk reorders.
//! - Lazily backfill positions for legacy rows.
//!
//! # Invariants
//! - After every committed operation a scope of `n` members holds exactly
//!   `{base, …, base+n-1}`.

pub mod backfill;
pub mod engine;
pub mod kind;
pub mod ledger;
