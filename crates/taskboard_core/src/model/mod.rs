//! Board domain model.
//!
//! # Responsibility
//! - Define the owner/board/column/task records shared by ordering, services
//!   and any outer transport layer.
//!
//! # Invariants
//! - Every board, column and task is identified by a stable UUID.
//! - `position` is an opaque ordering index, unique and contiguous within the
//!   parent scope once backfilled.

pub mod board;
