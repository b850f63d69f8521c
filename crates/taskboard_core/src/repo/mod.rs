//! Repository layer: entity records over SQLite.
//!
//! # Responsibility
//! - Isolate SQLite query details from service orchestration.
//! - Return semantic lookups (`Option`) in addition to transport errors.

pub mod board_repo;
