//! Dirty-event fan-out to live subscribers.
//!
//! # Responsibility
//! - Tell connected clients *that* a board list, column set or task set
//!   changed so they refetch; never carry the changed data.
//! - Encode events as server-sent-event frames.
//!
//! # Invariants
//! - Delivery is best-effort and at-most-once; there is no replay log.
//! - A failed send never propagates to the mutation that triggered it.

pub mod event;
pub mod hub;
