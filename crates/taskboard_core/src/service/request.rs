//! Request shapes accepted by the services, bindable from JSON.

use crate::model::board::{ColumnId, TaskId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::ordering::engine::PositionAssignment;

/// Single move inside the item's current scope. Out-of-range targets clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub item_id: Uuid,
    pub target_position: i64,
}

/// Cross-column task move. Always appends at the destination tail; any
/// index a client sends alongside is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub item_id: TaskId,
    pub target_scope_id: ColumnId,
}
