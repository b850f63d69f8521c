//! Dirty event payloads and SSE frame encoding.

use crate::model::board::BoardId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Type tag of a dirty event; doubles as the SSE event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "boards.created")]
    BoardsCreated,
    #[serde(rename = "boards.updated")]
    BoardsUpdated,
    #[serde(rename = "boards.deleted")]
    BoardsDeleted,
    #[serde(rename = "columns.changed")]
    ColumnsChanged,
    #[serde(rename = "tasks.changed")]
    TasksChanged,
    #[serde(rename = "ping")]
    Ping,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BoardsCreated => "boards.created",
            Self::BoardsUpdated => "boards.updated",
            Self::BoardsDeleted => "boards.deleted",
            Self::ColumnsChanged => "columns.changed",
            Self::TasksChanged => "tasks.changed",
            Self::Ping => "ping",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire payload: `{"type": …, "ts": …, "boardId"?: …}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    /// Epoch ms at which the event was built.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<BoardId>,
}

impl DirtyEvent {
    pub fn now(kind: EventType, board_id: Option<BoardId>) -> Self {
        Self {
            kind,
            ts: Utc::now().timestamp_millis(),
            board_id,
        }
    }

    pub fn ping() -> Self {
        Self::now(EventType::Ping, None)
    }
}

/// One event as delivered to a connection, with its reconnect hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: DirtyEvent,
    pub retry: Duration,
}

impl SseFrame {
    pub fn new(event: DirtyEvent, retry: Duration) -> Self {
        Self { event, retry }
    }

    pub fn name(&self) -> &'static str {
        self.event.kind.as_str()
    }

    /// JSON body of the `data:` line.
    pub fn data(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.event)
    }

    /// Encodes the frame in `text/event-stream` layout.
    pub fn encode(&self) -> serde_json::Result<String> {
        Ok(format!(
            "event: {}\nretry: {}\ndata: {}\n\n",
            self.name(),
            self.retry.as_millis(),
            self.data()?
        ))
    }
}
