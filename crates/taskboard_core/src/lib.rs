//! Core domain logic for the task board.
//! Positional ordering, legacy backfill, mutation services and the dirty-event
//! hub live here; transports build on top of this crate.

pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod repo;
pub mod service;

pub use config::{
    BoardConfig, CapacityLimits, ConfigError, EventConfig, LoggingConfig, OrderingConfig,
};
pub use events::event::{DirtyEvent, EventType, SseFrame};
pub use events::hub::{ConnectionEnd, ConnectionId, EventHub, HubKey, Subscription};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::board::{
    Board, BoardId, Column, ColumnId, EntityKind, Owner, OwnerToken, Task, TaskDraft, TaskId,
};
pub use ordering::backfill::{BackfillOutcome, LegacyPositionBackfill};
pub use ordering::engine::{
    MoveOutcome, OrderError, OrderResult, Placement, PositionAssignment, ReorderEngine,
};
pub use ordering::kind::{Boards, Columns, OrderedKind, Tasks};
pub use ordering::ledger::{PositionLedger, Slot};
pub use repo::board_repo::SqliteBoardRepository;
pub use service::board_service::BoardService;
pub use service::column_service::ColumnService;
pub use service::context::BoardContext;
pub use service::error::{ServiceError, ServiceResult};
pub use service::request::{MoveRequest, TransferRequest};
pub use service::task_service::TaskService;
