//! Runtime configuration for the board core.
//!
//! # Responsibility
//! - Describe ordering bases, capacity limits, event timing and logging in
//!   one serde-deserializable document.
//! - Reject values that would break ordering or hub invariants.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.
//! - Position bases are non-negative, so staging positions never collide.

use crate::logging::default_log_level;
use crate::model::board::EntityKind;
use crate::ordering::ledger::PositionLedger;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Errors from parsing or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    pub ordering: OrderingConfig,
    pub limits: CapacityLimits,
    pub events: EventConfig,
    pub logging: LoggingConfig,
}

impl BoardConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ordering.validate()?;
        self.limits.validate()?;
        self.events.validate()
    }
}

/// Position base per entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderingConfig {
    pub board_base: i64,
    pub column_base: i64,
    pub task_base: i64,
}

impl OrderingConfig {
    /// Mixed bases of older clients: boards and tasks from 0, columns from 1.
    pub const fn legacy() -> Self {
        Self {
            board_base: 0,
            column_base: 1,
            task_base: 0,
        }
    }

    pub fn ledger(&self, kind: EntityKind) -> PositionLedger {
        PositionLedger::new(match kind {
            EntityKind::Board => self.board_base,
            EntityKind::Column => self.column_base,
            EntityKind::Task => self.task_base,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("ordering.board_base", self.board_base),
            ("ordering.column_base", self.column_base),
            ("ordering.task_base", self.task_base),
        ] {
            if value < 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("must be >= 0, got {value}"),
                });
            }
        }
        Ok(())
    }
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            board_base: 0,
            column_base: 0,
            task_base: 0,
        }
    }
}

/// Member-count limits per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacityLimits {
    pub max_boards_per_owner: usize,
    pub max_columns_per_board: usize,
    pub max_tasks_per_column: usize,
}

impl CapacityLimits {
    pub fn for_kind(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Board => self.max_boards_per_owner,
            EntityKind::Column => self.max_columns_per_board,
            EntityKind::Task => self.max_tasks_per_column,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("limits.max_boards_per_owner", self.max_boards_per_owner),
            ("limits.max_columns_per_board", self.max_columns_per_board),
            ("limits.max_tasks_per_column", self.max_tasks_per_column),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for CapacityLimits {
    fn default() -> Self {
        Self {
            max_boards_per_owner: 100,
            max_columns_per_board: 20,
            max_tasks_per_column: 1000,
        }
    }
}

/// Event hub timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventConfig {
    pub heartbeat_interval_secs: u64,
    /// Advertised to clients in every frame's `retry:` line.
    pub reconnect_delay_ms: u64,
    /// Frames one connection may have queued before it counts as stalled
    /// and is dropped.
    pub connection_buffer: usize,
}

impl EventConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "events.heartbeat_interval_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.connection_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "events.connection_buffer",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            reconnect_delay_ms: 3000,
            connection_buffer: 64,
        }
    }
}

/// File logging settings; see [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files. `None` leaves logging off.
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}
