//! Process-wide state shared by every service instance.

use crate::config::{BoardConfig, ConfigError};
use crate::events::hub::EventHub;
use crate::model::board::EntityKind;
use crate::ordering::backfill::LegacyPositionBackfill;
use crate::ordering::engine::ReorderEngine;
use crate::ordering::kind::{Boards, Columns, OrderedKind, Tasks};
use crate::service::board_service::BoardService;
use crate::service::column_service::ColumnService;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::task_service::TaskService;
use rusqlite::Connection;
use tokio::task::JoinHandle;

/// Configuration, engines, backfill memo and event hub.
///
/// Share one instance (behind `Arc`) across all request threads; each
/// thread pairs it with its own SQLite connection.
#[derive(Debug)]
pub struct BoardContext {
    config: BoardConfig,
    hub: EventHub,
    backfill: LegacyPositionBackfill,
    boards: ReorderEngine<Boards>,
    columns: ReorderEngine<Columns>,
    tasks: ReorderEngine<Tasks>,
}

impl BoardContext {
    pub fn new(config: BoardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ordering = config.ordering;
        Ok(Self {
            hub: EventHub::new(&config.events),
            backfill: LegacyPositionBackfill::new(),
            boards: ReorderEngine::new(ordering.ledger(EntityKind::Board)),
            columns: ReorderEngine::new(ordering.ledger(EntityKind::Column)),
            tasks: ReorderEngine::new(ordering.ledger(EntityKind::Task)),
            config,
        })
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn backfill(&self) -> &LegacyPositionBackfill {
        &self.backfill
    }

    pub fn board_engine(&self) -> &ReorderEngine<Boards> {
        &self.boards
    }

    pub fn column_engine(&self) -> &ReorderEngine<Columns> {
        &self.columns
    }

    pub fn task_engine(&self) -> &ReorderEngine<Tasks> {
        &self.tasks
    }

    pub fn board_service<'a>(&'a self, conn: &'a Connection) -> BoardService<'a> {
        BoardService::new(conn, self)
    }

    pub fn column_service<'a>(&'a self, conn: &'a Connection) -> ColumnService<'a> {
        ColumnService::new(conn, self)
    }

    pub fn task_service<'a>(&'a self, conn: &'a Connection) -> TaskService<'a> {
        TaskService::new(conn, self)
    }

    /// Starts the periodic ping at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        self.hub
            .spawn_heartbeat(self.config.events.heartbeat_interval())
    }

    /// Fails with `CapacityExceeded` when `scope` cannot take one more member.
    pub(crate) fn ensure_capacity<K: OrderedKind>(
        &self,
        conn: &Connection,
        engine: &ReorderEngine<K>,
        scope: &K::ScopeId,
    ) -> ServiceResult<()> {
        let limit = self.config.limits.for_kind(K::KIND);
        if engine.member_count(conn, scope)? >= limit {
            return Err(ServiceError::CapacityExceeded {
                kind: K::KIND,
                scope: scope.to_string(),
                limit,
            });
        }
        Ok(())
    }
}
