//! Error type shared by the board, column and task services.

use crate::db::DbError;
use crate::model::board::EntityKind;
use crate::ordering::engine::OrderError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    /// Referenced owner, board, column or task is absent or belongs to
    /// another owner. Raised before any write.
    NotFound { kind: &'static str, id: String },
    /// Name or title is blank after trim.
    InvalidName { field: &'static str },
    /// Attachment file name has characters outside the allowed set.
    InvalidAttachmentName(String),
    /// Attachment file name tries to leave its directory.
    PathTraversal(String),
    /// Scope is full; nothing was written.
    CapacityExceeded {
        kind: EntityKind,
        scope: String,
        limit: usize,
    },
    /// Storage or persisted-data failure.
    Order(OrderError),
}

impl ServiceError {
    pub(crate) fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.as_str(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::InvalidName { field } => write!(f, "{field} must not be blank"),
            Self::InvalidAttachmentName(name) => {
                write!(f, "attachment name contains unsupported characters: `{name}`")
            }
            Self::PathTraversal(name) => {
                write!(f, "attachment name must be a plain file name: `{name}`")
            }
            Self::CapacityExceeded { kind, scope, limit } => {
                write!(f, "{scope} already holds the maximum of {limit} {kind}s")
            }
            Self::Order(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Order(err) => Some(err),
            _ => None,
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(value: OrderError) -> Self {
        match value {
            OrderError::ItemNotFound { kind, id } => Self::not_found(kind, id),
            OrderError::ScopeNotFound { kind, scope } => Self::NotFound {
                kind: match kind {
                    EntityKind::Board => "owner",
                    EntityKind::Column => EntityKind::Board.as_str(),
                    EntityKind::Task => EntityKind::Column.as_str(),
                },
                id: scope,
            },
            other => Self::Order(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Order(OrderError::Db(DbError::Sqlite(value)))
    }
}
