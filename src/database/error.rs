use crate::error::{AppError, AppErrorKind, InfrastructureError};
use thiserror::Error;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Error)]
pub enum DatabaseErrorKind {
    #[error("order store connection pool exhausted")]
    PoolExhausted,

    #[error("order store unavailable: {message}")]
    Unavailable { message: String },

    #[error("order already stored ({constraint})")]
    Duplicate { constraint: String },

    #[error("order store query failed: {message}")]
    Query { message: String },

    #[error("stored order could not be decoded: {message}")]
    Decode { message: String },

    #[error("order store misconfigured: {message}")]
    Configuration { message: String },

    #[error("order store error: {message}")]
    Other { message: String },
}

/// Error from the PostgreSQL order store, with the operation it came from
#[derive(Debug, Clone, Error)]
#[error("{kind}{}", .context.as_ref().map(|c| format!(" during {}", c)).unwrap_or_default())]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Pool and connection problems may clear up on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::PoolExhausted | DatabaseErrorKind::Unavailable { .. }
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        let kind = match error {
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::PoolExhausted,
            sqlx::Error::PoolClosed => DatabaseErrorKind::Unavailable {
                message: "pool closed".to_string(),
            },
            sqlx::Error::Io(e) => DatabaseErrorKind::Unavailable {
                message: e.to_string(),
            },
            sqlx::Error::Configuration(e) => DatabaseErrorKind::Configuration {
                message: e.to_string(),
            },
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                DatabaseErrorKind::Duplicate {
                    constraint: db_err.constraint().unwrap_or("primary key").to_string(),
                }
            }
            sqlx::Error::Database(db_err) => DatabaseErrorKind::Query {
                message: db_err.message().to_string(),
            },
            sqlx::Error::ColumnDecode { index, source } => DatabaseErrorKind::Decode {
                message: format!("column {}: {}", index, source),
            },
            other => DatabaseErrorKind::Other {
                message: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

impl From<DatabaseError> for AppError {
    fn from(error: DatabaseError) -> Self {
        if let DatabaseErrorKind::Duplicate { .. } = error.kind {
            return AppError::conflict(error.to_string());
        }

        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Storage {
            message: error.to_string(),
            is_retryable: error.is_retryable(),
        }))
    }
}
