//! Application error types
//!
//! Every fallible gateway operation returns [`AppResult`]. The kind tells the
//! HTTP layer which status to answer with; the optional context carries the
//! operation that failed.

use std::fmt;
use thiserror::Error;

/// Result type for gateway operations
pub type AppResult<T> = Result<T, AppError>;

/// Failures talking to a remote service
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    #[error("{service} did not answer within {seconds} seconds")]
    Timeout { service: String, seconds: u64 },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

/// Failures of the local infrastructure (storage, configuration)
#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String, is_retryable: bool },
}

#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

#[derive(Debug)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation {
            message: message.into(),
        })
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::new(AppErrorKind::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        })
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Unauthorized {
            message: message.into(),
        })
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Conflict {
            message: message.into(),
        })
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: provider.into(),
            message: message.into(),
            is_retryable: false,
        }))
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Storage {
            message: message.into(),
            is_retryable: false,
        }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, AppErrorKind::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::Timeout { .. }) => true,
            AppErrorKind::Infrastructure(InfrastructureError::Storage { is_retryable, .. }) => {
                *is_retryable
            }
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{} ({})", self.kind, context)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<AppErrorKind> for AppError {
    fn from(kind: AppErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ExternalError> for AppError {
    fn from(error: ExternalError) -> Self {
        Self::new(AppErrorKind::External(error))
    }
}

impl From<InfrastructureError> for AppError {
    fn from(error: InfrastructureError) -> Self {
        Self::new(AppErrorKind::Infrastructure(error))
    }
}
