use serde::Serialize;

use crate::authz::Denial;
use crate::models::category::CategoryId;
use crate::models::user::UserId;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("denied: {0}")]
    Denied(Denial),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("execution failure: {0}")]
    Execution(String),
    #[error("category {id} is checked out by user {by}")]
    Locked { id: CategoryId, by: UserId },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_action(action: impl Into<String>) -> Self {
        Self::InvalidAction(action.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP-style status a caller should surface for this error.
    ///
    /// Denials keep their own code; everything that is not a data-driven
    /// outcome maps to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Denied(denial) => denial.code.as_u16(),
            AppError::NotFound(_) => 404,
            AppError::Locked { .. } => 409,
            AppError::InvalidAction(_)
            | AppError::Execution(_)
            | AppError::Configuration(_)
            | AppError::Database(_)
            | AppError::Internal(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Denied(_) => "denied",
            AppError::InvalidAction(_) => "invalid_action",
            AppError::NotFound(_) => "not_found",
            AppError::Execution(_) => "execution",
            AppError::Locked { .. } => "locked",
            AppError::Configuration(_) => "configuration",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }

    /// True for failures that should be logged and shown as internal errors
    /// rather than rendered as an ordinary "not permitted" page.
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl From<&AppError> for ErrorResponse {
    fn from(value: &AppError) -> Self {
        ErrorResponse {
            error: value.kind().to_string(),
            message: value.to_string(),
            status: value.status_code(),
        }
    }
}

impl From<Denial> for AppError {
    fn from(value: Denial) -> Self {
        Self::Denied(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Reason;

    #[test]
    fn denials_keep_their_code() {
        let err = AppError::from(Denial::unauthorized(Reason::PollLoginRequired));
        assert_eq!(err.status_code(), 401);
        assert!(!err.is_internal());
    }

    #[test]
    fn configuration_problems_are_internal() {
        let err = AppError::invalid_action("topic.teleport");
        assert_eq!(err.status_code(), 500);
        assert!(err.is_internal());

        let body = ErrorResponse::from(&err);
        assert_eq!(body.error, "invalid_action");
        assert_eq!(body.message, "invalid action: topic.teleport");
    }

    #[test]
    fn lock_conflicts_are_409() {
        let err = AppError::Locked { id: 3, by: 7 };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.to_string(), "category 3 is checked out by user 7");
    }
}
