//! Error taxonomy shared by the repository and use-case layers.

use thiserror::Error;

/// An entity failed its own validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DomainValidationError(pub String);

impl DomainValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised by repositories and the counter adjustment API.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Malformed identifiers or an unsupported content-type discriminator.
    #[error("invalid entity input: {0}")]
    InvalidEntityInput(String),

    /// A counter adjustment was rejected or could not be issued.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Connectivity or transaction failure in the system of record.
    #[error("entity operation failed: {message}")]
    EntityOperationFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("entity already exists: {0}")]
    EntityAlreadyExists(String),

    #[error("entity does not exist: {0}")]
    EntityDoesNotExist(String),
}

impl RepositoryError {
    /// Wrap a store error as `EntityOperationFailed` with a message.
    pub(crate) fn failed(message: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::EntityOperationFailed {
            message: message.to_string(),
            source,
        }
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
            source: None,
        }
    }
}

impl From<DomainValidationError> for RepositoryError {
    fn from(e: DomainValidationError) -> Self {
        Self::InvalidEntityInput(e.0)
    }
}

/// Returns true when the error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Returns true when a referenced row is missing.
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Errors surfaced by use cases to the calling (HTTP) layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UseCaseError {
    #[error("invalid object: {0}")]
    InvalidObject(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExist(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<RepositoryError> for UseCaseError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::EntityDoesNotExist(m) => Self::NotFound(m),
            RepositoryError::EntityAlreadyExists(m) => Self::AlreadyExist(m),
            RepositoryError::InvalidEntityInput(m) => Self::InvalidObject(m),
            RepositoryError::InvalidOperation { message, .. } => Self::InvalidObject(message),
            RepositoryError::EntityOperationFailed { message, .. } => {
                Self::ServiceUnavailable(message)
            }
        }
    }
}

impl From<DomainValidationError> for UseCaseError {
    fn from(e: DomainValidationError) -> Self {
        Self::InvalidObject(e.0)
    }
}
