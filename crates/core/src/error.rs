use crate::types::DbId;

/// Domain error taxonomy shared by every layer of the engine.
///
/// `Forbidden`, `InvalidTransition`, `Validation` and `EmptyChain` are
/// permanent: retrying without changing the input yields the same result.
/// `Conflict` and `Busy` are transient and safe to retry with backoff.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("No approver could be resolved: {0}")]
    EmptyChain(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the caller may retry the same request after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Conflict(_) | CoreError::Busy(_))
    }
}
