use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LoanbookError {
    #[error("Invalid input: {field} — {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid state transition for loan {loan_id}: {from} -> {to}")]
    InvalidStateTransition {
        loan_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Ledger constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Concurrency failure in {operation} after {attempts} attempt(s): {reason}")]
    Concurrency {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Raised by a unit of work whose read set went stale before commit.
    /// Never escapes the service: the retry loop turns it into `Concurrency`.
    #[error("Stale {entity} {id}: read version {expected}, found {found}")]
    VersionConflict {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },
}

impl LoanbookError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        LoanbookError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        LoanbookError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Only optimistic version conflicts are safe to retry automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoanbookError::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for LoanbookError {
    fn from(e: serde_json::Error) -> Self {
        LoanbookError::Serialization(e.to_string())
    }
}
