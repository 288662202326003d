//! Error types for the quota & model-access control plane.

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type QcpResult<T> = Result<T, QcpError>;

/// Unified error type for the control plane.
///
/// Variants map directly onto the symbolic error kinds an external HTTP
/// layer would translate into status codes; this crate never does that
/// translation itself.
#[derive(Error, Debug)]
pub enum QcpError {
    /// Malformed input: empty required field, bad UUID, bad cron, bad DSL.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Strategy id, employee, voucher, or similar lookup miss.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Duplicate strategy name, already-redeemed voucher, unique-constraint
    /// violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transfer-out requested more than is available for a given expiry.
    #[error("insufficient quota for user {user_id}: requested {requested}, available {available}")]
    InsufficientQuota {
        user_id: String,
        requested: i64,
        available: i64,
    },

    /// Missing or invalid bearer credential.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Any non-success response from the downstream gateway. Callers must
    /// treat this as fatal for the current transaction.
    #[error("gateway call failed: {0}")]
    Gateway(String),

    /// Database or invariant failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else that doesn't fit a more specific kind above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for QcpError {
    fn from(err: reqwest::Error) -> Self {
        QcpError::Gateway(err.to_string())
    }
}

impl From<figment::Error> for QcpError {
    fn from(err: figment::Error) -> Self {
        QcpError::Internal(format!("configuration error: {err}"))
    }
}
