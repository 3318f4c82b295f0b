//! Classified connection error types.
//!
//! Managed-instance drivers report failures as free-form text. `classify`
//! maps the recurring failure modes onto typed variants so callers can
//! distinguish a bad project id from a transient network drop.

use thiserror::Error;

use crate::connector::ConnectTarget;

/// Connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connecting user lacks permission on the instance.
    #[error("permission denied for instance {instance}")]
    PermissionDenied {
        /// The instance that rejected the connection.
        instance: String,
    },

    /// The instance does not exist.
    #[error("instance not found: {instance}")]
    NotFound {
        /// The instance that could not be resolved.
        instance: String,
    },

    /// The managed-database API is not enabled for the project.
    #[error("database API disabled for project {project}")]
    ApiDisabled {
        /// The project with the disabled API.
        project: String,
    },

    /// The project id does not match the provider's format.
    #[error("invalid project id format: {project}")]
    InvalidProjectId {
        /// The malformed project id.
        project: String,
    },

    /// The database rejected the supplied credentials.
    #[error("authentication failed for user {user}")]
    AuthFailure {
        /// The user whose credentials were rejected.
        user: String,
    },

    /// A connection attempt timed out.
    #[error("connection attempt timed out")]
    Timeout,

    /// Unclassified transport-level failure.
    #[error("connection error: {0}")]
    Transport(String),

    /// All retry attempts were consumed.
    #[error("connection failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The classified error from the final attempt.
        source: Box<ConnectionError>,
    },

    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl ConnectionError {
    /// Classify a raw driver message against the known failure modes.
    ///
    /// Unrecognized messages stay `Transport` and remain retryable.
    pub fn classify(raw: &str, target: &ConnectTarget) -> Self {
        let lower = raw.to_ascii_lowercase();

        if lower.contains("permission denied") || lower.contains("caller does not have permission") {
            ConnectionError::PermissionDenied {
                instance: target.instance.clone(),
            }
        } else if lower.contains("not found") || lower.contains("does not exist") {
            ConnectionError::NotFound {
                instance: target.instance.clone(),
            }
        } else if lower.contains("api has not been used") || lower.contains("api is disabled") {
            ConnectionError::ApiDisabled {
                project: target.project.clone(),
            }
        } else if lower.contains("invalid project") || lower.contains("project id format") {
            ConnectionError::InvalidProjectId {
                project: target.project.clone(),
            }
        } else if lower.contains("password authentication failed") || lower.contains("authentication failed") {
            ConnectionError::AuthFailure {
                user: target.credentials.user.clone(),
            }
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ConnectionError::Timeout
        } else {
            ConnectionError::Transport(raw.to_string())
        }
    }

    /// Promote an unclassified transport error by scanning its message.
    ///
    /// Already-classified variants pass through untouched.
    pub fn classified(self, target: &ConnectTarget) -> Self {
        match self {
            ConnectionError::Transport(raw) => Self::classify(&raw, target),
            other => other,
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Fatal classifications (bad credentials, missing instance, malformed
    /// project) surface immediately instead of consuming the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectionError::Timeout | ConnectionError::Transport(_))
    }
}
