//! Projection error types and the error-recovery policy.

use std::sync::Arc;

use thiserror::Error;

use crate::notification::Notification;

/// Errors that can occur while running a projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The projection row does not exist; `create` must precede a run.
    #[error("projection {0} does not exist")]
    ProjectionNotFound(String),

    /// A user-supplied handler failed.
    #[error("projection handler failed: {0}")]
    Handler(String),

    /// Projection state could not be encoded or decoded.
    #[error("projection state error: {0}")]
    State(String),

    /// The run was cancelled; the current transaction was rolled back.
    #[error("projection run cancelled")]
    Cancelled,

    /// The error policy kept asking for retries past the configured ceiling.
    #[error("retry ceiling of {retries} attempts exceeded")]
    RetryCeilingExceeded { retries: u32 },

    /// An error occurred in the event store.
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Recovery action chosen by a [`ProjectionErrorCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Run the fold again with the same notification.
    Retry,
    /// Swallow the error and report success for this notification.
    Ignore,
    /// Return the original error to the caller.
    Fail,
    /// Same as [`ErrorAction::Fail`].
    Fallthrough,
}

/// Policy consulted whenever a fold fails.
pub type ProjectionErrorCallback =
    Arc<dyn Fn(&ProjectionError, Option<&Notification>) -> ErrorAction + Send + Sync>;
