use thiserror::Error;

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The stream name was empty.
    #[error("stream name cannot be empty")]
    EmptyStreamName,

    /// `create` was called for a stream whose table already exists.
    #[error("event stream table already exists")]
    TableAlreadyExists,

    /// The persistence strategy produced an empty table name.
    #[error("table name cannot be empty")]
    TableNameEmpty,

    /// The persistence strategy produced no schema statements.
    #[error("create table queries are not provided")]
    NoCreateTableQueries,

    /// A payload type name has no registered codec.
    #[error("unknown payload type: {0}")]
    UnknownPayloadType(String),

    /// The backend rejected an insert on a unique index.
    ///
    /// Raised for duplicate event ids and for aggregate version races; the
    /// caller decides whether to rehydrate and retry.
    #[error("unique constraint {constraint:?} violated")]
    UniqueViolation {
        constraint: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    /// Creating a stream failed and the schema transaction could not be
    /// rolled back either.
    #[error("failed to create event stream: {source}; rollback failed: {rollback}")]
    CreateRollback {
        #[source]
        source: sqlx::Error,
        rollback: sqlx::Error,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
