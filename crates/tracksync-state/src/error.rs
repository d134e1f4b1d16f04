//! Tracking store error types.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by [`TrackingService`](crate::TrackingService) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying database failure.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),

    /// Database failure annotated with the operation that hit it.
    #[error("{context}: {source}")]
    BackendContext {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A cursor or payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row holds a value this version cannot interpret.
    #[error("corrupt state row: {0}")]
    Corrupt(String),

    /// The remote tracking service refused or could not be reached.
    #[error("tracking service unavailable: {0}")]
    Unavailable(String),

    /// The backend does not implement an optional operation.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("state backend lock poisoned")]
    LockPoisoned,
}

impl StateError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    pub fn backend_context<E>(context: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::BackendContext {
            context,
            source: Box::new(err),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
