//! Error types for the synchronization engine.

/// Errors that can occur during a synchronization run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The running application is older than what the stored schema requires.
    ///
    /// Fatal: the run aborts before any catalog mutation.
    #[error(
        "application version {current} is older than the stored schema requires ({required})"
    )]
    OutOfDateApplication {
        /// Version of the running application.
        current: i64,
        /// Minimum application version recorded in the store.
        required: i64,
    },

    /// The catalog could not be read.
    ///
    /// Fatal for the whole run: diffing against an unreadable catalog is unsafe.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[source] sqlx::Error),

    /// A table redefinition failed and was rolled back.
    ///
    /// Fatal for that table only; other tables continue to synchronize.
    #[error("redefinition of table '{table}' failed: {source}")]
    RedefinitionFailed {
        /// The table being redefined.
        table: String,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// An additive column change failed.
    ///
    /// Fatal for that table only; other tables continue to synchronize.
    #[error("adding column '{column}' to table '{table}' failed: {source}")]
    AdditiveChangeFailed {
        /// The table being altered.
        table: String,
        /// The column that could not be added.
        column: String,
        /// Underlying database error.
        #[source]
        source: sqlx::Error,
    },

    /// Database error outside the classified cases above (metadata bookkeeping,
    /// statement execution during table creation or drops).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
