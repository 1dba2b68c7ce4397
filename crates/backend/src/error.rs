use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy of the data loader.
///
/// Cloneable so a debounced write can fan the same result out to every
/// caller that was coalesced into it; the original cause is kept behind an
/// `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// A remote call did not finish before its deadline. Surfaced as its own
    /// kind so callers can show "this is taking a long time" messaging.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Unique-constraint collision on the external id.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The store rejected an ON CONFLICT clause because the unique
    /// constraint it names does not exist.
    #[error("no matching conflict target: {0}")]
    MissingConflictTarget(String),

    /// Authorization failure from the store, passed through unmodified.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other store failure, carrying the original cause.
    #[error("store error: {0}")]
    Store(Arc<anyhow::Error>),
}

impl DataError {
    /// Classify a raw store error into the taxonomy. SQLite reports
    /// constraint collisions and conflict-target problems only through the
    /// message text, so this is string matching by necessity; Postgres-style
    /// SQLSTATE codes are recognized as well for parity with hosted stores.
    pub fn classify(err: anyhow::Error) -> Self {
        let text = format!("{:#}", err);
        let lowered = text.to_lowercase();

        // The missing-conflict-target message also mentions "UNIQUE
        // constraint", so it has to be recognized first.
        if text.contains("42P10")
            || lowered.contains("does not match any primary key or unique constraint")
        {
            return DataError::MissingConflictTarget(text);
        }
        if lowered.contains("unique constraint") || text.contains("23505") {
            return DataError::DuplicateKey(text);
        }
        if lowered.contains("permission denied") || text.contains("42501") {
            return DataError::PermissionDenied(text);
        }
        DataError::Store(Arc::new(err))
    }
}

impl From<anyhow::Error> for DataError {
    fn from(err: anyhow::Error) -> Self {
        DataError::classify(err)
    }
}

impl From<sea_orm::DbErr> for DataError {
    fn from(err: sea_orm::DbErr) -> Self {
        DataError::classify(anyhow::Error::new(err))
    }
}
