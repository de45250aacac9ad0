use thiserror::Error;

/// Errors surfaced by the durable instance store (§4.A).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("row for {0} does not exist")]
    NotFound(String),

    #[error("unrecognised instance state: {0}")]
    UnknownState(#[from] instancer_core::state::UnknownState),
}
