use thiserror::Error;

/// The lifecycle engine's error type. Composes the store's error; never
/// surfaced verbatim to a caller — the API layer maps any `Err` here to
/// `{"something went wrong"}` (§7 "Internal") and logs full detail.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("durable store error: {0}")]
    Store(#[from] instancer_store::StoreError),

    #[error("challenge '{0}' not found")]
    UnknownChallenge(String),
}
