use thiserror::Error;

/// Failure taxonomy shared by the online consulting path and the offline
/// ingestion pipeline. Online callers never see `BatchInsertExhausted`;
/// ingestion treats `UpstreamUnavailable`/`IndexUnavailable` as retryable
/// while the online path fails fast and isolates the failure to one part.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("upstream service unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("input text is empty")]
    EmptyInput,

    #[error("intent response did not match the expected schema: {0}")]
    IntentParse(String),

    #[error("no collection registered for part '{0}'")]
    CollectionNotFound(String),

    #[error("vector index unreachable: {0}")]
    IndexUnavailable(String),

    #[error("batch {batch} for '{collection}' failed after {attempts} attempts")]
    BatchInsertExhausted {
        collection: String,
        batch: usize,
        attempts: u32,
    },
}
