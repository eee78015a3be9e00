use thiserror::Error;

/// Crate-wide error type.
///
/// Recoverable extraction trouble (lookup timeouts, unreachable pages) is
/// deliberately absent here: it degrades to default feature values and is
/// reported through `ExtractionWarning` on the prediction result. Only
/// failures that invalidate a whole request, a model load, or a batch run
/// surface as errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The input could not be parsed as a URL. Fatal for that request only.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Artifact could not be read or parsed. Fatal at startup or swap time.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Artifact does not match the engine's feature schema. Fatal at load time.
    #[error("model schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Labeled dataset could not be read. Fatal for that batch run only.
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
