use thiserror::Error;

/// Errors raised by ingestion, feature building, training and forecasting.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required field is missing from the source data.
    #[error("schema error: {0}")]
    Schema(String),
    /// No usable target or pollutant columns after extraction.
    #[error("data error: {0}")]
    Data(String),
    #[error("unknown station: {0}")]
    UnknownStation(String),
    /// A synthesized row does not line up with the trained feature schema.
    #[error("feature mismatch: {0}")]
    FeatureMismatch(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("ingestion failed: {0}")]
    Ingest(String),
}

/// Convenience type for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;
