//! Error types for dataset preparation and adapter inference.

use thiserror::Error;

/// A specialized Result type for xiaoruan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for xiaoruan operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing field `{0}` in record")]
    MissingField(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Dimension mismatch for {name}: expected {expected}, got {actual}")]
    DimensionMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Tensor operation failed: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Hub error: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create an adapter error
    pub fn adapter<S: Into<String>>(msg: S) -> Self {
        Error::Adapter(msg.into())
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch<S: Into<String>>(name: S, expected: S, actual: S) -> Self {
        Error::DimensionMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// True when the error was raised for an absent record field.
    pub fn is_missing_field(&self) -> bool {
        matches!(self, Error::MissingField(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokenizers::Error> for Error {
    fn from(err: tokenizers::Error) -> Self {
        Error::Tokenizer(err.to_string())
    }
}
