use thiserror::Error;

/// lictrack error types
///
/// Every failure aborts only the current record's parse or the current
/// construction; sibling records are unaffected and nothing is retried.
#[derive(Error, Debug)]
pub enum LictrackError {
    /// Input is not the expected mapping/sequence shape
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Required field absent or empty
    #[error("missing field: {0}")]
    MissingField(String),

    /// Field present but outside the accepted values
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias for lictrack
pub type Result<T> = std::result::Result<T, LictrackError>;
