use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SfaError {
    #[error("invalid year bound: {0}")]
    InvalidYearBound(String),

    #[error("invalid year range: {0}")]
    InvalidYearRange(String),

    #[error("NCES request failed: {0}")]
    NcesHttp(String),

    #[error("NCES returned status {status}: {message}")]
    NcesStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("no survey data files found in {0}")]
    NoSurveyFiles(String),

    #[error("no common columns across the selected files")]
    NoCommonColumns,

    #[error("no data files loaded successfully")]
    NoFilesLoaded,

    #[error("join key column not found: {0}")]
    MissingJoinKey(String),

    #[error("missing input file: {0}")]
    MissingInput(String),

    #[error("reference dataset missing column: {0}")]
    MissingReferenceColumn(String),
}
