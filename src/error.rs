//! Error type shared by the library.
//!
//! Only file-level problems surface as [`CurationError`]. Record-level problems
//! (malformed sequences, predictor no-calls, missing auxiliary data) are never
//! errors: they degrade to a status change plus an entry in the decision log.
use thiserror::Error;

use crate::record::CurationStatus;

#[derive(Debug, Error)]
pub enum CurationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("FASTA parsing error: {0}")]
    Fasta(String),

    #[error("Missing column '{0}' in table header")]
    MissingColumn(String),

    #[error("Invalid boundary '{0}': expected 'start-end' with 1 <= start <= end")]
    InvalidBoundary(String),

    #[error("Unknown curation status '{0}'")]
    UnknownStatus(String),

    #[error("Record {id}: cannot move from {from} to {to}")]
    Transition { id: String, from: CurationStatus, to: CurationStatus },

    #[error("Predictor {tool} failed: {message}")]
    Predictor { tool: String, message: String },

    #[error("Configuration error: {field} - {message}")]
    Config { field: String, message: String },
}

pub type CurationResult<T> = Result<T, CurationError>;
