use std::{io, path::PathBuf};

use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error tokenizing data. {0}")]
    Csv(#[from] csv::Error),
    #[error("Error tokenizing data. EOF inside string starting at line {line}")]
    UnterminatedQuote { line: u64 },
    #[error("Error tokenizing data. Expected {expected} fields in line {line}, saw {found}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("No columns to parse from file")]
    NoColumns,
}

impl TableError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::Internal,
            _ => ErrorCode::DataFormat,
        }
    }
}

impl From<&TableError> for ApiError {
    fn from(err: &TableError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}
