use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use fuse_model::ResolveError;
use thiserror::Error;

/// Failure reported by the workbook reader for a single file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read `.xlsx`: {0}")]
    Xlsx(#[from] calamine::XlsxError),
    #[error("worksheet `{0}` not found")]
    MissingSheet(String),
    #[error("header row not found within the first {max_rows} rows")]
    HeaderRowNotFound { max_rows: usize },
    #[error("cell at column {column}, row {row} lies outside the worksheet bounds")]
    CellOutOfBounds { column: usize, row: usize },
}

/// Pipeline hand-off that can time out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reader handing a candidate item to its parser.
    ItemSend,
    /// Parser waiting for the next candidate item.
    ItemReceive,
    /// Parser handing a retrieved field to the caller's output queue.
    ResultSend,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::ItemSend => "sending an item to the parser",
            Stage::ItemReceive => "waiting for an item from the reader",
            Stage::ResultSend => "sending a field to the output queue",
        })
    }
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Resolution,
    Source,
    Timeout,
    NotFound,
}

/// The single error a query returns. Every variant is fatal to the query.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid query: {0}")]
    Validation(String),
    #[error("{spec}: cannot resolve headers in `{}`: {source}", .file.display())]
    Resolution {
        file: PathBuf,
        spec: String,
        #[source]
        source: ResolveError,
    },
    #[error("`{}`: {source}", .file.display())]
    Source {
        file: PathBuf,
        #[source]
        source: SourceError,
    },
    #[error("`{}`: timed out after {after:?} {stage}", .file.display())]
    Timeout {
        file: PathBuf,
        stage: Stage,
        after: Duration,
    },
    #[error("item `{item_id}` was not found in any file")]
    NotFound { item_id: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Resolution { .. } => ErrorKind::Resolution,
            Error::Source { .. } => ErrorKind::Source,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub(crate) fn resolution(
        file: impl Into<PathBuf>,
        spec: impl Into<String>,
        source: ResolveError,
    ) -> Self {
        Error::Resolution {
            file: file.into(),
            spec: spec.into(),
            source,
        }
    }

    pub(crate) fn from_source(file: impl Into<PathBuf>, source: impl Into<SourceError>) -> Self {
        Error::Source {
            file: file.into(),
            source: source.into(),
        }
    }
}
