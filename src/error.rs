//! Error types for fedframe

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::types::Field;

/// Errors that can occur while building or transforming a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot determine event at {timestamp}: no event column and the pellet/poke deltas are not exclusive")]
    AmbiguousEvent { timestamp: NaiveDateTime },

    #[error("Alignment must be one of \"datetime\", \"time\" or \"elapsed\", not \"{0}\"")]
    InvalidAlignmentMode(String),

    #[error("Sessions overlap: a session starting at {next_start} begins before the previous one ends at {previous_end}")]
    Overlap {
        previous_end: NaiveDateTime,
        next_start: NaiveDateTime,
    },

    #[error("Deduplication policy must be one of \"keep_first\", \"keep_last\", \"remove\", \"offset\" or \"interpolate\", not \"{0}\"")]
    InvalidDeduplicationPolicy(String),

    #[error("Cannot interpolate when the last timestamp is duplicated; use a different deduplication policy")]
    UninterpolatableDuplicate,

    #[error("Row {row} is out of range for a session of {len} rows")]
    RowOutOfRange { row: usize, len: usize },

    #[error("Missing required column: {0}")]
    MissingColumn(Field),

    #[error("Poke kind must be one of \"left\", \"right\", \"any\", \"correct\" or \"error\", not \"{0}\"")]
    InvalidPokeKind(String),

    #[error("Metric key \"{0}\" is not recognized")]
    InvalidMetric(String),

    #[error("Bin width must be positive, got {0} ms")]
    InvalidBinWidth(i64),

    #[error("Mixed alignment option must be \"ignore\", \"warn\" or \"raise\", not \"{0}\"")]
    InvalidMixedAlignmentOption(String),

    #[error("The sessions have mixed alignment")]
    MixedAlignment,

    #[error("At least one session is required")]
    EmptyCollection,

    #[error("Date parse error: {0}")]
    DateParse(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse session data: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),
}
