//! Error types for the dataset engine.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArkError>;

#[derive(Error, Debug)]
pub enum ArkError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("segment not found: {0}")]
    SegmentNotFound(PathBuf),

    #[error("metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("format error at offset {offset}: {message}")]
    Format { message: String, offset: u64 },

    #[error("unsupported style: {0}")]
    UnsupportedStyle(String),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("locked: {0}")]
    Locked(String),

    #[error("postprocessor error: {0}")]
    Postproc(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("matcher error: {0}")]
    Matcher(String),

    #[error("query error: {0}")]
    Query(String),
}

impl ArkError {
    /// Format-error constructor that records the byte offset where parsing failed.
    pub fn format(message: impl Into<String>, offset: u64) -> Self {
        ArkError::Format {
            message: message.into(),
            offset,
        }
    }

    /// Stable short code used by callers that branch on error kind (the
    /// dispatcher's `Duplicate` routing, the checker's per-record summaries).
    pub fn code(&self) -> &'static str {
        match self {
            ArkError::DatasetNotFound(_) => "DATASET_NOT_FOUND",
            ArkError::SegmentNotFound(_) => "SEGMENT_NOT_FOUND",
            ArkError::MetadataNotFound(_) => "METADATA_NOT_FOUND",
            ArkError::Format { .. } => "FORMAT_ERROR",
            ArkError::UnsupportedStyle(_) => "UNSUPPORTED_STYLE",
            ArkError::Consistency(_) => "CONSISTENCY_ERROR",
            ArkError::Duplicate(_) => "DUPLICATE",
            ArkError::Locked(_) => "LOCKED",
            ArkError::Postproc(_) => "POSTPROC_ERROR",
            ArkError::Config(_) => "CONFIG_ERROR",
            ArkError::Matcher(_) => "MATCHER_ERROR",
            ArkError::Query(_) => "QUERY_ERROR",
            ArkError::Io(_) => "IO_ERROR",
            ArkError::Serialization(_) => "IO_ERROR",
            ArkError::Json(_) => "IO_ERROR",
            ArkError::Archive(_) => "ARCHIVE_ERROR",
        }
    }
}
