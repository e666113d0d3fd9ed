//! Structured error taxonomy shared by every public operation.
//!
//! Failures inside the pipeline — I/O faults, HTTP errors, SQL errors —
//! are caught at each operation boundary and normalized into a
//! [`StructuredError`] carrying a closed [`ErrorKind`], a human-readable
//! message, and optional backend details. Callers consume a typed
//! `Result<T, StructuredError>`; no raw library error escapes this core.

use serde::{Deserialize, Serialize};

/// Convenience alias used across the crate's public surface.
pub type Result<T> = std::result::Result<T, StructuredError>;

/// Closed set of failure categories.
///
/// Each kind has a stable wire label (see [`ErrorKind::as_str`]) used for
/// both serialization and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed caller input: bad paths, empty queries, invalid settings.
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    /// Local path does not exist.
    #[serde(rename = "FILE_NOT_FOUND")]
    FileNotFound,
    /// Extension/format not handled by the extractor.
    #[serde(rename = "UNSUPPORTED_FILE_TYPE")]
    UnsupportedFileType,
    /// PDF could not be parsed.
    #[serde(rename = "PDF_PROCESSING_ERROR")]
    PdfProcessing,
    /// DOCX archive or XML could not be parsed.
    #[serde(rename = "DOCX_PROCESSING_ERROR")]
    DocxProcessing,
    /// Text file was not valid UTF-8.
    #[serde(rename = "FILE_DECODING_ERROR")]
    FileDecoding,
    /// Object-storage fetch failed after retries.
    #[serde(rename = "OBJECT_STORE_ERROR")]
    ObjectStore,
    /// Extracted text was empty or whitespace-only.
    #[serde(rename = "EMPTY_DOCUMENT")]
    EmptyDocument,
    /// Chunking produced no chunks.
    #[serde(rename = "NO_CHUNKS_GENERATED")]
    NoChunksGenerated,
    /// Embedding provider rejected the call or retries were exhausted.
    #[serde(rename = "API_ERROR")]
    ApiError,
    /// Document store rejected the call or retries were exhausted.
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    /// Unclassified failure during ingestion.
    #[serde(rename = "INGESTION_ERROR")]
    Ingestion,
    /// Unclassified failure during retrieval.
    #[serde(rename = "RETRIEVAL_ERROR")]
    Retrieval,
}

impl ErrorKind {
    /// The wire/log label for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::UnsupportedFileType => "UNSUPPORTED_FILE_TYPE",
            ErrorKind::PdfProcessing => "PDF_PROCESSING_ERROR",
            ErrorKind::DocxProcessing => "DOCX_PROCESSING_ERROR",
            ErrorKind::FileDecoding => "FILE_DECODING_ERROR",
            ErrorKind::ObjectStore => "OBJECT_STORE_ERROR",
            ErrorKind::EmptyDocument => "EMPTY_DOCUMENT",
            ErrorKind::NoChunksGenerated => "NO_CHUNKS_GENERATED",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
            ErrorKind::Ingestion => "INGESTION_ERROR",
            ErrorKind::Retrieval => "RETRIEVAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unified failure value returned (not raised) by every public
/// operation in the crate.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
    /// Backend-specific detail (HTTP body, SQL error text), when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StructuredError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiError, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseError, message)
    }
}
