//! Core data models used throughout the ingestion pipeline.
//!
//! A [`Document`] only lives for one ingestion call; what persists is a set of
//! [`StoredRecord`]s stamped with its id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::IngestError;

/// Supported upload formats, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
}

impl DocumentFormat {
    /// Parse an extension with or without the leading dot, case-insensitive.
    pub fn from_extension(ext: &str) -> Result<Self, IngestError> {
        let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "pptx" => Ok(DocumentFormat::Pptx),
            _ => Err(IngestError::UnsupportedFormat {
                extension: if normalized.is_empty() {
                    String::new()
                } else {
                    format!(".{}", normalized)
                },
            }),
        }
    }

    /// Detect the format of `filename` from its extension.
    pub fn from_filename(filename: &str) -> Result<Self, IngestError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Self::from_extension(ext)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pptx => "pptx",
        }
    }

    /// Extension including the dot, as used for temp-file suffixes.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => ".pdf",
            DocumentFormat::Docx => ".docx",
            DocumentFormat::Pptx => ".pptx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted upload. The id is generated at acceptance and never reused.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
}

impl Document {
    /// Accept `filename` for ingestion, rejecting unsupported extensions.
    pub fn accept(filename: &str) -> Result<Self, IngestError> {
        let format = DocumentFormat::from_filename(filename)?;
        Ok(Self::new(filename, format))
    }

    /// Accept `filename` with a format established by other means.
    pub fn new(filename: &str, format: DocumentFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            format,
        }
    }
}

/// Metadata persisted alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub document_id: String,
    /// Duplicated from the record text so lookups need no second fetch.
    pub chunk_text: String,
    pub chunk_index: usize,
    /// ISO-8601 UTC, shared by every chunk of one store call.
    pub timestamp: String,
}

/// The persisted unit: one chunk, its embedding, and metadata.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// `"{document_id}_chunk_{chunk_index}"`.
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: RecordMetadata,
}

/// A nearest-neighbor hit returned by a [`VectorStore`](crate::store::VectorStore).
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub metadata: RecordMetadata,
    /// Cosine distance (`1 - cosine similarity`); lower is closer.
    pub distance: f32,
}

/// One similarity-query result, best match first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub chunk_text: String,
    pub document_id: String,
    pub timestamp: String,
    pub distance: f32,
}

impl From<Neighbor> for QueryMatch {
    fn from(n: Neighbor) -> Self {
        Self {
            chunk_text: n.metadata.chunk_text,
            document_id: n.metadata.document_id,
            timestamp: n.metadata.timestamp,
            distance: n.distance,
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub chunks_stored: usize,
}
