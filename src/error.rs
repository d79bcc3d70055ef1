//! Pipeline-level failures.
//!
//! Stage-internal problems (one OCR page, one undecodable image) never reach
//! this type: the extraction cascade absorbs them. What remains are the
//! outcomes a caller has to tell apart to render a useful message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The file extension is outside pdf/docx/pptx. Raised before any work.
    #[error("Unsupported file type '{extension}'. Supported types: .docx, .pdf, .pptx")]
    UnsupportedFormat { extension: String },

    /// Every extraction stage produced no text.
    #[error("No text could be extracted from '{filename}'")]
    NothingExtractable { filename: String },

    #[error("Embedding generation failed: {0:#}")]
    Embedding(#[source] anyhow::Error),

    #[error("Vector store error: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("Chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Machine-readable code used in HTTP error bodies and CLI summaries.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFormat { .. } => "unsupported_format",
            IngestError::NothingExtractable { .. } => "no_text_found",
            IngestError::Embedding(_) => "embedding_failed",
            IngestError::Storage(_) | IngestError::LengthMismatch { .. } => "storage_failed",
            IngestError::Io(_) => "internal",
        }
    }
}
