//! Ingestion pipeline orchestration.
//!
//! One document flows through four stages, each consuming the previous
//! stage's complete output:
//!
//! ```text
//! file → extraction cascade → chunker → embedding gateway → vector store
//! ```
//!
//! [`ingest_file`] runs the pipeline for a file already on disk.
//! [`ingest_bytes`] is the upload path: it spools bytes to a temporary file
//! that is removed on every exit path. [`run_ingest`] backs `docmem ingest`.

use anyhow::{bail, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding::embed_texts;
use crate::error::IngestError;
use crate::models::{Document, DocumentFormat, IngestReport};
use crate::services::Services;
use crate::store::store_document;

/// Run the full pipeline for `path`, using `filename` for format detection.
///
/// # Errors
///
/// - [`IngestError::UnsupportedFormat`] before any work is done.
/// - [`IngestError::NothingExtractable`] when every extraction stage came up empty.
/// - [`IngestError::Embedding`] / [`IngestError::Storage`] when those stages fail;
///   nothing is stored without embeddings.
pub async fn ingest_file(
    services: &Services,
    path: &Path,
    filename: &str,
) -> Result<IngestReport, IngestError> {
    let document = Document::accept(filename)?;
    ingest_document(services, path, document).await
}

/// Run the pipeline for an already-accepted document stored at `path`.
#[instrument(skip_all, fields(filename = %document.filename, document_id = %document.id))]
pub async fn ingest_document(
    services: &Services,
    path: &Path,
    document: Document,
) -> Result<IngestReport, IngestError> {
    info!(format = %document.format, "processing document");

    let extractor = services.extractor.clone();
    let owned = path.to_path_buf();
    let format = document.format;
    let chunks = tokio::task::spawn_blocking(move || extractor.extract_chunks(&owned, format))
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e)))?;

    if chunks.is_empty() {
        return Err(IngestError::NothingExtractable {
            filename: document.filename,
        });
    }

    let embeddings = embed_texts(services.embedder.as_ref(), &chunks)
        .await
        .map_err(IngestError::Embedding)?;

    let stored = store_document(services.store.as_ref(), &document.id, &chunks, &embeddings).await?;

    Ok(IngestReport {
        document_id: document.id,
        filename: document.filename,
        format: document.format,
        chunks_stored: stored,
    })
}

/// Ingest an uploaded file's bytes.
///
/// The bytes are spooled to a temporary file in `[server].upload_dir` (or
/// the system temp directory) whose suffix keeps the document's extension.
/// That file is deleted whether ingestion succeeds or fails.
pub async fn ingest_bytes(
    services: &Services,
    bytes: &[u8],
    document: Document,
) -> Result<IngestReport, IngestError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("docmem-").suffix(document.format.extension());
    let mut tmp = match &services.config.server.upload_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            builder.tempfile_in(dir)?
        }
        None => builder.tempfile()?,
    };
    tmp.write_all(bytes)?;
    tmp.flush()?;
    debug!(path = %tmp.path().display(), bytes = bytes.len(), "spooled upload");

    let result = ingest_document(services, tmp.path(), document).await;

    match tmp.close() {
        Ok(()) => info!("removed temporary upload file"),
        Err(e) => warn!(error = %e, "failed to remove temporary upload file"),
    }
    result
}

/// Expand `paths` into the files to ingest. Directories are walked for
/// supported extensions; named files are kept as given.
///
/// Returns `(path, explicitly_named)` pairs.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<(PathBuf, bool)> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| DocumentFormat::from_filename(n).is_ok())
                })
                .collect();
            found.sort();
            files.extend(found.into_iter().map(|p| (p, false)));
        } else {
            files.push((path.clone(), true));
        }
    }
    files
}

/// `docmem ingest <paths>...`
///
/// Fails if any explicitly named file fails; failures of files found by
/// walking a directory are reported but do not change the exit status.
pub async fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let inputs = collect_inputs(paths);
    if inputs.is_empty() {
        bail!("No supported documents (.pdf, .docx, .pptx) found");
    }

    let services = Services::init(config.clone()).await?;

    let mut ingested = 0usize;
    let mut chunks = 0usize;
    let mut failed = 0usize;
    let mut failed_explicit = 0usize;

    for (path, explicit) in &inputs {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !path.is_file() {
            println!("  failed   {}: file not found", path.display());
            failed += 1;
            failed_explicit += usize::from(*explicit);
            continue;
        }

        match ingest_file(&services, path, &filename).await {
            Ok(report) => {
                println!(
                    "  ingested {} → {} ({} chunks)",
                    path.display(),
                    report.document_id,
                    report.chunks_stored
                );
                ingested += 1;
                chunks += report.chunks_stored;
            }
            Err(e) => {
                println!("  failed   {}: {} [{}]", path.display(), e, e.code());
                failed += 1;
                failed_explicit += usize::from(*explicit);
            }
        }
    }

    let total = services.store.count().await?;
    services.shutdown().await?;

    println!();
    println!("ingest");
    println!("  documents ingested: {}", ingested);
    println!("  chunks stored: {}", chunks);
    println!("  failed: {}", failed);
    println!("  collection total: {}", total);

    if failed_explicit > 0 {
        bail!("{} of {} named files failed to ingest", failed_explicit, inputs.len());
    }
    Ok(())
}
