//! End-to-end pipeline tests against in-process components.
//!
//! The OCR toolchain and the embedding model are replaced with deterministic
//! fakes so these run without tesseract, poppler, or model downloads.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use doc_memory::chunk::chunk_text;
use doc_memory::config::Config;
use doc_memory::embedding::EmbeddingProvider;
use doc_memory::error::IngestError;
use doc_memory::extract::ocr::{OcrEngine, PageRasterizer};
use doc_memory::extract::Extractor;
use doc_memory::ingest::{ingest_bytes, ingest_file};
use doc_memory::models::{Document, DocumentFormat};
use doc_memory::services::Services;
use doc_memory::store::{query_similar, store_document, InMemoryStore, SqliteStore, VectorStore};

// ============ Fakes ============

/// Letter-frequency embedding: texts sharing words land close together.
struct LetterEmbedder {
    calls: AtomicUsize,
}

impl LetterEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }
    fn dims(&self) -> usize {
        26
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.chars().filter(|c| c.is_ascii_alphabetic()) {
                    v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("model unavailable")
    }
}

/// Constant vectors of a fixed dimension.
struct FixedDimEmbedder(usize);

#[async_trait]
impl EmbeddingProvider for FixedDimEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }
    fn dims(&self) -> usize {
        self.0
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
    }
}

/// Returns the same text for every image.
struct ScriptedOcr(&'static str);

impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &str {
        "scripted"
    }
    fn is_available(&self) -> bool {
        true
    }
    fn recognize(&self, _image: &Path) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Writes one placeholder image per page.
struct FakeRasterizer {
    pages: usize,
}

impl PageRasterizer for FakeRasterizer {
    fn name(&self) -> &str {
        "fake"
    }
    fn is_available(&self) -> bool {
        true
    }
    fn rasterize(&self, _pdf: &Path, _dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        (0..self.pages)
            .map(|i| {
                let path = out_dir.join(format!("page-{}.png", i + 1));
                std::fs::write(&path, b"not really a png")?;
                Ok(path)
            })
            .collect()
    }
}

fn services_with(
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> Services {
    services_with_config(Config::default(), engine, rasterizer, embedder, store)
}

fn services_with_config(
    config: Config,
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> Services {
    let extractor = Extractor::with_toolchain(
        config.chunking.clone(),
        config.ocr.clone(),
        engine,
        rasterizer,
    );
    Services::with_components(config, extractor, embedder, store)
}

// ============ Fixtures ============

/// Single-page PDF whose content stream draws no text.
fn blank_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(
        b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << >> >> endobj\n",
    );
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 0 >> stream\n\nendstream endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 5\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 5 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

// ============ Scenarios ============

#[test]
fn clean_text_of_1200_chars_makes_three_chunks() {
    let text: String = "abcdefghij".repeat(120);
    let chunks = chunk_text(&text, 500, 50);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].chars().count(), 500);
    assert_eq!(chunks[1].chars().count(), 500);
    assert!(chunks[2].chars().count() < 500);
    assert_eq!(&chunks[0][450..], &chunks[1][..50]);
}

#[tokio::test]
async fn scanned_pdf_is_recovered_by_page_ocr() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("scan.pdf");
    std::fs::write(&path, blank_pdf()).unwrap();

    let store = Arc::new(InMemoryStore::new("pdf_memory"));
    let services = services_with(
        Arc::new(ScriptedOcr("Quarterly   revenue\nrose sharply")),
        Arc::new(FakeRasterizer { pages: 1 }),
        Arc::new(LetterEmbedder::new()),
        store.clone(),
    );

    let chunks = services
        .extractor
        .extract_chunks(&path, DocumentFormat::Pdf);
    assert_eq!(chunks, vec!["Quarterly revenue rose sharply".to_string()]);

    let report = ingest_file(&services, &path, "scan.pdf").await.unwrap();
    assert_eq!(report.chunks_stored, 1);
    assert_eq!(report.format, DocumentFormat::Pdf);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn pdf_with_no_text_anywhere_reports_nothing_extractable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("blank.pdf");
    std::fs::write(&path, blank_pdf()).unwrap();

    let embedder = Arc::new(LetterEmbedder::new());
    let store = Arc::new(InMemoryStore::new("pdf_memory"));
    let services = services_with(
        Arc::new(ScriptedOcr("   ")),
        Arc::new(FakeRasterizer { pages: 1 }),
        embedder.clone(),
        store.clone(),
    );

    assert!(services
        .extractor
        .extract_chunks(&path, DocumentFormat::Pdf)
        .is_empty());

    match ingest_file(&services, &path, "blank.pdf").await {
        Err(IngestError::NothingExtractable { filename }) => assert_eq!(filename, "blank.pdf"),
        other => panic!("expected NothingExtractable, got {:?}", other),
    }
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn restoring_same_document_id_does_not_duplicate() {
    let tmp = TempDir::new().unwrap();
    let sqlite = SqliteStore::open(&tmp.path().join("store.sqlite"), "pdf_memory")
        .await
        .unwrap();
    let stores: Vec<Box<dyn VectorStore>> =
        vec![Box::new(InMemoryStore::new("pdf_memory")), Box::new(sqlite)];

    let chunks: Vec<String> = (0..4).map(|i| format!("chunk number {}", i)).collect();
    let embeddings = LetterEmbedder::new().embed_batch(&chunks).await.unwrap();

    for store in &stores {
        store_document(store.as_ref(), "seed", &chunks[..1], &embeddings[..1])
            .await
            .unwrap();
        let before = store.count().await.unwrap();

        let first = store_document(store.as_ref(), "doc-1", &chunks, &embeddings)
            .await
            .unwrap();
        let second = store_document(store.as_ref(), "doc-1", &chunks, &embeddings)
            .await
            .unwrap();

        assert_eq!(first, 4);
        assert_eq!(second, 4);
        assert_eq!(store.count().await.unwrap(), before + 4);
        store.close().await.unwrap();
    }
}

// ============ Failure paths and queries ============

#[tokio::test]
async fn unsupported_extension_is_rejected_before_any_work() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("notes.txt");
    std::fs::write(&path, "plain text").unwrap();

    let embedder = Arc::new(LetterEmbedder::new());
    let services = services_with(
        Arc::new(ScriptedOcr("ignored")),
        Arc::new(FakeRasterizer { pages: 0 }),
        embedder.clone(),
        Arc::new(InMemoryStore::new("c")),
    );

    match ingest_file(&services, &path, "notes.txt").await {
        Err(IngestError::UnsupportedFormat { extension }) => assert_eq!(extension, ".txt"),
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_failure_stores_nothing() {
    let store = Arc::new(InMemoryStore::new("c"));
    let services = services_with(
        Arc::new(ScriptedOcr("")),
        Arc::new(FakeRasterizer { pages: 0 }),
        Arc::new(FailingEmbedder),
        store.clone(),
    );

    let bytes = docx_with_paragraphs(&["Some real content here."]);
    let err = ingest_bytes(&services, &bytes, Document::accept("a.docx").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Embedding(_)));
    assert_eq!(err.code(), "embedding_failed");
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn uploaded_bytes_are_ingested_and_queryable() {
    let store = Arc::new(InMemoryStore::new("c"));
    let embedder = Arc::new(LetterEmbedder::new());
    let services = services_with(
        Arc::new(ScriptedOcr("")),
        Arc::new(FakeRasterizer { pages: 0 }),
        embedder.clone(),
        store.clone(),
    );

    let long_paragraph = "zebra zoo zigzag ".repeat(40);
    let bytes = docx_with_paragraphs(&[&long_paragraph, "Apple banana cherry."]);
    let document = Document::accept("fruit.docx").unwrap();
    let document_id = document.id.clone();

    let report = ingest_bytes(&services, &bytes, document).await.unwrap();
    assert_eq!(report.document_id, document_id);
    assert!(report.chunks_stored >= 2);
    assert_eq!(store.count().await.unwrap(), report.chunks_stored);

    let matches = query_similar(embedder.as_ref(), store.as_ref(), "zebra zigzag", 100)
        .await
        .unwrap();
    assert_eq!(matches.len(), report.chunks_stored);
    assert!(matches[0].chunk_text.contains("zebra"));
    assert!(matches.iter().all(|m| m.document_id == document_id));
    assert!(matches.windows(2).all(|w| w[0].distance <= w[1].distance));
    let timestamp = &matches[0].timestamp;
    assert!(matches.iter().all(|m| &m.timestamp == timestamp));
}

#[tokio::test]
async fn query_on_empty_store_skips_embedding() {
    let embedder = LetterEmbedder::new();
    let store = InMemoryStore::new("c");
    let matches = query_similar(&embedder, &store, "anything", 5).await.unwrap();
    assert!(matches.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_with_a_different_model_dimension_is_a_storage_error() {
    let store = InMemoryStore::new("c");
    let chunks = vec!["first".to_string(), "second".to_string()];
    let embeddings = FixedDimEmbedder(3).embed_batch(&chunks).await.unwrap();
    store_document(&store, "doc", &chunks, &embeddings)
        .await
        .unwrap();

    let err = query_similar(&FixedDimEmbedder(2), &store, "first", 2)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Storage(_)), "got {:?}", err);
    assert_eq!(err.code(), "storage_failed");
}

// ============ Upload spool cleanup ============

fn spooling_services(
    upload_dir: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> Services {
    let mut config = Config::default();
    config.ocr.enabled = false;
    config.server.upload_dir = Some(upload_dir.to_path_buf());
    services_with_config(
        config,
        Arc::new(ScriptedOcr("")),
        Arc::new(FakeRasterizer { pages: 0 }),
        embedder,
        store,
    )
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn upload_spool_is_removed_after_success() {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    let store = Arc::new(InMemoryStore::new("c"));
    let services = spooling_services(&uploads, Arc::new(LetterEmbedder::new()), store.clone());

    let bytes = docx_with_paragraphs(&["Spooled and then removed."]);
    let report = ingest_bytes(&services, &bytes, Document::accept("ok.docx").unwrap())
        .await
        .unwrap();
    assert_eq!(report.chunks_stored, 1);
    assert!(uploads.is_dir());
    assert_eq!(entries(&uploads), 0);
}

#[tokio::test]
async fn upload_spool_is_removed_when_nothing_is_extractable() {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    let services = spooling_services(
        &uploads,
        Arc::new(LetterEmbedder::new()),
        Arc::new(InMemoryStore::new("c")),
    );

    let bytes = docx_with_paragraphs(&[]);
    let err = ingest_bytes(&services, &bytes, Document::accept("empty.docx").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NothingExtractable { .. }));
    assert_eq!(entries(&uploads), 0);
}

#[tokio::test]
async fn upload_spool_is_removed_when_embedding_fails() {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    let services = spooling_services(
        &uploads,
        Arc::new(FailingEmbedder),
        Arc::new(InMemoryStore::new("c")),
    );

    let bytes = docx_with_paragraphs(&["Never embedded."]);
    let err = ingest_bytes(&services, &bytes, Document::accept("x.docx").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Embedding(_)));
    assert_eq!(entries(&uploads), 0);
}
