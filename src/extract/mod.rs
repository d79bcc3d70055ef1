//! Text extraction: format dispatch, the stage cascade, and normalization.
//!
//! Each format maps to an ordered list of [`ExtractionStage`]s. A
//! [`Cascade`] runs all of them, isolating failures: a stage that errors or
//! panics contributes nothing and the next stage still runs. Non-empty
//! stage outputs are whitespace-normalized and joined with single spaces in
//! stage order.
//!
//! | Format | Stages |
//! |--------|--------|
//! | PDF | native text layer → full-page OCR → embedded-image OCR |
//! | DOCX | body paragraphs |
//! | PPTX | slide shapes |

pub mod ocr;
pub mod ooxml;
pub mod pdf;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config, OcrConfig};
use crate::models::DocumentFormat;
use ocr::{OcrEngine, PageRasterizer, Pdftoppm, Tesseract};

/// One independent strategy for pulling text out of a file.
pub trait ExtractionStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Supplementary stages only add recall on top of a primary text
    /// source; they may be skipped once earlier stages found text.
    fn is_supplementary(&self) -> bool {
        false
    }

    fn extract(&self, path: &Path) -> anyhow::Result<String>;
}

/// An ordered, failure-isolated sequence of stages.
pub struct Cascade {
    stages: Vec<Box<dyn ExtractionStage>>,
    skip_supplementary_after_text: bool,
}

impl Cascade {
    pub fn new(stages: Vec<Box<dyn ExtractionStage>>) -> Self {
        Self {
            stages,
            skip_supplementary_after_text: false,
        }
    }

    pub fn skip_supplementary_after_text(mut self, skip: bool) -> Self {
        self.skip_supplementary_after_text = skip;
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage and concatenate the non-empty outputs. Never fails.
    pub fn run(&self, path: &Path) -> String {
        let mut parts: Vec<String> = Vec::new();
        for stage in &self.stages {
            if self.skip_supplementary_after_text && stage.is_supplementary() && !parts.is_empty() {
                info!(stage = stage.name(), "text layer present, skipping stage");
                continue;
            }
            let text = run_stage(stage.as_ref(), path);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join(" ")
    }
}

#[instrument(skip_all, fields(stage = stage.name()))]
fn run_stage(stage: &dyn ExtractionStage, path: &Path) -> String {
    match catch_unwind(AssertUnwindSafe(|| stage.extract(path))) {
        Ok(Ok(text)) => {
            let text = normalize_whitespace(&text);
            if text.is_empty() {
                info!(stage = stage.name(), "stage produced no text");
            } else {
                info!(stage = stage.name(), chars = text.chars().count(), "stage extracted text");
            }
            text
        }
        Ok(Err(e)) => {
            warn!(stage = stage.name(), error = %format!("{:#}", e), "extraction stage failed");
            String::new()
        }
        Err(_) => {
            warn!(stage = stage.name(), "extraction stage panicked");
            String::new()
        }
    }
}

/// Collapse every run of whitespace (newlines and tabs included) to a single
/// space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format-aware front end over the cascades, owning the OCR toolchain.
pub struct Extractor {
    chunking: ChunkingConfig,
    ocr: OcrConfig,
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl Extractor {
    /// Extractor backed by the `tesseract` and `pdftoppm` binaries named in
    /// the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::with_toolchain(
            config.chunking.clone(),
            config.ocr.clone(),
            Arc::new(Tesseract::new(&config.ocr.tesseract_cmd, &config.ocr.lang)),
            Arc::new(Pdftoppm::new(&config.ocr.pdftoppm_cmd)),
        )
    }

    pub fn with_toolchain(
        chunking: ChunkingConfig,
        ocr: OcrConfig,
        engine: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            chunking,
            ocr,
            engine,
            rasterizer,
        }
    }

    pub fn cascade_for(&self, format: DocumentFormat) -> Cascade {
        match format {
            DocumentFormat::Pdf => {
                let mut stages: Vec<Box<dyn ExtractionStage>> = vec![Box::new(pdf::NativeTextStage)];
                if self.ocr.enabled {
                    stages.push(Box::new(pdf::PageOcrStage::new(
                        self.engine.clone(),
                        self.rasterizer.clone(),
                        self.ocr.dpi,
                    )));
                    stages.push(Box::new(pdf::EmbeddedImageOcrStage::new(self.engine.clone())));
                }
                Cascade::new(stages).skip_supplementary_after_text(self.ocr.skip_when_text_layer)
            }
            DocumentFormat::Docx => Cascade::new(vec![Box::new(ooxml::DocxStage)]),
            DocumentFormat::Pptx => Cascade::new(vec![Box::new(ooxml::PptxStage)]),
        }
    }

    /// Normalized text of `path`; empty when nothing could be extracted.
    pub fn extract_text(&self, path: &Path, format: DocumentFormat) -> String {
        self.cascade_for(format).run(path)
    }

    /// Extract, normalize and chunk `path`. An empty result means no stage
    /// produced text.
    pub fn extract_chunks(&self, path: &Path, format: DocumentFormat) -> Vec<String> {
        let text = self.extract_text(path, format);
        if text.is_empty() {
            warn!(path = %path.display(), "no text could be extracted");
            return Vec::new();
        }
        info!(chars = text.chars().count(), "extracted text");

        let chunks = chunk_text(&text, self.chunking.chunk_size, self.chunking.overlap);
        info!(
            chunks = chunks.len(),
            chunk_size = self.chunking.chunk_size,
            overlap = self.chunking.overlap,
            "created chunks"
        );
        chunks
    }
}
