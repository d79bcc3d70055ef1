//! PDF extraction stages.
//!
//! | Stage | Source | Output |
//! |-------|--------|--------|
//! | [`NativeTextStage`] | embedded text layer | non-blank pages, one per line |
//! | [`PageOcrStage`] | every page rasterized, then OCR | non-blank pages, one per line |
//! | [`EmbeddedImageOcrStage`] | image XObjects on each page, then OCR | non-blank images, one per line |
//!
//! The OCR stages swallow per-page and per-image failures; a stage only
//! errors when it cannot run at all.

use anyhow::{anyhow, bail, Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::borrow::Cow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ocr::{OcrEngine, PageRasterizer};
use super::ExtractionStage;

/// Text layer via `pdf-extract`, with `lopdf` as a fallback for files
/// `pdf-extract` rejects or panics on.
pub struct NativeTextStage;

impl ExtractionStage for NativeTextStage {
    fn name(&self) -> &'static str {
        "native_text"
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let pages = match catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_by_pages(path)
        })) {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                debug!(error = %e, "pdf-extract failed, trying lopdf");
                lopdf_pages(path)?
            }
            Err(_) => {
                debug!("pdf-extract panicked, trying lopdf");
                lopdf_pages(path)?
            }
        };

        Ok(join_non_blank(pages.iter().map(String::as_str)))
    }
}

fn lopdf_pages(path: &Path) -> Result<Vec<String>> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(doc
        .get_pages()
        .keys()
        .map(|n| doc.extract_text(&[*n]).unwrap_or_default())
        .collect())
}

fn join_non_blank<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rasterize each page and OCR it. Recovers text from scanned documents.
pub struct PageOcrStage {
    engine: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    dpi: u32,
}

impl PageOcrStage {
    pub fn new(engine: Arc<dyn OcrEngine>, rasterizer: Arc<dyn PageRasterizer>, dpi: u32) -> Self {
        Self {
            engine,
            rasterizer,
            dpi,
        }
    }
}

impl ExtractionStage for PageOcrStage {
    fn name(&self) -> &'static str {
        "page_ocr"
    }

    fn is_supplementary(&self) -> bool {
        true
    }

    fn extract(&self, path: &Path) -> Result<String> {
        if !self.rasterizer.is_available() {
            bail!(
                "{} not available (install poppler-utils)",
                self.rasterizer.name()
            );
        }
        if !self.engine.is_available() {
            bail!("{} not available", self.engine.name());
        }

        let workdir = tempfile::TempDir::new()?;
        let pages = self.rasterizer.rasterize(path, self.dpi, workdir.path())?;
        info!(pages = pages.len(), dpi = self.dpi, "running OCR on rendered pages");

        let mut texts = Vec::new();
        for (i, page) in pages.iter().enumerate() {
            match self.engine.recognize(page) {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        debug!(page = i + 1, "no text detected");
                    } else {
                        debug!(page = i + 1, chars = text.len(), "page OCR text");
                        texts.push(text.to_string());
                    }
                }
                Err(e) => warn!(page = i + 1, error = %format!("{:#}", e), "OCR failed for page"),
            }
        }
        Ok(texts.join("\n"))
    }
}

/// OCR every image XObject drawn on each page. Recovers text baked into
/// figures and screenshots of otherwise digital documents.
pub struct EmbeddedImageOcrStage {
    engine: Arc<dyn OcrEngine>,
}

impl EmbeddedImageOcrStage {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

impl ExtractionStage for EmbeddedImageOcrStage {
    fn name(&self) -> &'static str {
        "embedded_image_ocr"
    }

    fn is_supplementary(&self) -> bool {
        true
    }

    fn extract(&self, path: &Path) -> Result<String> {
        if !self.engine.is_available() {
            bail!("{} not available", self.engine.name());
        }

        let doc = lopdf::Document::load(path)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let workdir = tempfile::TempDir::new()?;

        let mut texts = Vec::new();
        let mut seen = 0usize;
        for (page_num, page_id) in doc.get_pages() {
            let images = match doc.get_page_images(page_id) {
                Ok(images) => images,
                Err(e) => {
                    debug!(page = page_num, error = %e, "no readable images on page");
                    continue;
                }
            };

            for (idx, image) in images.iter().enumerate() {
                seen += 1;
                let raw = RawImage {
                    width: u32::try_from(image.width).unwrap_or(0),
                    height: u32::try_from(image.height).unwrap_or(0),
                    color_space: image.color_space.as_deref(),
                    filters: image.filters.as_deref().unwrap_or(&[]),
                    bits_per_component: image.bits_per_component,
                };
                let out = workdir.path().join(format!("p{}-{}.png", page_num, idx));
                let result = raw
                    .data(&doc, image.id, image.content)
                    .and_then(|data| raw.decode(&data))
                    .and_then(|img| {
                        img.to_rgb8().save_with_format(&out, ImageFormat::Png)?;
                        self.engine.recognize(&out)
                    });
                match result {
                    Ok(text) => {
                        let text = text.trim();
                        if !text.is_empty() {
                            texts.push(text.to_string());
                        }
                    }
                    Err(e) => warn!(
                        page = page_num,
                        image = idx,
                        error = %format!("{:#}", e),
                        "skipping embedded image"
                    ),
                }
            }
        }

        if seen > 0 {
            info!(images = seen, with_text = texts.len(), "processed embedded images");
        }
        Ok(texts.join("\n"))
    }
}

/// Image XObject parameters needed to turn stream bytes into pixels.
struct RawImage<'a> {
    width: u32,
    height: u32,
    color_space: Option<&'a str>,
    filters: &'a [String],
    bits_per_component: Option<i64>,
}

impl RawImage<'_> {
    fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f == name)
    }

    /// Stream bytes ready for [`RawImage::decode`]: JPEG bytes as stored,
    /// everything else decompressed.
    fn data<'d>(
        &self,
        doc: &lopdf::Document,
        id: lopdf::ObjectId,
        content: &'d [u8],
    ) -> Result<Cow<'d, [u8]>> {
        if self.filters.is_empty() || self.has_filter("DCTDecode") {
            return Ok(Cow::Borrowed(content));
        }
        let stream = doc.get_object(id)?.as_stream()?;
        Ok(Cow::Owned(stream.decompressed_content()?))
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage> {
        if self.has_filter("DCTDecode") {
            return Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?);
        }
        if let Some(other) = self
            .filters
            .iter()
            .find(|f| f.as_str() != "FlateDecode")
        {
            bail!("unsupported image filter {}", other);
        }
        if self.bits_per_component != Some(8) {
            bail!(
                "unsupported bits per component {:?}",
                self.bits_per_component
            );
        }
        if self.width == 0 || self.height == 0 {
            bail!("image has no pixels");
        }

        let pixels = self.width as usize * self.height as usize;
        let channels = match self.color_space {
            Some("DeviceRGB") | Some("CalRGB") => 3,
            Some("DeviceGray") | Some("CalGray") => 1,
            // ICC-based and unnamed spaces: infer from the buffer size.
            _ if data.len() == pixels * 3 => 3,
            _ if data.len() == pixels => 1,
            other => bail!("unsupported color space {:?}", other),
        };

        let expected = pixels * channels;
        if data.len() < expected {
            bail!(
                "image data too short: {} bytes for {}x{}x{}",
                data.len(),
                self.width,
                self.height,
                channels
            );
        }
        let buf = data[..expected].to_vec();

        let img = if channels == 3 {
            RgbImage::from_raw(self.width, self.height, buf).map(DynamicImage::ImageRgb8)
        } else {
            GrayImage::from_raw(self.width, self.height, buf).map(DynamicImage::ImageLuma8)
        };
        img.ok_or_else(|| anyhow!("pixel buffer does not match dimensions"))
    }
}
