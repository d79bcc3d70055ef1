//! OCR engine and page rasterizer seams.
//!
//! Both are external programs treated as black boxes: `tesseract` turns an
//! image into text, `pdftoppm` (poppler-utils) renders PDF pages to PNG.
//! Availability is checked once per instance; a missing binary makes the
//! dependent stage report itself unavailable instead of failing the document.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Recognizes text in a single image file.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn recognize(&self, image: &Path) -> Result<String>;
}

/// Renders PDF pages to image files.
pub trait PageRasterizer: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    /// Render every page of `pdf` at `dpi` into `out_dir`, returning the
    /// image paths in page order.
    fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Returns true if `cmd arg` can be spawned.
///
/// Only spawnability is checked: `pdftoppm -v` exits non-zero on some
/// poppler versions.
fn command_available(cmd: &str, arg: &str) -> bool {
    Command::new(cmd).arg(arg).output().is_ok()
}

/// Tesseract CLI: `tesseract <image> stdout -l <lang>`.
pub struct Tesseract {
    cmd: String,
    lang: String,
    available: OnceLock<bool>,
}

impl Tesseract {
    pub fn new(cmd: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            lang: lang.into(),
            available: OnceLock::new(),
        }
    }
}

impl OcrEngine for Tesseract {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| command_available(&self.cmd, "--version"))
    }

    fn recognize(&self, image: &Path) -> Result<String> {
        let output = Command::new(&self.cmd)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.lang])
            .output()
            .with_context(|| format!("failed to run {}", self.cmd))?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Poppler's `pdftoppm -png -r <dpi> <pdf> <out_dir>/page`.
pub struct Pdftoppm {
    cmd: String,
    available: OnceLock<bool>,
}

impl Pdftoppm {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            available: OnceLock::new(),
        }
    }
}

impl PageRasterizer for Pdftoppm {
    fn name(&self) -> &str {
        "pdftoppm"
    }

    fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| command_available(&self.cmd, "-v"))
    }

    fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let output = Command::new(&self.cmd)
            .arg("-png")
            .args(["-r", &dpi.to_string()])
            .arg(pdf)
            .arg(out_dir.join("page"))
            .output()
            .with_context(|| format!("failed to run {}", self.cmd))?;

        if !output.status.success() {
            bail!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(out_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .filter_map(|p| page_number(&p).map(|n| (n, p)))
            .collect();
        pages.sort_by_key(|(n, _)| *n);

        Ok(pages.into_iter().map(|(_, p)| p).collect())
    }
}

/// `page-007.png` → 7. pdftoppm zero-pads to the width of the page count.
fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .rsplit('-')
        .next()?
        .parse()
        .ok()
}
