//! OCR engine backed by Tesseract and the poppler utilities.
//!
//! Rasterization uses `pdftoppm`, page counting `pdfinfo`, embedded image
//! extraction `pdfimages`, and text recognition `tesseract`. All four are
//! invoked per call with no shared state.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::utils::cancel::CancelFlag;

use super::{run_capture, run_status, EngineError, OcrEngine};

/// Default rasterization density in DPI.
pub const DEFAULT_DPI: u32 = 150;

pub struct TesseractOcr {
    dpi: u32,
    cancel: CancelFlag,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(DEFAULT_DPI)
    }
}

impl TesseractOcr {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag so in-flight tool invocations are killed
    /// when a run is cancelled.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Find an output image produced with `prefix`. pdftoppm pads page
    /// numbers to a document-dependent width (page-01.png, page-001.png).
    fn find_output_image(prefix: &Path, page: u32) -> Option<PathBuf> {
        let parent = prefix.parent()?;
        let stem = prefix.file_name()?.to_string_lossy();
        for digits in [1, 2, 3, 4] {
            let candidate = parent.join(format!("{}-{:0width$}.png", stem, page, width = digits));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}

impl OcrEngine for TesseractOcr {
    fn page_count(&self, document: &Path) -> Result<u32, EngineError> {
        let stdout = run_capture(
            Command::new("pdfinfo").arg(document),
            "pdfinfo (install poppler-utils)",
            &self.cancel,
        )?;

        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix("Pages:") {
                if let Ok(count) = rest.trim().parse() {
                    return Ok(count);
                }
            }
        }

        Err(EngineError::Failed {
            tool: "pdfinfo".to_string(),
            message: format!("no page count reported for {}", document.display()),
        })
    }

    fn rasterize_page(
        &self,
        document: &Path,
        page: u32,
        out_prefix: &Path,
    ) -> Result<PathBuf, EngineError> {
        let page_str = page.to_string();
        run_status(
            Command::new("pdftoppm")
                .args(["-png", "-r", &self.dpi.to_string(), "-f", &page_str, "-l", &page_str])
                .arg(document)
                .arg(out_prefix),
            "pdftoppm (install poppler-utils)",
            &format!("failed to rasterize page {}", page),
            &self.cancel,
        )?;

        Self::find_output_image(out_prefix, page).ok_or_else(|| EngineError::Failed {
            tool: "pdftoppm".to_string(),
            message: format!("no raster produced for page {}", page),
        })
    }

    fn recognize(&self, image: &Path, language: &str) -> Result<String, EngineError> {
        run_capture(
            Command::new("tesseract")
                .arg(image)
                .arg("stdout")
                .args(["-l", language]),
            "tesseract (install tesseract-ocr)",
            &self.cancel,
        )
    }

    fn extract_images(
        &self,
        document: &Path,
        page: u32,
        out_prefix: &Path,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let page_str = page.to_string();
        run_status(
            Command::new("pdfimages")
                .args(["-png", "-f", &page_str, "-l", &page_str])
                .arg(document)
                .arg(out_prefix),
            "pdfimages (install poppler-utils)",
            &format!("failed to extract images from page {}", page),
            &self.cancel,
        )?;

        let parent = out_prefix.parent().unwrap_or(Path::new("."));
        let stem = out_prefix
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut images: Vec<PathBuf> = std::fs::read_dir(parent)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().map(|ext| ext == "png").unwrap_or(false)
                    && p.file_name()
                        .map(|n| n.to_string_lossy().starts_with(&stem))
                        .unwrap_or(false)
            })
            .collect();
        images.sort();
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_image_lookup_handles_padding_widths() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("page");
        std::fs::write(dir.path().join("page-007.png"), b"png").unwrap();
        let found = TesseractOcr::find_output_image(&prefix, 7).unwrap();
        assert!(found.ends_with("page-007.png"));
        assert!(TesseractOcr::find_output_image(&prefix, 8).is_none());
    }
}
