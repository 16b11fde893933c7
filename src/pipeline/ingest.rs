//! Document ingestion: rasterization, OCR, and layout inference.
//!
//! Each page is rasterized and recognized independently, so a failing page
//! is reported on its own while the rest of the document proceeds. True
//! element coordinates are not recoverable from OCR text, so vertical
//! positions are assigned by running offset at a fixed line height.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{IngestSettings, RetrySettings};
use crate::engines::{with_retry, EngineError, OcrEngine};
use crate::models::{Element, ElementType, Layout, Metadata, Page, Position, Style};
use crate::utils::text::is_all_caps;
use crate::workdir::Workdir;

use super::{run_pool, CancelFlag, PipelineEvent, Stage};

/// Errors raised during document ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("document has no pages")]
    EmptyDocument,

    #[error("page {page}: {source}")]
    Page {
        page: u32,
        #[source]
        source: EngineError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of ingesting one document: pages that succeeded, per-page
/// failures, and document metadata.
#[derive(Debug)]
pub struct IngestOutcome {
    pub metadata: Metadata,
    pub pages: Vec<Page>,
    pub failures: Vec<(u32, String)>,
}

/// Pure line classification seam, so the shape heuristics can be swapped
/// for a layout-aware extractor without touching downstream stages.
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> ElementType;
}

/// Default classifier driven by string shape: case, length, punctuation,
/// and leading markers.
pub struct ShapeClassifier {
    numbered_list: Regex,
}

impl Default for ShapeClassifier {
    fn default() -> Self {
        Self {
            numbered_list: Regex::new(r"^\d{1,3}[.)]\s").expect("static regex"),
        }
    }
}

impl LineClassifier for ShapeClassifier {
    fn classify(&self, line: &str) -> ElementType {
        if line.starts_with(['-', '•', '*', '·']) || self.numbered_list.is_match(line) {
            return ElementType::List;
        }
        if line.contains('|') || line.contains('\t') {
            return ElementType::Table;
        }
        let lower = line.to_lowercase();
        if lower.contains("figure") || lower.contains("image") || lower.contains("fig.") {
            return ElementType::Image;
        }
        if is_all_caps(line) || (line.len() < 50 && !line.ends_with(['.', ',', ';', ':'])) {
            return ElementType::Heading;
        }
        ElementType::Text
    }
}

/// Infer a page layout from raw OCR text.
///
/// Non-empty lines become elements in reading order; positions are a
/// running vertical offset in raster-pixel space.
pub fn infer_layout(
    classifier: &dyn LineClassifier,
    text: &str,
    (width, height): (u32, u32),
    opts: &IngestSettings,
) -> Layout {
    const MARGIN_X: f32 = 60.0;
    const MARGIN_Y: f32 = 50.0;
    const CHAR_WIDTH: f32 = 12.0;

    let mut elements = Vec::new();
    let mut offset = MARGIN_Y;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.len() < opts.min_text_length {
            continue;
        }

        let element_type = classifier.classify(line);
        let style = match element_type {
            ElementType::Heading => Some(Style {
                font_size: 24.0,
                bold: true,
                italic: false,
                color: None,
            }),
            _ => None,
        };

        let position = if opts.preserve_layout {
            Position {
                x: MARGIN_X,
                y: offset,
                width: (line.len() as f32 * CHAR_WIDTH).min(width as f32 - 2.0 * MARGIN_X),
                height: opts.line_height,
            }
        } else {
            Position {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
            }
        };

        elements.push(Element {
            element_type,
            content: line.to_string(),
            position,
            style,
        });
        offset += opts.line_height;
    }

    Layout {
        width,
        height,
        elements,
    }
}

pub struct DocumentIngestor {
    ocr: Arc<dyn OcrEngine>,
    classifier: Arc<dyn LineClassifier>,
    opts: IngestSettings,
    retry: RetrySettings,
}

impl DocumentIngestor {
    pub fn new(ocr: Arc<dyn OcrEngine>, opts: IngestSettings, retry: RetrySettings) -> Self {
        Self {
            ocr,
            classifier: Arc::new(ShapeClassifier::default()),
            opts,
            retry,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn LineClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Ingest a document: rasterize and recognize every page in a bounded
    /// worker pool, collecting pages in page order.
    ///
    /// A per-page engine failure isolates that page; a document that cannot
    /// be opened or has no pages fails the whole ingestion.
    pub async fn ingest(
        &self,
        input: &Path,
        workdir: &Workdir,
        workers: usize,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: &CancelFlag,
    ) -> Result<IngestOutcome, IngestError> {
        if !input.exists() {
            return Err(IngestError::NotFound(input.to_path_buf()));
        }

        let page_count = self
            .ocr
            .page_count(input)
            .map_err(|e| IngestError::Malformed(e.to_string()))?;
        if page_count == 0 {
            return Err(IngestError::EmptyDocument);
        }

        let _ = events
            .send(PipelineEvent::StageStarted {
                stage: Stage::Ingest,
                total_units: page_count as usize,
            })
            .await;

        let units: Vec<(u32, PathBuf, PathBuf)> = (1..=page_count)
            .map(|n| (n, workdir.raster_prefix(n), workdir.images_prefix(n)))
            .collect();

        let ocr = self.ocr.clone();
        let classifier = self.classifier.clone();
        let opts = self.opts.clone();
        let retry = self.retry.clone();
        let input_path = input.to_path_buf();
        let events_tx = events.clone();
        let cancel_flag = cancel.clone();

        let worker = Arc::new(
            move |(page, raster_prefix, images_prefix): (u32, PathBuf, PathBuf)| {
                let unit = format!("page_{}", page);
                let _ = futures::executor::block_on(events_tx.send(PipelineEvent::UnitStarted {
                    stage: Stage::Ingest,
                    unit: unit.clone(),
                }));

                let result = ingest_page(
                    ocr.as_ref(),
                    classifier.as_ref(),
                    &input_path,
                    page,
                    &raster_prefix,
                    &images_prefix,
                    &opts,
                    &retry,
                    &cancel_flag,
                );

                match &result {
                    Ok(_) => {
                        let _ =
                            futures::executor::block_on(events_tx.send(PipelineEvent::UnitCompleted {
                                stage: Stage::Ingest,
                                unit,
                            }));
                    }
                    Err(e) => {
                        tracing::warn!("ingestion failed for page {}: {}", page, e);
                        let _ =
                            futures::executor::block_on(events_tx.send(PipelineEvent::UnitFailed {
                                stage: Stage::Ingest,
                                unit,
                                error: e.to_string(),
                            }));
                    }
                }

                (page, result)
            },
        );

        let results = run_pool(workers, units, cancel, worker).await;

        let mut pages = Vec::new();
        let mut failures = Vec::new();
        for (page, result) in results {
            match result {
                Ok(p) => pages.push(p),
                Err(e) => failures.push((page, e.to_string())),
            }
        }
        pages.sort_by_key(|p| p.page_number);
        failures.sort_by_key(|(n, _)| *n);

        let _ = events
            .send(PipelineEvent::StageCompleted {
                stage: Stage::Ingest,
                succeeded: pages.len(),
                failed: failures.len(),
            })
            .await;

        let title = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        Ok(IngestOutcome {
            metadata: Metadata {
                title,
                author: None,
                page_count,
                created_at: chrono::Utc::now(),
            },
            pages,
            failures,
        })
    }
}

/// Process a single page: rasterize, recognize, infer layout, and extract
/// embedded images. Raster scratch files are removed before returning.
#[allow(clippy::too_many_arguments)]
fn ingest_page(
    ocr: &dyn OcrEngine,
    classifier: &dyn LineClassifier,
    input: &Path,
    page: u32,
    raster_prefix: &Path,
    images_prefix: &Path,
    opts: &IngestSettings,
    retry: &RetrySettings,
    cancel: &CancelFlag,
) -> Result<Page, IngestError> {
    let delay = Duration::from_millis(retry.base_delay_ms);

    let raster = with_retry(retry.attempts, delay, cancel, || {
        ocr.rasterize_page(input, page, raster_prefix)
    })
    .map_err(|source| IngestError::Page { page, source })?;

    let dimensions = image::image_dimensions(&raster).map_err(|e| IngestError::Page {
        page,
        source: EngineError::Failed {
            tool: "raster".to_string(),
            message: format!("unreadable page raster: {}", e),
        },
    })?;

    let text = with_retry(retry.attempts, delay, cancel, || {
        ocr.recognize(&raster, &opts.ocr_language)
    })
    .map_err(|source| IngestError::Page { page, source });

    let _ = std::fs::remove_file(&raster);
    let text = text?;

    let layout = infer_layout(classifier, &text, dimensions, opts);
    if layout.elements.is_empty() {
        tracing::warn!("page {} produced no layout elements", page);
    }

    let mut images = Vec::new();
    if opts.extract_images {
        match ocr.extract_images(input, page, images_prefix) {
            Ok(paths) => {
                for path in paths {
                    match std::fs::read(&path) {
                        Ok(bytes) => {
                            images.push(base64::engine::general_purpose::STANDARD.encode(bytes));
                        }
                        Err(e) => tracing::warn!(
                            "failed to read extracted image {}: {}",
                            path.display(),
                            e
                        ),
                    }
                    let _ = std::fs::remove_file(&path);
                }
            }
            // Missing embedded images are not fatal to the page.
            Err(e) => tracing::warn!("image extraction failed for page {}: {}", page, e),
        }
    }

    Ok(Page {
        page_number: page,
        text,
        images,
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> ElementType {
        ShapeClassifier::default().classify(line)
    }

    #[test]
    fn all_caps_lines_are_headings() {
        assert_eq!(classify("SAFETY NOTICE"), ElementType::Heading);
        assert_eq!(classify("INTRODUCTION"), ElementType::Heading);
    }

    #[test]
    fn short_titleish_lines_are_headings() {
        assert_eq!(classify("Getting Started"), ElementType::Heading);
    }

    #[test]
    fn bullet_and_numbered_lines_are_lists() {
        assert_eq!(classify("- first point"), ElementType::List);
        assert_eq!(classify("• second point"), ElementType::List);
        assert_eq!(classify("3. third point"), ElementType::List);
        assert_eq!(classify("12) twelfth point"), ElementType::List);
    }

    #[test]
    fn delimited_lines_are_tables() {
        assert_eq!(classify("name | role | office"), ElementType::Table);
        assert_eq!(classify("a\tb\tc"), ElementType::Table);
    }

    #[test]
    fn figure_references_are_images() {
        assert_eq!(
            classify("Figure 2 shows the wiring diagram for the panel assembly."),
            ElementType::Image
        );
    }

    #[test]
    fn long_prose_is_text() {
        assert_eq!(
            classify("The inspection procedure must be carried out before every shift begins."),
            ElementType::Text
        );
    }

    #[test]
    fn layout_preserves_reading_order_with_running_offsets() {
        let opts = IngestSettings::default();
        let text = "OVERVIEW\nThe quick brown fox jumps over the lazy dog near the river bank.\n- item one\n";
        let layout = infer_layout(&ShapeClassifier::default(), text, (1275, 1650), &opts);

        assert_eq!(layout.elements.len(), 3);
        assert_eq!(layout.elements[0].element_type, ElementType::Heading);
        assert_eq!(layout.elements[1].element_type, ElementType::Text);
        assert_eq!(layout.elements[2].element_type, ElementType::List);
        assert!(layout.elements[0].position.y < layout.elements[1].position.y);
        assert!(layout.elements[1].position.y < layout.elements[2].position.y);
    }

    #[test]
    fn short_lines_below_threshold_are_dropped() {
        let opts = IngestSettings::default();
        let layout = infer_layout(&ShapeClassifier::default(), "ab\n\nREAL HEADING\n", (800, 600), &opts);
        assert_eq!(layout.elements.len(), 1);
        assert_eq!(layout.elements[0].content, "REAL HEADING");
    }

    #[test]
    fn empty_text_yields_empty_layout() {
        let opts = IngestSettings::default();
        let layout = infer_layout(&ShapeClassifier::default(), "", (800, 600), &opts);
        assert!(layout.elements.is_empty());
        assert_eq!(layout.width, 800);
    }

    #[test]
    fn headings_carry_bold_style() {
        let opts = IngestSettings::default();
        let layout = infer_layout(&ShapeClassifier::default(), "SAFETY NOTICE\n", (800, 600), &opts);
        let style = layout.elements[0].style.as_ref().unwrap();
        assert!(style.bold);
    }
}
