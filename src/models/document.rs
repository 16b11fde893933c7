//! Document models for page ingestion and content analysis.
//!
//! A `Document` is the immutable artifact produced by the ingestion and
//! analysis stages. Pages carry the raw OCR text plus an inferred layout of
//! classified elements in reading order; downstream stages consume them
//! read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a single content unit within a page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Text,
    Heading,
    List,
    Table,
    Image,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Heading => "heading",
            Self::List => "list",
            Self::Table => "table",
            Self::Image => "image",
        }
    }
}

/// Inferred text styling for an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Font size in page points.
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    /// CSS-style hex color, when known.
    pub color: Option<String>,
}

/// Bounding box in page-pixel space.
///
/// Positions are approximated from reading order (running vertical offset),
/// not recovered from the OCR engine, so they are layout hints rather than
/// pixel-accurate coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One classified content unit on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub content: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
}

impl Element {
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Page layout: pixel dimensions plus elements in reading order.
///
/// Element ordering is stable after classification and is never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub elements: Vec<Element>,
}

impl Layout {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            elements: Vec::new(),
        }
    }
}

/// One source page, created once by the ingestor and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number, contiguous across the document.
    pub page_number: u32,
    /// Raw OCR text for the page.
    pub text: String,
    /// Embedded raster images extracted from the page, base64-encoded.
    pub images: Vec<String>,
    pub layout: Layout,
}

impl Page {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Document-level complexity classification derived from element density
/// and image count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// Whole-document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub page_count: u32,
    pub created_at: DateTime<Utc>,
}

/// The processed source document: ordered pages plus derived analysis
/// fields. Immutable after ingestion and analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub metadata: Metadata,
    pub pages: Vec<Page>,
    /// Free-text summary assembled from the first meaningful sentences.
    pub summary: String,
    /// Ranked keyword topics, most frequent first.
    pub key_topics: Vec<String>,
    /// Estimated narration duration in seconds.
    pub estimated_duration: f64,
    pub complexity: Complexity,
}

impl Document {
    pub fn page(&self, page_number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    pub fn total_word_count(&self) -> usize {
        self.pages.iter().map(Page::word_count).sum()
    }

    pub fn total_image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}
