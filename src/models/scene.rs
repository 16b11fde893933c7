//! Scene and video composition models.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Transition style at a scene boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Hard cut, no blending.
    Cut,
    Fade,
    Slide,
    Zoom,
    Dissolve,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cut => "cut",
            Self::Fade => "fade",
            Self::Slide => "slide",
            Self::Zoom => "zoom",
            Self::Dissolve => "dissolve",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cut" => Some(Self::Cut),
            "fade" => Some(Self::Fade),
            "slide" => Some(Self::Slide),
            "zoom" => Some(Self::Zoom),
            "dissolve" => Some(Self::Dissolve),
            _ => None,
        }
    }
}

/// Transition descriptor: style plus blend duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration: f64,
}

impl Transition {
    pub fn cut() -> Self {
        Self {
            kind: TransitionKind::Cut,
            duration: 0.0,
        }
    }
}

/// Text burned into a scene over a timing window.
///
/// Positions and font sizes are in target video-pixel space; the composer
/// scales them from page space before the assembler sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub font_size: u32,
    /// CSS-style hex color.
    pub font_color: String,
    /// Background box color, when the text is boxed (subtitles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_color: Option<String>,
    /// Window start, seconds from scene start.
    pub start: f64,
    /// Window end, seconds from scene start.
    pub end: f64,
}

/// One unit of video composition, corresponding to exactly one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Stable identifier, `scene_{page}`.
    pub id: String,
    pub page_number: u32,
    /// Scene duration in seconds, always at least the configured floor.
    pub duration: f64,
    /// Rendered slide background for the page.
    pub slide_path: PathBuf,
    /// Narration track for the page, absent when synthesis produced nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_path: Option<PathBuf>,
    pub transition_in: Transition,
    pub transition_out: Transition,
    pub overlays: Vec<TextOverlay>,
}

/// Container metadata probed from the final video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration: f64,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
}

/// Final output of the assembly stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedVideo {
    pub video_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub metadata: VideoMetadata,
    pub scenes: Vec<Scene>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}
