//! Narration models: speech segments, voice parameters, and tone.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Coarse narration style driving voice selection, pitch, and emphasis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Formal,
    Casual,
    Enthusiastic,
    Serious,
    Friendly,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Enthusiastic => "enthusiastic",
            Self::Serious => "serious",
            Self::Friendly => "friendly",
        }
    }
}

/// Emphasis level applied by the speech engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    Normal,
    Strong,
    Reduced,
}

/// Target audience for narration text adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    General,
    Technical,
    Academic,
    Children,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Technical => "technical",
            Self::Academic => "academic",
            Self::Children => "children",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "general" => Some(Self::General),
            "technical" => Some(Self::Technical),
            "academic" => Some(Self::Academic),
            "children" => Some(Self::Children),
            _ => None,
        }
    }
}

/// Resolved voice parameters for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Engine voice identifier.
    pub voice: String,
    /// Speaking rate multiplier, 0.5 to 2.0.
    pub speed: f32,
    /// Pitch offset, -20 to 20.
    pub pitch: i32,
    /// Output volume, 0.0 to 1.0.
    pub volume: f32,
    pub emphasis: Emphasis,
}

/// One unit of narrated speech, generated from a run of page elements.
///
/// Segments are generated, never edited in place; a failed segment is
/// regenerated from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationSegment {
    /// Stable identifier, `page_{n}_segment_{i}`. Audio artifacts are named
    /// by this id so retries overwrite only their own output.
    pub id: String,
    pub page_number: u32,
    /// Generated narration text (not verbatim page text).
    pub text: String,
    /// Estimated duration in seconds at the configured speaking rate.
    pub duration: f64,
    pub voice: VoiceSettings,
    /// Words to stress, taken from bold or all-caps elements.
    pub emphasis_words: Vec<String>,
    /// Sentence-boundary offsets in seconds from segment start.
    pub pause_points: Vec<f64>,
    pub tone: Tone,
}

impl NarrationSegment {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A rendered audio artifact for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub segment_id: String,
    pub path: PathBuf,
}

/// Output of the narration stage: scripts plus rendered audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narration {
    pub segments: Vec<NarrationSegment>,
    pub audio: Vec<AudioArtifact>,
    /// Sum of all segment durations in seconds.
    pub total_duration: f64,
}

impl Narration {
    /// Segments belonging to one page, in generation order.
    pub fn segments_for_page(&self, page_number: u32) -> Vec<&NarrationSegment> {
        self.segments
            .iter()
            .filter(|s| s.page_number == page_number)
            .collect()
    }

    /// Rendered audio for a segment, if synthesis succeeded.
    pub fn audio_for_segment(&self, segment_id: &str) -> Option<&AudioArtifact> {
        self.audio.iter().find(|a| a.segment_id == segment_id)
    }
}
