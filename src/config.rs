//! Configuration management.
//!
//! Settings come from an optional TOML file (`--config` or
//! `$XDG_CONFIG_HOME/pagecast/config.toml`) merged over built-in defaults.
//! Every pipeline constant lives here so behavior stays deterministic and
//! test-overridable.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Ingestion-stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Rasterization density in DPI.
    pub dpi: u32,
    /// Tesseract language code.
    pub ocr_language: String,
    /// Lines shorter than this are dropped during layout inference.
    pub min_text_length: usize,
    /// Extract embedded page images (base64) into the document.
    pub extract_images: bool,
    /// Keep positional layout hints on elements.
    pub preserve_layout: bool,
    /// Assumed line height in raster pixels for running-offset positions.
    pub line_height: f32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            dpi: 150,
            ocr_language: "eng".to_string(),
            min_text_length: 3,
            extract_images: false,
            preserve_layout: true,
            line_height: 40.0,
        }
    }
}

/// Content-analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Sentences included in the document summary.
    pub summary_sentences: usize,
    /// Minimum characters for a sentence to count as meaningful.
    pub min_sentence_length: usize,
    /// Keyword topics to rank.
    pub topic_count: usize,
    /// Minimum word length for topic candidates.
    pub min_topic_length: usize,
    /// Speaking rate used for duration estimates.
    pub words_per_minute: f64,
    /// Fixed per-slide overhead added to the estimate, in seconds.
    pub per_slide_seconds: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            summary_sentences: 3,
            min_sentence_length: 50,
            topic_count: 10,
            min_topic_length: 4,
            words_per_minute: 150.0,
            per_slide_seconds: 5.0,
        }
    }
}

/// Narration-synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    /// BCP-47 narration language; must exist in the voice table.
    pub language: String,
    /// Word budget per speech segment.
    pub max_words_per_segment: usize,
    /// Compute sentence-boundary pause points.
    pub enable_pauses: bool,
    /// Output volume for synthesized speech, 0.0 to 1.0.
    pub volume: f32,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            max_words_per_segment: 150,
            enable_pauses: true,
            volume: 0.9,
        }
    }
}

/// Composition and assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// Floor for scene duration so narration-less pages stay visible.
    pub min_scene_duration: f64,
    pub transitions_enabled: bool,
    /// Transition style at scene boundaries (cut/fade/slide/zoom/dissolve).
    pub transition_kind: String,
    pub transition_duration: f64,
    /// Relative volume for mixed-in background music.
    pub music_volume: f32,
    /// Offset of the extracted thumbnail frame, in seconds.
    pub thumbnail_offset: f64,
    /// Font used for burned-in overlays.
    pub font_file: PathBuf,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            min_scene_duration: 3.0,
            transitions_enabled: true,
            transition_kind: "fade".to_string(),
            transition_duration: 1.0,
            music_volume: 0.3,
            thumbnail_offset: 2.0,
            font_file: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
        }
    }
}

/// Worker pool sizes, bounded to the external engines' real concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub ocr: usize,
    pub tts: usize,
    pub render: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            ocr: 2,
            tts: 2,
            render: 2,
        }
    }
}

/// Bounded-backoff retry policy for transient engine errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for run-scoped working directories. Defaults to the
    /// system temp directory.
    pub workdir: Option<String>,
    pub ingest: IngestSettings,
    pub analysis: AnalysisSettings,
    pub narration: NarrationSettings,
    pub video: VideoSettings,
    pub workers: WorkerSettings,
    pub retry: RetrySettings,
}

impl Settings {
    /// Load settings from an explicit path, the default config location, or
    /// fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => dirs::config_dir()
                .map(|d| d.join("pagecast").join("config.toml"))
                .filter(|p| p.exists()),
        };

        match path {
            Some(p) => {
                let raw = std::fs::read_to_string(&p)
                    .map_err(|e| anyhow::anyhow!("failed to read {}: {}", p.display(), e))?;
                let settings: Settings = toml::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", p.display(), e))?;
                tracing::info!("loaded settings from {}", p.display());
                Ok(settings)
            }
            None => Ok(Settings::default()),
        }
    }

    /// Base directory for working directories, with tilde expansion.
    pub fn workdir_base(&self) -> PathBuf {
        match &self.workdir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => std::env::temp_dir().join("pagecast"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.analysis.words_per_minute, 150.0);
        assert_eq!(s.narration.max_words_per_segment, 150);
        assert_eq!(s.video.width, 1920);
        assert!(s.video.transitions_enabled);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let s: Settings = toml::from_str(
            r#"
            [video]
            width = 1280
            height = 720
            "#,
        )
        .unwrap();
        assert_eq!(s.video.width, 1280);
        assert_eq!(s.video.fps, 30);
        assert_eq!(s.ingest.dpi, 150);
    }

    #[test]
    fn workdir_tilde_is_expanded() {
        let s: Settings = toml::from_str(r#"workdir = "~/pagecast-work""#).unwrap();
        assert!(!s.workdir_base().to_string_lossy().contains('~'));
    }
}
