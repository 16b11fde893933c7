//! Video assembly: scene rendering, concatenation, music mixing, and final
//! packaging.
//!
//! Rendering runs in a bounded worker pool since each clip is an
//! independent encode. Unlike earlier stages, any render failure is fatal:
//! a missing clip would silently drop a page from the output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{RetrySettings, VideoSettings};
use crate::engines::{with_retry, EngineError, RenderSpec, TranscodeEngine};
use crate::models::{Document, GeneratedVideo, Scene};
use crate::workdir::Workdir;

use super::{run_pool, CancelFlag, PipelineEvent, Stage};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("rendering {scene}: {source}")]
    Render {
        scene: String,
        #[source]
        source: EngineError,
    },

    #[error("{step}: {source}")]
    Mux {
        step: &'static str,
        #[source]
        source: EngineError,
    },

    #[error(
        "final duration {actual:.1}s deviates from expected {expected:.1}s \
         by more than {tolerance:.1}s"
    )]
    DurationMismatch {
        expected: f64,
        actual: f64,
        tolerance: f64,
    },

    #[error("no scenes to assemble")]
    NoScenes,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Acceptable drift between expected and probed duration: container
/// overhead plus one frame-rounding second per minute of footage.
pub fn duration_tolerance(expected: f64) -> f64 {
    1.0 + expected / 60.0
}

/// Thumbnail path derived from the output video path.
pub fn thumbnail_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    output.with_file_name(format!("{}_thumbnail.jpg", stem))
}

/// Move a file across possibly different filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

pub struct VideoAssembler {
    transcoder: Arc<dyn TranscodeEngine>,
    opts: VideoSettings,
    retry: RetrySettings,
}

impl VideoAssembler {
    pub fn new(transcoder: Arc<dyn TranscodeEngine>, opts: VideoSettings, retry: RetrySettings) -> Self {
        Self { transcoder, opts, retry }
    }

    fn render_spec(&self) -> RenderSpec {
        RenderSpec {
            width: self.opts.width,
            height: self.opts.height,
            fps: self.opts.fps,
            video_codec: self.opts.video_codec.clone(),
            audio_codec: self.opts.audio_codec.clone(),
            font_file: self.opts.font_file.clone(),
        }
    }

    /// Render every scene to a clip in a bounded pool. All clips must
    /// succeed; the first failure is returned.
    async fn render_clips(
        &self,
        scenes: &[Scene],
        workdir: &Workdir,
        workers: usize,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: &CancelFlag,
    ) -> Result<Vec<PathBuf>, AssemblyError> {
        let units: Vec<(Scene, PathBuf)> = scenes
            .iter()
            .map(|s| (s.clone(), workdir.scene_clip(s.page_number)))
            .collect();

        let transcoder = self.transcoder.clone();
        let spec = self.render_spec();
        let retry = self.retry.clone();
        let events_tx = events.clone();
        let cancel_flag = cancel.clone();

        let worker = Arc::new(move |(scene, clip): (Scene, PathBuf)| {
            let unit = scene.id.clone();
            let _ = futures::executor::block_on(events_tx.send(PipelineEvent::UnitStarted {
                stage: Stage::Assemble,
                unit: unit.clone(),
            }));

            let delay = Duration::from_millis(retry.base_delay_ms);
            let result = with_retry(retry.attempts, delay, &cancel_flag, || {
                transcoder.render_scene(&scene, &spec, &clip)
            });

            let event = match &result {
                Ok(()) => PipelineEvent::UnitCompleted {
                    stage: Stage::Assemble,
                    unit,
                },
                Err(e) => PipelineEvent::UnitFailed {
                    stage: Stage::Assemble,
                    unit,
                    error: e.to_string(),
                },
            };
            let _ = futures::executor::block_on(events_tx.send(event));
            (scene.page_number, scene.id, result.map(|_| clip))
        });

        let mut results = run_pool(workers, units, cancel, worker).await;
        results.sort_by_key(|(page, _, _)| *page);

        let mut clips = Vec::with_capacity(results.len());
        for (_, scene_id, result) in results {
            match result {
                Ok(clip) => clips.push(clip),
                Err(source) => {
                    return Err(AssemblyError::Render {
                        scene: scene_id,
                        source,
                    })
                }
            }
        }
        Ok(clips)
    }

    /// Assemble scenes into the final video at `output`.
    pub async fn assemble(
        &self,
        document: &Document,
        scenes: &[Scene],
        background_music: Option<&Path>,
        output: &Path,
        workdir: &Workdir,
        workers: usize,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: &CancelFlag,
    ) -> Result<GeneratedVideo, AssemblyError> {
        if scenes.is_empty() {
            return Err(AssemblyError::NoScenes);
        }

        let _ = events
            .send(PipelineEvent::StageStarted {
                stage: Stage::Assemble,
                total_units: scenes.len(),
            })
            .await;

        let clips = self
            .render_clips(scenes, workdir, workers, events, cancel)
            .await?;

        let combined = workdir.concat_output();
        self.transcoder
            .concat(&clips, &combined)
            .map_err(|source| AssemblyError::Mux {
                step: "concatenating clips",
                source,
            })?;

        let finished = match background_music {
            Some(music) => {
                let mixed = workdir.final_output();
                self.transcoder
                    .mix_music(&combined, music, self.opts.music_volume, &mixed)
                    .map_err(|source| AssemblyError::Mux {
                        step: "mixing background music",
                        source,
                    })?;
                mixed
            }
            None => combined,
        };

        let thumbnail = workdir.thumbnail_output();
        self.transcoder
            .thumbnail(&finished, self.opts.thumbnail_offset, &thumbnail)
            .map_err(|source| AssemblyError::Mux {
                step: "extracting thumbnail",
                source,
            })?;

        let metadata = self
            .transcoder
            .probe(&finished)
            .map_err(|source| AssemblyError::Mux {
                step: "probing output",
                source,
            })?;

        let expected: f64 = scenes.iter().map(|s| s.duration).sum();
        let tolerance = duration_tolerance(expected);
        if (metadata.duration - expected).abs() > tolerance {
            return Err(AssemblyError::DurationMismatch {
                expected,
                actual: metadata.duration,
                tolerance,
            });
        }

        move_file(&finished, output)?;
        let thumbnail_out = thumbnail_path_for(output);
        move_file(&thumbnail, &thumbnail_out)?;

        // Clips are the bulk of the workdir; free them eagerly even when
        // the workdir itself is being kept.
        for clip in &clips {
            if let Err(e) = std::fs::remove_file(clip) {
                tracing::debug!("failed to remove {}: {}", clip.display(), e);
            }
        }

        let _ = events
            .send(PipelineEvent::StageCompleted {
                stage: Stage::Assemble,
                succeeded: scenes.len(),
                failed: 0,
            })
            .await;

        Ok(GeneratedVideo {
            video_path: output.to_path_buf(),
            thumbnail_path: thumbnail_out,
            metadata,
            scenes: scenes.to_vec(),
            title: document.metadata.title.clone(),
            description: document.summary.clone(),
            tags: document.key_topics.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_grows_with_footage_length() {
        assert_eq!(duration_tolerance(0.0), 1.0);
        assert_eq!(duration_tolerance(60.0), 2.0);
        assert!(duration_tolerance(600.0) > duration_tolerance(60.0));
    }

    #[test]
    fn thumbnail_path_sits_next_to_the_video() {
        let out = thumbnail_path_for(Path::new("/videos/report.mp4"));
        assert_eq!(out, PathBuf::from("/videos/report_thumbnail.jpg"));
    }

    #[test]
    fn move_file_replaces_rename_with_copy_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.bin");
        let to = dir.path().join("nested").join("b.bin");
        std::fs::write(&from, b"payload").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
    }
}
