//! Pipeline orchestration.
//!
//! The five stages run strictly in order; parallelism lives inside stages
//! as bounded worker pools over independent units (pages, segments,
//! scenes). Stages communicate only through their returned artifacts, and
//! progress flows out through a single event channel.

pub mod analyze;
pub mod assemble;
pub mod compose;
pub mod ingest;
pub mod narrate;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::engines::{EspeakTts, FfmpegTranscoder, OcrEngine, TesseractOcr, TranscodeEngine, TtsEngine};
use crate::models::{Audience, Document, GeneratedVideo};
use crate::workdir::Workdir;

pub use crate::utils::cancel::CancelFlag;

use analyze::ContentAnalyzer;
use assemble::VideoAssembler;
use compose::SceneComposer;
use ingest::DocumentIngestor;
use narrate::{NarrateOptions, NarrationSynthesizer};

/// Pipeline stage identifier, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ingest,
    Analyze,
    Narrate,
    Compose,
    Assemble,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Analyze => "analyze",
            Self::Narrate => "narrate",
            Self::Compose => "compose",
            Self::Assemble => "assemble",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress events emitted by pipeline stages. Consumers drive progress
/// bars or logs; a dropped receiver never blocks the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StageStarted { stage: Stage, total_units: usize },
    UnitStarted { stage: Stage, unit: String },
    UnitCompleted { stage: Stage, unit: String },
    UnitFailed { stage: Stage, unit: String, error: String },
    StageCompleted { stage: Stage, succeeded: usize, failed: usize },
}

/// Run blocking unit work over a bounded pool of blocking tasks.
///
/// At most `workers` units are in flight at once. Cancellation stops
/// dispatching new units; engine helpers poll the same flag and kill
/// in-flight child processes. Results are returned in completion order,
/// so callers key results by unit.
pub async fn run_pool<T, R>(
    workers: usize,
    items: Vec<T>,
    cancel: &CancelFlag,
    worker: Arc<dyn Fn(T) -> R + Send + Sync>,
) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    let workers = workers.max(1);
    let mut handles: Vec<tokio::task::JoinHandle<R>> = Vec::new();
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        if cancel.is_cancelled() {
            tracing::info!("cancellation requested, not dispatching remaining units");
            break;
        }
        if handles.len() >= workers {
            match handles.remove(0).await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("pool worker panicked: {}", e),
            }
        }
        let worker = worker.clone();
        handles.push(tokio::task::spawn_blocking(move || worker(item)));
    }
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!("pool worker panicked: {}", e),
        }
    }
    results
}

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Every unit in every stage succeeded.
    Complete,
    /// A video was produced, but some pages or segments were skipped.
    Partial,
    /// No video was produced.
    Failed,
}

/// One skipped or failed unit, attributed to its stage.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub stage: Stage,
    pub unit: String,
    pub error: String,
}

/// Final report for a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub failures: Vec<UnitFailure>,
    pub video: Option<GeneratedVideo>,
}

/// Per-run options from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub audience: Audience,
    pub background_music: Option<PathBuf>,
    pub keep_workdir: bool,
}

pub struct Pipeline {
    settings: Settings,
    ocr: Arc<dyn OcrEngine>,
    tts: Arc<dyn TtsEngine>,
    transcoder: Arc<dyn TranscodeEngine>,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        ocr: Arc<dyn OcrEngine>,
        tts: Arc<dyn TtsEngine>,
        transcoder: Arc<dyn TranscodeEngine>,
    ) -> Self {
        Self {
            settings,
            ocr,
            tts,
            transcoder,
        }
    }

    /// Pipeline backed by the system's tesseract, espeak-ng, and ffmpeg.
    /// The cancel flag is shared with every engine so in-flight external
    /// calls die with the run.
    pub fn with_default_engines(settings: Settings, cancel: &CancelFlag) -> Self {
        let dpi = settings.ingest.dpi;
        Self::new(
            settings,
            Arc::new(TesseractOcr::new(dpi).with_cancel(cancel.clone())),
            Arc::new(EspeakTts::new().with_cancel(cancel.clone())),
            Arc::new(FfmpegTranscoder::new().with_cancel(cancel.clone())),
        )
    }

    /// Run the full pipeline: ingest, analyze, narrate, compose, assemble.
    ///
    /// Per-page and per-segment failures degrade the output (Partial);
    /// composition and assembly failures abort it (Failed). Hard input
    /// errors (missing file, unsupported language, empty document) are
    /// returned as errors.
    pub async fn run(
        &self,
        opts: &RunOptions,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: &CancelFlag,
    ) -> anyhow::Result<PipelineReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let base = self.settings.workdir_base();
        let mut workdir = Workdir::create(&base, &run_id)?;
        if opts.keep_workdir {
            workdir.keep();
            tracing::info!("keeping working directory {}", workdir.root().display());
        }

        let mut failures: Vec<UnitFailure> = Vec::new();

        // Ingest.
        let ingestor = DocumentIngestor::new(
            self.ocr.clone(),
            self.settings.ingest.clone(),
            self.settings.retry.clone(),
        );
        let outcome = ingestor
            .ingest(
                &opts.input,
                &workdir,
                self.settings.workers.ocr,
                events,
                cancel,
            )
            .await?;
        failures.extend(outcome.failures.iter().map(|(page, error)| UnitFailure {
            stage: Stage::Ingest,
            unit: format!("page_{}", page),
            error: error.clone(),
        }));
        if outcome.pages.is_empty() {
            tracing::error!("every page failed ingestion");
            return Ok(PipelineReport {
                status: PipelineStatus::Failed,
                failures,
                video: None,
            });
        }
        if cancel.is_cancelled() {
            anyhow::bail!("run cancelled");
        }

        // Analyze.
        let _ = events
            .send(PipelineEvent::StageStarted {
                stage: Stage::Analyze,
                total_units: 1,
            })
            .await;
        let analysis = ContentAnalyzer::new(self.settings.analysis.clone()).analyze(&outcome.pages);
        let _ = events
            .send(PipelineEvent::StageCompleted {
                stage: Stage::Analyze,
                succeeded: 1,
                failed: 0,
            })
            .await;

        let document = Document {
            metadata: outcome.metadata,
            pages: outcome.pages,
            summary: analysis.summary,
            key_topics: analysis.key_topics,
            estimated_duration: analysis.estimated_duration,
            complexity: analysis.complexity,
        };
        tracing::info!(
            "document '{}': {} pages, {} complexity, about {:.0}s of narration",
            document.metadata.title,
            document.pages.len(),
            document.complexity.as_str(),
            document.estimated_duration
        );

        // Narrate. Segments that fail synthesis fall back to silent scenes.
        let synthesizer = NarrationSynthesizer::new(
            self.tts.clone(),
            NarrateOptions {
                language: self.settings.narration.language.clone(),
                audience: opts.audience,
                max_words_per_segment: self.settings.narration.max_words_per_segment,
                enable_pauses: self.settings.narration.enable_pauses,
                volume: self.settings.narration.volume,
                words_per_minute: self.settings.analysis.words_per_minute,
            },
            self.settings.retry.clone(),
        );
        let (narration, tts_failures) = synthesizer
            .synthesize(
                &document.pages,
                &workdir,
                self.settings.workers.tts,
                events,
                cancel,
            )
            .await?;
        failures.extend(tts_failures.into_iter().map(|(unit, error)| UnitFailure {
            stage: Stage::Narrate,
            unit,
            error,
        }));
        if cancel.is_cancelled() {
            anyhow::bail!("run cancelled");
        }

        // Compose.
        let composer = SceneComposer::new(self.transcoder.clone(), self.settings.video.clone());
        let scenes = match composer
            .compose(&document, &narration, &workdir, events)
            .await
        {
            Ok(scenes) => scenes,
            Err(e) => {
                tracing::error!("scene composition failed: {}", e);
                failures.push(UnitFailure {
                    stage: Stage::Compose,
                    unit: "compose".to_string(),
                    error: e.to_string(),
                });
                return Ok(PipelineReport {
                    status: PipelineStatus::Failed,
                    failures,
                    video: None,
                });
            }
        };
        if cancel.is_cancelled() {
            anyhow::bail!("run cancelled");
        }

        // Assemble.
        let assembler = VideoAssembler::new(
            self.transcoder.clone(),
            self.settings.video.clone(),
            self.settings.retry.clone(),
        );
        let video = match assembler
            .assemble(
                &document,
                &scenes,
                opts.background_music.as_deref(),
                &opts.output,
                &workdir,
                self.settings.workers.render,
                events,
                cancel,
            )
            .await
        {
            Ok(video) => video,
            Err(e) => {
                tracing::error!("video assembly failed: {}", e);
                failures.push(UnitFailure {
                    stage: Stage::Assemble,
                    unit: "assemble".to_string(),
                    error: e.to_string(),
                });
                return Ok(PipelineReport {
                    status: PipelineStatus::Failed,
                    failures,
                    video: None,
                });
            }
        };

        let status = if failures.is_empty() {
            PipelineStatus::Complete
        } else {
            PipelineStatus::Partial
        };
        Ok(PipelineReport {
            status,
            failures,
            video: Some(video),
        })
    }
}
