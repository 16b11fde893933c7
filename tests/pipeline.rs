//! End-to-end pipeline tests against mock engines.
//!
//! The mocks stand in for tesseract, espeak-ng, and ffmpeg: they write real
//! scratch files so path handling is exercised, but never shell out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use pagecast::config::Settings;
use pagecast::engines::{EngineError, OcrEngine, RenderSpec, TranscodeEngine, TtsEngine};
use pagecast::models::{Audience, Scene, VideoMetadata, VoiceSettings};
use pagecast::pipeline::{CancelFlag, Pipeline, PipelineStatus, RunOptions, Stage};

/// OCR double: returns canned text per page and synthesizes tiny PNGs so
/// raster probing works.
struct MockOcr {
    pages: Vec<String>,
    fail_pages: HashSet<u32>,
}

impl MockOcr {
    fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|s| s.to_string()).collect(),
            fail_pages: HashSet::new(),
        }
    }

    fn failing(pages: &[&str], fail: &[u32]) -> Self {
        Self {
            pages: pages.iter().map(|s| s.to_string()).collect(),
            fail_pages: fail.iter().copied().collect(),
        }
    }
}

fn page_from_path(path: &Path) -> u32 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

impl OcrEngine for MockOcr {
    fn page_count(&self, _document: &Path) -> Result<u32, EngineError> {
        Ok(self.pages.len() as u32)
    }

    fn rasterize_page(
        &self,
        _document: &Path,
        page: u32,
        out_prefix: &Path,
    ) -> Result<PathBuf, EngineError> {
        if self.fail_pages.contains(&page) {
            return Err(EngineError::Failed {
                tool: "pdftoppm".to_string(),
                message: format!("cannot rasterize page {}", page),
            });
        }
        let path = out_prefix.with_extension("png");
        image::RgbImage::new(12, 16)
            .save(&path)
            .map_err(|e| EngineError::Failed {
                tool: "mock".to_string(),
                message: e.to_string(),
            })?;
        Ok(path)
    }

    fn recognize(&self, image: &Path, _language: &str) -> Result<String, EngineError> {
        let page = page_from_path(image);
        self.pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .ok_or_else(|| EngineError::Failed {
                tool: "tesseract".to_string(),
                message: format!("unknown page {}", page),
            })
    }

    fn extract_images(
        &self,
        _document: &Path,
        _page: u32,
        _out_prefix: &Path,
    ) -> Result<Vec<PathBuf>, EngineError> {
        Ok(Vec::new())
    }
}

/// TTS double keyed by the segment-id-derived output filename.
struct MockTts {
    fail_segments: HashSet<String>,
}

impl MockTts {
    fn new() -> Self {
        Self {
            fail_segments: HashSet::new(),
        }
    }

    fn failing(segments: &[&str]) -> Self {
        Self {
            fail_segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TtsEngine for MockTts {
    fn synthesize(
        &self,
        _text: &str,
        _voice: &VoiceSettings,
        output: &Path,
    ) -> Result<(), EngineError> {
        let segment = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_segments.contains(&segment) {
            return Err(EngineError::Failed {
                tool: "espeak-ng".to_string(),
                message: "synthesis refused".to_string(),
            });
        }
        std::fs::write(output, b"RIFF").map_err(EngineError::Io)
    }

    fn supports_language(&self, language: &str) -> bool {
        language == "en-US"
    }
}

/// Transcoder double: records rendered scene durations and reports their
/// sum from probe, optionally skewed to trigger the duration check.
struct MockTranscoder {
    rendered: Mutex<Vec<f64>>,
    mixed: Mutex<bool>,
    probe_skew: f64,
}

impl MockTranscoder {
    fn new() -> Self {
        Self {
            rendered: Mutex::new(Vec::new()),
            mixed: Mutex::new(false),
            probe_skew: 0.0,
        }
    }

    fn skewed(probe_skew: f64) -> Self {
        Self {
            probe_skew,
            ..Self::new()
        }
    }
}

impl TranscodeEngine for MockTranscoder {
    fn render_scene(
        &self,
        scene: &Scene,
        _spec: &RenderSpec,
        output: &Path,
    ) -> Result<(), EngineError> {
        self.rendered.lock().unwrap().push(scene.duration);
        std::fs::write(output, b"clip").map_err(EngineError::Io)
    }

    fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        assert!(!clips.is_empty());
        std::fs::write(output, b"combined").map_err(EngineError::Io)
    }

    fn concat_audio(&self, parts: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        assert!(parts.len() > 1);
        std::fs::write(output, b"RIFF").map_err(EngineError::Io)
    }

    fn mix_music(
        &self,
        video: &Path,
        _music: &Path,
        _volume: f32,
        output: &Path,
    ) -> Result<(), EngineError> {
        *self.mixed.lock().unwrap() = true;
        std::fs::copy(video, output).map_err(EngineError::Io)?;
        Ok(())
    }

    fn thumbnail(&self, _video: &Path, _offset: f64, output: &Path) -> Result<(), EngineError> {
        std::fs::write(output, b"jpeg").map_err(EngineError::Io)
    }

    fn probe(&self, video: &Path) -> Result<VideoMetadata, EngineError> {
        let duration: f64 = self.rendered.lock().unwrap().iter().sum();
        Ok(VideoMetadata {
            duration: duration + self.probe_skew,
            file_size: std::fs::metadata(video)?.len(),
            width: 1920,
            height: 1080,
        })
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    pipeline: Pipeline,
    opts: RunOptions,
}

fn harness(ocr: MockOcr, tts: MockTts, transcoder: MockTranscoder) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("manual.pdf");
    std::fs::write(&input, b"%PDF-1.4").unwrap();

    let mut settings = Settings::default();
    settings.workdir = Some(dir.path().join("work").to_string_lossy().into_owned());

    let opts = RunOptions {
        input,
        output: dir.path().join("out").join("manual.mp4"),
        audience: Audience::General,
        background_music: None,
        keep_workdir: false,
    };
    let pipeline = Pipeline::new(settings, Arc::new(ocr), Arc::new(tts), Arc::new(transcoder));
    Harness {
        _dir: dir,
        pipeline,
        opts,
    }
}

async fn run(h: &Harness) -> pagecast::pipeline::PipelineReport {
    let (tx, mut rx) = mpsc::channel(256);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let report = h
        .pipeline
        .run(&h.opts, &tx, &CancelFlag::new())
        .await
        .unwrap();
    drop(tx);
    let _ = drain.await;
    report
}

const PROSE: &str = "The turbine assembly must be inspected before every operating shift begins. \
Lubrication points are located on the upper housing near the main bearing cap.";

#[tokio::test]
async fn three_page_document_produces_a_complete_video() {
    let h = harness(
        MockOcr::new(&[PROSE, PROSE, PROSE]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let report = run(&h).await;

    assert_eq!(report.status, PipelineStatus::Complete);
    assert!(report.failures.is_empty());
    let video = report.video.expect("video produced");
    assert_eq!(video.scenes.len(), 3);
    assert!(video.video_path.exists());
    assert!(video.thumbnail_path.exists());
    assert_eq!(video.title, "manual");
    assert!(video.description.contains("turbine assembly"));
    assert!(video.tags.contains(&"turbine".to_string()));

    let expected: f64 = video.scenes.iter().map(|s| s.duration).sum();
    assert!((video.metadata.duration - expected).abs() < 0.01);
}

#[tokio::test]
async fn failed_page_is_isolated_and_the_rest_proceed() {
    let h = harness(
        MockOcr::failing(&[PROSE, PROSE, PROSE, PROSE, PROSE], &[4]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let report = run(&h).await;

    assert_eq!(report.status, PipelineStatus::Partial);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Ingest);
    assert_eq!(report.failures[0].unit, "page_4");

    let video = report.video.expect("video still produced");
    let pages: Vec<u32> = video.scenes.iter().map(|s| s.page_number).collect();
    assert_eq!(pages, vec![1, 2, 3, 5]);
}

#[tokio::test]
async fn failed_segment_degrades_its_scene_to_silence() {
    let h = harness(
        MockOcr::new(&[PROSE, PROSE]),
        MockTts::failing(&["page_2_segment_0"]),
        MockTranscoder::new(),
    );
    let report = run(&h).await;

    assert_eq!(report.status, PipelineStatus::Partial);
    assert!(report
        .failures
        .iter()
        .any(|f| f.stage == Stage::Narrate && f.unit == "page_2_segment_0"));

    let video = report.video.expect("video still produced");
    let scene2 = video.scenes.iter().find(|s| s.page_number == 2).unwrap();
    assert!(scene2.narration_path.is_none());
    let scene1 = video.scenes.iter().find(|s| s.page_number == 1).unwrap();
    assert!(scene1.narration_path.is_some());
    // The silent scene still holds the screen for the minimum duration.
    assert!(scene2.duration >= 3.0);
}

#[tokio::test]
async fn sparse_page_gets_the_minimum_scene_duration() {
    // Two words of narration round up to a second of speech, well under
    // the floor.
    let h = harness(
        MockOcr::new(&["Short note."]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let report = run(&h).await;
    let video = report.video.expect("video produced");
    assert_eq!(video.scenes[0].duration, 3.0);
}

#[tokio::test]
async fn empty_document_fails_outright() {
    let h = harness(MockOcr::new(&[]), MockTts::new(), MockTranscoder::new());
    let (tx, _rx) = mpsc::channel(256);
    let err = h
        .pipeline
        .run(&h.opts, &tx, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no pages"));
}

#[tokio::test]
async fn all_pages_failing_reports_failed_without_a_video() {
    let h = harness(
        MockOcr::failing(&[PROSE, PROSE], &[1, 2]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let report = run(&h).await;
    assert_eq!(report.status, PipelineStatus::Failed);
    assert!(report.video.is_none());
    assert_eq!(report.failures.len(), 2);
}

#[tokio::test]
async fn unsupported_language_is_a_hard_error() {
    let mut h = harness(
        MockOcr::new(&[PROSE]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let mut settings = Settings::default();
    settings.workdir = Some(h._dir.path().join("work2").to_string_lossy().into_owned());
    settings.narration.language = "xx-XX".to_string();
    h.pipeline = Pipeline::new(
        settings,
        Arc::new(MockOcr::new(&[PROSE])),
        Arc::new(MockTts::new()),
        Arc::new(MockTranscoder::new()),
    );
    let (tx, _rx) = mpsc::channel(256);
    let err = h
        .pipeline
        .run(&h.opts, &tx, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("xx-XX"));
}

#[tokio::test]
async fn duration_drift_beyond_tolerance_fails_assembly() {
    let h = harness(
        MockOcr::new(&[PROSE]),
        MockTts::new(),
        MockTranscoder::skewed(30.0),
    );
    let report = run(&h).await;
    assert_eq!(report.status, PipelineStatus::Failed);
    assert!(report.video.is_none());
    assert!(report
        .failures
        .iter()
        .any(|f| f.stage == Stage::Assemble && f.error.contains("deviates")));
}

#[tokio::test]
async fn background_music_is_mixed_into_the_output() {
    let transcoder = Arc::new(MockTranscoder::new());
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("manual.pdf");
    std::fs::write(&input, b"%PDF-1.4").unwrap();
    let music = dir.path().join("theme.mp3");
    std::fs::write(&music, b"ID3").unwrap();

    let mut settings = Settings::default();
    settings.workdir = Some(dir.path().join("work").to_string_lossy().into_owned());

    let pipeline = Pipeline::new(
        settings,
        Arc::new(MockOcr::new(&[PROSE])),
        Arc::new(MockTts::new()),
        transcoder.clone(),
    );
    let opts = RunOptions {
        input,
        output: dir.path().join("manual.mp4"),
        audience: Audience::General,
        background_music: Some(music),
        keep_workdir: false,
    };

    let (tx, mut rx) = mpsc::channel(256);
    let drainer = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let report = pipeline.run(&opts, &tx, &CancelFlag::new()).await.unwrap();
    drop(tx);
    let _ = drainer.await;

    assert_eq!(report.status, PipelineStatus::Complete);
    assert!(*transcoder.mixed.lock().unwrap());
}

#[tokio::test]
async fn scenes_and_narration_are_deterministic_across_runs() {
    let h1 = harness(
        MockOcr::new(&[PROSE, "SAFETY NOTICE"]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let h2 = harness(
        MockOcr::new(&[PROSE, "SAFETY NOTICE"]),
        MockTts::new(),
        MockTranscoder::new(),
    );
    let a = run(&h1).await.video.unwrap();
    let b = run(&h2).await.video.unwrap();

    assert_eq!(a.scenes.len(), b.scenes.len());
    for (sa, sb) in a.scenes.iter().zip(b.scenes.iter()) {
        assert_eq!(sa.id, sb.id);
        assert_eq!(sa.duration, sb.duration);
        assert_eq!(sa.overlays.len(), sb.overlays.len());
        for (oa, ob) in sa.overlays.iter().zip(sb.overlays.iter()) {
            assert_eq!(oa.text, ob.text);
        }
    }
    // The all-caps warning page is narrated through the heading template.
    let subtitle = a.scenes[1]
        .overlays
        .iter()
        .find(|o| o.box_color.is_some())
        .expect("subtitle overlay");
    assert!(subtitle.text.contains("SAFETY NOTICE"));
}
