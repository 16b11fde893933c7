//! External engine clients.
//!
//! The pipeline drives three external toolchains: an OCR engine for page
//! rasterization and text recognition, a text-to-speech engine for narration
//! audio, and a transcoding engine for scene rendering and muxing. Each is
//! modeled as a trait with a single-call contract so it can be replaced by a
//! test double, and engine clients are injected into pipeline stages rather
//! than reached through process-wide singletons.

mod espeak;
mod ffmpeg;
mod tesseract;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use thiserror::Error;

use crate::models::{Scene, VideoMetadata, VoiceSettings};
use crate::utils::cancel::CancelFlag;

pub use espeak::EspeakTts;
pub use ffmpeg::FfmpegTranscoder;
pub use tesseract::TesseractOcr;

/// Errors raised by external engine calls.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether a retry could plausibly succeed. Semantic failures (bad
    /// input, missing binary) are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Run a closure with bounded backoff on retryable engine errors. A
/// tripped cancel flag stops further attempts.
pub fn with_retry<T>(
    attempts: u32,
    base_delay: Duration,
    cancel: &CancelFlag,
    mut call: impl FnMut() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    let mut delay = base_delay;
    let mut remaining = attempts.max(1);
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && remaining > 1 && !cancel.is_cancelled() => {
                tracing::debug!("retryable engine error, backing off {:?}: {}", delay, e);
                std::thread::sleep(delay);
                delay *= 2;
                remaining -= 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Poll interval while waiting on a child process.
const CHILD_POLL: Duration = Duration::from_millis(50);

/// Spawn a command and wait for it, killing the child if the cancel flag
/// trips while it runs.
fn run_child(cmd: &mut Command, tool: &str, cancel: &CancelFlag) -> Result<Output, EngineError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::ToolNotFound(tool.to_string()))
        }
        Err(e) => return Err(EngineError::Io(e)),
    };

    // Drain the pipes on helper threads so a chatty child never blocks on
    // a full pipe while we poll for exit.
    let mut stdout_pipe = child.stdout.take();
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });
    let mut stderr_pipe = child.stderr.take();
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });
    let outcome = loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            break Err(EngineError::Cancelled(tool.to_string()));
        }
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => std::thread::sleep(CHILD_POLL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(EngineError::Io(e));
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    let status = outcome?;
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Run a command, returning stdout on success or an engine error that
/// distinguishes a missing binary from a failed invocation.
pub(crate) fn run_capture(
    cmd: &mut Command,
    tool: &str,
    cancel: &CancelFlag,
) -> Result<String, EngineError> {
    let output = run_child(cmd, tool, cancel)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(EngineError::Failed {
            tool: tool.to_string(),
            message: stderr.trim().to_string(),
        })
    }
}

/// Run a command for its exit status only.
pub(crate) fn run_status(
    cmd: &mut Command,
    tool: &str,
    context: &str,
    cancel: &CancelFlag,
) -> Result<(), EngineError> {
    let output = run_child(cmd, tool, cancel)?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        Err(EngineError::Failed {
            tool: tool.to_string(),
            message: if detail.is_empty() {
                context.to_string()
            } else {
                format!("{}: {}", context, detail)
            },
        })
    }
}

/// OCR engine contract: page counting, rasterization, text recognition,
/// and embedded image extraction. Stateless per call.
pub trait OcrEngine: Send + Sync {
    /// Number of pages in the source document.
    fn page_count(&self, document: &Path) -> Result<u32, EngineError>;

    /// Rasterize one page to an image under `out_prefix`, returning the
    /// image path.
    fn rasterize_page(
        &self,
        document: &Path,
        page: u32,
        out_prefix: &Path,
    ) -> Result<PathBuf, EngineError>;

    /// Recognize text in a rasterized page image.
    fn recognize(&self, image: &Path, language: &str) -> Result<String, EngineError>;

    /// Extract embedded raster images from one page, returning their paths.
    fn extract_images(
        &self,
        document: &Path,
        page: u32,
        out_prefix: &Path,
    ) -> Result<Vec<PathBuf>, EngineError>;
}

/// Text-to-speech engine contract. One call renders one segment; output
/// files are owned by the caller so retries stay idempotent.
pub trait TtsEngine: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        output: &Path,
    ) -> Result<(), EngineError>;

    fn supports_language(&self, language: &str) -> bool;
}

/// Target encoding parameters for scene rendering.
#[derive(Debug, Clone)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// Font used for burned-in text overlays.
    pub font_file: PathBuf,
}

/// Transcoding engine contract: scene rendering, lossless concatenation,
/// music mixing, thumbnail extraction, and container probing.
pub trait TranscodeEngine: Send + Sync {
    /// Render one scene (still image + optional narration + overlays) to a
    /// video clip.
    fn render_scene(
        &self,
        scene: &Scene,
        spec: &RenderSpec,
        output: &Path,
    ) -> Result<(), EngineError>;

    /// Concatenate clips losslessly, in order.
    fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), EngineError>;

    /// Concatenate audio artifacts into a single track.
    fn concat_audio(&self, parts: &[PathBuf], output: &Path) -> Result<(), EngineError>;

    /// Mix background music under the video's audio at a relative volume.
    fn mix_music(
        &self,
        video: &Path,
        music: &Path,
        volume: f32,
        output: &Path,
    ) -> Result<(), EngineError>;

    /// Extract a thumbnail frame at an offset in seconds.
    fn thumbnail(&self, video: &Path, offset: f64, output: &Path) -> Result<(), EngineError>;

    /// Probe the final container for duration, size, and resolution.
    fn probe(&self, video: &Path) -> Result<VideoMetadata, EngineError>;
}

/// Check availability of all external binaries the default engines use.
pub fn check_tools() -> Vec<(&'static str, bool)> {
    [
        "pdfinfo",
        "pdftoppm",
        "pdfimages",
        "tesseract",
        "espeak-ng",
        "ffmpeg",
        "ffprobe",
    ]
    .iter()
    .map(|tool| (*tool, which::which(tool).is_ok()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retry_stops_on_semantic_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(1), &CancelFlag::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Failed {
                tool: "tts".into(),
                message: "bad voice".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_retries_io_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(1), &CancelFlag::new(), || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EngineError::Io(std::io::Error::other("transient")))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_stops_when_cancelled() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, Duration::from_millis(1), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Io(std::io::Error::other("transient")))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_flag_kills_a_running_child() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        let result = run_status(
            Command::new("sleep").arg("30"),
            "sleep",
            "test child",
            &cancel,
        );
        assert!(matches!(result, Err(EngineError::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn check_tools_lists_every_engine_binary() {
        let tools = check_tools();
        assert_eq!(tools.len(), 7);
        assert!(tools.iter().any(|(name, _)| *name == "ffmpeg"));
    }
}
