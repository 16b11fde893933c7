//! Transcoding engine backed by the system ffmpeg/ffprobe binaries.
//!
//! The system binaries are used rather than linked FFmpeg libraries to avoid
//! native dev header requirements; every operation is a single spawned
//! process with piped stderr for diagnostics.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::models::{Scene, TransitionKind, VideoMetadata};
use crate::utils::cancel::CancelFlag;

use super::{run_capture, run_status, EngineError, RenderSpec, TranscodeEngine};

#[derive(Default)]
pub struct FfmpegTranscoder {
    cancel: CancelFlag,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a cancellation flag so in-flight ffmpeg invocations are
    /// killed when a run is cancelled.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Escape text for use inside a drawtext filter argument.
    fn escape_drawtext(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\\' | '\'' | ':' | ',' | ';' | '%' | '[' | ']' | '=' => {
                    escaped.push('\\');
                    escaped.push(c);
                }
                '\n' => escaped.push(' '),
                _ => escaped.push(c),
            }
        }
        escaped
    }

    /// Build the video filter chain for a scene: scaling, text overlays,
    /// and fade transitions burned into the clip.
    fn scene_filter(scene: &Scene, spec: &RenderSpec) -> String {
        let mut filters = vec![format!(
            "scale={}:{}:force_original_aspect_ratio=decrease,pad={}:{}:(ow-iw)/2:(oh-ih)/2",
            spec.width, spec.height, spec.width, spec.height
        )];

        let font = spec.font_file.display();
        for overlay in &scene.overlays {
            let mut f = format!(
                "drawtext=fontfile={}:text='{}':x={}:y={}:fontsize={}:fontcolor={}",
                font,
                Self::escape_drawtext(&overlay.text),
                overlay.x,
                overlay.y,
                overlay.font_size,
                overlay.font_color,
            );
            if let Some(box_color) = &overlay.box_color {
                f.push_str(&format!(":box=1:boxcolor={}@0.8:boxborderw=10", box_color));
            }
            f.push_str(&format!(
                ":enable='between(t,{:.3},{:.3})'",
                overlay.start, overlay.end
            ));
            filters.push(f);
        }

        // Non-cut transitions are rendered as in-clip fades, so they overlap
        // scene time instead of extending the timeline.
        if scene.transition_in.kind != TransitionKind::Cut && scene.transition_in.duration > 0.0 {
            filters.push(format!("fade=t=in:st=0:d={:.3}", scene.transition_in.duration));
        }
        if scene.transition_out.kind != TransitionKind::Cut && scene.transition_out.duration > 0.0 {
            let start = (scene.duration - scene.transition_out.duration).max(0.0);
            filters.push(format!(
                "fade=t=out:st={:.3}:d={:.3}",
                start, scene.transition_out.duration
            ));
        }

        filters.join(",")
    }

    /// Write a concat demuxer list file next to the output.
    fn write_concat_list(parts: &[PathBuf], output: &Path) -> Result<PathBuf, EngineError> {
        let list_path = output.with_extension("concat.txt");
        let mut contents = String::new();
        for part in parts {
            let path = part.display().to_string().replace('\'', "'\\''");
            contents.push_str(&format!("file '{}'\n", path));
        }
        std::fs::write(&list_path, contents)?;
        Ok(list_path)
    }

    fn concat_with_list(
        &self,
        parts: &[PathBuf],
        output: &Path,
        context: &str,
    ) -> Result<(), EngineError> {
        let list_path = Self::write_concat_list(parts, output)?;
        let result = run_status(
            Command::new("ffmpeg")
                .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
                .arg(&list_path)
                .args(["-c", "copy"])
                .arg(output),
            "ffmpeg (install ffmpeg)",
            context,
            &self.cancel,
        );
        let _ = std::fs::remove_file(&list_path);
        result
    }
}

impl TranscodeEngine for FfmpegTranscoder {
    fn render_scene(
        &self,
        scene: &Scene,
        spec: &RenderSpec,
        output: &Path,
    ) -> Result<(), EngineError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-loop", "1", "-i"])
            .arg(&scene.slide_path);

        // A silent source keeps stream layouts uniform across clips so the
        // lossless concat step never has to re-mux mismatched inputs.
        match &scene.narration_path {
            Some(narration) => {
                cmd.arg("-i").arg(narration);
            }
            None => {
                cmd.args(["-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo"]);
            }
        }

        cmd.args(["-t", &format!("{:.3}", scene.duration)])
            .args(["-vf", &Self::scene_filter(scene, spec)])
            .args(["-c:v", &spec.video_codec])
            .args(["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"])
            .args(["-r", &spec.fps.to_string()])
            .args(["-c:a", &spec.audio_codec])
            .args(["-b:a", "128k", "-ar", "44100"])
            .arg(output);

        run_status(
            &mut cmd,
            "ffmpeg (install ffmpeg)",
            &format!("failed to render {}", scene.id),
            &self.cancel,
        )
    }

    fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        self.concat_with_list(clips, output, "failed to concatenate scene clips")
    }

    fn concat_audio(&self, parts: &[PathBuf], output: &Path) -> Result<(), EngineError> {
        self.concat_with_list(parts, output, "failed to concatenate narration audio")
    }

    fn mix_music(
        &self,
        video: &Path,
        music: &Path,
        volume: f32,
        output: &Path,
    ) -> Result<(), EngineError> {
        let filter = format!(
            "[1:a]volume={:.2}[music];[0:a][music]amix=inputs=2:duration=first:dropout_transition=2[mixed]",
            volume
        );
        run_status(
            Command::new("ffmpeg")
                .args(["-y", "-loglevel", "error", "-i"])
                .arg(video)
                .args(["-stream_loop", "-1", "-i"])
                .arg(music)
                .args(["-filter_complex", &filter])
                .args(["-map", "0:v", "-map", "[mixed]"])
                .args(["-c:v", "copy", "-c:a", "aac", "-b:a", "192k"])
                .arg(output),
            "ffmpeg (install ffmpeg)",
            "failed to mix background music",
            &self.cancel,
        )
    }

    fn thumbnail(&self, video: &Path, offset: f64, output: &Path) -> Result<(), EngineError> {
        run_status(
            Command::new("ffmpeg")
                .args(["-y", "-loglevel", "error", "-ss", &format!("{:.3}", offset), "-i"])
                .arg(video)
                .args(["-vframes", "1", "-q:v", "2"])
                .arg(output),
            "ffmpeg (install ffmpeg)",
            "failed to extract thumbnail",
            &self.cancel,
        )
    }

    fn probe(&self, video: &Path) -> Result<VideoMetadata, EngineError> {
        let duration_out = run_capture(
            Command::new("ffprobe")
                .args([
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ])
                .arg(video),
            "ffprobe (install ffmpeg)",
            &self.cancel,
        )?;
        let duration: f64 = duration_out.trim().parse().map_err(|_| EngineError::Failed {
            tool: "ffprobe".to_string(),
            message: format!("unparseable duration '{}'", duration_out.trim()),
        })?;

        let resolution_out = run_capture(
            Command::new("ffprobe")
                .args([
                    "-v",
                    "error",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=width,height",
                    "-of",
                    "csv=s=x:p=0",
                ])
                .arg(video),
            "ffprobe (install ffmpeg)",
            &self.cancel,
        )?;
        let mut dims = resolution_out.trim().split('x');
        let width: u32 = dims
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| EngineError::Failed {
                tool: "ffprobe".to_string(),
                message: format!("unparseable resolution '{}'", resolution_out.trim()),
            })?;
        let height: u32 = dims
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| EngineError::Failed {
                tool: "ffprobe".to_string(),
                message: format!("unparseable resolution '{}'", resolution_out.trim()),
            })?;

        let file_size = std::fs::metadata(video)?.len();

        Ok(VideoMetadata {
            duration,
            file_size,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TextOverlay, Transition};

    fn scene_with(overlays: Vec<TextOverlay>, fade: bool) -> Scene {
        let transition = if fade {
            Transition {
                kind: TransitionKind::Fade,
                duration: 1.0,
            }
        } else {
            Transition::cut()
        };
        Scene {
            id: "scene_1".into(),
            page_number: 1,
            duration: 10.0,
            slide_path: PathBuf::from("slide_1.png"),
            narration_path: None,
            transition_in: transition,
            transition_out: transition,
            overlays,
        }
    }

    fn spec() -> RenderSpec {
        RenderSpec {
            width: 1920,
            height: 1080,
            fps: 30,
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
            font_file: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
        }
    }

    #[test]
    fn drawtext_escaping_covers_filter_metacharacters() {
        assert_eq!(
            FfmpegTranscoder::escape_drawtext("a:b'c,d;e%f"),
            "a\\:b\\'c\\,d\\;e\\%f"
        );
        assert_eq!(FfmpegTranscoder::escape_drawtext("line\nbreak"), "line break");
    }

    #[test]
    fn cut_transitions_add_no_fade_filters() {
        let filter = FfmpegTranscoder::scene_filter(&scene_with(vec![], false), &spec());
        assert!(!filter.contains("fade"));
    }

    #[test]
    fn fade_transitions_bracket_the_clip() {
        let filter = FfmpegTranscoder::scene_filter(&scene_with(vec![], true), &spec());
        assert!(filter.contains("fade=t=in:st=0:d=1.000"));
        assert!(filter.contains("fade=t=out:st=9.000:d=1.000"));
    }

    #[test]
    fn overlays_become_windowed_drawtext_filters() {
        let overlay = TextOverlay {
            text: "Hello".into(),
            x: 50,
            y: 900,
            font_size: 28,
            font_color: "#ffffff".into(),
            box_color: Some("#000000".into()),
            start: 0.0,
            end: 10.0,
        };
        let filter = FfmpegTranscoder::scene_filter(&scene_with(vec![overlay], false), &spec());
        assert!(filter.contains("drawtext="));
        assert!(filter.contains("box=1:boxcolor=#000000@0.8"));
        assert!(filter.contains("enable='between(t,0.000,10.000)'"));
    }
}
