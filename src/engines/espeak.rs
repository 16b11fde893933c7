//! Text-to-speech engine backed by espeak-ng.

use std::path::Path;
use std::process::Command;

use crate::models::VoiceSettings;
use crate::utils::cancel::CancelFlag;

use super::{run_status, EngineError, TtsEngine};

/// Base speaking rate in words per minute at speed 1.0.
const BASE_WPM: f32 = 170.0;

/// Languages the bundled voice table covers.
const SUPPORTED_LANGUAGES: &[&str] = &["en-US", "en-GB", "pt-BR"];

#[derive(Default)]
pub struct EspeakTts {
    cancel: CancelFlag,
}

impl EspeakTts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a cancellation flag so in-flight synthesis calls are killed
    /// when a run is cancelled.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Map the abstract -20..20 pitch offset onto espeak's 0..99 scale,
    /// centered at 50.
    fn espeak_pitch(pitch: i32) -> u32 {
        (50 + pitch * 2).clamp(0, 99) as u32
    }

    /// Map 0.0..1.0 volume onto espeak's 0..200 amplitude scale.
    fn espeak_amplitude(volume: f32) -> u32 {
        (volume.clamp(0.0, 1.0) * 200.0).round() as u32
    }

    fn espeak_rate(speed: f32) -> u32 {
        (BASE_WPM * speed.clamp(0.5, 2.0)).round() as u32
    }
}

impl TtsEngine for EspeakTts {
    fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
        output: &Path,
    ) -> Result<(), EngineError> {
        run_status(
            Command::new("espeak-ng")
                .args(["-v", &voice.voice])
                .args(["-s", &Self::espeak_rate(voice.speed).to_string()])
                .args(["-p", &Self::espeak_pitch(voice.pitch).to_string()])
                .args(["-a", &Self::espeak_amplitude(voice.volume).to_string()])
                .arg("-w")
                .arg(output)
                .arg(text),
            "espeak-ng (install espeak-ng)",
            "speech synthesis failed",
            &self.cancel,
        )
    }

    fn supports_language(&self, language: &str) -> bool {
        SUPPORTED_LANGUAGES.contains(&language)
    }
}
