//! Narration synthesis: segmentation, script generation, and speech
//! rendering.
//!
//! Scripts are generated deterministically from page elements through a
//! template table and audience-adaptation maps, so re-running with the same
//! options reproduces byte-identical text and durations. Audio rendering is
//! the only effectful step and is isolated per segment.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::RetrySettings;
use crate::engines::{with_retry, EngineError, TtsEngine};
use crate::models::{
    AudioArtifact, Audience, Element, ElementType, Emphasis, Narration, NarrationSegment, Page,
    Tone, VoiceSettings,
};
use crate::utils::text::{is_all_caps, split_sentences, word_count};
use crate::workdir::Workdir;

use super::{run_pool, CancelFlag, PipelineEvent, Stage};

/// Errors raised during narration synthesis.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The voice table has no entry for the requested language. Fatal and
    /// never retried.
    #[error("no voice available for language '{0}'")]
    UnsupportedLanguage(String),

    #[error("segment {id}: {source}")]
    Segment {
        id: String,
        #[source]
        source: EngineError,
    },
}

/// Options controlling script generation and speech rendering.
#[derive(Debug, Clone)]
pub struct NarrateOptions {
    pub language: String,
    pub audience: Audience,
    pub max_words_per_segment: usize,
    pub enable_pauses: bool,
    pub volume: f32,
    pub words_per_minute: f64,
}

/// Voice id per (language, tone). The table is plain data so it can be
/// tested without an engine.
const VOICE_TABLE: &[(&str, [(&str, Tone); 5])] = &[
    (
        "en-US",
        [
            ("en-us", Tone::Formal),
            ("en-us+m3", Tone::Casual),
            ("en-us+f3", Tone::Enthusiastic),
            ("en-us+m5", Tone::Serious),
            ("en-us+f4", Tone::Friendly),
        ],
    ),
    (
        "en-GB",
        [
            ("en-gb", Tone::Formal),
            ("en-gb+m3", Tone::Casual),
            ("en-gb+f3", Tone::Enthusiastic),
            ("en-gb+m5", Tone::Serious),
            ("en-gb+f4", Tone::Friendly),
        ],
    ),
    (
        "pt-BR",
        [
            ("pt-br", Tone::Formal),
            ("pt-br+m3", Tone::Casual),
            ("pt-br+f3", Tone::Enthusiastic),
            ("pt-br+m5", Tone::Serious),
            ("pt-br+f4", Tone::Friendly),
        ],
    ),
];

/// Lexical simplification for young audiences.
const CHILDREN_REPLACEMENTS: &[(&str, &str)] = &[
    ("complex", "hard"),
    ("implementation", "setup"),
    ("functionality", "feature"),
    ("optimization", "improvement"),
    ("utilize", "use"),
    ("approximately", "about"),
];

/// Formalization for academic audiences.
const ACADEMIC_REPLACEMENTS: &[(&str, &str)] = &[
    ("Now let's talk about:", "We now turn to:"),
    ("Notice the following points:", "We observe the following points:"),
    ("Consider this organized data:", "We examine the following data:"),
    ("As you can see in the image:", "As illustrated in the figure:"),
];

/// Conversational phrasing for general audiences.
const GENERAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("Now let's talk about:", "Let's look at:"),
    ("Notice the following points:", "Here's what matters:"),
    ("Consider this organized data:", "Take a look at this data:"),
];

/// Look up a voice id for a language and tone.
pub fn voice_for(language: &str, tone: Tone) -> Option<&'static str> {
    VOICE_TABLE
        .iter()
        .find(|(lang, _)| *lang == language)
        .and_then(|(_, voices)| {
            voices
                .iter()
                .find(|(_, t)| *t == tone)
                .map(|(voice, _)| *voice)
        })
}

/// Group a page's elements into segments bounded by a word budget.
///
/// Boundaries never split an element, and element order is preserved: the
/// concatenation of all groups reproduces the input ordering exactly.
pub fn group_elements(elements: &[Element], max_words: usize) -> Vec<Vec<Element>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut current_words = 0;

    for element in elements {
        let words = element.word_count();
        if current_words + words > max_words && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
            current_words = 0;
        }
        current.push(element.clone());
        current_words += words;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Narration template per element type, applied before audience adaptation.
fn template_for(element: &Element) -> String {
    match element.element_type {
        ElementType::Heading => format!("Now let's talk about: {}. ", element.content),
        ElementType::List => format!("Notice the following points: {}. ", element.content),
        ElementType::Table => format!("Consider this organized data: {}. ", element.content),
        ElementType::Image => format!("As you can see in the image: {}. ", element.content),
        ElementType::Text => format!("{}. ", element.content),
    }
}

/// Table-driven audience adaptation: pure string substitution.
pub fn adapt_for_audience(text: &str, audience: Audience) -> String {
    let replacements = match audience {
        Audience::Children => CHILDREN_REPLACEMENTS,
        Audience::Academic => ACADEMIC_REPLACEMENTS,
        Audience::General => GENERAL_REPLACEMENTS,
        Audience::Technical => return text.to_string(),
    };
    let mut adapted = text.to_string();
    for (from, to) in replacements {
        adapted = adapted.replace(from, to);
    }
    adapted
}

/// Infer narration tone from segment content and audience.
pub fn infer_tone(elements: &[Element], audience: Audience) -> Tone {
    let text = elements
        .iter()
        .map(|e| e.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    if ["important", "warning", "attention", "caution", "safety"]
        .iter()
        .any(|kw| text.contains(kw))
    {
        return Tone::Serious;
    }
    if audience == Audience::Children {
        return Tone::Friendly;
    }
    if text.contains("example") || text.contains("see") {
        return Tone::Casual;
    }
    Tone::Formal
}

fn speed_for(audience: Audience) -> f32 {
    match audience {
        Audience::Children => 0.8,
        Audience::Technical => 0.9,
        _ => 1.0,
    }
}

fn pitch_for(tone: Tone) -> i32 {
    match tone {
        Tone::Enthusiastic => 5,
        Tone::Serious => -3,
        Tone::Friendly => 3,
        _ => 0,
    }
}

fn emphasis_for(tone: Tone) -> Emphasis {
    match tone {
        Tone::Enthusiastic | Tone::Serious => Emphasis::Strong,
        _ => Emphasis::Normal,
    }
}

/// Words to stress: content of bold or all-caps elements.
fn emphasis_words(elements: &[Element]) -> Vec<String> {
    elements
        .iter()
        .filter(|e| {
            e.style.as_ref().map(|s| s.bold).unwrap_or(false) || is_all_caps(&e.content)
        })
        .map(|e| e.content.clone())
        .collect()
}

/// Speaking-time estimate in whole seconds, rounded up.
pub fn estimate_duration(text: &str, words_per_minute: f64) -> f64 {
    (word_count(text) as f64 / words_per_minute * 60.0).ceil()
}

/// Cumulative duration at each interior sentence boundary.
pub fn pause_points(text: &str, words_per_minute: f64) -> Vec<f64> {
    let sentences = split_sentences(text);
    if sentences.len() < 2 {
        return Vec::new();
    }
    let mut points = Vec::with_capacity(sentences.len() - 1);
    let mut elapsed = 0.0;
    for sentence in &sentences[..sentences.len() - 1] {
        elapsed += estimate_duration(sentence, words_per_minute);
        points.push(elapsed);
    }
    points
}

pub struct NarrationSynthesizer {
    tts: Arc<dyn TtsEngine>,
    opts: NarrateOptions,
    retry: RetrySettings,
}

impl NarrationSynthesizer {
    pub fn new(tts: Arc<dyn TtsEngine>, opts: NarrateOptions, retry: RetrySettings) -> Self {
        Self { tts, opts, retry }
    }

    /// Generate narration scripts for all pages. Pure and deterministic;
    /// fails only when the language has no voice table entry.
    pub fn build_segments(&self, pages: &[Page]) -> Result<Vec<NarrationSegment>, SynthesisError> {
        if !self.tts.supports_language(&self.opts.language)
            || voice_for(&self.opts.language, Tone::Formal).is_none()
        {
            return Err(SynthesisError::UnsupportedLanguage(
                self.opts.language.clone(),
            ));
        }

        let mut segments = Vec::new();
        for page in pages {
            let groups = group_elements(&page.layout.elements, self.opts.max_words_per_segment);
            for (index, group) in groups.iter().enumerate() {
                segments.push(self.build_segment(page.page_number, index, group));
            }
        }
        Ok(segments)
    }

    fn build_segment(
        &self,
        page_number: u32,
        index: usize,
        group: &[Element],
    ) -> NarrationSegment {
        let raw: String = group.iter().map(template_for).collect();
        let text = adapt_for_audience(raw.trim(), self.opts.audience);
        let tone = infer_tone(group, self.opts.audience);
        let duration = estimate_duration(&text, self.opts.words_per_minute);
        // The language was validated in build_segments.
        let voice = voice_for(&self.opts.language, tone).unwrap_or_default().to_string();

        NarrationSegment {
            id: format!("page_{}_segment_{}", page_number, index),
            page_number,
            duration,
            voice: VoiceSettings {
                voice,
                speed: speed_for(self.opts.audience),
                pitch: pitch_for(tone),
                volume: self.opts.volume,
                emphasis: emphasis_for(tone),
            },
            emphasis_words: emphasis_words(group),
            pause_points: if self.opts.enable_pauses {
                pause_points(&text, self.opts.words_per_minute)
            } else {
                Vec::new()
            },
            tone,
            text,
        }
    }

    /// Render one audio artifact per segment in a bounded worker pool.
    ///
    /// Output files are named by segment id, so a retried segment
    /// overwrites only its own artifact. Empty segments are skipped with a
    /// warning; engine failures are isolated per segment.
    pub async fn render_audio(
        &self,
        segments: &[NarrationSegment],
        workdir: &Workdir,
        workers: usize,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: &CancelFlag,
    ) -> (Vec<AudioArtifact>, Vec<(String, String)>) {
        let _ = events
            .send(PipelineEvent::StageStarted {
                stage: Stage::Narrate,
                total_units: segments.len(),
            })
            .await;

        let units: Vec<(NarrationSegment, std::path::PathBuf)> = segments
            .iter()
            .map(|s| (s.clone(), workdir.segment_audio(&s.id)))
            .collect();

        let tts = self.tts.clone();
        let retry = self.retry.clone();
        let events_tx = events.clone();
        let cancel_flag = cancel.clone();

        let worker = Arc::new(
            move |(segment, output): (NarrationSegment, std::path::PathBuf)| {
                let unit = segment.id.clone();
                let _ = futures::executor::block_on(events_tx.send(PipelineEvent::UnitStarted {
                    stage: Stage::Narrate,
                    unit: unit.clone(),
                }));

                if segment.text.is_empty() {
                    tracing::warn!("segment {} has no text, skipping synthesis", segment.id);
                    let _ = futures::executor::block_on(events_tx.send(PipelineEvent::UnitCompleted {
                        stage: Stage::Narrate,
                        unit,
                    }));
                    return (segment.id, Ok(None));
                }

                let delay = Duration::from_millis(retry.base_delay_ms);
                let result = with_retry(retry.attempts, delay, &cancel_flag, || {
                    tts.synthesize(&segment.text, &segment.voice, &output)
                });

                match result {
                    Ok(()) => {
                        let _ =
                            futures::executor::block_on(events_tx.send(PipelineEvent::UnitCompleted {
                                stage: Stage::Narrate,
                                unit,
                            }));
                        (segment.id, Ok(Some(output)))
                    }
                    Err(e) => {
                        tracing::warn!("speech synthesis failed for {}: {}", segment.id, e);
                        let _ =
                            futures::executor::block_on(events_tx.send(PipelineEvent::UnitFailed {
                                stage: Stage::Narrate,
                                unit,
                                error: e.to_string(),
                            }));
                        (segment.id, Err(e))
                    }
                }
            },
        );

        let results = run_pool(workers, units, cancel, worker).await;

        let mut audio = Vec::new();
        let mut failures = Vec::new();
        for (segment_id, result) in results {
            match result {
                Ok(Some(path)) => audio.push(AudioArtifact { segment_id, path }),
                Ok(None) => {}
                Err(e) => failures.push((segment_id, e.to_string())),
            }
        }
        // Pool completion order is nondeterministic; restore segment order.
        let order: std::collections::HashMap<&str, usize> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        audio.sort_by_key(|a| order.get(a.segment_id.as_str()).copied().unwrap_or(usize::MAX));

        let _ = events
            .send(PipelineEvent::StageCompleted {
                stage: Stage::Narrate,
                succeeded: segments.len() - failures.len(),
                failed: failures.len(),
            })
            .await;

        (audio, failures)
    }

    /// Full synthesis: scripts plus rendered audio.
    pub async fn synthesize(
        &self,
        pages: &[Page],
        workdir: &Workdir,
        workers: usize,
        events: &mpsc::Sender<PipelineEvent>,
        cancel: &CancelFlag,
    ) -> Result<(Narration, Vec<(String, String)>), SynthesisError> {
        let segments = self.build_segments(pages)?;
        let (audio, failures) = self
            .render_audio(&segments, workdir, workers, events, cancel)
            .await;
        let total_duration = segments.iter().map(|s| s.duration).sum();
        Ok((
            Narration {
                segments,
                audio,
                total_duration,
            },
            failures,
        ))
    }
}
