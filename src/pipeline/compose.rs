//! Scene composition: slide backgrounds, overlay layout, and per-page
//! narration tracks.
//!
//! Composition is pure layout work plus cheap local IO (PNG encoding, audio
//! concatenation), so it runs sequentially rather than through a worker
//! pool. Every page yields exactly one scene, in page order.

use std::path::PathBuf;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::VideoSettings;
use crate::engines::{EngineError, TranscodeEngine};
use crate::models::{
    Document, ElementType, Narration, Page, Scene, TextOverlay, Transition, TransitionKind,
};
use crate::workdir::Workdir;

use super::{PipelineEvent, Stage};

/// Base overlay font size in target pixels before per-type adjustment.
const BASE_FONT_SIZE: f32 = 24.0;

/// Subtitle band placement: fixed left margin, band anchored a fixed
/// distance above the bottom edge of the frame.
const SUBTITLE_X: u32 = 50;
const SUBTITLE_BOTTOM_OFFSET: u32 = 180;
const SUBTITLE_FONT_SIZE: u32 = 28;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("slide for page {page}: {source}")]
    Slide {
        page: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("narration track for page {page}: {source}")]
    Audio {
        page: u32,
        #[source]
        source: EngineError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Background gradient palette, chosen from page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gradient {
    pub top: [u8; 3],
    pub bottom: [u8; 3],
}

/// Dark palette for pages with embedded images, muted for dense pages,
/// bright for everything else.
pub fn gradient_for(page: &Page) -> Gradient {
    if !page.images.is_empty() {
        Gradient {
            top: [0x1a, 0x1a, 0x2e],
            bottom: [0x16, 0x21, 0x3e],
        }
    } else if page.layout.elements.len() > 20 {
        Gradient {
            top: [0x2c, 0x3e, 0x50],
            bottom: [0x34, 0x49, 0x5e],
        }
    } else {
        Gradient {
            top: [0x34, 0x98, 0xdb],
            bottom: [0x29, 0x80, 0xb9],
        }
    }
}

/// Render a vertical-gradient slide background.
pub fn render_slide(width: u32, height: u32, gradient: Gradient) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        let t = y as f32 / height.max(1) as f32;
        let channel = |i: usize| {
            let top = gradient.top[i] as f32;
            let bottom = gradient.bottom[i] as f32;
            (top + (bottom - top) * t).round() as u8
        };
        Rgb([channel(0), channel(1), channel(2)])
    })
}

/// Overlay font size for an element: styled size scaled up for screen
/// legibility, then adjusted per element type.
fn font_size_for(element: &crate::models::Element) -> f32 {
    let base = element
        .style
        .as_ref()
        .map(|s| s.font_size * 1.5)
        .unwrap_or(BASE_FONT_SIZE);
    match element.element_type {
        ElementType::Heading => base * 1.5,
        ElementType::List => base * 0.9,
        _ => base,
    }
}

/// Project page elements into target-pixel overlays, visible for the whole
/// scene.
///
/// Horizontal and vertical positions scale independently so portrait
/// pages stay inside landscape frames; fonts take the smaller axis scale
/// to avoid overrunning the tighter dimension.
pub fn element_overlays(
    page: &Page,
    (target_width, target_height): (u32, u32),
    duration: f64,
) -> Vec<TextOverlay> {
    let scale_x = target_width as f32 / page.layout.width.max(1) as f32;
    let scale_y = target_height as f32 / page.layout.height.max(1) as f32;
    let font_scale = scale_x.min(scale_y);
    page.layout
        .elements
        .iter()
        .map(|element| TextOverlay {
            text: element.content.clone(),
            x: (element.position.x * scale_x).round() as u32,
            y: (element.position.y * scale_y).round() as u32,
            font_size: (font_size_for(element) * font_scale).round().max(1.0) as u32,
            font_color: element
                .style
                .as_ref()
                .and_then(|s| s.color.clone())
                .unwrap_or_else(|| "#ffffff".to_string()),
            box_color: None,
            start: 0.0,
            end: duration,
        })
        .collect()
}

/// Boxed subtitle band carrying the page's narration text.
fn subtitle_overlay(text: &str, frame_height: u32, duration: f64) -> TextOverlay {
    TextOverlay {
        text: text.to_string(),
        x: SUBTITLE_X,
        y: frame_height.saturating_sub(SUBTITLE_BOTTOM_OFFSET),
        font_size: SUBTITLE_FONT_SIZE,
        font_color: "#ffffff".to_string(),
        box_color: Some("black".to_string()),
        start: 0.0,
        end: duration,
    }
}

pub struct SceneComposer {
    transcoder: Arc<dyn TranscodeEngine>,
    opts: VideoSettings,
}

impl SceneComposer {
    pub fn new(transcoder: Arc<dyn TranscodeEngine>, opts: VideoSettings) -> Self {
        Self { transcoder, opts }
    }

    fn transition(&self) -> Transition {
        if !self.opts.transitions_enabled {
            return Transition::cut();
        }
        match TransitionKind::from_str(&self.opts.transition_kind) {
            Some(kind) => Transition {
                kind,
                duration: self.opts.transition_duration,
            },
            None => {
                tracing::warn!(
                    "unknown transition kind '{}', using cut",
                    self.opts.transition_kind
                );
                Transition::cut()
            }
        }
    }

    /// Concatenate a page's segment audio into one narration track. Pages
    /// with a single artifact reuse it directly.
    fn page_audio(
        &self,
        page_number: u32,
        narration: &Narration,
        workdir: &Workdir,
    ) -> Result<Option<PathBuf>, ComposeError> {
        let parts: Vec<PathBuf> = narration
            .segments_for_page(page_number)
            .iter()
            .filter_map(|s| narration.audio_for_segment(&s.id))
            .map(|a| a.path.clone())
            .collect();

        match parts.len() {
            0 => Ok(None),
            1 => Ok(Some(parts.into_iter().next().unwrap())),
            _ => {
                let output = workdir.scene_audio(page_number);
                self.transcoder
                    .concat_audio(&parts, &output)
                    .map_err(|source| ComposeError::Audio {
                        page: page_number,
                        source,
                    })?;
                Ok(Some(output))
            }
        }
    }

    fn compose_scene(
        &self,
        page: &Page,
        narration: &Narration,
        workdir: &Workdir,
    ) -> Result<Scene, ComposeError> {
        let segments = narration.segments_for_page(page.page_number);
        let spoken: f64 = segments.iter().map(|s| s.duration).sum();
        let duration = spoken.max(self.opts.min_scene_duration);

        let slide_path = workdir.slide(page.page_number);
        let slide = render_slide(self.opts.width, self.opts.height, gradient_for(page));
        slide.save(&slide_path).map_err(|source| ComposeError::Slide {
            page: page.page_number,
            source,
        })?;

        let mut overlays = element_overlays(page, (self.opts.width, self.opts.height), duration);
        let subtitle_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if !subtitle_text.is_empty() {
            overlays.push(subtitle_overlay(&subtitle_text, self.opts.height, duration));
        }

        let transition = self.transition();
        Ok(Scene {
            id: format!("scene_{}", page.page_number),
            page_number: page.page_number,
            duration,
            slide_path,
            narration_path: self.page_audio(page.page_number, narration, workdir)?,
            transition_in: transition,
            transition_out: transition,
            overlays,
        })
    }

    /// Compose one scene per page, in page order. Any failure is fatal:
    /// a missing scene would silently drop a page from the video.
    pub async fn compose(
        &self,
        document: &Document,
        narration: &Narration,
        workdir: &Workdir,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<Vec<Scene>, ComposeError> {
        let _ = events
            .send(PipelineEvent::StageStarted {
                stage: Stage::Compose,
                total_units: document.pages.len(),
            })
            .await;

        let mut scenes = Vec::with_capacity(document.pages.len());
        for page in &document.pages {
            let unit = format!("scene_{}", page.page_number);
            let _ = events
                .send(PipelineEvent::UnitStarted {
                    stage: Stage::Compose,
                    unit: unit.clone(),
                })
                .await;
            match self.compose_scene(page, narration, workdir) {
                Ok(scene) => {
                    scenes.push(scene);
                    let _ = events
                        .send(PipelineEvent::UnitCompleted {
                            stage: Stage::Compose,
                            unit,
                        })
                        .await;
                }
                Err(e) => {
                    let _ = events
                        .send(PipelineEvent::UnitFailed {
                            stage: Stage::Compose,
                            unit,
                            error: e.to_string(),
                        })
                        .await;
                    return Err(e);
                }
            }
        }

        let _ = events
            .send(PipelineEvent::StageCompleted {
                stage: Stage::Compose,
                succeeded: scenes.len(),
                failed: 0,
            })
            .await;
        Ok(scenes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Element, Layout, Position, Style};

    fn page(n: u32, elements: Vec<Element>) -> Page {
        Page {
            page_number: n,
            text: String::new(),
            images: Vec::new(),
            layout: Layout {
                width: 1275,
                height: 1650,
                elements,
            },
        }
    }

    fn element(element_type: ElementType, content: &str, y: f32) -> Element {
        Element {
            element_type,
            content: content.to_string(),
            position: Position {
                x: 60.0,
                y,
                width: 500.0,
                height: 40.0,
            },
            style: None,
        }
    }

    #[test]
    fn gradient_palette_tracks_page_content() {
        let plain = page(1, vec![element(ElementType::Text, "hello", 50.0)]);
        assert_eq!(gradient_for(&plain).top, [0x34, 0x98, 0xdb]);

        let dense = page(
            2,
            (0..25)
                .map(|i| element(ElementType::Text, "line", i as f32 * 40.0))
                .collect(),
        );
        assert_eq!(gradient_for(&dense).top, [0x2c, 0x3e, 0x50]);

        let mut illustrated = page(3, Vec::new());
        illustrated.images = vec!["aGk=".to_string()];
        assert_eq!(gradient_for(&illustrated).top, [0x1a, 0x1a, 0x2e]);
    }

    #[test]
    fn slide_gradient_interpolates_top_to_bottom() {
        let slide = render_slide(
            8,
            8,
            Gradient {
                top: [0, 0, 0],
                bottom: [200, 200, 200],
            },
        );
        let top = slide.get_pixel(0, 0).0[0];
        let bottom = slide.get_pixel(0, 7).0[0];
        assert!(top < bottom);
        assert_eq!(top, 0);
    }

    #[test]
    fn overlays_scale_each_axis_independently() {
        let p = page(1, vec![element(ElementType::Text, "hello", 100.0)]);
        let overlays = element_overlays(&p, (1920, 1080), 10.0);
        assert_eq!(overlays.len(), 1);
        // x follows the width ratio (1920 / 1275), y the height ratio
        // (1080 / 1650).
        assert_eq!(overlays[0].x, 90);
        assert_eq!(overlays[0].y, 65);
        assert_eq!(overlays[0].end, 10.0);
        assert!(overlays[0].box_color.is_none());
    }

    #[test]
    fn portrait_page_overlays_stay_inside_a_landscape_frame() {
        // An element near the bottom of a portrait page must land inside
        // a 1080-pixel-high frame, not below it.
        let p = page(1, vec![element(ElementType::Text, "footer line", 1500.0)]);
        let overlays = element_overlays(&p, (1920, 1080), 10.0);
        assert_eq!(overlays[0].y, 982);
        assert!(overlays[0].y < 1080);
    }

    #[test]
    fn heading_overlays_render_larger_than_list_overlays() {
        let p = page(
            1,
            vec![
                element(ElementType::Heading, "Title", 50.0),
                element(ElementType::List, "- item", 100.0),
            ],
        );
        let overlays = element_overlays(&p, (1920, 1080), 5.0);
        assert!(overlays[0].font_size > overlays[1].font_size);
    }

    #[test]
    fn styled_font_size_overrides_base() {
        let mut e = element(ElementType::Text, "big", 50.0);
        e.style = Some(Style {
            font_size: 40.0,
            bold: false,
            italic: false,
            color: Some("#ff0000".to_string()),
        });
        let p = page(1, vec![e]);
        let overlays = element_overlays(&p, (1275, 1650), 5.0);
        // 40 * 1.5 at unit scale.
        assert_eq!(overlays[0].font_size, 60);
        assert_eq!(overlays[0].font_color, "#ff0000");
    }

    #[test]
    fn subtitle_is_boxed_and_spans_the_scene() {
        let overlay = subtitle_overlay("Narration text.", 1080, 12.0);
        assert_eq!(overlay.box_color.as_deref(), Some("black"));
        assert_eq!(overlay.start, 0.0);
        assert_eq!(overlay.end, 12.0);
        assert_eq!(overlay.y, 900);
    }

    #[test]
    fn subtitle_band_tracks_the_frame_height() {
        let overlay = subtitle_overlay("Narration text.", 720, 5.0);
        assert_eq!(overlay.y, 540);
        assert!(overlay.y < 720);
    }
}
