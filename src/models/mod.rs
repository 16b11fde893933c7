//! Shared data model for the synthesis pipeline.
//!
//! Each pipeline stage produces a new immutable artifact set consumed
//! read-only by the next stage; nothing here is mutated across stages.

mod document;
mod narration;
mod scene;

pub use document::{Complexity, Document, Element, ElementType, Layout, Metadata, Page, Position, Style};
pub use narration::{
    AudioArtifact, Audience, Emphasis, Narration, NarrationSegment, Tone, VoiceSettings,
};
pub use scene::{GeneratedVideo, Scene, TextOverlay, Transition, TransitionKind, VideoMetadata};
