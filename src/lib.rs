//! pagecast - document-to-video synthesis pipeline.
//!
//! Turns paginated documents into narrated videos: pages are OCR'd into a
//! structured document model, analyzed for summary and pacing, narrated
//! through a speech engine, composed into slide scenes, and assembled into
//! a final video with ffmpeg.

pub mod cli;
pub mod config;
pub mod engines;
pub mod models;
pub mod pipeline;
pub mod utils;
pub mod workdir;
