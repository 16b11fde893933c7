//! Progress rendering for pipeline events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::pipeline::{PipelineEvent, Stage};

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap()
        .progress_chars("█▓░")
}

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Ingest => "Reading pages...",
        Stage::Analyze => "Analyzing content...",
        Stage::Narrate => "Synthesizing narration...",
        Stage::Compose => "Composing scenes...",
        Stage::Assemble => "Rendering video...",
    }
}

fn stage_banner(stage: Stage, total_units: usize) -> String {
    match stage {
        Stage::Ingest => format!("Ingesting {} pages", total_units),
        Stage::Analyze => "Analyzing document content".to_string(),
        Stage::Narrate => format!("Synthesizing {} narration segments", total_units),
        Stage::Compose => format!("Composing {} scenes", total_units),
        Stage::Assemble => format!("Rendering {} scene clips", total_units),
    }
}

fn stage_summary(stage: Stage, succeeded: usize) -> String {
    match stage {
        Stage::Ingest => format!("Ingested {} pages", succeeded),
        Stage::Analyze => "Content analysis complete".to_string(),
        Stage::Narrate => format!("Synthesized {} segments", succeeded),
        Stage::Compose => format!("Composed {} scenes", succeeded),
        Stage::Assemble => format!("Assembled {} scenes", succeeded),
    }
}

/// Render pipeline events as progress bars and status lines until the
/// sender side closes.
pub async fn drive(mut events: mpsc::Receiver<PipelineEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::StageStarted { stage, total_units } => {
                println!("{} {}", style("→").cyan(), stage_banner(stage, total_units));
                if stage != Stage::Analyze {
                    let progress = ProgressBar::new(total_units as u64);
                    progress.set_style(bar_style());
                    progress.set_message(stage_message(stage));
                    bar = Some(progress);
                }
            }
            PipelineEvent::UnitStarted { unit, .. } => {
                if let Some(ref progress) = bar {
                    progress.set_message(unit);
                }
            }
            PipelineEvent::UnitCompleted { .. } => {
                if let Some(ref progress) = bar {
                    progress.inc(1);
                }
            }
            PipelineEvent::UnitFailed { unit, error, .. } => {
                if let Some(ref progress) = bar {
                    progress.inc(1);
                    progress.println(format!(
                        "  {} {} failed: {}",
                        style("!").yellow(),
                        unit,
                        error
                    ));
                }
            }
            PipelineEvent::StageCompleted {
                stage,
                succeeded,
                failed,
            } => {
                if let Some(progress) = bar.take() {
                    progress.finish_and_clear();
                }
                println!("{} {}", style("✓").green(), stage_summary(stage, succeeded));
                if failed > 0 {
                    println!("  {} {} units failed", style("!").yellow(), failed);
                }
            }
        }
    }
}

/// Discard pipeline events. Used by commands that write machine-readable
/// output to stdout.
pub async fn drain(mut events: mpsc::Receiver<PipelineEvent>) {
    while events.recv().await.is_some() {}
}
