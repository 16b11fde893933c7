//! CLI commands implementation.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::engines::{self, EspeakTts, TesseractOcr};
use crate::models::{Audience, Document};
use crate::pipeline::{
    analyze::ContentAnalyzer,
    ingest::DocumentIngestor,
    narrate::{NarrateOptions, NarrationSynthesizer},
    CancelFlag, Pipeline, PipelineStatus, RunOptions,
};
use crate::utils::format_size;
use crate::workdir::Workdir;

#[derive(Parser)]
#[command(name = "pagecast")]
#[command(about = "Document-to-video synthesis pipeline")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a narrated video from a document
    Generate {
        /// Input document (PDF)
        input: PathBuf,
        /// Output video path (default: <input stem>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Narration language (BCP-47, e.g. en-US)
        #[arg(short, long)]
        language: Option<String>,
        /// Target audience: general, technical, academic, children
        #[arg(short, long, default_value = "general")]
        audience: String,
        /// Background music file to mix under the narration
        #[arg(short, long)]
        music: Option<PathBuf>,
        /// Render hard cuts instead of configured transitions
        #[arg(long)]
        no_transitions: bool,
        /// Extract embedded page images into the document model
        #[arg(long)]
        extract_images: bool,
        /// Worker count for all stages (0 = per-stage defaults)
        #[arg(short, long, default_value = "0")]
        workers: usize,
        /// Keep the working directory for inspection
        #[arg(long)]
        keep_workdir: bool,
    },

    /// Ingest and analyze a document, printing the document model as JSON
    Ingest {
        /// Input document (PDF)
        input: PathBuf,
        /// Extract embedded page images into the document model
        #[arg(long)]
        extract_images: bool,
        /// Number of OCR workers
        #[arg(short, long, default_value = "2")]
        workers: usize,
    },

    /// Generate narration scripts without rendering audio, as JSON
    Narrate {
        /// Input document (PDF)
        input: PathBuf,
        /// Narration language (BCP-47, e.g. en-US)
        #[arg(short, long)]
        language: Option<String>,
        /// Target audience: general, technical, academic, children
        #[arg(short, long, default_value = "general")]
        audience: String,
        /// Number of OCR workers
        #[arg(short, long, default_value = "2")]
        workers: usize,
    },

    /// Check that all external tools are installed
    Tools,
}

fn parse_audience(s: &str) -> anyhow::Result<Audience> {
    Audience::from_str(s)
        .ok_or_else(|| anyhow::anyhow!("unknown audience '{}' (general, technical, academic, children)", s))
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            input,
            output,
            language,
            audience,
            music,
            no_transitions,
            extract_images,
            workers,
            keep_workdir,
        } => {
            if let Some(language) = language {
                settings.narration.language = language;
            }
            if no_transitions {
                settings.video.transitions_enabled = false;
            }
            if extract_images {
                settings.ingest.extract_images = true;
            }
            if workers > 0 {
                settings.workers.ocr = workers;
                settings.workers.tts = workers;
                settings.workers.render = workers;
            }
            let audience = parse_audience(&audience)?;
            let output = output.unwrap_or_else(|| default_output(&input));
            cmd_generate(
                settings,
                RunOptions {
                    input,
                    output,
                    audience,
                    background_music: music,
                    keep_workdir,
                },
            )
            .await
        }
        Commands::Ingest {
            input,
            extract_images,
            workers,
        } => {
            if extract_images {
                settings.ingest.extract_images = true;
            }
            settings.workers.ocr = workers;
            cmd_ingest(settings, &input).await
        }
        Commands::Narrate {
            input,
            language,
            audience,
            workers,
        } => {
            if let Some(language) = language {
                settings.narration.language = language;
            }
            settings.workers.ocr = workers;
            let audience = parse_audience(&audience)?;
            cmd_narrate(settings, &input, audience).await
        }
        Commands::Tools => cmd_tools(),
    }
}

fn default_output(input: &std::path::Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    PathBuf::from(format!("{}.mp4", stem))
}

async fn cmd_generate(settings: Settings, opts: RunOptions) -> anyhow::Result<()> {
    let cancel = CancelFlag::new();
    let pipeline = Pipeline::with_default_engines(settings, &cancel);

    let (events_tx, events_rx) = mpsc::channel(256);
    let renderer = tokio::spawn(progress::drive(events_rx));

    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, stopping in-flight work...");
            cancel_signal.cancel();
        }
    });

    let result = pipeline.run(&opts, &events_tx, &cancel).await;
    drop(events_tx);
    let _ = renderer.await;
    let report = result?;

    match report.status {
        PipelineStatus::Failed => {
            for failure in &report.failures {
                println!(
                    "  {} [{}] {}: {}",
                    style("✗").red(),
                    failure.stage,
                    failure.unit,
                    failure.error
                );
            }
            anyhow::bail!("video generation failed");
        }
        PipelineStatus::Partial => {
            println!(
                "{} Video generated with {} skipped units:",
                style("!").yellow(),
                report.failures.len()
            );
            for failure in &report.failures {
                println!(
                    "  {} [{}] {}: {}",
                    style("!").yellow(),
                    failure.stage,
                    failure.unit,
                    failure.error
                );
            }
        }
        PipelineStatus::Complete => {}
    }

    if let Some(video) = report.video {
        println!(
            "{} Video: {} ({:.1}s, {}x{}, {})",
            style("✓").green(),
            video.video_path.display(),
            video.metadata.duration,
            video.metadata.width,
            video.metadata.height,
            format_size(video.metadata.file_size)
        );
        println!(
            "{} Thumbnail: {}",
            style("✓").green(),
            video.thumbnail_path.display()
        );
    }
    Ok(())
}

async fn cmd_ingest(settings: Settings, input: &std::path::Path) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::channel(256);
    let drainer = tokio::spawn(progress::drain(events_rx));
    let cancel = CancelFlag::new();

    let workdir = Workdir::create(&settings.workdir_base(), &uuid::Uuid::new_v4().to_string())?;
    let ingestor = DocumentIngestor::new(
        Arc::new(TesseractOcr::new(settings.ingest.dpi).with_cancel(cancel.clone())),
        settings.ingest.clone(),
        settings.retry.clone(),
    );
    let outcome = ingestor
        .ingest(input, &workdir, settings.workers.ocr, &events_tx, &cancel)
        .await?;
    drop(events_tx);
    let _ = drainer.await;

    for (page, error) in &outcome.failures {
        eprintln!("{} page {} failed: {}", style("!").yellow(), page, error);
    }

    let analysis = ContentAnalyzer::new(settings.analysis.clone()).analyze(&outcome.pages);
    let document = Document {
        metadata: outcome.metadata,
        pages: outcome.pages,
        summary: analysis.summary,
        key_topics: analysis.key_topics,
        estimated_duration: analysis.estimated_duration,
        complexity: analysis.complexity,
    };
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

async fn cmd_narrate(
    settings: Settings,
    input: &std::path::Path,
    audience: Audience,
) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::channel(256);
    let drainer = tokio::spawn(progress::drain(events_rx));
    let cancel = CancelFlag::new();

    let workdir = Workdir::create(&settings.workdir_base(), &uuid::Uuid::new_v4().to_string())?;
    let ingestor = DocumentIngestor::new(
        Arc::new(TesseractOcr::new(settings.ingest.dpi).with_cancel(cancel.clone())),
        settings.ingest.clone(),
        settings.retry.clone(),
    );
    let outcome = ingestor
        .ingest(input, &workdir, settings.workers.ocr, &events_tx, &cancel)
        .await?;
    drop(events_tx);
    let _ = drainer.await;

    let synthesizer = NarrationSynthesizer::new(
        Arc::new(EspeakTts::new().with_cancel(cancel.clone())),
        NarrateOptions {
            language: settings.narration.language.clone(),
            audience,
            max_words_per_segment: settings.narration.max_words_per_segment,
            enable_pauses: settings.narration.enable_pauses,
            volume: settings.narration.volume,
            words_per_minute: settings.analysis.words_per_minute,
        },
        settings.retry.clone(),
    );
    let segments = synthesizer.build_segments(&outcome.pages)?;
    println!("{}", serde_json::to_string_pretty(&segments)?);
    Ok(())
}

fn cmd_tools() -> anyhow::Result<()> {
    let mut missing = 0;
    for (tool, found) in engines::check_tools() {
        if found {
            println!("  {} {}", style("✓").green(), tool);
        } else {
            println!("  {} {} (not found in PATH)", style("✗").red(), tool);
            missing += 1;
        }
    }
    if missing > 0 {
        anyhow::bail!("{} required tools are missing", missing);
    }
    println!("{} All external tools available", style("✓").green());
    Ok(())
}
