//! headcount - count people in an image or a video
//!
//! Runs the configured detector over the input, writes an annotated copy
//! (boxes plus a "Total no. of people" label) and reports the people count.
//! For videos the count is the peak over all frames.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;

use headcount::config::{BackendKind, CounterConfig};
use headcount::ingest::{ImageFileSink, ImageFileSource, VideoFileSink, VideoFileSource};
use headcount::{
    build_detector, Annotator, CancelToken, Completion, FrameSource, MediaKind, MediaPipeline,
    MediaResult, ModelFamily,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image or video to analyse (stub://name?frames=N for a synthetic clip).
    #[arg(short, long)]
    input: String,
    /// Annotated output path (default: <output dir>/result.jpg or result.mp4).
    #[arg(short, long)]
    output: Option<String>,
    /// Config file (JSON, or TOML when the extension is .toml).
    #[arg(long, env = "HEADCOUNT_CONFIG")]
    config: Option<PathBuf>,
    /// Detector family: single-shot (SSD) or grid-anchor (YOLO).
    #[arg(long)]
    family: Option<ModelFamily>,
    /// ONNX model file; selects the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Person confidence threshold (default depends on the family).
    #[arg(long)]
    confidence: Option<f32>,
    /// TrueType font for the "Total no. of people : N" label (without one,
    /// only the number is drawn).
    #[arg(long)]
    font: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    /// Print a JSON report instead of plain text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    file_type: MediaKind,
    people_count: usize,
    frames_processed: u64,
    mean_count: f64,
    completion: Completion,
    output: &'a str,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, args.json);

    let mut config = CounterConfig::load_from(args.config.as_deref())?;
    if let Some(family) = args.family {
        config.detector.family = family;
    }
    if let Some(model) = args.model {
        config.detector.model_path = Some(model);
        config.detector.backend = Some(BackendKind::Tract);
    }
    if args.confidence.is_some() {
        config.detector.confidence_threshold = args.confidence;
    }
    if args.font.is_some() {
        config.font_path = args.font;
    }
    config.validate_for_input(&args.input)?;

    let kind = MediaKind::from_path(&args.input)
        .ok_or_else(|| anyhow!("unsupported file type: {}", args.input))?;
    let output = args.output.unwrap_or_else(|| {
        config
            .output_dir
            .join(kind.default_output())
            .display()
            .to_string()
    });

    let backend_kind = config
        .detector
        .backend
        .ok_or_else(|| anyhow!("no detector model configured"))?;
    log::info!(
        "{} detector ({:?} backend), confidence > {}",
        config.detector.family,
        backend_kind,
        config.detector.effective_confidence()
    );

    let annotator = match &config.font_path {
        Some(path) => Annotator::from_font_path(path)?,
        None => {
            log::info!("no label font configured; annotated frames show the count only");
            Annotator::new()
        }
    };
    let backend = config.detector.build_backend()?;
    let detector = build_detector(config.detector.family, backend, config.detector.settings());
    let mut pipeline = MediaPipeline::new(detector, annotator);
    {
        let _stage = ui.stage("Load detector");
        pipeline.load()?;
    }

    let result = match kind {
        MediaKind::Image => count_image(&mut pipeline, &ui, &args.input, &output)?,
        MediaKind::Video => count_video(&mut pipeline, &ui, &args.input, &output)?,
    };

    let report = Report {
        file_type: kind,
        people_count: result.aggregate_count(),
        frames_processed: result.frames_processed(),
        mean_count: result.mean_count(),
        completion: result.completion(),
        output: &output,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Total no. of people : {}", report.people_count);
        if let Completion::Cancelled { frames_processed } = report.completion {
            println!("(cancelled after {} frame(s))", frames_processed);
        }
        println!("annotated output written to {}", output);
    }
    Ok(())
}

fn count_image(
    pipeline: &mut MediaPipeline,
    ui: &ui::Ui,
    input: &str,
    output: &str,
) -> Result<MediaResult> {
    let _stage = ui.stage("Count people in image");
    let mut source = ImageFileSource::open(input)?;
    let mut sink = ImageFileSink::create(output)?;
    Ok(pipeline.process_image_source(&mut source, &mut sink)?)
}

fn count_video(
    pipeline: &mut MediaPipeline,
    ui: &ui::Ui,
    input: &str,
    output: &str,
) -> Result<MediaResult> {
    let mut source = VideoFileSource::open(input)?;
    let info = source.info();
    let mut sink = VideoFileSink::create(output, info)?;

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, stopping after the current frame");
        handler.cancel();
    })
    .context("install Ctrl-C handler")?;

    let progress = ui.frames(info.frame_count_hint);
    let result = pipeline.process_video(&mut source, &mut sink, &cancel, |p| progress.update(p));
    progress.finish();
    Ok(result?)
}
