//! demo - end-to-end synthetic run
//!
//! Plays a synthetic clip through the synthetic crowd detector, checks that
//! the reported peak matches the scripted crowd and writes one annotated
//! still for inspection.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::IsTerminal;
use std::path::PathBuf;

use headcount::detect::SyntheticCrowdBackend;
use headcount::ingest::{DiscardSink, ImageFileSink, VideoFileSource};
use headcount::{
    build_detector, Annotator, CancelToken, DetectorSettings, FrameSink, FrameSource,
    MediaPipeline, ModelFamily,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frames in the synthetic clip.
    #[arg(long, default_value_t = 90)]
    frames: u64,
    /// Detector family to simulate.
    #[arg(long, default_value = "grid-anchor")]
    family: ModelFamily,
    /// Most people in any one frame.
    #[arg(long, default_value_t = 6)]
    max_people: usize,
    /// Deterministic seed for the crowd script.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Output directory for the annotated still.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, false);

    let mut rng = StdRng::seed_from_u64(args.seed);
    let counts: Vec<usize> = (0..args.frames)
        .map(|_| rng.gen_range(0..=args.max_people))
        .collect();
    let expected_peak = counts.iter().copied().max().unwrap_or(0);

    let backend = SyntheticCrowdBackend::new(args.family, args.seed).with_counts(counts.clone());
    let detector = build_detector(args.family, Box::new(backend), DetectorSettings::default());
    let mut pipeline = MediaPipeline::new(detector, Annotator::new());

    let clip = format!("stub://demo?frames={}&width=640&height=360", args.frames);
    let mut source = VideoFileSource::open(&clip)?;
    let mut sink = DiscardSink::new();
    let progress = ui.frames(source.info().frame_count_hint);
    let result = {
        let _stage = ui.stage("Count people in synthetic clip");
        pipeline.process_video(&mut source, &mut sink, &CancelToken::new(), |p| {
            progress.update(p)
        })?
    };
    progress.finish();

    let detected: Vec<usize> = result.frame_results().iter().map(|r| r.count()).collect();
    if detected != counts {
        bail!("per-frame counts drifted from the crowd script");
    }
    if result.aggregate_count() != expected_peak {
        bail!(
            "peak {} does not match scripted peak {}",
            result.aggregate_count(),
            expected_peak
        );
    }

    let busiest = detected
        .iter()
        .enumerate()
        .max_by_key(|&(index, &count)| (count, std::cmp::Reverse(index)))
        .map(|(index, _)| index)
        .unwrap_or(0);
    let still_path = PathBuf::from(&args.out).join("busiest_frame.png");
    {
        let _stage = ui.stage("Annotate busiest frame");
        let backend = SyntheticCrowdBackend::new(args.family, args.seed)
            .with_counts(vec![counts[busiest]]);
        let detector = build_detector(args.family, Box::new(backend), DetectorSettings::default());
        let mut still = MediaPipeline::new(detector, Annotator::new());
        let frame = VideoFileSource::open("stub://still?frames=1&width=640&height=360")?
            .next_frame()?
            .ok_or_else(|| anyhow!("synthetic still produced no frame"))?;
        let (annotated, _) = still.process_image(frame)?;
        let mut sink = ImageFileSink::create(&still_path)?;
        sink.write_frame(&annotated)?;
        sink.finish()?;
    }

    println!("frames processed:   {}", result.frames_processed());
    println!("frames written:     {}", sink.written());
    println!("peak people:        {}", result.aggregate_count());
    println!("mean people/frame:  {:.2}", result.mean_count());
    println!("busiest frame:      {} ({} people)", busiest, counts[busiest]);
    println!("annotated still:    {}", still_path.display());
    Ok(())
}
