use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use rerun::RecordingStreamBuilder;
use std::path::PathBuf;

use indicatif::ProgressStyle;
use tracing::{info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use traffic_monitor::calibration::GeometricCalibrator;
use traffic_monitor::config::*;
use traffic_monitor::detector::Detector;
use traffic_monitor::orchestrator::FrameOrchestrator;
use traffic_monitor::storage::MeasurementStore;
use traffic_monitor::tracker::TrackingEngine;
use traffic_monitor::video::VideoInput;

#[derive(Parser)]
pub struct Args {
    /// Traffic video to process.
    #[clap(short, long)]
    pub input: PathBuf,
    /// JSON scene geometry. Defaults are derived from the frame size.
    #[clap(long)]
    pub scene: Option<PathBuf>,
    /// Directory for the speed log and vehicle crops.
    #[clap(long, default_value = "./data/tracked_cars")]
    pub output_dir: PathBuf,
    /// Write an annotated rerun recording to this file.
    #[clap(long)]
    pub record: Option<PathBuf>,
    #[clap(flatten)]
    pub config: Config,
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();

    // setup logging
    let level = if args.config.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(indicatif_layer.get_stdout_writer())
                .with_filter(level),
        )
        .with(indicatif_layer)
        .init();

    // open video
    let mut video = VideoInput::new(&args.input)?;
    let fps = args.config.fps.unwrap_or(video.fps);

    let scene = match &args.scene {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    let tracker_config = scene
        .tracker_config(video.width, video.height, fps)
        .context("Invalid scene configuration.")?;
    info!(
        fps,
        pixels_per_meter = tracker_config.pixels_per_meter,
        line = tracker_config.crossing_line.position,
        "tracker configured"
    );

    // create orchestrator
    let detector = Detector::new(args.config.detection)?;
    let engine = TrackingEngine::new(tracker_config)?;
    let store = MeasurementStore::new(&args.output_dir)?;
    let mut orchestrator = FrameOrchestrator::new(detector, engine).with_store(store);

    if let Some(quad) = &scene.source_quad {
        let mut calibrator = GeometricCalibrator::for_frame(to_quad(quad), video.width as usize, video.height as usize);
        if let Some(region) = &scene.calibration_region {
            calibrator = calibrator.with_calibration_region(to_quad(region));
        }
        match calibrator.transform_calibration_region() {
            Ok(Some(points)) => info!("rectified calibration region: {:?}", points),
            Ok(None) => {}
            Err(err) => warn!("calibration region cannot be rectified: {}", err),
        }
        orchestrator = orchestrator.with_calibrator(calibrator);
    }

    if let Some(path) = &args.record {
        let recorder = RecordingStreamBuilder::new("traffic-monitor")
            .save(path)
            .with_context(|| format!("Failed to create recording {}", path.display()))?;
        orchestrator = orchestrator.with_recorder(recorder);
    }

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    let length = match args.config.max_frames {
        Some(max) if video.frame_count > 0 => max.min(video.frame_count),
        Some(max) => max,
        None => video.frame_count,
    };
    header_span.pb_set_length(length);
    let header_span_enter = header_span.enter();

    let summary = orchestrator.run(&mut video, args.config.max_frames)?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    info!(
        "processed {} frames, counted {} vehicles, measured {} speeds",
        summary.frames, summary.car_count, summary.measurements
    );
    Ok(())
}
