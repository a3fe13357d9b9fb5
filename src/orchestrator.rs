use anyhow::Result;
use opencv::core::Mat;
use rerun::RecordingStream;

use tracing::Span;
use tracing::{debug, info, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::calibration::GeometricCalibrator;
use crate::detector::CandidateDetector;
use crate::storage::MeasurementStore;
use crate::tracker::{FrameReport, TrackingEngine};
use crate::video::FrameSource;
use crate::visualization::*;

/// Totals of a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub car_count: u32,
    pub measurements: usize,
}

/// Drives detection, tracking, persistence and rendering frame by frame.
pub struct FrameOrchestrator<D: CandidateDetector> {
    detector: D,
    engine: TrackingEngine,
    calibrator: Option<GeometricCalibrator>,
    store: Option<MeasurementStore>,
    recorder: Option<RecordingStream>,
    // Index of the next frame read. 0 before the first frame.
    frame_number: u64,
    measurements: usize,
}

impl<D: CandidateDetector> FrameOrchestrator<D> {
    pub fn new(detector: D, engine: TrackingEngine) -> Self {
        Self {
            detector,
            engine,
            calibrator: None,
            store: None,
            recorder: None,
            frame_number: 0,
            measurements: 0,
        }
    }

    pub fn with_calibrator(mut self, calibrator: GeometricCalibrator) -> Self {
        self.calibrator = Some(calibrator);
        self
    }

    pub fn with_store(mut self, store: MeasurementStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_recorder(mut self, recorder: RecordingStream) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn engine(&self) -> &TrackingEngine {
        &self.engine
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frame_number,
            car_count: self.engine.car_count(),
            measurements: self.measurements,
        }
    }

    /// Processes one raw frame. Returns None while the detector warms up.
    pub fn process_frame(&mut self, frame: &Mat) -> Result<Option<FrameReport>> {
        let frame_index = self.frame_number;
        self.frame_number += 1;

        let Some(candidates) = self.detector.detect(frame)? else {
            debug!(frame_index, "detector warming up");
            return Ok(None);
        };
        let report = self.engine.process_frame(frame_index, candidates);

        for measurement in report.measurements.iter() {
            info!(
                id = measurement.object_id,
                speed_kmh = measurement.speed_kmh,
                "speed measured"
            );
            self.measurements += 1;
            if let Some(store) = &self.store {
                if let Err(err) = store.persist(measurement, frame) {
                    warn!("failed to persist measurement of object {}: {:#}", measurement.object_id, err);
                }
            }
        }

        self.record(frame, &report)?;

        let purged = self.engine.purge_evicted();
        if purged > 0 {
            debug!(purged, "dropped evicted objects");
        }
        Ok(Some(report))
    }

    fn record(&self, frame: &Mat, report: &FrameReport) -> Result<()> {
        let Some(recorder) = &self.recorder else {
            return Ok(());
        };
        recorder.set_time_sequence("frame", report.frame_index as i64);

        let region = self.calibrator.as_ref().and_then(|c| c.calibration_region.as_ref());
        let annotations = Annotations {
            objects: self.engine.objects(),
            crossing_line: self.engine.config().crossing_line,
            crossed: report.crossed,
            car_count: report.car_count,
            calibration_region: region,
        };
        let tracking_image = visualize_tracking(frame, &annotations)?;
        recorder.log("video/tracking", &rerun::Image::try_from(tracking_image)?)?;

        if let Some(calibrator) = &self.calibrator {
            match calibrator.rectify(&image_from_mat(frame)?) {
                Ok(rectified) => {
                    recorder.log("video/rectified", &rerun::Image::try_from(image_to_array(&rectified)?)?)?;
                }
                Err(err) => warn!("skipping rectified view: {}", err),
            }
        }
        Ok(())
    }

    /// Reads frames until the source is exhausted or `max_frames` is reached.
    pub fn run(&mut self, source: &mut dyn FrameSource, max_frames: Option<u64>) -> Result<RunSummary> {
        while max_frames.map_or(true, |max| self.frame_number < max) {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            Span::current().pb_inc(1);
            self.process_frame(&frame)?;
        }
        let summary = self.summary();
        info!(
            frames = summary.frames,
            cars = summary.car_count,
            measurements = summary.measurements,
            "run finished"
        );
        Ok(summary)
    }
}
