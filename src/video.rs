use std::path::Path;

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use log::{info, warn};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio;

/// Frame rate assumed when the container does not report one.
const FALLBACK_FPS: f64 = 30.;

/// Source of raw BGR frames, in display order.
pub trait FrameSource {
    /// Next frame, or None at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

pub struct VideoInput {
    capture: videoio::VideoCapture,
    pub fps: f64,
    /// Reported frame count, 0 if unknown.
    pub frame_count: u64,
    pub width: i32,
    pub height: i32,
}

impl VideoInput {
    pub fn new(path: &Path) -> Result<VideoInput> {
        let path_str = path.to_str().ok_or(anyhow!("Failed to parse video path."))?;
        let capture = videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open video {}", path_str))?;
        if !capture.is_opened()? {
            bail!("error reading video file {}", path_str);
        }

        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
        if frame_count > 0. && frame_count < 2. {
            bail!("video file must have at least two frames");
        }
        let mut fps = capture.get(videoio::CAP_PROP_FPS)?;
        if !(fps.is_finite() && fps > 0.) {
            warn!("video reports no frame rate, assuming {}", FALLBACK_FPS);
            fps = FALLBACK_FPS;
        }
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
        info!("opened {} ({}x{} @ {} fps, {} frames)", path_str, width, height, fps, frame_count);

        Ok(VideoInput {
            capture,
            fps,
            frame_count: frame_count.max(0.) as u64,
            width,
            height,
        })
    }
}

impl FrameSource for VideoInput {
    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        let ok = self
            .capture
            .read(&mut frame)
            .context("Reading frame from video input failed.")?;
        if !ok || frame.rows() <= 0 {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}
