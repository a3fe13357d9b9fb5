use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};

use crate::calibration::calibrate_pixels_per_meter;
use crate::error::*;
use crate::my_types::*;

/// Run parameters given on the command line.
#[derive(Debug, Clone, clap::Parser)]
pub struct Config {
    /// Frame rate used for speed estimation. Defaults to the rate reported by the video.
    #[clap(long)]
    pub fps: Option<f64>,

    #[clap(long, value_enum, default_value = "frame-difference")]
    pub detection: DetectionMode,

    /// Stop after this many frames.
    #[clap(long)]
    pub max_frames: Option<u64>,

    #[clap(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DetectionMode {
    /// Difference of two consecutive blurred frames.
    FrameDifference,
    /// MOG2 background model.
    BackgroundSubtraction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineAxis {
    /// Line of constant y, crossed by vertical motion.
    Horizontal,
    /// Line of constant x, crossed by horizontal motion.
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingLine {
    pub position: i32,
    pub axis: LineAxis,
}

impl CrossingLine {
    /// Coordinate of `p` compared against the line position.
    pub fn coordinate(&self, p: &Pixel) -> i32 {
        match self.axis {
            LineAxis::Horizontal => p.y,
            LineAxis::Vertical => p.x,
        }
    }
}

/// Options consumed by the tracking engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub fps: f64,
    pub pixels_per_meter: f64,
    pub miss_count_eviction_threshold: usize,
    pub association_distance_factor: f64,
    pub start_corridor_points: [[i32; 2]; 2],
    pub end_corridor_points: [[i32; 2]; 2],
    pub crossing_line: CrossingLine,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::for_frame(640, 480, 30., 15.)
    }
}

impl TrackerConfig {
    /// Corridor and counting line laid out relative to the frame size.
    pub fn for_frame(width: i32, height: i32, fps: f64, pixels_per_meter: f64) -> Self {
        let start_x = (width as f64 * 0.75).round() as i32;
        let end_x = (width as f64 * 0.25).round() as i32;
        Self {
            fps,
            pixels_per_meter,
            miss_count_eviction_threshold: 5,
            association_distance_factor: 0.5,
            start_corridor_points: [[start_x, 0], [start_x, height - 1]],
            end_corridor_points: [[end_x, 0], [end_x, height - 1]],
            crossing_line: CrossingLine {
                position: (height as f64 * 0.35).round() as i32,
                axis: LineAxis::Horizontal,
            },
        }
    }

    pub fn start_x(&self) -> i32 {
        self.start_corridor_points[0][0]
    }

    pub fn end_x(&self) -> i32 {
        self.end_corridor_points[0][0]
    }

    pub fn validate(&self) -> TrackingResult<()> {
        if !(self.fps.is_finite() && self.fps > 0.) {
            return Err(TrackingError::InvalidConfig(format!("fps must be positive, got {}", self.fps)));
        }
        if !(self.pixels_per_meter.is_finite() && self.pixels_per_meter > 0.) {
            return Err(TrackingError::InvalidConfig(format!(
                "pixels per meter must be positive, got {}",
                self.pixels_per_meter
            )));
        }
        if self.miss_count_eviction_threshold == 0 {
            return Err(TrackingError::InvalidConfig("eviction threshold must be at least 1".into()));
        }
        if !(self.association_distance_factor > 0.) {
            return Err(TrackingError::InvalidConfig(format!(
                "association distance factor must be positive, got {}",
                self.association_distance_factor
            )));
        }
        Ok(())
    }
}

/// Scene geometry, usually loaded from a JSON file next to the video.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Road quadrilateral rectified to a top-down view, TL, TR, BR, BL.
    pub source_quad: Option<[[f64; 2]; 4]>,
    /// Quadrilateral of known real-world size, same corner order.
    pub calibration_region: Option<[[f64; 2]; 4]>,
    /// Real size of the calibration region in meters.
    pub real_width: f64,
    pub real_height: f64,
    /// How many times the calibration region fits across the frame width.
    pub region_area_fraction: f64,
    pub start_corridor_points: Option<[[i32; 2]; 2]>,
    pub end_corridor_points: Option<[[i32; 2]; 2]>,
    pub crossing_line: Option<CrossingLine>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            source_quad: None,
            calibration_region: None,
            real_width: 9.8425,
            real_height: 8.2169,
            region_area_fraction: 4.,
            start_corridor_points: None,
            end_corridor_points: None,
            crossing_line: None,
        }
    }
}

impl SceneConfig {
    pub fn load(path: &Path) -> Result<SceneConfig> {
        let file = File::open(path).with_context(|| format!("Failed to open scene file {}", path.display()))?;
        let scene = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse scene file {}", path.display()))?;
        Ok(scene)
    }

    /// Engine options for a video of the given size and frame rate.
    pub fn tracker_config(&self, width: i32, height: i32, fps: f64) -> TrackingResult<TrackerConfig> {
        let pixels_per_meter = calibrate_pixels_per_meter(
            width as f64,
            self.region_area_fraction,
            self.real_width,
            self.real_height,
        )?;
        let mut config = TrackerConfig::for_frame(width, height, fps, pixels_per_meter);
        if let Some(points) = self.start_corridor_points {
            config.start_corridor_points = points;
        }
        if let Some(points) = self.end_corridor_points {
            config.end_corridor_points = points;
        }
        if let Some(line) = self.crossing_line {
            config.crossing_line = line;
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn to_quad(points: &[[f64; 2]; 4]) -> [Vector2d; 4] {
    points.map(|[x, y]| Vector2d::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = TrackerConfig::default();
        assert_eq!(config.crossing_line.position, 168);
        assert_eq!(config.crossing_line.axis, LineAxis::Horizontal);
        assert_eq!(config.start_x(), 480);
        assert_eq!(config.end_x(), 160);
        assert_eq!(config.miss_count_eviction_threshold, 5);
        assert_eq!(config.association_distance_factor, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut config = TrackerConfig::default();
        config.fps = 0.;
        assert!(matches!(config.validate(), Err(TrackingError::InvalidConfig(_))));

        let mut config = TrackerConfig::default();
        config.pixels_per_meter = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scene_from_json() {
        let json = r#"{
            "source_quad": [[571, 16], [803, 23], [1266, 531], [1, 667]],
            "crossing_line": { "position": 300, "axis": "vertical" }
        }"#;
        let scene: SceneConfig = serde_json::from_str(json).unwrap();
        assert_eq!(scene.real_width, 9.8425);
        assert_eq!(scene.source_quad.unwrap()[2], [1266., 531.]);

        let config = scene.tracker_config(640, 480, 25.).unwrap();
        assert_eq!(config.crossing_line, CrossingLine { position: 300, axis: LineAxis::Vertical });
        assert_eq!(config.fps, 25.);
        assert_eq!(config.start_x(), 480);
        let expected = calibrate_pixels_per_meter(640., 4., 9.8425, 8.2169).unwrap();
        assert_eq!(config.pixels_per_meter, expected);
    }

    #[test]
    fn test_crossing_line_coordinate() {
        let p = Pixel::new(7, 11);
        let horizontal = CrossingLine { position: 0, axis: LineAxis::Horizontal };
        let vertical = CrossingLine { position: 0, axis: LineAxis::Vertical };
        assert_eq!(horizontal.coordinate(&p), 11);
        assert_eq!(vertical.coordinate(&p), 7);
    }
}
