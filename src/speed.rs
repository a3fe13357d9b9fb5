use crate::error::*;
use crate::shape::BoundingBox;

const MPS_TO_KMH: f64 = 3.6;

/// Completed traversal of the speed corridor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedMeasurement {
    /// Counting id of the object, 0 if it never crossed the counting line.
    pub object_id: u32,
    pub speed_kmh: f64,
    /// Box at the frame the measurement completed, used for the crop.
    pub bounding_box: BoundingBox,
    pub frame_index: u64,
}

/// Returns `(start_x, finish_x)` for an object's direction of travel.
///
/// Objects moving toward decreasing x enter at the start line and leave at
/// the end line; objects moving the other way traverse the corridor in
/// reverse.
pub fn corridor_bounds(moving_toward_decreasing_x: bool, start_x: i32, end_x: i32) -> (i32, i32) {
    if moving_toward_decreasing_x {
        (start_x, end_x)
    } else {
        (end_x, start_x)
    }
}

/// Speed in km/h from two edge positions and the frames they were seen at.
pub fn compute_speed_kmh(
    start_edge_x: i32,
    end_edge_x: i32,
    start_frame: u64,
    end_frame: u64,
    fps: f64,
    pixels_per_meter: f64,
) -> TrackingResult<f64> {
    if end_frame <= start_frame {
        return Err(TrackingError::DegenerateSpeedMeasurement { frame: end_frame });
    }
    let meters = (end_edge_x - start_edge_x).abs() as f64 / pixels_per_meter;
    let seconds = (end_frame - start_frame) as f64 / fps;
    Ok(meters / seconds * MPS_TO_KMH)
}
