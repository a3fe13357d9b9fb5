use thiserror::Error;

/// Failures of the tracking and calibration core.
///
/// None of these abort a run: the caller turns them into a no-op for the
/// current frame or object.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("degenerate speed measurement: start and end recorded at frame {frame}")]
    DegenerateSpeedMeasurement { frame: u64 },

    #[error("invalid calibration input: {0}")]
    InvalidCalibration(String),

    #[error("invalid tracker configuration: {0}")]
    InvalidConfig(String),
}

pub type TrackingResult<T> = std::result::Result<T, TrackingError>;
