use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as AnyhowContext, Result};
use log::debug;
use opencv::core::{self, Mat, Rect};
use opencv::imgcodecs;
use opencv::prelude::*;

use crate::shape::BoundingBox;
use crate::speed::SpeedMeasurement;

const LOG_FILE_NAME: &str = "speeds.txt";

const SIGNIFICANT_DIGITS: usize = 6;

/// `"<id> <speed>"`, with the speed printed like a default C++ stream: six
/// significant digits, no trailing zeros, exponent form for very large or
/// small values.
pub fn format_speed_line(object_id: u32, speed_kmh: f64) -> String {
    format!("{} {}", object_id, format_significant(speed_kmh, SIGNIFICANT_DIGITS))
}

/// `%g` formatting with `digits` significant digits.
fn format_significant(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string().to_lowercase();
    }
    if value == 0. {
        return "0".to_string();
    }
    let digits = digits.max(1);
    // Exponent after rounding to the requested precision.
    let scientific = format!("{:.*e}", digits - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent >= -4 && exponent < digits as i32 {
        let decimals = (digits as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Append-only text log with one line per speed measurement.
pub struct SpeedLog {
    path: PathBuf,
}

impl SpeedLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, measurement: &SpeedMeasurement) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open speed log {}", self.path.display()))?;
        writeln!(file, "{}", format_speed_line(measurement.object_id, measurement.speed_kmh))?;
        Ok(())
    }
}

/// Saves the part of `frame` under `bounding_box` as `<dir>/<id>.jpg`.
pub fn write_crop(frame: &Mat, bounding_box: &BoundingBox, object_id: u32, dir: &Path) -> Result<PathBuf> {
    let clamped = bounding_box
        .clamped(frame.cols(), frame.rows())
        .ok_or(anyhow!("crop of object {} lies outside the frame", object_id))?;
    let rect = Rect::new(clamped.x, clamped.y, clamped.width, clamped.height);
    let crop = Mat::roi(frame, rect)?.try_clone()?;

    let path = dir.join(format!("{}.jpg", object_id));
    let path_str = path.to_str().ok_or(anyhow!("Failed to parse crop path."))?;
    if !imgcodecs::imwrite(path_str, &crop, &core::Vector::new())? {
        return Err(anyhow!("Failed to write crop {}", path_str));
    }
    Ok(path)
}

/// Output directory holding the speed log and one crop per measured object.
pub struct MeasurementStore {
    dir: PathBuf,
    log: SpeedLog,
}

impl MeasurementStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log: SpeedLog::new(dir.join(LOG_FILE_NAME)),
        })
    }

    pub fn log(&self) -> &SpeedLog {
        &self.log
    }

    pub fn persist(&self, measurement: &SpeedMeasurement, frame: &Mat) -> Result<()> {
        let crop = write_crop(frame, &measurement.bounding_box, measurement.object_id, &self.dir)?;
        self.log.append(measurement)?;
        debug!("saved {} for object {}", crop.display(), measurement.object_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("traffic-monitor-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn measurement(object_id: u32, speed_kmh: f64, bounding_box: BoundingBox) -> SpeedMeasurement {
        SpeedMeasurement {
            object_id,
            speed_kmh,
            bounding_box,
            frame_index: 10,
        }
    }

    #[test]
    fn test_format_speed_line() {
        assert_eq!(format_speed_line(3, 60.), "3 60");
        assert_eq!(format_speed_line(1, 16.74), "1 16.74");
        assert_eq!(format_speed_line(1, 123.456789), "1 123.457");
        assert_eq!(format_speed_line(1, 9.876543), "1 9.87654");
        assert_eq!(format_speed_line(0, 12.345678), "0 12.3457");
        assert_eq!(format_speed_line(7, 0.), "7 0");
    }

    #[test]
    fn test_format_significant_edges() {
        assert_eq!(format_significant(0.0001234, 6), "0.0001234");
        assert_eq!(format_significant(0.00001234, 6), "1.234e-05");
        assert_eq!(format_significant(1234567., 6), "1.23457e+06");
        assert_eq!(format_significant(999999.7, 6), "1e+06");
        assert_eq!(format_significant(100000., 6), "100000");
        assert_eq!(format_significant(-2.5, 6), "-2.5");
    }

    #[test]
    fn test_speed_log_appends() {
        let dir = scratch_dir("log");
        fs::create_dir_all(&dir).unwrap();
        let log = SpeedLog::new(dir.join("speeds.txt"));
        let b = BoundingBox::new(0, 0, 10, 10);
        log.append(&measurement(1, 16.74, b)).unwrap();
        log.append(&measurement(2, 60., b)).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text, "1 16.74\n2 60\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_store_persists_crop_and_line() {
        let dir = scratch_dir("store");
        let store = MeasurementStore::new(&dir).unwrap();
        let frame = Mat::new_rows_cols_with_default(100, 120, core::CV_8UC3, core::Scalar::all(80.)).unwrap();

        // Partially outside the frame, gets clamped.
        store
            .persist(&measurement(4, 42.5, BoundingBox::new(100, 80, 40, 40)), &frame)
            .unwrap();
        assert!(dir.join("4.jpg").exists());
        let written = imgcodecs::imread(dir.join("4.jpg").to_str().unwrap(), imgcodecs::IMREAD_COLOR).unwrap();
        assert_eq!((written.cols(), written.rows()), (20, 20));
        assert_eq!(fs::read_to_string(store.log().path()).unwrap(), "4 42.5\n");

        assert!(store
            .persist(&measurement(5, 10., BoundingBox::new(500, 500, 10, 10)), &frame)
            .is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
