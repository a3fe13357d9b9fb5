use crate::error::*;
use crate::image::Image;
use crate::math::is_degenerate_quad;
use crate::my_types::*;

/// Twice the area of a triangle below which three points count as collinear.
const COLLINEAR_EPS: f64 = 1e-6;

/// 3x3 projective transform normalized so that the bottom-right entry is 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub matrix: Matrix3d,
}

impl Homography {
    /// Maps a point, or returns None if it is sent to infinity.
    pub fn apply(&self, p: &Vector2d) -> Option<Vector2d> {
        let q = self.matrix * Vector3d::new(p.x, p.y, 1.);
        if q.z.abs() < f64::EPSILON {
            return None;
        }
        Some(Vector2d::new(q.x / q.z, q.y / q.z))
    }

    pub fn inverse(&self) -> TrackingResult<Homography> {
        let inv = self
            .matrix
            .try_inverse()
            .ok_or_else(|| TrackingError::DegenerateGeometry("projective mapping is not invertible".into()))?;
        if inv[(2, 2)].abs() < f64::EPSILON {
            return Ok(Homography { matrix: inv });
        }
        Ok(Homography {
            matrix: inv / inv[(2, 2)],
        })
    }
}

/// Solves the projective transform that sends each source corner to the
/// matching target corner.
///
/// Each correspondence (x, y) -> (u, v) gives two rows of the 8x8 system
///   u = (h0 x + h1 y + h2) / (h6 x + h7 y + 1)
///   v = (h3 x + h4 y + h5) / (h6 x + h7 y + 1)
pub fn solve_projective_mapping(source: &[Vector2d], target: &[Vector2d]) -> TrackingResult<Homography> {
    let source = as_quad(source, "source")?;
    let target = as_quad(target, "target")?;

    let mut a = Matrix8d::zeros();
    let mut b = Vector8d::zeros();
    for i in 0..4 {
        let (x, y) = (source[i].x, source[i].y);
        let (u, v) = (target[i].x, target[i].y);
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.;
        a[(r, 6)] = -x * u;
        a[(r, 7)] = -y * u;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.;
        a[(r + 1, 6)] = -x * v;
        a[(r + 1, 7)] = -y * v;
        b[r + 1] = v;
    }

    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| TrackingError::DegenerateGeometry("singular correspondence system".into()))?;
    if h.iter().any(|x| !x.is_finite()) {
        return Err(TrackingError::DegenerateGeometry("non-finite projective mapping".into()));
    }
    Ok(Homography {
        matrix: Matrix3d::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.),
    })
}

fn as_quad(points: &[Vector2d], name: &str) -> TrackingResult<[Vector2d; 4]> {
    let quad: [Vector2d; 4] = points.try_into().map_err(|_| {
        TrackingError::DegenerateGeometry(format!("{} needs exactly 4 points, got {}", name, points.len()))
    })?;
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(TrackingError::DegenerateGeometry(format!("{} has non-finite points", name)));
    }
    if is_degenerate_quad(&quad, COLLINEAR_EPS) {
        return Err(TrackingError::DegenerateGeometry(format!(
            "{} has collinear or coincident points",
            name
        )));
    }
    Ok(quad)
}

pub fn transform_points(points: &[Vector2d], mapping: &Homography) -> TrackingResult<Vec<Vector2d>> {
    points
        .iter()
        .map(|p| {
            mapping.apply(p).ok_or_else(|| {
                TrackingError::DegenerateGeometry(format!("point ({}, {}) maps to infinity", p.x, p.y))
            })
        })
        .collect()
}

/// Rectifies `frame` into a `width` x `height` image. Every output pixel is
/// mapped back into the source and sampled bilinearly; pixels falling outside
/// the source are zero.
pub fn warp_frame(frame: &Image, mapping: &Homography, width: usize, height: usize) -> TrackingResult<Image> {
    let inverse = mapping.inverse()?;
    let channels = frame.channels;
    let mut out = Image::new(width, height, channels);
    let mut pixel = vec![0_u8; channels];
    for y in 0..height {
        for x in 0..width {
            let Some(p) = inverse.apply(&Vector2d::new(x as f64, y as f64)) else {
                continue;
            };
            if frame.bilinear(p, &mut pixel) {
                out.set_pixel(x, y, &pixel);
            }
        }
    }
    Ok(out)
}

/// Pixels per meter from a rectangle of known size that fits
/// `region_area_fraction` times across the frame width.
pub fn calibrate_pixels_per_meter(
    frame_width: f64,
    region_area_fraction: f64,
    real_width: f64,
    real_height: f64,
) -> TrackingResult<f64> {
    for (name, value) in [
        ("frame width", frame_width),
        ("region area fraction", region_area_fraction),
        ("real width", real_width),
        ("real height", real_height),
    ] {
        if !(value.is_finite() && value > 0.) {
            return Err(TrackingError::InvalidCalibration(format!("{} must be positive, got {}", name, value)));
        }
    }
    let aspect_ratio = real_width / real_height;
    let calibrated_pixel_height = frame_width / (region_area_fraction * aspect_ratio);
    Ok(calibrated_pixel_height / real_height)
}

/// Projective calibration between a road quadrilateral in the raw frame and
/// a canonical rectangle.
#[derive(Clone, Debug)]
pub struct GeometricCalibrator {
    pub source_quad: [Vector2d; 4],
    pub target_quad: [Vector2d; 4],
    pub calibration_region: Option<[Vector2d; 4]>,
    output_size: (usize, usize),
}

impl GeometricCalibrator {
    /// Maps `source_quad` onto the corners of a `width` x `height` canvas.
    pub fn for_frame(source_quad: [Vector2d; 4], width: usize, height: usize) -> Self {
        let (w, h) = ((width as f64 - 1.).max(0.), (height as f64 - 1.).max(0.));
        Self {
            source_quad,
            target_quad: [
                Vector2d::new(0., 0.),
                Vector2d::new(w, 0.),
                Vector2d::new(w, h),
                Vector2d::new(0., h),
            ],
            calibration_region: None,
            output_size: (width, height),
        }
    }

    pub fn with_target(mut self, target_quad: [Vector2d; 4]) -> Self {
        self.target_quad = target_quad;
        self
    }

    pub fn with_calibration_region(mut self, region: [Vector2d; 4]) -> Self {
        self.calibration_region = Some(region);
        self
    }

    pub fn mapping(&self) -> TrackingResult<Homography> {
        solve_projective_mapping(&self.source_quad, &self.target_quad)
    }

    /// Top-down view of a raw frame.
    pub fn rectify(&self, frame: &Image) -> TrackingResult<Image> {
        let mapping = self.mapping()?;
        warp_frame(frame, &mapping, self.output_size.0, self.output_size.1)
    }

    /// Calibration region in rectified coordinates, if one is set.
    pub fn transform_calibration_region(&self) -> TrackingResult<Option<Vec<Vector2d>>> {
        let Some(region) = &self.calibration_region else {
            return Ok(None);
        };
        let mapping = self.mapping()?;
        transform_points(region, &mapping).map(Some)
    }
}
