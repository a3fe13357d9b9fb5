use anyhow::Result;
use opencv::core::{self, Mat, Point, Ptr, Size};
use opencv::imgproc;
use opencv::video::BackgroundSubtractorMOG2;
use opencv::prelude::*;

use crate::config::DetectionMode;
use crate::my_types::*;
use crate::shape::{CandidateShape, ShapeFilter};

const DIFFERENCE_THRESHOLD: f64 = 30.;
const FOREGROUND_THRESHOLD: f64 = 160.;

/// Produces candidate shapes for one frame.
pub trait CandidateDetector {
    /// Filtered candidates, or None while the detector is still warming up
    /// (the frame difference needs a previous frame).
    fn detect(&mut self, frame: &Mat) -> Result<Option<Vec<CandidateShape>>>;
}

enum Segmenter {
    FrameDifference { previous: Option<Mat> },
    BackgroundSubtraction { model: Ptr<dyn BackgroundSubtractorMOG2> },
}

/// Motion segmentation followed by contour and convex hull extraction.
pub struct Detector {
    segmenter: Segmenter,
    filter: ShapeFilter,
}

impl Detector {
    pub fn new(mode: DetectionMode) -> Result<Self> {
        let (segmenter, filter) = match mode {
            DetectionMode::FrameDifference => (
                Segmenter::FrameDifference { previous: None },
                ShapeFilter::frame_difference(),
            ),
            DetectionMode::BackgroundSubtraction => (
                Segmenter::BackgroundSubtraction {
                    model: background_model()?,
                },
                ShapeFilter::background_subtraction(),
            ),
        };
        Ok(Self { segmenter, filter })
    }

    /// Binary motion mask of `frame`.
    pub fn segment(&mut self, frame: &Mat) -> Result<Option<Mat>> {
        match &mut self.segmenter {
            Segmenter::FrameDifference { previous } => {
                let current = blurred_gray(frame)?;
                let Some(last) = previous.replace(current.try_clone()?) else {
                    return Ok(None);
                };
                let mut difference = Mat::default();
                core::absdiff(&last, &current, &mut difference)?;
                let mut mask = Mat::default();
                imgproc::threshold(&difference, &mut mask, DIFFERENCE_THRESHOLD, 255., imgproc::THRESH_BINARY)?;

                let kernel = rect_kernel(5, 5)?;
                for _ in 0..2 {
                    mask = morph(imgproc::MORPH_DILATE, &mask, &kernel)?;
                    mask = morph(imgproc::MORPH_DILATE, &mask, &kernel)?;
                    mask = morph(imgproc::MORPH_ERODE, &mask, &kernel)?;
                }
                Ok(Some(mask))
            }
            Segmenter::BackgroundSubtraction { model } => {
                let mut foreground = Mat::default();
                model.apply(frame, &mut foreground, -1.)?;
                let mut mask = Mat::default();
                imgproc::threshold(&foreground, &mut mask, FOREGROUND_THRESHOLD, 255., imgproc::THRESH_BINARY)?;
                mask = morph(imgproc::MORPH_ERODE, &mask, &rect_kernel(3, 3)?)?;
                mask = morph(imgproc::MORPH_CLOSE, &mask, &rect_kernel(6, 6)?)?;
                Ok(Some(mask))
            }
        }
    }

    /// Convex hulls of the external contours of `mask` that pass the filter.
    pub fn extract_shapes(&self, mask: &Mat) -> Result<Vec<CandidateShape>> {
        let mut contours = core::Vector::<core::Vector<Point>>::new();
        imgproc::find_contours(
            mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut shapes = vec![];
        for contour in contours.iter() {
            let mut hull = core::Vector::<Point>::new();
            imgproc::convex_hull(&contour, &mut hull, false, true)?;
            let outline: Vec<Pixel> = hull.iter().map(|p| Pixel::new(p.x, p.y)).collect();
            let shape = CandidateShape::from_outline(outline);
            if self.filter.accepts(&shape) {
                shapes.push(shape);
            }
        }
        Ok(shapes)
    }
}

impl CandidateDetector for Detector {
    fn detect(&mut self, frame: &Mat) -> Result<Option<Vec<CandidateShape>>> {
        match self.segment(frame)? {
            Some(mask) => Ok(Some(self.extract_shapes(&mask)?)),
            None => Ok(None),
        }
    }
}

fn background_model() -> Result<Ptr<dyn BackgroundSubtractorMOG2>> {
    let mut mog = opencv::video::create_background_subtractor_mog2(100, 8., true)?;
    mog.set_background_ratio(0.4)?;
    mog.set_shadow_threshold(0.5)?;
    mog.set_n_mixtures(3)?;
    // Shadows are dropped from the foreground.
    mog.set_shadow_value(0)?;
    Ok(mog)
}

fn blurred_gray(frame: &Mat) -> Result<Mat> {
    let gray = if frame.channels() == 1 {
        frame.try_clone()?
    } else {
        let mut gray = Mat::default();
        imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        gray
    };
    let mut blurred = Mat::default();
    imgproc::gaussian_blur(&gray, &mut blurred, Size::new(5, 5), 0., 0., core::BORDER_DEFAULT)?;
    Ok(blurred)
}

fn rect_kernel(width: i32, height: i32) -> Result<Mat> {
    Ok(imgproc::get_structuring_element(
        imgproc::MORPH_RECT,
        Size::new(width, height),
        Point::new(-1, -1),
    )?)
}

fn morph(op: i32, src: &Mat, kernel: &Mat) -> Result<Mat> {
    let mut dst = Mat::default();
    imgproc::morphology_ex(
        src,
        &mut dst,
        op,
        kernel,
        Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::BoundingBox;

    fn black_frame() -> Mat {
        Mat::new_rows_cols_with_default(240, 320, core::CV_8UC3, core::Scalar::all(0.)).unwrap()
    }

    fn fill(frame: &mut Mat, rect: core::Rect) {
        imgproc::rectangle(frame, rect, core::Scalar::all(255.), -1, imgproc::LINE_8, 0).unwrap();
    }

    #[test]
    fn test_extract_shapes_from_mask() {
        let mut mask = Mat::new_rows_cols_with_default(240, 320, core::CV_8UC1, core::Scalar::all(0.)).unwrap();
        fill(&mut mask, core::Rect::new(100, 50, 60, 40));
        // Too small to pass the filter.
        fill(&mut mask, core::Rect::new(10, 10, 8, 8));

        let detector = Detector::new(DetectionMode::FrameDifference).unwrap();
        let shapes = detector.extract_shapes(&mask).unwrap();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].bounding_box, BoundingBox::new(100, 50, 60, 40));
        assert_eq!(shapes[0].center(), Pixel::new(130, 70));
    }

    #[test]
    fn test_frame_difference_needs_two_frames() {
        let mut detector = Detector::new(DetectionMode::FrameDifference).unwrap();
        let first = black_frame();
        assert!(detector.detect(&first).unwrap().is_none());

        let mut second = black_frame();
        fill(&mut second, core::Rect::new(100, 50, 60, 40));
        let shapes = detector.detect(&second).unwrap().unwrap();
        assert_eq!(shapes.len(), 1);
        let b = shapes[0].bounding_box;
        // Dilation grows the blob a little around the drawn rectangle.
        assert!(b.x <= 100 && b.y <= 50);
        assert!(b.right() >= 160 && b.y + b.height >= 90);

        // Nothing moves between identical frames.
        let shapes = detector.detect(&second).unwrap().unwrap();
        assert!(shapes.is_empty());
    }

    #[test]
    fn test_background_subtraction_has_no_warm_up() {
        let mut detector = Detector::new(DetectionMode::BackgroundSubtraction).unwrap();
        for _ in 0..3 {
            let shapes = detector.detect(&black_frame()).unwrap();
            // A static scene never yields a shape that passes the filter.
            assert_eq!(shapes, Some(vec![]));
        }
        let mask = detector.segment(&black_frame()).unwrap().unwrap();
        assert_eq!((mask.cols(), mask.rows()), (320, 240));
    }
}
