use cv2::prelude::*;
use opencv as cv2;

use anyhow::Result;
use ndarray as nd;

use crate::config::{CrossingLine, LineAxis};
use crate::image::Image;
use crate::my_types::*;
use crate::tracked_object::TrackedObject;

const BLACK: (f64, f64, f64) = (0., 0., 0.);
const WHITE: (f64, f64, f64) = (255., 255., 255.);
const GREEN: (f64, f64, f64) = (0., 200., 0.);
const RED: (f64, f64, f64) = (0., 0., 255.);
const BLUE: (f64, f64, f64) = (255., 0., 0.);

pub trait AsArray {
    fn try_as_array(&self) -> Result<nd::Array3<u8>>;
}

impl AsArray for cv2::core::Mat {
    fn try_as_array(&self) -> Result<nd::Array3<u8>> {
        let bytes = self.data_bytes()?;
        let size = self.size()?;
        let channels = self.channels() as usize;
        let a = nd::ArrayView3::from_shape((size.height as usize, size.width as usize, channels), bytes)?;
        Ok(a.to_owned())
    }
}

fn scalar((b, g, r): (f64, f64, f64)) -> cv2::core::Scalar {
    cv2::core::Scalar::new(b, g, r, 0.)
}

fn point(p: &Pixel) -> cv2::core::Point {
    cv2::core::Point { x: p.x, y: p.y }
}

fn bgr_to_rgb(frame: &cv2::core::Mat) -> Result<cv2::core::Mat> {
    let mut rgb = cv2::core::Mat::default();
    cv2::imgproc::cvt_color(frame, &mut rgb, cv2::imgproc::COLOR_BGR2RGB, 0)?;
    Ok(rgb)
}

/// RGB copy of a BGR frame.
pub fn image_from_mat(frame: &cv2::core::Mat) -> Result<Image> {
    let rgb = bgr_to_rgb(frame)?;
    let size = rgb.size()?;
    Ok(Image {
        data: rgb.data_bytes()?.to_vec(),
        width: size.width as usize,
        height: size.height as usize,
        channels: 3,
    })
}

pub fn image_to_array(image: &Image) -> Result<nd::Array3<u8>> {
    Ok(nd::Array3::from_shape_vec(
        (image.height, image.width, image.channels),
        image.data.clone(),
    )?)
}

/// Overlay state for one frame.
pub struct Annotations<'a> {
    pub objects: &'a [TrackedObject],
    pub crossing_line: CrossingLine,
    pub crossed: bool,
    pub car_count: u32,
    pub calibration_region: Option<&'a [Vector2d; 4]>,
}

/// Draws the overlay onto a copy of `frame` and returns it as an RGB array.
pub fn visualize_tracking(frame: &cv2::core::Mat, annotations: &Annotations) -> Result<nd::Array3<u8>> {
    let mut canvas = frame.try_clone()?;
    draw_annotations(&mut canvas, annotations)?;
    bgr_to_rgb(&canvas)?.try_as_array()
}

pub fn draw_annotations(canvas: &mut cv2::core::Mat, annotations: &Annotations) -> Result<()> {
    for object in annotations.objects.iter().filter(|o| o.still_tracked) {
        let b = &object.bounding_box;
        cv2::imgproc::rectangle(
            canvas,
            cv2::core::Rect::new(b.x, b.y, b.width, b.height),
            scalar(BLACK),
            2,
            cv2::imgproc::LINE_8,
            0,
        )?;
        if object.assigned_id > 0 {
            let font_scale = object.diagonal_size / 60.;
            let thickness = (font_scale * 2.).round().max(1.) as i32;
            cv2::imgproc::put_text(
                canvas,
                &object.assigned_id.to_string(),
                point(&object.last_center()),
                cv2::imgproc::FONT_HERSHEY_SIMPLEX,
                font_scale,
                scalar(WHITE),
                thickness,
                cv2::imgproc::LINE_8,
                false,
            )?;
        }
    }

    draw_crossing_line(canvas, &annotations.crossing_line, annotations.crossed)?;
    draw_car_count(canvas, annotations.car_count)?;
    if let Some(region) = annotations.calibration_region {
        draw_quad(canvas, region, scalar(BLUE))?;
    }
    Ok(())
}

fn draw_crossing_line(canvas: &mut cv2::core::Mat, line: &CrossingLine, crossed: bool) -> Result<()> {
    let size = canvas.size()?;
    let (from, to) = match line.axis {
        LineAxis::Horizontal => (Pixel::new(0, line.position), Pixel::new(size.width - 1, line.position)),
        LineAxis::Vertical => (Pixel::new(line.position, 0), Pixel::new(line.position, size.height - 1)),
    };
    let color = if crossed { GREEN } else { RED };
    cv2::imgproc::line(canvas, point(&from), point(&to), scalar(color), 2, cv2::imgproc::LINE_8, 0)?;
    Ok(())
}

/// Car count in the top right corner, scaled with the frame area.
fn draw_car_count(canvas: &mut cv2::core::Mat, car_count: u32) -> Result<()> {
    let size = canvas.size()?;
    let text = car_count.to_string();
    let font_scale = (size.width as f64 * size.height as f64) / 300000.;
    let thickness = ((font_scale * 1.5).round() as i32).max(1);
    let mut baseline = 0;
    let text_size = cv2::imgproc::get_text_size(
        &text,
        cv2::imgproc::FONT_HERSHEY_SIMPLEX,
        font_scale,
        thickness,
        &mut baseline,
    )?;
    let origin = cv2::core::Point {
        x: size.width - 1 - (text_size.width as f64 * 1.25) as i32,
        y: (text_size.height as f64 * 1.25) as i32,
    };
    cv2::imgproc::put_text(
        canvas,
        &text,
        origin,
        cv2::imgproc::FONT_HERSHEY_SIMPLEX,
        font_scale,
        scalar(GREEN),
        thickness,
        cv2::imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

fn draw_quad(canvas: &mut cv2::core::Mat, quad: &[Vector2d; 4], color: cv2::core::Scalar) -> Result<()> {
    for i in 0..4 {
        let a = &quad[i];
        let b = &quad[(i + 1) % 4];
        cv2::imgproc::line(
            canvas,
            cv2::core::Point::new(a.x.round() as i32, a.y.round() as i32),
            cv2::core::Point::new(b.x.round() as i32, b.y.round() as i32),
            color,
            1,
            cv2::imgproc::LINE_8,
            0,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::CandidateShape;

    fn gray_frame(rows: i32, cols: i32) -> cv2::core::Mat {
        cv2::core::Mat::new_rows_cols_with_default(rows, cols, cv2::core::CV_8UC3, cv2::core::Scalar::all(128.))
            .unwrap()
    }

    #[test]
    fn test_image_from_mat_swaps_channels() {
        let frame = cv2::core::Mat::new_rows_cols_with_default(
            2,
            3,
            cv2::core::CV_8UC3,
            cv2::core::Scalar::new(10., 20., 30., 0.),
        )
        .unwrap();
        let image = image_from_mat(&frame).unwrap();
        assert_eq!((image.width, image.height, image.channels), (3, 2, 3));
        assert_eq!(image.pixel(2, 1), &[30, 20, 10]);

        let array = image_to_array(&image).unwrap();
        assert_eq!(array.shape(), &[2, 3, 3]);
        assert_eq!(array[[1, 2, 0]], 30);
    }

    #[test]
    fn test_visualize_tracking() {
        let frame = gray_frame(120, 160);
        let shape = CandidateShape::from_outline(vec![
            Pixel::new(20, 20),
            Pixel::new(59, 20),
            Pixel::new(59, 59),
            Pixel::new(20, 59),
        ]);
        let mut object = TrackedObject::new(ObjectId(0), shape);
        object.assigned_id = 1;
        let objects = vec![object];
        let region = [
            Vector2d::new(100., 80.),
            Vector2d::new(140., 80.),
            Vector2d::new(140., 110.),
            Vector2d::new(100., 110.),
        ];
        let annotations = Annotations {
            objects: &objects,
            crossing_line: CrossingLine {
                position: 42,
                axis: LineAxis::Horizontal,
            },
            crossed: true,
            car_count: 1,
            calibration_region: Some(&region),
        };

        let array = visualize_tracking(&frame, &annotations).unwrap();
        assert_eq!(array.shape(), &[120, 160, 3]);
        // Box border is black.
        assert_eq!(array[[20, 40, 0]], 0);
        // Crossing line is green in RGB order.
        assert_eq!(array[[42, 150, 1]], 200);
        assert_eq!(array[[42, 150, 0]], 0);
        // Calibration region is blue.
        assert_eq!(array[[95, 100, 2]], 255);
        // Untouched pixel.
        assert_eq!(array[[110, 10, 0]], 128);
        // The source frame is not modified.
        assert_eq!(frame.at_2d::<cv2::core::Vec3b>(42, 150).unwrap()[0], 128);
    }
}
