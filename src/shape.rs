use crate::my_types::*;

/// Axis-aligned pixel rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest box enclosing all points. Both borders are inclusive, so a
    /// single point yields a 1x1 box.
    pub fn enclosing(points: &[Pixel]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let mut min = points[0];
        let mut max = points[0];
        for p in points.iter().skip(1) {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Self::new(min.x, min.y, max.x - min.x + 1, max.y - min.y + 1)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn center(&self) -> Pixel {
        Pixel::new(
            (self.x + self.x + self.width) / 2,
            (self.y + self.y + self.height) / 2,
        )
    }

    pub fn diagonal(&self) -> f64 {
        ((self.width as f64).powi(2) + (self.height as f64).powi(2)).sqrt()
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Intersection with a `width` x `height` frame, None if empty.
    pub fn clamped(&self, width: i32, height: i32) -> Option<BoundingBox> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width).min(width);
        let y1 = (self.y + self.height).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// A polygon proposed by shape extraction as a possible object in the
/// current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateShape {
    pub outline: Vec<Pixel>,
    pub bounding_box: BoundingBox,
}

impl CandidateShape {
    pub fn from_outline(outline: Vec<Pixel>) -> Self {
        let bounding_box = BoundingBox::enclosing(&outline);
        Self {
            outline,
            bounding_box,
        }
    }

    pub fn center(&self) -> Pixel {
        self.bounding_box.center()
    }

    pub fn diagonal_size(&self) -> f64 {
        self.bounding_box.diagonal()
    }

    /// Polygon area by the shoelace formula.
    pub fn outline_area(&self) -> f64 {
        let n = self.outline.len();
        if n < 3 {
            return 0.;
        }
        let mut twice_area = 0_i64;
        for i in 0..n {
            let p0 = &self.outline[i];
            let p1 = &self.outline[(i + 1) % n];
            twice_area += p0.x as i64 * p1.y as i64 - p1.x as i64 * p0.y as i64;
        }
        (twice_area as f64 / 2.).abs()
    }

    /// Ratio of the outline area to its bounding box area.
    pub fn fill_ratio(&self) -> f64 {
        let box_area = self.bounding_box.area();
        if box_area == 0 {
            return 0.;
        }
        self.outline_area() / box_area as f64
    }
}

/// Acceptance thresholds applied to extracted shapes before they reach the
/// tracker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeFilter {
    /// Exclusive lower bound of the bounding box area.
    pub min_area: i64,
    /// Inclusive upper bound of the bounding box area.
    pub max_area: i64,
    /// Exclusive lower bound for both box width and height.
    pub min_side: i32,
    /// Exclusive lower bound of the fill ratio.
    pub min_fill_ratio: f64,
}

impl ShapeFilter {
    pub fn frame_difference() -> Self {
        Self {
            min_area: 400,
            max_area: 25_000,
            min_side: 30,
            min_fill_ratio: 0.5,
        }
    }

    pub fn background_subtraction() -> Self {
        Self {
            min_side: 50,
            ..Self::frame_difference()
        }
    }

    pub fn accepts(&self, shape: &CandidateShape) -> bool {
        let b = &shape.bounding_box;
        let area = b.area();
        area > self.min_area
            && area <= self.max_area
            && b.width > self.min_side
            && b.height > self.min_side
            && shape.fill_ratio() > self.min_fill_ratio
    }
}
