use crate::my_types::*;
use crate::shape::{BoundingBox, CandidateShape};

/// Speed corridor bookkeeping of one object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeedTrack {
    pub active: bool,
    pub start_frame: u64,
    pub end_frame: u64,
    pub start_edge_x: i32,
    pub end_edge_x: i32,
    pub speed_kmh: f64,
}

#[derive(Clone, Debug)]
pub struct TrackedObject {
    pub handle: ObjectId,
    pub outline: Vec<Pixel>,
    pub bounding_box: BoundingBox,
    /// One centroid per observed frame, oldest first. Never empty.
    pub center_history: Vec<Pixel>,
    pub diagonal_size: f64,
    pub still_tracked: bool,
    pub matched_this_frame: bool,
    pub miss_count: usize,
    pub predicted_next_center: Pixel,
    pub moving_toward_decreasing_x: bool,
    pub speed: SpeedTrack,
    /// Counting id, 0 until the object first crosses the counting line.
    pub assigned_id: u32,
}

impl TrackedObject {
    pub fn new(handle: ObjectId, shape: CandidateShape) -> Self {
        let center = shape.center();
        let diagonal_size = shape.diagonal_size();
        TrackedObject {
            handle,
            outline: shape.outline,
            bounding_box: shape.bounding_box,
            center_history: vec![center],
            diagonal_size,
            still_tracked: true,
            matched_this_frame: true,
            miss_count: 0,
            predicted_next_center: center,
            moving_toward_decreasing_x: false,
            speed: SpeedTrack::default(),
            assigned_id: 0,
        }
    }

    pub fn last_center(&self) -> Pixel {
        // `center_history` is seeded in `new` and only ever appended to.
        self.center_history[self.center_history.len() - 1]
    }

    pub fn first_center(&self) -> Pixel {
        self.center_history[0]
    }

    /// Replace the geometry with a matched candidate and record its center.
    pub fn absorb(&mut self, shape: CandidateShape) {
        self.center_history.push(shape.center());
        self.diagonal_size = shape.diagonal_size();
        self.outline = shape.outline;
        self.bounding_box = shape.bounding_box;
        self.still_tracked = true;
        self.matched_this_frame = true;
        self.miss_count = 0;
    }

    /// Weighted extrapolation over the last (at most four) displacements,
    /// newer displacements weighted more.
    pub fn predict_next_position(&mut self) {
        let n = self.center_history.len();
        let last = self.last_center();
        let window = n.min(5);
        let delta = if window < 2 {
            Pixel::zeros()
        } else {
            let recent = &self.center_history[n - window..];
            let mut sum = Pixel::zeros();
            let mut weight_sum = 0;
            for (i, pair) in recent.windows(2).enumerate() {
                let weight = i as i32 + 1;
                sum += (pair[1] - pair[0]) * weight;
                weight_sum += weight;
            }
            Pixel::new(
                weighted_round(sum.x, weight_sum),
                weighted_round(sum.y, weight_sum),
            )
        };
        self.predicted_next_center = last + delta;
        self.moving_toward_decreasing_x =
            self.predicted_next_center.x - self.first_center().x <= 0;
    }
}

/// Rounds `sum / weight_sum` half away from zero.
fn weighted_round(sum: i32, weight_sum: i32) -> i32 {
    (sum as f64 / weight_sum as f64).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_with_history(history: &[(i32, i32)]) -> TrackedObject {
        let shape = CandidateShape::from_outline(vec![Pixel::new(0, 0), Pixel::new(9, 9)]);
        let mut object = TrackedObject::new(ObjectId(0), shape);
        object.center_history = history.iter().map(|&(x, y)| Pixel::new(x, y)).collect();
        object
    }

    #[test]
    fn test_new_object() {
        let shape = CandidateShape::from_outline(vec![
            Pixel::new(381, 145),
            Pixel::new(380, 143),
            Pixel::new(379, 140),
            Pixel::new(380, 141),
            Pixel::new(381, 143),
        ]);
        let object = TrackedObject::new(ObjectId(3), shape);
        assert_eq!(object.center_history, vec![Pixel::new(380, 143)]);
        assert!(object.still_tracked);
        assert!(object.matched_this_frame);
        assert_eq!(object.miss_count, 0);
        assert_eq!(object.assigned_id, 0);
        assert!(!object.speed.active);
        assert!((object.diagonal_size - 45_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_predict_single_position() {
        let mut object = object_with_history(&[(120, 80)]);
        object.predict_next_position();
        assert_eq!(object.predicted_next_center, Pixel::new(120, 80));
        // No motion counts as moving toward decreasing x.
        assert!(object.moving_toward_decreasing_x);
    }

    #[test]
    fn test_predict_two_positions() {
        let mut object = object_with_history(&[(100, 100), (110, 95)]);
        object.predict_next_position();
        assert_eq!(object.predicted_next_center, Pixel::new(120, 90));
        assert!(!object.moving_toward_decreasing_x);
    }

    #[test]
    fn test_predict_three_and_four_positions() {
        // dx: 10 then 4 -> (10 + 8) / 3 = 6
        let mut object = object_with_history(&[(0, 0), (10, 1), (14, 2)]);
        object.predict_next_position();
        assert_eq!(object.predicted_next_center, Pixel::new(20, 3));

        // dx: 1, 2, 4 -> (1 + 4 + 12) / 6 = 2.83 -> 3
        // dy: -1, -1, -2 -> (-1 - 2 - 6) / 6 = -1.5 -> -2
        let mut object = object_with_history(&[(0, 10), (1, 9), (3, 8), (7, 6)]);
        object.predict_next_position();
        assert_eq!(object.predicted_next_center, Pixel::new(10, 4));
    }

    #[test]
    fn test_predict_uses_last_five_positions_only() {
        // The first displacement (1000) lies outside the window.
        let mut object = object_with_history(&[(-1000, 0), (0, 0), (5, 0), (10, 0), (15, 0), (20, 0)]);
        object.predict_next_position();
        assert_eq!(object.predicted_next_center, Pixel::new(25, 0));
        assert!(!object.moving_toward_decreasing_x);

        // dx: -3, -3, -6, -6 -> (-3 - 6 - 18 - 24) / 10 = -5.1 -> -5
        let mut object = object_with_history(&[(100, 0), (97, 0), (94, 0), (88, 0), (82, 0)]);
        object.predict_next_position();
        assert_eq!(object.predicted_next_center, Pixel::new(77, 0));
        assert!(object.moving_toward_decreasing_x);
    }

    #[test]
    fn test_direction_follows_first_center() {
        // Last step moves right but the prediction is still left of the start.
        let mut object = object_with_history(&[(200, 0), (150, 0), (100, 0), (104, 0)]);
        object.predict_next_position();
        let expected = object.predicted_next_center.x - object.first_center().x <= 0;
        assert_eq!(object.moving_toward_decreasing_x, expected);
        assert!(object.moving_toward_decreasing_x);
    }

    #[test]
    fn test_absorb() {
        let mut object = object_with_history(&[(5, 5)]);
        object.miss_count = 3;
        object.matched_this_frame = false;
        let shape = CandidateShape::from_outline(vec![Pixel::new(10, 10), Pixel::new(29, 19)]);
        object.absorb(shape.clone());
        assert_eq!(object.center_history.len(), 2);
        assert_eq!(object.last_center(), shape.center());
        assert_eq!(object.bounding_box, shape.bounding_box);
        assert_eq!(object.miss_count, 0);
        assert!(object.matched_this_frame);
    }
}
