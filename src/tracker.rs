use tracing::{debug, instrument, trace};

use crate::config::{CrossingLine, TrackerConfig};
use crate::error::*;
use crate::math::distance_between_points;
use crate::my_types::*;
use crate::shape::CandidateShape;
use crate::speed::{compute_speed_kmh, corridor_bounds, SpeedMeasurement};
use crate::tracked_object::TrackedObject;

/// Results of one processed frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// At least one object crossed the counting line in this frame.
    pub crossed: bool,
    pub car_count: u32,
    pub measurements: Vec<SpeedMeasurement>,
}

pub struct TrackingEngine {
    config: TrackerConfig,
    objects: Vec<TrackedObject>,
    car_count: u32,
    next_handle: usize,
    frames_processed: u64,
}

impl TrackingEngine {
    pub fn new(config: TrackerConfig) -> TrackingResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            objects: vec![],
            car_count: 0,
            next_handle: 0,
            frames_processed: 0,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// All known objects, evicted ones included until purged.
    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn tracked_objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.iter().filter(|o| o.still_tracked)
    }

    pub fn car_count(&self) -> u32 {
        self.car_count
    }

    pub fn get(&self, handle: ObjectId) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.handle == handle)
    }

    /// Runs association, counting and speed measurement for one frame. The
    /// first frame only seeds new objects.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn process_frame(&mut self, frame_index: u64, candidates: Vec<CandidateShape>) -> FrameReport {
        if self.frames_processed == 0 {
            self.seed(candidates);
        } else {
            self.associate(candidates);
        }
        self.frames_processed += 1;

        let line = self.config.crossing_line;
        let crossed = self.check_line_crossing(&line);
        let measurements = self.track_speed(frame_index);
        FrameReport {
            frame_index,
            crossed,
            car_count: self.car_count,
            measurements,
        }
    }

    /// Adds every candidate as a new object without association.
    pub fn seed(&mut self, candidates: Vec<CandidateShape>) {
        for candidate in candidates {
            self.add_new_object(candidate);
        }
    }

    /// Greedy nearest-neighbour association of this frame's candidates to the
    /// predicted positions of the tracked objects. A single object may absorb
    /// several candidates of the same frame, but objects created in this frame
    /// are never matched.
    pub fn associate(&mut self, candidates: Vec<CandidateShape>) {
        for object in self.objects.iter_mut().filter(|o| o.still_tracked) {
            object.matched_this_frame = false;
            object.predict_next_position();
        }

        let existing = self.objects.len();
        for candidate in candidates {
            let center = candidate.center();
            let mut best: Option<(usize, f64)> = None;
            for (i, object) in self.objects[..existing].iter().enumerate() {
                if !object.still_tracked {
                    continue;
                }
                let distance = distance_between_points(&center, &object.predicted_next_center);
                if best.map_or(true, |(_, least)| distance < least) {
                    best = Some((i, distance));
                }
            }

            match best {
                Some((i, distance))
                    if distance < candidate.diagonal_size() * self.config.association_distance_factor =>
                {
                    trace!(handle = ?self.objects[i].handle, distance, "matched candidate");
                    self.objects[i].absorb(candidate);
                }
                _ => self.add_new_object(candidate),
            }
        }

        let threshold = self.config.miss_count_eviction_threshold;
        for object in self.objects.iter_mut().filter(|o| o.still_tracked) {
            if !object.matched_this_frame {
                object.miss_count += 1;
            }
            if object.miss_count >= threshold {
                debug!(handle = ?object.handle, id = object.assigned_id, "evicting object");
                object.still_tracked = false;
            }
        }
    }

    fn add_new_object(&mut self, candidate: CandidateShape) {
        let handle = ObjectId(self.next_handle);
        self.next_handle += 1;
        trace!(?handle, "new object");
        self.objects.push(TrackedObject::new(handle, candidate));
    }

    /// Counts objects whose last two centers lie on opposite sides of the
    /// line, in either direction. Returns true if any object crossed.
    pub fn check_line_crossing(&mut self, line: &CrossingLine) -> bool {
        let mut crossed = false;
        for object in self.objects.iter_mut() {
            let n = object.center_history.len();
            if !object.still_tracked || n < 2 {
                continue;
            }
            let previous = line.coordinate(&object.center_history[n - 2]);
            let current = line.coordinate(&object.center_history[n - 1]);
            let position = line.position;
            if (previous > position && current <= position) || (previous < position && current >= position) {
                self.car_count += 1;
                if object.assigned_id == 0 {
                    object.assigned_id = self.car_count;
                }
                debug!(id = object.assigned_id, count = self.car_count, "object crossed the line");
                crossed = true;
            }
        }
        crossed
    }

    /// Advances the speed corridor state of every tracked object and returns
    /// the measurements completed in this frame.
    pub fn track_speed(&mut self, frame_index: u64) -> Vec<SpeedMeasurement> {
        let (start_x, end_x) = (self.config.start_x(), self.config.end_x());
        let (fps, pixels_per_meter) = (self.config.fps, self.config.pixels_per_meter);
        let mut measurements = vec![];

        for object in self.objects.iter_mut() {
            if !object.still_tracked || object.center_history.len() < 2 {
                continue;
            }
            let decreasing_x = object.moving_toward_decreasing_x;
            let (start, finish) = corridor_bounds(decreasing_x, start_x, end_x);
            let b = object.bounding_box;

            let entered = if decreasing_x { b.x >= start } else { b.x <= start };
            if entered && !object.speed.active {
                object.speed.active = true;
                object.speed.start_frame = frame_index;
                object.speed.start_edge_x = b.x;
            }

            let left = if decreasing_x { b.right() <= finish } else { b.x >= finish };
            if !(object.speed.active && left) {
                continue;
            }
            object.speed.active = false;
            object.speed.end_frame = frame_index;
            object.speed.end_edge_x = b.right();
            match compute_speed_kmh(
                object.speed.start_edge_x,
                object.speed.end_edge_x,
                object.speed.start_frame,
                object.speed.end_frame,
                fps,
                pixels_per_meter,
            ) {
                Ok(speed_kmh) => {
                    object.speed.speed_kmh = speed_kmh;
                    debug!(id = object.assigned_id, speed_kmh, "speed measured");
                    measurements.push(SpeedMeasurement {
                        object_id: object.assigned_id,
                        speed_kmh,
                        bounding_box: b,
                        frame_index,
                    });
                }
                Err(err) => debug!(handle = ?object.handle, "{}", err),
            }
        }
        measurements
    }

    /// Drops evicted objects. Returns how many were removed.
    pub fn purge_evicted(&mut self) -> usize {
        let before = self.objects.len();
        self.objects.retain(|o| o.still_tracked);
        before - self.objects.len()
    }
}
