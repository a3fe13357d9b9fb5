pub mod calibration;
pub mod config;
pub mod detector;
pub mod error;
pub mod image;
pub mod math;
pub mod my_types;
pub mod orchestrator;
pub mod shape;
pub mod speed;
pub mod storage;
pub mod tracked_object;
pub mod tracker;
pub mod video;
pub mod visualization;
