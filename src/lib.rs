pub mod calibration;
pub mod config;
pub mod controller;
pub mod csv_loader;
pub mod gesture_classifier;
pub mod gesture_state;
pub mod hid;
pub mod mouse_filter;
pub mod remap;
pub mod scroll;
pub mod types;

pub use config::EngineConfig;
pub use controller::{CursorController, FrameReport};
pub use types::{CursorEvent, LandmarkFrame, Point, ScreenSize};
