//! Real-time single-hand tracking.
//!
//! This crate turns video frames into hand landmark coordinates and gesture probabilities, using
//! a cascade of two neural networks:
//!
//! - a **box model** that roughly locates a hand in the whole frame, and
//! - a **landmark model** that estimates 21 keypoints (plus a few classifier outputs) from an
//!   upright crop of the hand.
//!
//! The [`Engine`] runs the box model only while no hand is being tracked. Afterwards, the crop for
//! each frame is derived from the landmarks found in the previous frame.
//!
//! # Coordinates
//!
//! Unless noted otherwise, coordinates are *frame-relative*: `[0, 0]` is the top left corner of the
//! frame and `[1, 1]` the bottom right corner. X points to the right, Y points *down*. Angles are
//! measured in radians, and positive angles rotate clockwise as seen on screen.
//!
//! # Logging
//!
//! All diagnostics are emitted through the [`log`] crate. Binaries can call [`init_logger!`] to
//! print them to *stderr*.

use log::LevelFilter;

pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod iter;
pub mod landmark;
pub mod math;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod progress;
pub mod timer;

pub use config::{EngineConfig, EngineConfigOverrides};
pub use engine::{Engine, FrameSource, StopHandle, TrackingThread};
pub use handtrack_image as image;
pub use postprocess::TrackResult;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `handtrack` will log at *debug* level, `tract` at *warn* level. The
/// `RUST_LOG` environment variable can override this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
