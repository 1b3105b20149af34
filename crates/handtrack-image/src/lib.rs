//! CPU image primitives for the handtrack pipeline.
//!
//! # Overview
//!
//! [`Image`] is an owned 8-bit sRGBA image stored in main memory. It is what frame sources hand to
//! the tracking engine, and what the frame preprocessor renders model inputs into.
//!
//! Geometry that is shared between images and the tracking code lives in [`rect`], and image sizes
//! are described by [`Resolution`] and [`AspectRatio`].

pub mod rect;

mod color;
mod image;
mod resolution;


pub use crate::image::*;
pub use color::Color;
pub use resolution::{AspectRatio, Resolution};
