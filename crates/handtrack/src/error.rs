//! Error types.
//!
//! Only two kinds of errors exist in the tracking core:
//!
//! - [`GeometryError`]s, returned by the coordinate math when its inputs violate a contract (wrong
//!   number of points, mismatched vector lengths) or are numerically degenerate.
//! - [`ConfigError`]s, returned while setting up an [`Engine`][crate::engine::Engine]. These are
//!   fatal: no engine is created.
//!
//! Losing track of the hand is not an error.

use handtrack_image::Resolution;

/// Error returned by the geometric primitives in [`math`][crate::math],
/// [`geometry`][crate::geometry] and [`postprocess`][crate::postprocess].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// Two vectors that are combined element-wise have different lengths.
    #[error("dimension mismatch: expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A model produced a coordinate list of the wrong length.
    #[error("invalid input: expected {expected} coordinates, got {actual}")]
    InvalidInput { expected: usize, actual: usize },

    /// Attempted to normalize a vector of length 0.
    #[error("cannot normalize a zero-length vector")]
    ZeroLengthVector,

    /// A crop box has zero (or negative) width or height, or a transform is not invertible.
    #[error("degenerate box")]
    DegenerateBox,
}

impl GeometryError {
    /// Returns whether this error signals that a model wrapper violated its output contract.
    ///
    /// Contract violations are not retried. The remaining errors stem from degenerate (but
    /// well-formed) model output and just mean that tracking was lost.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::InvalidInput { .. }
        )
    }
}

/// Error returned when setting up an engine or parsing its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The box and landmark models expect differently sized input images.
    #[error("box model input resolution {box_model} does not match landmark model input resolution {landmark_model}")]
    InputResolutionMismatch {
        box_model: Resolution,
        landmark_model: Resolution,
    },

    /// A model reports an input resolution with a zero dimension.
    #[error("model input resolution {0} is empty")]
    EmptyInputResolution(Resolution),

    /// A configuration value lies outside of its valid range.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to parse engine configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read engine configuration: {0}")]
    Io(#[from] std::io::Error),
}
