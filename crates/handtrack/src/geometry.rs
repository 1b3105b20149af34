//! Derivation of crop windows from model output.
//!
//! After each model invocation, the tracker needs to know where to look in the *next* frame. The
//! functions in this module turn box or landmark model output (in frame-relative coordinates)
//! into a [`TransformDescriptor`] that, when applied by the
//! [`FramePreprocessor`][crate::preprocess::FramePreprocessor], yields an upright crop of the hand
//! with some slack around it.

use handtrack_image::AspectRatio;

use crate::{
    error::GeometryError,
    landmark::{NATIVE_HAND_SIZE_PAIRS, NATIVE_INDEX_FINGER_PIP, NATIVE_WRIST, NUM_LANDMARKS},
    math::{self, AspectRatioAwareRotation, Coord},
};

/// Number of points output by the box model.
pub const NUM_BOX_POINTS: usize = 6;

/// Describes how to carve a region out of a frame and map it into model input space.
///
/// All coordinates are frame-relative. `top_left` and `bottom_right` describe an axis-aligned box
/// in the *rotated* coordinate system, ie. after rotating the frame by `rotation_in_radians`
/// around `rotation_center`. The box is then scaled to fill the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformDescriptor {
    pub top_left: Coord,
    pub bottom_right: Coord,
    pub rotation_center: Coord,
    /// Clockwise rotation that makes the hand upright.
    pub rotation_in_radians: f32,
    /// Whether the crop is mirrored horizontally.
    pub flip: bool,
}

impl TransformDescriptor {
    /// The identity transform, covering the whole frame without rotation.
    pub const fn full_frame() -> Self {
        Self {
            top_left: [0.0, 0.0],
            bottom_right: [1.0, 1.0],
            rotation_center: [0.5, 0.5],
            rotation_in_radians: 0.0,
            flip: false,
        }
    }

    /// Returns the rotation that maps frame coordinates into the coordinate system of the box.
    pub fn rotation(&self, aspect_ratio: AspectRatio) -> AspectRatioAwareRotation {
        AspectRatioAwareRotation::new(self.rotation_in_radians, self.rotation_center, aspect_ratio)
    }

    /// Returns the box corners as a `[top_left, bottom_right]` pair.
    #[inline]
    pub fn crop_box(&self) -> [Coord; 2] {
        [self.top_left, self.bottom_right]
    }

    /// Width of the box, relative to the frame width.
    pub fn width(&self) -> f32 {
        self.bottom_right[0] - self.top_left[0]
    }

    /// Height of the box, relative to the frame height.
    pub fn height(&self) -> f32 {
        self.bottom_right[1] - self.top_left[1]
    }

    /// Checks that the box has a strictly positive, finite size.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let (w, h) = (self.width(), self.height());
        let finite = self
            .top_left
            .iter()
            .chain(&self.bottom_right)
            .chain(&self.rotation_center)
            .all(|v| v.is_finite())
            && self.rotation_in_radians.is_finite();
        if finite && w > 0.0 && h > 0.0 {
            Ok(())
        } else {
            Err(GeometryError::DegenerateBox)
        }
    }
}

impl Default for TransformDescriptor {
    fn default() -> Self {
        Self::full_frame()
    }
}

/// Computes the clockwise rotation (in radians) that makes the axis from `palm_bottom` to
/// `palm_top` point straight up.
pub fn compute_rotation_from_palm(
    palm_bottom: Coord,
    palm_top: Coord,
    aspect_ratio: AspectRatio,
) -> Result<f32, GeometryError> {
    let x_scale = aspect_ratio.as_f32();
    let bottom = [palm_bottom[0] * x_scale, palm_bottom[1]];
    let top = [palm_top[0] * x_scale, palm_top[1]];

    let up = math::normalize(&math::sub(&top, &bottom)?)?;
    // Perpendicular to the palm axis, pointing across the palm.
    let across = [-up[1], up[0]];
    // Y points down in image coordinates, `atan2` expects it to point up.
    Ok(f32::atan2(-across[1], across[0]))
}

/// Derives the crop window for the landmark model from the output of the box model.
///
/// `coords` must contain exactly [`NUM_BOX_POINTS`] frame-relative points: the bottom and top
/// of the palm, followed by 4 points outlining the hand.
pub fn compute_transform_from_box_output(
    coords: &[Coord],
    aspect_ratio: AspectRatio,
    slack: f32,
) -> Result<TransformDescriptor, GeometryError> {
    if coords.len() != NUM_BOX_POINTS {
        return Err(GeometryError::InvalidInput {
            expected: NUM_BOX_POINTS,
            actual: coords.len(),
        });
    }

    let (bottom, top) = (coords[0], coords[1]);
    let palm_length = aspect_corrected_distance(bottom, top, aspect_ratio)?;
    derive_transform(
        bottom,
        top,
        &coords[2..],
        aspect_ratio,
        slack * palm_length,
    )
}

/// Derives the crop window for the next frame from the landmark model's output.
///
/// `coords` must contain the [`NUM_LANDMARKS`] frame-relative landmarks in native order.
pub fn compute_transform_from_landmark_output(
    coords: &[Coord],
    aspect_ratio: AspectRatio,
    slack: f32,
) -> Result<TransformDescriptor, GeometryError> {
    if coords.len() != NUM_LANDMARKS {
        return Err(GeometryError::InvalidInput {
            expected: NUM_LANDMARKS,
            actual: coords.len(),
        });
    }

    let mut hand_size = 0.0f32;
    for (a, b) in NATIVE_HAND_SIZE_PAIRS {
        hand_size = hand_size.max(aspect_corrected_distance(
            coords[a],
            coords[b],
            aspect_ratio,
        )?);
    }

    derive_transform(
        coords[NATIVE_WRIST],
        coords[NATIVE_INDEX_FINGER_PIP],
        coords,
        aspect_ratio,
        slack * hand_size,
    )
}

/// Distance between two relative points, in units of the frame height.
fn aspect_corrected_distance(
    a: Coord,
    b: Coord,
    aspect_ratio: AspectRatio,
) -> Result<f32, GeometryError> {
    let x_scale = aspect_ratio.as_f32();
    math::distance(&[a[0] * x_scale, a[1]], &[b[0] * x_scale, b[1]])
}

/// `margin` is given in units of the frame height and gets converted to relative units per axis.
fn derive_transform(
    palm_bottom: Coord,
    palm_top: Coord,
    outline: &[Coord],
    aspect_ratio: AspectRatio,
    margin: f32,
) -> Result<TransformDescriptor, GeometryError> {
    let rotation_in_radians = compute_rotation_from_palm(palm_bottom, palm_top, aspect_ratio)?;
    let rotation_center = [
        (palm_bottom[0] + palm_top[0]) / 2.0,
        (palm_bottom[1] + palm_top[1]) / 2.0,
    ];

    let rotation =
        AspectRatioAwareRotation::new(rotation_in_radians, rotation_center, aspect_ratio);
    let upright = rotation.apply(outline);
    let extrema = math::compute_extremum_coords(&upright).ok_or(GeometryError::InvalidInput {
        expected: 1,
        actual: 0,
    })?;

    let margin = [margin / aspect_ratio.as_f32(), margin];
    let top_left = extrema.top_left();
    let bottom_right = extrema.bottom_right();

    let desc = TransformDescriptor {
        top_left: [top_left[0] - margin[0], top_left[1] - margin[1]],
        bottom_right: [bottom_right[0] + margin[0], bottom_right[1] + margin[1]],
        rotation_center,
        rotation_in_radians,
        flip: false,
    };
    desc.validate()?;
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;

    use approx::assert_abs_diff_eq;

    use super::*;

    const BOX_OUTPUT: [Coord; 6] = [
        [0.5, 0.6],
        [0.5, 0.4],
        [0.3, 0.3],
        [0.7, 0.3],
        [0.3, 0.7],
        [0.7, 0.7],
    ];

    /// An upright hand whose palm axis is vertical.
    fn upright_hand() -> Vec<Coord> {
        let mut coords = vec![[0.0; 2]; NUM_LANDMARKS];
        for level in 0..4 {
            for finger in 0..4 {
                coords[5 * level + finger] = [
                    0.44 + 0.04 * finger as f32,
                    0.5 - 0.05 * level as f32,
                ];
            }
            // Thumb sticks out to the left.
            coords[5 * level + 4] = [0.42 - 0.04 * level as f32, 0.6 - 0.03 * level as f32];
        }
        coords[NATIVE_WRIST] = [0.48, 0.7];
        // Put the index finger PIP directly above the wrist.
        coords[NATIVE_INDEX_FINGER_PIP] = [0.48, 0.45];
        coords
    }

    #[test]
    fn box_output_scenario() {
        let aspect = AspectRatio::new(100, 100).unwrap();
        let desc = compute_transform_from_box_output(&BOX_OUTPUT, aspect, 0.75).unwrap();

        assert_abs_diff_eq!(desc.rotation_in_radians, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(desc.rotation_center[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(desc.rotation_center[1], 0.5, epsilon = 1e-6);
        // 0.75 * 0.2 = 0.15 of slack on every side.
        assert_abs_diff_eq!(desc.top_left[0], 0.15, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.top_left[1], 0.15, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.bottom_right[0], 0.85, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.bottom_right[1], 0.85, epsilon = 1e-5);
        assert!(!desc.flip);
    }

    #[test]
    fn box_slack_is_per_axis() {
        // In a 2:1 frame, the vertical palm length of 0.2 frame heights is 0.1 frame widths.
        let aspect = AspectRatio::new(200, 100).unwrap();
        let desc = compute_transform_from_box_output(&BOX_OUTPUT, aspect, 0.75).unwrap();
        assert_abs_diff_eq!(desc.rotation_in_radians, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(desc.top_left[0], 0.3 - 0.075, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.top_left[1], 0.3 - 0.15, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.bottom_right[0], 0.7 + 0.075, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.bottom_right[1], 0.7 + 0.15, epsilon = 1e-5);
    }

    #[test]
    fn box_output_wrong_length() {
        let aspect = AspectRatio::SQUARE;
        assert_eq!(
            compute_transform_from_box_output(&BOX_OUTPUT[..5], aspect, 0.75),
            Err(GeometryError::InvalidInput {
                expected: 6,
                actual: 5
            })
        );
        assert_eq!(
            compute_transform_from_box_output(&[], aspect, 0.75),
            Err(GeometryError::InvalidInput {
                expected: 6,
                actual: 0
            })
        );
    }

    #[test]
    fn box_output_degenerate() {
        let mut coords = BOX_OUTPUT;
        coords[1] = coords[0];
        assert_eq!(
            compute_transform_from_box_output(&coords, AspectRatio::SQUARE, 0.75),
            Err(GeometryError::ZeroLengthVector)
        );

        // All outline points on a vertical line and no slack: zero width.
        let coords = [
            [0.5, 0.6],
            [0.5, 0.4],
            [0.5, 0.3],
            [0.5, 0.3],
            [0.5, 0.7],
            [0.5, 0.7],
        ];
        assert_eq!(
            compute_transform_from_box_output(&coords, AspectRatio::SQUARE, 0.0),
            Err(GeometryError::DegenerateBox)
        );
    }

    #[test]
    fn palm_rotation() {
        let square = AspectRatio::SQUARE;
        // Palm pointing up needs no rotation.
        assert_abs_diff_eq!(
            compute_rotation_from_palm([0.5, 0.6], [0.5, 0.4], square).unwrap(),
            0.0
        );
        // Palm leaning right has to be rotated counterclockwise.
        assert_abs_diff_eq!(
            compute_rotation_from_palm([0.5, 0.5], [0.6, 0.4], square).unwrap(),
            -FRAC_PI_4,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            compute_rotation_from_palm([0.5, 0.5], [0.4, 0.4], square).unwrap(),
            FRAC_PI_4,
            epsilon = 1e-6
        );
        // In a 2:1 frame, a relative offset of (0.05, -0.1) is a 45° lean.
        assert_abs_diff_eq!(
            compute_rotation_from_palm([0.5, 0.5], [0.55, 0.4], AspectRatio::new(2, 1).unwrap())
                .unwrap(),
            -FRAC_PI_4,
            epsilon = 1e-6
        );

        // Applying the rotation makes the palm point straight up.
        let (bottom, top) = ([0.3, 0.8], [0.45, 0.55]);
        let aspect = AspectRatio::new(16, 9).unwrap();
        let radians = compute_rotation_from_palm(bottom, top, aspect).unwrap();
        let rot = AspectRatioAwareRotation::new(radians, [0.0, 0.0], aspect);
        let out = rot.apply(&[bottom, top]);
        assert_abs_diff_eq!(out[0][0], out[1][0], epsilon = 1e-5);
        assert!(out[1][1] < out[0][1]);
    }

    #[test]
    fn landmark_output_upright() {
        let hand = upright_hand();
        let desc = compute_transform_from_landmark_output(&hand, AspectRatio::SQUARE, 0.5).unwrap();
        assert_abs_diff_eq!(desc.rotation_in_radians, 0.0, epsilon = 1e-6);

        let mut hand_size = 0.0f32;
        for (a, b) in NATIVE_HAND_SIZE_PAIRS {
            hand_size = hand_size.max(math::distance(&hand[a], &hand[b]).unwrap());
        }
        let margin = 0.5 * hand_size;
        let ext = math::compute_extremum_coords(&hand).unwrap();
        assert_abs_diff_eq!(desc.top_left[0], ext.min_x[0] - margin, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.top_left[1], ext.min_y[1] - margin, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.bottom_right[0], ext.max_x[0] + margin, epsilon = 1e-5);
        assert_abs_diff_eq!(desc.bottom_right[1], ext.max_y[1] + margin, epsilon = 1e-5);
    }

    #[test]
    fn landmark_output_recovers_rotation() {
        let upright = upright_hand();
        let center = [
            (upright[NATIVE_WRIST][0] + upright[NATIVE_INDEX_FINGER_PIP][0]) / 2.0,
            (upright[NATIVE_WRIST][1] + upright[NATIVE_INDEX_FINGER_PIP][1]) / 2.0,
        ];

        for aspect in [AspectRatio::SQUARE, AspectRatio::new(16, 9).unwrap()] {
            for radians in [-2.5, -0.7, 0.3, 1.2, 3.0] {
                let rot = AspectRatioAwareRotation::new(radians, center, aspect);
                let tilted = rot.apply_reverse(&upright);

                let tilted_desc =
                    compute_transform_from_landmark_output(&tilted, aspect, 0.75).unwrap();
                let upright_desc =
                    compute_transform_from_landmark_output(&upright, aspect, 0.75).unwrap();

                assert_abs_diff_eq!(tilted_desc.rotation_in_radians, radians, epsilon = 1e-4);
                for i in 0..2 {
                    assert_abs_diff_eq!(tilted_desc.rotation_center[i], center[i], epsilon = 1e-5);
                    assert_abs_diff_eq!(
                        tilted_desc.top_left[i],
                        upright_desc.top_left[i],
                        epsilon = 1e-4
                    );
                    assert_abs_diff_eq!(
                        tilted_desc.bottom_right[i],
                        upright_desc.bottom_right[i],
                        epsilon = 1e-4
                    );
                }
            }
        }
    }

    #[test]
    fn landmark_output_wrong_length() {
        assert_eq!(
            compute_transform_from_landmark_output(&BOX_OUTPUT, AspectRatio::SQUARE, 0.75),
            Err(GeometryError::InvalidInput {
                expected: 21,
                actual: 6
            })
        );
    }

    #[test]
    fn descriptor_validation() {
        assert_eq!(TransformDescriptor::full_frame().validate(), Ok(()));
        let mut desc = TransformDescriptor::full_frame();
        desc.bottom_right = [0.0, 1.0];
        assert_eq!(desc.validate(), Err(GeometryError::DegenerateBox));
        desc.bottom_right = [1.0, f32::NAN];
        assert_eq!(desc.validate(), Err(GeometryError::DegenerateBox));
    }
}
