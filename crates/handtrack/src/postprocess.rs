//! Mapping of model output back to the frame, and assembly of [`TrackResult`]s.

use handtrack_image::AspectRatio;
use serde::Serialize;

use crate::{
    error::GeometryError,
    geometry::TransformDescriptor,
    landmark::{HandLandmark, NATIVE_ORDER, NUM_LANDMARKS, USER_FRIENDLY_ORDER},
    math::{self, Coord},
};

/// Number of classifier outputs of the landmark model.
pub const NUM_CLASSES: usize = 4;

const CLASS_PINCH: usize = 0;
const CLASS_FIST: usize = 1;
const CLASS_HAND_ABSENT: usize = 2;
const CLASS_LEFT_HAND: usize = 3;

/// Gesture probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poses {
    pub pinch_prob: f32,
    pub fist_prob: f32,
}

/// Tracking result emitted for every processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    /// Frame-relative landmark coordinates.
    ///
    /// These are in user-friendly order (see [`HandLandmark`]) unless that was disabled in the
    /// [`EngineConfig`][crate::config::EngineConfig].
    pub coordinates: Vec<Coord>,
    pub is_left_hand_prob: f32,
    pub is_hand_present_prob: f32,
    pub poses: Poses,
}

impl TrackResult {
    /// Returns the position of `landmark`, assuming the coordinates are in user-friendly order.
    pub fn landmark(&self, landmark: HandLandmark) -> Coord {
        self.coordinates[landmark as usize]
    }
}

/// Maps coordinates from model input space back to frame-relative coordinates.
///
/// This is the inverse of [`to_model_local`].
pub fn to_global_coordinates(
    transform: &TransformDescriptor,
    aspect_ratio: AspectRatio,
    coords: &[Coord],
) -> Vec<Coord> {
    let in_frame = math::coords_outside_box(transform.crop_box(), coords);
    let global = transform.rotation(aspect_ratio).apply_reverse(&in_frame);
    if transform.flip {
        math::flip_coords_horizontally(&global)
    } else {
        global
    }
}

/// Maps frame-relative coordinates into the model input space described by `transform`.
pub fn to_model_local(
    transform: &TransformDescriptor,
    aspect_ratio: AspectRatio,
    coords: &[Coord],
) -> Result<Vec<Coord>, GeometryError> {
    let flipped;
    let coords = if transform.flip {
        flipped = math::flip_coords_horizontally(coords);
        &flipped
    } else {
        coords
    };
    let upright = transform.rotation(aspect_ratio).apply(coords);
    math::coords_inside_box(transform.crop_box(), &upright)
}

/// Treats the inner part of the frame (`padding` away from every edge) as the new unit square.
///
/// A `padding` of 0 leaves the coordinates unchanged.
pub fn apply_padding(padding: f32, coords: &[Coord]) -> Result<Vec<Coord>, GeometryError> {
    if padding == 0.0 {
        return Ok(coords.to_vec());
    }
    math::coords_inside_box([[padding, padding], [1.0 - padding, 1.0 - padding]], coords)
}

/// Mirrors coordinates horizontally.
pub fn mirror_horizontally(coords: &[Coord]) -> Vec<Coord> {
    math::flip_coords_horizontally(coords)
}

/// Reorders landmarks from the model's native order to user-friendly order.
pub fn reorder_user_friendly(coords: &[Coord]) -> Result<Vec<Coord>, GeometryError> {
    permute(coords, &USER_FRIENDLY_ORDER)
}

/// Reorders landmarks from user-friendly order back to the model's native order.
pub fn reorder_native(coords: &[Coord]) -> Result<Vec<Coord>, GeometryError> {
    permute(coords, &NATIVE_ORDER)
}

fn permute(coords: &[Coord], order: &[usize; NUM_LANDMARKS]) -> Result<Vec<Coord>, GeometryError> {
    if coords.len() != NUM_LANDMARKS {
        return Err(GeometryError::InvalidInput {
            expected: NUM_LANDMARKS,
            actual: coords.len(),
        });
    }
    Ok(order.iter().map(|&i| coords[i]).collect())
}

/// Assembles a [`TrackResult`] from final coordinates and the landmark model's classifier
/// outputs.
///
/// The model reports the probability that *no* hand is present, which gets inverted here.
pub fn assemble_result(coords: Vec<Coord>, classes: &[f32]) -> Result<TrackResult, GeometryError> {
    if classes.len() < NUM_CLASSES {
        return Err(GeometryError::InvalidInput {
            expected: NUM_CLASSES,
            actual: classes.len(),
        });
    }

    Ok(TrackResult {
        coordinates: coords,
        is_left_hand_prob: classes[CLASS_LEFT_HAND],
        is_hand_present_prob: 1.0 - classes[CLASS_HAND_ABSENT],
        poses: Poses {
            pinch_prob: classes[CLASS_PINCH],
            fist_prob: classes[CLASS_FIST],
        },
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use handtrack_image::{Color, Image};

    use crate::{
        iter::zip_exact,
        preprocess::{FramePreprocessor, PaddingMode},
    };

    use super::*;

    fn random_transform(rng: &mut fastrand::Rng) -> TransformDescriptor {
        let tl = [rng.f32() * 0.6 - 0.1, rng.f32() * 0.6 - 0.1];
        TransformDescriptor {
            top_left: tl,
            bottom_right: [tl[0] + 0.1 + rng.f32() * 0.5, tl[1] + 0.1 + rng.f32() * 0.5],
            rotation_center: [rng.f32(), rng.f32()],
            rotation_in_radians: (rng.f32() * 2.0 - 1.0) * std::f32::consts::PI,
            flip: rng.bool(),
        }
    }

    #[test]
    fn global_local_roundtrip() {
        let mut rng = fastrand::Rng::with_seed(1234);
        for _ in 0..200 {
            let aspect = AspectRatio::new(rng.u32(240..1920), rng.u32(240..1080)).unwrap();
            let transform = random_transform(&mut rng);
            let points = (0..NUM_LANDMARKS)
                .map(|_| [rng.f32(), rng.f32()])
                .collect::<Vec<_>>();

            let local = to_model_local(&transform, aspect, &points).unwrap();
            let global = to_global_coordinates(&transform, aspect, &local);
            for (a, b) in zip_exact(&points, &global) {
                assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-3);
                assert_abs_diff_eq!(a[1], b[1], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn full_frame_is_identity() {
        let points = [[0.1, 0.2], [0.9, 0.5]];
        let global = to_global_coordinates(
            &TransformDescriptor::full_frame(),
            AspectRatio::new(4, 3).unwrap(),
            &points,
        );
        for (a, b) in zip_exact(&points, &global) {
            assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-6);
            assert_abs_diff_eq!(a[1], b[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn model_local_matches_preprocessor() {
        let (width, height) = (64, 48);
        let mut frame = Image::filled((width, height), Color::BLACK);
        for y in 20..23 {
            for x in 40..43 {
                frame.set(x, y, Color::RED);
            }
        }
        let marker = [41.5 / width as f32, 21.5 / height as f32];

        let aspect = frame.resolution().aspect_ratio().unwrap();
        let transform = TransformDescriptor {
            top_left: [0.2, 0.1],
            bottom_right: [0.9, 0.9],
            rotation_center: [0.5, 0.5],
            rotation_in_radians: 0.4,
            flip: false,
        };
        let mut pre = FramePreprocessor::new((64, 64));
        let out = pre
            .preprocess(&frame, &transform, PaddingMode::Stretch)
            .unwrap();

        let local = to_model_local(&out.transform, aspect, &[marker]).unwrap()[0];
        assert!((0.0..1.0).contains(&local[0]) && (0.0..1.0).contains(&local[1]));
        let (u, v) = ((local[0] * 64.0) as u32, (local[1] * 64.0) as u32);
        assert_eq!(out.image.get(u, v), Color::RED);
    }

    #[test]
    fn padding() {
        let coords = vec![[0.0, 0.0], [0.3, 0.7], [1.0, 1.0]];
        assert_eq!(apply_padding(0.0, &coords).unwrap(), coords);

        let padded = apply_padding(0.1, &[[0.1, 0.1], [0.5, 0.5], [0.9, 0.9]]).unwrap();
        assert_abs_diff_eq!(padded[0][0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(padded[1][1], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(padded[2][0], 1.0, epsilon = 1e-6);

        assert_eq!(
            apply_padding(0.5, &coords),
            Err(GeometryError::DegenerateBox)
        );
    }

    #[test]
    fn mirror_is_involution() {
        let coords = vec![[0.0, 0.0], [0.25, 0.7], [1.0, 0.5]];
        assert_eq!(mirror_horizontally(&mirror_horizontally(&coords)), coords);
        assert_eq!(mirror_horizontally(&coords)[1], [0.75, 0.7]);
    }

    #[test]
    fn reorder_is_bijection() {
        let labeled = (0..NUM_LANDMARKS)
            .map(|i| [i as f32, 0.0])
            .collect::<Vec<_>>();
        let friendly = reorder_user_friendly(&labeled).unwrap();
        assert_eq!(reorder_native(&friendly).unwrap(), labeled);

        assert_eq!(friendly[HandLandmark::ThumbCmc as usize], [4.0, 0.0]);
        assert_eq!(friendly[HandLandmark::IndexFingerMcp as usize], [0.0, 0.0]);
        assert_eq!(friendly[HandLandmark::PinkyTip as usize], [18.0, 0.0]);
        assert_eq!(friendly[HandLandmark::Wrist as usize], [20.0, 0.0]);

        assert_eq!(
            reorder_user_friendly(&labeled[..20]),
            Err(GeometryError::InvalidInput {
                expected: 21,
                actual: 20
            })
        );
    }

    #[test]
    fn presence_is_inverted() {
        let result = assemble_result(vec![[0.5, 0.5]], &[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(result.is_hand_present_prob, 1.0 - 0.3);
        assert_eq!(result.poses.pinch_prob, 0.1);
        assert_eq!(result.poses.fist_prob, 0.2);
        assert_eq!(result.is_left_hand_prob, 0.4);

        let result = assemble_result(vec![], &[0.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(result.is_hand_present_prob, 0.0);

        assert_eq!(
            assemble_result(vec![], &[0.0, 0.0, 1.0]),
            Err(GeometryError::InvalidInput {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn serializes_camel_case() {
        let result = assemble_result(vec![[0.5, 0.25]], &[0.0, 1.0, 0.5, 0.0]).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isHandPresentProb"], 0.5);
        assert_eq!(json["poses"]["fistProb"], 1.0);
        assert_eq!(json["coordinates"][0][1], 0.25);
    }
}
