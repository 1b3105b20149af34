//! 2D vector and rotation math.
//!
//! All functions here are pure. Points are plain `[x, y]` pairs ([`Coord`]), usually in
//! frame-relative coordinates where `[0, 0]` is the top left and `[1, 1]` the bottom right corner
//! of the image (so Y points *down*).

use handtrack_image::AspectRatio;
use nalgebra::{Matrix2x3, Rotation2, Vector2};

use crate::{error::GeometryError, iter::zip_exact};

/// A 2D point or vector.
pub type Coord = [f32; 2];

fn elementwise(
    a: &[f32],
    b: &[f32],
    op: impl Fn(f32, f32) -> f32,
) -> Result<Vec<f32>, GeometryError> {
    if a.len() != b.len() {
        return Err(GeometryError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(zip_exact(a, b).map(|(&a, &b)| op(a, b)).collect())
}

/// Element-wise `a + b`.
pub fn add(a: &[f32], b: &[f32]) -> Result<Vec<f32>, GeometryError> {
    elementwise(a, b, |a, b| a + b)
}

/// Element-wise `a - b`.
pub fn sub(a: &[f32], b: &[f32]) -> Result<Vec<f32>, GeometryError> {
    elementwise(a, b, |a, b| a - b)
}

/// Element-wise `a * b`.
pub fn mul(a: &[f32], b: &[f32]) -> Result<Vec<f32>, GeometryError> {
    elementwise(a, b, |a, b| a * b)
}

/// Element-wise `a / b`.
pub fn div(a: &[f32], b: &[f32]) -> Result<Vec<f32>, GeometryError> {
    elementwise(a, b, |a, b| a / b)
}

/// Returns the L2 norm (length) of `v`.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Returns the Euclidean distance between `a` and `b`.
pub fn distance(a: &[f32], b: &[f32]) -> Result<f32, GeometryError> {
    Ok(norm(&sub(a, b)?))
}

/// Scales `v` to unit length.
///
/// Returns [`GeometryError::ZeroLengthVector`] if `v` has length 0 (or is not finite).
pub fn normalize(v: &[f32]) -> Result<Vec<f32>, GeometryError> {
    let len = norm(v);
    if len == 0.0 || !len.is_finite() {
        return Err(GeometryError::ZeroLengthVector);
    }
    Ok(v.iter().map(|x| x / len).collect())
}

/// Builds the 2x3 affine matrix rotating points by `angle_degrees` around `center` and scaling
/// them by `scale`.
///
/// This follows the convention of OpenCV's `getRotationMatrix2D`: in an image coordinate system
/// (Y pointing down), a positive angle rotates *counterclockwise*. Apply the matrix to homogeneous
/// points `[x, y, 1]`.
pub fn compute_rotation_matrix_2d(center: Coord, angle_degrees: f32, scale: f32) -> Matrix2x3<f32> {
    let radians = angle_degrees.to_radians();
    let alpha = scale * radians.cos();
    let beta = scale * radians.sin();
    let [cx, cy] = center;

    #[rustfmt::skip]
    let m = Matrix2x3::new(
        alpha, beta, (1.0 - alpha) * cx - beta * cy,
        -beta, alpha, beta * cx + (1.0 - alpha) * cy,
    );
    m
}

/// A rotation around a center point, expressed in frame-relative coordinates.
///
/// Relative coordinates are anisotropic when the frame isn't square: a step of 0.1 along X covers
/// more pixels than a step of 0.1 along Y in a landscape frame. Rotating such points directly
/// would shear them. This type first stretches X by the frame's aspect ratio, rotates, and then
/// undoes the stretch, which is equivalent to rotating in pixel space.
///
/// Positive angles rotate *clockwise* (as seen on screen, with Y pointing down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatioAwareRotation {
    rotation: Rotation2<f32>,
    center: Coord,
    x_scale: f32,
}

impl AspectRatioAwareRotation {
    pub fn new(radians: f32, center: Coord, aspect_ratio: AspectRatio) -> Self {
        Self {
            rotation: Rotation2::new(radians),
            center,
            x_scale: aspect_ratio.as_f32(),
        }
    }

    /// Returns the clockwise rotation angle in radians.
    pub fn radians(&self) -> f32 {
        self.rotation.angle()
    }

    /// Rotates `coords` by the rotation angle.
    pub fn apply(&self, coords: &[Coord]) -> Vec<Coord> {
        coords
            .iter()
            .map(|&p| self.rotate(&self.rotation, p))
            .collect()
    }

    /// Rotates `coords` by the negated rotation angle, undoing [`AspectRatioAwareRotation::apply`].
    pub fn apply_reverse(&self, coords: &[Coord]) -> Vec<Coord> {
        let inverse = self.rotation.inverse();
        coords.iter().map(|&p| self.rotate(&inverse, p)).collect()
    }

    fn rotate(&self, rotation: &Rotation2<f32>, [x, y]: Coord) -> Coord {
        let center = Vector2::new(self.center[0] * self.x_scale, self.center[1]);
        let p = Vector2::new(x * self.x_scale, y);
        let q = rotation * (p - center) + center;
        [q.x / self.x_scale, q.y]
    }
}

/// The points of a coordinate list that attain the extreme X and Y values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrema {
    pub min_x: Coord,
    pub max_x: Coord,
    pub min_y: Coord,
    pub max_y: Coord,
}

impl Extrema {
    /// Returns the top left corner of the axis-aligned bounding box of the points.
    pub fn top_left(&self) -> Coord {
        [self.min_x[0], self.min_y[1]]
    }

    /// Returns the bottom right corner of the axis-aligned bounding box of the points.
    pub fn bottom_right(&self) -> Coord {
        [self.max_x[0], self.max_y[1]]
    }
}

/// Finds the points with minimal and maximal X and Y coordinates.
///
/// Ties are resolved in favor of the point that comes first in `coords`.
///
/// Returns [`None`] if `coords` is empty.
pub fn compute_extremum_coords(coords: &[Coord]) -> Option<Extrema> {
    let (&first, rest) = coords.split_first()?;
    let mut ext = Extrema {
        min_x: first,
        max_x: first,
        min_y: first,
        max_y: first,
    };
    for &p in rest {
        if p[0] < ext.min_x[0] {
            ext.min_x = p;
        }
        if p[0] > ext.max_x[0] {
            ext.max_x = p;
        }
        if p[1] < ext.min_y[1] {
            ext.min_y = p;
        }
        if p[1] > ext.max_y[1] {
            ext.max_y = p;
        }
    }
    Some(ext)
}

/// Mirrors relative coordinates along the vertical center line of the frame.
pub fn flip_coords_horizontally(coords: &[Coord]) -> Vec<Coord> {
    coords.iter().map(|&[x, y]| [1.0 - x, y]).collect()
}

/// Maps `coords` from the coordinate system of `rect` (where `[0, 0]` and `[1, 1]` are its top
/// left and bottom right corners) to the enclosing coordinate system.
pub fn coords_outside_box(rect: [Coord; 2], coords: &[Coord]) -> Vec<Coord> {
    let [tl, br] = rect;
    let size = [br[0] - tl[0], br[1] - tl[1]];
    coords
        .iter()
        .map(|&[x, y]| [tl[0] + x * size[0], tl[1] + y * size[1]])
        .collect()
}

/// Maps `coords` from the enclosing coordinate system into the coordinate system of `rect`.
///
/// This is the inverse of [`coords_outside_box`]. Returns [`GeometryError::DegenerateBox`] if
/// `rect` has no area.
pub fn coords_inside_box(rect: [Coord; 2], coords: &[Coord]) -> Result<Vec<Coord>, GeometryError> {
    let [tl, br] = rect;
    let size = [br[0] - tl[0], br[1] - tl[1]];
    if !(size[0] > 0.0 && size[1] > 0.0) {
        return Err(GeometryError::DegenerateBox);
    }
    Ok(coords
        .iter()
        .map(|&[x, y]| [(x - tl[0]) / size[0], (y - tl[1]) / size[1]])
        .collect())
}
