//! Rectangle types.
//!
//! These are used by the preprocessor to describe crop windows in pixel space.

use std::fmt;

use crate::AspectRatio;

/// An axis-aligned rectangle.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: [f32; 2],
    size: [f32; 2],
}

impl Rect {
    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: [x_center, y_center],
            size: [width, height],
        }
    }

    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self::from_center(
            top_left_x + width * 0.5,
            top_left_y + height * 0.5,
            width,
            height,
        )
    }

    /// Creates a rectangle spanning from `top_left` to `bottom_right`.
    ///
    /// Returns [`None`] if `bottom_right` lies above or to the left of `top_left`.
    pub fn from_corners(top_left: [f32; 2], bottom_right: [f32; 2]) -> Option<Self> {
        let [x_min, y_min] = top_left;
        let [x_max, y_max] = bottom_right;
        if !(x_min <= x_max && y_min <= y_max) {
            return None;
        }
        Some(Self::from_top_left(x_min, y_min, x_max - x_min, y_max - y_min))
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio.
    ///
    /// # Panics
    ///
    /// This method will panic if `self` has a width or height of 0.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        assert!(
            self.width() > 0.0 && self.height() > 0.0,
            "cannot fit aspect ratio of empty rectangle {:?}",
            self
        );

        let mut res = *self;
        let target_width = self.height() * target_aspect.as_f32();
        if target_width >= self.width() {
            res.size[0] = target_width;
        } else {
            res.size[1] = self.width() / target_aspect.as_f32();
        }

        res
    }

    #[inline]
    pub fn top_left(&self) -> [f32; 2] {
        [
            self.center[0] - self.size[0] * 0.5,
            self.center[1] - self.size[1] * 0.5,
        ]
    }

    #[inline]
    pub fn bottom_right(&self) -> [f32; 2] {
        [
            self.center[0] + self.size[0] * 0.5,
            self.center[1] + self.size[1] * 0.5,
        ]
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.top_left()[0]
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.top_left()[1]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size[0]
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size[1]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.size[0] * self.size[1]
    }

    #[inline]
    pub fn center(&self) -> [f32; 2] {
        self.center
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.center[0], self.center[1], self.size[0], self.size[1]
        )
    }
}
