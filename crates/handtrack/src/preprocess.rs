//! Cropping and rotating frames into model input images.

use handtrack_image::{rect::Rect, Color, Image, Resolution};
use nalgebra::{Matrix3, Vector2, Vector3};

use crate::{error::GeometryError, geometry::TransformDescriptor, math};

/// How to deal with crop boxes whose aspect ratio differs from the model input's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingMode {
    /// Stretch the crop box to fill the whole model input.
    Stretch,
    /// Grow the crop box symmetrically along its shorter axis until it matches the aspect ratio of
    /// the model input, and clear the added strips to [`Color::NONE`].
    FitAspect,
}

/// The result of [`FramePreprocessor::preprocess`].
#[derive(Debug)]
pub struct Preprocessed<'a> {
    /// The model input image.
    pub image: &'a Image,
    /// The transform that maps the frame onto `image`.
    ///
    /// This differs from the requested transform if padding was added, and must be used when
    /// mapping model output back to the frame.
    pub transform: TransformDescriptor,
}

/// Renders transformed crops of frames into a reusable model input image.
///
/// The target image is owned by the preprocessor and overwritten completely by every call to
/// [`FramePreprocessor::preprocess`]. Since that requires `&mut self`, at most one preprocessing
/// operation per instance can be in flight.
pub struct FramePreprocessor {
    target: Image,
}

impl FramePreprocessor {
    /// Creates a preprocessor that outputs images of the given resolution.
    pub fn new(resolution: impl Into<Resolution>) -> Self {
        Self {
            target: Image::new(resolution),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.target.resolution()
    }

    /// Returns the image produced by the last call to [`FramePreprocessor::preprocess`].
    pub fn image(&self) -> &Image {
        &self.target
    }

    /// Maps the region of `frame` described by `transform` onto the target image.
    ///
    /// The region is scaled to cover the target (with [`PaddingMode::Stretch`]) or to fit inside
    /// it (with [`PaddingMode::FitAspect`]). Pixels that map outside of `frame` are set to
    /// [`Color::NONE`].
    ///
    /// Returns [`GeometryError::DegenerateBox`] if the transform's box has no area.
    pub fn preprocess(
        &mut self,
        frame: &Image,
        transform: &TransformDescriptor,
        padding: PaddingMode,
    ) -> Result<Preprocessed<'_>, GeometryError> {
        self.target.clear(Color::NONE);

        transform.validate()?;
        let (fw, fh) = (frame.width() as f32, frame.height() as f32);
        let (tw, th) = (self.target.width() as f32, self.target.height() as f32);
        let target_aspect = self
            .target
            .resolution()
            .aspect_ratio()
            .ok_or(GeometryError::DegenerateBox)?;

        let crop = Rect::from_corners(
            [transform.top_left[0] * fw, transform.top_left[1] * fh],
            [transform.bottom_right[0] * fw, transform.bottom_right[1] * fh],
        )
        .ok_or(GeometryError::DegenerateBox)?;
        if !(crop.width() > 0.0 && crop.height() > 0.0) {
            return Err(GeometryError::DegenerateBox);
        }

        let padded = match padding {
            PaddingMode::Stretch => crop,
            PaddingMode::FitAspect => crop.grow_to_fit_aspect(target_aspect),
        };

        let mut used = *transform;
        let [x0, y0] = padded.top_left();
        let [x1, y1] = padded.bottom_right();
        used.top_left = [x0 / fw, y0 / fh];
        used.bottom_right = [x1 / fw, y1 / fh];

        let forward = frame_to_target_matrix(&used, frame.resolution(), self.target.resolution());
        let inverse = forward.try_inverse().ok_or(GeometryError::DegenerateBox)?;

        for v in 0..self.target.height() {
            for u in 0..self.target.width() {
                let p = inverse * Vector3::new(u as f32 + 0.5, v as f32 + 0.5, 1.0);
                let (x, y) = (p.x.floor() as i64, p.y.floor() as i64);
                self.target.set(u, v, frame.get_or_none(x, y));
            }
        }

        if padding == PaddingMode::FitAspect {
            // Where the unpadded crop ended up in the target image.
            let scale = [tw / padded.width(), th / padded.height()];
            let [cx0, cy0] = crop.top_left();
            let [cx1, cy1] = crop.bottom_right();
            let left = (cx0 - x0) * scale[0];
            let right = (cx1 - x0) * scale[0];
            let top = (cy0 - y0) * scale[1];
            let bottom = (cy1 - y0) * scale[1];

            let (first_col, end_col) = inside_pixel_range(left, right);
            let (first_row, end_row) = inside_pixel_range(top, bottom);
            self.target.clear_columns(0..first_col, Color::NONE);
            self.target.clear_columns(end_col..u32::MAX, Color::NONE);
            self.target.clear_rows(0..first_row, Color::NONE);
            self.target.clear_rows(end_row..u32::MAX, Color::NONE);
        }

        Ok(Preprocessed {
            image: &self.target,
            transform: used,
        })
    }
}

/// Returns the range of pixels whose centers lie in `start..=end`.
fn inside_pixel_range(start: f32, end: f32) -> (u32, u32) {
    let first = (start - 0.5).ceil().max(0.0) as u32;
    let end = ((end - 0.5).floor() + 1.0).max(0.0) as u32;
    (first, end.max(first))
}

/// Computes the matrix mapping frame pixel coordinates to target pixel coordinates.
///
/// The operations are applied to frame points in this order: optional flip, rotation around the
/// rotation center, translation of the box's top left corner to the origin, and scaling of the box
/// to the target size.
fn frame_to_target_matrix(
    transform: &TransformDescriptor,
    frame: Resolution,
    target: Resolution,
) -> Matrix3<f32> {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    let box_size = [transform.width() * fw, transform.height() * fh];

    let scale = Matrix3::new_nonuniform_scaling(&Vector2::new(
        target.width() as f32 / box_size[0],
        target.height() as f32 / box_size[1],
    ));
    let translate = Matrix3::new_translation(&Vector2::new(
        -transform.top_left[0] * fw,
        -transform.top_left[1] * fh,
    ));

    // `compute_rotation_matrix_2d` rotates counterclockwise, the descriptor stores a clockwise
    // angle.
    let center = [
        transform.rotation_center[0] * fw,
        transform.rotation_center[1] * fh,
    ];
    let r = math::compute_rotation_matrix_2d(
        center,
        -transform.rotation_in_radians.to_degrees(),
        1.0,
    );
    #[rustfmt::skip]
    let rotate = Matrix3::new(
        r[(0, 0)], r[(0, 1)], r[(0, 2)],
        r[(1, 0)], r[(1, 1)], r[(1, 2)],
        0.0, 0.0, 1.0,
    );

    let flip = if transform.flip {
        #[rustfmt::skip]
        let m = Matrix3::new(
            -1.0, 0.0, fw,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        );
        m
    } else {
        Matrix3::identity()
    };

    scale * translate * rotate * flip
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    /// Creates an image where every pixel has a distinct color.
    fn gradient(width: u32, height: u32) -> Image {
        let mut image = Image::new((width, height));
        for y in 0..height {
            for x in 0..width {
                image.set(x, y, Color::from_rgb8(x as u8 * 10, y as u8 * 10, 255));
            }
        }
        image
    }

    fn assert_images_eq(a: &Image, b: &Image) {
        assert_eq!(a.resolution(), b.resolution());
        for y in 0..a.height() {
            for x in 0..a.width() {
                assert_eq!(a.get(x, y), b.get(x, y), "pixel mismatch at {x},{y}");
            }
        }
    }

    #[test]
    fn identity() {
        let frame = gradient(8, 6);
        let mut pre = FramePreprocessor::new((8, 6));
        let out = pre
            .preprocess(&frame, &TransformDescriptor::full_frame(), PaddingMode::Stretch)
            .unwrap();
        assert_eq!(out.transform, TransformDescriptor::full_frame());
        assert_images_eq(out.image, &frame);
    }

    #[test]
    fn crop_quadrant() {
        let frame = gradient(4, 4);
        let mut pre = FramePreprocessor::new((2, 2));
        let transform = TransformDescriptor {
            top_left: [0.5, 0.5],
            bottom_right: [1.0, 1.0],
            ..TransformDescriptor::full_frame()
        };
        let out = pre
            .preprocess(&frame, &transform, PaddingMode::Stretch)
            .unwrap();
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(out.image.get(x, y), frame.get(x + 2, y + 2));
            }
        }
    }

    #[test]
    fn downscale() {
        let frame = gradient(8, 8);
        let mut pre = FramePreprocessor::new((4, 4));
        let out = pre
            .preprocess(&frame, &TransformDescriptor::full_frame(), PaddingMode::Stretch)
            .unwrap();
        // Nearest-neighbor sampling of the pixel centers.
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(out.image.get(x, y), frame.get(2 * x + 1, 2 * y + 1));
            }
        }
    }

    #[test]
    fn rotate_clockwise() {
        let frame = gradient(3, 3);
        let mut pre = FramePreprocessor::new((3, 3));
        let transform = TransformDescriptor {
            rotation_in_radians: FRAC_PI_2,
            ..TransformDescriptor::full_frame()
        };
        let out = pre
            .preprocess(&frame, &transform, PaddingMode::Stretch)
            .unwrap();
        // The pixel above the center moves to its right.
        assert_eq!(out.image.get(2, 1), frame.get(1, 0));
        assert_eq!(out.image.get(1, 2), frame.get(2, 1));
        assert_eq!(out.image.get(1, 1), frame.get(1, 1));
        assert_eq!(out.image.get(2, 0), frame.get(0, 0));
    }

    #[test]
    fn flip() {
        let frame = gradient(5, 2);
        let mut pre = FramePreprocessor::new((5, 2));
        let transform = TransformDescriptor {
            flip: true,
            ..TransformDescriptor::full_frame()
        };
        let out = pre
            .preprocess(&frame, &transform, PaddingMode::Stretch)
            .unwrap();
        for y in 0..2 {
            for x in 0..5 {
                assert_eq!(out.image.get(x, y), frame.get(4 - x, y));
            }
        }
    }

    #[test]
    fn overwrites_stale_pixels() {
        let mut pre = FramePreprocessor::new((4, 4));
        let red = Image::filled((4, 4), Color::RED);
        pre.preprocess(&red, &TransformDescriptor::full_frame(), PaddingMode::Stretch)
            .unwrap();
        assert_eq!(pre.image().get(0, 0), Color::RED);

        // The box extends past the right edge of the frame: those pixels must not keep the old
        // contents.
        let green = Image::filled((4, 4), Color::GREEN);
        let transform = TransformDescriptor {
            top_left: [0.5, 0.0],
            bottom_right: [1.5, 1.0],
            ..TransformDescriptor::full_frame()
        };
        let out = pre
            .preprocess(&green, &transform, PaddingMode::Stretch)
            .unwrap();
        for y in 0..4 {
            assert_eq!(out.image.get(0, y), Color::GREEN);
            assert_eq!(out.image.get(1, y), Color::GREEN);
            assert_eq!(out.image.get(2, y), Color::NONE);
            assert_eq!(out.image.get(3, y), Color::NONE);
        }
    }

    #[test]
    fn fit_aspect_clears_padding() {
        let frame = Image::filled((8, 8), Color::RED);
        let mut pre = FramePreprocessor::new((4, 4));
        // 4x2 pixels, padded to 4x4.
        let transform = TransformDescriptor {
            top_left: [0.25, 0.25],
            bottom_right: [0.75, 0.5],
            ..TransformDescriptor::full_frame()
        };
        let out = pre
            .preprocess(&frame, &transform, PaddingMode::FitAspect)
            .unwrap();

        assert_eq!(out.transform.top_left, [0.25, 0.125]);
        assert_eq!(out.transform.bottom_right, [0.75, 0.625]);
        for x in 0..4 {
            assert_eq!(out.image.get(x, 0), Color::NONE);
            assert_eq!(out.image.get(x, 1), Color::RED);
            assert_eq!(out.image.get(x, 2), Color::RED);
            assert_eq!(out.image.get(x, 3), Color::NONE);
        }
    }

    #[test]
    fn fit_aspect_full_frame() {
        let frame = Image::filled((8, 4), Color::BLUE);
        let mut pre = FramePreprocessor::new((4, 4));
        let out = pre
            .preprocess(&frame, &TransformDescriptor::full_frame(), PaddingMode::FitAspect)
            .unwrap();
        assert_eq!(out.transform.top_left, [0.0, -0.5]);
        assert_eq!(out.transform.bottom_right, [1.0, 1.5]);
        assert_eq!(out.image.get(0, 0), Color::NONE);
        assert_eq!(out.image.get(0, 1), Color::BLUE);
        assert_eq!(out.image.get(3, 2), Color::BLUE);
        assert_eq!(out.image.get(3, 3), Color::NONE);
    }

    #[test]
    fn degenerate_box() {
        let frame = Image::filled((4, 4), Color::RED);
        let mut pre = FramePreprocessor::new((4, 4));
        let transform = TransformDescriptor {
            bottom_right: [0.0, 1.0],
            ..TransformDescriptor::full_frame()
        };
        assert_eq!(
            pre.preprocess(&frame, &transform, PaddingMode::Stretch)
                .unwrap_err(),
            GeometryError::DegenerateBox
        );
        // The target is still cleared.
        assert_eq!(pre.image().get(0, 0), Color::NONE);
    }
}
