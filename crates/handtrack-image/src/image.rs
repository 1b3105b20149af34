use std::{fmt, io, path::Path};

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::{rect::Rect, Color, Resolution};

/// Errors that can occur while loading or creating an [`Image`].
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("invalid image path '{0}' (must have one of the supported extensions)")]
    UnsupportedFormat(String),
    #[error("incorrect buffer size {actual} for {res} image (expected {expected} bytes)")]
    BufferSize {
        res: Resolution,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy)]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> Result<Self, ImageError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => Err(ImageError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> Result<Self, ImageError> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> Result<Self, ImageError> {
        let format = ImageFormat::from_path(path)?;
        let data = std::fs::read(path)?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())?.to_rgba8();
        log::trace!("loaded {}x{} image from {}", buf.width(), buf.height(), path.display());
        Ok(Self { buf })
    }

    /// Creates an empty image of the given size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(res: impl Into<Resolution>) -> Self {
        let res = res.into();
        Self {
            buf: ImageBuffer::new(res.width(), res.height()),
        }
    }

    /// Returns a new [`Image`] of the given size, with every pixel initialized to `color`.
    pub fn filled(res: impl Into<Resolution>, color: Color) -> Self {
        let mut this = Self::new(res);
        this.clear(color);
        this
    }

    /// Creates an [`Image`] from raw, preexisting RGBA pixel data.
    ///
    /// `buf` needs to contain interleaved `r g b a` bytes, row by row. Its length needs to be
    /// exactly `width * height * 4`.
    pub fn from_rgba8(res: impl Into<Resolution>, buf: &[u8]) -> Result<Self, ImageError> {
        let res = res.into();
        let expected = res.num_pixels() as usize * 4;
        let error = ImageError::BufferSize {
            res,
            expected,
            actual: buf.len(),
        };
        if buf.len() != expected {
            return Err(error);
        }
        let buf = ImageBuffer::from_raw(res.width(), res.height(), buf.to_vec()).ok_or(error)?;
        Ok(Self { buf })
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering this image.
    ///
    /// The rectangle will be positioned at `(0, 0)` and have the width and height of the image.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf.get_pixel(x, y).0)
    }

    /// Gets the image color at signed pixel coordinates, returning [`Color::NONE`] for pixels
    /// outside of the image.
    #[inline]
    pub fn get_or_none(&self, x: i64, y: i64) -> Color {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            return Color::NONE;
        }
        self.get(x as u32, y as u32)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf.put_pixel(x, y, Rgba(color.0));
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Sets every pixel inside the given pixel column range to `color`.
    ///
    /// The range is clamped to the image bounds.
    pub fn clear_columns(&mut self, columns: std::ops::Range<u32>, color: Color) {
        let end = columns.end.min(self.width());
        for y in 0..self.height() {
            for x in columns.start.min(end)..end {
                self.set(x, y, color);
            }
        }
    }

    /// Sets every pixel inside the given pixel row range to `color`.
    ///
    /// The range is clamped to the image bounds.
    pub fn clear_rows(&mut self, rows: std::ops::Range<u32>, color: Color) {
        let end = rows.end.min(self.height());
        for y in rows.start.min(end)..end {
            for x in 0..self.width() {
                self.set(x, y, color);
            }
        }
    }

    /// Returns the raw pixel data, in `r g b a` order, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}
