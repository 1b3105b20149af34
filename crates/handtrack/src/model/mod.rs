//! The model interface consumed by the tracking engine.
//!
//! The engine talks to its box and landmark models through the [`Model`] trait. Implementations
//! exist for ONNX networks executed on the CPU ([`OnnxModel`]) and for arbitrary closures
//! ([`FnModel`], created with [`model_fn`]), which is how foreign runtimes and test stubs are
//! plugged in.

mod onnx;
pub mod tensor;

use std::{borrow::Cow, fmt, ops::RangeInclusive};

use handtrack_image::{Color, Image, Resolution};

use crate::math::Coord;
use tensor::Tensor;

pub use onnx::{Loader, OnnxModel, OutputLayout};

/// A neural network (or anything pretending to be one) that estimates points and class
/// probabilities from an image.
pub trait Model: Send {
    /// Returns the resolution of input images expected by the model.
    fn input_resolution(&self) -> Resolution;

    /// Runs the model on `input`.
    ///
    /// The returned coordinates must be relative to the input image, ie. in range 0.0 to 1.0.
    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<ModelResult>;
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn input_resolution(&self) -> Resolution {
        (**self).input_resolution()
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<ModelResult> {
        (**self).infer(input)
    }
}

/// Input passed to a [`Model`].
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    /// An image of the model's input resolution.
    Image(&'a Image),
    /// A tensor that has already been laid out the way the model expects.
    Tensor(&'a Tensor),
}

impl<'a> ModelInput<'a> {
    /// Converts this input into a tensor.
    ///
    /// Images are resampled to `resolution` and their colors converted with `color_mapper`.
    /// Tensors are passed through unchanged.
    pub fn to_tensor(
        &self,
        layout: InputLayout,
        resolution: Resolution,
        color_mapper: &ColorMapper,
    ) -> Cow<'a, Tensor> {
        let image = match *self {
            ModelInput::Image(image) => image,
            ModelInput::Tensor(tensor) => return Cow::Borrowed(tensor),
        };

        let (h, w) = (resolution.height() as usize, resolution.width() as usize);
        let sample = |x: usize, y: usize| {
            let x = (x * image.width() as usize / w) as u32;
            let y = (y * image.height() as usize / h) as u32;
            color_mapper.map(image.get(x, y))
        };

        let tensor = match layout {
            InputLayout::NCHW => {
                Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| sample(x, y)[c])
            }
            InputLayout::NHWC => {
                Tensor::from_array_shape_fn([1, h, w, 3], |[_, y, x, c]| sample(x, y)[c])
            }
        };
        Cow::Owned(tensor)
    }
}

/// Points and class probabilities estimated by a [`Model`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelResult {
    /// Estimated points, relative to the model input (in range 0.0 to 1.0).
    pub coordinates: Vec<Coord>,
    /// Class probabilities. Their meaning depends on the model.
    pub classes: Vec<f32>,
}

impl ModelResult {
    /// Creates a result from raw network output in range -1.0 to 1.0, rescaling the coordinates to
    /// 0.0 to 1.0.
    pub fn from_raw(coordinates: Vec<Coord>, classes: Vec<f32>) -> Self {
        Self::rescaled(coordinates, classes, -1.0..=1.0)
    }

    /// Creates a result from network output whose coordinates span `range`.
    pub fn rescaled(
        coordinates: Vec<Coord>,
        classes: Vec<f32>,
        range: RangeInclusive<f32>,
    ) -> Self {
        let (start, end) = (*range.start(), *range.end());
        let coordinates = coordinates
            .into_iter()
            .map(|p| p.map(|v| (v - start) / (end - start)))
            .collect();
        Self {
            coordinates,
            classes,
        }
    }
}

/// A [`Model`] backed by a closure.
pub struct FnModel<F> {
    resolution: Resolution,
    f: F,
}

/// Creates a [`Model`] that invokes `f` for inference.
///
/// `resolution` is the input resolution reported to the engine.
pub fn model_fn<F>(resolution: impl Into<Resolution>, f: F) -> FnModel<F>
where
    F: FnMut(ModelInput<'_>) -> anyhow::Result<ModelResult> + Send,
{
    FnModel {
        resolution: resolution.into(),
        f,
    }
}

impl<F> Model for FnModel<F>
where
    F: FnMut(ModelInput<'_>) -> anyhow::Result<ModelResult> + Send,
{
    fn input_resolution(&self) -> Resolution {
        self.resolution
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<ModelResult> {
        (self.f)(input)
    }
}

impl<F> fmt::Debug for FnModel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel")
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

enum ColorMapperKind {
    Linear { target_range: RangeInclusive<f32> },
}

/// Maps image colors to the values a network expects as input.
pub struct ColorMapper {
    kind: ColorMapperKind,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range. Networks rarely document which color space they expect, and sRGB is what they
    /// usually get trained on.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        let start = *target_range.start();
        let end = *target_range.end();
        assert!(end > start);

        Self {
            kind: ColorMapperKind::Linear { target_range },
        }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        match &self.kind {
            ColorMapperKind::Linear { target_range } => {
                let start = *target_range.start();
                let end = *target_range.end();

                let adjust_range = (end - start) / 255.0;
                let rgb = [color.r(), color.g(), color.b()];
                rgb.map(|col| col as f32 * adjust_range + start)
            }
        }
    }
}

impl Default for ColorMapper {
    fn default() -> Self {
        Self::linear(0.0..=1.0)
    }
}

/// Describes in what order a network expects its input image data.
///
/// - `N` is the number of images, always 1 here.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InputLayout {
    /// Shape is `[N, C, H, W]`.
    #[default]
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}
