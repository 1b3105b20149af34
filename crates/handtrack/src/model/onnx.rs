use std::{borrow::Cow, ops::RangeInclusive, path::Path, sync::Arc};

use handtrack_image::Resolution;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TypedFact, TypedOp,
};

use super::{tensor::Tensor, ColorMapper, InputLayout, Model, ModelInput, ModelResult};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Describes which network outputs hold the estimated points and class probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    /// Index of the output tensor holding the coordinates.
    pub coordinates: usize,
    /// Number of consecutive values per point in the coordinate tensor.
    ///
    /// Only the first two (X and Y) are used.
    pub values_per_point: usize,
    /// Indices of the output tensors holding class probabilities, in the order they should appear
    /// in [`ModelResult::classes`].
    pub classes: Vec<usize>,
    /// Range spanned by the raw coordinates, which gets mapped to 0.0 to 1.0.
    pub coordinate_range: RangeInclusive<f32>,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            coordinates: 0,
            values_per_point: 2,
            classes: vec![1],
            coordinate_range: -1.0..=1.0,
        }
    }
}

/// ONNX model loader.
pub struct Loader<'a> {
    model_data: Cow<'a, [u8]>,
    input_layout: InputLayout,
    color_mapper: ColorMapper,
    output_layout: OutputLayout,
}

impl<'a> Loader<'a> {
    fn new(data: Cow<'a, [u8]>) -> Self {
        Self {
            model_data: data,
            input_layout: InputLayout::default(),
            color_mapper: ColorMapper::default(),
            output_layout: OutputLayout::default(),
        }
    }

    /// Sets the layout of the network's input tensor (defaults to [`InputLayout::NCHW`]).
    pub fn with_input_layout(mut self, layout: InputLayout) -> Self {
        self.input_layout = layout;
        self
    }

    /// Sets the mapping from image colors to input values (defaults to the range 0.0 to 1.0).
    pub fn with_color_mapper(mut self, color_mapper: ColorMapper) -> Self {
        self.color_mapper = color_mapper;
        self
    }

    /// Sets how the network's outputs are interpreted.
    pub fn with_output_layout(mut self, layout: OutputLayout) -> Self {
        self.output_layout = layout;
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network uses unimplemented
    /// operations, or if it does not have exactly one input matching the configured
    /// [`InputLayout`].
    pub fn load(self) -> anyhow::Result<OnnxModel> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let plan = SimplePlan::new(graph)?;

        let input_res = input_resolution(&plan, self.input_layout)?;
        let num_outputs = plan.model().outputs.len();
        let layout = &self.output_layout;
        if let Some(&index) = std::iter::once(&layout.coordinates)
            .chain(&layout.classes)
            .find(|&&i| i >= num_outputs)
        {
            anyhow::bail!("output index {index} out of range, network has {num_outputs} outputs");
        }
        if layout.values_per_point < 2 {
            anyhow::bail!(
                "need at least 2 values per point, got {}",
                layout.values_per_point
            );
        }

        log::debug!(
            "loaded ONNX model with {} input, {} outputs",
            input_res,
            num_outputs
        );

        Ok(OnnxModel {
            plan: Arc::new(plan),
            input_res,
            input_layout: self.input_layout,
            color_mapper: Arc::new(self.color_mapper),
            output_layout: self.output_layout,
        })
    }
}

fn input_resolution(plan: &Plan, layout: InputLayout) -> anyhow::Result<Resolution> {
    let model = plan.model();
    if model.inputs.len() != 1 {
        anyhow::bail!(
            "model has to take exactly 1 input, this one takes {}",
            model.inputs.len(),
        );
    }

    let fact = model.input_fact(0)?;
    let Some(shape) = fact.shape.as_concrete() else {
        anyhow::bail!("model input has symbolic shape {:?}", fact.shape);
    };

    let (w, h) = match (layout, shape) {
        (InputLayout::NCHW, [1, 3, h, w]) | (InputLayout::NHWC, [1, h, w, 3]) => (*w, *h),
        _ => {
            anyhow::bail!("invalid model input shape for {:?} layout: {:?}", layout, shape);
        }
    };

    let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
    Ok(Resolution::new(w, h))
}

/// An ONNX network executed on the CPU.
///
/// This is a cheaply [`Clone`]able handle to the optimized network.
#[derive(Clone)]
pub struct OnnxModel {
    plan: Arc<Plan>,
    input_res: Resolution,
    input_layout: InputLayout,
    color_mapper: Arc<ColorMapper>,
    output_layout: OutputLayout,
}

impl OnnxModel {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<'a, P: AsRef<Path>>(path: P) -> anyhow::Result<Loader<'a>> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl<'a>(path: &Path) -> anyhow::Result<Loader<'a>> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!("model file must have `.onnx` extension"),
        }

        let model_data = std::fs::read(path)?;
        Ok(Loader::new(model_data.into()))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> Loader<'_> {
        Loader::new(raw.into())
    }

    fn run(&self, input: &Tensor) -> anyhow::Result<Vec<Tensor>> {
        let outputs = self
            .plan
            .run(tvec![TValue::from_const(Arc::new(input.to_tract()?))])?;
        outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect()
    }
}

impl Model for OnnxModel {
    fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<ModelResult> {
        let tensor = input.to_tensor(self.input_layout, self.input_res, &self.color_mapper);
        let outputs = self.run(&tensor)?;
        let layout = &self.output_layout;

        let raw = outputs[layout.coordinates].as_slice();
        if raw.len() % layout.values_per_point != 0 {
            anyhow::bail!(
                "coordinate output of shape {:?} does not hold points with {} values each",
                outputs[layout.coordinates].shape(),
                layout.values_per_point,
            );
        }
        let coordinates = raw
            .chunks_exact(layout.values_per_point)
            .map(|point| [point[0], point[1]])
            .collect();

        let classes = layout
            .classes
            .iter()
            .flat_map(|&i| outputs[i].as_slice().iter().copied())
            .collect();

        Ok(ModelResult::rescaled(
            coordinates,
            classes,
            layout.coordinate_range.clone(),
        ))
    }
}
