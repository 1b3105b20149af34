//! Tensor API.
//!
//! Tensors are the inputs and outputs of neural networks. Here they only ever hold `f32` data in
//! row-major order.

use std::fmt;

use tinyvec::TinyVec;

/// A dynamically shaped, dense tensor of `f32` values.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: TinyVec<[usize; 4]>,
    data: Box<[f32]>,
}

impl Tensor {
    /// Creates an `N`-dimensional tensor of the given shape by calling `f` for each element.
    ///
    /// This will invoke `f` with successive indices to fill, starting with `[0, ..., 0, 0]`, then
    /// `[0, ..., 0, 1]` and so on.
    pub fn from_array_shape_fn<const N: usize, F: FnMut([usize; N]) -> f32>(
        shape: [usize; N],
        mut f: F,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));

            // Increment the index, last dimension first.
            for (i, size) in index.iter_mut().zip(shape).rev() {
                *i += 1;
                if *i < size {
                    break;
                }
                *i = 0;
            }
        }

        Self {
            shape: TinyVec::from(&shape[..]),
            data: data.into_boxed_slice(),
        }
    }

    /// Creates a tensor from row-major data.
    ///
    /// Returns an error if the length of `data` does not match `shape`.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> anyhow::Result<Self> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            anyhow::bail!(
                "tensor of shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len(),
            );
        }

        Ok(Self {
            shape: TinyVec::from(shape),
            data: data.into_boxed_slice(),
        })
    }

    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        Self::from_vec(tract.shape(), tract.as_slice::<f32>()?.to_vec())
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        tract_onnx::prelude::Tensor::from_shape(self.shape(), &self.data)
    }

    /// Returns the shape of this tensor.
    ///
    /// A tensor's shape is the number of entries in each dimension.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions of this tensor.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns all values of the tensor, in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the element at `index`, or [`None`] if it is out of bounds or has the wrong number
    /// of dimensions.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.rank() {
            return None;
        }

        let mut offset = 0;
        for (&i, &size) in index.iter().zip(self.shape()) {
            if i >= size {
                return None;
            }
            offset = offset * size + i;
        }
        Some(self.data[offset])
    }
}

impl From<&[f32]> for Tensor {
    fn from(slice: &[f32]) -> Self {
        Tensor::from_array_shape_fn([slice.len()], |[i]| slice[i])
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .finish()
    }
}
