mod conv;
mod dense;
mod layer;
mod pool;
mod relu;
mod residual;

pub use conv::Conv2d;
pub use dense::Dense;
pub use layer::Layer;
pub use pool::{GlobalAvgPool, MaxPool2d};
pub use relu::Relu;
pub use residual::Residual;

use ndarray::{Array2, Array4, Axis};

use crate::{MlErr, Result};

/// A named block of parameters, in the same order the layer reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorEntry {
    pub name: String,
    pub shape: Vec<usize>,
}

impl TensorEntry {
    pub fn new(name: impl Into<String>, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Returns the amount of scalars in this block.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flattens a (N, C, H, W) batch into a (N, C * H * W) matrix.
///
/// # Arguments
/// * `x` - The batch to flatten.
/// * `features` - The expected amount of features per sample.
///
/// # Returns
/// The flattened batch or a shape mismatch error.
pub(super) fn flatten(x: Array4<f32>, features: usize) -> Result<Array2<f32>> {
    let n = x.len_of(Axis(0));
    let (_, c, h, w) = x.dim();

    if c * h * w != features {
        return Err(MlErr::ShapeMismatch {
            what: "flattened features",
            got: vec![n, c * h * w],
            expected: vec![n, features],
        });
    }

    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    Ok(x.into_shape_with_order((n, features))?)
}

/// Reshapes a (N, features) matrix back into a batch of the given shape.
///
/// Matrix products with a single column may come out column major, the matrix is made row major
/// before reshaping.
pub(super) fn unflatten(
    x: Array2<f32>,
    shape: (usize, usize, usize, usize),
) -> Result<Array4<f32>> {
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    Ok(x.into_shape_with_order(shape)?)
}
