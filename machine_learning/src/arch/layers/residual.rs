use ndarray::Array4;

use super::{Layer, TensorEntry};
use crate::{MlErr, Result, arch::Sequential};

/// A skip connection around a shape preserving block: `y = inner(x) + x`.
#[derive(Clone, Debug)]
pub struct Residual {
    inner: Sequential,
}

impl Residual {
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            inner: Sequential::new(layers),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    pub fn inner(&self) -> &Sequential {
        &self.inner
    }

    /// The block must give back its input shape for the sum to be defined.
    pub fn output_shape(&self, shape: (usize, usize, usize)) -> Option<(usize, usize, usize)> {
        let out = self.inner.output_shape(shape).ok()?;
        (out == shape).then_some(out)
    }

    pub fn entries(&self, prefix: &str) -> Vec<TensorEntry> {
        self.inner.entries(&format!("{prefix}inner."))
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let y = self.inner.forward(params, x.clone())?;

        if y.dim() != x.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "residual output",
                got: y.shape().to_vec(),
                expected: x.shape().to_vec(),
            });
        }

        Ok(y + x)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let d_inner = self.inner.backward(params, grad, d.clone())?;
        Ok(d_inner + d)
    }
}
