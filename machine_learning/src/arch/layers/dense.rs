use ndarray::{linalg, prelude::*};
use rand::Rng;

use super::{TensorEntry, flatten, unflatten};
use crate::{MlErr, Result, error::check_len, initialization::RandWeightGen};

/// A fully connected layer. Inputs are flattened to (N, n) and outputs are shaped (N, m, 1, 1)
/// so they can keep flowing through the rest of the network.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    input_shape: (usize, usize, usize, usize),
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            x: None,
            input_shape: (0, 0, 0, 0),
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the amount of weights, the remaining parameters are biases.
    pub fn weights_len(&self) -> usize {
        self.size - self.dim.1
    }

    pub fn entries(&self, prefix: &str) -> Vec<TensorEntry> {
        vec![
            TensorEntry::new(format!("{prefix}weight"), vec![self.dim.0, self.dim.1]),
            TensorEntry::new(format!("{prefix}bias"), vec![self.dim.1]),
        ]
    }

    /// Writes Kaiming normal weights and zero biases into `params`.
    pub fn init_params<R: Rng>(&self, rng: &mut R, params: &mut [f32]) -> Result<()> {
        check_len("dense params", params.len(), self.size)?;
        let (w, b) = params.split_at_mut(self.weights_len());
        RandWeightGen::kaiming(self.dim.0)?.fill(rng, w);
        b.fill(0.0);
        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (w, b) = self.view_params(params)?;
        let input_shape = x.dim();
        let n = input_shape.0;

        let x = flatten(x, self.dim.0)?;
        let mut z = x.dot(&w);
        z += &b;

        self.x = Some(x);
        self.input_shape = input_shape;
        unflatten(z, (n, self.dim.1, 1, 1))
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let x = self.x.as_ref().ok_or(MlErr::MissingForward { layer: "dense" })?;
        let d = flatten(d, self.dim.1)?;

        if d.nrows() != x.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "dense delta rows",
                got: d.nrows(),
                expected: x.nrows(),
            });
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        let dx = d.dot(&w.t());
        unflatten(dx, self.input_shape)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        check_len("dense grad", grad.len(), self.size)?;
        let (dw_raw, db_raw) = grad.split_at_mut(self.weights_len());
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        Ok((dw, ArrayViewMut1::from(db_raw)))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        check_len("dense params", params.len(), self.size)?;
        let (w_raw, b_raw) = params.split_at(self.weights_len());
        let w = ArrayView2::from_shape(self.dim, w_raw)?;
        Ok((w, ArrayView1::from(b_raw)))
    }
}
