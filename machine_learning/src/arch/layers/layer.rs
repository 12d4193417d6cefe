use ndarray::Array4;
use rand::Rng;

use super::{Conv2d, Dense, GlobalAvgPool, MaxPool2d, Relu, Residual, TensorEntry};
use crate::{Result, initialization::RandWeightGen};

#[derive(Clone, Debug)]
pub enum Layer {
    Conv2d(Conv2d),
    Dense(Dense),
    Relu(Relu),
    MaxPool2d(MaxPool2d),
    GlobalAvgPool(GlobalAvgPool),
    Residual(Residual),
}
use Layer::*;

impl Layer {
    pub fn conv2d(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        Self::Conv2d(Conv2d::new(
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
        ))
    }

    pub fn dense(dim: (usize, usize)) -> Self {
        Self::Dense(Dense::new(dim))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu::new())
    }

    pub fn max_pool2d(kernel: usize, stride: usize) -> Self {
        Self::MaxPool2d(MaxPool2d::new(kernel, stride))
    }

    pub fn global_avg_pool() -> Self {
        Self::GlobalAvgPool(GlobalAvgPool::new())
    }

    pub fn residual<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self::Residual(Residual::new(layers))
    }

    /// Returns the amount of parameters of this layer.
    pub fn size(&self) -> usize {
        match self {
            Conv2d(l) => l.size(),
            Dense(l) => l.size(),
            Residual(l) => l.size(),
            Relu(_) | MaxPool2d(_) | GlobalAvgPool(_) => 0,
        }
    }

    /// Computes the (C, H, W) shape this layer outputs for a given input shape.
    ///
    /// # Returns
    /// `None` if the layer can't take an input of that shape.
    pub fn output_shape(&self, shape: (usize, usize, usize)) -> Option<(usize, usize, usize)> {
        match self {
            Conv2d(l) => l.output_shape(shape),
            Dense(l) => {
                let (c, h, w) = shape;
                let (n, m) = l.dim();
                (c * h * w == n).then_some((m, 1, 1))
            }
            Relu(_) => Some(shape),
            MaxPool2d(l) => l.output_shape(shape),
            GlobalAvgPool(l) => l.output_shape(shape),
            Residual(l) => l.output_shape(shape),
        }
    }

    pub fn entries(&self, prefix: &str) -> Vec<TensorEntry> {
        match self {
            Conv2d(l) => l.entries(prefix),
            Dense(l) => l.entries(prefix),
            Residual(l) => l.entries(prefix),
            Relu(_) | MaxPool2d(_) | GlobalAvgPool(_) => Vec::new(),
        }
    }

    /// Writes the initial values of this layer's parameters: Kaiming normal weights and zero
    /// biases.
    pub fn init_params<R: Rng>(&self, rng: &mut R, params: &mut [f32]) -> Result<()> {
        match self {
            Conv2d(l) => {
                let (w, b) = params.split_at_mut(l.weights_len());
                RandWeightGen::kaiming(l.fan_in())?.fill(rng, w);
                b.fill(0.0);
            }
            Dense(l) => l.init_params(rng, params)?,
            Residual(l) => l.inner().init_params(rng, params)?,
            Relu(_) | MaxPool2d(_) | GlobalAvgPool(_) => {}
        }

        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        match self {
            Conv2d(l) => l.forward(params, x),
            Dense(l) => l.forward(params, x),
            Relu(l) => Ok(l.forward(x)),
            MaxPool2d(l) => l.forward(x),
            GlobalAvgPool(l) => l.forward(x),
            Residual(l) => l.forward(params, x),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        match self {
            Conv2d(l) => l.backward(params, grad, d),
            Dense(l) => l.backward(params, grad, d),
            Relu(l) => l.backward(d),
            MaxPool2d(l) => l.backward(d),
            GlobalAvgPool(l) => l.backward(d),
            Residual(l) => l.backward(params, grad, d),
        }
    }
}
