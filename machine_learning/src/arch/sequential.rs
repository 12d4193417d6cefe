use std::mem;

use ndarray::Array4;
use rand::Rng;

use super::layers::{Layer, TensorEntry};
use crate::{MlErr, Result, error::check_len};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// Every layer owns a contiguous block of the flat parameter slice, in the same order as the
/// layers themselves.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns the amount of parameters of every layer combined.
    pub fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    /// Walks the layers computing the shape of a single (C, H, W) sample.
    ///
    /// # Returns
    /// The output shape or `MlErr::InvalidConfig` naming the first layer that can't take its
    /// input.
    pub fn output_shape(&self, shape: (usize, usize, usize)) -> Result<(usize, usize, usize)> {
        self.layers
            .iter()
            .enumerate()
            .try_fold(shape, |shape, (i, layer)| {
                layer.output_shape(shape).ok_or_else(|| {
                    MlErr::InvalidConfig(format!("layer {i} can't take an input of shape {shape:?}"))
                })
            })
    }

    /// Names every parameter block as `{prefix}{layer index}.{name}`.
    pub fn entries(&self, prefix: &str) -> Vec<TensorEntry> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| layer.entries(&format!("{prefix}{i}.")))
            .collect()
    }

    /// Initializes the parameters of every layer.
    ///
    /// # Arguments
    /// * `rng` - The random source for the weights.
    /// * `params` - The parameters of this model, `size()` long.
    pub fn init_params<R: Rng>(&self, rng: &mut R, params: &mut [f32]) -> Result<()> {
        check_len("sequential params", params.len(), self.size())?;
        let mut rest = params;

        for layer in &self.layers {
            let (head, tail) = mem::take(&mut rest).split_at_mut(layer.size());
            layer.init_params(rng, head)?;
            rest = tail;
        }

        Ok(())
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The parameters of this model.
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The output of the last layer or an error if occurred.
    pub fn forward(&mut self, params: &[f32], mut x: Array4<f32>) -> Result<Array4<f32>> {
        check_len("sequential params", params.len(), self.size())?;
        let mut rest = params;

        for layer in &mut self.layers {
            let (head, tail) = rest.split_at(layer.size());
            x = layer.forward(head, x)?;
            rest = tail;
        }

        Ok(x)
    }

    /// Makes a backward pass through the network, writing every layer's gradient.
    ///
    /// # Arguments
    /// * `params` - The parameters of this model.
    /// * `grad` - The gradient of this model, overwritten.
    /// * `d` - The delta of the output of the last layer.
    ///
    /// # Returns
    /// The delta of the input of the first layer.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        check_len("sequential params", params.len(), self.size())?;
        check_len("sequential grad", grad.len(), self.size())?;

        let mut params_rest = params;
        let mut grad_rest = grad;

        for layer in self.layers.iter_mut().rev() {
            let at = params_rest.len() - layer.size();

            let (params_head, layer_params) = params_rest.split_at(at);
            let (grad_head, layer_grad) = mem::take(&mut grad_rest).split_at_mut(at);

            d = layer.backward(layer_params, layer_grad, d)?;

            params_rest = params_head;
            grad_rest = grad_head;
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn block() -> Sequential {
        Sequential::new([
            Layer::conv2d(1, 2, 3, 1, 1),
            Layer::relu(),
            Layer::max_pool2d(2, 2),
            Layer::global_avg_pool(),
            Layer::dense((2, 1)),
        ])
    }

    #[test]
    fn size_adds_up_every_layer() {
        assert_eq!(block().size(), (2 * 9 + 2) + (2 + 1));
    }

    #[test]
    fn entries_follow_the_parameter_order() {
        let names: Vec<_> = block()
            .entries("net.")
            .into_iter()
            .map(|e| (e.name, e.shape))
            .collect();

        assert_eq!(
            names,
            vec![
                ("net.0.weight".to_string(), vec![2, 1, 3, 3]),
                ("net.0.bias".to_string(), vec![2]),
                ("net.4.weight".to_string(), vec![2, 1]),
                ("net.4.bias".to_string(), vec![1]),
            ]
        );
    }

    #[test]
    fn output_shape_reports_the_failing_layer() {
        let seq = block();
        assert_eq!(seq.output_shape((1, 4, 4)).unwrap(), (1, 1, 1));
        assert!(matches!(
            seq.output_shape((3, 4, 4)),
            Err(MlErr::InvalidConfig(_))
        ));
    }

    #[test]
    fn init_zeroes_biases() {
        let seq = block();
        let mut params = vec![f32::NAN; seq.size()];
        seq.init_params(&mut StdRng::seed_from_u64(42), &mut params)
            .unwrap();

        assert!(params.iter().all(|p| p.is_finite()));
        assert_eq!(&params[18..20], &[0.0, 0.0]);
        assert_eq!(params[22], 0.0);
    }

    #[test]
    fn backward_fills_the_whole_gradient() {
        let mut seq = block();
        let mut params = vec![0.0; seq.size()];
        seq.init_params(&mut StdRng::seed_from_u64(7), &mut params)
            .unwrap();

        let x = Array4::from_shape_fn((2, 1, 4, 4), |(n, _, i, j)| (n + i * 4 + j) as f32);
        let y = seq.forward(&params, x).unwrap();
        assert_eq!(y.dim(), (2, 1, 1, 1));

        let mut grad = vec![f32::NAN; seq.size()];
        let dx = seq
            .backward(&params, &mut grad, Array4::ones((2, 1, 1, 1)))
            .unwrap();

        assert_eq!(dx.dim(), (2, 1, 4, 4));
        assert!(grad.iter().all(|g| g.is_finite()));
        // the dense bias sees a delta of 1 per sample
        assert_eq!(grad[22], 2.0);
    }

    #[test]
    fn short_params_fail() {
        let mut seq = block();
        let params = vec![0.0; seq.size() - 1];
        assert!(matches!(
            seq.forward(&params, Array4::zeros((1, 1, 4, 4))),
            Err(MlErr::SizeMismatch { .. })
        ));
    }
}
