use std::ops::Range;

use ndarray::{Array1, Array4, Axis};
use rand::Rng;

use super::{
    Sequential,
    layers::{Dense, Layer, TensorEntry},
};
use crate::{MlErr, Result, error::check_len};

/// The shape of a `Regressor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegressorConfig {
    /// The amount of channels of the input images.
    pub in_channels: usize,
    /// The width of the stem and of the first residual stage.
    pub base_channels: usize,
    /// The amount of residual stages, every stage after the first one halves the resolution
    /// and doubles the width.
    pub stages: usize,
    /// The side of the square input images.
    pub image_size: usize,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            base_channels: 16,
            stages: 3,
            image_size: 224,
        }
    }
}

/// Which part of the network a backward pass updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainScope {
    /// Every layer.
    Full,
    /// Only the head, the backbone is frozen.
    HeadOnly,
}

/// A residual convolutional backbone followed by a single output dense head.
///
/// Parameters are laid out as `[backbone | head]` in one flat slice.
#[derive(Clone, Debug)]
pub struct Regressor {
    config: RegressorConfig,
    backbone: Sequential,
    head: Dense,
}

impl Regressor {
    /// Creates a new `Regressor`.
    ///
    /// # Arguments
    /// * `config` - The shape of the network.
    ///
    /// # Returns
    /// A new `Regressor` or `MlErr::InvalidConfig` if the images are too small for the amount
    /// of stages.
    pub fn new(config: RegressorConfig) -> Result<Self> {
        let RegressorConfig {
            in_channels,
            base_channels,
            stages,
            image_size,
        } = config;

        if in_channels == 0 || base_channels == 0 {
            return Err(MlErr::InvalidConfig(
                "channel counts must be positive".to_string(),
            ));
        }

        let mut layers = vec![
            Layer::conv2d(in_channels, base_channels, 7, 2, 3),
            Layer::relu(),
            Layer::max_pool2d(2, 2),
        ];

        let mut channels = base_channels;
        for stage in 0..stages {
            if stage > 0 {
                layers.push(Layer::conv2d(channels, channels * 2, 3, 2, 1));
                layers.push(Layer::relu());
                channels *= 2;
            }

            layers.push(Layer::residual([
                Layer::conv2d(channels, channels, 3, 1, 1),
                Layer::relu(),
                Layer::conv2d(channels, channels, 3, 1, 1),
            ]));
            layers.push(Layer::relu());
        }

        layers.push(Layer::global_avg_pool());

        let backbone = Sequential::new(layers);
        let (features, _, _) = backbone
            .output_shape((in_channels, image_size, image_size))
            .map_err(|e| {
                MlErr::InvalidConfig(format!(
                    "{image_size}x{image_size} images are too small for {stages} stages ({e})"
                ))
            })?;

        Ok(Self {
            config,
            backbone,
            head: Dense::new((features, 1)),
        })
    }

    pub fn config(&self) -> RegressorConfig {
        self.config
    }

    /// Returns the amount of parameters of the whole network.
    pub fn size(&self) -> usize {
        self.backbone.size() + self.head.size()
    }

    /// Returns the range of the head within the flat parameter slice.
    pub fn head_range(&self) -> Range<usize> {
        self.backbone.size()..self.size()
    }

    /// Names every parameter block, in parameter order.
    pub fn tensor_entries(&self) -> Vec<TensorEntry> {
        let mut entries = self.backbone.entries("backbone.");
        entries.extend(self.head.entries("head."));
        entries
    }

    /// Creates a fresh set of parameters, Kaiming normal weights and zero biases.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = vec![0.0; self.size()];
        let (backbone, head) = params.split_at_mut(self.backbone.size());

        self.backbone.init_params(rng, backbone)?;
        self.head.init_params(rng, head)?;
        Ok(params)
    }

    /// Predicts one value per image.
    ///
    /// # Arguments
    /// * `params` - The parameters of the network.
    /// * `x` - A (N, C, H, W) batch of images.
    ///
    /// # Returns
    /// The N predictions.
    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array1<f32>> {
        check_len("regressor params", params.len(), self.size())?;
        let (backbone_params, head_params) = params.split_at(self.backbone.size());

        let n = x.len_of(Axis(0));
        let features = self.backbone.forward(backbone_params, x)?;
        let y = self.head.forward(head_params, features)?;

        Ok(y.into_shape_with_order(n)?)
    }

    /// Writes the gradient of the last forward pass given the delta of its predictions.
    ///
    /// With `TrainScope::HeadOnly` the backbone section of `grad` is left as it was.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array1<f32>,
        scope: TrainScope,
    ) -> Result<()> {
        check_len("regressor params", params.len(), self.size())?;
        check_len("regressor grad", grad.len(), self.size())?;

        let at = self.backbone.size();
        let (backbone_params, head_params) = params.split_at(at);
        let (backbone_grad, head_grad) = grad.split_at_mut(at);

        let n = d.len();
        let d = d.into_shape_with_order((n, 1, 1, 1))?;
        let d = self.head.backward(head_params, head_grad, d)?;

        if scope == TrainScope::Full {
            self.backbone.backward(backbone_params, backbone_grad, d)?;
        }

        Ok(())
    }
}
