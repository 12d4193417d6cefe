use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::Result;

/// A weight generator that follows a normal distribution.
#[derive(Clone, Copy, Debug)]
pub struct RandWeightGen {
    distribution: Normal<f32>,
}

impl RandWeightGen {
    /// Creates a new `RandWeightGen` weight generator with a normal distribution.
    ///
    /// # Arguments
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (Nan or infinite).
    pub fn normal(mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self {
            distribution: Normal::new(mean, std_dev)?,
        })
    }

    /// Creates a new `RandWeightGen` weight generator using Kaiming normal initialization.
    ///
    /// # Arguments
    /// * `fan_in` - The number of input units in the weight tensor.
    ///
    /// # Returns
    /// An error if the calculated standard deviation is not finite (Nan or infinite).
    pub fn kaiming(fan_in: usize) -> Result<Self> {
        let std_dev = (2. / fan_in as f32).sqrt();
        Self::normal(0., std_dev)
    }

    /// Overwrites `weights` with fresh samples.
    pub fn fill<R: Rng>(&self, rng: &mut R, weights: &mut [f32]) {
        weights
            .iter_mut()
            .for_each(|w| *w = self.distribution.sample(rng));
    }
}
