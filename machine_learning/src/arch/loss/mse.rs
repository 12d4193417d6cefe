use ndarray::{Array1, ArrayView1};

use super::LossFn;

/// Mean squared error loss function.
#[derive(Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
        (&y_pred - &y)
            .mapv(|x| x.powi(2))
            .mean()
            .unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView1<f32>, y: ArrayView1<f32>) -> Array1<f32> {
        (&y_pred - &y) * (2.0 / y_pred.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn loss_and_derivative() {
        let y_pred = array![1.0, 2.0, 4.0];
        let y = array![1.0, 0.0, 1.0];

        let mse = Mse::new();
        assert!((mse.loss(y_pred.view(), y.view()) - 13.0 / 3.0).abs() < 1e-6);

        let d = mse.loss_prime(y_pred.view(), y.view());
        let expected = [0.0, 4.0 / 3.0, 2.0];
        assert!(d.iter().zip(expected).all(|(a, b)| (a - b).abs() < 1e-6));
    }

    #[test]
    fn empty_batch_has_zero_loss() {
        let empty = Array1::<f32>::zeros(0);
        assert_eq!(Mse::new().loss(empty.view(), empty.view()), 0.0);
    }
}
