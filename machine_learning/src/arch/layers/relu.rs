use ndarray::Array4;

use crate::{MlErr, Result};

/// Rectified linear unit, applied element-wise.
#[derive(Clone, Debug, Default)]
pub struct Relu {
    a: Option<Array4<f32>>,
}

impl Relu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Array4<f32> {
        let a = x.mapv_into(|z| z.max(0.0));
        self.a = Some(a.clone());
        a
    }

    pub fn backward(&mut self, mut d: Array4<f32>) -> Result<Array4<f32>> {
        let a = self.a.as_ref().ok_or(MlErr::MissingForward { layer: "relu" })?;

        if a.dim() != d.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "relu delta",
                got: d.shape().to_vec(),
                expected: a.shape().to_vec(),
            });
        }

        d.zip_mut_with(a, |d, &a| {
            if a <= 0.0 {
                *d = 0.0;
            }
        });

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_inputs_block_the_gradient() {
        let mut relu = Relu::new();
        let x = Array4::from_shape_vec((1, 1, 1, 4), vec![-1.0, 0.0, 2.0, 3.0]).unwrap();

        let a = relu.forward(x);
        assert_eq!(a.as_slice().unwrap(), &[0.0, 0.0, 2.0, 3.0]);

        let d = relu.backward(Array4::from_elem((1, 1, 1, 4), 1.0)).unwrap();
        assert_eq!(d.as_slice().unwrap(), &[0.0, 0.0, 1.0, 1.0]);
    }
}
