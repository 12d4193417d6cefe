use ndarray::{Array4, Axis, Zip, s};

use crate::{MlErr, Result};

/// Max pooling over square, non padded windows.
#[derive(Clone, Debug)]
pub struct MaxPool2d {
    kernel: usize,
    stride: usize,

    // Forward metadata, the flat (y * w + x) position of every window's maximum.
    argmax: Option<Array4<usize>>,
    input_shape: (usize, usize, usize, usize),
}

impl MaxPool2d {
    pub fn new(kernel: usize, stride: usize) -> Self {
        Self {
            kernel: kernel.max(1),
            stride: stride.max(1),
            argmax: None,
            input_shape: (0, 0, 0, 0),
        }
    }

    pub fn output_shape(&self, (c, h, w): (usize, usize, usize)) -> Option<(usize, usize, usize)> {
        if h < self.kernel || w < self.kernel {
            return None;
        }

        let oh = (h - self.kernel) / self.stride + 1;
        let ow = (w - self.kernel) / self.stride + 1;
        Some((c, oh, ow))
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        let (_, oh, ow) = self
            .output_shape((c, h, w))
            .ok_or_else(|| MlErr::ShapeMismatch {
                what: "max pool input",
                got: vec![n, c, h, w],
                expected: vec![n, c, self.kernel, self.kernel],
            })?;

        let mut out: Array4<f32> = Array4::zeros((n, c, oh, ow));
        let mut argmax: Array4<usize> = Array4::zeros((n, c, oh, ow));
        let (k, stride) = (self.kernel, self.stride);

        Zip::from(out.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out, mut argmax, x| {
                for ((ci, oy, ox), slot) in out.indexed_iter_mut() {
                    let (y0, x0) = (oy * stride, ox * stride);
                    let mut best = (f32::NEG_INFINITY, y0 * w + x0);

                    for iy in y0..y0 + k {
                        for ix in x0..x0 + k {
                            let v = x[[ci, iy, ix]];
                            if v > best.0 {
                                best = (v, iy * w + ix);
                            }
                        }
                    }

                    *slot = best.0;
                    argmax[[ci, oy, ox]] = best.1;
                }
            });

        self.argmax = Some(argmax);
        self.input_shape = (n, c, h, w);
        Ok(out)
    }

    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        let argmax = self
            .argmax
            .as_ref()
            .ok_or(MlErr::MissingForward { layer: "max pool" })?;

        if argmax.dim() != d.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "max pool delta",
                got: d.shape().to_vec(),
                expected: argmax.shape().to_vec(),
            });
        }

        let w = self.input_shape.3;
        let mut dx: Array4<f32> = Array4::zeros(self.input_shape);

        Zip::from(dx.outer_iter_mut())
            .and(d.outer_iter())
            .and(argmax.outer_iter())
            .par_for_each(|mut dx, d, argmax| {
                for ((ci, oy, ox), &pos) in argmax.indexed_iter() {
                    dx[[ci, pos / w, pos % w]] += d[[ci, oy, ox]];
                }
            });

        Ok(dx)
    }
}

/// Averages every channel over its whole spatial extent, (N, C, H, W) -> (N, C, 1, 1).
#[derive(Clone, Debug, Default)]
pub struct GlobalAvgPool {
    input_shape: Option<(usize, usize, usize, usize)>,
}

impl GlobalAvgPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_shape(&self, (c, h, w): (usize, usize, usize)) -> Option<(usize, usize, usize)> {
        (h * w > 0).then_some((c, 1, 1))
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, c, h, w) = x.dim();
        if h * w == 0 {
            return Err(MlErr::EmptyInput {
                what: "global average pool input",
            });
        }

        let area = (h * w) as f32;
        let means = x.sum_axis(Axis(3)).sum_axis(Axis(2)) / area;

        self.input_shape = Some((n, c, h, w));
        Ok(means.into_shape_with_order((n, c, 1, 1))?)
    }

    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        let shape = self.input_shape.ok_or(MlErr::MissingForward {
            layer: "global average pool",
        })?;
        let (n, c, h, w) = shape;

        if d.dim() != (n, c, 1, 1) {
            return Err(MlErr::ShapeMismatch {
                what: "global average pool delta",
                got: d.shape().to_vec(),
                expected: vec![n, c, 1, 1],
            });
        }

        let area = (h * w) as f32;
        let mut dx = Array4::zeros(shape);

        for ((ni, ci, _, _), &v) in d.indexed_iter() {
            dx.slice_mut(s![ni, ci, .., ..]).fill(v / area);
        }

        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_routes_the_gradient_to_the_maximum() {
        let mut pool = MaxPool2d::new(2, 2);
        let x = Array4::from_shape_vec(
            (1, 1, 2, 4),
            vec![
                1.0, 5.0, 0.0, 0.0, //
                2.0, 3.0, 0.0, 9.0, //
            ],
        )
        .unwrap();

        let y = pool.forward(x).unwrap();
        assert_eq!(y.as_slice().unwrap(), &[5.0, 9.0]);

        let d = Array4::from_shape_vec((1, 1, 1, 2), vec![1.0, 2.0]).unwrap();
        let dx = pool.backward(d).unwrap();
        assert_eq!(
            dx.as_slice().unwrap(),
            &[0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0]
        );
    }

    #[test]
    fn global_avg_pool_spreads_the_gradient_evenly() {
        let mut pool = GlobalAvgPool::new();
        let x = Array4::from_shape_fn((2, 3, 2, 2), |(n, c, _, _)| (n * 3 + c) as f32);

        let y = pool.forward(x).unwrap();
        assert_eq!(y.dim(), (2, 3, 1, 1));
        assert_eq!(y[[1, 2, 0, 0]], 5.0);

        let dx = pool.backward(Array4::from_elem((2, 3, 1, 1), 4.0)).unwrap();
        assert!(dx.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn window_larger_than_input_is_rejected() {
        let mut pool = MaxPool2d::new(3, 1);
        assert!(pool.forward(Array4::zeros((1, 1, 2, 2))).is_err());
    }
}
