use ndarray::{
    Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1,
    ArrayViewMut2, Axis,
};
use rayon::prelude::*;

use super::TensorEntry;
use crate::{MlErr, Result, error::check_len};

/// A 2D convolution over (N, C, H, W) batches.
///
/// Parameters are laid out as the `(out, in * k * k)` weight matrix in row-major order followed
/// by `out` biases. Each sample is lowered to a column matrix (im2col) and multiplied by the
/// weights, samples run in parallel.
#[derive(Clone, Debug)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    size: usize,

    // Forward metadata
    x: Option<Array4<f32>>,
}

impl Conv2d {
    /// Creates a new `Conv2d`.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input.
    /// * `out_channels` - The amount of filters, that is, channels of the output.
    /// * `kernel` - The side of the square kernel.
    /// * `stride` - The step between two kernel applications.
    /// * `padding` - The amount of zeros added on every border of the input.
    ///
    /// # Returns
    /// A new `Conv2d` instance.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> Self {
        let patch = in_channels * kernel * kernel;

        Self {
            in_channels,
            out_channels,
            kernel,
            stride: stride.max(1),
            padding,
            size: out_channels * patch + out_channels,
            x: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the amount of inputs every output unit sees.
    pub fn fan_in(&self) -> usize {
        self.patch_len()
    }

    /// Returns the amount of weights, the remaining parameters are biases.
    pub fn weights_len(&self) -> usize {
        self.size - self.out_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Computes the output shape for a single (C, H, W) sample.
    ///
    /// # Returns
    /// The output shape or `None` if the kernel does not fit in the padded input.
    pub fn output_shape(&self, (c, h, w): (usize, usize, usize)) -> Option<(usize, usize, usize)> {
        if c != self.in_channels {
            return None;
        }

        let (h, w) = (h + 2 * self.padding, w + 2 * self.padding);
        if h < self.kernel || w < self.kernel || self.kernel == 0 {
            return None;
        }

        let oh = (h - self.kernel) / self.stride + 1;
        let ow = (w - self.kernel) / self.stride + 1;
        Some((self.out_channels, oh, ow))
    }

    pub fn entries(&self, prefix: &str) -> Vec<TensorEntry> {
        vec![
            TensorEntry::new(
                format!("{prefix}weight"),
                vec![self.out_channels, self.in_channels, self.kernel, self.kernel],
            ),
            TensorEntry::new(format!("{prefix}bias"), vec![self.out_channels]),
        ]
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (w, b) = self.view_params(params)?;
        let (n, c, h, wd) = x.dim();

        let (_, oh, ow) = self
            .output_shape((c, h, wd))
            .ok_or_else(|| MlErr::ShapeMismatch {
                what: "conv2d input",
                got: vec![n, c, h, wd],
                expected: vec![n, self.in_channels, self.kernel, self.kernel],
            })?;

        let outputs: Vec<Array3<f32>> = (0..n)
            .into_par_iter()
            .map(|i| self.forward_sample(w, b, x.index_axis(Axis(0), i), (oh, ow)))
            .collect::<Result<_>>()?;

        let mut out = Array4::zeros((n, self.out_channels, oh, ow));
        for (mut slot, sample) in out.outer_iter_mut().zip(&outputs) {
            slot.assign(sample);
        }

        self.x = Some(x);
        Ok(out)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let x = self.x.as_ref().ok_or(MlErr::MissingForward { layer: "conv2d" })?;
        let (w, _) = self.view_params(params)?;
        let (n, _, _, _) = x.dim();
        let (dn, dc, oh, ow) = d.dim();

        if dn != n || dc != self.out_channels {
            return Err(MlErr::ShapeMismatch {
                what: "conv2d delta",
                got: vec![dn, dc, oh, ow],
                expected: vec![n, self.out_channels, oh, ow],
            });
        }

        let per_sample: Vec<(Array2<f32>, Array1<f32>, Array3<f32>)> = (0..n)
            .into_par_iter()
            .map(|i| {
                self.backward_sample(w, x.index_axis(Axis(0), i), d.index_axis(Axis(0), i))
            })
            .collect::<Result<_>>()?;

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.fill(0.0);
        db.fill(0.0);

        let mut dx = Array4::zeros(x.raw_dim());
        for ((sample_dw, sample_db, sample_dx), mut slot) in
            per_sample.iter().zip(dx.outer_iter_mut())
        {
            dw += sample_dw;
            db += sample_db;
            slot.assign(sample_dx);
        }

        Ok(dx)
    }

    fn forward_sample(
        &self,
        w: ArrayView2<f32>,
        b: ArrayView1<f32>,
        x: ArrayView3<f32>,
        (oh, ow): (usize, usize),
    ) -> Result<Array3<f32>> {
        let cols = self.im2col(x, (oh, ow));
        let mut z = w.dot(&cols);

        for (mut row, &bias) in z.outer_iter_mut().zip(b) {
            row += bias;
        }

        Ok(z.to_shape((self.out_channels, oh, ow))?.into_owned())
    }

    fn backward_sample(
        &self,
        w: ArrayView2<f32>,
        x: ArrayView3<f32>,
        d: ArrayView3<f32>,
    ) -> Result<(Array2<f32>, Array1<f32>, Array3<f32>)> {
        let (_, oh, ow) = d.dim();
        let d = d.to_shape((self.out_channels, oh * ow))?;

        let cols = self.im2col(x, (oh, ow));
        let dw = d.dot(&cols.t());
        let db = d.sum_axis(Axis(1));
        let dcols = w.t().dot(&d);

        let (_, h, wd) = x.dim();
        Ok((dw, db, self.col2im(dcols.view(), (h, wd), (oh, ow))))
    }

    /// Lowers a (C, H, W) sample into a `(C * k * k, oh * ow)` matrix where every column holds
    /// the receptive field of one output position.
    fn im2col(&self, x: ArrayView3<f32>, (oh, ow): (usize, usize)) -> Array2<f32> {
        let (c, h, w) = x.dim();
        let k = self.kernel;
        let mut cols = Array2::zeros((self.patch_len(), oh * ow));

        for ci in 0..c {
            for ky in 0..k {
                for kx in 0..k {
                    let row = (ci * k + ky) * k + kx;

                    for oy in 0..oh {
                        let Some(iy) = self.source_index(oy, ky, h) else {
                            continue;
                        };

                        for ox in 0..ow {
                            let Some(ix) = self.source_index(ox, kx, w) else {
                                continue;
                            };

                            cols[[row, oy * ow + ox]] = x[[ci, iy, ix]];
                        }
                    }
                }
            }
        }

        cols
    }

    /// Scatters a column matrix back into a (C, H, W) sample, adding overlapping contributions.
    fn col2im(
        &self,
        cols: ArrayView2<f32>,
        (h, w): (usize, usize),
        (oh, ow): (usize, usize),
    ) -> Array3<f32> {
        let k = self.kernel;
        let mut x = Array3::zeros((self.in_channels, h, w));

        for ci in 0..self.in_channels {
            for ky in 0..k {
                for kx in 0..k {
                    let row = (ci * k + ky) * k + kx;

                    for oy in 0..oh {
                        let Some(iy) = self.source_index(oy, ky, h) else {
                            continue;
                        };

                        for ox in 0..ow {
                            let Some(ix) = self.source_index(ox, kx, w) else {
                                continue;
                            };

                            x[[ci, iy, ix]] += cols[[row, oy * ow + ox]];
                        }
                    }
                }
            }
        }

        x
    }

    /// Maps an output coordinate and a kernel offset to the input coordinate they read, `None`
    /// when it falls on the padding.
    fn source_index(&self, out: usize, offset: usize, len: usize) -> Option<usize> {
        let padded = out * self.stride + offset;
        let idx = padded.checked_sub(self.padding)?;
        (idx < len).then_some(idx)
    }

    fn patch_len(&self) -> usize {
        self.in_channels * self.kernel * self.kernel
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        check_len("conv2d params", params.len(), self.size)?;
        let (w_raw, b_raw) = params.split_at(self.weights_len());
        let w = ArrayView2::from_shape((self.out_channels, self.patch_len()), w_raw)?;
        Ok((w, ArrayView1::from(b_raw)))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        check_len("conv2d grad", grad.len(), self.size)?;
        let (dw_raw, db_raw) = grad.split_at_mut(self.weights_len());
        let dw = ArrayViewMut2::from_shape((self.out_channels, self.patch_len()), dw_raw)?;
        Ok((dw, ArrayViewMut1::from(db_raw)))
    }
}
