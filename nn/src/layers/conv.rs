use ndarray::{Array2, Array4, ArrayD, ArrayView2, ArrayView3, Ix1, Ix4, Zip, linalg};
use rand::Rng;

use crate::{Module, NnErr, Param, Result, init::RandParamGen, module::expect_rank};

/// A 2D convolution over `[N, C, H, W]` tensors with square kernels,
/// symmetric zero padding and no dilation.
///
/// Each sample is unfolded (im2col) and multiplied by the flattened kernel,
/// samples are processed in parallel.
#[derive(Debug, Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    weight: Param,
    bias: Option<Param>,
}

impl Conv2d {
    /// Creates a new `Conv2d` with the default initialization,
    /// `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` where `fan_in = in_channels * kernel_size²`.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input.
    /// * `out_channels` - The amount of channels produced by the convolution.
    /// * `kernel_size` - The side of the square kernel.
    /// * `stride` - The stride of the convolution.
    /// * `padding` - The zero padding added to every side of the input.
    /// * `bias` - Whether to add a learnable bias to the output.
    /// * `rng` - The random number generator to initialize the parameters with.
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
        rng: &mut R,
    ) -> Result<Self> {
        let fan_in = in_channels * kernel_size * kernel_size;
        let shape = [out_channels, in_channels, kernel_size, kernel_size];

        let mut weight_gen = RandParamGen::fan_in_uniform(rng, out_channels * fan_in, fan_in)?;
        let weight = Param::generate(&shape, &mut weight_gen)?;

        let bias = if bias {
            let mut bias_gen = RandParamGen::fan_in_uniform(rng, out_channels, fan_in)?;
            Some(Param::generate(&[out_channels], &mut bias_gen)?)
        } else {
            None
        };

        Self::from_params(weight, bias, stride, padding)
    }

    /// Creates a new `Conv2d` out of already initialized parameters.
    ///
    /// # Arguments
    /// * `weight` - A `[out_channels, in_channels, k, k]` parameter.
    /// * `bias` - An optional `[out_channels]` parameter.
    /// * `stride` - The stride of the convolution.
    /// * `padding` - The zero padding added to every side of the input.
    ///
    /// # Returns
    /// A new `Conv2d` or an error if the parameters or the stride are invalid.
    pub fn from_params(
        weight: Param,
        bias: Option<Param>,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        let &[out_channels, in_channels, kh, kw] = weight.shape() else {
            return Err(NnErr::RankMismatch {
                what: "conv2d weight",
                got: weight.shape().len(),
                expected: 4,
            });
        };

        if kh != kw || kh == 0 {
            return Err(NnErr::InvalidConfig(format!(
                "conv2d kernels must be square and non empty, got {kh}x{kw}"
            )));
        }

        if stride == 0 || in_channels == 0 || out_channels == 0 {
            return Err(NnErr::InvalidConfig(format!(
                "conv2d needs non zero channels and stride, got {in_channels} -> {out_channels} with stride {stride}"
            )));
        }

        if let Some(bias) = &bias {
            if bias.shape() != [out_channels] {
                return Err(NnErr::SizeMismatch {
                    what: "conv2d bias",
                    got: bias.numel(),
                    expected: out_channels,
                });
            }
        }

        Ok(Self {
            in_channels,
            out_channels,
            kernel_size: kh,
            stride,
            padding,
            weight,
            bias,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Returns the spatial size of the output for an input of side `size`.
    fn output_size(&self, size: usize) -> Option<usize> {
        let padded = size + 2 * self.padding;
        padded
            .checked_sub(self.kernel_size)
            .map(|span| span / self.stride + 1)
    }

    /// Unfolds a single `[C, H, W]` sample into a `[C * k * k, oh * ow]` matrix.
    fn im2col(&self, x: ArrayView3<f32>, oh: usize, ow: usize) -> Array2<f32> {
        let (channels, h, w) = x.dim();
        let k = self.kernel_size;
        let mut cols = Array2::zeros((channels * k * k, oh * ow));

        for c in 0..channels {
            for ki in 0..k {
                for kj in 0..k {
                    let row = (c * k + ki) * k + kj;

                    for oy in 0..oh {
                        let Some(iy) = (oy * self.stride + ki).checked_sub(self.padding) else {
                            continue;
                        };
                        if iy >= h {
                            continue;
                        }

                        for ox in 0..ow {
                            let Some(ix) = (ox * self.stride + kj).checked_sub(self.padding)
                            else {
                                continue;
                            };
                            if ix < w {
                                cols[[row, oy * ow + ox]] = x[[c, iy, ix]];
                            }
                        }
                    }
                }
            }
        }

        cols
    }
}

impl Module for Conv2d {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>("conv2d", x)?;
        let (n, channels, h, w) = x.dim();

        if channels != self.in_channels {
            return Err(NnErr::SizeMismatch {
                what: "conv2d input channels",
                got: channels,
                expected: self.in_channels,
            });
        }

        let (Some(oh), Some(ow)) = (self.output_size(h), self.output_size(w)) else {
            return Err(NnErr::InvalidConfig(format!(
                "conv2d input of {h}x{w} is smaller than the {k}x{k} kernel",
                k = self.kernel_size
            )));
        };

        let kernel = self
            .weight
            .data()
            .to_shape((self.out_channels, channels * self.kernel_size.pow(2)))?;
        let kernel: ArrayView2<f32> = kernel.view();

        let bias = match &self.bias {
            Some(bias) => Some(bias.data().view().into_dimensionality::<Ix1>()?),
            None => None,
        };

        let mut y = Array4::zeros((n, self.out_channels, oh, ow));

        Zip::from(y.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut y, x| {
                let cols = self.im2col(x, oh, ow);
                let mut out = Array2::zeros((self.out_channels, oh * ow));
                linalg::general_mat_mul(1.0, &kernel, &cols, 0.0, &mut out);

                for (o, (mut y, out)) in y.outer_iter_mut().zip(out.outer_iter()).enumerate() {
                    let b = bias.as_ref().map_or(0., |b| b[o]);
                    y.iter_mut().zip(out.iter()).for_each(|(y, &v)| *y = v + b);
                }
            });

        Ok(y.into_dyn())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        let mut params = vec![("weight".to_string(), &self.weight)];
        if let Some(bias) = &self.bias {
            params.push(("bias".to_string(), bias));
        }

        params
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        let mut params = vec![("weight".to_string(), &mut self.weight)];
        if let Some(bias) = &mut self.bias {
            params.push(("bias".to_string(), bias));
        }

        params
    }
}
