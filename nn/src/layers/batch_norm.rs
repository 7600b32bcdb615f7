use ndarray::{ArrayD, Axis, Ix1, Ix4, IxDyn};

use crate::{DType, Module, NnErr, Param, Result, Tensor, module::expect_rank};

const EPS: f32 = 1e-5;

/// Batch normalization over the channel axis of `[N, C, H, W]` tensors.
///
/// Only inference mode exists: the input is normalized with the running
/// statistics, which are kept as buffers next to the affine parameters.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    num_features: usize,
    eps: f32,
    weight: Param,
    bias: Param,
    running_mean: Tensor,
    running_var: Tensor,
    num_batches_tracked: Tensor,
}

impl BatchNorm2d {
    /// Creates a new `BatchNorm2d` with unit scale, zero shift and the
    /// running statistics of a standard normal.
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            eps: EPS,
            weight: Param::full(&[num_features], 1.0),
            bias: Param::zeros(&[num_features]),
            running_mean: Tensor::zeros(&[num_features]),
            running_var: Tensor::full(&[num_features], 1.0),
            num_batches_tracked: Tensor::with_dtype(ArrayD::zeros(IxDyn(&[])), DType::I64),
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut x = expect_rank::<Ix4>("batch_norm2d", x)?;

        if x.dim().1 != self.num_features {
            return Err(NnErr::SizeMismatch {
                what: "batch_norm2d input channels",
                got: x.dim().1,
                expected: self.num_features,
            });
        }

        let gamma = self.weight.data().view().into_dimensionality::<Ix1>()?;
        let beta = self.bias.data().view().into_dimensionality::<Ix1>()?;
        let mean = self.running_mean.data().view().into_dimensionality::<Ix1>()?;
        let var = self.running_var.data().view().into_dimensionality::<Ix1>()?;

        for (c, mut channel) in x.axis_iter_mut(Axis(1)).enumerate() {
            let scale = gamma[c] / (var[c] + self.eps).sqrt();
            let shift = beta[c] - mean[c] * scale;
            channel.mapv_inplace(|v| v * scale + shift);
        }

        Ok(x.into_dyn())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        vec![
            ("weight".to_string(), &self.weight),
            ("bias".to_string(), &self.bias),
        ]
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        vec![
            ("weight".to_string(), &mut self.weight),
            ("bias".to_string(), &mut self.bias),
        ]
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        vec![
            ("running_mean".to_string(), &self.running_mean),
            ("running_var".to_string(), &self.running_var),
            ("num_batches_tracked".to_string(), &self.num_batches_tracked),
        ]
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        vec![
            ("running_mean".to_string(), &mut self.running_mean),
            ("running_var".to_string(), &mut self.running_var),
            ("num_batches_tracked".to_string(), &mut self.num_batches_tracked),
        ]
    }
}
