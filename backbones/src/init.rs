//! Layer constructors with the initialization schemes of the reference
//! architectures.

use nn::{
    Conv2d, Linear, Param, Result,
    init::{ConstParamGen, RandParamGen},
};
use rand::Rng;

/// Which side of a convolution Kaiming initialization is scaled by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fan {
    In,
    Out,
}

/// Spatial geometry of a square convolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConvSpec {
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub bias: bool,
}

impl ConvSpec {
    pub const fn new(kernel_size: usize, stride: usize, padding: usize, bias: bool) -> Self {
        Self {
            kernel_size,
            stride,
            padding,
            bias,
        }
    }
}

/// Creates a convolution with Kaiming normal weights and zero biases.
pub(crate) fn kaiming_conv<R: Rng>(
    in_channels: usize,
    out_channels: usize,
    spec: ConvSpec,
    fan: Fan,
    rng: &mut R,
) -> Result<Conv2d> {
    let area = spec.kernel_size * spec.kernel_size;
    let fan = match fan {
        Fan::In => in_channels * area,
        Fan::Out => out_channels * area,
    };

    let shape = [out_channels, in_channels, spec.kernel_size, spec.kernel_size];
    let n = shape.iter().product();
    let mut weight_gen = RandParamGen::kaiming(rng, n, fan)?;
    let weight = Param::generate(&shape, &mut weight_gen)?;

    let bias = if spec.bias {
        Some(zeros(out_channels)?)
    } else {
        None
    };

    Conv2d::from_params(weight, bias, spec.stride, spec.padding)
}

/// Creates a linear layer with `N(0, std_dev²)` weights and zero biases.
pub(crate) fn normal_linear<R: Rng>(
    in_features: usize,
    out_features: usize,
    std_dev: f32,
    rng: &mut R,
) -> Result<Linear> {
    let mut weight_gen = RandParamGen::normal(rng, in_features * out_features, 0., std_dev)?;
    let weight = Param::generate(&[out_features, in_features], &mut weight_gen)?;

    Linear::from_params(weight, Some(zeros(out_features)?))
}

/// Creates a linear layer with the default weight initialization and zero biases.
pub(crate) fn zero_bias_linear<R: Rng>(
    in_features: usize,
    out_features: usize,
    rng: &mut R,
) -> Result<Linear> {
    let mut weight_gen = RandParamGen::fan_in_uniform(rng, in_features * out_features, in_features)?;
    let weight = Param::generate(&[out_features, in_features], &mut weight_gen)?;

    Linear::from_params(weight, Some(zeros(out_features)?))
}

fn zeros(n: usize) -> Result<Param> {
    Param::generate(&[n], &mut ConstParamGen::zeros(&[n]))
}
