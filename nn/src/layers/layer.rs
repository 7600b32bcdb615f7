use std::fmt;

use ndarray::{ArrayD, IxDyn};

use super::{AdaptiveAvgPool2d, BatchNorm2d, Conv2d, Dropout, Linear, Pool2d, activation};
use crate::{Module, NnErr, Param, Result, Sequential, Tensor};

/// A building block of a model.
///
/// The common layers are listed so callers can match on them (for instance to
/// read the width of a classifier), anything else fits in `Custom`.
pub enum Layer {
    Conv2d(Conv2d),
    BatchNorm2d(BatchNorm2d),
    Linear(Linear),
    Relu,
    Pool2d(Pool2d),
    AdaptiveAvgPool2d(AdaptiveAvgPool2d),
    Dropout(Dropout),
    /// Flattens every axis but the first one.
    Flatten,
    Identity,
    Sequential(Sequential),
    Custom(Box<dyn Module + Send + Sync>),
}
use Layer::*;

impl Layer {
    pub fn custom<M: Module + Send + Sync + 'static>(module: M) -> Self {
        Custom(Box::new(module))
    }

    /// Returns the name of this kind of layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Conv2d(_) => "conv2d",
            BatchNorm2d(_) => "batch_norm2d",
            Linear(_) => "linear",
            Relu => "relu",
            Pool2d(_) => "pool2d",
            AdaptiveAvgPool2d(_) => "adaptive_avg_pool2d",
            Dropout(_) => "dropout",
            Flatten => "flatten",
            Identity => "identity",
            Sequential(_) => "sequential",
            Custom(_) => "custom",
        }
    }

    fn inner(&self) -> Option<&dyn Module> {
        let module: &dyn Module = match self {
            Conv2d(l) => l,
            BatchNorm2d(l) => l,
            Linear(l) => l,
            Pool2d(l) => l,
            AdaptiveAvgPool2d(l) => l,
            Sequential(l) => l,
            Custom(l) => l.as_ref(),
            Relu | Dropout(_) | Flatten | Identity => return None,
        };

        Some(module)
    }

    fn inner_mut(&mut self) -> Option<&mut dyn Module> {
        let module: &mut dyn Module = match self {
            Conv2d(l) => l,
            BatchNorm2d(l) => l,
            Linear(l) => l,
            Pool2d(l) => l,
            AdaptiveAvgPool2d(l) => l,
            Sequential(l) => l,
            Custom(l) => l.as_mut(),
            Relu | Dropout(_) | Flatten | Identity => return None,
        };

        Some(module)
    }
}

/// Flattens every axis but the first one of `x`.
pub fn flatten(x: ArrayD<f32>) -> Result<ArrayD<f32>> {
    let Some(&n) = x.shape().first() else {
        return Err(NnErr::RankMismatch {
            what: "flatten",
            got: 0,
            expected: 1,
        });
    };

    let features = x.len().checked_div(n).unwrap_or(0);
    let x = x.as_standard_layout().into_owned();
    Ok(x.into_shape_with_order(IxDyn(&[n, features]))?)
}

impl Module for Layer {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Relu => Ok(x.mapv_into(activation::relu)),
            Dropout(_) | Identity => Ok(x),
            Flatten => flatten(x),
            _ => match self.inner() {
                Some(module) => module.forward(x),
                None => Ok(x),
            },
        }
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.inner()
            .map(|module| module.named_parameters())
            .unwrap_or_default()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.inner_mut()
            .map(|module| module.named_parameters_mut())
            .unwrap_or_default()
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        self.inner()
            .map(|module| module.named_buffers())
            .unwrap_or_default()
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        self.inner_mut()
            .map(|module| module.named_buffers_mut())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conv2d(l) => l.fmt(f),
            BatchNorm2d(l) => l.fmt(f),
            Linear(l) => l.fmt(f),
            Pool2d(l) => l.fmt(f),
            AdaptiveAvgPool2d(l) => l.fmt(f),
            Dropout(l) => l.fmt(f),
            Sequential(l) => l.fmt(f),
            other => f.write_str(other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    #[test]
    fn relu_layer() {
        let x = Array::from_vec(vec![-1., 0.5, 2.]).into_dyn();
        let y = Relu.forward(x).unwrap();

        assert_eq!(y.iter().copied().collect::<Vec<f32>>(), [0., 0.5, 2.]);
    }

    #[test]
    fn flatten_keeps_batch() {
        let x = ArrayD::<f32>::zeros(vec![2, 3, 4, 5]);
        let y = Flatten.forward(x).unwrap();

        assert_eq!(y.shape(), [2, 60]);
    }

    #[test]
    fn parameterless_layers() {
        let mut layer = Identity;

        assert!(layer.named_parameters().is_empty());
        assert!(layer.named_parameters_mut().is_empty());
        assert_eq!(layer.kind(), "identity");
    }
}
