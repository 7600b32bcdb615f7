use log::debug;
use ndarray::{Array, ArrayD, Dimension};

use crate::{DType, NnErr, Param, Result, Tensor};

/// A node of a model: something that transforms a tensor and owns named
/// parameters and buffers.
///
/// Names follow the dotted convention used by pretrained checkpoints, a child
/// module's names are prefixed with the name its parent gives it, e.g.
/// `features.0.weight`.
pub trait Module {
    /// Makes a forward pass through this module in inference mode.
    ///
    /// # Arguments
    /// * `x` - The input tensor.
    ///
    /// # Returns
    /// The output tensor or an error if the input has an unexpected shape.
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>>;

    /// Returns every parameter of this module along with its qualified name.
    fn named_parameters(&self) -> Vec<(String, &Param)>;

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)>;

    /// Returns every buffer of this module along with its qualified name.
    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        Vec::new()
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        Vec::new()
    }

    /// Returns the amount of scalar parameters in this module.
    fn num_parameters(&self) -> usize {
        self.named_parameters()
            .into_iter()
            .map(|(_, param)| param.numel())
            .sum()
    }

    /// Marks every parameter of this module as non-trainable.
    fn freeze(&mut self) {
        let params = self.named_parameters_mut();
        debug!("freezing {} parameter tensors", params.len());

        for (_, param) in params {
            param.set_requires_grad(false);
        }
    }

    /// Marks every parameter of this module as trainable.
    fn unfreeze(&mut self) {
        for (_, param) in self.named_parameters_mut() {
            param.set_requires_grad(true);
        }
    }

    /// Changes the storage precision of every parameter and floating point buffer.
    ///
    /// # Returns
    /// An error if `dtype` is not a floating point type.
    fn cast(&mut self, dtype: DType) -> Result<()> {
        if !dtype.is_float() {
            return Err(NnErr::InvalidConfig(format!(
                "cannot cast parameters to the non floating point type {dtype}"
            )));
        }

        for (_, param) in self.named_parameters_mut() {
            param.tensor_mut().cast(dtype);
        }

        for (_, buffer) in self.named_buffers_mut() {
            if buffer.dtype().is_float() {
                buffer.cast(dtype);
            }
        }

        Ok(())
    }
}

/// Prefixes the names of a child's parameters or buffers with the child's name.
///
/// # Arguments
/// * `prefix` - The name of the child inside its parent.
/// * `named` - The child's named items.
///
/// # Returns
/// The same items with qualified names.
pub fn scoped<T>(prefix: &str, named: Vec<(String, T)>) -> impl Iterator<Item = (String, T)> {
    named
        .into_iter()
        .map(move |(name, item)| (format!("{prefix}.{name}"), item))
}

/// Converts a dynamic tensor into one of a fixed rank.
///
/// # Arguments
/// * `what` - The layer requesting the conversion, used for error reporting.
/// * `x` - The tensor to convert.
///
/// # Returns
/// The tensor with a static dimension or a `RankMismatch` error.
pub fn expect_rank<D: Dimension>(what: &'static str, x: ArrayD<f32>) -> Result<Array<f32, D>> {
    let expected = D::NDIM.unwrap_or(x.ndim());

    if x.ndim() != expected {
        return Err(NnErr::RankMismatch {
            what,
            got: x.ndim(),
            expected,
        });
    }

    Ok(x.into_dimensionality::<D>()?)
}
