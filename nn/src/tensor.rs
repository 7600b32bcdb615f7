use ndarray::{ArrayD, IxDyn};

use crate::{DType, NnErr, Result, init::ParamGen};

/// A dense `f32` array tagged with the dtype it is stored as.
///
/// Modules use plain tensors for their buffers (running statistics, grids,
/// masks) and wrap them in a [`Param`] for anything that is learnable.
#[derive(Debug, Clone)]
pub struct Tensor {
    data: ArrayD<f32>,
    dtype: DType,
}

impl Tensor {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self::with_dtype(data, DType::F32)
    }

    pub fn with_dtype(mut data: ArrayD<f32>, dtype: DType) -> Self {
        if dtype != DType::F32 {
            data.mapv_inplace(|x| dtype.round(x));
        }

        Self { data, dtype }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(shape), value))
    }

    /// Creates a tensor of the given shape filled with values sampled from `param_gen`.
    ///
    /// # Arguments
    /// * `shape` - The shape of the new tensor.
    /// * `param_gen` - The generator to take the values from.
    ///
    /// # Returns
    /// The new tensor or an error if the generator couldn't provide enough values.
    pub fn generate<G: ParamGen + ?Sized>(shape: &[usize], param_gen: &mut G) -> Result<Self> {
        let expected = shape.iter().product();
        let values = param_gen
            .sample(expected)
            .ok_or(NnErr::ParamGenExhausted { got: 0, expected })?;

        if values.len() != expected {
            return Err(NnErr::ParamGenExhausted {
                got: values.len(),
                expected,
            });
        }

        Ok(Self::new(ArrayD::from_shape_vec(IxDyn(shape), values)?))
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the amount of elements in this tensor.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns the width in bytes of a single element.
    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    /// Returns the amount of bytes this tensor takes up in storage.
    pub fn nbytes(&self) -> usize {
        self.numel() * self.element_size()
    }

    /// Changes the storage precision, rounding every value to it.
    pub fn cast(&mut self, dtype: DType) {
        if dtype != self.dtype {
            self.data.mapv_inplace(|x| dtype.round(x));
            self.dtype = dtype;
        }
    }

    /// Replaces the contents of this tensor, the shapes must match.
    ///
    /// # Arguments
    /// * `data` - The new values.
    /// * `dtype` - The precision the values were stored with.
    ///
    /// # Returns
    /// An error if `data` has a different amount of elements than this tensor.
    pub fn assign(&mut self, data: ArrayD<f32>, dtype: DType) -> Result<()> {
        if data.shape() != self.shape() {
            return Err(NnErr::SizeMismatch {
                what: "assigned tensor",
                got: data.len(),
                expected: self.numel(),
            });
        }

        self.data = data;
        self.dtype = dtype;
        Ok(())
    }
}

/// A learnable tensor of a module.
///
/// Whether the optimizer would update it is dictated by `requires_grad`,
/// freezing a module clears that flag for every parameter it owns.
#[derive(Debug, Clone)]
pub struct Param {
    tensor: Tensor,
    requires_grad: bool,
}

impl Param {
    /// Creates a new trainable parameter.
    pub fn new(tensor: Tensor) -> Self {
        Self {
            tensor,
            requires_grad: true,
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(Tensor::zeros(shape))
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self::new(Tensor::full(shape, value))
    }

    pub fn generate<G: ParamGen + ?Sized>(shape: &[usize], param_gen: &mut G) -> Result<Self> {
        Ok(Self::new(Tensor::generate(shape, param_gen)?))
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn tensor_mut(&mut self) -> &mut Tensor {
        &mut self.tensor
    }

    pub fn data(&self) -> &ArrayD<f32> {
        self.tensor.data()
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        self.tensor.data_mut()
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    pub fn numel(&self) -> usize {
        self.tensor.numel()
    }

    pub fn nbytes(&self) -> usize {
        self.tensor.nbytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::ConstParamGen;

    #[test]
    fn generate_fills_the_whole_shape() {
        let mut param_gen = ConstParamGen::for_shape(0.5, &[2, 3]);
        let param = Param::generate(&[2, 3], &mut param_gen).unwrap();

        assert_eq!(param.shape(), [2, 3]);
        assert!(param.data().iter().all(|&x| x == 0.5));
        assert!(param.requires_grad());
    }

    #[test]
    fn generate_fails_on_short_generator() {
        let mut param_gen = ConstParamGen::for_shape(0.5, &[4]);
        let err = Tensor::generate(&[2, 3], &mut param_gen).unwrap_err();

        assert!(matches!(
            err,
            NnErr::ParamGenExhausted {
                got: 4,
                expected: 6
            }
        ));
    }

    #[test]
    fn cast_changes_the_byte_count() {
        let mut tensor = Tensor::full(&[10], 1.0);
        assert_eq!(tensor.nbytes(), 40);

        tensor.cast(DType::F64);
        assert_eq!(tensor.nbytes(), 80);

        tensor.cast(DType::BF16);
        assert_eq!(tensor.nbytes(), 20);
    }

    #[test]
    fn assign_rejects_other_shapes() {
        let mut tensor = Tensor::zeros(&[2, 2]);
        let other = ArrayD::zeros(IxDyn(&[4]));

        assert!(tensor.assign(other, DType::F32).is_err());
    }
}
