use super::ParamGen;

/// Fills a tensor of a known shape with a single value, as done for biases
/// and the affine parameters of normalization layers.
#[derive(Debug, Clone)]
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` for exactly the elements of `shape`.
    ///
    /// # Arguments
    /// * `value` - The fill value.
    /// * `shape` - The shape of the tensor being filled.
    pub fn for_shape(value: f32, shape: &[usize]) -> Self {
        Self {
            value,
            remaining: shape.iter().product(),
        }
    }

    /// A `ConstParamGen` of zeros for `shape`.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::for_shape(0., shape)
    }

    /// How many values can still be generated.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let take = n.min(self.remaining);
        if take == 0 {
            return None;
        }

        self.remaining -= take;
        Some(vec![self.value; take])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_by_shape() {
        let mut param_gen = ConstParamGen::for_shape(0.5, &[2, 3]);
        assert_eq!(param_gen.remaining(), 6);

        assert_eq!(param_gen.sample(4).unwrap(), vec![0.5; 4]);
        assert_eq!(param_gen.sample(4).unwrap(), vec![0.5; 2]);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn scalar_shape_yields_one_value() {
        let mut param_gen = ConstParamGen::zeros(&[]);

        assert_eq!(param_gen.sample(3).unwrap(), vec![0.]);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn empty_shape_is_exhausted() {
        let mut param_gen = ConstParamGen::zeros(&[4, 0]);
        assert!(param_gen.sample(1).is_none());
    }
}
