use ndarray::{Array2, ArrayD, Ix1, Ix2, linalg};
use rand::Rng;

use crate::{Module, NnErr, Param, Result, init::RandParamGen, module::expect_rank};

/// A fully connected layer: `y = x · Wᵀ + b`.
///
/// The weights are stored as `[out_features, in_features]` so that pretrained
/// checkpoints can be loaded as they are.
#[derive(Debug, Clone)]
pub struct Linear {
    in_features: usize,
    out_features: usize,
    weight: Param,
    bias: Option<Param>,
}

impl Linear {
    /// Creates a new `Linear` layer with the default initialization,
    /// `U(-1/sqrt(in_features), 1/sqrt(in_features))` for both weights and biases.
    ///
    /// # Arguments
    /// * `in_features` - The size of each input sample.
    /// * `out_features` - The size of each output sample.
    /// * `rng` - The random number generator to initialize the parameters with.
    ///
    /// # Returns
    /// A new `Linear` or an error if any of the dimensions is zero.
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Result<Self> {
        check_dims(in_features, out_features)?;

        let nweights = in_features * out_features;
        let mut weight_gen = RandParamGen::fan_in_uniform(rng, nweights, in_features)?;
        let weight = Param::generate(&[out_features, in_features], &mut weight_gen)?;

        let mut bias_gen = RandParamGen::fan_in_uniform(rng, out_features, in_features)?;
        let bias = Param::generate(&[out_features], &mut bias_gen)?;

        Self::from_params(weight, Some(bias))
    }

    /// Creates a new `Linear` layer out of already initialized parameters.
    ///
    /// # Arguments
    /// * `weight` - A `[out_features, in_features]` parameter.
    /// * `bias` - An optional `[out_features]` parameter.
    ///
    /// # Returns
    /// A new `Linear` or an error if the parameters have unexpected shapes.
    pub fn from_params(weight: Param, bias: Option<Param>) -> Result<Self> {
        let &[out_features, in_features] = weight.shape() else {
            return Err(NnErr::RankMismatch {
                what: "linear weight",
                got: weight.shape().len(),
                expected: 2,
            });
        };

        check_dims(in_features, out_features)?;

        if let Some(bias) = &bias {
            if bias.shape() != [out_features] {
                return Err(NnErr::SizeMismatch {
                    what: "linear bias",
                    got: bias.numel(),
                    expected: out_features,
                });
            }
        }

        Ok(Self {
            in_features,
            out_features,
            weight,
            bias,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }
}

fn check_dims(in_features: usize, out_features: usize) -> Result<()> {
    if in_features == 0 || out_features == 0 {
        return Err(NnErr::InvalidConfig(format!(
            "linear layers need non zero dimensions, got {in_features} -> {out_features}"
        )));
    }

    Ok(())
}

impl Module for Linear {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix2>("linear", x)?;

        if x.ncols() != self.in_features {
            return Err(NnErr::SizeMismatch {
                what: "linear input features",
                got: x.ncols(),
                expected: self.in_features,
            });
        }

        let w = self.weight.data().view().into_dimensionality::<Ix2>()?;
        let mut y = Array2::zeros((x.nrows(), self.out_features));
        linalg::general_mat_mul(1.0, &x, &w.t(), 0.0, &mut y);

        if let Some(bias) = &self.bias {
            let b = bias.data().view().into_dimensionality::<Ix1>()?;
            y += &b;
        }

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
