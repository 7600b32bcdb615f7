use log::debug;
use ndarray::{Array1, Array2, Array3, ArrayD, ArrayView2, ArrayView3, Ix2, Zip};
use ndarray_rand::RandomExt;
use nn::{
    Module, NnErr, Param, Result, Tensor,
    layers::activation::silu,
    module::expect_rank,
};
use rand::Rng;
use rand_distr::Uniform;

use crate::{
    KanConfig,
    bspline::{self, eval_sample},
};

/// The result of a forward pass along with the intermediate activations of
/// every edge.
///
/// The per-edge arrays are laid out as `[batch, out, in]`.
#[derive(Debug, Clone)]
pub struct KanOutput {
    /// The `[batch, out]` layer outputs.
    pub y: Array2<f32>,
    /// The inputs each edge received.
    pub preacts: Array3<f32>,
    /// The masked and scaled activation of each edge.
    pub postacts: Array3<f32>,
    /// The raw spline value of each edge.
    pub postspline: Array3<f32>,
}

/// A Kolmogorov-Arnold layer.
///
/// Every `(input, output)` edge carries a learnable activation made of a
/// residual SiLU branch plus a B-spline:
///
/// `φ(x) = mask · (scale_base · silu(x) + scale_sp · spline(x))`
///
/// and each output sums the activations of the edges arriving to it.
#[derive(Debug, Clone)]
pub struct KanLayer {
    in_dim: usize,
    out_dim: usize,
    config: KanConfig,
    grid: Tensor,
    mask: Tensor,
    coef: Param,
    scale_base: Param,
    scale_sp: Param,
}

impl KanLayer {
    /// Creates a new `KanLayer` with splines initialized to small noise.
    ///
    /// # Arguments
    /// * `in_dim` - The amount of inputs.
    /// * `out_dim` - The amount of outputs.
    /// * `config` - The layer hyperparameters.
    /// * `rng` - The random number generator to initialize the parameters with.
    ///
    /// # Returns
    /// A new `KanLayer` or an error if the configuration or the dimensions are invalid.
    pub fn new<R: Rng>(in_dim: usize, out_dim: usize, config: &KanConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        if in_dim == 0 || out_dim == 0 {
            return Err(NnErr::InvalidConfig(format!(
                "a kan layer needs at least one input and one output, got {in_dim} -> {out_dim}"
            )));
        }

        let KanConfig { num, k, .. } = *config;

        let points = bspline::uniform_grid(config.grid_range, num);
        let row = bspline::extend_grid(points.view(), k);
        let grid = broadcast_rows(&row, in_dim);

        let noise = Array3::random_using((num + 1, in_dim, out_dim), Uniform::new(-0.5f32, 0.5)?, rng)
            * (config.noise_scale / num as f32);
        let samples = broadcast_rows(&points, in_dim).reversed_axes();
        let coef = bspline::fit_coef(samples.view(), noise.view(), grid.view(), k)?;

        let sqrt_in = (in_dim as f32).sqrt();
        let mask = Array2::ones((in_dim, out_dim));

        let base_noise = Array2::random_using((in_dim, out_dim), Uniform::new_inclusive(-1f32, 1.)?, rng);
        let scale_base = base_noise.mapv(|u| (config.scale_base_mu + config.scale_base_sigma * u) / sqrt_in);

        let scale_sp = &mask * (config.scale_sp / sqrt_in);

        let mut coef = Param::new(Tensor::new(coef.into_dyn()));
        let mut scale_base = Param::new(Tensor::new(scale_base.into_dyn()));
        let mut scale_sp = Param::new(Tensor::new(scale_sp.into_dyn()));

        coef.set_requires_grad(true);
        scale_base.set_requires_grad(config.sb_trainable);
        scale_sp.set_requires_grad(config.sp_trainable);

        Ok(Self {
            in_dim,
            out_dim,
            config: config.clone(),
            grid: Tensor::new(grid.into_dyn()),
            mask: Tensor::new(mask.into_dyn()),
            coef,
            scale_base,
            scale_sp,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn config(&self) -> &KanConfig {
        &self.config
    }

    /// Returns the `[in, num + 1 + 2k]` extended spline grids.
    pub fn grid(&self) -> &Tensor {
        &self.grid
    }

    /// Returns the `[in, out, num + k]` spline coefficients.
    pub fn coef(&self) -> &Param {
        &self.coef
    }

    pub fn scale_base(&self) -> &Param {
        &self.scale_base
    }

    pub fn scale_sp(&self) -> &Param {
        &self.scale_sp
    }

    /// Makes a forward pass keeping every intermediate activation.
    ///
    /// # Arguments
    /// * `x` - A `[batch, in]` input.
    ///
    /// # Returns
    /// The layer output along with its activations or an error if the input width is wrong.
    pub fn forward_traced(&self, x: ArrayView2<f32>) -> Result<KanOutput> {
        let (batch, in_dim) = x.dim();
        if in_dim != self.in_dim {
            return Err(NnErr::SizeMismatch {
                what: "kan layer input",
                got: in_dim,
                expected: self.in_dim,
            });
        }

        let out_dim = self.out_dim;
        let k = self.config.k;

        let grid = view2(&self.grid)?;
        let mask = view2(&self.mask)?;
        let scale_base = view2(self.scale_base.tensor())?;
        let scale_sp = view2(self.scale_sp.tensor())?;
        let coef = view3(self.coef.tensor())?;

        let mut y = Array2::zeros((batch, out_dim));
        let mut preacts = Array3::zeros((batch, out_dim, in_dim));
        let mut postacts = Array3::zeros((batch, out_dim, in_dim));
        let mut postspline = Array3::zeros((batch, out_dim, in_dim));

        Zip::from(y.outer_iter_mut())
            .and(preacts.outer_iter_mut())
            .and(postacts.outer_iter_mut())
            .and(postspline.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut y, mut pre, mut post, mut spl, x| {
                let mut spline = Array2::zeros((in_dim, out_dim));
                eval_sample(x, grid, coef, k, spline.view_mut());

                for (i, &xi) in x.iter().enumerate() {
                    let base = silu(xi);

                    for j in 0..out_dim {
                        let s = spline[[i, j]];
                        let act = mask[[i, j]] * (scale_base[[i, j]] * base + scale_sp[[i, j]] * s);

                        pre[[j, i]] = xi;
                        spl[[j, i]] = s;
                        post[[j, i]] = act;
                        y[j] += act;
                    }
                }
            });

        Ok(KanOutput {
            y,
            preacts,
            postacts,
            postspline,
        })
    }

    /// Moves the grid knots towards the distribution of `x` and refits the
    /// splines so that they keep their shape over the samples.
    ///
    /// The new grid blends a uniform grid spanning the samples with one placed
    /// at their quantiles, weighted by `grid_eps`.
    ///
    /// # Arguments
    /// * `x` - A non empty `[batch, in]` set of samples.
    ///
    /// # Returns
    /// An error if the samples have an unexpected shape.
    pub fn update_grid_from_samples(&mut self, x: ArrayView2<f32>) -> Result<()> {
        let (batch, in_dim) = x.dim();
        if in_dim != self.in_dim || batch == 0 {
            return Err(NnErr::SizeMismatch {
                what: "grid update samples",
                got: batch * in_dim,
                expected: batch.max(1) * self.in_dim,
            });
        }

        let KanConfig { num, k, grid_eps, .. } = self.config;

        let mut sorted = x.to_owned();
        for mut col in sorted.columns_mut() {
            let mut values = col.to_vec();
            values.sort_by(f32::total_cmp);
            col.iter_mut().zip(values).for_each(|(c, v)| *c = v);
        }

        let curves = bspline::eval_curves(
            sorted.view(),
            view2(&self.grid)?,
            view3(self.coef.tensor())?,
            k,
        );

        let ids: Vec<_> = (0..num)
            .map(|i| (batch as f32 / num as f32 * i as f32) as usize)
            .chain([batch - 1])
            .collect();

        let mut grid = Array2::zeros((in_dim, num + 1 + 2 * k));
        for (i, mut row) in grid.outer_iter_mut().enumerate() {
            let adaptive = Array1::from_iter(ids.iter().map(|&id| sorted[[id, i]]));
            let (first, last) = (adaptive[0], adaptive[num]);
            let h = (last - first) / num as f32;

            let blended = Array1::from_iter(
                adaptive
                    .iter()
                    .enumerate()
                    .map(|(p, &a)| grid_eps * (first + h * p as f32) + (1. - grid_eps) * a),
            );

            row.assign(&bspline::extend_grid(blended.view(), k));
        }

        let coef = bspline::fit_coef(sorted.view(), curves.view(), grid.view(), k)?;

        let grid_dtype = self.grid.dtype();
        self.grid.assign(grid.into_dyn(), grid_dtype)?;
        let coef_dtype = self.coef.tensor().dtype();
        self.coef.tensor_mut().assign(coef.into_dyn(), coef_dtype)?;

        debug!(
            "updated the grids of a {} -> {} kan layer from {batch} samples",
            self.in_dim, self.out_dim
        );

        Ok(())
    }
}

impl Module for KanLayer {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix2>("kan layer", x)?;
        Ok(self.forward_traced(x.view())?.y.into_dyn())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        vec![
            ("coef".into(), &self.coef),
            ("scale_base".into(), &self.scale_base),
            ("scale_sp".into(), &self.scale_sp),
        ]
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        vec![
            ("coef".into(), &mut self.coef),
            ("scale_base".into(), &mut self.scale_base),
            ("scale_sp".into(), &mut self.scale_sp),
        ]
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        vec![("grid".into(), &self.grid), ("mask".into(), &self.mask)]
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        vec![
            ("grid".into(), &mut self.grid),
            ("mask".into(), &mut self.mask),
        ]
    }
}

fn broadcast_rows(row: &Array1<f32>, nrows: usize) -> Array2<f32> {
    Array2::from_shape_fn((nrows, row.len()), |(_, j)| row[j])
}

fn view2(tensor: &Tensor) -> Result<ArrayView2<'_, f32>> {
    Ok(tensor.data().view().into_dimensionality()?)
}

fn view3(tensor: &Tensor) -> Result<ArrayView3<'_, f32>> {
    Ok(tensor.data().view().into_dimensionality()?)
}

#[cfg(test)]
mod tests {
    use ndarray::{Array, Axis, array, s};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn layer(in_dim: usize, out_dim: usize, config: KanConfig) -> KanLayer {
        let mut rng = StdRng::seed_from_u64(7);
        KanLayer::new(in_dim, out_dim, &config, &mut rng).unwrap()
    }

    #[test]
    fn parameter_shapes() {
        let layer = layer(3, 2, KanConfig::default());

        let shapes: Vec<_> = layer
            .named_parameters()
            .into_iter()
            .map(|(name, p)| (name, p.shape().to_vec()))
            .collect();

        assert_eq!(
            shapes,
            [
                ("coef".to_string(), vec![3, 2, 8]),
                ("scale_base".to_string(), vec![3, 2]),
                ("scale_sp".to_string(), vec![3, 2]),
            ]
        );
        assert_eq!(layer.grid().shape(), [3, 12]);
        assert_eq!(layer.num_parameters(), 3 * 2 * 10);
    }

    #[test]
    fn trainable_flags_follow_config() {
        let config = KanConfig {
            sb_trainable: false,
            ..Default::default()
        };
        let layer = layer(2, 2, config);

        assert!(layer.coef().requires_grad());
        assert!(!layer.scale_base().requires_grad());
        assert!(layer.scale_sp().requires_grad());
    }

    #[test]
    fn initial_scales() {
        let config = KanConfig {
            scale_base_mu: 1.,
            scale_base_sigma: 0.,
            ..Default::default()
        };
        let layer = layer(4, 3, config);

        assert!(layer.scale_base().data().iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(layer.scale_sp().data().iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn initial_splines_are_small() {
        let layer = layer(2, 3, KanConfig::default());
        let x = Array::linspace(-1., 0.99, 20).insert_axis(Axis(1));
        let x = ndarray::concatenate![Axis(1), x, x];

        let out = layer.forward_traced(x.view()).unwrap();

        // noise is sampled in ±noise_scale / (2 * num)
        assert!(out.postspline.iter().all(|s| s.abs() < 0.2));
    }

    #[test]
    fn without_noise_the_layer_is_a_scaled_silu() {
        let config = KanConfig {
            noise_scale: 0.,
            scale_base_mu: 1.,
            scale_base_sigma: 0.,
            ..Default::default()
        };
        let layer = layer(1, 2, config);
        let x = array![[-0.5], [0.], [0.75]];

        let out = layer.forward_traced(x.view()).unwrap();

        assert_eq!(out.y.dim(), (3, 2));
        assert_eq!(out.preacts.dim(), (3, 2, 1));
        for (b, &xb) in x.iter().enumerate() {
            for j in 0..2 {
                assert!((out.y[[b, j]] - silu(xb)).abs() < 1e-5);
                assert_eq!(out.preacts[[b, j, 0]], xb);
                assert!(out.postspline[[b, j, 0]].abs() < 1e-5);
            }
        }
    }

    #[test]
    fn outputs_sum_edge_activations() {
        let layer = layer(3, 2, KanConfig::default());
        let x = array![[0.1, -0.4, 0.8], [0.5, 0.5, -0.9]];

        let out = layer.forward_traced(x.view()).unwrap();

        for b in 0..2 {
            for j in 0..2 {
                let sum: f32 = out.postacts.slice(s![b, j, ..]).sum();
                assert!((out.y[[b, j]] - sum).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn module_forward_matches_traced() {
        let layer = layer(3, 4, KanConfig::default());
        let x = array![[0.2, 0.3, -0.1]];

        let traced = layer.forward_traced(x.view()).unwrap().y;
        let plain = layer.forward(x.into_dyn()).unwrap();

        assert_eq!(plain.shape(), [1, 4]);
        assert_eq!(plain, traced.into_dyn());
    }

    #[test]
    fn wrong_input_width() {
        let layer = layer(3, 2, KanConfig::default());

        assert!(layer.forward_traced(Array2::zeros((1, 2)).view()).is_err());
        assert!(layer.forward(ArrayD::zeros(ndarray::IxDyn(&[1, 2, 3]))).is_err());
    }

    #[test]
    fn invalid_dims() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(KanLayer::new(0, 2, &KanConfig::default(), &mut rng).is_err());
        assert!(KanLayer::new(2, 0, &KanConfig::default(), &mut rng).is_err());
    }

    #[test]
    fn grid_update_over_the_same_range_keeps_the_splines() {
        let mut layer = layer(2, 2, KanConfig::default());
        let x = Array::linspace(-1., 1., 101).insert_axis(Axis(1));
        let x = ndarray::concatenate![Axis(1), x, x];
        let grid_before = layer.grid().data().clone();
        let before = layer.forward_traced(x.view()).unwrap();

        layer.update_grid_from_samples(x.view()).unwrap();

        let after = layer.forward_traced(x.view()).unwrap();
        for (a, b) in grid_before.iter().zip(layer.grid().data().iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        for (a, b) in before.postspline.iter().zip(after.postspline.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn grid_update_moves_knots_to_the_samples() {
        let mut layer = layer(1, 1, KanConfig::default());
        let x = Array::linspace(0., 2., 101).insert_axis(Axis(1));

        layer.update_grid_from_samples(x.view()).unwrap();

        let grid = view2(layer.grid()).unwrap();
        assert!(grid[[0, 3]].abs() < 1e-5);
        assert!((grid[[0, 8]] - 2.).abs() < 1e-5);
        assert!((grid[[0, 0]] + 1.2).abs() < 1e-5);
    }

    #[test]
    fn grid_update_rejects_empty_batch() {
        let mut layer = layer(2, 2, KanConfig::default());
        assert!(layer.update_grid_from_samples(Array2::zeros((0, 2)).view()).is_err());
    }
}
