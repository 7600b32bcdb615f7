use ndarray::{Array4, ArrayD, Ix4, Zip, s};

use crate::{Module, NnErr, Param, Result, module::expect_rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    /// Padded cells count towards the average.
    Avg,
}

/// A sliding window pooling over the spatial axes of `[N, C, H, W]` tensors.
#[derive(Debug, Clone)]
pub struct Pool2d {
    kind: PoolKind,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Pool2d {
    /// Creates a new `Pool2d`.
    ///
    /// # Arguments
    /// * `kind` - Whether to take the maximum or the average of each window.
    /// * `kernel_size` - The side of the square window.
    /// * `stride` - The step between windows.
    /// * `padding` - The implicit padding on every side.
    ///
    /// # Returns
    /// A new `Pool2d` or an error if the window is empty, the stride is zero or
    /// the padding is larger than half the window.
    pub fn new(kind: PoolKind, kernel_size: usize, stride: usize, padding: usize) -> Result<Self> {
        if kernel_size == 0 || stride == 0 || 2 * padding > kernel_size {
            return Err(NnErr::InvalidConfig(format!(
                "invalid pooling window: kernel {kernel_size}, stride {stride}, padding {padding}"
            )));
        }

        Ok(Self {
            kind,
            kernel_size,
            stride,
            padding,
        })
    }

    pub fn max(kernel_size: usize, stride: usize, padding: usize) -> Result<Self> {
        Self::new(PoolKind::Max, kernel_size, stride, padding)
    }

    pub fn avg(kernel_size: usize, stride: usize) -> Result<Self> {
        Self::new(PoolKind::Avg, kernel_size, stride, 0)
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    fn output_size(&self, size: usize) -> Option<usize> {
        (size + 2 * self.padding)
            .checked_sub(self.kernel_size)
            .map(|span| span / self.stride + 1)
    }
}

impl Module for Pool2d {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>("pool2d", x)?;
        let (n, c, h, w) = x.dim();

        let (Some(oh), Some(ow)) = (self.output_size(h), self.output_size(w)) else {
            return Err(NnErr::InvalidConfig(format!(
                "pool2d input of {h}x{w} is smaller than the {k}x{k} window",
                k = self.kernel_size
            )));
        };

        let window = (self.kernel_size * self.kernel_size) as f32;
        let mut y = Array4::zeros((n, c, oh, ow));

        Zip::from(y.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut y, x| {
                for ((ch, oy, ox), out) in y.indexed_iter_mut() {
                    // window bounds clipped to the unpadded input
                    let y0 = (oy * self.stride).saturating_sub(self.padding);
                    let x0 = (ox * self.stride).saturating_sub(self.padding);
                    let y1 = (oy * self.stride + self.kernel_size - self.padding).min(h);
                    let x1 = (ox * self.stride + self.kernel_size - self.padding).min(w);

                    let cells = x.slice(s![ch, y0..y1, x0..x1]);
                    *out = match self.kind {
                        PoolKind::Max => cells.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v)),
                        PoolKind::Avg => cells.sum() / window,
                    };
                }
            });

        Ok(y.into_dyn())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        Vec::new()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        Vec::new()
    }
}

/// Averages the spatial axes of `[N, C, H, W]` tensors down to a fixed size,
/// whatever the input size.
#[derive(Debug, Clone)]
pub struct AdaptiveAvgPool2d {
    output_size: (usize, usize),
}

impl AdaptiveAvgPool2d {
    pub fn new(output_size: (usize, usize)) -> Self {
        Self { output_size }
    }

    pub fn output_size(&self) -> (usize, usize) {
        self.output_size
    }
}

/// Returns the input range averaged into output cell `i` out of `out` for an input of `size`.
fn adaptive_bin(i: usize, out: usize, size: usize) -> (usize, usize) {
    let start = i * size / out;
    let end = ((i + 1) * size).div_ceil(out);
    (start, end)
}

impl Module for AdaptiveAvgPool2d {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = expect_rank::<Ix4>("adaptive_avg_pool2d", x)?;
        let (n, c, h, w) = x.dim();
        let (oh, ow) = self.output_size;

        if h == 0 || w == 0 || oh == 0 || ow == 0 {
            return Err(NnErr::InvalidConfig(format!(
                "cannot adaptively pool {h}x{w} into {oh}x{ow}"
            )));
        }

        let mut y = Array4::zeros((n, c, oh, ow));

        Zip::from(y.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut y, x| {
                for ((ch, oy, ox), out) in y.indexed_iter_mut() {
                    let (y0, y1) = adaptive_bin(oy, oh, h);
                    let (x0, x1) = adaptive_bin(ox, ow, w);

                    let cells = x.slice(s![ch, y0..y1, x0..x1]);
                    *out = cells.sum() / cells.len() as f32;
                }
            });

        Ok(y.into_dyn())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        Vec::new()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    fn ramp(n: usize, c: usize, h: usize, w: usize) -> ArrayD<f32> {
        Array::range(0., (n * c * h * w) as f32, 1.)
            .into_shape_with_order((n, c, h, w))
            .unwrap()
            .into_dyn()
    }

    #[test]
    fn max_pool_halves() {
        let pool = Pool2d::max(2, 2, 0).unwrap();
        let y = pool.forward(ramp(1, 1, 4, 4)).unwrap();

        assert_eq!(y.shape(), [1, 1, 2, 2]);
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), [5., 7., 13., 15.]);
    }

    #[test]
    fn padded_max_pool_keeps_size_ratio() {
        // the stem pooling of densenets: 3x3 window, stride 2, padding 1
        let pool = Pool2d::max(3, 2, 1).unwrap();
        let y = pool.forward(ramp(2, 3, 8, 8)).unwrap();

        assert_eq!(y.shape(), [2, 3, 4, 4]);
        assert_eq!(y[[0, 0, 0, 0]], 9.);
    }

    #[test]
    fn avg_pool() {
        let pool = Pool2d::avg(2, 2).unwrap();
        let y = pool.forward(ramp(1, 1, 2, 2)).unwrap();

        assert_eq!(y.shape(), [1, 1, 1, 1]);
        assert_eq!(y[[0, 0, 0, 0]], 1.5);
    }

    #[test]
    fn adaptive_pool_to_one() {
        let pool = AdaptiveAvgPool2d::new((1, 1));
        let y = pool.forward(ramp(1, 2, 3, 3)).unwrap();

        assert_eq!(y.shape(), [1, 2, 1, 1]);
        assert_eq!(y[[0, 0, 0, 0]], 4.);
        assert_eq!(y[[0, 1, 0, 0]], 13.);
    }

    #[test]
    fn adaptive_pool_upsamples_small_maps() {
        let pool = AdaptiveAvgPool2d::new((7, 7));
        let y = pool.forward(ArrayD::from_elem(vec![1, 4, 1, 1], 2.)).unwrap();

        assert_eq!(y.shape(), [1, 4, 7, 7]);
        assert!(y.iter().all(|&v| v == 2.));
    }

    #[test]
    fn adaptive_bins_cover_the_input() {
        assert_eq!(adaptive_bin(0, 7, 14), (0, 2));
        assert_eq!(adaptive_bin(6, 7, 14), (12, 14));
        assert_eq!(adaptive_bin(1, 3, 5), (1, 4));
    }
}
