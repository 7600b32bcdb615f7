//! Classifiers assembled from a pretrained backbone and a new head.

mod densenet_kan;
mod vgg16;

use rand::{SeedableRng, rngs::StdRng};

pub use densenet_kan::{DenseNetKan, DenseNetKanConfig, KAN_HIDDEN, spline_head_kan};
pub use vgg16::{HEAD_INDEX, Vgg16Classifier, Vgg16Config};

/// Seeded runs are reproducible, unseeded ones draw from the OS.
fn rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)
}
