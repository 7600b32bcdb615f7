//! Kolmogorov-Arnold network layers.
//!
//! A [`KanLayer`] replaces the fixed activations and linear maps of a dense
//! layer with a learnable B-spline activation on every edge.

pub mod bspline;
mod config;
mod layer;

pub use config::KanConfig;
pub use layer::{KanLayer, KanOutput};
