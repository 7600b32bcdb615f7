pub mod activation;
mod batch_norm;
mod conv;
mod dropout;
mod layer;
mod linear;
mod pool;

pub use batch_norm::BatchNorm2d;
pub use conv::Conv2d;
pub use dropout::Dropout;
pub use layer::{Layer, flatten};
pub use linear::Linear;
pub use pool::{AdaptiveAvgPool2d, Pool2d, PoolKind};
