//! Inference-only neural network building blocks on top of `ndarray`.
//!
//! Parameters carry a trainable flag and a storage dtype so that models built
//! here can be frozen, inspected and sized the same way a training framework
//! would report them.

mod dtype;
pub mod error;
pub mod init;
pub mod layers;
pub mod module;
mod sequential;
mod tensor;

pub use dtype::DType;
pub use error::{NnErr, Result};
pub use layers::{
    AdaptiveAvgPool2d, BatchNorm2d, Conv2d, Dropout, Layer, Linear, Pool2d, PoolKind,
};
pub use module::Module;
pub use sequential::Sequential;
pub use tensor::{Param, Tensor};
