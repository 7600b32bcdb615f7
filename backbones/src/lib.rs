//! Image classification backbones with the parameter layout of their
//! reference implementations, plus safetensors weight loading.

mod densenet;
mod error;
mod init;
mod vgg;
pub mod weights;

pub use densenet::{DenseNet, DenseNetConfig, DenseNetVersion};
pub use error::{BackboneErr, Result};
pub use vgg::{IMAGENET_CLASSES, Vgg16, vgg16};
pub use weights::load_safetensors;
