//! Image classifiers built by attaching new heads to convolutional backbones:
//! VGG16 with a replaced output layer and DenseNet followed by
//! Kolmogorov-Arnold layers, plus parameter and size diagnostics.

pub mod config;
pub mod device;
pub mod diagnostics;
mod error;
pub mod models;

pub use config::RunConfig;
pub use device::Device;
pub use diagnostics::{
    ModelSize, ParameterReport, count_trainable_parameters, estimate_model_size_bytes,
    report_parameters, write_trainable_total,
};
pub use error::{ModelErr, Result};
pub use models::{DenseNetKan, DenseNetKanConfig, Vgg16Classifier, Vgg16Config};
