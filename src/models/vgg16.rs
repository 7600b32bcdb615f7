use std::path::PathBuf;

use backbones::{Vgg16, load_safetensors, vgg16};
use log::info;
use ndarray::ArrayD;
use nn::{Layer, Linear, Module, Param, Tensor, module::scoped};
use serde::{Deserialize, Serialize};

use crate::{ModelErr, Result, config::default_weights_path};

/// Position of the output layer inside the VGG16 classifier.
pub const HEAD_INDEX: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vgg16Config {
    pub num_classes: usize,
    /// Load pretrained weights before replacing the head.
    pub pretrained: bool,
    pub freeze_backbone: bool,
    /// Pretrained weights file, `vgg16.safetensors` in the weights directory by default.
    pub weights: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for Vgg16Config {
    fn default() -> Self {
        Self {
            num_classes: 20,
            pretrained: true,
            freeze_backbone: true,
            weights: None,
            seed: None,
        }
    }
}

impl Vgg16Config {
    pub fn weights_path(&self) -> PathBuf {
        self.weights
            .clone()
            .unwrap_or_else(|| default_weights_path("vgg16.safetensors"))
    }
}

/// VGG16 whose last classifier layer maps to the task's classes.
#[derive(Debug)]
pub struct Vgg16Classifier {
    vgg16: Vgg16,
    num_classes: usize,
}

impl Vgg16Classifier {
    /// Builds VGG16, optionally loads and freezes it, and replaces
    /// `classifier.6` with a trainable `Linear(4096, num_classes)`.
    ///
    /// # Returns
    /// The classifier or the error raised while building or loading the backbone.
    pub fn new(config: &Vgg16Config) -> Result<Self> {
        let mut rng = super::rng(config.seed);
        let mut vgg16 = vgg16(&mut rng)?;

        if config.pretrained {
            load_safetensors(&mut vgg16, &config.weights_path())?;
        }

        if config.freeze_backbone {
            vgg16.freeze();
        }

        let in_features = match vgg16.classifier().get(HEAD_INDEX) {
            Some(Layer::Linear(linear)) => linear.in_features(),
            other => {
                return Err(ModelErr::Config(format!(
                    "classifier.{HEAD_INDEX} should be linear, found {other:?}"
                )));
            }
        };

        let head = Linear::new(in_features, config.num_classes, &mut rng)?;
        vgg16
            .classifier_mut()
            .replace(HEAD_INDEX, Layer::Linear(head));

        info!(
            "vgg16 classifier ready: {in_features} -> {} classes, pretrained: {}, frozen backbone: {}",
            config.num_classes, config.pretrained, config.freeze_backbone
        );

        Ok(Self {
            vgg16,
            num_classes: config.num_classes,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn backbone(&self) -> &Vgg16 {
        &self.vgg16
    }

    /// Returns the substituted output layer.
    pub fn head(&self) -> Option<&Linear> {
        match self.vgg16.classifier().get(HEAD_INDEX) {
            Some(Layer::Linear(linear)) => Some(linear),
            _ => None,
        }
    }
}

impl Module for Vgg16Classifier {
    fn forward(&self, x: ArrayD<f32>) -> nn::Result<ArrayD<f32>> {
        self.vgg16.forward(x)
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        scoped("vgg16", self.vgg16.named_parameters()).collect()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        scoped("vgg16", self.vgg16.named_parameters_mut()).collect()
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        scoped("vgg16", self.vgg16.named_buffers()).collect()
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        scoped("vgg16", self.vgg16.named_buffers_mut()).collect()
    }
}
