use std::path::PathBuf;

use backbones::{DenseNet, DenseNetVersion, load_safetensors};
use kan::{KanConfig, KanLayer};
use log::{info, warn};
use ndarray::{ArrayD, ArrayView2, Ix2};
use nn::{
    Layer, Module, Param, Tensor,
    layers::flatten,
    module::{expect_rank, scoped},
};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::{Map, Value};

use crate::{Result, config::default_weights_path};

/// Width of the features the first spline layer produces.
pub const KAN_HIDDEN: usize = 256;
const DEFAULT_HIDDEN_DIMS: [usize; 2] = [512, 256];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseNetKanConfig {
    /// Accepted for compatibility, the spline head is always `features -> 256 -> classes`.
    pub hidden_dims: Option<Vec<usize>>,
    pub num_classes: usize,
    pub pretrained: bool,
    pub freeze_backbone: bool,
    /// One of `"121"`, `"161"`, `"169"` or `"201"`.
    pub densenet_version: String,
    /// Hyperparameters shared by both spline layers. Fields left out keep
    /// the values of [`spline_head_kan`], not those of `KanConfig::default`.
    #[serde(deserialize_with = "deserialize_spline_head_kan")]
    pub kan: KanConfig,
    /// Pretrained weights file, `densenet{version}.safetensors` in the weights directory by default.
    pub weights: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for DenseNetKanConfig {
    fn default() -> Self {
        Self {
            hidden_dims: None,
            num_classes: 11,
            pretrained: true,
            freeze_backbone: true,
            densenet_version: "121".to_string(),
            kan: spline_head_kan(),
            weights: None,
            seed: None,
        }
    }
}

/// The spline settings of the DenseNet head: those of a plain `KanConfig`
/// with a smaller initial noise.
pub fn spline_head_kan() -> KanConfig {
    KanConfig {
        noise_scale: 0.1,
        ..Default::default()
    }
}

/// Lays the given `kan` fields over [`spline_head_kan`].
fn deserialize_spline_head_kan<'de, D>(deserializer: D) -> std::result::Result<KanConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = Map::<String, Value>::deserialize(deserializer)?;

    let Value::Object(mut merged) = serde_json::to_value(spline_head_kan()).map_err(D::Error::custom)?
    else {
        return Err(D::Error::custom("spline settings are not a map"));
    };
    merged.extend(overrides);

    serde_json::from_value(Value::Object(merged)).map_err(D::Error::custom)
}

impl DenseNetKanConfig {
    pub fn hidden_dims(&self) -> Vec<usize> {
        self.hidden_dims
            .clone()
            .unwrap_or_else(|| DEFAULT_HIDDEN_DIMS.to_vec())
    }

    /// The `hidden_dims` given explicitly, which the spline head never follows.
    pub fn ignored_hidden_dims(&self) -> Option<&[usize]> {
        self.hidden_dims.as_deref()
    }

    fn weights_path(&self, version: DenseNetVersion) -> PathBuf {
        self.weights
            .clone()
            .unwrap_or_else(|| default_weights_path(&format!("{version}.safetensors")))
    }
}

/// A DenseNet feature extractor followed by two Kolmogorov-Arnold layers.
#[derive(Debug)]
pub struct DenseNetKan {
    densenet: DenseNet,
    kan_layer1: KanLayer,
    kan_layer2: KanLayer,
}

impl DenseNetKan {
    /// Builds the selected DenseNet, optionally loads and freezes it, drops
    /// its classifier and appends the spline head.
    ///
    /// The version is checked before anything is allocated.
    ///
    /// # Returns
    /// The model, an `UnsupportedVersion` error naming an unknown version, or
    /// the error raised while building or loading any of the parts.
    pub fn new(config: &DenseNetKanConfig) -> Result<Self> {
        let version: DenseNetVersion = config.densenet_version.parse()?;
        config.kan.validate()?;

        if let Some(dims) = config.ignored_hidden_dims() {
            warn!("hidden_dims {dims:?} is ignored, the spline head uses {KAN_HIDDEN} hidden features");
        }

        let mut rng = super::rng(config.seed);
        let mut densenet = DenseNet::from_version(version, &mut rng)?;

        if config.pretrained {
            load_safetensors(&mut densenet, &config.weights_path(version))?;
        }

        if config.freeze_backbone {
            densenet.freeze();
        }

        let num_features = densenet.classifier_in_features();
        densenet.set_classifier(Layer::Identity);

        let kan_layer1 = KanLayer::new(num_features, KAN_HIDDEN, &config.kan, &mut rng)?;
        let kan_layer2 = KanLayer::new(KAN_HIDDEN, config.num_classes, &config.kan, &mut rng)?;

        info!(
            "{version} + kan ready: {num_features} -> {KAN_HIDDEN} -> {} classes, pretrained: {}, frozen backbone: {}",
            config.num_classes, config.pretrained, config.freeze_backbone
        );

        Ok(Self {
            densenet,
            kan_layer1,
            kan_layer2,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.kan_layer2.out_dim()
    }

    pub fn backbone(&self) -> &DenseNet {
        &self.densenet
    }

    pub fn kan_layer1(&self) -> &KanLayer {
        &self.kan_layer1
    }

    pub fn kan_layer2(&self) -> &KanLayer {
        &self.kan_layer2
    }

    /// Runs the backbone, returning the `[N, features]` inputs of the spline head.
    pub fn features(&self, x: ArrayD<f32>) -> nn::Result<ArrayD<f32>> {
        flatten(self.densenet.forward(x)?)
    }

    /// Adapts the grids of both spline layers to the features `x` produces.
    ///
    /// # Arguments
    /// * `x` - A `[N, 3, H, W]` batch of images.
    pub fn update_grids(&mut self, x: ArrayD<f32>) -> nn::Result<()> {
        let features = expect_rank::<Ix2>("spline head", self.features(x)?)?;

        self.kan_layer1.update_grid_from_samples(features.view())?;
        let hidden = self.kan_layer1.forward_traced(features.view())?.y;
        self.kan_layer2.update_grid_from_samples(hidden.view())
    }

    fn head(&self, features: ArrayView2<f32>) -> nn::Result<ArrayD<f32>> {
        let hidden = self.kan_layer1.forward_traced(features)?.y;
        Ok(self.kan_layer2.forward_traced(hidden.view())?.y.into_dyn())
    }
}

impl Module for DenseNetKan {
    fn forward(&self, x: ArrayD<f32>) -> nn::Result<ArrayD<f32>> {
        let features = expect_rank::<Ix2>("spline head", self.features(x)?)?;
        self.head(features.view())
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        scoped("densenet", self.densenet.named_parameters())
            .chain(scoped("kan_layer1", self.kan_layer1.named_parameters()))
            .chain(scoped("kan_layer2", self.kan_layer2.named_parameters()))
            .collect()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        scoped("densenet", self.densenet.named_parameters_mut())
            .chain(scoped("kan_layer1", self.kan_layer1.named_parameters_mut()))
            .chain(scoped("kan_layer2", self.kan_layer2.named_parameters_mut()))
            .collect()
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        scoped("densenet", self.densenet.named_buffers())
            .chain(scoped("kan_layer1", self.kan_layer1.named_buffers()))
            .chain(scoped("kan_layer2", self.kan_layer2.named_buffers()))
            .collect()
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        scoped("densenet", self.densenet.named_buffers_mut())
            .chain(scoped("kan_layer1", self.kan_layer1.named_buffers_mut()))
            .chain(scoped("kan_layer2", self.kan_layer2.named_buffers_mut()))
            .collect()
    }
}
