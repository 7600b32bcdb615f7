use std::{fmt, str::FromStr};

use log::debug;
use ndarray::{ArrayD, Axis, concatenate};
use nn::{
    AdaptiveAvgPool2d, BatchNorm2d, Layer, Module, Param, Pool2d, Sequential, Tensor,
    layers::{activation::relu, flatten},
    module::scoped,
};
use rand::Rng;

use crate::{
    BackboneErr,
    init::{ConvSpec, Fan, kaiming_conv, zero_bias_linear},
    vgg::IMAGENET_CLASSES,
};

/// Width multiplier of the bottleneck convolution of every dense layer.
const BN_SIZE: usize = 4;

/// The published DenseNet depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenseNetVersion {
    V121,
    V161,
    V169,
    V201,
}

/// Hyperparameters of a DenseNet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseNetConfig {
    /// Channels every dense layer adds.
    pub growth_rate: usize,
    /// Dense layers of each of the four blocks.
    pub block_config: [usize; 4],
    /// Channels produced by the stem convolution.
    pub num_init_features: usize,
    pub num_classes: usize,
}

impl DenseNetVersion {
    pub const ALL: [DenseNetVersion; 4] = [Self::V121, Self::V161, Self::V169, Self::V201];

    pub fn config(self) -> DenseNetConfig {
        let (growth_rate, block_config, num_init_features) = match self {
            Self::V121 => (32, [6, 12, 24, 16], 64),
            Self::V161 => (48, [6, 12, 36, 24], 96),
            Self::V169 => (32, [6, 12, 32, 32], 64),
            Self::V201 => (32, [6, 12, 48, 32], 64),
        };

        DenseNetConfig {
            growth_rate,
            block_config,
            num_init_features,
            num_classes: IMAGENET_CLASSES,
        }
    }

    /// Returns the depth as written in the architecture's name.
    pub fn depth(self) -> &'static str {
        match self {
            Self::V121 => "121",
            Self::V161 => "161",
            Self::V169 => "169",
            Self::V201 => "201",
        }
    }
}

impl fmt::Display for DenseNetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "densenet{}", self.depth())
    }
}

impl FromStr for DenseNetVersion {
    type Err = BackboneErr;

    /// Parses a depth such as `"121"`, the `densenet` prefix is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let depth = s.trim();
        let depth = depth.strip_prefix("densenet").unwrap_or(depth);

        Self::ALL
            .into_iter()
            .find(|version| version.depth() == depth)
            .ok_or_else(|| BackboneErr::UnsupportedVersion(s.to_string()))
    }
}

/// A bottleneck layer whose output is concatenated to its input along the
/// channel axis.
struct DenseLayer {
    layers: Sequential,
}

impl DenseLayer {
    fn new<R: Rng>(in_channels: usize, growth_rate: usize, rng: &mut R) -> nn::Result<Self> {
        let bottleneck = BN_SIZE * growth_rate;

        let layers = Sequential::named([
            ("norm1", Layer::BatchNorm2d(BatchNorm2d::new(in_channels))),
            ("relu1", Layer::Relu),
            (
                "conv1",
                Layer::Conv2d(kaiming_conv(
                    in_channels,
                    bottleneck,
                    ConvSpec::new(1, 1, 0, false),
                    Fan::In,
                    rng,
                )?),
            ),
            ("norm2", Layer::BatchNorm2d(BatchNorm2d::new(bottleneck))),
            ("relu2", Layer::Relu),
            (
                "conv2",
                Layer::Conv2d(kaiming_conv(
                    bottleneck,
                    growth_rate,
                    ConvSpec::new(3, 1, 1, false),
                    Fan::In,
                    rng,
                )?),
            ),
        ]);

        Ok(Self { layers })
    }
}

impl Module for DenseLayer {
    fn forward(&self, x: ArrayD<f32>) -> nn::Result<ArrayD<f32>> {
        let new_features = self.layers.forward(x.clone())?;
        Ok(concatenate(Axis(1), &[x.view(), new_features.view()])?)
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.layers.named_parameters()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        self.layers.named_parameters_mut()
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        self.layers.named_buffers()
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        self.layers.named_buffers_mut()
    }
}

fn dense_block<R: Rng>(
    num_layers: usize,
    in_channels: usize,
    growth_rate: usize,
    rng: &mut R,
) -> nn::Result<Sequential> {
    let mut block = Sequential::default();

    for i in 0..num_layers {
        let layer = DenseLayer::new(in_channels + i * growth_rate, growth_rate, rng)?;
        block.push(format!("denselayer{}", i + 1), Layer::custom(layer));
    }

    Ok(block)
}

fn transition<R: Rng>(in_channels: usize, out_channels: usize, rng: &mut R) -> nn::Result<Sequential> {
    let conv = kaiming_conv(
        in_channels,
        out_channels,
        ConvSpec::new(1, 1, 0, false),
        Fan::In,
        rng,
    )?;

    Ok(Sequential::named([
        ("norm", Layer::BatchNorm2d(BatchNorm2d::new(in_channels))),
        ("relu", Layer::Relu),
        ("conv", Layer::Conv2d(conv)),
        ("pool", Layer::Pool2d(Pool2d::avg(2, 2)?)),
    ]))
}

/// A densely connected convolutional network.
///
/// The classifier is swappable, replacing it with [`Layer::Identity`] turns the
/// network into a feature extractor that outputs the pooled features.
#[derive(Debug)]
pub struct DenseNet {
    version: Option<DenseNetVersion>,
    num_features: usize,
    features: Sequential,
    classifier: Layer,
}

impl DenseNet {
    /// Creates a randomly initialized DenseNet out of its hyperparameters.
    ///
    /// Convolutions use Kaiming normal weights, batch normalizations start as
    /// the identity and the classifier bias at zero.
    ///
    /// # Arguments
    /// * `config` - The architecture hyperparameters.
    /// * `rng` - The random number generator to initialize the parameters with.
    pub fn new<R: Rng>(config: DenseNetConfig, rng: &mut R) -> nn::Result<Self> {
        let DenseNetConfig {
            growth_rate,
            block_config,
            num_init_features,
            num_classes,
        } = config;

        let stem = kaiming_conv(
            3,
            num_init_features,
            ConvSpec::new(7, 2, 3, false),
            Fan::In,
            rng,
        )?;

        let mut features = Sequential::named([
            ("conv0", Layer::Conv2d(stem)),
            ("norm0", Layer::BatchNorm2d(BatchNorm2d::new(num_init_features))),
            ("relu0", Layer::Relu),
            ("pool0", Layer::Pool2d(Pool2d::max(3, 2, 1)?)),
        ]);

        let mut channels = num_init_features;
        for (i, &num_layers) in block_config.iter().enumerate() {
            let block = dense_block(num_layers, channels, growth_rate, rng)?;
            features.push(format!("denseblock{}", i + 1), Layer::Sequential(block));
            channels += num_layers * growth_rate;

            if i + 1 != block_config.len() {
                let trans = transition(channels, channels / 2, rng)?;
                features.push(format!("transition{}", i + 1), Layer::Sequential(trans));
                channels /= 2;
            }
        }

        features.push("norm5", Layer::BatchNorm2d(BatchNorm2d::new(channels)));

        let classifier = Layer::Linear(zero_bias_linear(channels, num_classes, rng)?);

        Ok(Self {
            version: None,
            num_features: channels,
            features,
            classifier,
        })
    }

    /// Creates one of the published DenseNet variants with a 1000 class head.
    pub fn from_version<R: Rng>(version: DenseNetVersion, rng: &mut R) -> nn::Result<Self> {
        let mut model = Self::new(version.config(), rng)?;
        model.version = Some(version);

        debug!("built {version} with {} parameters", model.num_parameters());
        Ok(model)
    }

    pub fn version(&self) -> Option<DenseNetVersion> {
        self.version
    }

    /// Returns the amount of channels the feature extractor produces.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn features(&self) -> &Sequential {
        &self.features
    }

    pub fn classifier(&self) -> &Layer {
        &self.classifier
    }

    /// Width of the input of the classifier, which is always the amount of
    /// pooled features.
    pub fn classifier_in_features(&self) -> usize {
        match &self.classifier {
            Layer::Linear(linear) => linear.in_features(),
            _ => self.num_features,
        }
    }

    /// Replaces the classifier, returning the previous one.
    pub fn set_classifier(&mut self, classifier: Layer) -> Layer {
        std::mem::replace(&mut self.classifier, classifier)
    }
}

impl Module for DenseNet {
    fn forward(&self, x: ArrayD<f32>) -> nn::Result<ArrayD<f32>> {
        let x = self.features.forward(x)?;
        let x = AdaptiveAvgPool2d::new((1, 1)).forward(x.mapv_into(relu))?;
        self.classifier.forward(flatten(x)?)
    }

    fn named_parameters(&self) -> Vec<(String, &Param)> {
        scoped("features", self.features.named_parameters())
            .chain(scoped("classifier", self.classifier.named_parameters()))
            .collect()
    }

    fn named_parameters_mut(&mut self) -> Vec<(String, &mut Param)> {
        scoped("features", self.features.named_parameters_mut())
            .chain(scoped("classifier", self.classifier.named_parameters_mut()))
            .collect()
    }

    fn named_buffers(&self) -> Vec<(String, &Tensor)> {
        scoped("features", self.features.named_buffers()).collect()
    }

    fn named_buffers_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        scoped("features", self.features.named_buffers_mut()).collect()
    }
}
