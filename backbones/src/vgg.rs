use log::debug;
use ndarray::ArrayD;
use nn::{
    AdaptiveAvgPool2d, Dropout, Layer, Module, Param, Pool2d, Result, Sequential,
    layers::flatten, module::scoped,
};
use rand::Rng;

use crate::init::{ConvSpec, Fan, kaiming_conv, normal_linear};

/// Output channels of each convolution of VGG16, `None` marks a max pooling.
const VGG16_CFG: [Option<usize>; 18] = [
    Some(64),
    Some(64),
    None,
    Some(128),
    Some(128),
    None,
    Some(256),
    Some(256),
    Some(256),
    None,
    Some(512),
    Some(512),
    Some(512),
    None,
    Some(512),
    Some(512),
    Some(512),
    None,
];

const POOLED_SIZE: usize = 7;
const HIDDEN: usize = 4096;

/// Classes of the ImageNet head the network is created with.
pub const IMAGENET_CLASSES: usize = 1000;

/// The VGG16 network (configuration D, no batch normalization).
///
/// Parameters are named as in the reference checkpoints: `features.{i}.*` for
/// the convolutional stack and `classifier.{0,3,6}.*` for the dense head.
#[derive(Debug)]
pub struct Vgg16 {
    features: Sequential,
    avgpool: AdaptiveAvgPool2d,
    classifier: Sequential,
}

/// Creates a randomly initialized VGG16 with a 1000 class head.
///
/// Convolutions use Kaiming normal weights scaled by their fan out, linear
/// layers use `N(0, 0.01²)`, every bias starts at zero.
///
/// # Arguments
/// * `rng` - The random number generator to initialize the parameters with.
pub fn vgg16<R: Rng>(rng: &mut R) -> Result<Vgg16> {
    let mut features = Vec::new();
    let mut channels = 3;

    for out in VGG16_CFG {
        match out {
            Some(out) => {
                let spec = ConvSpec::new(3, 1, 1, true);
                features.push(Layer::Conv2d(kaiming_conv(channels, out, spec, Fan::Out, rng)?));
                features.push(Layer::Relu);
                channels = out;
            }
            None => features.push(Layer::Pool2d(Pool2d::max(2, 2, 0)?)),
        }
    }

    let flat = channels * POOLED_SIZE * POOLED_SIZE;
    let classifier = Sequential::new([
        Layer::Linear(normal_linear(flat, HIDDEN, 0.01, rng)?),
        Layer::Relu,
        Layer::Dropout(Dropout::new(0.5)?),
        Layer::Linear(normal_linear(HIDDEN, HIDDEN, 0.01, rng)?),
        Layer::Relu,
        Layer::Dropout(Dropout::new(0.5)?),
        Layer::Linear(normal_linear(HIDDEN, IMAGENET_CLASSES, 0.01, rng)?),
    ]);

    let model = Vgg16 {
        features: Sequential::new(features),
        avgpool: AdaptiveAvgPool2d::new((POOLED_SIZE, POOLED_SIZE)),
        classifier,
    };

    debug!("built vgg16 with {} parameters", model.num_parameters());
    Ok(model)
}

impl Vgg16 {
    pub fn features(&self) -> &Sequential {
        &self.features
    }

    pub fn classifier(&self) -> &Sequential {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut Sequential {
        &mut self.classifier
    }
}

impl Module for Vgg16 {
    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let x = self.features.forward(x)?;
        let x = self.avgpool.forward(x)?;
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
}
