use backbones::{DenseNet, DenseNetConfig, DenseNetVersion};
use ndarray::{ArrayD, IxDyn};
use nn::{Layer, Module};
use rand::{SeedableRng, rngs::StdRng};

fn build(version: DenseNetVersion) -> DenseNet {
    let mut rng = StdRng::seed_from_u64(0);
    DenseNet::from_version(version, &mut rng).unwrap()
}

#[test]
fn densenet121_matches_reference_size() {
    let model = build(DenseNetVersion::V121);

    assert_eq!(model.num_parameters(), 7_978_856);
    assert_eq!(model.classifier_in_features(), 1024);
    assert_eq!(model.version(), Some(DenseNetVersion::V121));
}

#[test]
fn classifier_widths() {
    for (version, width) in [
        (DenseNetVersion::V161, 2208),
        (DenseNetVersion::V169, 1664),
        (DenseNetVersion::V201, 1920),
    ] {
        assert_eq!(build(version).classifier_in_features(), width, "{version}");
    }
}

#[test]
fn parameter_names() {
    let model = build(DenseNetVersion::V121);
    let names: Vec<_> = model.named_parameters().into_iter().map(|(n, _)| n).collect();

    assert_eq!(names.first().map(String::as_str), Some("features.conv0.weight"));
    assert!(names.contains(&"features.denseblock1.denselayer1.norm1.weight".to_string()));
    assert!(names.contains(&"features.denseblock4.denselayer16.conv2.weight".to_string()));
    assert!(names.contains(&"features.transition3.conv.weight".to_string()));
    assert_eq!(
        &names[names.len() - 2..],
        ["classifier.weight", "classifier.bias"]
    );

    let buffers: Vec<_> = model.named_buffers().into_iter().map(|(n, _)| n).collect();
    assert!(buffers.contains(&"features.norm5.running_var".to_string()));
    assert!(buffers.contains(&"features.norm0.num_batches_tracked".to_string()));
}

#[test]
fn identity_classifier_exposes_features() {
    let mut model = build(DenseNetVersion::V121);
    let before = model.num_parameters();

    let old = model.set_classifier(Layer::Identity);

    assert!(matches!(old, Layer::Linear(_)));
    assert_eq!(model.num_parameters(), before - (1024 * 1000 + 1000));
    assert_eq!(model.classifier_in_features(), 1024);

    let y = model.forward(ArrayD::zeros(IxDyn(&[2, 3, 32, 32]))).unwrap();
    assert_eq!(y.shape(), [2, 1024]);
    assert!(y.iter().all(|v| v.is_finite() && *v >= 0.));
}

#[test]
fn small_custom_network() {
    let config = DenseNetConfig {
        growth_rate: 4,
        block_config: [1, 1, 1, 1],
        num_init_features: 8,
        num_classes: 5,
    };
    let mut rng = StdRng::seed_from_u64(3);
    let model = DenseNet::new(config, &mut rng).unwrap();

    // 8 -> 12 -> 6 -> 10 -> 5 -> 9 -> 4 -> 8
    assert_eq!(model.num_features(), 8);
    assert_eq!(model.version(), None);

    let y = model.forward(ArrayD::ones(IxDyn(&[1, 3, 64, 64]))).unwrap();
    assert_eq!(y.shape(), [1, 5]);
}
