use std::path::Path;

use backbone_heads::{
    DenseNetKan, DenseNetKanConfig, ModelErr, ModelSize, ParameterReport,
    count_trainable_parameters, estimate_model_size_bytes, models::KAN_HIDDEN,
};
use backbones::{BackboneErr, DenseNet, DenseNetVersion};
use ndarray::{ArrayD, IxDyn};
use nn::{DType, Module, Tensor};
use rand::{SeedableRng, rngs::StdRng};
use safetensors::{Dtype, tensor::TensorView};

fn write_weights<M: Module>(module: &M, path: &Path) {
    let tensors: Vec<(String, &Tensor)> = module
        .named_parameters()
        .into_iter()
        .map(|(name, param)| (name, param.tensor()))
        .chain(module.named_buffers())
        .collect();

    let encoded: Vec<(String, Dtype, Vec<usize>, Vec<u8>)> = tensors
        .into_iter()
        .map(|(name, tensor)| {
            let values = tensor.data().iter().copied();
            let (dtype, bytes) = match tensor.dtype() {
                DType::I64 => (Dtype::I64, values.flat_map(|x| (x as i64).to_le_bytes()).collect()),
                _ => (Dtype::F32, values.flat_map(f32::to_le_bytes).collect()),
            };
            (name, dtype, tensor.shape().to_vec(), bytes)
        })
        .collect();

    let views = encoded.iter().map(|(name, dtype, shape, bytes)| {
        (name.as_str(), TensorView::new(*dtype, shape.clone(), bytes).unwrap())
    });
    safetensors::serialize_to_file(views, &None, path).unwrap();
}

fn untrained() -> DenseNetKanConfig {
    DenseNetKanConfig {
        pretrained: false,
        seed: Some(0),
        ..Default::default()
    }
}

#[test]
fn defaults_end_at_the_class_count() {
    let model = DenseNetKan::new(&untrained()).unwrap();

    assert_eq!(model.kan_layer1().in_dim(), 1024);
    assert_eq!(model.kan_layer1().out_dim(), KAN_HIDDEN);
    assert_eq!(model.kan_layer2().in_dim(), KAN_HIDDEN);
    assert_eq!(model.kan_layer2().out_dim(), 11);
    assert_eq!(model.num_classes(), 11);
    assert_eq!(model.kan_layer1().config().noise_scale, 0.1);
}

#[test]
fn frozen_backbone_trainable_head() {
    let model = DenseNetKan::new(&untrained()).unwrap();

    for (name, param) in model.named_parameters() {
        assert_eq!(param.requires_grad(), name.starts_with("kan_layer"), "{name}");
    }

    // (num + k) coefficients plus two scales per edge
    let head_params = (1024 * 256 + 256 * 11) * 10;
    let report = ParameterReport::collect(&model);

    assert_eq!(report.trainable, head_params);
    assert_eq!(report.total, 7_978_856 - (1024 * 1000 + 1000) + head_params);
    assert_eq!(report.trainable + report.frozen(), report.total);
    assert_eq!(count_trainable_parameters(&model), report.trainable);
}

#[test]
fn unfrozen_backbone_is_trainable() {
    let config = DenseNetKanConfig {
        freeze_backbone: false,
        ..untrained()
    };
    let model = DenseNetKan::new(&config).unwrap();

    let report = ParameterReport::collect(&model);
    assert_eq!(report.frozen(), 0);
}

#[test]
fn unknown_version_is_a_config_error() {
    let config = DenseNetKanConfig {
        densenet_version: "999".to_string(),
        ..untrained()
    };

    let err = DenseNetKan::new(&config).unwrap_err();

    assert!(matches!(
        &err,
        ModelErr::Backbone(BackboneErr::UnsupportedVersion(v)) if v == "999"
    ));
    assert!(err.to_string().contains("999"));
}

#[test]
fn names_and_buffers() {
    let model = DenseNetKan::new(&untrained()).unwrap();

    let names: Vec<_> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names[0], "densenet.features.conv0.weight");
    assert!(!names.iter().any(|n| n.starts_with("densenet.classifier")));
    assert_eq!(
        &names[names.len() - 3..],
        ["kan_layer2.coef", "kan_layer2.scale_base", "kan_layer2.scale_sp"]
    );

    let buffers: Vec<_> = model.named_buffers().into_iter().map(|(n, _)| n).collect();
    assert!(buffers.contains(&"kan_layer1.grid".to_string()));
    assert!(buffers.contains(&"kan_layer2.mask".to_string()));

    let size = ModelSize::of(&model);
    assert!(size.buffer_bytes > 0);
    assert_eq!(
        estimate_model_size_bytes(&model),
        size.total_bytes() as f64 / 1024. / 1024.
    );
}

#[test]
fn size_doubles_in_double_precision() {
    let mut model = DenseNetKan::new(&untrained()).unwrap();
    let before = ModelSize::of(&model);

    model.cast(DType::F64).unwrap();
    let after = ModelSize::of(&model);

    assert_eq!(after.param_bytes, 2 * before.param_bytes);
}

#[test]
fn forward_and_grid_update() {
    let mut model = DenseNetKan::new(&untrained()).unwrap();
    let x = ArrayD::from_shape_fn(IxDyn(&[2, 3, 32, 32]), |idx| {
        (idx[0] * 7 + idx[1] + idx[2] + idx[3]) as f32 / 64.
    });

    let features = model.features(x.clone()).unwrap();
    assert_eq!(features.shape(), [2, 1024]);

    let y = model.forward(x.clone()).unwrap();
    assert_eq!(y.shape(), [2, 11]);
    assert!(y.iter().all(|v| v.is_finite()));

    model.update_grids(x.clone()).unwrap();
    assert_eq!(model.forward(x).unwrap().shape(), [2, 11]);
}

#[test]
fn ignored_hidden_dims_keep_the_wiring() {
    let config = DenseNetKanConfig {
        hidden_dims: Some(vec![128, 64]),
        num_classes: 4,
        ..untrained()
    };
    let model = DenseNetKan::new(&config).unwrap();

    assert_eq!(config.hidden_dims(), [128, 64]);
    assert_eq!(model.kan_layer1().out_dim(), KAN_HIDDEN);
    assert_eq!(model.kan_layer2().out_dim(), 4);
}

#[test]
fn explicit_hidden_dims_are_always_reported_ignored() {
    let defaults = DenseNetKanConfig {
        hidden_dims: Some(vec![512, 256]),
        ..untrained()
    };
    let unset = untrained();

    assert_eq!(defaults.ignored_hidden_dims(), Some(&[512, 256][..]));
    assert_eq!(unset.ignored_hidden_dims(), None);
    assert_eq!(defaults.hidden_dims(), unset.hidden_dims());
}

#[test]
fn architecture_dump_names_every_part() {
    let model = DenseNetKan::new(&untrained()).unwrap();
    let dump = format!("{model:#?}");

    assert!(dump.contains("densenet"));
    assert!(dump.contains("kan_layer1"));
    assert!(dump.contains("kan_layer2"));
}

#[test]
fn loads_pretrained_backbone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("densenet121.safetensors");

    let mut rng = StdRng::seed_from_u64(99);
    let source = DenseNet::from_version(DenseNetVersion::V121, &mut rng).unwrap();
    write_weights(&source, &path);

    let config = DenseNetKanConfig {
        pretrained: true,
        weights: Some(path),
        ..untrained()
    };
    let model = DenseNetKan::new(&config).unwrap();

    let expected = source.named_parameters();
    let loaded = model.backbone().named_parameters();
    assert_eq!(loaded.len(), expected.len() - 2);
    for ((name, a), (_, b)) in loaded.iter().zip(&expected) {
        assert_eq!(a.data(), b.data(), "{name}");
        assert!(!a.requires_grad());
    }
}
