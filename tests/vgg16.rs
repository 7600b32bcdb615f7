use backbone_heads::{
    ModelErr, ParameterReport, Vgg16Classifier, Vgg16Config, count_trainable_parameters,
    estimate_model_size_bytes, models::HEAD_INDEX,
};
use backbones::BackboneErr;
use ndarray::{ArrayD, IxDyn};
use nn::Module;

#[test]
fn frozen_untrained_vgg16_with_20_classes() {
    let config = Vgg16Config {
        num_classes: 20,
        pretrained: false,
        freeze_backbone: true,
        seed: Some(0),
        ..Default::default()
    };
    let model = Vgg16Classifier::new(&config).unwrap();

    let head = model.head().unwrap();
    assert_eq!((head.in_features(), head.out_features()), (4096, 20));
    assert_eq!(model.num_classes(), 20);

    let head_prefix = format!("vgg16.classifier.{HEAD_INDEX}.");
    for (name, param) in model.named_parameters() {
        assert_eq!(param.requires_grad(), name.starts_with(&head_prefix), "{name}");
    }

    let report = ParameterReport::collect(&model);
    let head_params = 4096 * 20 + 20;
    assert_eq!(report.trainable, head_params);
    assert_eq!(report.total, 138_357_544 - (4096 * 1000 + 1000) + head_params);
    assert_eq!(report.trainable + report.frozen(), report.total);
    assert_eq!(count_trainable_parameters(&model), report.trainable);

    // no buffers, every parameter is stored as f32
    let size = estimate_model_size_bytes(&model);
    assert_eq!(size, (report.total * 4) as f64 / 1024. / 1024.);

    let y = model.forward(ArrayD::zeros(IxDyn(&[2, 3, 32, 32]))).unwrap();
    assert_eq!(y.shape(), [2, 20]);
}

#[test]
fn pretrained_without_weights_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = Vgg16Config {
        weights: Some(dir.path().join("vgg16.safetensors")),
        seed: Some(0),
        ..Default::default()
    };

    let err = Vgg16Classifier::new(&config).unwrap_err();

    assert!(matches!(
        err,
        ModelErr::Backbone(BackboneErr::WeightsIo { .. })
    ));
}
