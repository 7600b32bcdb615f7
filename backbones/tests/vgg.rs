use backbones::vgg16;
use ndarray::{ArrayD, IxDyn};
use nn::{Layer, Module};
use rand::{SeedableRng, rngs::StdRng};

#[test]
fn vgg16_layout() {
    let mut rng = StdRng::seed_from_u64(0);
    let model = vgg16(&mut rng).unwrap();

    assert_eq!(model.num_parameters(), 138_357_544);
    assert_eq!(model.features().len(), 31);
    assert_eq!(model.classifier().len(), 7);
    assert!(model.named_buffers().is_empty());

    let Some(Layer::Linear(head)) = model.classifier().get(6) else {
        panic!("the last classifier layer should be linear");
    };
    assert_eq!((head.in_features(), head.out_features()), (4096, 1000));

    let names: Vec<_> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names.len(), 32);
    assert_eq!(names[0], "features.0.weight");
    assert_eq!(names[25], "features.28.bias");
    assert_eq!(names[31], "classifier.6.bias");

    // biases start at zero
    let (_, bias) = &model.named_parameters()[1];
    assert!(bias.data().iter().all(|&b| b == 0.));

    let y = model.forward(ArrayD::zeros(IxDyn(&[1, 3, 32, 32]))).unwrap();
    assert_eq!(y.shape(), [1, 1000]);
}
