use kan::{KanConfig, KanLayer};
use ndarray::{Array2, ArrayD, IxDyn};
use nn::{DType, Layer, Module, Sequential};
use rand::{SeedableRng, rngs::StdRng};

fn stack(config: &KanConfig) -> Sequential {
    let mut rng = StdRng::seed_from_u64(42);
    let first = KanLayer::new(16, 8, config, &mut rng).unwrap();
    let second = KanLayer::new(8, 3, config, &mut rng).unwrap();

    Sequential::named([("kan1", Layer::custom(first)), ("kan2", Layer::custom(second))])
}

#[test]
fn stacked_layers_forward() {
    let model = stack(&KanConfig::default());
    let x = Array2::from_shape_fn((4, 16), |(b, i)| ((b * 16 + i) as f32 / 64.) - 0.5);

    let y = model.forward(x.into_dyn()).unwrap();

    assert_eq!(y.shape(), [4, 3]);
    assert!(y.iter().all(|v| v.is_finite()));
}

#[test]
fn names_and_counts() {
    let model = stack(&KanConfig::default());

    let names: Vec<_> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        [
            "kan1.coef",
            "kan1.scale_base",
            "kan1.scale_sp",
            "kan2.coef",
            "kan2.scale_base",
            "kan2.scale_sp"
        ]
    );

    let buffers: Vec<_> = model.named_buffers().into_iter().map(|(n, _)| n).collect();
    assert_eq!(buffers, ["kan1.grid", "kan1.mask", "kan2.grid", "kan2.mask"]);

    // (num + k + 2) values per edge
    assert_eq!(model.num_parameters(), (16 * 8 + 8 * 3) * 10);
}

#[test]
fn freezing_clears_every_flag() {
    let mut model = stack(&KanConfig::default());

    model.freeze();
    assert!(model.named_parameters().iter().all(|(_, p)| !p.requires_grad()));

    model.unfreeze();
    assert!(model.named_parameters().iter().all(|(_, p)| p.requires_grad()));
}

#[test]
fn half_precision_halves_storage() {
    let mut model = stack(&KanConfig::default());
    let bytes = |m: &Sequential| -> usize {
        m.named_parameters().iter().map(|(_, p)| p.nbytes()).sum::<usize>()
            + m.named_buffers().iter().map(|(_, b)| b.nbytes()).sum::<usize>()
    };

    let full = bytes(&model);
    model.cast(DType::F16).unwrap();

    assert_eq!(bytes(&model) * 2, full);
    assert!(model.forward(ArrayD::zeros(IxDyn(&[1, 16]))).is_ok());
}
