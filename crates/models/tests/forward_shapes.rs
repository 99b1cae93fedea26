use burn::tensor::{Distribution, Tensor};
use models::{StyleTransferNet, StyleTransferNetConfig, Vgg19Features, VggLayer};

type TestBackend = burn_ndarray::NdArray<f32>;

#[test]
fn style_net_preserves_shape_and_range() {
    let device = Default::default();
    let model = StyleTransferNet::<TestBackend>::new(
        StyleTransferNetConfig {
            base_channels: 4,
            residual_blocks: 2,
            ..Default::default()
        },
        &device,
    );
    let input = Tensor::<TestBackend, 4>::random([2, 3, 16, 24], Distribution::Uniform(0.0, 1.0), &device);
    let out = model.forward(input);
    assert_eq!(out.dims(), [2, 3, 16, 24]);

    let values = out.into_data().to_vec::<f32>().unwrap();
    assert!(values.iter().all(|v| v.is_finite() && (0.0..=255.0).contains(v)));
}

#[test]
fn trace_shapes_lists_every_stage() {
    let device = Default::default();
    let model = StyleTransferNet::<TestBackend>::new(
        StyleTransferNetConfig {
            base_channels: 4,
            residual_blocks: 3,
            ..Default::default()
        },
        &device,
    );
    let shapes = model.trace_shapes(Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device));
    // input + 3 encoder convs + residuals + 2 upsamples + output conv
    assert_eq!(shapes.len(), 1 + 3 + 3 + 2 + 1);
    assert_eq!(shapes[3], ("conv3".to_string(), [1, 16, 8, 8]));
    assert_eq!(shapes.last().unwrap().1, [1, 3, 32, 32]);
}

#[test]
fn vgg_returns_requested_layers_in_order() {
    let device = Default::default();
    let vgg = Vgg19Features::<TestBackend>::new(&device);
    let input = Vgg19Features::preprocess(Tensor::<TestBackend, 4>::random(
        [1, 3, 32, 32],
        Distribution::Uniform(0.0, 1.0),
        &device,
    ));
    let layers = [VggLayer::Block4Conv2, VggLayer::Block1Conv1, VggLayer::Block5Conv1];
    let acts = vgg.forward_layers(input, &layers);
    assert_eq!(acts.len(), 3);
    assert_eq!(acts[0].dims(), [1, 512, 4, 4]);
    assert_eq!(acts[1].dims(), [1, 64, 32, 32]);
    assert_eq!(acts[2].dims(), [1, 512, 2, 2]);
}

#[test]
fn vgg_preprocess_applies_imagenet_normalization() {
    let device = Default::default();
    let zeros = Tensor::<TestBackend, 4>::zeros([1, 3, 1, 1], &device);
    let values = Vgg19Features::preprocess(zeros)
        .into_data()
        .to_vec::<f32>()
        .unwrap();
    let expected: [f32; 3] = [-0.485 / 0.229, -0.456 / 0.224, -0.406 / 0.225];
    for (v, e) in values.iter().zip(expected) {
        assert!((v - e).abs() < 1e-5, "{v} vs {e}");
    }

    // Channel order stays RGB.
    let red = Tensor::<TestBackend, 4>::from_floats([[[[1.0]], [[0.0]], [[0.0]]]], &device);
    let values = Vgg19Features::preprocess(red).into_data().to_vec::<f32>().unwrap();
    assert!((values[0] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
    assert!(values[1] < 0.0 && values[2] < 0.0);
}
