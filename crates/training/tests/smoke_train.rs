use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use training::{
    train_with_config, CheckpointManager, LossConfig, LossWeights, StyleTransferNetConfig,
    TrainConfig, VggLayer,
};

fn write_photos(dir: &Path, count: usize) {
    fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        let img = RgbImage::from_fn(20, 20, |x, y| {
            Rgb([(x * 12) as u8, (y * 12) as u8, (i * 50) as u8])
        });
        img.save(dir.join(format!("photo_{i}.png"))).unwrap();
    }
}

fn tiny_config(root: &Path) -> TrainConfig {
    write_photos(&root.join("photos"), 5);
    let style = RgbImage::from_fn(32, 32, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([230, 40, 40])
        } else {
            Rgb([20, 20, 200])
        }
    });
    style.save(root.join("style.png")).unwrap();

    TrainConfig {
        dataset_root: root.join("photos"),
        style_image: root.join("style.png"),
        vgg_weights: None,
        allow_random_vgg: true,
        checkpoint_dir: root.join("ckpt"),
        metrics_path: Some(root.join("metrics.jsonl")),
        image_size: (16, 16),
        batch_size: 2,
        num_images: None,
        steps_per_epoch: Some(2),
        epochs: 1,
        lr: 1e-3,
        checkpoint_every: 1,
        shuffle: true,
        seed: Some(3),
        permissive: true,
        model: StyleTransferNetConfig {
            base_channels: 4,
            residual_blocks: 1,
            ..Default::default()
        },
        loss: LossConfig {
            content_layers: vec![VggLayer::Block2Conv2],
            style_layers: vec![VggLayer::Block1Conv1, VggLayer::Block2Conv1],
            weights: LossWeights {
                style_layer_weights: vec![1.0, 1.0],
                ..Default::default()
            },
        },
    }
}

#[test]
fn trains_checkpoints_and_resumes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = tiny_config(tmp.path());

    let first = train_with_config(&cfg).unwrap();
    assert!(!first.resumed);
    assert_eq!(first.epochs_run, 1);
    assert_eq!(first.global_step, 2);
    assert_eq!(first.epoch_losses.len(), 1);
    assert!(first.epoch_losses[0].is_finite());

    let ckpt = CheckpointManager::open(&cfg.checkpoint_dir);
    assert!(ckpt.has_checkpoint());
    let state = ckpt.load_state().unwrap();
    assert_eq!(state.epoch, 1);
    assert_eq!(state.global_step, 2);
    assert_eq!(ckpt.load_model_config().unwrap(), cfg.model);

    // Two step checkpoints plus the epoch record.
    let metrics = fs::read_to_string(tmp.path().join("metrics.jsonl")).unwrap();
    assert_eq!(metrics.lines().count(), 3);

    cfg.epochs = 2;
    let second = train_with_config(&cfg).unwrap();
    assert!(second.resumed);
    assert_eq!(second.epochs_run, 1);
    assert_eq!(second.global_step, 4);
    assert_eq!(second.epoch_losses.len(), 2);

    let third = train_with_config(&cfg).unwrap();
    assert!(third.resumed);
    assert_eq!(third.epochs_run, 0);
    assert_eq!(third.global_step, 4);
}

#[test]
fn fewer_images_than_a_batch_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = TrainConfig {
        batch_size: 8,
        ..tiny_config(tmp.path())
    };
    let err = train_with_config(&cfg).unwrap_err();
    assert!(err.to_string().contains("batch size is 8"), "{err}");
    assert!(!cfg.checkpoint_dir.join("model_checkpoint.bin").exists());
}

#[test]
fn refuses_random_vgg_features_unless_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = TrainConfig {
        allow_random_vgg: false,
        ..tiny_config(tmp.path())
    };
    let err = train_with_config(&cfg).unwrap_err();
    assert!(err.to_string().contains("VGG19 weights"), "{err}");
    assert!(!cfg.checkpoint_dir.join("model_checkpoint.bin").exists());
}

#[test]
fn missing_style_image_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = TrainConfig {
        style_image: tmp.path().join("nope.jpg"),
        ..tiny_config(tmp.path())
    };
    assert!(train_with_config(&cfg).is_err());
}
