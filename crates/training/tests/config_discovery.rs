//! Config lookup touches the process environment and working directory, so every case lives in
//! one test.

use std::env;
use std::fs;
use std::path::PathBuf;
use training::config::{CONFIG_ENV, DEFAULT_CONFIG_NAME};
use training::TrainConfig;

#[test]
fn lookup_order_and_path_expansion() {
    let tmp = tempfile::tempdir().unwrap();
    let previous_dir = env::current_dir().unwrap();
    env::remove_var(CONFIG_ENV);
    env::set_current_dir(tmp.path()).unwrap();

    // Nothing to find: defaults.
    assert_eq!(TrainConfig::load(None).unwrap(), TrainConfig::default());

    // ./style-transfer.toml in the working directory.
    fs::write(tmp.path().join(DEFAULT_CONFIG_NAME), "[schedule]\nepochs = 7\n").unwrap();
    assert_eq!(TrainConfig::load(None).unwrap().epochs, 7);

    // $STYLE_TRANSFER_CONFIG wins over the working directory.
    let from_env = tmp.path().join("env.toml");
    fs::write(&from_env, "[schedule]\nepochs = 9\n").unwrap();
    env::set_var(CONFIG_ENV, &from_env);
    assert_eq!(TrainConfig::load(None).unwrap().epochs, 9);

    // An explicit path wins over both.
    let explicit = tmp.path().join("explicit.toml");
    fs::write(&explicit, "[schedule]\nepochs = 3\n").unwrap();
    assert_eq!(TrainConfig::load(Some(explicit.as_path())).unwrap().epochs, 3);

    // A dangling env var is an error rather than a silent fallback.
    env::set_var(CONFIG_ENV, tmp.path().join("gone.toml"));
    assert!(TrainConfig::load(None).is_err());
    env::remove_var(CONFIG_ENV);

    // ${VAR} expansion in path values.
    env::set_var("STYLE_TRANSFER_DATA_ROOT", "/mnt/data");
    let cfg = TrainConfig::from_toml_str(
        "dataset_root = \"${STYLE_TRANSFER_DATA_ROOT}/coco/train2014\"\n\
         style_image = \"${STYLE_TRANSFER_DATA_ROOT}/styles/wave.jpg\"\n",
    )
    .unwrap();
    assert_eq!(cfg.dataset_root, PathBuf::from("/mnt/data/coco/train2014"));
    assert_eq!(cfg.style_image, PathBuf::from("/mnt/data/styles/wave.jpg"));
    env::remove_var("STYLE_TRANSFER_DATA_ROOT");

    env::set_current_dir(previous_dir).unwrap();
}
