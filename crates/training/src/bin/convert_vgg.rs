use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use clap::Parser;
use models::Vgg19Features;
use std::fs;
use std::path::PathBuf;
use training::TrainBackend;

#[derive(Parser, Debug)]
#[command(
    name = "convert_vgg",
    about = "Convert torchvision's ImageNet vgg19 state dict (.pth) into a Burn record for the loss network"
)]
struct Args {
    /// torchvision weights, e.g. vgg19-dcbb9e9d.pth.
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "assets/weights/vgg19_features.bin")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let device = Default::default();
    let vgg = Vgg19Features::<TrainBackend>::load_pytorch(&args.input, &device)
        .map_err(|e| anyhow::anyhow!("failed to import {}: {e}", args.input.display()))?;

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let params = vgg.num_params();
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    vgg.save_file(args.output.clone(), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", args.output.display()))?;
    tracing::info!(
        params,
        "wrote {} from {}",
        args.output.display(),
        args.input.display()
    );
    Ok(())
}
