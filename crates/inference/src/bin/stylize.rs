use anyhow::Context;
use clap::Parser;
use cli_support::{parse_dims, validate_backend_choice, BackendKind};
use image_dataset::{image_grid, load_image, ResizeMode};
use inference::StylizerFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "stylize", about = "Apply a trained style network to local images")]
struct Args {
    /// Image to stylize; repeat for several.
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    /// Directory holding model_checkpoint.bin and model_config.json.
    #[arg(long, default_value = "checkpoints/style")]
    checkpoint_dir: PathBuf,
    #[arg(long, default_value = "assets/stylized")]
    out_dir: PathBuf,
    /// Shrink inputs to fit within WIDTHxHEIGHT (never enlarges).
    #[arg(long, value_parser = parse_dims, default_value = "640x480")]
    max_dim: (u32, u32),
    /// Also write the input and output side by side.
    #[arg(long)]
    compare: bool,
    /// Run with random weights when the checkpoint is missing.
    #[arg(long)]
    allow_untrained: bool,
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    backend: BackendKind,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    validate_backend_choice(args.backend)?;

    let stylizer = if args.allow_untrained {
        StylizerFactory.build(Some(args.checkpoint_dir.as_path()))
    } else {
        StylizerFactory.load(&args.checkpoint_dir)?
    };
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    for path in &args.images {
        let input = load_image(path, Some(args.max_dim), ResizeMode::Thumbnail)?;
        let output = stylizer
            .stylize(&input)
            .with_context(|| format!("failed to stylize {}", path.display()))?;
        let stem = file_stem(path);
        let out_path = args.out_dir.join(format!("{stem}_stylized.png"));
        output
            .save(&out_path)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        tracing::info!("{} -> {}", path.display(), out_path.display());

        if args.compare {
            let cropped = image::imageops::crop_imm(&input, 0, 0, output.width(), output.height())
                .to_image();
            if let Some(grid) = image_grid(&[cropped, output], 1) {
                let cmp_path = args.out_dir.join(format!("{stem}_compare.png"));
                grid.save(&cmp_path)
                    .with_context(|| format!("failed to write {}", cmp_path.display()))?;
            }
        }
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
