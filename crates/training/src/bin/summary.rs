use burn::module::Module;
use burn::tensor::Tensor;
use clap::Parser;
use cli_support::parse_dims;
use models::check_input_size;
use training::{StyleTransferNet, StyleTransferNetConfig, TrainBackend};

#[derive(Parser, Debug)]
#[command(
    name = "summary",
    about = "Print per-stage output shapes and the parameter count of the style network"
)]
struct Args {
    /// Input size, WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_dims, default_value = "256x256")]
    size: (u32, u32),
    #[arg(long, default_value_t = 32)]
    base_channels: usize,
    #[arg(long, default_value_t = 5)]
    residual_blocks: usize,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing();
    let args = Args::parse();
    let (w, h) = args.size;
    check_input_size(h as usize, w as usize).map_err(anyhow::Error::msg)?;
    let device = Default::default();
    let cfg = StyleTransferNetConfig {
        base_channels: args.base_channels,
        residual_blocks: args.residual_blocks,
        ..Default::default()
    };
    let model = StyleTransferNet::<TrainBackend>::new(cfg, &device);
    let input = Tensor::<TrainBackend, 4>::zeros([1, 3, h as usize, w as usize], &device);

    println!("{:<24} {:>22}", "stage", "output [n, c, h, w]");
    for (stage, dims) in model.trace_shapes(input) {
        println!("{stage:<24} {:>22}", format!("{dims:?}"));
    }
    println!("trainable parameters: {}", model.num_params());
    Ok(())
}
