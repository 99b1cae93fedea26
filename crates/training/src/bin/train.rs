use clap::Parser;
use training::util::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing();
    let args = TrainArgs::parse();
    let report = run_train(args)?;
    tracing::info!(
        epochs_run = report.epochs_run,
        steps = report.global_step,
        skipped_images = report.skipped_images,
        "training finished; checkpoints in {}",
        report.checkpoint_dir.display()
    );
    Ok(())
}
