use clap::Parser;
use env_logger::Env;
use log::info;

use predicting_poverty::{Args, RunConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.num_workers.get())
        .build_global()?;

    let config = RunConfig::from_args(&args)?;
    let report = predicting_poverty::run(&config)?;

    info!("Saved run into {}", report.run_dir.display());
    Ok(())
}
