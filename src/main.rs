use clap::Parser;
use deepresearch_rs::cli::Args;
use deepresearch_rs::{exit_code_of, launch};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let feedback = args.feedback.clone();
    let interactive = args.interactive();

    let result = match args.into_config() {
        Ok(config) => launch(&config, feedback, interactive).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(exit_code_of(&e));
    }
}
