use clap::Parser;
use env_logger::Env;
use pin_from::args::{self, Args};
use pin_from::errors::*;
use pin_from::registry::RegistryClient;
use pin_from::updater::ContainerfileUpdater;
use std::io;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::init_from_env(Env::default().default_filter_or(log_level));

    if let Some(shell) = args.completions {
        return args::generate_completions(shell, io::stdout());
    }

    let Some(path) = &args.file else {
        eprintln!("{}", Args::usage());
        eprintln!("Example: pin-from ./Containerfile");
        process::exit(1);
    };

    if !path.exists() {
        bail!("Containerfile not found: {path:?}");
    }

    let client = RegistryClient::new(&args.insecure_registries);
    let mut updater = ContainerfileUpdater::new(path).with_timeout(args.timeout());
    updater
        .update_with_latest_digests(&client)
        .await
        .with_context(|| anyhow!("Failed to update Containerfile: {path:?}"))?;

    Ok(())
}
