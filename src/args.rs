use crate::errors::*;
use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::Shell;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Pin the FROM images of a Containerfile to their current registry digest
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Increase logging output (can be used multiple times)
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Deadline in seconds for resolving all images of the file
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
    /// Contact this registry over plain http (can be used multiple times)
    #[arg(long = "insecure-registry", value_name = "HOST[:PORT]")]
    pub insecure_registries: Vec<String>,
    /// Print shell completions and exit
    #[arg(long, value_name = "SHELL")]
    pub completions: Option<Shell>,
    /// The Containerfile (or Dockerfile) to update in place
    pub file: Option<PathBuf>,
}

impl Args {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn usage() -> String {
        Args::command().render_usage().to_string()
    }
}

pub fn generate_completions<W: io::Write>(shell: Shell, mut w: W) -> Result<()> {
    clap_complete::generate(shell, &mut Args::command(), "pin-from", &mut w);
    Ok(())
}
