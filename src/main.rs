mod app;
mod cache;
mod config;
mod connectivity;
mod inventory;
mod logging;
mod queue;
mod remote;
mod router;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ndomog-sync")]
#[command(about = "Offline-first inventory cache with a queued sync engine")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/ndomog/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Declare the device offline: serve reads from cache and queue writes
  #[arg(long, global = true)]
  offline: bool,

  /// Log to stderr instead of the rolling log file
  #[arg(long, global = true)]
  log_stderr: bool,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _log_guard = logging::init(args.log_stderr)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let app = app::App::new(config, !args.offline)?;
  app.run(args.command).await?;

  Ok(())
}
