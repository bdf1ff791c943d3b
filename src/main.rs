use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use futures_trading_bot::settings::Settings;
use futures_trading_bot::{OrderManager, Result, logging};
use tracing::Level;

mod cli;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// The log verbosity level
    #[clap(short, long, global = true, default_value_t = Level::INFO)]
    verbosity: Level,
    /// TOML settings file; environment variables take precedence over it
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: cli::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", cli::render::error(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    logging::init(&settings.log, args.verbosity)?;
    tracing::debug!(?settings, "settings loaded");

    let manager = OrderManager::from_settings(&settings)?;
    cli::execute(&manager, args.command)
        .await
        .inspect_err(|err| tracing::error!(kind = ?err.kind(), error = %err, "command failed"))
}
