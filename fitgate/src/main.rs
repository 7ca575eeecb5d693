mod config;
mod logging;
mod statsd;

use clap::{Args, Parser};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fitgate", about = "Gateway between the fitness frontend and the prediction API")]
enum CliCommand {
    /// Run the HTTP gateway
    Gateway(GatewayArgs),
}

#[derive(Args)]
struct GatewayArgs {
    /// Optional YAML config file. Environment variables override its values.
    #[arg(long)]
    config_file_path: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Metrics(#[from] statsd::MetricsError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::errors::GatewayError),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Gateway(args) => run_gateway(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            eprintln!("fitgate: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_gateway(args: GatewayArgs) -> Result<(), CliError> {
    let config = Config::load(args.config_file_path.as_deref(), |key| std::env::var(key).ok())?;

    let _sentry = logging::init(config.common.logging.as_ref());

    if let Some(metrics_config) = &config.common.metrics {
        statsd::init(metrics_config, gateway::metrics_defs::ALL_METRICS)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(gateway::run(config.gateway))?;

    Ok(())
}
