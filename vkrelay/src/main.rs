mod config;
mod telemetry;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use courier::Courier;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "vkrelay", version, about = "Authenticated relay to the VK messaging API")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the relay and admin listeners
    Serve(ConfigArgs),
    /// Load and validate the configuration, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// YAML config file. Settings are read from the environment when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<Config, ConfigError> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] telemetry::TelemetryError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Courier(#[from] courier::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::errors::GatewayError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Serve(args) => serve(&args),
        CliCommand::CheckConfig(args) => check_config(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "vkrelay failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn serve(args: &ConfigArgs) -> Result<(), CliError> {
    let config = args.load()?;

    let _sentry = telemetry::init_logging(config.common.logging.as_ref());
    telemetry::init_metrics(config.common.metrics.as_ref())?;

    let listeners = &config.gateway;
    tracing::info!(
        listener = %format!("{}:{}", listeners.listener.host, listeners.listener.port),
        admin = %format!(
            "{}:{}",
            listeners.admin_listener.host, listeners.admin_listener.port
        ),
        peer_id = %config.platform.peer_id,
        "Starting vkrelay"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let Config {
        gateway: gateway_config,
        platform,
        ..
    } = config;

    runtime.block_on(async move {
        let courier = Courier::new(Arc::new(platform))?;
        gateway::run(gateway_config, courier).await?;
        Ok::<(), CliError>(())
    })
}

fn check_config(args: &ConfigArgs) -> Result<(), CliError> {
    let config = args.load()?;
    println!("Configuration OK: {:?}", config.platform);
    Ok(())
}
