use std::convert::Infallible;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use driftguard::{bootstrap, summary};

/// Evaluate every configured model and retrain the ones that drifted.
#[derive(Parser)]
#[command(name = "retrain-cycle")]
#[command(about = "Health check and guarded retraining for forecasting models")]
struct Cli {
    /// Configuration file; defaults to $DRIFTGUARD_CONFIG_PATH or ~/.driftguard/config.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Authorize automatic retraining regardless of `automation_mode`
    #[arg(
        long,
        env = bootstrap::ENABLE_RETRAINING_ENV,
        action = ArgAction::SetTrue,
        value_parser = retraining_flag
    )]
    enable_retraining: bool,

    /// Only process these parameters (repeatable)
    #[arg(long = "parameter", short = 'p', value_name = "PARAMETER")]
    parameters: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let explicit = cli
        .config
        .or_else(|| std::env::var_os(bootstrap::CONFIG_PATH_ENV).map(PathBuf::from));
    let mut config = bootstrap::load_config(explicit.as_deref())
        .context("failed to load driftguard configuration")?;
    bootstrap::apply_retraining_override(&mut config, cli.enable_retraining);
    tracing::info!(
        automation = ?config.automation_mode,
        parameters = config.parameters.len(),
        max_parallel = config.cycle.max_parallel,
        "configuration loaded"
    );

    let ports = bootstrap::build_ports(&config).context("failed to wire collaborators")?;
    let runner = bootstrap::build_runner(&config, &ports);
    let parameters = bootstrap::select_parameters(&config, &cli.parameters);

    let outcomes = bootstrap::run_cycle(&config, &runner, &parameters).await;
    print!("{}", summary::render(&outcomes));
    Ok(())
}

fn retraining_flag(raw: &str) -> Result<bool, Infallible> {
    Ok(bootstrap::retraining_enabled(raw))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
