//! # streamdockctl
//!
//! Starts DynamoDB Local, creates the configured tables and forwards every
//! table's change stream to the local Lambda endpoint until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use streamdock_config::{
    Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigWarnings,
};
use streamdock_core::{
    DispatchHandle, DynamoClient, LambdaInvoker, OfflineSession,
    ProcessSupervisor, ShutdownCoordinator,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "streamdockctl",
    version,
    about = "Run DynamoDB Local and forward its change streams to local \
             handlers"
)]
struct Cli {
    /// Configuration file (defaults to streamdock.toml or
    /// config/streamdock.toml)
    #[arg(long, short = 'c', env = "STREAMDOCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// .env file to load before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start DynamoDB Local, create tables and dispatch streams (default)
    Start(StartArgs),
    /// Print the emulator command line and exit
    Args,
    /// Load and validate the configuration, then exit
    Check,
}

#[derive(Debug, Default, Args)]
struct StartArgs {
    /// Port DynamoDB Local listens on
    #[arg(long)]
    port: Option<u16>,

    /// Stage name used to qualify function names
    #[arg(long)]
    stage: Option<String>,

    /// Create tables and dispatch streams after startup
    #[arg(long)]
    migrate: bool,

    /// Use an already running DynamoDB Local instead of launching one
    #[arg(long)]
    no_start: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streamdock_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = ConfigLoaderOptions {
        config_path: cli.config,
        env_file: cli.env_file,
    };
    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::with_options(options)
        .load()
        .context("failed to load configuration")?;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration loaded");
    }
    log_warnings(&warnings);

    match cli.command.unwrap_or(Command::Start(StartArgs::default())) {
        Command::Args => {
            let argv = config.emulator.argv(&config.start.launch);
            println!("{} {}", config.emulator.java, argv.join(" "));
            Ok(())
        }
        Command::Check => {
            print_summary(&config);
            Ok(())
        }
        Command::Start(args) => {
            apply_start_args(&mut config, args);
            run(config).await
        }
    }
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(
                message = %warning.message,
                hint = %hint,
                "configuration warning"
            ),
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }
}

fn apply_start_args(config: &mut Config, args: StartArgs) {
    if let Some(port) = args.port {
        config.start.launch.port = Some(port);
    }
    if let Some(stage) = args.stage {
        config.stage = stage;
    }
    if args.migrate {
        config.start.migrate = true;
    }
    if args.no_start {
        config.start.no_start = true;
    }
}

fn print_summary(config: &Config) {
    println!("service: {}", config.service);
    println!(
        "stage: {}{}",
        config.stage,
        if config.stage_enabled() { "" } else { " (disabled)" }
    );
    println!("emulator: {}", config.start.launch.endpoint());
    println!("lambda: {}", config.lambda.endpoint());
    for table in &config.tables {
        println!(
            "table: {} ({})",
            table.table_name().unwrap_or(&table.logical_id),
            if table.has_stream() { "stream" } else { "no stream" }
        );
    }
    for subscription in config.subscriptions() {
        println!(
            "subscription: {} <- {} (batch {}{})",
            subscription.function_name,
            subscription.table_name,
            subscription.resolved_batch_size(),
            if subscription.enabled { "" } else { ", disabled" }
        );
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let coordinator = ShutdownCoordinator::new();
    let _guard = coordinator.guard();
    coordinator
        .install_signal_handlers()
        .context("failed to install signal handlers")?;
    coordinator.install_panic_hook();

    let client = DynamoClient::new(config.client_config())
        .context("invalid DynamoDB endpoint")?;
    let invoker = LambdaInvoker::new(config.invoker_config())
        .context("invalid Lambda endpoint")?;

    let session = OfflineSession::new(
        config.session_options(),
        ProcessSupervisor::with_shutdown(coordinator.clone()),
        Arc::new(client),
        Arc::new(invoker),
        coordinator.token(),
    );

    let outcome = session
        .run()
        .await
        .context("failed to start offline session")?;
    if outcome.skipped {
        return Ok(());
    }
    let dispatching =
        outcome.dispatches.iter().any(|handle| handle.is_active());
    if outcome.emulator.is_none() && !dispatching {
        info!("nothing left to supervise");
        return Ok(());
    }

    let summaries: Vec<_> = outcome
        .dispatches
        .into_iter()
        .map(DispatchHandle::detach)
        .collect();

    info!("running; press Ctrl+C to stop");
    coordinator.wait_for_shutdown().await;

    for summary in summaries {
        if let Err(err) = summary.await {
            warn!(error = %err, "dispatch summary task failed");
        }
    }

    session.shutdown();
    Ok(())
}
