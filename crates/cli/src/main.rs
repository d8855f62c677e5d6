use crate::{
    commands::{Commands, ReconcileTarget, StatusTarget},
    env::EnvVars,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use chrono::Utc;
use clap::Parser;
use connectors::feed::FeedIngestor;
use engine_config::{
    document::FeedsyncConfig,
    report::{reconcile::ReconcileSummary, summary::RunSummaryReport},
};
use engine_core::{
    metrics::Metrics,
    state::{RunStore, sled_store::SledRunStore},
    status::StatusService,
};
use engine_processing::client::health::HealthStatus;
use engine_runtime::{
    coordinator::RunCoordinator, destinations::DestinationRegistry, pool::WorkerPool,
    reconciler::StaleReconciler, scheduler::Scheduler,
};
use model::core::identifiers::{ConnectionId, RunId};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "feedsync",
    version,
    about = "Syndicates supplier product feeds into WooCommerce shops"
)]
struct Cli {
    #[arg(long, global = true, default_value = "feedsync.json", help = "Config file path")]
    config: PathBuf,

    #[arg(long, global = true, help = "Extra KEY=VALUE file for config placeholders")]
    env_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Everything a command needs once the config is loaded.
struct Engine {
    config: FeedsyncConfig,
    registry: Arc<DestinationRegistry>,
    coordinator: RunCoordinator,
    metrics: Metrics,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match execute(cli, &shutdown).await {
        Ok(code) => code,
        Err(CliError::ShutdownRequested) => ExitCode::Interrupted,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::Failure
        }
    };

    std::process::exit(code.as_i32());
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(cli: Cli, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    let config = load_config(&cli.config, cli.env_file.as_deref())?;

    match cli.command {
        Commands::Status {
            target,
            history,
            json,
        } => show_status(open_store(&config)?, &target, history, json).await,
        command => {
            let engine = build_engine(config).await?;
            dispatch(engine, command, shutdown).await
        }
    }
}

async fn dispatch(
    engine: Engine,
    command: Commands,
    shutdown: &ShutdownCoordinator,
) -> Result<ExitCode, CliError> {
    match command {
        Commands::Import { connection, json } => {
            run_import(&engine, &connection, json, shutdown).await
        }
        Commands::Reconcile {
            target,
            dry_run,
            json,
        } => run_reconcile(&engine, &target, dry_run, json).await,
        Commands::Cancel { run } => {
            let run = engine.coordinator.cancel(&RunId::new(run)).await?;
            println!("Cancellation requested for run '{}' ({})", run.id, run.status);
            Ok(ExitCode::Success)
        }
        Commands::Health { destination, json } => {
            let report = engine.registry.get(&destination)?.health_check().await;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_health(&report);
            }
            Ok(ExitCode::from_success(matches!(
                report.status,
                HealthStatus::Healthy | HealthStatus::Degraded
            )))
        }
        Commands::Daemon => run_daemon(engine, shutdown).await,
        Commands::Status {
            target,
            history,
            json,
        } => show_status(engine.coordinator.store().clone(), &target, history, json).await,
    }
}

fn load_config(
    path: &std::path::Path,
    env_file: Option<&std::path::Path>,
) -> Result<FeedsyncConfig, CliError> {
    let mut vars = EnvVars::from_process();
    if let Some(env_file) = env_file {
        vars.load_file(env_file)?;
    }
    Ok(FeedsyncConfig::load(path, &vars.into_map())?)
}

fn open_store(config: &FeedsyncConfig) -> Result<Arc<dyn RunStore>, CliError> {
    let path = config.engine.state_path();
    let store = SledRunStore::open(&path)?;
    info!(path = %path.display(), "Run state opened");
    Ok(Arc::new(store))
}

async fn build_engine(config: FeedsyncConfig) -> Result<Engine, CliError> {
    let metrics = Metrics::new();
    let store = open_store(&config)?;
    let ingestor = FeedIngestor::new(
        config.engine.scratch_root(),
        config.engine.download_timeout(),
    )?;
    let registry = Arc::new(DestinationRegistry::from_config(&config, metrics.clone())?);
    let pool = Arc::new(WorkerPool::new(
        config.engine.workers,
        &config.engine.jobs,
        metrics.clone(),
    ));
    let coordinator = RunCoordinator::new(
        store,
        ingestor,
        registry.clone(),
        pool,
        config.engine.clone(),
        metrics.clone(),
    );

    let recovered = coordinator.recover_interrupted().await?;
    if recovered > 0 {
        warn!(recovered, "Failed runs left over from a previous process");
    }

    Ok(Engine {
        config,
        registry,
        coordinator,
        metrics,
    })
}

async fn run_import(
    engine: &Engine,
    connection: &str,
    json: bool,
    shutdown: &ShutdownCoordinator,
) -> Result<ExitCode, CliError> {
    let connection = engine.config.connection(&ConnectionId::new(connection))?;
    let handle = engine.coordinator.start(Arc::new(connection.clone())).await?;
    let run_id = handle.run_id.clone();

    let cancel = shutdown.cancel_token();
    let mut wait = std::pin::pin!(handle.wait());
    let run = tokio::select! {
        run = &mut wait => run?,
        _ = cancel.cancelled() => {
            engine.coordinator.cancel(&run_id).await?;
            wait.await?;
            return Err(CliError::ShutdownRequested);
        }
    };

    let report = RunSummaryReport::from_run(&run);
    info!(
        run_id = %run.id,
        status = %run.status,
        metrics = ?engine.metrics.snapshot(),
        "Import finished"
    );
    if json {
        output::print_json(&report)?;
    } else {
        output::print_run_summary(&report);
    }
    Ok(ExitCode::from_success(report.succeeded))
}

async fn run_reconcile(
    engine: &Engine,
    target: &ReconcileTarget,
    dry_run: bool,
    json: bool,
) -> Result<ExitCode, CliError> {
    let connections = match &target.connection {
        Some(id) => vec![engine.config.connection(&ConnectionId::new(id.as_str()))?.clone()],
        None => engine.config.connections.clone(),
    };

    let reconciler =
        StaleReconciler::new(engine.registry.clone(), engine.config.engine.reconcile.clone());
    let summary: ReconcileSummary = reconciler
        .reconcile_all(&connections, dry_run, Utc::now())
        .await;

    if json {
        output::print_json(&summary)?;
    } else {
        output::print_reconcile(&summary);
    }
    Ok(ExitCode::from_success(summary.succeeded()))
}

async fn show_status(
    store: Arc<dyn RunStore>,
    target: &StatusTarget,
    history: Option<usize>,
    json: bool,
) -> Result<ExitCode, CliError> {
    let service = StatusService::new(store);

    if let (Some(limit), Some(connection)) = (history, &target.connection) {
        let views = service
            .history(&ConnectionId::new(connection.as_str()), limit)
            .await?;
        if json {
            output::print_json(&views)?;
        } else {
            output::print_history(&views);
        }
        return Ok(ExitCode::Success);
    }

    let view = match (&target.run, &target.connection) {
        (Some(run), _) => service.run_status(&RunId::new(run.as_str())).await?,
        (None, Some(connection)) => {
            service
                .connection_status(&ConnectionId::new(connection.as_str()))
                .await?
        }
        (None, None) => return Err(CliError::Config("--run or --connection is required".into())),
    };

    if json {
        output::print_json(&view)?;
    } else {
        output::print_status(&view);
    }
    Ok(ExitCode::Success)
}

async fn run_daemon(engine: Engine, shutdown: &ShutdownCoordinator) -> Result<ExitCode, CliError> {
    let reconciler = Arc::new(StaleReconciler::new(
        engine.registry.clone(),
        engine.config.engine.reconcile.clone(),
    ));
    let scheduler = Scheduler::new(
        engine.coordinator.clone(),
        reconciler,
        engine.config.connections.clone(),
        engine.config.engine.scheduler.clone(),
        shutdown.cancel_token(),
    );
    scheduler.run().await;

    info!(metrics = ?engine.metrics.snapshot(), "Daemon stopped");
    if shutdown.is_shutdown_requested() {
        return Ok(ExitCode::Interrupted);
    }
    Ok(ExitCode::Success)
}
