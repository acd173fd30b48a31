//! cadence entry point.
//!
//! One binary runs any combination of components against the shared
//! database:
//!
//! ```text
//! cadence                      # dispatcher + worker + admin
//! cadence dispatcher           # cron dispatcher only
//! cadence worker admin         # any subset
//! cadence queue-dispatcher     # requires the `kafka` build feature
//! ```

mod documents;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_admin::AdminState;
use cadence_db::{schema, DatabaseRegistry};
use cadence_dispatcher::CronDispatcher;
use cadence_worker::{handlers, WorkerPool};

use documents::Documents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Component {
    Dispatcher,
    Worker,
    Admin,
    QueueDispatcher,
}

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Distributed batch job scheduler", version)]
struct Cli {
    /// Directory holding the YAML configuration documents
    #[arg(long, env = "CADENCE_CONFIG_DIR", default_value = "config")]
    config: PathBuf,

    /// Components to run; none means dispatcher + worker + admin
    #[arg(value_enum)]
    components: Vec<Component>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("startup failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let components = if cli.components.is_empty() {
        vec![Component::Dispatcher, Component::Worker, Component::Admin]
    } else {
        cli.components.clone()
    };

    let docs = Documents::load(&cli.config)?;

    // Open only the databases the selected components declare.
    let mut names: Vec<String> = Vec::new();
    let mut migrate: Vec<String> = Vec::new();
    let mut need = |name: &str, hosts_core_tables: bool| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        if hosts_core_tables && !migrate.iter().any(|n| n == name) {
            migrate.push(name.to_string());
        }
    };
    for component in &components {
        match component {
            Component::Dispatcher => need(&docs.dispatcher.database, true),
            Component::Worker => {
                for name in docs.worker.all_databases() {
                    need(&name, name == docs.worker.database);
                }
            }
            Component::Admin => need(&docs.admin.database, true),
            Component::QueueDispatcher => need(&docs.queue.database, true),
        }
    }

    let registry = Arc::new(
        DatabaseRegistry::init_from_config(&docs.databases, Some(&names))
            .await
            .context("failed to initialize database registry")?,
    );
    for name in &migrate {
        schema::run_migrations(registry.get(name)?)
            .await
            .with_context(|| format!("failed to run migrations on '{name}'"))?;
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    for component in &components {
        match component {
            Component::Dispatcher => {
                let dispatcher = CronDispatcher::new(
                    registry.clone(),
                    docs.dispatcher.clone(),
                    shutdown.clone(),
                );
                tasks.spawn(async move {
                    dispatcher.run().await;
                    Ok(())
                });
            }
            Component::Worker => {
                let handler_registry = Arc::new(
                    handlers::builtin_registry().context("failed to build handler registry")?,
                );
                let pool = WorkerPool::new(
                    registry.clone(),
                    handler_registry,
                    docs.worker.clone(),
                    shutdown.clone(),
                );
                tasks.spawn(async move {
                    pool.run().await;
                    Ok(())
                });
            }
            Component::Admin => {
                let addr: SocketAddr = format!("{}:{}", docs.admin.host, docs.admin.port)
                    .parse()
                    .context("invalid admin listen address")?;
                let state = AdminState::new(
                    registry.clone(),
                    docs.admin.database.clone(),
                    docs.admin.min_cron_interval_seconds,
                );
                let admin_shutdown = shutdown.clone();
                tasks.spawn(async move { cadence_admin::serve(state, addr, admin_shutdown).await });
            }
            Component::QueueDispatcher => {
                spawn_queue_dispatcher(&docs, registry.clone(), shutdown.clone(), &mut tasks)?;
            }
        }
    }

    info!(?components, "cadence started");

    // First component failure shuts the rest down; the error decides the
    // exit code.
    let mut outcome: anyhow::Result<()> = Ok(());
    while let Some(finished) = tasks.join_next().await {
        match finished {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("component failed: {e:#}");
                shutdown.cancel();
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
            Err(join_err) => {
                error!(error = %join_err, "component task panicked");
                shutdown.cancel();
                if outcome.is_ok() {
                    outcome = Err(join_err.into());
                }
            }
        }
    }

    registry.close_all().await;
    info!("cadence stopped");
    outcome
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        info!("shutdown signal received");
        shutdown.cancel();
    });
}

#[cfg(feature = "kafka")]
fn spawn_queue_dispatcher(
    docs: &Documents,
    registry: Arc<DatabaseRegistry>,
    shutdown: CancellationToken,
    tasks: &mut JoinSet<anyhow::Result<()>>,
) -> anyhow::Result<()> {
    use cadence_dispatcher::queue::kafka::KafkaAdapter;
    use cadence_dispatcher::queue::QueueDispatcher;

    let adapter = KafkaAdapter::new(docs.queue.clone());
    let mut dispatcher = QueueDispatcher::new(registry, docs.queue.clone(), adapter, shutdown);
    tasks.spawn(async move {
        dispatcher.run().await?;
        Ok(())
    });
    Ok(())
}

#[cfg(not(feature = "kafka"))]
fn spawn_queue_dispatcher(
    _docs: &Documents,
    _registry: Arc<DatabaseRegistry>,
    _shutdown: CancellationToken,
    _tasks: &mut JoinSet<anyhow::Result<()>>,
) -> anyhow::Result<()> {
    anyhow::bail!("this build has no queue support; rebuild with --features kafka")
}
