use anyhow::Context;
use clap::{Arg, Command};
use hrc_execution::{Engine, FileStore, Memory, Metrics, Store};
use hrc_node::{init_telemetry, Config, ValidatedConfig};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::time::Duration;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    // Parse arguments
    let matches = Command::new("node")
        .about("Hosts the High Rollers Club economy engine.")
        .arg(Arg::new("config").long("config").required(false))
        .get_matches();

    // Load config
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            let document = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config file {path}"))?;
            serde_yaml::from_str::<Config>(&document).context("could not parse config file")?
        }
        None => Config::default(),
    };
    let config = config.validate()?;

    // Initialize runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("could not build runtime")?;

    runtime.block_on(async move {
        // Configure telemetry
        init_telemetry(config.log_level, config.json_logs);

        // Open store
        match config.store_path.clone() {
            Some(path) => {
                let store = FileStore::open(&path)
                    .await
                    .with_context(|| format!("could not open store {}", path.display()))?;
                run(store, config).await
            }
            None => {
                info!("no store_path configured, state will not survive restart");
                run(Memory::new(), config).await
            }
        }
    })
}

async fn run<S: Store>(store: S, config: ValidatedConfig) -> anyhow::Result<()> {
    // Register metrics
    let metrics = Metrics::default();
    let mut registry = Registry::with_prefix("hrc");
    metrics.register(&mut registry);

    // Start engine
    let engine = Engine::init(store, config.engine, metrics).await;
    engine.start();
    info!(
        pools = engine.jackpots().pools().count(),
        achievements = engine.achievements().catalog().count(),
        "node ready"
    );

    // Report until interrupted
    let period = Duration::from_secs(config.metrics_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick(), if config.metrics_interval_secs > 0 => {
                report(&registry, &engine).await;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(?e, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    // Drain background work
    info!("shutting down");
    engine.shutdown().await;
    report(&registry, &engine).await;
    Ok(())
}

async fn report<S: Store>(registry: &Registry, engine: &Engine<S>) {
    let sessions = engine.sessions().stats();
    let jackpots = engine.jackpots().stats().await;
    info!(
        sessions = sessions.total,
        users = sessions.unique_users,
        cached = engine.cache().len(),
        jackpot_total = jackpots.total_amount,
        "engine status"
    );

    let mut buffer = String::new();
    match encode(&mut buffer, registry) {
        Ok(()) => info!(metrics = %buffer, "metrics snapshot"),
        Err(e) => error!(?e, "failed to encode metrics"),
    }
}
