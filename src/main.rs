//! lbcore - decision core of a Layer 7 traffic distributor
//!
//! Usage:
//!     lbcore --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use lbcore::backend::{Dispatcher, RequestContext};
use lbcore::config::{Config, load_config};
use lbcore::health::{ConfiguredProbe, HealthCheckSettings, HealthChecker, Outcome};
use lbcore::metrics::{MetricsCollector, MetricsServer};
use lbcore::util::{ShutdownSignal, init_logging};

/// How often the distribution summary is logged.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Endpoint selection, health tracking and failover for a static backend pool.
#[derive(Parser, Debug)]
#[command(name = "lbcore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Dispatch N synthetic requests, print the distribution and exit
    #[arg(long, value_name = "N")]
    simulate: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format).context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Algorithm: {}", config.pool.algorithm);
        println!("  Endpoints: {}", config.pool.endpoints.len());
        for endpoint in &config.pool.endpoints {
            println!("    - {} (weight {})", endpoint.address, endpoint.weight);
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        algorithm = %config.pool.algorithm,
        endpoints = config.pool.endpoints.len(),
        "lbcore starting"
    );

    for endpoint in &config.pool.endpoints {
        info!(
            address = %endpoint.address,
            weight = endpoint.weight,
            "configured endpoint"
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.simulate {
        Some(requests) => runtime.block_on(simulate(config, requests)),
        None => runtime.block_on(run(config)),
    }
}

/// Run the health checker and metrics server until Ctrl+C.
async fn run(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let metrics = MetricsCollector::new();

    let dispatcher = Dispatcher::from_config(&config).context("failed to build backend pool")?;
    let pool = Arc::clone(dispatcher.pool());

    let checker = HealthChecker::new(
        Arc::clone(&pool),
        ConfiguredProbe::from(&config.health_check),
        HealthCheckSettings::from(&config.health_check),
    )
    .with_metrics(metrics.clone());

    let dispatcher = Arc::new(
        dispatcher
            .with_passive_health(checker.passive())
            .with_metrics(metrics.clone()),
    );

    let mut handles = vec![tokio::spawn(checker.run(shutdown.subscribe()))];

    if config.global.metrics.enabled {
        let server = MetricsServer::new(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            metrics.clone(),
        )
        .with_pool(Arc::clone(&pool));
        let listener = server.bind().await.with_context(|| {
            format!(
                "failed to bind metrics server on {}",
                config.global.metrics.address
            )
        })?;
        handles.push(tokio::spawn(server.serve(listener, shutdown.subscribe())));
    }

    handles.push(tokio::spawn(log_summary(
        Arc::clone(&dispatcher),
        shutdown.subscribe(),
    )));

    info!("lbcore is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    shutdown.shutdown();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }

    info!(summary = %dispatcher.status(), "final distribution");
    info!("lbcore shut down complete");
    Ok(())
}

/// Periodically log the distribution summary.
async fn log_summary(dispatcher: Arc<Dispatcher>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = dispatcher.status();
                info!(
                    selected = status.total_selected(),
                    active_connections = status.active_connections(),
                    summary = %status,
                    "distribution summary"
                );
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Dispatch synthetic concurrent requests without probing, then print the
/// distribution.
async fn simulate(config: Config, requests: usize) -> Result<()> {
    let dispatcher =
        Arc::new(Dispatcher::from_config(&config).context("failed to build backend pool")?);

    info!(
        requests,
        algorithm = %dispatcher.algorithm(),
        "simulating requests"
    );

    let tasks: Vec<_> = (0..requests)
        .map(|i| {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let ctx = RequestContext::with_client_key(format!(
                    "10.{}.{}.{}",
                    (i >> 16) & 0xff,
                    (i >> 8) & 0xff,
                    i & 0xff
                ));
                let id = dispatcher.select(&ctx)?;
                tokio::task::yield_now().await;
                dispatcher.report_outcome(id, Outcome::Success)
            })
        })
        .collect();

    let mut failed = 0usize;
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                warn!(error = %e, "simulated request failed");
            }
            Err(e) => {
                failed += 1;
                error!(error = %e, "simulated request panicked");
            }
        }
    }

    println!("{}", dispatcher.status());
    if failed > 0 {
        println!("{failed} of {requests} requests failed");
    }
    Ok(())
}
