use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tollgate::clock::{Clock, SystemClock};
use tollgate::config::{AppConfig, LoggingConfig};
use tollgate::error::validate_client_id;
use tollgate::ratelimit::{EndpointRateLimiter, LimiterFactory, LimiterState};
use tollgate::store::{spawn_expiry_sweeper, FaultInjectingStore, MemoryStore};

/// Admission control engine.
#[derive(Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Configuration file (YAML); `TOLLGATE__*` environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run admissions for one client and print each decision as JSON
    Check {
        #[arg(long)]
        client: String,

        #[arg(long, default_value = "/")]
        endpoint: String,

        #[arg(long, default_value_t = 1)]
        count: u64,
    },

    /// Drive random traffic through the configured limiters
    Soak {
        #[arg(long, default_value_t = 100)]
        clients: usize,

        #[arg(long, default_value_t = 4)]
        workers: usize,

        #[arg(long, default_value_t = 10)]
        duration_secs: u64,

        /// Make the shared store unavailable after this many milliseconds
        #[arg(long)]
        outage_after_ms: Option<u64>,
    },
}

#[derive(Serialize)]
struct CheckLine<'a> {
    client: &'a str,
    endpoint: &'a str,
    #[serde(flatten)]
    status: tollgate::ratelimit::RateLimitStatus,
}

#[derive(Debug, Serialize)]
struct SoakSummary {
    instance_id: String,
    admitted: u64,
    denied: u64,
    elapsed_ms: u64,
    store_outage: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!("Starting Tollgate Admission Control Engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(instance_id = %config.instance_id, "Configuration loaded");

    let rules = config.load_rules().context("Failed to load rate limit rules")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let memory = Arc::new(MemoryStore::<LimiterState>::new(clock.clone()));
    let store = Arc::new(FaultInjectingStore::new(memory.clone()));

    let factory = LimiterFactory::new(store.clone(), clock);
    let limiter = Arc::new(factory.endpoint_tiered(&rules, Arc::new(config.tier_resolver()))?);
    info!("Rate limiters initialized");

    match cli.command {
        Command::Check {
            client,
            endpoint,
            count,
        } => {
            let client = validate_client_id(&client)?;
            for _ in 0..count {
                let line = CheckLine {
                    client,
                    endpoint: &endpoint,
                    status: limiter.check(client, &endpoint),
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Command::Soak {
            clients,
            workers,
            duration_secs,
            outage_after_ms,
        } => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let sweeper = spawn_expiry_sweeper(
                memory,
                Duration::from_millis(config.store.sweep_interval_ms),
                shutdown_rx,
            );

            let mut endpoints: Vec<String> = rules.endpoints.keys().cloned().collect();
            endpoints.push("/".to_string());
            let client_ids: Vec<String> = (0..clients.max(1)).map(|i| format!("client-{}", i)).collect();

            let stop = Arc::new(AtomicBool::new(false));
            let admitted = Arc::new(AtomicU64::new(0));
            let denied = Arc::new(AtomicU64::new(0));
            let started = Instant::now();

            info!(clients, workers, duration_secs, "Starting soak run");

            let mut handles = Vec::new();
            for _ in 0..workers.max(1) {
                let limiter = limiter.clone();
                let stop = stop.clone();
                let admitted = admitted.clone();
                let denied = denied.clone();
                let client_ids = client_ids.clone();
                let endpoints = endpoints.clone();

                handles.push(tokio::task::spawn_blocking(move || {
                    let mut rng = rand::thread_rng();
                    while !stop.load(Ordering::Relaxed) {
                        let (Some(client), Some(endpoint)) =
                            (client_ids.choose(&mut rng), endpoints.choose(&mut rng))
                        else {
                            break;
                        };
                        if limiter.allow_request(client, endpoint) {
                            admitted.fetch_add(1, Ordering::Relaxed);
                        } else {
                            denied.fetch_add(1, Ordering::Relaxed);
                        }
                        if rng.gen_ratio(1, 64) {
                            std::thread::sleep(Duration::from_millis(1));
                        }
                    }
                }));
            }

            let outage = {
                let store = store.clone();
                async move {
                    if let Some(after) = outage_after_ms {
                        tokio::time::sleep(Duration::from_millis(after)).await;
                        warn!("Injecting state store outage");
                        store.set_unavailable(true);
                    }
                    std::future::pending::<()>().await
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {
                    info!("Soak duration elapsed");
                }
                _ = shutdown_signal() => {}
                _ = outage => {}
            }

            stop.store(true, Ordering::Relaxed);
            for handle in handles {
                handle.await.context("Soak worker panicked")?;
            }
            shutdown_tx.send(true).ok();
            sweeper.await.context("Expiry sweeper panicked")?;

            let summary = SoakSummary {
                instance_id: config.instance_id.clone(),
                admitted: admitted.load(Ordering::Relaxed),
                denied: denied.load(Ordering::Relaxed),
                elapsed_ms: started.elapsed().as_millis() as u64,
                store_outage: store.is_unavailable(),
            };
            println!("{}", serde_json::to_string(&summary)?);
        }
    }

    info!("Tollgate stopped");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    // Decisions go to stdout as JSON; logs stay on stderr.
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_thread_ids(true))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(true),
            )
            .try_init()?;
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
