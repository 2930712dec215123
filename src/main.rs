//! VIRTA - Kubernetes Event Stream Exporter
//!
//! Reads a YAML config, wires sinks into the receiver registry, compiles the
//! route tree, and streams cluster Events through the pipeline until a
//! termination signal (or loss of leadership) triggers a graceful drain.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use virta::engine::{ClusterNameTagger, Engine, EventHandler};
use virta::error::VirtaError;
use virta::k8s::leader::{LeaderCallbacks, LeaderElector, LEASE_DURATION};
use virta::k8s::metadata::{ObjectMetadataCache, ObjectMetadataProvider};
use virta::k8s::watcher::EventWatcher;
use virta::k8s;
use virta::metrics::Store;
use virta::metrics_server::MetricsServer;
use virta::registry::ReceiverRegistry;
use virta::Config;

#[derive(Parser, Debug)]
#[command(
    name = "virta",
    version,
    about = "Export Kubernetes Events to multiple destinations with routing and filtering"
)]
struct Cli {
    /// Path to the config file
    #[arg(long, default_value = "config.yaml")]
    conf: PathBuf,

    /// The address to listen on for HTTP requests
    #[arg(long = "metrics-address", default_value = ":2112")]
    metrics_address: String,

    /// Path to the kubeconfig file to use; in-cluster config when empty
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// The TLS config file for the metrics endpoint
    #[arg(long = "metrics-tls-config")]
    metrics_tls_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.conf)
        .with_context(|| format!("cannot read config file {}", cli.conf.display()))?;
    let config = Config::from_yaml(&raw)?;
    config.validate()?;

    init_tracing(&config);
    info!(path = %cli.conf.display(), "loaded config file");

    let startup_time = chrono::Utc::now();
    let metrics_addr = parse_metrics_address(&cli.metrics_address)?;
    let store = Arc::new(Store::new(&config.metrics_name_prefix)?);
    let _metrics_server = MetricsServer::start(
        metrics_addr,
        cli.metrics_tls_config.as_deref(),
        Arc::clone(&store),
    )
    .await?;

    let client = k8s::client::build_client(cli.kubeconfig.as_deref()).await?;

    let registry = ReceiverRegistry::new(Arc::clone(&store), config.throttle_period);
    for receiver in &config.receivers {
        let sink = receiver.create().await.map_err(|source| VirtaError::Sink {
            name: receiver.name.clone(),
            source,
        })?;
        registry.register(&receiver.name, sink);
    }

    let engine = Arc::new(Engine::new(&config.route, registry)?);
    let handler: Arc<dyn EventHandler> = match &config.cluster_name {
        Some(name) => Arc::new(ClusterNameTagger::new(
            name.clone(),
            Arc::clone(&engine) as Arc<dyn EventHandler>,
        )),
        None => Arc::clone(&engine) as Arc<dyn EventHandler>,
    };

    let provider: Arc<dyn ObjectMetadataProvider> = Arc::new(ObjectMetadataCache::new(
        client.clone(),
        config.cache_size,
        Arc::clone(&store),
    ));
    let watcher = EventWatcher::new(
        client.clone(),
        config.namespace.clone(),
        config.max_event_age_seconds,
        startup_time,
        provider,
        config.omit_lookup,
        handler,
        Arc::clone(&store),
    );

    let (leader_lost_tx, mut leader_lost_rx) = mpsc::channel::<()>(1);
    let mut elector_stop: Option<oneshot::Sender<()>> = None;

    if config.leader_election.enabled {
        let lease_namespace =
            std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        let watcher_for_lead = Arc::clone(&watcher);
        let lost = leader_lost_tx.clone();
        let elector = Arc::new(LeaderElector::new(
            client.clone(),
            lease_namespace,
            config.leader_election.leader_election_id.clone(),
            LeaderCallbacks {
                on_started_leading: Box::new(move || {
                    info!("leader election won");
                    Arc::clone(&watcher_for_lead).start();
                }),
                on_stopped_leading: Box::new(move || {
                    let _ = lost.try_send(());
                }),
                on_new_leader: Box::new(|leader| {
                    info!(leader, "observed new leader");
                }),
            },
        ));

        let (stop_tx, stop_rx) = oneshot::channel();
        elector_stop = Some(stop_tx);
        tokio::spawn(async move {
            elector.run(stop_rx).await;
        });
    } else {
        Arc::clone(&watcher).start();
    }

    let lost_leadership = tokio::select! {
        _ = shutdown_signal() => {
            info!("received signal to exit");
            false
        }
        _ = leader_lost_rx.recv() => {
            warn!("leader election lost");
            true
        }
    };

    if let Some(stop) = elector_stop.take() {
        let _ = stop.send(());
    }
    if lost_leadership {
        // Keep emitting through the window before a new leader exists.
        info!(
            seconds = LEASE_DURATION.as_secs(),
            "waiting before stopping the watcher"
        );
        tokio::time::sleep(LEASE_DURATION).await;
    }

    watcher.stop().await;
    engine.stop().await;
    info!("exiting");
    Ok(())
}

fn init_tracing(config: &Config) {
    let level = if config.log_level.is_empty() {
        "info"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Accepts the `:2112` shorthand for an all-interfaces bind.
fn parse_metrics_address(addr: &str) -> anyhow::Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .with_context(|| format!("invalid metrics address '{addr}'"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
