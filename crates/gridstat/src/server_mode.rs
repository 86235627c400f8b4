//! Server mode: collection loop plus gRPC distribution.
//!
//! Startup is strict: the initial metric definitions must load, the
//! backend must answer a probe, and the listen address must bind. After
//! that, query and reload failures are logged and collection keeps going;
//! the collector or gRPC task ending on its own exits the process non-zero.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use gridstat_collector::{Collector, CollectorConfig, DefinitionRegistry, PrometheusClient, SnapshotStore};
use gridstat_rpc::MetricsServer;

pub struct ServerArgs {
    pub listen: SocketAddr,
    pub backend: String,
    pub metrics_config: PathBuf,
    pub poll_interval: u64,
    pub reload_interval: u64,
    pub query_timeout: u64,
}

pub async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    info!("gridstat server starting");

    // ── Metric definitions ─────────────────────────────────────
    let registry = Arc::new(DefinitionRegistry::new(&args.metrics_config));
    let count = registry
        .reload()
        .await
        .context("loading initial metric definitions")?;
    info!(path = ?args.metrics_config, count, "metric definitions loaded");

    // ── Backend ────────────────────────────────────────────────
    let backend = PrometheusClient::new(&args.backend)?;
    let config = CollectorConfig {
        poll_interval: Duration::from_secs(args.poll_interval),
        reload_interval: Duration::from_secs(args.reload_interval),
        query_timeout: Duration::from_secs(args.query_timeout),
    };
    let store = SnapshotStore::new();
    let collector = Collector::new(registry, store.clone(), backend, config);
    collector
        .probe()
        .await
        .with_context(|| format!("monitoring backend {} unreachable", args.backend))?;

    // ── gRPC listener ──────────────────────────────────────────
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector_shutdown = shutdown_rx.clone();
    let mut server_shutdown = shutdown_rx;

    let collector_handle = tokio::spawn(async move {
        collector.run(collector_shutdown).await;
    });

    let server_handle = tokio::spawn(async move {
        MetricsServer::new(store)
            .serve(listener, async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    let signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    supervise(signal, collector_handle, server_handle, shutdown_tx).await?;

    info!("gridstat server stopped");
    Ok(())
}

/// Wait for `signal` or for either task to end, then stop both.
///
/// A task ending before the signal is an error: the process must not keep
/// serving a snapshot nobody refreshes.
async fn supervise<E>(
    signal: impl Future<Output = ()>,
    mut collector: JoinHandle<()>,
    mut server: JoinHandle<Result<(), E>>,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut collector_done = false;
    let mut server_done = false;

    let failure = tokio::select! {
        _ = signal => {
            info!("shutdown signal received");
            None
        }
        res = &mut collector => {
            collector_done = true;
            Some(match res {
                Ok(()) => anyhow!("collector stopped unexpectedly"),
                Err(e) => anyhow!("collector task panicked: {e}"),
            })
        }
        res = &mut server => {
            server_done = true;
            Some(match res {
                Ok(Ok(())) => anyhow!("gRPC server stopped unexpectedly"),
                Ok(Err(e)) => anyhow::Error::new(e).context("gRPC server failed"),
                Err(e) => anyhow!("gRPC server task panicked: {e}"),
            })
        }
    };

    if let Some(e) = &failure {
        error!(error = %format!("{e:#}"), "shutting down");
    }
    let _ = shutdown_tx.send(true);

    if !collector_done {
        if let Err(e) = collector.await {
            error!(error = %e, "collector task panicked");
        }
    }
    if !server_done {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "gRPC server failed"),
            Err(e) => error!(error = %e, "gRPC server task panicked"),
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
