//! Stat mode: poll a server and print a table until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use gridstat_rpc::MetricsClient;
use gridstat_stat::{
    terminal_header_every, FormatSet, PollerConfig, StatPoller, TableOptions, TableRenderer,
};

pub struct StatArgs {
    pub server: String,
    pub formats: PathBuf,
    pub show_devices: bool,
    pub top: bool,
    pub interval: u64,
    pub timeout: u64,
    pub reload_interval: u64,
    pub header_every: Option<usize>,
}

pub async fn run_stat(args: StatArgs) -> anyhow::Result<()> {
    let formats = FormatSet::load(&args.formats).context("loading presentation formats")?;
    info!(path = ?args.formats, count = formats.len(), server = %args.server, "gridstat stat starting");

    let client = MetricsClient::new(args.server, Duration::from_secs(args.timeout));
    let renderer = TableRenderer::new(
        std::io::stdout(),
        TableOptions {
            show_devices: args.show_devices,
            top: args.top,
            header_every: args.header_every.unwrap_or_else(terminal_header_every),
        },
    );
    let mut poller = StatPoller::new(
        client,
        renderer,
        args.formats,
        formats,
        PollerConfig {
            poll_interval: Duration::from_secs(args.interval),
            reload_interval: Duration::from_secs(args.reload_interval),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        let _ = shutdown_tx.send(true);
    });

    poller.run(shutdown_rx).await.context("writing output")?;
    Ok(())
}
