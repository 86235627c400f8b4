//! gridstat — cluster metrics aggregation with a dstat-style client.
//!
//! Two modes in one binary:
//! - `server`: collect metrics from a Prometheus-compatible backend and
//!   serve the latest snapshot over gRPC
//! - `stat`: poll a server and print a table per interval
//!
//! # Usage
//!
//! ```text
//! gridstat server --listen 0.0.0.0:7410 --backend http://prometheus:9090 --metrics-config metrics.toml
//! gridstat stat --server 127.0.0.1:7410 --formats formats.toml --show-devices
//! ```

mod server_mode;
mod stat_mode;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gridstat", about = "dstat for a cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect metrics from the monitoring backend and serve snapshots.
    Server {
        /// Address for the gRPC server.
        #[arg(long)]
        listen: SocketAddr,

        /// Monitoring backend base URL.
        #[arg(long)]
        backend: String,

        /// Metric definitions file.
        #[arg(long)]
        metrics_config: PathBuf,

        /// Seconds between collection cycles.
        #[arg(long, default_value = "5")]
        poll_interval: u64,

        /// Seconds between metric definition reloads.
        #[arg(long, default_value = "30")]
        reload_interval: u64,

        /// Per-query timeout in seconds.
        #[arg(long, default_value = "10")]
        query_timeout: u64,
    },

    /// Poll a gridstat server and print metrics.
    Stat {
        /// Address of the gridstat server.
        #[arg(long)]
        server: String,

        /// Presentation formats file.
        #[arg(long)]
        formats: PathBuf,

        /// Show a row per device under each host.
        #[arg(long)]
        show_devices: bool,

        /// Redraw the screen each poll instead of scrolling.
        #[arg(long)]
        top: bool,

        /// Seconds between polls.
        #[arg(long, default_value = "5")]
        interval: u64,

        /// Fetch timeout in seconds.
        #[arg(long, default_value = "10")]
        timeout: u64,

        /// Seconds between format reloads.
        #[arg(long, default_value = "30")]
        reload_interval: u64,

        /// Repeat the header after this many rows (scrolling mode).
        /// Defaults to the terminal height.
        #[arg(long)]
        header_every: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,gridstat=debug"));

    match cli.command {
        Command::Server {
            listen,
            backend,
            metrics_config,
            poll_interval,
            reload_interval,
            query_timeout,
        } => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            server_mode::run_server(server_mode::ServerArgs {
                listen,
                backend,
                metrics_config,
                poll_interval,
                reload_interval,
                query_timeout,
            })
            .await
        }
        Command::Stat {
            server,
            formats,
            show_devices,
            top,
            interval,
            timeout,
            reload_interval,
            header_every,
        } => {
            // Table goes to stdout; keep logs off it.
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            stat_mode::run_stat(stat_mode::StatArgs {
                server,
                formats,
                show_devices,
                top,
                interval,
                timeout,
                reload_interval,
                header_every,
            })
            .await
        }
    }
}
