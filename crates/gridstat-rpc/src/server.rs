//! gRPC distribution server.
//!
//! Implements `MetricsService` straight off the [`SnapshotStore`]: each
//! `GetMetrics` clones the current snapshot handle and serializes it.

use std::future::Future;
use std::pin::Pin;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use gridstat_collector::SnapshotStore;

use crate::convert::snapshot_to_proto;
use crate::proto;
use crate::proto::metrics_service_server::{MetricsService, MetricsServiceServer};

/// Response stream type reserved for `Watch`.
pub type WatchStream =
    Pin<Box<dyn Stream<Item = Result<proto::WatchResponse, Status>> + Send + 'static>>;

/// gRPC implementation of the metrics service.
#[derive(Clone)]
pub struct MetricsServer {
    store: SnapshotStore,
}

impl MetricsServer {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> MetricsServiceServer<Self> {
        MetricsServiceServer::new(self)
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), tonic::transport::Error> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "metrics gRPC server listening");
        }

        tonic::transport::Server::builder()
            .add_service(self.into_service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsServer {
    type WatchStream = WatchStream;

    async fn get_metrics(
        &self,
        request: Request<proto::GetMetricsRequest>,
    ) -> Result<Response<proto::GetMetricsResponse>, Status> {
        let snapshot = self.store.current().await;
        debug!(
            peer = ?request.remote_addr(),
            metrics = snapshot.metrics.len(),
            collected_at = snapshot.collected_at,
            "serving snapshot"
        );
        Ok(Response::new(snapshot_to_proto(&snapshot)))
    }

    async fn watch(
        &self,
        request: Request<proto::WatchRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        warn!(peer = ?request.remote_addr(), "Watch requested but not implemented");
        Err(Status::unimplemented("method Watch not implemented"))
    }
}
