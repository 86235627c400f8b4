//! Snapshot client used by the stat poller.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tonic::transport::Endpoint;
use tracing::debug;

use gridstat_core::Snapshot;

use crate::convert::snapshot_from_proto;
use crate::proto;
use crate::proto::metrics_service_client::MetricsServiceClient;

/// Errors from one `GetMetrics` poll.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid server address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("cannot connect to metric server {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to get metrics from {address}: {status}")]
    Status { address: String, status: tonic::Status },

    #[error("metric server {address} did not answer within {timeout:?}")]
    Timeout { address: String, timeout: Duration },
}

/// Fetches snapshots from a remote [`MetricsServer`](crate::MetricsServer).
///
/// A fresh connection is made per fetch, so a restarted server is picked
/// up on the next poll without any reconnect logic.
#[derive(Debug, Clone)]
pub struct MetricsClient {
    address: String,
    timeout: Duration,
}

impl MetricsClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn endpoint(&self) -> Result<Endpoint, RpcError> {
        let uri = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        };
        Endpoint::from_shared(uri)
            .map(|ep| ep.connect_timeout(self.timeout).timeout(self.timeout))
            .map_err(|source| RpcError::InvalidAddress {
                address: self.address.clone(),
                source,
            })
    }

    /// Connect, call `GetMetrics`, and convert the reply. The whole call is
    /// bounded by the client timeout.
    pub async fn fetch(&self) -> Result<Snapshot, RpcError> {
        let endpoint = self.endpoint()?;

        let call = async {
            let channel = endpoint.connect().await.map_err(|source| RpcError::Connect {
                address: self.address.clone(),
                source,
            })?;
            let mut client = MetricsServiceClient::new(channel);
            client
                .get_metrics(proto::GetMetricsRequest {})
                .await
                .map_err(|status| RpcError::Status {
                    address: self.address.clone(),
                    status,
                })
        };

        let response = self.bounded(call).await?;

        let snapshot = snapshot_from_proto(response.into_inner());
        debug!(
            address = %self.address,
            metrics = snapshot.metrics.len(),
            collected_at = snapshot.collected_at,
            "fetched snapshot"
        );
        Ok(snapshot)
    }

    /// Call `Watch`. The server does not implement streaming, so this
    /// returns the server's status. Bounded by the client timeout like
    /// [`fetch`](Self::fetch).
    pub async fn watch(&self, metric_names: Vec<String>) -> Result<(), RpcError> {
        let endpoint = self.endpoint()?;

        let call = async {
            let channel = endpoint.connect().await.map_err(|source| RpcError::Connect {
                address: self.address.clone(),
                source,
            })?;
            MetricsServiceClient::new(channel)
                .watch(proto::WatchRequest { metric_names })
                .await
                .map(|_| ())
                .map_err(|status| RpcError::Status {
                    address: self.address.clone(),
                    status,
                })
        };

        self.bounded(call).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RpcError>>,
    ) -> Result<T, RpcError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RpcError::Timeout {
                address: self.address.clone(),
                timeout: self.timeout,
            })?
    }
}
