//! Prometheus HTTP API client.
//!
//! Issues instant queries against `/api/v1/query` over plain HTTP/1.1
//! and decodes vector results into [`Series`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::QueryError;
use crate::query::{QueryService, Series};

/// Client for a Prometheus-compatible query endpoint.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base: Url,
    /// `host:port` used for the TCP connection and the Host header.
    authority: String,
}

impl PrometheusClient {
    /// Build a client for `address`, e.g. `http://prometheus:9090` or
    /// `localhost:9090`. A path prefix is kept (`http://gw/prom`).
    pub fn new(address: &str) -> Result<Self, QueryError> {
        let invalid = |reason: &str| QueryError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let base = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
        if base.scheme() != "http" {
            return Err(QueryError::UnsupportedScheme(base.scheme().to_string()));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("not a base url"));
        }
        let host = base.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = base.port_or_known_default().unwrap_or(80);
        let authority = format!("{host}:{port}");

        Ok(Self { base, authority })
    }

    /// Backend address as `host:port`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Full URL of an instant query for `expression`.
    pub fn query_url(&self, expression: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "v1", "query"]);
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("query", expression);
        url
    }

    async fn get(&self, url: &Url) -> Result<(StatusCode, Bytes), QueryError> {
        let stream = tokio::net::TcpStream::connect(self.authority.as_str())
            .await
            .map_err(|e| QueryError::Connect {
                address: self.authority.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| QueryError::Http(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "backend connection closed with error");
            }
        });

        let path_and_query = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };

        let req = http::Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, "gridstat/0.1")
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| QueryError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| QueryError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| QueryError::Http(e.to_string()))?
            .to_bytes();

        Ok((status, body))
    }
}

#[async_trait]
impl QueryService for PrometheusClient {
    async fn query(&self, expression: &str) -> Result<Vec<Series>, QueryError> {
        let url = self.query_url(expression);
        debug!(%url, "querying backend");
        let (status, body) = self.get(&url).await?;
        parse_response(status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// `[unix_time, "value"]`
    value: (f64, String),
}

/// Decode an `/api/v1/query` response body.
pub fn parse_response(status: StatusCode, body: &[u8]) -> Result<Vec<Series>, QueryError> {
    let response: ApiResponse = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) if !status.is_success() => return Err(QueryError::Status(status.as_u16())),
        Err(e) => return Err(QueryError::Decode(e.to_string())),
    };

    if response.status != "success" {
        return Err(QueryError::Backend {
            error_type: response.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: response.error.unwrap_or_default(),
        });
    }
    if !status.is_success() {
        return Err(QueryError::Status(status.as_u16()));
    }
    if !response.warnings.is_empty() {
        warn!(warnings = ?response.warnings, "backend returned warnings");
    }

    let data = response
        .data
        .ok_or_else(|| QueryError::Decode("response has no data".to_string()))?;
    if data.result_type != "vector" {
        return Err(QueryError::UnexpectedResultType(data.result_type));
    }

    let samples: Vec<VectorSample> =
        serde_json::from_value(data.result).map_err(|e| QueryError::Decode(e.to_string()))?;

    samples
        .into_iter()
        .map(|s| {
            let raw = s.value.1;
            let value = raw
                .parse::<f64>()
                .map_err(|e| QueryError::Decode(format!("bad sample value {raw:?}: {e}")))?;
            Ok(Series {
                labels: s.metric,
                value,
            })
        })
        .collect()
}
