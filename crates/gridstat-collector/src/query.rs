//! Backend query seam.

use std::collections::BTreeMap;

use async_trait::async_trait;

use gridstat_core::{Sample, INSTANCE_LABEL};

use crate::error::QueryError;

/// One labelled instantaneous value returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Series {
    pub fn new<I, K, V>(labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            value,
        }
    }

    /// Attribute this series to a host and, if `device_label` is set, a device.
    ///
    /// Missing labels become empty strings.
    pub fn to_sample(&self, device_label: Option<&str>) -> Sample {
        let label = |name: &str| self.labels.get(name).cloned().unwrap_or_default();
        Sample {
            host: label(INSTANCE_LABEL),
            device: device_label.map(label),
            value: self.value,
        }
    }
}

/// Executes query expressions against a time-series backend.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Run an instant query. Only vector results are accepted.
    async fn query(&self, expression: &str) -> Result<Vec<Series>, QueryError>;

    /// Liveness check run once before collection starts.
    async fn probe(&self) -> Result<(), QueryError> {
        self.query("up").await.map(|_| ())
    }
}
