//! Core domain types shared across gridstat crates.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Label carrying the host identity on every backend series.
pub const INSTANCE_LABEL: &str = "instance";

/// A named metric the server collects each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    /// Series label that breaks the metric down per device (e.g. `cpu`, `device`).
    #[serde(default)]
    pub device_label: Option<String>,
    /// Prefix for device keys. Falls back to `device_label` when unset.
    #[serde(default)]
    pub device_prefix: Option<String>,
    /// Query expression passed verbatim to the backend.
    pub query: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl MetricDefinition {
    /// Key under which a device's value is stored: `"{prefix}: {device}"`.
    pub fn device_key(&self, device: &str) -> String {
        let prefix = self
            .device_prefix
            .as_deref()
            .or(self.device_label.as_deref())
            .unwrap_or_default();
        format!("{prefix}: {device}")
    }

    /// Scale a raw backend value, truncating toward zero.
    ///
    /// Out-of-range results saturate and NaN becomes 0.
    pub fn scale_value(&self, raw: f64) -> i64 {
        (raw * self.scale) as i64
    }
}

/// One instantaneous backend reading, already attributed to a host.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub host: String,
    pub device: Option<String>,
    pub value: f64,
}

/// Summary of one metric on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAggregate {
    /// Scaled value per device key. Empty for metrics without a device label.
    pub devices: BTreeMap<String, i64>,
    /// Sum over devices, or the scalar value when there are no devices.
    pub total: i64,
    /// `total / devices.len()`, 0 when there are no devices.
    pub average: i64,
    /// Scalar value for metrics without a device label.
    pub value: i64,
}

impl InstanceAggregate {
    /// Recompute `total` and `average` from `devices` / `value`.
    ///
    /// The device sum saturates at the `i64` bounds.
    pub fn summarize(&mut self) {
        let count = self.devices.len() as i64;
        if count > 0 {
            self.total = self
                .devices
                .values()
                .fold(0i64, |acc, v| acc.saturating_add(*v));
            self.average = self.total / count;
        } else {
            self.total = self.value;
            self.average = 0;
        }
    }
}

/// One metric across the cluster: host → aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAggregate {
    pub instances: BTreeMap<String, InstanceAggregate>,
}

impl ClusterAggregate {
    pub fn get(&self, host: &str) -> Option<&InstanceAggregate> {
        self.instances.get(host)
    }
}

/// A complete, internally consistent result of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Metric name → cluster aggregate. Metrics whose query failed are absent.
    pub metrics: BTreeMap<String, ClusterAggregate>,
    /// Unix epoch seconds at which the cycle finished. 0 for the empty snapshot.
    pub collected_at: u64,
}

impl Snapshot {
    pub fn new(metrics: BTreeMap<String, ClusterAggregate>, collected_at: u64) -> Self {
        Self {
            metrics,
            collected_at,
        }
    }

    pub fn get(&self, metric: &str) -> Option<&ClusterAggregate> {
        self.metrics.get(metric)
    }

    /// Aggregate for `metric` on `host`, if both are present.
    pub fn instance(&self, metric: &str, host: &str) -> Option<&InstanceAggregate> {
        self.metrics.get(metric).and_then(|m| m.get(host))
    }

    /// Union of host keys across every metric present, sorted.
    pub fn hosts(&self) -> BTreeSet<&str> {
        self.metrics
            .values()
            .flat_map(|m| m.instances.keys().map(String::as_str))
            .collect()
    }

    /// Union of device keys seen for `host` across every metric, sorted.
    pub fn devices_for(&self, host: &str) -> BTreeSet<&str> {
        self.metrics
            .values()
            .filter_map(|m| m.get(host))
            .flat_map(|i| i.devices.keys().map(String::as_str))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
