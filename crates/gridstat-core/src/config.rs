//! metrics.toml parser.
//!
//! ```toml
//! [[metric]]
//! name = "cpu-idle"
//! device_label = "cpu"
//! query = "avg by (instance, cpu) (rate(node_cpu_seconds_total{mode=\"idle\"}[10s]))"
//! scale = 100.0
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::types::MetricDefinition;

#[derive(Debug, Deserialize)]
struct MetricsFile {
    #[serde(default)]
    metric: Vec<MetricDefinition>,
}

/// Read and validate the full definition set from `path`.
pub fn load_definitions(path: &Path) -> ConfigResult<Vec<MetricDefinition>> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_definitions(&content, path)
}

/// Parse and validate a definition set. `origin` is only used in errors.
pub fn parse_definitions(content: &str, origin: &Path) -> ConfigResult<Vec<MetricDefinition>> {
    let file: MetricsFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    validate(&file.metric)?;
    Ok(file.metric)
}

fn validate(definitions: &[MetricDefinition]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for def in definitions {
        if def.name.trim().is_empty() {
            return Err(ConfigError::Invalid("metric with empty name".to_string()));
        }
        if def.query.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "metric {} has an empty query",
                def.name
            )));
        }
        if !def.scale.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "metric {} has a non-finite scale",
                def.name
            )));
        }
        if !seen.insert(def.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate metric name {}",
                def.name
            )));
        }
    }
    Ok(())
}
