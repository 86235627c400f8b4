//! Presentation formats (formats.toml).
//!
//! Each format names a metric, the column header to show for it, and a
//! value kind. The kind is resolved once at load time into the strategy
//! that picks and formats the cell value.
//!
//! ```toml
//! [[format]]
//! name = "cpu-idle"
//! shorthand = "idl"
//! value_kind = "cpu"
//! ```

use std::collections::HashSet;
use std::path::Path;

use bytesize::ByteSize;
use serde::Deserialize;

use gridstat_core::{ConfigError, ConfigResult, InstanceAggregate};

/// How a metric's values are summarized and printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Percentages: per-host average across devices, plain integer.
    Cpu,
    /// Byte counts: per-host total, human-readable size.
    Size,
}

impl ValueKind {
    /// Column width for this kind.
    pub fn width(self) -> usize {
        match self {
            ValueKind::Cpu => 5,
            ValueKind::Size => 8,
        }
    }

    /// The host-level number shown for this kind.
    pub fn summary(self, agg: &InstanceAggregate) -> i64 {
        match self {
            ValueKind::Cpu if !agg.devices.is_empty() => agg.average,
            ValueKind::Cpu | ValueKind::Size => agg.total,
        }
    }

    /// Render a value without padding.
    pub fn format(self, value: i64) -> String {
        match self {
            ValueKind::Cpu => value.to_string(),
            ValueKind::Size => ByteSize::b(u64::try_from(value).unwrap_or(0)).to_string(),
        }
    }
}

/// Display settings for one metric.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricFormat {
    /// Metric name as published by the server.
    pub name: String,
    /// Column header.
    pub shorthand: String,
    pub value_kind: ValueKind,
}

#[derive(Debug, Deserialize)]
struct FormatsFile {
    #[serde(default)]
    format: Vec<MetricFormat>,
}

/// Ordered list of formats; the order is the column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSet {
    formats: Vec<MetricFormat>,
}

impl FormatSet {
    pub fn new(formats: Vec<MetricFormat>) -> ConfigResult<Self> {
        let mut seen = HashSet::new();
        for f in &formats {
            if f.name.trim().is_empty() {
                return Err(ConfigError::Invalid("format with empty name".to_string()));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate format {}", f.name)));
            }
        }
        Ok(Self { formats })
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let file: FormatsFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Self::new(file.format)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricFormat> {
        self.formats.iter()
    }

    pub fn get(&self, name: &str) -> Option<&MetricFormat> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
