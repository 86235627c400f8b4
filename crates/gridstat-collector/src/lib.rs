//! gridstat-collector — turns backend query results into published snapshots.
//!
//! # Architecture
//!
//! ```text
//! Collector
//!   ├── DefinitionRegistry  ← metrics.toml, reloaded on its own interval
//!   ├── QueryService        ← one bounded query per definition
//!   │   └── PrometheusClient (HTTP /api/v1/query)
//!   ├── aggregate()         → ClusterAggregate per metric
//!   └── SnapshotStore       ← one atomic publish per cycle
//! ```
//!
//! The registry and the store each own their lock; the loop never holds
//! both at once. A failed query drops only that metric from the cycle.

pub mod aggregate;
pub mod collector;
pub mod error;
pub mod prometheus;
pub mod query;
pub mod registry;
pub mod store;

pub use aggregate::aggregate;
pub use collector::{Collector, CollectorConfig};
pub use error::{CollectorError, QueryError};
pub use prometheus::PrometheusClient;
pub use query::{QueryService, Series};
pub use registry::DefinitionRegistry;
pub use store::SnapshotStore;
