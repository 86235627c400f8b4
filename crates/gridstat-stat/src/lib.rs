//! gridstat-stat — the `stat` side: poll a metrics server and print a table.
//!
//! ```text
//! StatPoller
//!   ├── SnapshotSource (MetricsClient) → Snapshot or RpcError
//!   ├── FormatSet      ← formats.toml, reloaded on its own interval
//!   └── Renderer       ← Fresh(snapshot) | Stale { last, error }
//!       └── TableRenderer (scrolling or top)
//! ```

pub mod formats;
pub mod poller;
pub mod render;

pub use formats::{FormatSet, MetricFormat, ValueKind};
pub use poller::{PollerConfig, SnapshotSource, StatPoller};
pub use render::{terminal_header_every, PollOutcome, Renderer, TableOptions, TableRenderer};
