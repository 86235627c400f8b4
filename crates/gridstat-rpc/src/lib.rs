//! gridstat-rpc — snapshot distribution over gRPC.
//!
//! # Architecture
//!
//! ```text
//! Server process
//!   └── MetricsServer (gRPC)
//!       ├── GetMetrics() → current snapshot from SnapshotStore
//!       └── Watch()      → always UNIMPLEMENTED
//!
//! Stat process
//!   └── MetricsClient
//!       └── fetch() → Snapshot, bounded by a timeout
//! ```

pub mod client;
pub mod convert;
pub mod server;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("gridstat.v1");
}

pub use client::{MetricsClient, RpcError};
pub use server::MetricsServer;
