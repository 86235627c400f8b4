//! gridstat-core — shared data model for the gridstat pipeline.
//!
//! Holds the aggregate types that flow from the collector through the
//! snapshot store and over the wire, the TOML parser for metric
//! definitions, and the config error type shared with the client side.

pub mod config;
pub mod error;
pub mod types;

pub use config::{load_definitions, parse_definitions};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
