//! Metric definition registry with all-or-nothing hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use gridstat_core::{load_definitions, ConfigResult, MetricDefinition};

/// Holds the active definition set loaded from a metrics file.
///
/// The set is swapped wholesale on a successful reload and never
/// mutated in place; readers keep whatever `Arc` they already hold.
pub struct DefinitionRegistry {
    path: PathBuf,
    active: RwLock<Arc<[MetricDefinition]>>,
    /// When the last reload was attempted, successful or not.
    checked_at: Mutex<Option<Instant>>,
}

impl DefinitionRegistry {
    /// Create an empty registry backed by `path`. Nothing is read until
    /// [`reload`](Self::reload) is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            active: RwLock::new(Arc::from(Vec::new())),
            checked_at: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the metrics file and replace the active set.
    ///
    /// On error the previous set stays active. Returns the new set size.
    pub async fn reload(&self) -> ConfigResult<usize> {
        *self.checked_at.lock().await = Some(Instant::now());

        let definitions = load_definitions(&self.path)?;
        let count = definitions.len();

        *self.active.write().await = Arc::from(definitions);
        info!(path = ?self.path, count, "metric definitions loaded");
        Ok(count)
    }

    /// Whether `interval` has passed since the last reload attempt.
    pub async fn reload_due(&self, interval: Duration) -> bool {
        match *self.checked_at.lock().await {
            Some(at) => at.elapsed() >= interval,
            None => true,
        }
    }

    /// Snapshot of the active definition set.
    pub async fn current(&self) -> Arc<[MetricDefinition]> {
        let defs = self.active.read().await.clone();
        debug!(count = defs.len(), "definitions read");
        defs
    }
}
