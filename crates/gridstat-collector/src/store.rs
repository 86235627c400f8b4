//! Latest-snapshot slot shared between the collection loop and RPC readers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use gridstat_core::Snapshot;

/// Single-slot store holding the most recent complete [`Snapshot`].
///
/// Readers clone the inner `Arc` under a shared lock; `publish` swaps it
/// under the exclusive lock. A reader therefore sees either the previous
/// or the new snapshot, never one under construction.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    slot: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotStore {
    /// Create a store holding the empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest published snapshot.
    pub async fn current(&self) -> Arc<Snapshot> {
        self.slot.read().await.clone()
    }

    /// Replace the current snapshot. Waits for in-flight reads to finish.
    pub async fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let metrics = snapshot.metrics.len();
        let collected_at = snapshot.collected_at;

        *self.slot.write().await = snapshot;
        debug!(metrics, collected_at, "snapshot published");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gridstat_core::{ClusterAggregate, InstanceAggregate};

    use super::*;

    /// Snapshot where every metric and host carries `cycle` as its value.
    fn cycle_snapshot(cycle: i64) -> Snapshot {
        let mut metrics = BTreeMap::new();
        for name in ["cpu", "mem", "disk", "net"] {
            let mut cluster = ClusterAggregate::default();
            for host in ["h1", "h2", "h3"] {
                let mut agg = InstanceAggregate {
                    value: cycle,
                    ..Default::default()
                };
                agg.summarize();
                cluster.instances.insert(host.to_string(), agg);
            }
            metrics.insert(name.to_string(), cluster);
        }
        Snapshot::new(metrics, cycle as u64)
    }

    #[tokio::test]
    async fn starts_empty() {
        let store = SnapshotStore::new();
        let snap = store.current().await;
        assert!(snap.is_empty());
        assert_eq!(snap.collected_at, 0);
    }

    #[tokio::test]
    async fn publish_replaces_and_keeps_old_reads() {
        let store = SnapshotStore::new();
        store.publish(cycle_snapshot(1)).await;
        let old = store.current().await;

        store.publish(cycle_snapshot(2)).await;
        assert_eq!(old.collected_at, 1);
        assert_eq!(store.current().await.collected_at, 2);
    }

    #[tokio::test]
    async fn reads_without_publish_are_identical() {
        let store = SnapshotStore::new();
        store.publish(cycle_snapshot(7)).await;
        let a = store.current().await;
        let b = store.current().await;
        assert_eq!(*a, *b);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_see_mixed_cycles() {
        let store = SnapshotStore::new();
        store.publish(cycle_snapshot(0)).await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for cycle in 1..=200 {
                    store.publish(cycle_snapshot(cycle)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let snap = store.current().await;
                    let cycle = snap.collected_at as i64;
                    for cluster in snap.metrics.values() {
                        for agg in cluster.instances.values() {
                            assert_eq!(agg.total, cycle, "snapshot mixes cycles");
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(store.current().await.collected_at, 200);
    }
}
