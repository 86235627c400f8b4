//! Collection loop — queries every definition and publishes one snapshot
//! per cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gridstat_core::{ClusterAggregate, MetricDefinition, Sample, Snapshot};

use crate::aggregate::aggregate;
use crate::error::{CollectorError, QueryError};
use crate::query::QueryService;
use crate::registry::DefinitionRegistry;
use crate::store::SnapshotStore;

/// Timing knobs for the collection loop.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Sleep between the end of one cycle and the start of the next.
    pub poll_interval: Duration,
    /// Minimum time between definition reloads.
    pub reload_interval: Duration,
    /// Upper bound on each backend query, including the startup probe.
    pub query_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reload_interval: Duration::from_secs(30),
            query_timeout: Duration::from_secs(10),
        }
    }
}

/// Periodically collects every registered metric into the snapshot store.
pub struct Collector<Q> {
    registry: Arc<DefinitionRegistry>,
    store: SnapshotStore,
    backend: Q,
    config: CollectorConfig,
}

impl<Q: QueryService> Collector<Q> {
    pub fn new(
        registry: Arc<DefinitionRegistry>,
        store: SnapshotStore,
        backend: Q,
        config: CollectorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            backend,
            config,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// Check the backend answers a trivial query within the query timeout.
    pub async fn probe(&self) -> Result<(), CollectorError> {
        let timeout = self.config.query_timeout;
        match tokio::time::timeout(timeout, self.backend.probe()).await {
            Ok(Ok(())) => {
                info!("monitoring backend reachable");
                Ok(())
            }
            Ok(Err(e)) => Err(CollectorError::Connectivity(e)),
            Err(_) => Err(CollectorError::Connectivity(QueryError::Timeout(timeout))),
        }
    }

    async fn collect_metric(
        &self,
        definition: &MetricDefinition,
    ) -> Result<ClusterAggregate, QueryError> {
        let timeout = self.config.query_timeout;
        let series = tokio::time::timeout(timeout, self.backend.query(&definition.query))
            .await
            .map_err(|_| QueryError::Timeout(timeout))??;

        let samples: Vec<Sample> = series
            .iter()
            .map(|s| s.to_sample(definition.device_label.as_deref()))
            .collect();
        Ok(aggregate(definition, &samples))
    }

    /// Build a snapshot from `definitions`. Failed metrics are left out.
    pub async fn collect(&self, definitions: &[MetricDefinition]) -> Snapshot {
        let mut metrics = BTreeMap::new();

        for definition in definitions {
            match self.collect_metric(definition).await {
                Ok(cluster) => {
                    metrics.insert(definition.name.clone(), cluster);
                }
                Err(e) => {
                    warn!(metric = %definition.name, error = %e, "metric query failed, skipped this cycle");
                }
            }
        }

        Snapshot::new(metrics, epoch_secs())
    }

    /// One iteration: reload definitions if due, collect, publish.
    pub async fn run_cycle(&self) {
        if self.registry.reload_due(self.config.reload_interval).await {
            if let Err(e) = self.registry.reload().await {
                error!(path = ?self.registry.path(), error = %e, "failed to reload metric definitions");
            }
        }

        let definitions = self.registry.current().await;
        let snapshot = self.collect(&definitions).await;
        debug!(
            defined = definitions.len(),
            collected = snapshot.metrics.len(),
            "collection cycle finished"
        );
        self.store.publish(snapshot).await;
    }

    /// Run collection cycles until `shutdown` fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.config.poll_interval,
            reload_interval = ?self.config.reload_interval,
            "collector started"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {
                    info!("collector shutting down");
                    break;
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::query::Series;

    enum Reply {
        Ok(Vec<Series>),
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct FakeBackend {
        replies: HashMap<String, Reply>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn reply(mut self, expression: &str, reply: Reply) -> Self {
            self.replies.insert(expression.to_string(), reply);
            self
        }
    }

    #[async_trait]
    impl QueryService for FakeBackend {
        async fn query(&self, expression: &str) -> Result<Vec<Series>, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(expression) {
                Some(Reply::Ok(series)) => Ok(series.clone()),
                Some(Reply::Fail) => Err(QueryError::Backend {
                    error_type: "execution".to_string(),
                    message: "boom".to_string(),
                }),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(vec![])
                }
                None => Ok(vec![]),
            }
        }
    }

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            poll_interval: Duration::from_millis(10),
            reload_interval: Duration::from_secs(30),
            query_timeout: Duration::from_millis(100),
        }
    }

    fn definition(name: &str, query: &str, device_label: Option<&str>, scale: f64) -> MetricDefinition {
        MetricDefinition {
            name: name.to_string(),
            device_label: device_label.map(str::to_string),
            device_prefix: None,
            query: query.to_string(),
            scale,
        }
    }

    fn cpu_series() -> Vec<Series> {
        vec![
            Series::new([("instance", "h1"), ("cpu", "0")], 0.9),
            Series::new([("instance", "h1"), ("cpu", "1")], 0.7),
        ]
    }

    fn collector(backend: FakeBackend) -> Collector<FakeBackend> {
        Collector::new(
            Arc::new(DefinitionRegistry::new("/nonexistent/metrics.toml")),
            SnapshotStore::new(),
            backend,
            fast_config(),
        )
    }

    #[tokio::test]
    async fn collect_aggregates_each_definition() {
        let backend = FakeBackend::default()
            .reply("cpu_idle", Reply::Ok(cpu_series()))
            .reply("mem", Reply::Ok(vec![Series::new([("instance", "h2")], 1024.0)]));
        let c = collector(backend);

        let snapshot = c
            .collect(&[
                definition("cpu-idle", "cpu_idle", Some("cpu"), 100.0),
                definition("mem-avail", "mem", None, 1.0),
            ])
            .await;

        let cpu = snapshot.instance("cpu-idle", "h1").unwrap();
        assert_eq!(cpu.devices["cpu: 0"], 90);
        assert_eq!(cpu.total, 160);
        assert_eq!(cpu.average, 80);
        assert_eq!(snapshot.instance("mem-avail", "h2").unwrap().total, 1024);
        assert!(snapshot.collected_at > 0);
    }

    #[tokio::test]
    async fn failed_query_drops_only_that_metric() {
        let backend = FakeBackend::default()
            .reply("cpu_idle", Reply::Ok(cpu_series()))
            .reply("broken", Reply::Fail)
            .reply("slow", Reply::Hang);
        let c = collector(backend);

        let snapshot = c
            .collect(&[
                definition("broken", "broken", None, 1.0),
                definition("cpu-idle", "cpu_idle", Some("cpu"), 100.0),
                definition("slow", "slow", None, 1.0),
            ])
            .await;

        assert!(snapshot.get("broken").is_none());
        assert!(snapshot.get("slow").is_none());
        assert_eq!(snapshot.instance("cpu-idle", "h1").unwrap().average, 80);
        assert_eq!(c.backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_reports_connectivity() {
        let ok = collector(FakeBackend::default());
        assert!(ok.probe().await.is_ok());

        let failing = collector(FakeBackend::default().reply("up", Reply::Fail));
        assert!(matches!(
            failing.probe().await,
            Err(CollectorError::Connectivity(QueryError::Backend { .. }))
        ));

        let hanging = collector(FakeBackend::default().reply("up", Reply::Hang));
        assert!(matches!(
            hanging.probe().await,
            Err(CollectorError::Connectivity(QueryError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn run_cycle_loads_definitions_and_publishes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "[[metric]]\nname = \"cpu-idle\"\ndevice_label = \"cpu\"\nquery = \"cpu_idle\"\nscale = 100.0\n",
        )
        .unwrap();

        let c = Collector::new(
            Arc::new(DefinitionRegistry::new(file.path())),
            SnapshotStore::new(),
            FakeBackend::default().reply("cpu_idle", Reply::Ok(cpu_series())),
            fast_config(),
        );

        c.run_cycle().await;
        let snapshot = c.store().current().await;
        assert_eq!(snapshot.instance("cpu-idle", "h1").unwrap().total, 160);

        // A broken file is not re-read before the reload interval elapses,
        // and once it is, the previous definitions keep being collected.
        std::fs::write(file.path(), "not = [valid").unwrap();
        c.run_cycle().await;
        assert!(c.registry().reload().await.is_err());
        c.run_cycle().await;
        assert!(c.store().current().await.get("cpu-idle").is_some());
    }

    #[tokio::test]
    async fn run_publishes_until_shutdown() {
        let c = Arc::new(collector(
            FakeBackend::default().reply("cpu_idle", Reply::Ok(cpu_series())),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let c = Arc::clone(&c);
            tokio::spawn(async move { c.run(rx).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while c.store().current().await.collected_at == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
