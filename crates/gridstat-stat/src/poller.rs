//! Stat poll loop: fetch, keep the last good snapshot, render.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gridstat_core::Snapshot;
use gridstat_rpc::{MetricsClient, RpcError};

use crate::formats::FormatSet;
use crate::render::{PollOutcome, Renderer};

/// Anything that can hand the poller a snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, RpcError>;
}

#[async_trait]
impl SnapshotSource for MetricsClient {
    async fn fetch(&self) -> Result<Snapshot, RpcError> {
        MetricsClient::fetch(self).await
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// How often formats.toml is re-read.
    pub reload_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reload_interval: Duration::from_secs(30),
        }
    }
}

pub struct StatPoller<S, R> {
    source: S,
    renderer: R,
    formats_path: PathBuf,
    formats: FormatSet,
    formats_checked_at: Instant,
    last: Option<Snapshot>,
    config: PollerConfig,
}

impl<S: SnapshotSource, R: Renderer> StatPoller<S, R> {
    /// `formats` is the set already loaded from `formats_path` at startup.
    pub fn new(
        source: S,
        renderer: R,
        formats_path: impl Into<PathBuf>,
        formats: FormatSet,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            renderer,
            formats_path: formats_path.into(),
            formats,
            formats_checked_at: Instant::now(),
            last: None,
            config,
        }
    }

    pub fn formats(&self) -> &FormatSet {
        &self.formats
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Re-read formats.toml if the reload interval has passed. A bad file
    /// keeps the current formats.
    pub fn reload_formats_if_due(&mut self) {
        if self.formats_checked_at.elapsed() < self.config.reload_interval {
            return;
        }
        self.formats_checked_at = Instant::now();

        match FormatSet::load(&self.formats_path) {
            Ok(formats) => {
                if formats != self.formats {
                    info!(path = %self.formats_path.display(), count = formats.len(), "formats reloaded");
                }
                self.formats = formats;
            }
            Err(e) => {
                warn!(error = %e, "format reload failed, keeping previous formats");
            }
        }
    }

    /// One poll. Returns whether the fetch succeeded.
    pub async fn poll_once(&mut self) -> io::Result<bool> {
        self.reload_formats_if_due();

        match self.source.fetch().await {
            Ok(snapshot) => {
                debug!(collected_at = snapshot.collected_at, "snapshot received");
                self.renderer
                    .render(&self.formats, PollOutcome::Fresh(&snapshot))?;
                self.last = Some(snapshot);
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "poll failed");
                let error = e.to_string();
                self.renderer.render(
                    &self.formats,
                    PollOutcome::Stale {
                        last: self.last.as_ref(),
                        error: &error,
                    },
                )?;
                Ok(false)
            }
        }
    }

    /// Poll until `shutdown` flips. Only output errors end the loop early.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        info!(poll_interval = ?self.config.poll_interval, "stat poller started");

        loop {
            self.poll_once().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {
                    info!("stat poller shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use gridstat_core::{ClusterAggregate, InstanceAggregate};

    use super::*;
    use crate::formats::{MetricFormat, ValueKind};

    /// Replays scripted results; an exhausted script times out.
    struct ScriptedSource {
        replies: Mutex<VecDeque<Result<Snapshot, RpcError>>>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Result<Snapshot, RpcError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    fn timeout() -> RpcError {
        RpcError::Timeout {
            address: "127.0.0.1:7410".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self) -> Result<Snapshot, RpcError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(timeout()))
        }
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Fresh(u64),
        Stale { last: Option<u64>, formats: usize },
    }

    #[derive(Default)]
    struct RecordingRenderer {
        seen: Vec<Seen>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, formats: &FormatSet, outcome: PollOutcome<'_>) -> io::Result<()> {
            self.seen.push(match outcome {
                PollOutcome::Fresh(s) => Seen::Fresh(s.collected_at),
                PollOutcome::Stale { last, error } => {
                    assert!(!error.is_empty());
                    Seen::Stale {
                        last: last.map(|s| s.collected_at),
                        formats: formats.len(),
                    }
                }
            });
            Ok(())
        }
    }

    fn snapshot(collected_at: u64) -> Snapshot {
        let mut cluster = ClusterAggregate::default();
        cluster
            .instances
            .insert("h1".to_string(), InstanceAggregate::default());
        let mut metrics = BTreeMap::new();
        metrics.insert("cpu-idle".to_string(), cluster);
        Snapshot::new(metrics, collected_at)
    }

    fn one_format() -> FormatSet {
        FormatSet::new(vec![MetricFormat {
            name: "cpu-idle".to_string(),
            shorthand: "idl".to_string(),
            value_kind: ValueKind::Cpu,
        }])
        .unwrap()
    }

    fn poller(
        replies: Vec<Result<Snapshot, RpcError>>,
        path: &std::path::Path,
        reload_interval: Duration,
    ) -> StatPoller<ScriptedSource, RecordingRenderer> {
        StatPoller::new(
            ScriptedSource::new(replies),
            RecordingRenderer::default(),
            path,
            one_format(),
            PollerConfig {
                poll_interval: Duration::from_millis(10),
                reload_interval,
            },
        )
    }

    #[tokio::test]
    async fn failure_carries_last_good_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut p = poller(
            vec![Err(timeout()), Ok(snapshot(1)), Err(timeout()), Ok(snapshot(2))],
            file.path(),
            Duration::from_secs(3600),
        );

        assert!(!p.poll_once().await.unwrap());
        assert!(p.poll_once().await.unwrap());
        assert!(!p.poll_once().await.unwrap());
        assert!(p.poll_once().await.unwrap());

        assert_eq!(
            p.renderer().seen,
            vec![
                Seen::Stale { last: None, formats: 1 },
                Seen::Fresh(1),
                Seen::Stale { last: Some(1), formats: 1 },
                Seen::Fresh(2),
            ]
        );
        assert_eq!(p.last().unwrap().collected_at, 2);
    }

    #[tokio::test]
    async fn reload_replaces_formats() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "[[format]]\nname = \"cpu-idle\"\nshorthand = \"idl\"\nvalue_kind = \"cpu\"\n\
             [[format]]\nname = \"mem-avail\"\nshorthand = \"avail\"\nvalue_kind = \"size\"\n",
        )
        .unwrap();
        let mut p = poller(vec![], file.path(), Duration::ZERO);

        p.reload_formats_if_due();
        assert_eq!(p.formats().len(), 2);
        assert!(p.formats().get("mem-avail").is_some());
    }

    #[tokio::test]
    async fn bad_reload_keeps_previous_formats() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[[format]\nname = ").unwrap();
        let mut p = poller(vec![], file.path(), Duration::ZERO);

        p.reload_formats_if_due();
        assert_eq!(p.formats(), &one_format());

        assert!(!p.poll_once().await.unwrap());
        assert_eq!(p.renderer().seen, vec![Seen::Stale { last: None, formats: 1 }]);
    }

    #[tokio::test]
    async fn reload_waits_for_interval() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "").unwrap();
        let mut p = poller(vec![], file.path(), Duration::from_secs(3600));

        p.reload_formats_if_due();
        assert_eq!(p.formats().len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut p = poller(vec![Ok(snapshot(9))], file.path(), Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });
        tokio::time::timeout(Duration::from_secs(5), p.run(rx))
            .await
            .expect("poller did not stop")
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(p.renderer().seen.first(), Some(&Seen::Fresh(9)));
        assert!(p.renderer().seen.len() >= 2);
    }
}
