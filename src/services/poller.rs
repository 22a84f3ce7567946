use crate::models::snapshot::StatusSnapshot;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed status document: {0}")]
    Malformed(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<StatusSnapshot, FetchError>;
}

/// Fetches a JSON status document over HTTP and flattens it.
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<StatusSnapshot, FetchError> {
        let body: serde_json::Value = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !body.is_object() {
            return Err(FetchError::Malformed(format!("expected an object from {}", self.url)));
        }

        let snapshot = StatusSnapshot::from_json(&body);
        if snapshot.is_empty() {
            return Err(FetchError::Malformed(format!("empty status document from {}", self.url)));
        }
        Ok(snapshot)
    }
}

struct PollerShared {
    stopped: AtomicBool,
    /// Held while a result is applied; `stop()` takes it too, so once
    /// `stop()` returns no update is in progress or pending.
    apply: Mutex<()>,
    latest: RwLock<StatusSnapshot>,
    cycles: AtomicU64,
}

/// Periodic fetch-merge-render loop.
///
/// Cycles are serialized: a tick that comes due while a fetch is still
/// pending is skipped, so at most one fetch is in flight and updates are
/// applied in the order they were issued.
pub struct Poller {
    name: String,
    interval: Duration,
}

impl Poller {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }

    /// Runs one cycle immediately, then one per interval. Must be called
    /// from within a Tokio runtime.
    pub fn start<F>(self, source: Arc<dyn SnapshotSource>, mut on_update: F) -> PollerHandle
    where
        F: FnMut(&StatusSnapshot) + Send + 'static,
    {
        let shared = Arc::new(PollerShared {
            stopped: AtomicBool::new(false),
            apply: Mutex::new(()),
            latest: RwLock::new(StatusSnapshot::new()),
            cycles: AtomicU64::new(0),
        });

        let state = Arc::clone(&shared);
        let name = self.name.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if state.stopped.load(Ordering::Acquire) {
                    break;
                }

                match source.fetch().await {
                    Ok(fresh) => {
                        let _applying = state.apply.lock();
                        // stop() may have landed while the fetch was pending
                        if state.stopped.load(Ordering::Acquire) {
                            break;
                        }
                        let merged = {
                            let mut latest = state.latest.write();
                            latest.merge(fresh);
                            latest.clone()
                        };
                        let cycle = state.cycles.fetch_add(1, Ordering::AcqRel) + 1;
                        debug!(poller = %name, cycle, keys = merged.len(), "Snapshot updated");
                        on_update(&merged);
                    }
                    Err(e) => {
                        warn!(poller = %name, "Snapshot fetch failed: {}", e);
                    }
                }
            }
        });

        info!(poller = %self.name, interval_ms = self.interval.as_millis() as u64, "Poller started");

        PollerHandle {
            name: self.name,
            shared,
            task,
        }
    }
}

/// Cancellation handle for a running [`Poller`]. Dropping it stops the poller.
pub struct PollerHandle {
    name: String,
    shared: Arc<PollerShared>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last merged snapshot.
    pub fn latest(&self) -> StatusSnapshot {
        self.shared.latest.read().clone()
    }

    /// Number of successful fetch cycles so far.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Blocks until an update that is already being applied has finished.
    /// No `on_update` call starts after this returns.
    pub fn stop(&self) {
        let _applying = self.shared.apply.lock();
        if !self.shared.stopped.swap(true, Ordering::AcqRel) {
            self.task.abort();
            info!(poller = %self.name, "Poller stopped");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn snapshot(pairs: &[(&str, i64)]) -> StatusSnapshot {
        let mut snap = StatusSnapshot::new();
        for (key, value) in pairs {
            snap.insert(*key, *value);
        }
        snap
    }

    fn recorder() -> (Arc<Mutex<Vec<StatusSnapshot>>>, impl FnMut(&StatusSnapshot) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |snap: &StatusSnapshot| sink.lock().push(snap.clone()))
    }

    struct SlowSource {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for SlowSource {
        async fn fetch(&self) -> Result<StatusSnapshot, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as i64;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(snapshot(&[("call", call)]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_every_interval() {
        let mut source = MockSnapshotSource::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&counter);
        source.expect_fetch().returning(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as i64;
            Ok(snapshot(&[("tick", n)]))
        });

        let (seen, on_update) = recorder();
        let handle = Poller::new("dashboard", Duration::from_millis(3000)).start(Arc::new(source), on_update);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seen.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(6000)).await;
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(handle.cycles(), 3);
        assert_eq!(handle.latest().get_u64("tick"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn merge_keeps_keys_missing_from_fresh_snapshot() {
        let mut source = MockSnapshotSource::new();
        let counter = AtomicUsize::new(0);
        source.expect_fetch().returning(move || {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(snapshot(&[("connection", 91), ("alerts", 2)])),
                _ => Ok(snapshot(&[("alerts", 4)])),
            }
        });

        let (seen, on_update) = recorder();
        let handle = Poller::new("header", Duration::from_millis(5000)).start(Arc::new(source), on_update);

        tokio::time::sleep(Duration::from_millis(5010)).await;

        let updates = seen.lock();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].get_u64("connection"), Some(91));
        assert_eq!(updates[1].get_u64("alerts"), Some(4));
        assert_eq!(handle.latest(), updates[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_keeps_previous_snapshot_and_keeps_ticking() {
        let mut source = MockSnapshotSource::new();
        let counter = AtomicUsize::new(0);
        source.expect_fetch().returning(move || {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(snapshot(&[("speed", 40)])),
                1 => Err(FetchError::Malformed("truncated body".to_string())),
                _ => Ok(snapshot(&[("altitude", 320)])),
            }
        });

        let (seen, on_update) = recorder();
        let handle = Poller::new("flight", Duration::from_millis(2000)).start(Arc::new(source), on_update);

        tokio::time::sleep(Duration::from_millis(2010)).await;
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(handle.latest().get_u64("speed"), Some(40));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        let updates = seen.lock();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].get_u64("speed"), Some(40));
        assert_eq!(updates[1].get_u64("altitude"), Some(320));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drops_in_flight_result() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(1000)));
        let (seen, on_update) = recorder();
        let handle = Poller::new("dashboard", Duration::from_millis(3000))
            .start(Arc::clone(&source) as Arc<dyn SnapshotSource>, on_update);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        handle.stop();
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        assert!(seen.lock().is_empty());
        assert!(handle.is_stopped());
        assert_eq!(handle.cycles(), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_updates_after_stop() {
        let mut source = MockSnapshotSource::new();
        source.expect_fetch().returning(|| Ok(snapshot(&[("x", 1)])));

        let (seen, on_update) = recorder();
        let handle = Poller::new("header", Duration::from_millis(1000)).start(Arc::new(source), on_update);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.stop();
        let before = seen.lock().len();
        tokio::time::sleep(Duration::from_millis(5000)).await;

        assert_eq!(before, 2);
        assert_eq!(seen.lock().len(), 2);
    }

    struct SignallingSource {
        fetched: Arc<Notify>,
    }

    #[async_trait]
    impl SnapshotSource for SignallingSource {
        async fn fetch(&self) -> Result<StatusSnapshot, FetchError> {
            self.fetched.notify_one();
            Ok(snapshot(&[("connection", 92)]))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_waits_for_an_update_being_applied() {
        let fetched = Arc::new(Notify::new());
        let stop_returned = Arc::new(AtomicBool::new(false));
        let late = Arc::new(AtomicUsize::new(0));

        let returned = Arc::clone(&stop_returned);
        let late_calls = Arc::clone(&late);
        let handle = Poller::new("dashboard", Duration::from_secs(60)).start(
            Arc::new(SignallingSource { fetched: Arc::clone(&fetched) }),
            move |_snap: &StatusSnapshot| {
                std::thread::sleep(Duration::from_millis(50));
                if returned.load(Ordering::SeqCst) {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        fetched.notified().await;
        handle.stop();
        stop_returned.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(handle.is_stopped());
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert!(handle.cycles() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_never_overlap() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(5000)));
        let (seen, on_update) = recorder();
        let handle = Poller::new("dashboard", Duration::from_millis(3000))
            .start(Arc::clone(&source) as Arc<dyn SnapshotSource>, on_update);

        tokio::time::sleep(Duration::from_millis(20_000)).await;
        handle.stop();

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(source.calls.load(Ordering::SeqCst) >= 3);

        let calls: Vec<u64> = seen
            .lock()
            .iter()
            .filter_map(|s| s.get_u64("call"))
            .collect();
        let mut sorted = calls.clone();
        sorted.sort_unstable();
        assert_eq!(calls, sorted);
    }
}
