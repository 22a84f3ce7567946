use crate::models::dashboard::SurveillanceObject;
use crate::models::detection::{overlay, BoundingBox, Detection, OverlayBox};
use crate::services::backend::DashboardBackend;
use crate::services::detection::DetectionStateMachine;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub const FRAME_WIDTH: f32 = 640.0;
const FRAME_HEIGHT: f32 = 480.0;

#[derive(Debug, Error)]
pub enum DetectionSourceError {
    #[error("video frame not ready")]
    FrameNotReady,
}

/// Opaque detector: one call classifies the current video frame.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DetectionSource: Send + Sync {
    async fn detect(&self) -> Result<Vec<Detection>, DetectionSourceError>;
}

/// Stand-in detector fed from the backend's surveillance objects.
pub struct SimulatedDetectionSource {
    backend: Arc<DashboardBackend>,
    warmup: AtomicU32,
}

impl SimulatedDetectionSource {
    pub fn new(backend: Arc<DashboardBackend>) -> Self {
        Self {
            backend,
            warmup: AtomicU32::new(0),
        }
    }

    /// Reports the first `frames` frames as not ready, like a camera that
    /// is still negotiating its stream.
    pub fn with_warmup(self, frames: u32) -> Self {
        self.warmup.store(frames, Ordering::Release);
        self
    }

    fn to_detection(object: &SurveillanceObject) -> Detection {
        let mut rng = rand::thread_rng();
        let width = rng.gen_range(60.0..160.0);
        let height = rng.gen_range(80.0..240.0);
        let x = (object.x * FRAME_WIDTH - width / 2.0).clamp(0.0, FRAME_WIDTH - width);
        let y = (object.y * FRAME_HEIGHT - height / 2.0).clamp(0.0, FRAME_HEIGHT - height);
        let jitter: f32 = rng.gen_range(-0.3..0.1);

        Detection::new(
            object.kind.class_label(),
            (object.confidence / 100.0 + jitter).clamp(0.0, 1.0),
        )
        .with_bbox(BoundingBox::new(x, y, width, height))
    }
}

#[async_trait]
impl DetectionSource for SimulatedDetectionSource {
    async fn detect(&self) -> Result<Vec<Detection>, DetectionSourceError> {
        let pending = self
            .warmup
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(DetectionSourceError::FrameNotReady);
        }

        Ok(self
            .backend
            .surveillance_objects()
            .iter()
            .map(Self::to_detection)
            .collect())
    }
}

struct LoopShared {
    stopped: AtomicBool,
    frames: AtomicU64,
    skipped: AtomicU64,
    overlay: RwLock<Vec<OverlayBox>>,
}

/// Drives a [`DetectionStateMachine`] at a fixed frame cadence. Frames are
/// strictly sequential: the next detect call is issued only after the
/// previous result has been fed to the machine.
pub struct SurveillanceLoop {
    machine: Arc<Mutex<DetectionStateMachine>>,
    shared: Arc<LoopShared>,
    task: JoinHandle<()>,
}

impl SurveillanceLoop {
    pub fn spawn(
        source: Arc<dyn DetectionSource>,
        machine: Arc<Mutex<DetectionStateMachine>>,
        frame_interval: Duration,
    ) -> Self {
        let shared = Arc::new(LoopShared {
            stopped: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            overlay: RwLock::new(Vec::new()),
        });

        let state = Arc::clone(&shared);
        let target = Arc::clone(&machine);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if state.stopped.load(Ordering::Acquire) {
                    break;
                }

                match source.detect().await {
                    Ok(detections) => {
                        let mut machine = target.lock();
                        // stop() flips the flag under this lock
                        if state.stopped.load(Ordering::Acquire) {
                            break;
                        }
                        machine.on_frame(&detections);
                        *state.overlay.write() = overlay(&detections, FRAME_WIDTH, machine.watched_class());
                        state.frames.fetch_add(1, Ordering::AcqRel);
                    }
                    Err(e) => {
                        state.skipped.fetch_add(1, Ordering::AcqRel);
                        warn!("Skipping frame: {}", e);
                    }
                }
            }
        });

        info!(frame_interval_ms = frame_interval.as_millis() as u64, "Live detection started");

        Self {
            machine,
            shared,
            task,
        }
    }

    pub fn frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Acquire)
    }

    /// Overlay boxes for the most recent frame.
    pub fn overlay(&self) -> Vec<OverlayBox> {
        self.shared.overlay.read().clone()
    }

    /// Stops feeding frames and halts the action cycle. A frame that is
    /// being applied finishes first; none is applied afterwards.
    pub fn stop(&self) {
        let mut machine = self.machine.lock();
        if !self.shared.stopped.swap(true, Ordering::AcqRel) {
            self.task.abort();
            machine.halt();
            drop(machine);
            info!(frames = self.frames(), skipped = self.skipped(), "Live detection stopped");
        }
    }
}

impl Drop for SurveillanceLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::detection::{DetectionState, FrameStats};
    use crate::services::detection::{DetectionPolicy, SurveillanceView};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct Labels(Mutex<Vec<String>>);

    impl SurveillanceView for Labels {
        fn on_action(&self, label: &str) {
            self.0.lock().push(label.to_string());
        }
    }

    struct ScriptedSource {
        frames: Mutex<VecDeque<Result<Vec<Detection>, DetectionSourceError>>>,
    }

    #[async_trait]
    impl DetectionSource for ScriptedSource {
        async fn detect(&self) -> Result<Vec<Detection>, DetectionSourceError> {
            self.frames.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn shared_machine(view: Arc<Labels>) -> Arc<Mutex<DetectionStateMachine>> {
        Arc::new(Mutex::new(DetectionStateMachine::new(DetectionPolicy::default(), view)))
    }

    #[tokio::test(start_paused = true)]
    async fn failed_frames_are_skipped_without_touching_state() {
        let mut source = MockDetectionSource::new();
        source
            .expect_detect()
            .returning(|| Err(DetectionSourceError::FrameNotReady));

        let machine = shared_machine(Arc::new(Labels::default()));
        let live = SurveillanceLoop::spawn(Arc::new(source), Arc::clone(&machine), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(450)).await;

        assert_eq!(live.frames(), 0);
        assert_eq!(live.skipped(), 5);
        assert_eq!(machine.lock().state(), DetectionState::AllClear);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_feed_the_machine_in_order() {
        let source = ScriptedSource {
            frames: Mutex::new(VecDeque::from(vec![
                Ok(vec![Detection::new("car", 0.9)]),
                Ok(vec![Detection::new("person", 0.8)]),
                Err(DetectionSourceError::FrameNotReady),
                Ok(vec![Detection::new("person", 0.8), Detection::new("person", 0.9)]),
            ])),
        };

        let view = Arc::new(Labels::default());
        let machine = shared_machine(Arc::clone(&view));
        let live = SurveillanceLoop::spawn(Arc::new(source), Arc::clone(&machine), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(live.frames(), 3);
        assert_eq!(live.skipped(), 1);
        assert_eq!(machine.lock().last_stats(), FrameStats { total: 2, threats: 2 });
        let boxes = live.overlay();
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.threat));
        assert_eq!(machine.lock().state(), DetectionState::Threat);
        assert_eq!(machine.lock().log().count(), 1);

        // empty frames follow once the script runs out
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(machine.lock().state(), DetectionState::AllClear);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_halts_the_action_cycle() {
        let source = ScriptedSource {
            frames: Mutex::new(VecDeque::from(vec![Ok(vec![Detection::new("person", 0.95)])])),
        };
        let view = Arc::new(Labels::default());
        let machine = shared_machine(Arc::clone(&view));

        let live = SurveillanceLoop::spawn(Arc::new(source), Arc::clone(&machine), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(machine.lock().state(), DetectionState::Threat);

        live.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(view.0.lock().is_empty());
        assert!(!machine.lock().is_cycling());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn no_frame_is_applied_once_stop_returns() {
        for _ in 0..50 {
            let mut source = MockDetectionSource::new();
            let frame = AtomicU64::new(0);
            source.expect_detect().returning(move || {
                // alternate so every other frame re-enters Threat
                match frame.fetch_add(1, Ordering::SeqCst) % 2 {
                    0 => Ok(vec![Detection::new("person", 0.9)]),
                    _ => Ok(Vec::new()),
                }
            });

            let machine = shared_machine(Arc::new(Labels::default()));
            let live = SurveillanceLoop::spawn(Arc::new(source), Arc::clone(&machine), Duration::from_millis(1));
            tokio::time::sleep(Duration::from_millis(3)).await;

            live.stop();
            let frames = live.frames();
            assert!(!machine.lock().is_cycling());

            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(!machine.lock().is_cycling());
            assert_eq!(live.frames(), frames);
        }
    }

    #[tokio::test]
    async fn simulated_detector_warms_up_first() {
        let source = SimulatedDetectionSource::new(Arc::new(DashboardBackend::new())).with_warmup(2);

        assert!(matches!(source.detect().await, Err(DetectionSourceError::FrameNotReady)));
        assert!(matches!(source.detect().await, Err(DetectionSourceError::FrameNotReady)));
        assert!(source.detect().await.is_ok());
    }

    #[tokio::test]
    async fn simulated_detector_maps_object_kinds() {
        let source = SimulatedDetectionSource::new(Arc::new(DashboardBackend::new()));
        let detections = source.detect().await.unwrap();

        assert!(!detections.is_empty());
        for d in detections {
            assert!(d.class == "person" || d.class == "car");
            assert!((0.0..=1.0).contains(&d.score));
            assert!(d.bbox.x >= 0.0 && d.bbox.x + d.bbox.width <= FRAME_WIDTH + 1e-3);
        }
    }
}
