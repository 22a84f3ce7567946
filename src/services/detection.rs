use crate::models::config::SurveillanceConfig;
use crate::models::detection::{Detection, DetectionState, FrameStats, LogEvent};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

const LOG_CAPACITY: usize = 50;

/// Receives everything the auto-control panel renders.
pub trait SurveillanceView: Send + Sync {
    /// Current action label: a cycle label while in threat, the idle
    /// label after clearing.
    fn on_action(&self, label: &str);

    fn on_log(&self, _event: &LogEvent) {}
}

/// Forwards panel updates to the tracing subscriber.
pub struct TracingView;

impl SurveillanceView for TracingView {
    fn on_action(&self, label: &str) {
        debug!("Auto-control action: {}", label);
    }
}

#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    pub watched_class: String,
    pub threshold: f32,
    pub action_period: Duration,
    pub actions: Vec<String>,
    pub idle_label: String,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self::from(&SurveillanceConfig::default())
    }
}

impl From<&SurveillanceConfig> for DetectionPolicy {
    fn from(config: &SurveillanceConfig) -> Self {
        Self {
            watched_class: config.watched_class.clone(),
            threshold: config.threshold,
            action_period: Duration::from_millis(config.action_period_ms),
            actions: config.actions.clone(),
            idle_label: config.idle_label.clone(),
        }
    }
}

struct ActionCycle {
    active: bool,
    /// Bumped on every start and stop; a timer task only acts while the
    /// generation it was spawned with is current.
    generation: u64,
    index: usize,
    label: String,
}

/// Two-state machine over per-frame detections.
///
/// The action-cycle timer lives exactly as long as the machine stays in
/// `Threat`. Tick callbacks run under the cycle lock, so once an exit
/// transition returns no further action label is delivered.
pub struct DetectionStateMachine {
    policy: Arc<DetectionPolicy>,
    view: Arc<dyn SurveillanceView>,
    state: DetectionState,
    cycle: Arc<Mutex<ActionCycle>>,
    timer: Option<JoinHandle<()>>,
    log: VecDeque<LogEvent>,
    last_stats: FrameStats,
}

impl DetectionStateMachine {
    pub fn new(policy: DetectionPolicy, view: Arc<dyn SurveillanceView>) -> Self {
        let cycle = ActionCycle {
            active: false,
            generation: 0,
            index: 0,
            label: policy.idle_label.clone(),
        };

        Self {
            policy: Arc::new(policy),
            view,
            state: DetectionState::AllClear,
            cycle: Arc::new(Mutex::new(cycle)),
            timer: None,
            log: VecDeque::with_capacity(LOG_CAPACITY),
            last_stats: FrameStats::default(),
        }
    }

    pub fn watched_class(&self) -> &str {
        &self.policy.watched_class
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Recent log events, newest first.
    pub fn log(&self) -> impl Iterator<Item = &LogEvent> {
        self.log.iter()
    }

    pub fn current_action(&self) -> String {
        self.cycle.lock().label.clone()
    }

    pub fn action_index(&self) -> usize {
        self.cycle.lock().index
    }

    pub fn is_cycling(&self) -> bool {
        self.timer.is_some()
    }

    /// Feeds one frame. Must be called from within a Tokio runtime; entering
    /// `Threat` spawns the action-cycle timer.
    pub fn on_frame(&mut self, detections: &[Detection]) -> FrameStats {
        let threats = detections
            .iter()
            .filter(|d| d.is_threat(&self.policy.watched_class, self.policy.threshold))
            .count();
        let stats = FrameStats {
            total: detections.len(),
            threats,
        };

        match (self.state, threats > 0) {
            (DetectionState::AllClear, true) => self.enter_threat(),
            (DetectionState::Threat, false) => self.enter_all_clear(),
            _ => {}
        }

        self.last_stats = stats;
        stats
    }

    /// Stops the action cycle without a state transition. Used when the
    /// surveillance session ends.
    pub fn halt(&mut self) {
        self.stop_cycle();
    }

    fn enter_threat(&mut self) {
        self.stop_cycle();
        let generation = {
            let mut cycle = self.cycle.lock();
            cycle.active = true;
            cycle.generation += 1;
            cycle.index = 0;
            cycle.generation
        };

        if !self.policy.actions.is_empty() {
            self.timer = Some(self.spawn_cycle(generation));
        }

        self.state = DetectionState::Threat;
        info!(class = %self.policy.watched_class, "Threat detected");
        self.record(LogEvent::danger(format!(
            "threat detected: {}",
            self.policy.watched_class
        )));
    }

    fn enter_all_clear(&mut self) {
        self.stop_cycle();
        self.state = DetectionState::AllClear;
        info!("Threat cleared");
        self.record(LogEvent::info("threat cleared, resuming normal operations"));
        self.view.on_action(&self.policy.idle_label);
    }

    fn spawn_cycle(&self, generation: u64) -> JoinHandle<()> {
        let cycle = Arc::clone(&self.cycle);
        let policy = Arc::clone(&self.policy);
        let view = Arc::clone(&self.view);
        let period = policy.action_period;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let mut state = cycle.lock();
                if !state.active || state.generation != generation {
                    break;
                }
                let label = policy.actions[state.index % policy.actions.len()].clone();
                state.index = (state.index + 1) % policy.actions.len();
                state.label = label;
                view.on_action(&state.label);
            }
        })
    }

    fn stop_cycle(&mut self) {
        {
            let mut cycle = self.cycle.lock();
            cycle.active = false;
            cycle.generation += 1;
            cycle.index = 0;
            cycle.label = self.policy.idle_label.clone();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn record(&mut self, event: LogEvent) {
        self.view.on_log(&event);
        self.log.push_front(event);
        self.log.truncate(LOG_CAPACITY);
    }
}

impl Drop for DetectionStateMachine {
    fn drop(&mut self) {
        self.halt();
    }
}
