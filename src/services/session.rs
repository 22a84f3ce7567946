use crate::models::config::AppConfig;
use crate::models::dashboard::{CoDriveLog, ControllerStatus, CyberThreat};
use crate::models::detection::{DetectionState, FrameStats, LogEvent, OverlayBox};
use crate::models::snapshot::{StatusSnapshot, INDEX_SEGMENT};
use crate::services::detection::{DetectionPolicy, DetectionStateMachine, SurveillanceView};
use crate::services::poller::{Poller, PollerHandle, SnapshotSource};
use crate::services::surveillance::{DetectionSource, SurveillanceLoop};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerCard {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ControllerStatus,
    pub accuracy: String,
    pub response_time: String,
    pub last_update: String,
}

/// Controller grid state. Metrics come from the feed; `status` is owned by
/// the operator once the card exists.
#[derive(Debug, Clone, Default)]
pub struct ControllerBoard {
    cards: Vec<ControllerCard>,
}

impl ControllerBoard {
    pub fn cards(&self) -> &[ControllerCard] {
        &self.cards
    }

    /// Seeds the grid from the first snapshot that lists controllers, then
    /// only refreshes accuracy, response time and last update.
    pub fn apply(&mut self, snapshot: &StatusSnapshot) {
        if self.cards.is_empty() {
            self.cards = seed_cards(snapshot);
            return;
        }

        for card in &mut self.cards {
            let prefix = format!("controllers.{}", card.name);
            let field = |name: &str| snapshot.get_str(&format!("{}.{}", prefix, name)).map(str::to_string);
            if let Some(accuracy) = field("accuracy") {
                card.accuracy = accuracy;
            }
            if let Some(response_time) = field("response_time") {
                card.response_time = response_time;
            }
            if let Some(last_update) = field("last_update") {
                card.last_update = last_update;
            }
        }
    }

    pub fn toggle(&mut self, name: &str) -> Option<ControllerStatus> {
        let card = self.cards.iter_mut().find(|c| c.name == name)?;
        card.status = card.status.toggled();
        Some(card.status)
    }

    pub fn active_count(&self) -> usize {
        self.cards
            .iter()
            .filter(|c| c.status == ControllerStatus::Active)
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} controllers active • System optimal",
            self.active_count(),
            self.cards.len()
        )
    }
}

/// Cards in roster order.
fn seed_cards(snapshot: &StatusSnapshot) -> Vec<ControllerCard> {
    let mut names: Vec<(u64, &str)> = snapshot
        .section("controllers")
        .filter_map(|(key, value)| match key.rsplit_once('.') {
            Some((name, INDEX_SEGMENT)) => value.as_u64().map(|idx| (idx, name)),
            _ => None,
        })
        .collect();
    names.sort_unstable();

    names
        .into_iter()
        .map(|(_, name)| name)
        .map(|name| {
            let field = |f: &str| {
                snapshot
                    .get_str(&format!("controllers.{}.{}", name, f))
                    .unwrap_or_default()
                    .to_string()
            };
            ControllerCard {
                name: name.to_string(),
                kind: field("type"),
                status: ControllerStatus::parse(&field("status")).unwrap_or(ControllerStatus::Standby),
                accuracy: field("accuracy"),
                response_time: field("response_time"),
                last_update: field("last_update"),
            }
        })
        .collect()
}

/// Co-drive log and cyber-threat panels. Both are replaced wholesale on
/// every dashboard refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardPanels {
    pub co_drive_logs: Vec<CoDriveLog>,
    pub cyber_threats: Vec<CyberThreat>,
}

impl DashboardPanels {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        let logs = snapshot.array_len("co_drive_logs").unwrap_or(0);
        let threats = snapshot.array_len("cyber_threats").unwrap_or(0);

        Self {
            co_drive_logs: (0..logs)
                .filter_map(|i| {
                    let field = |f: &str| snapshot.get_str(&format!("co_drive_logs.{}.{}", i, f)).map(str::to_string);
                    Some(CoDriveLog {
                        time: field("time")?,
                        kind: field("type")?,
                        source: field("source")?,
                        message: field("message")?,
                        status: field("status")?,
                    })
                })
                .collect(),
            cyber_threats: (0..threats)
                .filter_map(|i| {
                    let prefix = format!("cyber_threats.{}", i);
                    let field = |f: &str| snapshot.get_str(&format!("{}.{}", prefix, f)).map(str::to_string);
                    Some(CyberThreat {
                        kind: field("type")?,
                        details: field("details")?,
                        status: field("status")?,
                        confidence: snapshot
                            .get_u64(&format!("{}.confidence", prefix))
                            .and_then(|c| u8::try_from(c).ok())?,
                    })
                })
                .collect(),
        }
    }

    /// Drives the "N ACTIVE" indicator.
    pub fn threat_count(&self) -> usize {
        self.cyber_threats.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderStatus {
    pub connection: String,
    pub system_time: String,
    pub gps_status: String,
    pub emergency_alerts: u64,
}

impl HeaderStatus {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Option<Self> {
        Some(Self {
            connection: format!("{}%", snapshot.get_u64("system_status.connection")?),
            system_time: snapshot.get_str("system_status.system_time")?.to_string(),
            gps_status: snapshot.get_str("system_status.gps_status")?.to_string(),
            emergency_alerts: snapshot.get_u64("system_status.emergency_alerts")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightReadout {
    pub speed: String,
    pub altitude: String,
}

impl FlightReadout {
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Option<Self> {
        Some(Self {
            speed: snapshot.get_str("speed")?.to_string(),
            altitude: format!("{}ft", snapshot.get_str("altitude")?),
        })
    }
}

/// Feeds a session polls and watches.
pub struct SessionSources {
    pub dashboard: Arc<dyn SnapshotSource>,
    pub header: Arc<dyn SnapshotSource>,
    pub flight: Arc<dyn SnapshotSource>,
    pub detections: Option<Arc<dyn DetectionSource>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveillanceReport {
    pub live: bool,
    pub state: DetectionState,
    pub headline: &'static str,
    pub action: String,
    pub action_index: usize,
    pub cycling: bool,
    pub stats: FrameStats,
    pub overlay: Vec<OverlayBox>,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    pub name: String,
    pub cycles: u64,
    pub keys: usize,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub controllers: Vec<ControllerCard>,
    pub summary: String,
    pub co_drive_logs: Vec<CoDriveLog>,
    pub cyber_threats: Vec<CyberThreat>,
    pub threat_count: usize,
    pub header: Option<HeaderStatus>,
    pub flight: Option<FlightReadout>,
    pub feeds: Vec<FeedReport>,
    pub surveillance: SurveillanceReport,
}

/// Everything one console page owns. Dropping the session stops every
/// poller and the live detection loop.
pub struct ConsoleSession {
    id: Uuid,
    opened_at: DateTime<Utc>,
    board: Arc<RwLock<ControllerBoard>>,
    panels: Arc<RwLock<DashboardPanels>>,
    header: Arc<RwLock<Option<HeaderStatus>>>,
    flight: Arc<RwLock<Option<FlightReadout>>>,
    machine: Arc<Mutex<DetectionStateMachine>>,
    pollers: Vec<PollerHandle>,
    surveillance: Option<SurveillanceLoop>,
    closed: bool,
}

impl ConsoleSession {
    /// Must be called from within a Tokio runtime.
    pub fn open(config: &AppConfig, sources: SessionSources, view: Arc<dyn SurveillanceView>) -> Self {
        let id = Uuid::new_v4();
        let board = Arc::new(RwLock::new(ControllerBoard::default()));
        let panels = Arc::new(RwLock::new(DashboardPanels::default()));
        let header = Arc::new(RwLock::new(None));
        let flight = Arc::new(RwLock::new(None));

        let mut pollers = Vec::with_capacity(3);

        let sink = Arc::clone(&board);
        let panel_sink = Arc::clone(&panels);
        pollers.push(
            Poller::new("dashboard", config.polling.dashboard_interval()).start(sources.dashboard, move |snap| {
                sink.write().apply(snap);
                *panel_sink.write() = DashboardPanels::from_snapshot(snap);
            }),
        );

        let sink = Arc::clone(&header);
        pollers.push(
            Poller::new("header", config.polling.header_interval()).start(sources.header, move |snap| {
                if let Some(status) = HeaderStatus::from_snapshot(snap) {
                    *sink.write() = Some(status);
                }
            }),
        );

        let sink = Arc::clone(&flight);
        pollers.push(
            Poller::new("flight", config.polling.flight_interval()).start(sources.flight, move |snap| {
                if let Some(readout) = FlightReadout::from_snapshot(snap) {
                    *sink.write() = Some(readout);
                }
            }),
        );

        let machine = Arc::new(Mutex::new(DetectionStateMachine::new(
            DetectionPolicy::from(&config.surveillance),
            view,
        )));

        let surveillance = match sources.detections {
            Some(source) if config.surveillance.enabled => Some(SurveillanceLoop::spawn(
                source,
                Arc::clone(&machine),
                Duration::from_millis(config.surveillance.frame_interval_ms),
            )),
            _ => None,
        };

        info!(session = %id, live_detection = surveillance.is_some(), "Console session opened");

        Self {
            id,
            opened_at: Utc::now(),
            board,
            panels,
            header,
            flight,
            machine,
            pollers,
            surveillance,
            closed: false,
        }
    }

    pub fn toggle_controller(&self, name: &str) -> Option<ControllerStatus> {
        let status = self.board.write().toggle(name)?;
        info!(session = %self.id, controller = name, ?status, "Controller toggled");
        Some(status)
    }

    pub fn header(&self) -> Option<HeaderStatus> {
        self.header.read().clone()
    }

    pub fn flight(&self) -> Option<FlightReadout> {
        self.flight.read().clone()
    }

    pub fn report(&self) -> SessionReport {
        let board = self.board.read();
        let panels = self.panels.read().clone();
        let machine = self.machine.lock();

        SessionReport {
            id: self.id,
            opened_at: self.opened_at,
            controllers: board.cards().to_vec(),
            summary: board.summary(),
            threat_count: panels.threat_count(),
            co_drive_logs: panels.co_drive_logs,
            cyber_threats: panels.cyber_threats,
            header: self.header(),
            flight: self.flight(),
            feeds: self
                .pollers
                .iter()
                .map(|p| FeedReport {
                    name: p.name().to_string(),
                    cycles: p.cycles(),
                    keys: p.latest().len(),
                    stopped: p.is_stopped(),
                })
                .collect(),
            surveillance: SurveillanceReport {
                live: self.surveillance.is_some(),
                state: machine.state(),
                headline: machine.state().headline(),
                action: machine.current_action(),
                action_index: machine.action_index(),
                cycling: machine.is_cycling(),
                stats: machine.last_stats(),
                overlay: self
                    .surveillance
                    .as_ref()
                    .map(SurveillanceLoop::overlay)
                    .unwrap_or_default(),
                log: machine.log().map(LogEvent::to_string).collect(),
            },
        }
    }

    /// Stops all refresh loops and the detection loop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for poller in &self.pollers {
            poller.stop();
        }
        if let Some(live) = self.surveillance.take() {
            live.stop();
        }
        self.machine.lock().halt();
        info!(session = %self.id, "Console session closed");
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.close();
    }
}
