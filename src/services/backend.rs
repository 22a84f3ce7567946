use crate::models::dashboard::{
    CoDriveLog, Controller, ControllerStatus, CyberThreat, DashboardData, FlightParameters,
    ObjectKind, SurveillanceObject, SystemStatus,
};
use crate::models::snapshot::StatusSnapshot;
use crate::services::poller::{FetchError, SnapshotSource};
use async_trait::async_trait;
use chrono::Local;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

const CONTROLLERS: [(&str, &str); 5] = [
    ("Neural Pilot Alpha", "Primary Navigation"),
    ("Precision Navigator", "GPS Coordination"),
    ("Threat Detection AI", "Security Monitor"),
    ("Weather Adaptive", "Environmental"),
    ("Emergency Override", "Manual Backup"),
];

/// The first this many roster entries come up active.
const ACTIVE_ON_BOOT: usize = 2;

/// Simulated telemetry backend serving the console's data feeds.
pub struct DashboardBackend;

impl DashboardBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn system_status(&self) -> SystemStatus {
        let mut rng = rand::thread_rng();
        SystemStatus {
            connection: rng.gen_range(85..=98),
            system_time: clock(),
            gps_status: "STRONG".to_string(),
            emergency_alerts: rng.gen_range(1..=5),
        }
    }

    pub fn controllers(&self) -> Vec<Controller> {
        let mut rng = rand::thread_rng();
        let now = clock();

        CONTROLLERS
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| Controller {
                name: name.to_string(),
                kind: kind.to_string(),
                status: if i < ACTIVE_ON_BOOT {
                    ControllerStatus::Active
                } else {
                    ControllerStatus::Standby
                },
                accuracy: format!("{:.2}%", rng.gen_range(84.0..99.9)),
                response_time: format!("{:.2}ms", rng.gen_range(2.0..25.0)),
                last_update: now.clone(),
            })
            .collect()
    }

    pub fn co_drive_logs(&self) -> Vec<CoDriveLog> {
        let logs = [
            ("18:11:41", "Real-time system update", "Precision Navigator", "Automated system check completed.", "COMPLETED"),
            ("09:21:45", "Controller handover initiated", "Neural Pilot Alpha", "Switching to AI Autopilot.", "COMPLETED"),
            ("09:19:15", "Cyber Threat Detected", "Cyber Threat Monitor", "GPS Spoofing attack mitigated.", "ACTIVE"),
        ];

        let mut rng = rand::thread_rng();
        let count = rng.gen_range(2..=3);
        logs.choose_multiple(&mut rng, count)
            .map(|(time, kind, source, message, status)| CoDriveLog {
                time: time.to_string(),
                kind: kind.to_string(),
                source: source.to_string(),
                message: message.to_string(),
                status: status.to_string(),
            })
            .collect()
    }

    pub fn cyber_threats(&self) -> Vec<CyberThreat> {
        let mut rng = rand::thread_rng();
        let threats = vec![
            CyberThreat {
                kind: "GPS Spoofing Detected".to_string(),
                details: "Suspicious GPS signals detected...".to_string(),
                status: "ACTIVE".to_string(),
                confidence: 87,
            },
            CyberThreat {
                kind: "Communication Jamming".to_string(),
                details: "Intermittent signal interference detected...".to_string(),
                status: "MONITORING".to_string(),
                confidence: 64,
            },
            CyberThreat {
                kind: "Network Scan Attempt".to_string(),
                details: format!(
                    "Unauthorized scan from 192.168.1.{} blocked.",
                    rng.gen_range(10..=200)
                ),
                status: "BLOCKED".to_string(),
                confidence: 92,
            },
        ];

        let count = rng.gen_range(1..=2);
        threats.choose_multiple(&mut rng, count).cloned().collect()
    }

    pub fn dashboard_data(&self) -> DashboardData {
        DashboardData {
            controllers: self.controllers(),
            co_drive_logs: self.co_drive_logs(),
            cyber_threats: self.cyber_threats(),
            system_status: self.system_status(),
        }
    }

    pub fn flight_parameters(&self) -> FlightParameters {
        let mut rng = rand::thread_rng();
        FlightParameters {
            speed: format!("{:.1}", rng.gen_range(0.0..60.0)),
            altitude: format!("{:.1}", rng.gen_range(150.0..500.0)),
        }
    }

    pub fn surveillance_objects(&self) -> Vec<SurveillanceObject> {
        let objects = [
            SurveillanceObject {
                kind: ObjectKind::Vehicle,
                confidence: 89.8,
                x: 0.3,
                y: 0.4,
            },
            SurveillanceObject {
                kind: ObjectKind::Personnel,
                confidence: 89.7,
                x: 0.7,
                y: 0.6,
            },
        ];

        let mut rng = rand::thread_rng();
        let count = rng.gen_range(1..=2);
        objects.choose_multiple(&mut rng, count).cloned().collect()
    }
}

impl Default for DashboardBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn clock() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Full dashboard payload, header status included.
    Dashboard,
    Header,
    Flight,
}

/// Serves one backend feed to a [`Poller`](crate::services::poller::Poller)
/// without going through HTTP.
pub struct BackendSnapshotSource {
    backend: Arc<DashboardBackend>,
    feed: Feed,
}

impl BackendSnapshotSource {
    pub fn new(backend: Arc<DashboardBackend>, feed: Feed) -> Self {
        Self { backend, feed }
    }
}

#[async_trait]
impl SnapshotSource for BackendSnapshotSource {
    async fn fetch(&self) -> Result<StatusSnapshot, FetchError> {
        let payload = match self.feed {
            Feed::Dashboard => serde_json::to_value(self.backend.dashboard_data())?,
            Feed::Header => serde_json::json!({ "system_status": self.backend.system_status() }),
            Feed::Flight => serde_json::to_value(self.backend.flight_parameters())?,
        };

        Ok(StatusSnapshot::from_json(&payload))
    }
}
