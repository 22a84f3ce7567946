use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub connection: u8,
    pub system_time: String,
    pub gps_status: String,
    pub emergency_alerts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerStatus {
    Active,
    Standby,
}

impl ControllerStatus {
    pub fn toggled(self) -> Self {
        match self {
            ControllerStatus::Active => ControllerStatus::Standby,
            ControllerStatus::Standby => ControllerStatus::Active,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(ControllerStatus::Active),
            "STANDBY" => Some(ControllerStatus::Standby),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controller {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ControllerStatus,
    pub accuracy: String,
    pub response_time: String,
    pub last_update: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoDriveLog {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyberThreat {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
    pub status: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    pub controllers: Vec<Controller>,
    pub co_drive_logs: Vec<CoDriveLog>,
    pub cyber_threats: Vec<CyberThreat>,
    pub system_status: SystemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightParameters {
    pub speed: String,
    pub altitude: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Vehicle,
    Personnel,
}

impl ObjectKind {
    /// Detector class label for this object kind.
    pub fn class_label(self) -> &'static str {
        match self {
            ObjectKind::Vehicle => "car",
            ObjectKind::Personnel => "person",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveillanceObject {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalQuality {
    Excellent,
    Good,
    Acceptable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsPoint {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Metres.
    pub alt: f64,
    /// Horizontal accuracy radius in metres.
    pub acc: f64,
    pub quality: SignalQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsStats {
    pub most_accurate: f64,
    pub average_accuracy: f64,
    pub coverage_m: f64,
    pub quality: SignalQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}
