use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Reflects the box around the vertical centre line of a frame.
    pub fn mirrored(&self, frame_width: f32) -> Self {
        Self {
            x: frame_width - self.x - self.width,
            ..*self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, score: f32) -> Self {
        Self {
            class: class.into(),
            score,
            bbox: BoundingBox::default(),
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn is_threat(&self, watched_class: &str, threshold: f32) -> bool {
        self.class == watched_class && self.score > threshold
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionState {
    #[default]
    AllClear,
    Threat,
}

impl DetectionState {
    pub fn headline(self) -> &'static str {
        match self {
            DetectionState::AllClear => "ALL CLEAR",
            DetectionState::Threat => "HUMAN DETECTED",
        }
    }
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionState::AllClear => write!(f, "ALL_CLEAR"),
            DetectionState::Threat => write!(f, "THREAT"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub total: usize,
    pub threats: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Danger,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::at(LogLevel::Info, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::at(LogLevel::Danger, message)
    }

    fn at(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// One box of the detection overlay, already in mirrored video space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub caption: String,
    pub threat: bool,
    pub bbox: BoundingBox,
}

pub fn overlay(detections: &[Detection], frame_width: f32, watched_class: &str) -> Vec<OverlayBox> {
    detections
        .iter()
        .map(|d| OverlayBox {
            caption: format!("{} ({}%)", d.class, (d.score * 100.0).round() as u32),
            threat: d.class == watched_class,
            bbox: d.bbox.mirrored(frame_width),
        })
        .collect()
}
