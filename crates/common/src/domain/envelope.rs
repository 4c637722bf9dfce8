use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five kinds of device message the collector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Telemetry,
    Hello,
    Status,
    CommandAck,
    OtaStatus,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Telemetry,
        Category::Hello,
        Category::Status,
        Category::CommandAck,
        Category::OtaStatus,
    ];

    /// Name used for archive keys, `msg_type` values and event kinds
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Telemetry => "telemetry",
            Category::Hello => "hello",
            Category::Status => "status",
            Category::CommandAck => "command_ack",
            Category::OtaStatus => "ota_status",
        }
    }

    /// Topic suffix following `{prefix}/{device_id}/`
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            Category::Telemetry => "telemetry",
            Category::Hello => "hello",
            Category::Status => "status",
            Category::CommandAck => "command/ack",
            Category::OtaStatus => "ota/status",
        }
    }

    pub fn from_topic_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.topic_suffix() == suffix)
    }

    /// Parse an envelope `msg_type` discriminator
    pub fn from_msg_type(msg_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == msg_type)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized inbound message, identical in shape for versioned and legacy payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub device_id: String,
    /// Envelope timestamp, or receipt time when the payload carries none
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Protocol version, `None` for legacy flat records
    pub protocol_version: Option<i64>,
    /// Dedup key, `None` when the message is exempt
    pub sequence: Option<i64>,
    pub payload: MessagePayload,
    /// The decoded JSON object as received, kept for archiving
    pub raw: serde_json::Map<String, serde_json::Value>,
}

impl InboundMessage {
    pub fn category(&self) -> Category {
        self.payload.category()
    }
}

/// Closed set of payload shapes, one per category
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Telemetry(TelemetryPayload),
    Hello(HelloPayload),
    Status(StatusPayload),
    CommandAck(CommandAckPayload),
    OtaStatus(OtaStatusPayload),
}

impl MessagePayload {
    pub fn category(&self) -> Category {
        match self {
            MessagePayload::Telemetry(_) => Category::Telemetry,
            MessagePayload::Hello(_) => Category::Hello,
            MessagePayload::Status(_) => Category::Status,
            MessagePayload::CommandAck(_) => Category::CommandAck,
            MessagePayload::OtaStatus(_) => Category::OtaStatus,
        }
    }
}

/// Telemetry readings: an explicit measurement list, or numeric top-level fields
/// of a record without one.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryPayload {
    Measurements(Vec<Measurement>),
    Fields(Vec<NumericField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub timestamp: Option<DateTime<Utc>>,
    /// Measurement type, e.g. `voltage_dc`
    pub kind: String,
    pub value: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericField {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelloPayload {
    pub fw_version: Option<String>,
    pub uptime_s: Option<u64>,
    pub broker_connections: Option<u64>,
    pub buf_usage_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

impl DeviceStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "online" => DeviceStatus::Online,
            "offline" => DeviceStatus::Offline,
            _ => DeviceStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusPayload {
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckResult {
    Accepted,
    Rejected,
    Error,
    Unsupported,
    Unknown,
}

impl AckResult {
    pub fn parse(value: &str) -> Self {
        match value {
            "accepted" => AckResult::Accepted,
            "rejected" => AckResult::Rejected,
            "error" => AckResult::Error,
            "unsupported" => AckResult::Unsupported,
            _ => AckResult::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandAckPayload {
    pub cmd_id: Option<String>,
    pub result: AckResult,
    pub detail: Option<String>,
}

/// OTA progress state. Devices may report states beyond the known ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaState {
    Downloading,
    Verifying,
    Success,
    Failure,
    Other(String),
}

impl OtaState {
    pub fn parse(value: &str) -> Self {
        match value {
            "downloading" => OtaState::Downloading,
            "verifying" => OtaState::Verifying,
            "success" => OtaState::Success,
            "failure" => OtaState::Failure,
            other => OtaState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OtaState::Downloading => "downloading",
            OtaState::Verifying => "verifying",
            OtaState::Success => "success",
            OtaState::Failure => "failure",
            OtaState::Other(state) => state,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtaStatusPayload {
    pub cmd_id: Option<String>,
    pub state: Option<OtaState>,
    pub progress_pct: Option<i64>,
}
