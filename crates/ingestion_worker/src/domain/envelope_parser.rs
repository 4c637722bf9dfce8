use crate::domain::{EnvelopeError, EnvelopeResult};
use crate::mqtt::ParsedTopic;
use chrono::{DateTime, NaiveDateTime, Utc};
use common::domain::{
    AckResult, Category, CommandAckPayload, DeviceStatus, HelloPayload, InboundMessage,
    Measurement, MessagePayload, NumericField, OtaState, OtaStatusPayload, StatusPayload,
    TelemetryPayload,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Top-level keys that never become time-series points
pub const SKIPPED_FIELDS: [&str; 6] = ["v", "device_id", "ts", "timestamp", "seq", "msg_type"];

/// A decoded body before it is bound to a topic
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Versioned(VersionedEnvelope),
    Legacy(LegacyRecord),
}

/// Object carrying an integer `v`
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedEnvelope {
    pub version: i64,
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub sequence: Option<i64>,
    pub msg_type: Option<Category>,
    pub body: Map<String, Value>,
}

/// Flat record without a version tag
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub body: Map<String, Value>,
}

/// Decode a raw body into a versioned envelope or a legacy record
pub fn parse_envelope(bytes: &[u8]) -> EnvelopeResult<Envelope> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(body) = value else {
        return Err(EnvelopeError::NotAnObject);
    };

    let device_id = body.get("device_id").and_then(Value::as_str).map(String::from);
    let timestamp = envelope_timestamp(&body);

    let version = match body.get("v") {
        None => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| EnvelopeError::InvalidVersion(v.to_string()))?,
        ),
    };

    let Some(version) = version else {
        return Ok(Envelope::Legacy(LegacyRecord {
            device_id,
            timestamp,
            body,
        }));
    };

    let msg_type = match body.get("msg_type").and_then(Value::as_str) {
        Some(name) => {
            let parsed = Category::from_msg_type(name);
            if parsed.is_none() {
                debug!(msg_type = %name, "ignoring unknown msg_type");
            }
            parsed
        }
        None => None,
    };

    Ok(Envelope::Versioned(VersionedEnvelope {
        version,
        device_id,
        timestamp,
        sequence: body.get("seq").and_then(Value::as_i64),
        msg_type,
        body,
    }))
}

impl Envelope {
    /// Bind the envelope to its topic and produce the uniform message
    ///
    /// The topic category wins over `msg_type`; with neither the message is
    /// telemetry. The device id always comes from the topic.
    pub fn normalize(self, topic: &ParsedTopic, received_at: DateTime<Utc>) -> InboundMessage {
        let (protocol_version, sequence, msg_type, claimed_device, timestamp, body) = match self {
            Envelope::Versioned(env) => (
                Some(env.version),
                env.sequence,
                env.msg_type,
                env.device_id,
                env.timestamp,
                env.body,
            ),
            Envelope::Legacy(rec) => (None, None, None, rec.device_id, rec.timestamp, rec.body),
        };

        if let Some(claimed) = claimed_device.as_deref() {
            if claimed != topic.device_id {
                warn!(
                    topic_device_id = %topic.device_id,
                    payload_device_id = %claimed,
                    "device id mismatch between topic and payload, using topic"
                );
            }
        }

        let category = topic
            .category
            .or(msg_type)
            .unwrap_or(Category::Telemetry);

        let payload = extract_payload(category, protocol_version.is_some(), &body);

        InboundMessage {
            device_id: topic.device_id.clone(),
            timestamp: timestamp.unwrap_or(received_at),
            received_at,
            protocol_version,
            sequence,
            payload,
            raw: body,
        }
    }
}

fn extract_payload(category: Category, versioned: bool, body: &Map<String, Value>) -> MessagePayload {
    match category {
        Category::Telemetry => MessagePayload::Telemetry(extract_telemetry(versioned, body)),
        Category::Hello => MessagePayload::Hello(HelloPayload {
            fw_version: string_field(body, "fw_version"),
            uptime_s: body.get("uptime_s").and_then(Value::as_u64),
            broker_connections: body.get("broker_connections").and_then(Value::as_u64),
            buf_usage_pct: body.get("buf_usage_pct").and_then(Value::as_f64),
        }),
        Category::Status => MessagePayload::Status(StatusPayload {
            status: body
                .get("status")
                .and_then(Value::as_str)
                .map(DeviceStatus::parse)
                .unwrap_or(DeviceStatus::Unknown),
        }),
        Category::CommandAck => MessagePayload::CommandAck(CommandAckPayload {
            cmd_id: string_field(body, "cmd_id"),
            result: body
                .get("result")
                .and_then(Value::as_str)
                .map(AckResult::parse)
                .unwrap_or(AckResult::Unknown),
            detail: string_field(body, "detail"),
        }),
        Category::OtaStatus => MessagePayload::OtaStatus(OtaStatusPayload {
            cmd_id: string_field(body, "cmd_id"),
            state: body.get("ota_state").and_then(Value::as_str).map(OtaState::parse),
            progress_pct: body.get("progress_pct").and_then(Value::as_i64),
        }),
    }
}

fn extract_telemetry(versioned: bool, body: &Map<String, Value>) -> TelemetryPayload {
    if versioned {
        if let Some(Value::Array(items)) = body.get("measurements") {
            let measurements = items
                .iter()
                .enumerate()
                .filter_map(|(index, item)| {
                    let measurement = parse_measurement(item);
                    if measurement.is_none() {
                        warn!(index, "skipping measurement without type or numeric val");
                    }
                    measurement
                })
                .collect();
            return TelemetryPayload::Measurements(measurements);
        }
    }

    TelemetryPayload::Fields(numeric_fields(body))
}

fn parse_measurement(item: &Value) -> Option<Measurement> {
    let obj = item.as_object()?;
    let kind = obj.get("type").and_then(Value::as_str).filter(|t| !t.is_empty())?;
    let value = match obj.get("val") {
        Some(Value::Number(n)) => n.as_f64()?,
        _ => return None,
    };

    Some(Measurement {
        timestamp: obj.get("ts").and_then(Value::as_str).and_then(parse_timestamp),
        kind: kind.to_string(),
        value,
        unit: obj.get("unit").and_then(Value::as_str).map(String::from),
    })
}

/// Integer and float top-level fields outside [`SKIPPED_FIELDS`]
pub fn numeric_fields(body: &Map<String, Value>) -> Vec<NumericField> {
    body.iter()
        .filter(|(name, _)| !SKIPPED_FIELDS.contains(&name.as_str()))
        .filter_map(|(name, value)| match value {
            Value::Number(n) => n.as_f64().map(|value| NumericField {
                name: name.clone(),
                value,
            }),
            _ => None,
        })
        .collect()
}

fn envelope_timestamp(body: &Map<String, Value>) -> Option<DateTime<Utc>> {
    ["ts", "timestamp"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .find_map(parse_timestamp)
}

/// RFC 3339, or a naive ISO-8601 date-time taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn string_field(body: &Map<String, Value>, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
