//! Firehose record processor for DynamoDB change records.
//!
//! Each record carries one change as delivered through Kinesis. The item image
//! is flattened from DynamoDB JSON into plain string columns, tagged with the
//! event name and an ingestion timestamp, and re-encoded as one JSON line.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error as ThisError;
use tracing::{info, warn};

pub const EVENT_FIELD: &str = "Event";
pub const TIMESTAMP_FIELD: &str = "ingestion_timestamp";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseEvent {
    #[serde(default)]
    pub invocation_id: String,
    pub records: Vec<FirehoseRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseRecord {
    pub record_id: String,
    /// Base64 encoded payload.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirehoseResponse {
    pub records: Vec<FirehoseResponseRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirehoseResponseRecord {
    pub record_id: String,
    pub result: TransformResult,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransformResult {
    Ok,
    ProcessingFailed,
}

#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("payload is not base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("payload is not a change record: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown event name: {0}")]
    UnknownEvent(String),
    #[error("change record has no {0}")]
    MissingImage(&'static str),
    #[error("malformed attribute: {0}")]
    MalformedAttribute(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeRecord {
    event_name: String,
    dynamodb: StreamRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StreamRecord {
    new_image: Option<Map<String, Value>>,
    old_image: Option<Map<String, Value>>,
}

/// Transform every record of `event`, stamping them with `now`.
///
/// A record that fails is returned untouched as `ProcessingFailed`; the rest of
/// the batch is unaffected.
pub fn transform_event(event: FirehoseEvent, now: DateTime<Utc>) -> FirehoseResponse {
    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let total = event.records.len();

    let records: Vec<FirehoseResponseRecord> = event
        .records
        .into_iter()
        .map(|record| match transform_record(&record.data, &timestamp) {
            Ok(data) => FirehoseResponseRecord {
                record_id: record.record_id,
                result: TransformResult::Ok,
                data,
            },
            Err(err) => {
                warn!("Failed to process record {}: {err}", record.record_id);
                FirehoseResponseRecord {
                    record_id: record.record_id,
                    result: TransformResult::ProcessingFailed,
                    data: record.data,
                }
            }
        })
        .collect();

    let succeeded = records
        .iter()
        .filter(|record| record.result == TransformResult::Ok)
        .count();
    info!("Successfully processed {succeeded} of {total} records.");

    FirehoseResponse { records }
}

fn transform_record(data: &str, timestamp: &str) -> Result<String, RecordError> {
    let payload = STANDARD.decode(data)?;
    let change: ChangeRecord = serde_json::from_slice(&payload)?;

    let image = match change.event_name.as_str() {
        "INSERT" | "MODIFY" => change
            .dynamodb
            .new_image
            .ok_or(RecordError::MissingImage("NewImage"))?,
        "REMOVE" => change
            .dynamodb
            .old_image
            .ok_or(RecordError::MissingImage("OldImage"))?,
        other => return Err(RecordError::UnknownEvent(other.to_string())),
    };

    let mut item = flatten(image)?;
    item.insert(EVENT_FIELD.into(), Value::String(change.event_name));
    item.insert(TIMESTAMP_FIELD.into(), Value::String(timestamp.into()));

    let mut line = serde_json::to_string(&item)?;
    line.push('\n');
    Ok(STANDARD.encode(line))
}

/// Replace each `{"<type>": <value>}` attribute with its value as a string.
fn flatten(image: Map<String, Value>) -> Result<Map<String, Value>, RecordError> {
    image
        .into_iter()
        .map(|(name, attribute)| {
            let value = attribute_value(attribute)
                .ok_or_else(|| RecordError::MalformedAttribute(name.clone()))?;
            Ok((name, Value::String(value)))
        })
        .collect()
}

fn attribute_value(attribute: Value) -> Option<String> {
    let Value::Object(typed) = attribute else {
        return None;
    };
    let (kind, value) = typed.into_iter().next()?;

    match (kind.as_str(), value) {
        ("NULL", _) => Some("null".to_string()),
        (_, Value::String(value)) => Some(value),
        (_, Value::Bool(value)) => Some(value.to_string()),
        (_, other) => serde_json::to_string(&other).ok(),
    }
}
