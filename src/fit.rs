//! FIT activity log decoding.
//!
//! Framing, definition messages and CRC checks are handled by `fitparser`. This module
//! narrows its output to `record` messages and splits each into the handful of fields
//! the track model understands plus an ordered bag of everything else.

use chrono::{DateTime, Utc};
use fitparser::Value;
use fitparser::profile::MesgNum;

use crate::error::MalformedInputError;

const SEMICIRCLE_TO_DEGREES: f64 = 180.0 / 2_147_483_648.0;

/// Convert a semicircle-encoded angle to decimal degrees.
pub fn semicircles_to_degrees(semicircles: i32) -> f64 {
    f64::from(semicircles) * SEMICIRCLE_TO_DEGREES
}

/// One decoded `record` message.
#[derive(Debug, Clone, Default)]
pub struct BinaryRecord {
    pub position_lat: Option<i32>,
    pub position_long: Option<i32>,
    /// Meters; `enhanced_altitude` wins over `altitude` when both are present.
    pub altitude: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Remaining fields, ordered by field number and then name.
    pub fields: Vec<(String, Value)>,
}

impl BinaryRecord {
    fn from_message(message: &fitparser::FitDataRecord) -> Self {
        let mut record = BinaryRecord::default();
        let mut enhanced_altitude = None;

        // Developer fields arrive in hash order; sort so every decode agrees.
        let mut fields: Vec<&fitparser::FitDataField> = message.fields().iter().collect();
        fields.sort_by(|a, b| (a.number(), a.name()).cmp(&(b.number(), b.name())));

        for field in fields {
            let value = field.value();
            match field.name() {
                "position_lat" => record.position_lat = value_to_i32(value),
                "position_long" => record.position_long = value_to_i32(value),
                "altitude" => record.altitude = value_to_f64(value),
                "enhanced_altitude" => enhanced_altitude = value_to_f64(value),
                "timestamp" => {
                    if let Value::Timestamp(ts) = value {
                        record.timestamp = Some(ts.with_timezone(&Utc));
                    }
                }
                name => record.fields.push((name.to_string(), value.clone())),
            }
        }

        if enhanced_altitude.is_some() {
            record.altitude = enhanced_altitude;
        }
        record
    }
}

/// Decode a FIT byte stream into its `record` messages, in file order.
///
/// The whole stream is validated up front, so a framing or checksum error is reported
/// before any record is produced.
pub fn decode_records(
    content: &[u8],
) -> Result<impl Iterator<Item = BinaryRecord>, MalformedInputError> {
    let messages = fitparser::de::from_bytes(content)?;
    log::debug!("decoded {} FIT messages", messages.len());

    Ok(messages
        .into_iter()
        .filter(|message| message.kind() == MesgNum::Record)
        .map(|message| BinaryRecord::from_message(&message)))
}

fn value_to_i32(value: &Value) -> Option<i32> {
    match value {
        Value::SInt32(v) => Some(*v),
        Value::SInt16(v) => Some(i32::from(*v)),
        Value::SInt8(v) => Some(i32::from(*v)),
        Value::UInt32(v) | Value::UInt32z(v) => i32::try_from(*v).ok(),
        Value::SInt64(v) => i32::try_from(*v).ok(),
        _ => None,
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        Value::SInt16(v) => Some(*v as f64),
        Value::UInt16(v) => Some(*v as f64),
        Value::SInt32(v) => Some(*v as f64),
        Value::UInt32(v) => Some(*v as f64),
        Value::SInt64(v) => Some(*v as f64),
        Value::UInt64(v) => Some(*v as f64),
        Value::UInt16z(v) => Some(*v as f64),
        Value::UInt32z(v) => Some(*v as f64),
        Value::UInt64z(v) => Some(*v as f64),
        Value::Byte(v) => Some(*v as f64),
        Value::UInt8(v) => Some(*v as f64),
        Value::UInt8z(v) => Some(*v as f64),
        Value::SInt8(v) => Some(*v as f64),
        Value::Array(values) => values.iter().find_map(value_to_f64),
        _ => None,
    }
}
