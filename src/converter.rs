//! Turning decoded FIT records into a GPX track.

use chrono::{SecondsFormat, Utc};
use fitparser::Value;

use crate::fit::{BinaryRecord, semicircles_to_degrees};
use crate::gpx_types::*;
use crate::xml_node::XmlNode;

/// Convert decoded FIT records to a document with one track and one segment.
///
/// Records without both coordinates are dropped. Heart rate, cadence and temperature
/// go into a `gpxtpx:TrackPointExtension` element; every other field besides position,
/// altitude and timestamp becomes a `gpxtpx:` leaf after it.
pub fn records_to_document(records: impl IntoIterator<Item = BinaryRecord>) -> TrackDocument {
    let mut doc = TrackDocument::with_vendor_namespaces();
    let mut segment = TrackSegment::default();
    let mut dropped = 0usize;

    for record in records {
        match record_to_point(&record) {
            Some(pt) => segment.points.push(pt),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::debug!("dropped {dropped} FIT records without a position");
    }

    let mut track = Track::default();
    track.segments.push(segment);
    doc.tracks.push(track);
    doc
}

/// FIT fields carried inside `<gpxtpx:TrackPointExtension>`, in schema order.
const TRACKPOINT_EXTENSION_FIELDS: [(&str, &str); 3] = [
    ("temperature", "atemp"),
    ("heart_rate", "hr"),
    ("cadence", "cad"),
];

fn record_to_point(record: &BinaryRecord) -> Option<TrackPoint> {
    let (lat, lon) = match (record.position_lat, record.position_long) {
        (Some(lat), Some(lon)) => (semicircles_to_degrees(lat), semicircles_to_degrees(lon)),
        _ => return None,
    };

    let mut point = TrackPoint::new(lat, lon);
    point.ele = record.altitude;
    point.time = record.timestamp;

    let mut garmin = XmlNode::new(format!("{TRACKPOINT_EXT_PREFIX}:TrackPointExtension"));
    for (field, element) in TRACKPOINT_EXTENSION_FIELDS {
        let text = record
            .fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| format_value(value));
        if let Some(text) = text {
            garmin.children.push(XmlNode::leaf(TRACKPOINT_EXT_PREFIX, element, text));
        }
    }
    if !garmin.children.is_empty() {
        point.extensions.push(garmin);
    }

    point.extensions.extend(
        record
            .fields
            .iter()
            .filter(|(name, _)| !TRACKPOINT_EXTENSION_FIELDS.iter().any(|(f, _)| f == name))
            .filter_map(|(name, value)| {
                let text = format_value(value)?;
                Some(XmlNode::leaf(TRACKPOINT_EXT_PREFIX, &element_name(name), text))
            }),
    );
    Some(point)
}

/// Make a field name usable as the local part of an element name.
///
/// Developer field names come straight from the file and may contain spaces or
/// punctuation. Anything outside `[A-Za-z0-9_.-]` becomes `_`, and a name that does not
/// start with a letter or `_` gets a leading `_`.
fn element_name(field: &str) -> String {
    let mut name: String = field
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

/// Render a field value as extension text. `None` for values with no representation.
fn format_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Timestamp(ts) => ts
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        Value::String(s) => s.trim().to_string(),
        Value::Float32(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Enum(v) | Value::Byte(v) | Value::UInt8(v) | Value::UInt8z(v) => v.to_string(),
        Value::SInt8(v) => v.to_string(),
        Value::SInt16(v) => v.to_string(),
        Value::UInt16(v) | Value::UInt16z(v) => v.to_string(),
        Value::SInt32(v) => v.to_string(),
        Value::UInt32(v) | Value::UInt32z(v) => v.to_string(),
        Value::SInt64(v) => v.to_string(),
        Value::UInt64(v) | Value::UInt64z(v) => v.to_string(),
        Value::Array(values) => values
            .iter()
            .filter_map(format_value)
            .collect::<Vec<_>>()
            .join(","),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(lat: Option<i32>, lon: Option<i32>) -> BinaryRecord {
        BinaryRecord {
            position_lat: lat,
            position_long: lon,
            ..BinaryRecord::default()
        }
    }

    #[test]
    fn test_single_track_single_segment() {
        let doc = records_to_document(vec![
            record(Some(0), Some(0)),
            record(Some(1 << 30), Some(-(1 << 30))),
        ]);
        assert_eq!(doc.tracks.len(), 1);
        assert_eq!(doc.tracks[0].segments.len(), 1);

        let points = &doc.tracks[0].segments[0].points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].lat, 0.0);
        assert!((points[1].lat - 90.0).abs() < 1e-12);
        assert!((points[1].lon + 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_records_without_position_dropped() {
        let doc = records_to_document(vec![
            record(Some(10), None),
            record(None, Some(10)),
            record(None, None),
            record(Some(20), Some(30)),
        ]);
        assert_eq!(doc.point_count(), 1);
        let pt = doc.points().next().unwrap();
        assert_eq!(pt.lat, semicircles_to_degrees(20));
        assert_eq!(pt.lon, semicircles_to_degrees(30));
    }

    #[test]
    fn test_altitude_and_timestamp_copied() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 7, 30, 0).unwrap();
        let mut rec = record(Some(1), Some(2));
        rec.altitude = Some(123.4);
        rec.timestamp = Some(ts);

        let doc = records_to_document(vec![rec]);
        let pt = doc.points().next().unwrap();
        assert_eq!(pt.ele, Some(123.4));
        assert_eq!(pt.time, Some(ts));
        assert!(pt.extensions.is_empty());
    }

    #[test]
    fn test_extra_fields_become_extensions() {
        let mut rec = record(Some(1), Some(2));
        rec.fields = vec![
            ("cadence".to_string(), Value::UInt8(88)),
            ("speed".to_string(), Value::Float64(3.5)),
            ("heart_rate".to_string(), Value::UInt8(142)),
            ("activity_type".to_string(), Value::String("running".to_string())),
            ("blank".to_string(), Value::String(String::new())),
        ];

        let doc = records_to_document(vec![rec]);
        let ext = &doc.points().next().unwrap().extensions;
        assert_eq!(ext.len(), 3);

        let garmin = &ext[0];
        assert_eq!(garmin.name, "gpxtpx:TrackPointExtension");
        let inner: Vec<(&str, &str)> = garmin
            .children
            .iter()
            .map(|n| (n.name.as_str(), n.text.as_deref().unwrap()))
            .collect();
        assert_eq!(inner, vec![("gpxtpx:hr", "142"), ("gpxtpx:cad", "88")]);

        let rest: Vec<(&str, &str)> = ext[1..]
            .iter()
            .map(|n| (n.name.as_str(), n.text.as_deref().unwrap()))
            .collect();
        assert_eq!(
            rest,
            vec![("gpxtpx:speed", "3.5"), ("gpxtpx:activity_type", "running")]
        );
    }

    #[test]
    fn test_no_wrapper_without_garmin_fields() {
        let mut rec = record(Some(1), Some(2));
        rec.fields = vec![("distance".to_string(), Value::Float64(12.5))];
        let doc = records_to_document(vec![rec]);
        let ext = &doc.points().next().unwrap().extensions;
        assert_eq!(ext.len(), 1);
        assert_eq!(ext[0].name, "gpxtpx:distance");
    }

    #[test]
    fn test_element_name_sanitized() {
        assert_eq!(element_name("Form Power"), "Form_Power");
        assert_eq!(element_name("power/kg"), "power_kg");
        assert_eq!(element_name("3d_speed"), "_3d_speed");
        assert_eq!(element_name("-x"), "_-x");
        assert_eq!(element_name(""), "_");
        assert_eq!(element_name("Leg Spring Stiffness"), "Leg_Spring_Stiffness");
        assert_eq!(element_name("unknown_field_7"), "unknown_field_7");
    }

    #[test]
    fn test_spaced_field_name_survives_round_trip() {
        let mut rec = record(Some(1), Some(2));
        rec.fields = vec![("Form Power".to_string(), Value::UInt16(72))];
        let doc = records_to_document(vec![rec]);

        let xml = crate::writer::write_gpx(&doc).unwrap();
        let back = crate::parser::parse_gpx(&xml).unwrap();
        let ext = &back.points().next().unwrap().extensions;
        assert_eq!(ext[0].name, "gpxtpx:Form_Power");
        assert_eq!(ext[0].text.as_deref(), Some("72"));
    }

    #[test]
    fn test_namespaces_declared_without_extensions() {
        let doc = records_to_document(Vec::new());
        for (prefix, uri) in VENDOR_NAMESPACES {
            assert_eq!(doc.namespace_uri(prefix), Some(uri));
        }
        assert_eq!(doc.tracks.len(), 1);
        assert_eq!(doc.point_count(), 0);
    }
}
