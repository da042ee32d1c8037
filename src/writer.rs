use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::WriteError;
use crate::gpx_types::*;
use crate::xml_node::write_node;

type Result<T> = std::result::Result<T, WriteError>;

/// Value of the root `creator` attribute.
pub const CREATOR: &str = concat!("gpx-combiner-wasm ", env!("CARGO_PKG_VERSION"));

/// Serialize a TrackDocument as GPX 1.1 text.
pub fn write_gpx(doc: &TrackDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("xmlns", GPX_NAMESPACE));
    root.push_attribute(("version", GPX_VERSION));
    root.push_attribute(("creator", CREATOR));
    for (prefix, uri) in &doc.namespaces {
        let key = format!("xmlns:{prefix}");
        root.push_attribute((key.as_str(), uri.as_str()));
    }
    writer.write_event(Event::Start(root))?;

    if !doc.metadata.is_empty() {
        write_metadata(&mut writer, &doc.metadata)?;
    }
    for wpt in &doc.waypoints {
        write_node(&mut writer, wpt)?;
    }
    for rte in &doc.routes {
        write_node(&mut writer, rte)?;
    }
    for trk in &doc.tracks {
        write_track(&mut writer, trk)?;
    }

    writer.write_event(Event::End(BytesEnd::new("gpx")))?;
    let mut xml = String::from_utf8(writer.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

fn write_metadata(writer: &mut Writer<Vec<u8>>, metadata: &Metadata) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("metadata")))?;
    write_optional(writer, "name", metadata.name.as_deref())?;
    write_optional(writer, "desc", metadata.desc.as_deref())?;
    if let Some(time) = &metadata.time {
        write_text(writer, "time", &format_time(time))?;
    }
    writer.write_event(Event::End(BytesEnd::new("metadata")))?;
    Ok(())
}

fn write_track(writer: &mut Writer<Vec<u8>>, trk: &Track) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("trk")))?;
    write_optional(writer, "name", trk.name.as_deref())?;
    write_optional(writer, "desc", trk.desc.as_deref())?;
    write_optional(writer, "type", trk.track_type.as_deref())?;

    for seg in &trk.segments {
        writer.write_event(Event::Start(BytesStart::new("trkseg")))?;
        for pt in &seg.points {
            write_point(writer, pt)?;
        }
        writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("trk")))?;
    Ok(())
}

fn write_point(writer: &mut Writer<Vec<u8>>, pt: &TrackPoint) -> Result<()> {
    let lat = pt.lat.to_string();
    let lon = pt.lon.to_string();
    let mut start = BytesStart::new("trkpt");
    start.push_attribute(("lat", lat.as_str()));
    start.push_attribute(("lon", lon.as_str()));

    let has_children = pt.ele.is_some()
        || pt.time.is_some()
        || pt.speed.is_some()
        || !pt.other.is_empty()
        || !pt.extensions.is_empty();
    if !has_children {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(ele) = pt.ele {
        write_text(writer, "ele", &ele.to_string())?;
    }
    if let Some(time) = &pt.time {
        write_text(writer, "time", &format_time(time))?;
    }
    if let Some(speed) = pt.speed {
        write_text(writer, "speed", &speed.to_string())?;
    }
    for node in &pt.other {
        write_node(writer, node)?;
    }
    if !pt.extensions.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("extensions")))?;
        for node in &pt.extensions {
            write_node(writer, node)?;
        }
        writer.write_event(Event::End(BytesEnd::new("extensions")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("trkpt")))?;
    Ok(())
}

fn write_optional(writer: &mut Writer<Vec<u8>>, name: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(text) => write_text(writer, name, text),
        None => Ok(()),
    }
}

fn write_text(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// RFC 3339 in UTC with a `Z` suffix; fractional seconds only when present.
pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_gpx;
    use crate::xml_node::XmlNode;
    use chrono::TimeZone;

    fn sample_document() -> TrackDocument {
        let mut doc = TrackDocument::with_vendor_namespaces();
        doc.metadata.time = Some(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap());

        let mut first = TrackPoint::new(35.6762, 139.6503);
        first.ele = Some(10.5);
        first.time = Some(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap());
        first.extensions.push(XmlNode::leaf("gpxtpx", "hr", "141"));

        let mut second = TrackPoint::new(35.6763, 139.6504);
        second.time = Some(Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 1).unwrap() + chrono::Duration::milliseconds(250));
        second.speed = Some(3.25);

        let untimed = TrackPoint::new(-33.5, -70.25);

        let mut trk = Track::named("Morning & Evening");
        trk.segments.push(TrackSegment {
            points: vec![first, second, untimed],
        });
        doc.tracks.push(trk);

        let mut wpt = XmlNode::new("wpt");
        wpt.attributes.push(("lat".to_string(), "35.0".to_string()));
        wpt.attributes.push(("lon".to_string(), "139.0".to_string()));
        wpt.children.push(XmlNode {
            name: "name".to_string(),
            text: Some("Start".to_string()),
            ..XmlNode::default()
        });
        doc.waypoints.push(wpt);
        doc
    }

    #[test]
    fn test_root_declares_version_and_namespaces() {
        let xml = write_gpx(&TrackDocument::with_vendor_namespaces()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"version="1.1""#));
        assert!(xml.contains(r#"xmlns="http://www.topografix.com/GPX/1/1""#));
        for (prefix, uri) in VENDOR_NAMESPACES {
            assert!(xml.contains(&format!(r#"xmlns:{prefix}="{uri}""#)));
        }
    }

    #[test]
    fn test_point_layout() {
        let xml = write_gpx(&sample_document()).unwrap();
        assert!(xml.contains(r#"<trkpt lat="35.6762" lon="139.6503">"#));
        assert!(xml.contains("<ele>10.5</ele>"));
        assert!(xml.contains("<time>2025-01-01T06:00:00Z</time>"));
        assert!(xml.contains("<time>2025-01-01T06:00:01.250Z</time>"));
        assert!(xml.contains("<speed>3.25</speed>"));
        assert!(xml.contains("<gpxtpx:hr>141</gpxtpx:hr>"));
        assert!(xml.contains(r#"<trkpt lat="-33.5" lon="-70.25"/>"#));
        assert!(xml.contains("<name>Morning &amp; Evening</name>"));
    }

    #[test]
    fn test_round_trip() {
        let doc = sample_document();
        let xml = write_gpx(&doc).unwrap();
        let reparsed = parse_gpx(&xml).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_float_coordinates_round_trip_exactly() {
        let mut doc = TrackDocument::default();
        let mut trk = Track::default();
        trk.segments.push(TrackSegment {
            points: vec![TrackPoint::new(47.123456789012345, 8.000000000000002)],
        });
        doc.tracks.push(trk);

        let reparsed = parse_gpx(&write_gpx(&doc).unwrap()).unwrap();
        let pt = reparsed.points().next().unwrap();
        assert_eq!(pt.lat, 47.123456789012345);
        assert_eq!(pt.lon, 8.000000000000002);
    }
}
