use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;
use crate::gpx_types::*;
use crate::xml_node::{XmlNode, node_from_start, push_entity, read_node};

type Result<T> = std::result::Result<T, ParseError>;

/// Parse raw GPX bytes. The input must be UTF-8; a leading BOM is ignored.
pub fn parse_gpx_bytes(bytes: &[u8]) -> Result<TrackDocument> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    parse_gpx(std::str::from_utf8(bytes)?)
}

/// Parse a GPX XML string into a TrackDocument.
pub fn parse_gpx(xml: &str) -> Result<TrackDocument> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let mut doc = start_document(&e)?;
                parse_gpx_body(&mut reader, &mut doc)?;
                return Ok(doc);
            }
            Event::Empty(e) => return start_document(&e),
            Event::Eof => return Err(ParseError::MissingRoot),
            _ => {}
        }
    }
}

/// Validate the root element and collect its namespace declarations.
fn start_document(root: &BytesStart<'_>) -> Result<TrackDocument> {
    if root.local_name().as_ref() != b"gpx" {
        let name = String::from_utf8_lossy(root.name().0).into_owned();
        return Err(ParseError::UnexpectedRoot(name));
    }

    let mut doc = TrackDocument::default();
    for (key, uri) in node_from_start(root)?.attributes {
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            doc.declare_namespace(prefix, &uri);
        }
    }
    Ok(doc)
}

fn parse_gpx_body<'a>(reader: &mut Reader<&'a [u8]>, doc: &mut TrackDocument) -> Result<()> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"metadata" => doc.metadata = parse_metadata(reader)?,
                b"wpt" => doc.waypoints.push(read_node(&e, reader)?),
                b"rte" => doc.routes.push(read_node(&e, reader)?),
                b"trk" => {
                    let track = parse_track(&e, reader, doc)?;
                    doc.tracks.push(track);
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"wpt" => doc.waypoints.push(node_from_start(&e)?),
                b"rte" => doc.routes.push(node_from_start(&e)?),
                b"trk" => doc.tracks.push(Track::default()),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"gpx" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("gpx".to_string())),
            _ => {}
        }
    }

    Ok(())
}

/// Parse a <metadata> element. Only name, desc and time are kept.
fn parse_metadata<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Metadata> {
    let mut metadata = Metadata::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => metadata.name = Some(read_text_owned(reader, &e)?),
                b"desc" => metadata.desc = Some(read_text_owned(reader, &e)?),
                b"time" => metadata.time = Some(parse_time(&read_text_owned(reader, &e)?)?),
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"metadata" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("metadata".to_string())),
            _ => {}
        }
    }

    Ok(metadata)
}

/// Parse a <trk> element.
fn parse_track<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    doc: &mut TrackDocument,
) -> Result<Track> {
    let mut track = Track::default();
    let scoped = nested_namespaces(&node_from_start(start)?, doc, &[]);

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => track.name = Some(read_text_owned(reader, &e)?),
                b"desc" => track.desc = Some(read_text_owned(reader, &e)?),
                b"type" => track.track_type = Some(read_text_owned(reader, &e)?),
                b"trkseg" => {
                    let seg = parse_segment(&e, reader, doc, &scoped)?;
                    if !seg.points.is_empty() {
                        track.segments.push(seg);
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"trk" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("trk".to_string())),
            _ => {}
        }
    }

    Ok(track)
}

/// Parse a <trkseg> element.
fn parse_segment<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    doc: &mut TrackDocument,
    outer: &[(String, String)],
) -> Result<TrackSegment> {
    let mut segment = TrackSegment::default();
    let scoped = nested_namespaces(&node_from_start(start)?, doc, outer);

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" => segment.points.push(parse_point(&e, reader, doc, &scoped)?),
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"trkpt" {
                    let (lat, lon) = parse_lat_lon(&e)?;
                    segment.points.push(TrackPoint::new(lat, lon));
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"trkseg" => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("trkseg".to_string())),
            _ => {}
        }
    }

    Ok(segment)
}

/// Parse lat/lon attributes from a point element's start tag.
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<(f64, f64)> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result?;
        let val = std::str::from_utf8(&attr.value)?;
        match attr.key.local_name().as_ref() {
            b"lat" => lat = Some(parse_coordinate(val, "lat")?),
            b"lon" => lon = Some(parse_coordinate(val, "lon")?),
            _ => {}
        }
    }

    let lat = lat.ok_or(ParseError::MissingAttribute {
        element: "trkpt",
        attribute: "lat",
    })?;
    let lon = lon.ok_or(ParseError::MissingAttribute {
        element: "trkpt",
        attribute: "lon",
    })?;

    Ok((lat, lon))
}

fn parse_coordinate(val: &str, attribute: &'static str) -> Result<f64> {
    val.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidAttribute {
            element: "trkpt",
            attribute,
            value: val.to_string(),
        })
}

/// Parse a <trkpt> element and its children.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(
    start: &BytesStart<'a>,
    reader: &mut Reader<&'a [u8]>,
    doc: &mut TrackDocument,
    outer: &[(String, String)],
) -> Result<TrackPoint> {
    let (lat, lon) = parse_lat_lon(start)?;
    let mut point = TrackPoint::new(lat, lon);
    let end_name = start.name().0.to_vec();
    let scoped = nested_namespaces(&node_from_start(start)?, doc, outer);
    let mut ext_scoped = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"ele" => point.ele = read_text_owned(reader, &e)?.trim().parse::<f64>().ok(),
                b"time" => point.time = Some(parse_time(&read_text_owned(reader, &e)?)?),
                b"speed" => point.speed = read_text_owned(reader, &e)?.trim().parse::<f64>().ok(),
                b"extensions" => {
                    let extensions = read_node(&e, reader)?;
                    ext_scoped = nested_namespaces(&extensions, doc, &scoped);
                    point.extensions = extensions.children;
                }
                _ => point.other.push(read_node(&e, reader)?),
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"ele" | b"time" | b"speed" | b"extensions" => {}
                _ => point.other.push(node_from_start(&e)?),
            },
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => return Err(ParseError::UnexpectedEof("trkpt".to_string())),
            _ => {}
        }
    }

    attach_namespaces(&mut point.other, &scoped);
    attach_namespaces(&mut point.extensions, &ext_scoped);
    Ok(point)
}

/// Handle `xmlns:*` declarations made on an element below the root.
///
/// A declaration the root does not contradict is hoisted onto the document. One that
/// rebinds a root prefix to another URI stays scoped: it is returned, together with the
/// still-active scoped bindings in `outer`, for attaching to the nodes it covers.
fn nested_namespaces(
    element: &XmlNode,
    doc: &mut TrackDocument,
    outer: &[(String, String)],
) -> Vec<(String, String)> {
    let mut scoped = outer.to_vec();
    for (key, uri) in &element.attributes {
        let Some(prefix) = key.strip_prefix("xmlns:") else {
            continue;
        };
        scoped.retain(|(p, _)| p != prefix);
        match doc.namespace_uri(prefix) {
            Some(bound) if bound != uri => scoped.push((prefix.to_string(), uri.clone())),
            _ => doc.declare_namespace(prefix, uri),
        }
    }
    scoped
}

/// Redeclare scoped bindings on each node, unless the node declares the prefix itself.
fn attach_namespaces(nodes: &mut [XmlNode], scoped: &[(String, String)]) {
    for node in nodes {
        for (prefix, uri) in scoped {
            let key = format!("xmlns:{prefix}");
            if node.attribute(&key).is_none() {
                node.attributes.push((key, uri.clone()));
            }
        }
    }
}

/// Parse an ISO 8601 timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ParseError::InvalidTime(text.to_string()))
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections, and entity references (Event::GeneralRef).
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::GeneralRef(e) => push_entity(&mut text, e.as_ref(), e.resolve_char_ref()),
            Event::Start(e) => {
                // Markup inside a text element is not expected; skip it.
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => {
                let name = String::from_utf8_lossy(&end_name).into_owned();
                return Err(ParseError::UnexpectedEof(name));
            }
            _ => {}
        }
    }

    Ok(text)
}
