//! Combining several activity files into one GPX document.
//!
//! Each input is decoded according to its file extension, then either concatenated
//! (legacy mode) or flattened into a single chronologically ordered track. In the
//! unified mode, recording gaps longer than the configured threshold are bridged with a
//! pair of stationary pause markers so the gap does not read as a fast straight-line move.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use crate::converter::records_to_document;
use crate::error::{CombineError, FileError};
use crate::fit::decode_records;
use crate::gpx_types::*;
use crate::options::CombineOptions;
use crate::parser::parse_gpx_bytes;
use crate::writer::write_gpx;
use crate::xml_node::clone_nodes;

/// Name of the single track produced in unified mode.
pub const COMBINED_TRACK_NAME: &str = "Combined Activity";

/// Supported input formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Gpx,
    Fit,
}

impl FileKind {
    /// Case-insensitive lookup by extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        if ext.eq_ignore_ascii_case("gpx") {
            Some(Self::Gpx)
        } else if ext.eq_ignore_ascii_case("fit") {
            Some(Self::Fit)
        } else {
            None
        }
    }
}

/// Combine `(filename, content)` inputs into one serialized GPX document.
pub fn combine<N: AsRef<str>, C: AsRef<[u8]>>(
    inputs: &[(N, C)],
    opts: &CombineOptions,
) -> Result<String, CombineError> {
    let mut docs = parse_inputs(inputs)?;

    let combined = if opts.single_track {
        debug!("unifying {} documents into one track", docs.len());
        unify(&mut docs, opts)?
    } else {
        debug!("concatenating {} documents", docs.len());
        concatenate(docs)
    };

    Ok(write_gpx(&combined)?)
}

/// Convert a single FIT file to a standalone GPX document.
pub fn decode_binary_log(content: &[u8]) -> Result<String, FileError> {
    let doc = fit_to_document(content)?;
    Ok(write_gpx(&doc)?)
}

/// Decode every input, failing on the first bad one.
fn parse_inputs<N: AsRef<str>, C: AsRef<[u8]>>(
    inputs: &[(N, C)],
) -> Result<Vec<TrackDocument>, CombineError> {
    if inputs.is_empty() {
        return Err(CombineError::NoInput);
    }

    // Reject unknown types before doing any decoding work.
    let kinds = inputs
        .iter()
        .map(|(name, _)| {
            let filename = name.as_ref();
            FileKind::from_filename(filename).ok_or_else(|| CombineError::UnsupportedFileType {
                filename: filename.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut docs = Vec::with_capacity(inputs.len());
    for ((name, content), kind) in inputs.iter().zip(kinds) {
        let filename = name.as_ref();
        let content = content.as_ref();
        if content.iter().all(u8::is_ascii_whitespace) {
            warn!("skipping empty file {filename}");
            continue;
        }

        debug!("decoding {filename} as {kind:?} ({} bytes)", content.len());
        let doc = parse_file(kind, content).map_err(|source| CombineError::FileProcessing {
            filename: filename.to_string(),
            source,
        })?;
        docs.push(doc);
    }

    if docs.is_empty() {
        return Err(CombineError::NoValidData);
    }
    Ok(docs)
}

fn parse_file(kind: FileKind, content: &[u8]) -> Result<TrackDocument, FileError> {
    match kind {
        FileKind::Gpx => Ok(parse_gpx_bytes(content)?),
        FileKind::Fit => fit_to_document(content),
    }
}

fn fit_to_document(content: &[u8]) -> Result<TrackDocument, FileError> {
    let records = decode_records(content)?;
    Ok(records_to_document(records))
}

/// Legacy mode: append everything after the first document onto it, in input order.
fn concatenate(docs: Vec<TrackDocument>) -> TrackDocument {
    let mut docs = docs.into_iter();
    let mut base = docs.next().unwrap_or_default();

    for mut doc in docs {
        adopt_namespaces(&mut base, &mut doc);
        base.tracks.extend(doc.tracks);
        base.routes.extend(doc.routes);
        base.waypoints.extend(doc.waypoints);
    }
    base
}

/// Unified mode: one time-ordered track built from clones of every input point.
fn unify(docs: &mut [TrackDocument], opts: &CombineOptions) -> Result<TrackDocument, CombineError> {
    let mut out = TrackDocument::with_vendor_namespaces();
    for doc in docs.iter_mut() {
        adopt_namespaces(&mut out, doc);
    }
    let docs = &*docs;

    let all_points: Vec<&TrackPoint> = docs.iter().flat_map(TrackDocument::points).collect();
    if all_points.is_empty() {
        return Err(CombineError::NoTrackPoints);
    }

    let (mut timed, untimed): (Vec<&TrackPoint>, Vec<&TrackPoint>) =
        all_points.into_iter().partition(|pt| pt.time.is_some());
    // Stable, so points sharing a timestamp keep their input order.
    timed.sort_by_key(|pt| pt.time);

    for doc in docs {
        out.waypoints.extend(clone_nodes(&doc.waypoints));
        out.routes.extend(clone_nodes(&doc.routes));
    }

    let gap_threshold = Duration::seconds(i64::from(opts.gap_threshold_seconds));
    let mut points = Vec::with_capacity(timed.len() + untimed.len());
    let mut prev: Option<(&TrackPoint, DateTime<Utc>)> = None;
    let mut pauses = 0usize;

    for pt in &timed {
        let Some(time) = pt.time else { continue };
        if let Some((prev_pt, prev_time)) = prev {
            if opts.fills_pauses() && time - prev_time > gap_threshold {
                let (start, end) = pause_bounds(prev_time, time);
                points.push(pause_marker(prev_pt, start));
                points.push(pause_marker(prev_pt, end));
                pauses += 1;
            }
        }
        points.push(clone_point(pt));
        prev = Some((*pt, time));
    }
    points.extend(untimed.iter().map(|pt| clone_point(pt)));

    if pauses > 0 {
        debug!("bridged {pauses} recording gaps with pause markers");
    }
    if !untimed.is_empty() {
        debug!("appended {} untimed points", untimed.len());
    }

    out.metadata.time = timed.first().and_then(|pt| pt.time);

    let mut track = Track::named(COMBINED_TRACK_NAME);
    track.segments.push(TrackSegment { points });
    out.tracks.push(track);
    Ok(out)
}

/// Declare `doc`'s root namespaces on `target`.
///
/// A prefix that `target` already binds to a different URI is renamed in `doc` so its
/// elements keep their meaning once they sit under `target`'s root.
fn adopt_namespaces(target: &mut TrackDocument, doc: &mut TrackDocument) {
    let renames: Vec<(String, String)> = doc
        .namespaces
        .iter()
        .filter_map(|(prefix, uri)| {
            let bound = target.bind_namespace(prefix, uri);
            (bound != *prefix).then(|| (prefix.clone(), bound))
        })
        .collect();

    if !renames.is_empty() {
        debug!("renaming conflicting namespace prefixes {renames:?}");
        doc.rename_prefixes(&renames);
    }
}

/// Timestamps for the two markers bridging a gap from `prev` to `next`.
///
/// Each marker sits one second inside the gap, or at its midpoint when the gap is two
/// seconds or shorter, so the markers never overtake each other or the real points.
fn pause_bounds(prev: DateTime<Utc>, next: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = Duration::seconds(1).min((next - prev) / 2);
    (prev + offset, next - offset)
}

/// A stationary copy of `source` at `time`.
fn pause_marker(source: &TrackPoint, time: DateTime<Utc>) -> TrackPoint {
    TrackPoint {
        lat: source.lat,
        lon: source.lon,
        ele: source.ele,
        time: Some(time),
        speed: None,
        other: Vec::new(),
        extensions: clone_nodes(&source.extensions),
    }
}

fn clone_point(source: &TrackPoint) -> TrackPoint {
    TrackPoint {
        lat: source.lat,
        lon: source.lon,
        ele: source.ele,
        time: source.time,
        speed: source.speed,
        other: clone_nodes(&source.other),
        extensions: clone_nodes(&source.extensions),
    }
}
