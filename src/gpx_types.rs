use chrono::{DateTime, Utc};

use crate::xml_node::XmlNode;

/// Schema version written into every serialized document.
pub const GPX_VERSION: &str = "1.1";

/// Default namespace of GPX 1.1 documents.
pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// Prefix used for extension fields emitted from binary logs.
pub const TRACKPOINT_EXT_PREFIX: &str = "gpxtpx";

/// Vendor extension namespaces declared on every generated document.
pub const VENDOR_NAMESPACES: [(&str, &str); 3] = [
    (
        TRACKPOINT_EXT_PREFIX,
        "http://www.garmin.com/xmlschemas/TrackPointExtension/v1",
    ),
    ("gpxx", "http://www.garmin.com/xmlschemas/GpxExtensions/v3"),
    ("gpxdata", "http://www.cluetrust.com/XML/GPXDATA/1/0"),
];

/// A parsed GPX document, or the assembled output of a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackDocument {
    pub metadata: Metadata,
    /// `<wpt>` elements, kept verbatim.
    pub waypoints: Vec<XmlNode>,
    /// `<rte>` elements, kept verbatim.
    pub routes: Vec<XmlNode>,
    pub tracks: Vec<Track>,
    /// Declared `xmlns:prefix` -> URI pairs, in declaration order.
    pub namespaces: Vec<(String, String)>,
}

impl TrackDocument {
    /// A document with the vendor extension namespaces already declared.
    pub fn with_vendor_namespaces() -> Self {
        let mut doc = Self::default();
        for (prefix, uri) in VENDOR_NAMESPACES {
            doc.declare_namespace(prefix, uri);
        }
        doc
    }

    /// Declare a namespace prefix. The first declaration of a prefix wins.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        if !self.namespaces.iter().any(|(p, _)| p == prefix) {
            self.namespaces.push((prefix.to_string(), uri.to_string()));
        }
    }

    /// Bind `uri` under `prefix`, or under a fresh `prefix<N>` when `prefix` is already
    /// bound to a different URI. Returns the prefix that now stands for `uri`.
    pub fn bind_namespace(&mut self, prefix: &str, uri: &str) -> String {
        match self.namespace_uri(prefix) {
            None => {
                self.declare_namespace(prefix, uri);
                return prefix.to_string();
            }
            Some(bound) if bound == uri => return prefix.to_string(),
            Some(_) => {}
        }

        let fresh = (1..)
            .map(|n| format!("{prefix}{n}"))
            .find(|candidate| self.namespace_uri(candidate).is_none_or(|bound| bound == uri))
            .unwrap_or_else(|| prefix.to_string());
        self.declare_namespace(&fresh, uri);
        fresh
    }

    /// Rewrite prefixes in every element carried by the document, and in its own
    /// declarations. `renames` holds `(from, to)` pairs applied all at once.
    pub fn rename_prefixes(&mut self, renames: &[(String, String)]) {
        for (prefix, _) in &mut self.namespaces {
            if let Some((_, to)) = renames.iter().find(|(from, _)| from.as_str() == prefix.as_str()) {
                *prefix = to.clone();
            }
        }
        let points = self
            .tracks
            .iter_mut()
            .flat_map(|trk| trk.segments.iter_mut())
            .flat_map(|seg| seg.points.iter_mut());
        let point_nodes = points.flat_map(|pt| pt.other.iter_mut().chain(pt.extensions.iter_mut()));
        for node in self
            .waypoints
            .iter_mut()
            .chain(self.routes.iter_mut())
            .chain(point_nodes)
        {
            node.rename_prefixes(renames);
        }
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// All track points in document order.
    pub fn points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.tracks
            .iter()
            .flat_map(|trk| trk.segments.iter())
            .flat_map(|seg| seg.points.iter())
    }

    pub fn point_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|trk| trk.segments.iter())
            .map(|seg| seg.points.len())
            .sum()
    }
}

/// The `<metadata>` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.desc.is_none() && self.time.is_none()
    }
}

/// A GPX track (<trk>).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub track_type: Option<String>,
    pub segments: Vec<TrackSegment>,
}

impl Track {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A GPX track segment (<trkseg>).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSegment {
    pub points: Vec<TrackPoint>,
}

/// A single positional sample (<trkpt>).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    pub time: Option<DateTime<Utc>>,
    pub speed: Option<f64>,
    /// Other schema children (name, sat, hdop, ...), re-emitted as read.
    pub other: Vec<XmlNode>,
    /// Children of the point's `<extensions>` element.
    pub extensions: Vec<XmlNode>,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ele: None,
            time: None,
            speed: None,
            other: Vec::new(),
            extensions: Vec::new(),
        }
    }
}
