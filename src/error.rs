use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::JsValue;

/// Failure to read GPX text into a [`TrackDocument`](crate::gpx_types::TrackDocument).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("input is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("no <gpx> root element")]
    MissingRoot,
    #[error("expected <gpx> root element, found <{0}>")]
    UnexpectedRoot(String),
    #[error("unexpected end of input inside <{0}>")]
    UnexpectedEof(String),
    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("Invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("invalid timestamp '{0}'")]
    InvalidTime(String),
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.into())
    }
}

/// The binary log's framing or checksum structure is invalid.
#[derive(Debug, Error)]
#[error("malformed FIT data: {0}")]
pub struct MalformedInputError(#[from] pub fitparser::Error);

/// Failure while serializing a document.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML write error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("serialized output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Why a single input file could not be turned into a document.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Failure of a whole combine operation. No partial output is ever produced.
#[derive(Debug, Error)]
pub enum CombineError {
    #[error("no files provided")]
    NoInput,
    #[error("unsupported file type: {filename}")]
    UnsupportedFileType { filename: String },
    #[error("error processing {filename}: {source}")]
    FileProcessing {
        filename: String,
        #[source]
        source: FileError,
    },
    #[error("no valid data found in the provided files")]
    NoValidData,
    #[error("no track points found in the provided files")]
    NoTrackPoints,
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl CombineError {
    /// Stable identifier for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoInput => "NoInput",
            Self::UnsupportedFileType { .. } => "UnsupportedFileType",
            Self::FileProcessing { .. } => "FileProcessing",
            Self::NoValidData => "NoValidData",
            Self::NoTrackPoints => "NoTrackPoints",
            Self::Write(_) => "Write",
        }
    }

    /// The offending input, when the failure is tied to one.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::UnsupportedFileType { filename } | Self::FileProcessing { filename, .. } => {
                Some(filename)
            }
            _ => None,
        }
    }
}

/// Shape of errors handed to JavaScript callers.
#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    kind: &'a str,
    filename: Option<&'a str>,
    message: String,
}

impl From<CombineError> for JsValue {
    fn from(e: CombineError) -> Self {
        let report = ErrorReport {
            kind: e.kind(),
            filename: e.filename(),
            message: e.to_string(),
        };
        serde_wasm_bindgen::to_value(&report).unwrap_or_else(|_| JsValue::from_str(&report.message))
    }
}

impl From<FileError> for JsValue {
    fn from(e: FileError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
