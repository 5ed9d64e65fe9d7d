//! Wire types for the line-delimited JSON protocol.
//!
//! Requests are decoded from an already-parsed `serde_json::Value` so framing
//! errors (bad JSON) and dispatch errors (bad or unknown command) stay
//! distinguishable. Responses always serialize to the same envelope:
//! `{"success": true, ...}` or `{"success": false, "error": "..."}`.

use ocrw_backend::{Point, RawDetection};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Version reported when the backend does not expose one
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Detect(DetectRequest),
    CheckDependencies,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectRequest {
    /// Base64 encoded image bytes
    pub image_data: String,
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Accepted for forward compatibility, not consulted
    #[serde(default)]
    pub options: Map<String, Value>,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Invalid {command} command: {source}")]
    Malformed {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Request {
    pub fn from_value(value: Value) -> Result<Self, RequestError> {
        let command = match value.get("command") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => return Err(RequestError::UnknownCommand(other.to_string())),
            None => return Err(RequestError::UnknownCommand("null".to_string())),
        };

        match command.as_str() {
            "detect" => serde_json::from_value(value)
                .map(Request::Detect)
                .map_err(|source| RequestError::Malformed {
                    command: "detect",
                    source,
                }),
            "check_dependencies" => Ok(Request::CheckDependencies),
            _ => Err(RequestError::UnknownCommand(command)),
        }
    }
}

/// One recognized text region as sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub text: String,
    pub confidence: f64,
    pub bbox: Vec<Point>,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        Self {
            text: raw.text,
            confidence: raw.confidence,
            bbox: raw.bbox,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyReport {
    pub version: String,
    /// Always empty; listing languages would require loading the backend
    pub available_languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Detections(Vec<Detection>),
    Dependencies(DependencyReport),
    Failure(String),
}

impl Response {
    pub fn failure(message: impl Into<String>) -> Self {
        Response::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Failure(_))
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("success", &self.is_success())?;
        match self {
            Response::Detections(results) => {
                map.serialize_entry("results", results)?;
            }
            Response::Dependencies(report) => {
                // Field name predates pluggable backends; hosts key on it
                map.serialize_entry("easyocr_version", &report.version)?;
                map.serialize_entry("available_languages", &report.available_languages)?;
            }
            Response::Failure(error) => {
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}
