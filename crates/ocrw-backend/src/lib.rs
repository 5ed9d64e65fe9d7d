//! Text detection backends.
//!
//! A backend is an expensive, language-scoped engine. The worker only needs
//! three things from it: a cheap presence/version probe, a way to load a
//! reader for a language set, and the reader's detection call.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod languages;
pub mod mock;
pub mod tesseract;

pub use tesseract::TesseractBackend;

/// A polygon corner as `[x, y]`.
pub type Point = [f64; 2];

/// One detection exactly as the backend reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Polygon corners in backend order
    pub bbox: Vec<Point>,
    pub text: String,
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(bbox: Vec<Point>, text: impl Into<String>, confidence: f64) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence,
        }
    }
}

/// What a probe could find out without loading any models.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendInfo {
    pub version: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend library or executable could not be located
    #[error("{library} not installed. Install with: {install_hint}")]
    NotInstalled {
        library: String,
        install_hint: String,
    },
    /// The backend is present but refused to build a reader
    #[error("{0}")]
    Initialization(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Backend capability used by the worker's session.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Human readable backend name, used in diagnostics
    fn name(&self) -> &str;

    /// Confirm the backend is installed and read its version.
    ///
    /// Must not load models or language data.
    async fn probe(&self) -> Result<BackendInfo, BackendError>;

    /// Build a reader for `languages`, in the order given.
    async fn load(&self, languages: &[String], gpu: bool)
        -> Result<Box<dyn TextReader>, BackendError>;
}

/// A loaded backend instance bound to one language set.
#[async_trait]
pub trait TextReader: Send + Sync {
    /// Detect text in the image file at `image`.
    async fn read_text(&self, image: &Path) -> Result<Vec<RawDetection>>;
}
