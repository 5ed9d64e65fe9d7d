//! Mock OCR backend for testing
//!
//! A scriptable backend that never touches a real engine. It counts reader
//! loads, records every image handed to a reader (path plus the bytes that
//! were on disk at the time) and can simulate the failure modes of a real
//! backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use ocrw_backend::mock::MockBackend;
//! use ocrw_backend::RawDetection;
//!
//! let backend = MockBackend::new()
//!     .with_version("1.2.3")
//!     .with_detections(vec![RawDetection::new(vec![[0.0, 0.0]; 4], "hi", 0.9)]);
//! let probe = backend.clone(); // shares state; inspect after the worker runs
//! assert_eq!(probe.load_count(), 0);
//! ```

use crate::{BackendError, BackendInfo, OcrBackend, RawDetection, TextReader};
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One call to a mock reader
#[derive(Debug, Clone)]
pub struct ReadCall {
    pub path: PathBuf,
    /// Languages of the reader that served the call
    pub languages: Vec<String>,
    /// File contents at call time, `None` if the file could not be read
    pub contents: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
enum ReadBehavior {
    Detections(Vec<RawDetection>),
    Fail(String),
    Panic(String),
}

#[derive(Debug)]
struct MockState {
    installed: bool,
    version: Option<String>,
    version_failure: Option<String>,
    load_failure: Option<String>,
    read: ReadBehavior,
    loads: Vec<(Vec<String>, bool)>,
    probes: usize,
    reads: Vec<ReadCall>,
}

/// Cloning shares state, so a test can keep a handle while the worker owns another.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Installed backend with no version, returning no detections
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                installed: true,
                version: None,
                version_failure: None,
                load_failure: None,
                read: ReadBehavior::Detections(Vec::new()),
                loads: Vec::new(),
                probes: 0,
                reads: Vec::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking reader poisons nothing we care about
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Builder: report this version from `probe`
    pub fn with_version(self, version: &str) -> Self {
        self.state().version = Some(version.to_string());
        self
    }

    /// Builder: detections every reader returns
    pub fn with_detections(self, detections: Vec<RawDetection>) -> Self {
        self.state().read = ReadBehavior::Detections(detections);
        self
    }

    /// Builder: behave as if the backend library is missing
    pub fn not_installed(self) -> Self {
        self.state().installed = false;
        self
    }

    /// Builder: fail the version query with a fault other than "not installed"
    pub fn failing_version_query(self, message: &str) -> Self {
        self.state().version_failure = Some(message.to_string());
        self
    }

    /// Builder: make every `load` fail with an initialization error
    pub fn failing_load(self, message: &str) -> Self {
        self.state().load_failure = Some(message.to_string());
        self
    }

    /// Builder: make every `read_text` fail
    pub fn failing_read(self, message: &str) -> Self {
        self.state().read = ReadBehavior::Fail(message.to_string());
        self
    }

    /// Builder: make every `read_text` panic
    pub fn panicking_read(self, message: &str) -> Self {
        self.state().read = ReadBehavior::Panic(message.to_string());
        self
    }

    /// Clear a load failure set earlier, e.g. to test a retry
    pub fn set_load_failure(&self, message: Option<&str>) {
        self.state().load_failure = message.map(str::to_string);
    }

    /// Number of `load` calls, successful or not
    pub fn load_count(&self) -> usize {
        self.state().loads.len()
    }

    /// Language sets passed to `load`, in call order
    pub fn loaded_languages(&self) -> Vec<Vec<String>> {
        self.state().loads.iter().map(|(l, _)| l.clone()).collect()
    }

    /// Whether any `load` asked for GPU acceleration
    pub fn gpu_requested(&self) -> bool {
        self.state().loads.iter().any(|(_, gpu)| *gpu)
    }

    pub fn probe_count(&self) -> usize {
        self.state().probes
    }

    pub fn reads(&self) -> Vec<ReadCall> {
        self.state().reads.clone()
    }

    fn not_installed_error() -> BackendError {
        BackendError::NotInstalled {
            library: "MockOCR".to_string(),
            install_hint: "cargo add mock-ocr".to_string(),
        }
    }
}

#[async_trait]
impl OcrBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock OCR"
    }

    async fn probe(&self) -> Result<BackendInfo, BackendError> {
        let mut state = self.state();
        state.probes += 1;
        if !state.installed {
            return Err(Self::not_installed_error());
        }
        if let Some(message) = &state.version_failure {
            return Err(BackendError::Other(anyhow::anyhow!("{}", message)));
        }
        Ok(BackendInfo {
            version: state.version.clone(),
        })
    }

    async fn load(
        &self,
        languages: &[String],
        gpu: bool,
    ) -> Result<Box<dyn TextReader>, BackendError> {
        let mut state = self.state();
        state.loads.push((languages.to_vec(), gpu));

        if !state.installed {
            return Err(Self::not_installed_error());
        }
        if let Some(message) = &state.load_failure {
            return Err(BackendError::Initialization(message.clone()));
        }
        if languages.is_empty() {
            return Err(BackendError::Initialization(
                "no languages requested".to_string(),
            ));
        }

        Ok(Box::new(MockReader {
            languages: languages.to_vec(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockReader {
    languages: Vec<String>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl TextReader for MockReader {
    async fn read_text(&self, image: &Path) -> Result<Vec<RawDetection>> {
        let behavior = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.reads.push(ReadCall {
                path: image.to_path_buf(),
                languages: self.languages.clone(),
                contents: std::fs::read(image).ok(),
            });
            state.read.clone()
        };

        match behavior {
            ReadBehavior::Detections(detections) => Ok(detections),
            ReadBehavior::Fail(message) => anyhow::bail!("{}", message),
            ReadBehavior::Panic(message) => panic!("{}", message),
        }
    }
}
