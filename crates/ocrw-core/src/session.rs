use crate::protocol::{DependencyReport, Detection, UNKNOWN_VERSION};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use ocrw_backend::{BackendError, OcrBackend, TextReader};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

const STAGED_PREFIX: &str = "ocrw-";
const STAGED_SUFFIX: &str = ".png";

/// Standard alphabet with padding. Non-zero trailing bits are accepted.
const IMAGE_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Why a detect request failed. `Display` is the message sent to the host.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("{0}")]
    NotInstalled(BackendError),
    #[error("Failed to initialize OCR reader: {0}")]
    Initialization(BackendError),
    #[error("Invalid base64 image data: {0}")]
    InvalidImage(#[from] base64::DecodeError),
    #[error("OCR detection failed: {0}")]
    Staging(#[source] std::io::Error),
    #[error("OCR detection failed: {0:#}")]
    Recognition(anyhow::Error),
}

impl From<BackendError> for DetectError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotInstalled { .. } => DetectError::NotInstalled(err),
            other => DetectError::Initialization(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("{0}")]
    NotInstalled(BackendError),
    #[error("OCR dependency check failed: {0}")]
    Probe(BackendError),
}

struct LoadedReader {
    languages: Vec<String>,
    reader: Box<dyn TextReader>,
}

/// The worker's one backend instance and the language set it was built for.
///
/// Starts empty. The first detect loads a reader; later detects reuse it while
/// the requested languages match exactly (order matters) and rebuild it when
/// they don't. A failed load leaves the session empty.
pub struct BackendSession<B> {
    backend: B,
    loaded: Option<LoadedReader>,
    staging_dir: Option<PathBuf>,
}

impl<B: OcrBackend> BackendSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: None,
            staging_dir: None,
        }
    }

    /// Stage images under `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    /// Languages of the currently loaded reader, if any.
    pub fn loaded_languages(&self) -> Option<&[String]> {
        self.loaded.as_ref().map(|l| l.languages.as_slice())
    }

    /// Run one detection: load or reuse the reader, decode, stage, read, clean up.
    pub async fn detect(
        &mut self,
        languages: &[String],
        image_data: &str,
    ) -> Result<Vec<Detection>, DetectError> {
        let reader = Self::ensure_loaded(&self.backend, &mut self.loaded, languages).await?;

        let bytes = decode_image(image_data)?;
        let staged =
            stage_image(self.staging_dir.as_deref(), &bytes).map_err(DetectError::Staging)?;
        debug!(
            "Staged {} image bytes at {}",
            bytes.len(),
            staged.path().display()
        );

        let outcome = reader.read_text(staged.path()).await;

        let staged_path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            warn!(
                "Failed to remove staged image {}: {}",
                staged_path.display(),
                e
            );
        }

        let raw = outcome.map_err(|e| {
            error!("OCR detection failed: {:#}", e);
            DetectError::Recognition(e)
        })?;

        Ok(raw.into_iter().map(Detection::from).collect())
    }

    /// Report whether the backend is installed, without loading a reader.
    pub async fn check_dependencies(&self) -> Result<DependencyReport, DependencyError> {
        let info = self.backend.probe().await.map_err(|e| match e {
            BackendError::NotInstalled { .. } => DependencyError::NotInstalled(e),
            other => DependencyError::Probe(other),
        })?;

        Ok(DependencyReport {
            version: info.version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            available_languages: Vec::new(),
        })
    }

    async fn ensure_loaded<'a>(
        backend: &B,
        slot: &'a mut Option<LoadedReader>,
        languages: &[String],
    ) -> Result<&'a dyn TextReader, BackendError> {
        let loaded = match slot.take() {
            Some(current) if current.languages == languages => current,
            previous => {
                if let Some(previous) = previous {
                    debug!(
                        "Language set changed from {:?} to {:?}, dropping {} reader",
                        previous.languages,
                        languages,
                        backend.name()
                    );
                }

                let reader = backend.load(languages, false).await.map_err(|e| {
                    error!("Failed to initialize {} reader: {}", backend.name(), e);
                    e
                })?;
                info!(
                    "{} reader initialized with languages: {:?}",
                    backend.name(),
                    languages
                );
                LoadedReader {
                    languages: languages.to_vec(),
                    reader,
                }
            }
        };

        Ok(slot.insert(loaded).reader.as_ref())
    }
}

fn decode_image(image_data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    // Hosts sometimes wrap long base64 payloads
    let compact: String = image_data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    IMAGE_BASE64.decode(compact)
}

/// Write `bytes` to a fresh, uniquely named file owned by the caller.
fn stage_image(dir: Option<&Path>, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(STAGED_PREFIX).suffix(STAGED_SUFFIX);

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
