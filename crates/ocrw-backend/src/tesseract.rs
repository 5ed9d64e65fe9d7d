use super::{languages, BackendError, BackendInfo, OcrBackend, RawDetection, TextReader};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

const LIBRARY: &str = "Tesseract OCR";

const INSTALL_HINT: &str = "sudo apt-get install tesseract-ocr (Ubuntu/Debian), \
    sudo yum install tesseract (RHEL/CentOS), brew install tesseract (macOS)";

/// Word-level rows in tesseract's TSV output
const TSV_WORD_LEVEL: &str = "5";

/// Tesseract OCR engine driven through its command line.
///
/// Loading a reader only checks that the requested traineddata is installed;
/// each detection spawns one `tesseract` process.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    binary: String,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_dir: None,
        }
    }

    pub fn with_tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tessdata_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    fn add_tessdata_dir(&self, cmd: &mut Command) {
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
    }

    /// Run tesseract to completion, mapping a missing executable to `NotInstalled`.
    async fn run(&self, mut cmd: Command) -> Result<Output, BackendError> {
        cmd.output().await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BackendError::NotInstalled {
                    library: LIBRARY.to_string(),
                    install_hint: INSTALL_HINT.to_string(),
                }
            } else {
                BackendError::Other(
                    anyhow::Error::new(e).context(format!("Failed to run {}", self.binary)),
                )
            }
        })
    }

    async fn installed_languages(&self) -> Result<HashSet<String>, BackendError> {
        let mut cmd = self.command();
        cmd.arg("--list-langs");
        self.add_tessdata_dir(&mut cmd);

        let output = self.run(cmd).await?;
        if !output.status.success() {
            return Err(BackendError::Initialization(format!(
                "tesseract --list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // Older releases print the list on stderr
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_language_list(&text))
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn name(&self) -> &str {
        "Tesseract OCR"
    }

    async fn probe(&self) -> Result<BackendInfo, BackendError> {
        let mut cmd = self.command();
        cmd.arg("--version");

        let output = self.run(cmd).await?;
        if !output.status.success() {
            return Err(BackendError::Other(anyhow::anyhow!(
                "tesseract --version exited with {}",
                output.status
            )));
        }

        let version = parse_version(&String::from_utf8_lossy(&output.stdout))
            .or_else(|| parse_version(&String::from_utf8_lossy(&output.stderr)));
        Ok(BackendInfo { version })
    }

    async fn load(
        &self,
        requested: &[String],
        gpu: bool,
    ) -> Result<Box<dyn TextReader>, BackendError> {
        if requested.is_empty() {
            return Err(BackendError::Initialization(
                "at least one language is required".to_string(),
            ));
        }
        if gpu {
            debug!("tesseract has no GPU support, running on CPU");
        }

        let lang_arg = languages::tesseract_arg(requested);
        let installed = self.installed_languages().await?;
        let missing: Vec<&str> = lang_arg
            .split('+')
            .filter(|lang| !installed.contains(*lang))
            .collect();

        if !missing.is_empty() {
            return Err(BackendError::Initialization(format!(
                "language data not installed: {}",
                missing.join(", ")
            )));
        }

        info!("Tesseract reader ready for languages: {}", lang_arg);
        Ok(Box::new(TesseractReader {
            backend: self.clone(),
            lang_arg,
        }))
    }
}

/// A tesseract invocation bound to one `-l` argument.
struct TesseractReader {
    backend: TesseractBackend,
    lang_arg: String,
}

#[async_trait]
impl TextReader for TesseractReader {
    async fn read_text(&self, image: &Path) -> Result<Vec<RawDetection>> {
        // Use tesseract CLI with TSV output to get bounding boxes
        let mut cmd = self.backend.command();
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang_arg);
        self.backend.add_tessdata_dir(&mut cmd);
        cmd.arg("tsv");

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.backend.binary))?;

        if !output.status.success() {
            anyhow::bail!(
                "Tesseract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// `tesseract 5.3.0` -> `5.3.0`
fn parse_version(text: &str) -> Option<String> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let version = first.strip_prefix("tesseract")?.trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

fn parse_language_list(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

fn parse_tsv(tsv: &str) -> Vec<RawDetection> {
    let mut detections = Vec::new();

    // TSV format: level, page_num, block_num, par_num, line_num, word_num,
    //             left, top, width, height, conf, text
    for line in tsv.lines().skip(1) {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 12 || parts[0] != TSV_WORD_LEVEL {
            continue;
        }

        if let (Ok(x), Ok(y), Ok(w), Ok(h), Ok(conf)) = (
            parts[6].parse::<f64>(),
            parts[7].parse::<f64>(),
            parts[8].parse::<f64>(),
            parts[9].parse::<f64>(),
            parts[10].parse::<f64>(),
        ) {
            let text = parts[11].trim();
            if text.is_empty() {
                continue;
            }

            // Clockwise from top-left
            let bbox = vec![[x, y], [x + w, y], [x + w, y + h], [x, y + h]];
            detections.push(RawDetection::new(bbox, text, conf / 100.0));
        }
    }

    detections
}
