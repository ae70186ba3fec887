//! External extraction collaborators.
//!
//! OCR, office conversion, PDF rendering, and metadata reading are performed
//! by external programs. Each concern is a small trait with one
//! implementation per tool, so the pipeline depends only on "given a file of
//! kind K, produce text/metadata" — substituting a tool (or mocking one in
//! tests) never touches the core.
//!
//! Every invocation runs under a wall-clock timeout: one hung converter must
//! not stall the whole batch.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;

/// Run an external program, capturing stdout. Errors on non-zero exit,
/// missing binary, or timeout.
async fn run_tool(program: &str, args: &[String], timeout: Duration) -> Result<Vec<u8>> {
    debug!(%program, ?args, "invoking external tool");
    let fut = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .output();
    let output = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.with_context(|| format!("failed to invoke '{}'", program))?,
        Err(_) => bail!("'{}' timed out after {:?}", program, timeout),
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            stderr.chars().take(200).collect::<String>()
        );
    }
    Ok(output.stdout)
}

fn stdout_lines(stdout: Vec<u8>) -> Vec<String> {
    String::from_utf8_lossy(&stdout)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

// ─── OCR ────────────────────────────────────────────────────────────────

/// Optical character recognition over a raster image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(&self, image: &Path) -> Result<Vec<String>>;
}

/// Tesseract, reading recognized text from stdout.
pub struct Tesseract {
    program: String,
    languages: String,
    timeout: Duration,
}

#[async_trait]
impl OcrEngine for Tesseract {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &Path) -> Result<Vec<String>> {
        let args = vec![
            image.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "-l".to_string(),
            self.languages.clone(),
        ];
        let stdout = run_tool(&self.program, &args, self.timeout).await?;
        Ok(stdout_lines(stdout))
    }
}

// ─── Document conversion ────────────────────────────────────────────────

/// Converts a document to plain text.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    fn name(&self) -> &str;
    async fn to_text(&self, path: &Path) -> Result<Vec<String>>;
}

/// LibreOffice headless conversion, for legacy binary office formats.
/// Writes into a scratch directory, then reads the produced `.txt` back.
pub struct LibreOffice {
    program: String,
    timeout: Duration,
}

#[async_trait]
impl DocumentConverter for LibreOffice {
    fn name(&self) -> &str {
        "libreoffice"
    }

    async fn to_text(&self, path: &Path) -> Result<Vec<String>> {
        let scratch = tempfile::Builder::new()
            .prefix("reclaim-convert-")
            .tempdir()
            .context("failed to create conversion scratch dir")?;
        let args = vec![
            "--headless".to_string(),
            "--convert-to".to_string(),
            "txt:Text (encoded):UTF8".to_string(),
            "--outdir".to_string(),
            scratch.path().to_string_lossy().into_owned(),
            path.to_string_lossy().into_owned(),
        ];
        run_tool(&self.program, &args, self.timeout).await?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = scratch.path().join(format!("{}.txt", stem));
        let content = std::fs::read(&produced)
            .with_context(|| format!("conversion produced no output: {}", produced.display()))?;
        Ok(stdout_lines(content))
    }
}

/// Pandoc plain-text conversion, for markup formats (rtf, html, odt).
pub struct Pandoc {
    program: String,
    timeout: Duration,
}

#[async_trait]
impl DocumentConverter for Pandoc {
    fn name(&self) -> &str {
        "pandoc"
    }

    async fn to_text(&self, path: &Path) -> Result<Vec<String>> {
        let args = vec![
            "-t".to_string(),
            "plain".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let stdout = run_tool(&self.program, &args, self.timeout).await?;
        Ok(stdout_lines(stdout))
    }
}

// ─── PDF rendering ──────────────────────────────────────────────────────

/// Renders the first page of a PDF to an image, feeding the OCR path for
/// scanned documents with no text layer.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    fn name(&self) -> &str;
    async fn render_first_page(&self, pdf: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// `mutool convert` at 300 dpi. mutool appends the page number to the
/// output stem, so `page.png` comes back as `page1.png`.
pub struct Mutool {
    program: String,
    timeout: Duration,
}

#[async_trait]
impl PdfRenderer for Mutool {
    fn name(&self) -> &str {
        "mutool"
    }

    async fn render_first_page(&self, pdf: &Path, out_dir: &Path) -> Result<PathBuf> {
        let out = out_dir.join("page.png");
        let args = vec![
            "convert".to_string(),
            "-o".to_string(),
            out.to_string_lossy().into_owned(),
            "-O".to_string(),
            "resolution=300".to_string(),
            pdf.to_string_lossy().into_owned(),
            "1".to_string(),
        ];
        run_tool(&self.program, &args, self.timeout).await?;

        let rendered = out_dir.join("page1.png");
        if rendered.is_file() {
            return Ok(rendered);
        }
        if out.is_file() {
            return Ok(out);
        }
        bail!("'{}' produced no page image", self.program)
    }
}

// ─── Metadata ───────────────────────────────────────────────────────────

/// Reads embedded metadata fields (title, author, creation date, …).
#[async_trait]
pub trait MetadataReader: Send + Sync {
    fn name(&self) -> &str;
    async fn read(&self, path: &Path) -> Result<BTreeMap<String, String>>;
}

/// exiftool with `-S` (Tag: value lines) and dates normalized to `%Y:%m:%d`.
pub struct Exiftool {
    program: String,
    timeout: Duration,
}

#[async_trait]
impl MetadataReader for Exiftool {
    fn name(&self) -> &str {
        "exiftool"
    }

    async fn read(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let args = vec![
            "-S".to_string(),
            "-d".to_string(),
            "%Y:%m:%d".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let stdout = run_tool(&self.program, &args, self.timeout).await?;
        let mut fields = BTreeMap::new();
        for line in String::from_utf8_lossy(&stdout).lines() {
            if let Some((tag, value)) = line.split_once(':') {
                let value = value.trim();
                if !value.is_empty() {
                    fields.insert(tag.trim().to_string(), value.to_string());
                }
            }
        }
        Ok(fields)
    }
}

// ─── Toolbox ────────────────────────────────────────────────────────────

/// The external collaborators available to the extractor. `None` means the
/// tool is disabled (empty program name in config) — formats depending on it
/// degrade to a strategy failure, never a batch failure.
pub struct Toolbox {
    pub metadata: Option<Box<dyn MetadataReader>>,
    pub ocr: Option<Box<dyn OcrEngine>>,
    pub office_converter: Option<Box<dyn DocumentConverter>>,
    pub markup_converter: Option<Box<dyn DocumentConverter>>,
    pub pdf_renderer: Option<Box<dyn PdfRenderer>>,
}

impl Toolbox {
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.limits.tool_timeout_secs);
        let tools = &config.tools;
        Self {
            metadata: non_empty(&tools.exiftool).map(|program| {
                Box::new(Exiftool { program, timeout }) as Box<dyn MetadataReader>
            }),
            ocr: non_empty(&tools.tesseract).map(|program| {
                Box::new(Tesseract {
                    program,
                    languages: tools.ocr_languages.clone(),
                    timeout,
                }) as Box<dyn OcrEngine>
            }),
            office_converter: non_empty(&tools.libreoffice).map(|program| {
                Box::new(LibreOffice { program, timeout }) as Box<dyn DocumentConverter>
            }),
            markup_converter: non_empty(&tools.pandoc).map(|program| {
                Box::new(Pandoc { program, timeout }) as Box<dyn DocumentConverter>
            }),
            pdf_renderer: non_empty(&tools.mutool).map(|program| {
                Box::new(Mutool { program, timeout }) as Box<dyn PdfRenderer>
            }),
        }
    }

    /// No external tools at all — in-process strategies only. Tests use this
    /// (optionally swapping individual fields for mocks).
    #[allow(dead_code)]
    pub fn empty() -> Self {
        Self {
            metadata: None,
            ocr: None,
            office_converter: None,
            markup_converter: None,
            pdf_renderer: None,
        }
    }
}

fn non_empty(program: &str) -> Option<String> {
    let trimmed = program.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_error_not_a_panic() {
        let err = run_tool(
            "reclaim-test-no-such-binary",
            &["--version".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("reclaim-test-no-such-binary"));
    }

    #[test]
    fn disabled_tools_are_none() {
        let mut config = Config::default();
        config.tools.exiftool = String::new();
        config.tools.tesseract = "  ".to_string();
        let toolbox = Toolbox::from_config(&config);
        assert!(toolbox.metadata.is_none());
        assert!(toolbox.ocr.is_none());
        assert!(toolbox.office_converter.is_some());
    }
}
