//! Format-dispatched extraction: raw file bytes → text lines + metadata.
//!
//! Dispatch is decided by content sniffing ([`crate::sniff`]). PDF and OOXML
//! text is extracted in-process; legacy office formats, images, and scanned
//! PDFs go through the external collaborators in [`crate::tools`]. Metadata
//! is pulled independently of text, so either side can fail alone.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::models::{ExtractionResult, FormatKind};
use crate::sniff;
use crate::tools::Toolbox;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Embedded PDF text shorter than this is assumed to be a scan artifact and
/// retried through OCR.
const PDF_TEXT_MIN_CHARS: usize = 20;

/// What one extraction strategy produced: lines of text plus any metadata
/// the format itself carries (OOXML core properties, archive entry dates,
/// mbox headers).
#[derive(Debug, Default)]
struct StrategyOutput {
    lines: Vec<String>,
    metadata: BTreeMap<String, String>,
}

pub struct FormatExtractor {
    toolbox: Arc<Toolbox>,
    max_lines: usize,
    force_pdf_ocr: bool,
}

impl FormatExtractor {
    pub fn new(toolbox: Arc<Toolbox>, config: &Config) -> Self {
        Self {
            toolbox,
            max_lines: config.limits.max_lines,
            force_pdf_ocr: config.tools.force_pdf_ocr,
        }
    }

    /// Extract text and metadata from an arbitrary file. Never errors: a
    /// fully failed extraction comes back with empty text/metadata and the
    /// failure detail, and downstream stages degrade to fallback naming.
    pub async fn extract(&self, path: &Path) -> ExtractionResult {
        let kind = match sniff::sniff(path) {
            Ok(kind) => kind,
            Err(e) => {
                return ExtractionResult::failed(
                    FormatKind::Unknown,
                    format!("cannot read file: {}", e),
                )
            }
        };
        debug!(file = %path.display(), %kind, "extracting");

        let mut errors: Vec<String> = Vec::new();

        let (mut lines, mut metadata, text_ok) = match self.text_for(path, kind).await {
            Ok(output) => (output.lines, output.metadata, true),
            Err(e) => {
                errors.push(format!("text: {:#}", e));
                (Vec::new(), BTreeMap::new(), false)
            }
        };
        lines.truncate(self.max_lines);
        for line in &mut lines {
            while line.ends_with('\r') {
                line.pop();
            }
        }

        // Embedded metadata is read even when text extraction failed, and
        // vice versa. Format-specific fields win over exiftool's.
        let mut metadata_ok = true;
        if let Some(reader) = &self.toolbox.metadata {
            match reader.read(path).await {
                Ok(fields) => {
                    for (tag, value) in fields {
                        metadata.entry(tag).or_insert(value);
                    }
                }
                Err(e) => {
                    errors.push(format!("metadata ({}): {:#}", reader.name(), e));
                    metadata_ok = !metadata.is_empty();
                }
            }
        }

        ExtractionResult {
            kind,
            lines,
            metadata,
            text_ok,
            metadata_ok,
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }

    async fn text_for(&self, path: &Path, kind: FormatKind) -> Result<StrategyOutput> {
        match kind {
            FormatKind::Pdf => self.pdf_text(path).await,
            FormatKind::OfficeOpenXml => ooxml_extract(path),
            FormatKind::OfficeLegacy => self.convert_office(path).await,
            FormatKind::OpenDocument | FormatKind::Rtf | FormatKind::Html => {
                self.convert_markup(path).await
            }
            FormatKind::PlainText => read_text(path, self.max_lines),
            FormatKind::Mbox => read_mbox(path, self.max_lines),
            FormatKind::Zip => zip_listing(path, self.max_lines),
            FormatKind::Tar => tar_listing(path, self.max_lines),
            FormatKind::Image => self.ocr_image(path).await,
            FormatKind::Unknown => bail!("unsupported format"),
        }
    }

    /// Embedded text layer first; OCR of the rendered first page when the
    /// layer is missing or suspiciously short (scanned documents).
    async fn pdf_text(&self, path: &Path) -> Result<StrategyOutput> {
        let embedded = if self.force_pdf_ocr {
            None
        } else {
            let bytes = std::fs::read(path)?;
            match pdf_extract::extract_text_from_mem(&bytes) {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "pdf text layer unreadable");
                    None
                }
            }
        };

        if let Some(text) = &embedded {
            if text.trim().len() > PDF_TEXT_MIN_CHARS {
                return Ok(StrategyOutput {
                    lines: text.lines().map(|l| l.to_string()).collect(),
                    metadata: BTreeMap::new(),
                });
            }
        }

        match self.ocr_pdf(path).await {
            Ok(output) => Ok(output),
            Err(ocr_err) => match embedded {
                // A short text layer beats nothing when OCR is unavailable.
                Some(text) if !text.trim().is_empty() => Ok(StrategyOutput {
                    lines: text.lines().map(|l| l.to_string()).collect(),
                    metadata: BTreeMap::new(),
                }),
                _ => Err(ocr_err),
            },
        }
    }

    async fn ocr_pdf(&self, path: &Path) -> Result<StrategyOutput> {
        let renderer = self
            .toolbox
            .pdf_renderer
            .as_ref()
            .context("no PDF renderer configured")?;
        let ocr = self.toolbox.ocr.as_ref().context("no OCR engine configured")?;
        let scratch = tempfile::Builder::new()
            .prefix("reclaim-ocr-")
            .tempdir()
            .context("failed to create OCR scratch dir")?;
        let image = renderer.render_first_page(path, scratch.path()).await?;
        let lines = ocr.recognize(&image).await?;
        Ok(StrategyOutput {
            lines,
            metadata: BTreeMap::new(),
        })
    }

    async fn ocr_image(&self, path: &Path) -> Result<StrategyOutput> {
        let ocr = self.toolbox.ocr.as_ref().context("no OCR engine configured")?;
        let lines = ocr.recognize(path).await?;
        Ok(StrategyOutput {
            lines,
            metadata: BTreeMap::new(),
        })
    }

    async fn convert_office(&self, path: &Path) -> Result<StrategyOutput> {
        let converter = self
            .toolbox
            .office_converter
            .as_ref()
            .context("no office converter configured")?;
        let lines = converter.to_text(path).await?;
        Ok(StrategyOutput {
            lines,
            metadata: BTreeMap::new(),
        })
    }

    async fn convert_markup(&self, path: &Path) -> Result<StrategyOutput> {
        // Pandoc handles the markup family; LibreOffice is the fallback.
        if let Some(converter) = &self.toolbox.markup_converter {
            match converter.to_text(path).await {
                Ok(lines) => {
                    return Ok(StrategyOutput {
                        lines,
                        metadata: BTreeMap::new(),
                    })
                }
                Err(e) => debug!(error = %e, "pandoc failed, trying office converter"),
            }
        }
        self.convert_office(path).await
    }
}

// ─── In-process strategies ──────────────────────────────────────────────

fn read_text(path: &Path, max_lines: usize) -> Result<StrategyOutput> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(StrategyOutput {
        lines: text.lines().take(max_lines).map(|l| l.to_string()).collect(),
        metadata: BTreeMap::new(),
    })
}

/// Plain-text read plus promotion of the first `Date:` header, so mailboxes
/// date themselves even when the body carries no date.
fn read_mbox(path: &Path, max_lines: usize) -> Result<StrategyOutput> {
    let mut output = read_text(path, max_lines)?;
    if let Some(date) = output
        .lines
        .iter()
        .find_map(|l| l.strip_prefix("Date: "))
        .map(|d| d.trim().to_string())
    {
        output.metadata.insert("MboxDate".to_string(), date);
    }
    Ok(output)
}

/// Entry names as a weak text proxy, plus the first entry's timestamp.
/// Full recursive extraction is deliberately not attempted.
fn zip_listing(path: &Path, max_lines: usize) -> Result<StrategyOutput> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).context("unreadable zip archive")?;
    let mut output = StrategyOutput::default();
    for i in 0..archive.len().min(max_lines) {
        let entry = archive.by_index(i).context("unreadable zip entry")?;
        if i == 0 {
            if let Some(modified) = entry.last_modified() {
                output.metadata.insert(
                    "ZipModifyDate".to_string(),
                    format!(
                        "{:04}:{:02}:{:02}",
                        modified.year(),
                        modified.month(),
                        modified.day()
                    ),
                );
            }
        }
        output.lines.push(entry.name().to_string());
    }
    Ok(output)
}

fn tar_listing(path: &Path, max_lines: usize) -> Result<StrategyOutput> {
    let file = std::fs::File::open(path)?;
    let mut archive = tar::Archive::new(file);
    let mut output = StrategyOutput::default();
    for (i, entry) in archive.entries()?.enumerate() {
        if i >= max_lines {
            break;
        }
        let entry = entry.context("unreadable tar entry")?;
        if i == 0 {
            if let Ok(mtime) = entry.header().mtime() {
                if let Some(dt) = chrono::DateTime::from_timestamp(mtime as i64, 0) {
                    output
                        .metadata
                        .insert("TarModifyDate".to_string(), dt.format("%Y:%m:%d").to_string());
                }
            }
        }
        output
            .lines
            .push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(output)
}

// ─── OOXML (docx / pptx / xlsx) ─────────────────────────────────────────

/// Text from the document part(s) plus `docProps/core.xml` properties.
fn ooxml_extract(path: &Path) -> Result<StrategyOutput> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).context("unreadable OOXML container")?;
    let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();

    let mut output = StrategyOutput::default();

    if names.iter().any(|n| n == "word/document.xml") {
        let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
        output.lines = xml_text_lines(&xml, b"p")?;
    } else if names.iter().any(|n| n.starts_with("ppt/slides/slide")) {
        let mut slides: Vec<&String> = names
            .iter()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .collect();
        slides.sort_by_key(|name| {
            name.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        });
        for name in slides {
            let xml = read_zip_entry_bounded(&mut archive, name)?;
            output.lines.extend(xml_text_lines(&xml, b"p")?);
        }
    } else if names.iter().any(|n| n == "xl/sharedStrings.xml") {
        // Shared strings carry the workbook's text content; one cell string
        // per line is plenty for title/date inference.
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
        output.lines = xml_text_lines(&xml, b"si")?;
    }

    if names.iter().any(|n| n == "docProps/core.xml") {
        let xml = read_zip_entry_bounded(&mut archive, "docProps/core.xml")?;
        output.metadata = core_properties(&xml)?;
    }

    Ok(output)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::fs::File>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("missing OOXML part: {}", name))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .with_context(|| format!("unreadable OOXML part: {}", name))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        bail!("OOXML part {} exceeds size limit", name);
    }
    Ok(out)
}

/// Collect the text inside `<…:t>` elements, starting a new line at the end
/// of each paragraph-like element (`p` for docx/pptx runs, `si` for xlsx
/// shared strings).
fn xml_text_lines(xml: &[u8], paragraph_tag: &[u8]) -> Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = false;
                } else if e.local_name().as_ref() == paragraph_tag {
                    if !current.trim().is_empty() {
                        lines.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("malformed OOXML xml: {}", e),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        lines.push(current);
    }
    Ok(lines)
}

/// `docProps/core.xml` → exiftool-style field names, dates normalized to
/// `%Y:%m:%d` (dcterms values look like `2019-03-15T10:00:00Z`).
fn core_properties(xml: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut fields = BTreeMap::new();
    let mut current_tag: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                current_tag = match e.local_name().as_ref() {
                    b"title" => Some("Title".to_string()),
                    b"creator" => Some("Creator".to_string()),
                    b"created" => Some("CreateDate".to_string()),
                    b"modified" => Some("ModifyDate".to_string()),
                    _ => None,
                };
            }
            Ok(quick_xml::events::Event::Text(t)) => {
                if let Some(tag) = current_tag.take() {
                    let raw = t.unescape().unwrap_or_default().into_owned();
                    let value = if tag.ends_with("Date") {
                        raw.split('T').next().unwrap_or(&raw).replace('-', ":")
                    } else {
                        raw
                    };
                    if !value.is_empty() {
                        fields.insert(tag, value);
                    }
                }
            }
            Ok(quick_xml::events::Event::End(_)) => {
                current_tag = None;
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("malformed core.xml: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(fields)
}
