use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Where extracted text artifacts are stored between runs.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".reclaim-cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Append-only operation log (JSON lines).
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("reclaim-log.jsonl")
}

/// Order to assume for ambiguous numeric dates like `03/04/2018`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DateOrder {
    Dmy,
    Mdy,
    Ymd,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocaleConfig {
    /// Languages whose month-name tables are active (`"en"`, `"fr"`).
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Extra month names: twelve-entry tables for languages reclaim does not
    /// ship tables for. Each table lists January..December in order.
    #[serde(default)]
    pub extra_months: Vec<Vec<String>>,

    /// Defaults to DMY when `fr` is active, YMD otherwise (matching how the
    /// respective locales usually write short dates).
    #[serde(default)]
    pub date_order: Option<DateOrder>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            extra_months: Vec::new(),
            date_order: None,
        }
    }
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

impl LocaleConfig {
    pub fn effective_date_order(&self) -> DateOrder {
        self.date_order.unwrap_or({
            if self.languages.iter().any(|l| l == "fr") {
                DateOrder::Dmy
            } else {
                DateOrder::Ymd
            }
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Years below this are treated as OCR noise, never as document dates.
    #[serde(default = "default_min_year")]
    pub min_year: i32,

    /// Upper bound for plausible dates (YYYY-MM-DD). Defaults to today.
    /// Set this to the day of the crash for best results on carved trees.
    #[serde(default)]
    pub max_date: Option<NaiveDate>,

    /// Lines of extracted text kept and scanned for dates.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Non-empty lines considered when guessing a title.
    #[serde(default = "default_title_scan_lines")]
    pub title_scan_lines: usize,

    /// Length cap for sanitized title tokens.
    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,

    /// Wall-clock budget for a single external tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Overall extraction budget per file (tools, OCR, conversions included).
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,

    /// Concurrent extractions. Placement is always serialized.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Use the filesystem mtime when neither metadata nor text yields a date.
    /// Disable for photorec output, where mtimes were reset by the recovery.
    #[serde(default = "default_true")]
    pub mtime_fallback: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_year: default_min_year(),
            max_date: None,
            max_lines: default_max_lines(),
            title_scan_lines: default_title_scan_lines(),
            title_max_len: default_title_max_len(),
            tool_timeout_secs: default_tool_timeout_secs(),
            file_timeout_secs: default_file_timeout_secs(),
            concurrency: default_concurrency(),
            mtime_fallback: true,
        }
    }
}

fn default_min_year() -> i32 {
    1900
}
fn default_max_lines() -> usize {
    200
}
fn default_title_scan_lines() -> usize {
    12
}
fn default_title_max_len() -> usize {
    100
}
fn default_tool_timeout_secs() -> u64 {
    60
}
fn default_file_timeout_secs() -> u64 {
    300
}
fn default_concurrency() -> usize {
    4
}
fn default_true() -> bool {
    true
}

impl LimitsConfig {
    /// Effective upper bound for plausible dates.
    pub fn effective_max_date(&self) -> NaiveDate {
        self.max_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Applied when an input argument is a directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

/// Program names for the external extraction collaborators. An empty string
/// disables that tool; extraction then degrades per format.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_exiftool")]
    pub exiftool: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_libreoffice")]
    pub libreoffice: String,
    #[serde(default = "default_pandoc")]
    pub pandoc: String,
    #[serde(default = "default_mutool")]
    pub mutool: String,
    /// Tesseract language pack(s), e.g. `"fra+eng"`.
    #[serde(default = "default_ocr_languages")]
    pub ocr_languages: String,
    /// Always OCR PDFs instead of trying the embedded text layer first.
    #[serde(default)]
    pub force_pdf_ocr: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exiftool: default_exiftool(),
            tesseract: default_tesseract(),
            libreoffice: default_libreoffice(),
            pandoc: default_pandoc(),
            mutool: default_mutool(),
            ocr_languages: default_ocr_languages(),
            force_pdf_ocr: false,
        }
    }
}

fn default_exiftool() -> String {
    "exiftool".to_string()
}
fn default_tesseract() -> String {
    "tesseract".to_string()
}
fn default_libreoffice() -> String {
    "libreoffice".to_string()
}
fn default_pandoc() -> String {
    "pandoc".to_string()
}
fn default_mutool() -> String {
    "mutool".to_string()
}
fn default_ocr_languages() -> String {
    "eng".to_string()
}

impl Config {
    /// A self-contained configuration rooted under one directory, used by
    /// tests and by `run` when no config file exists.
    #[allow(dead_code)]
    pub fn rooted(root: &Path) -> Self {
        let mut cfg = Config::default();
        cfg.output.root = root.join("output");
        cfg.cache.dir = root.join("cache");
        cfg.ledger.path = root.join("reclaim-log.jsonl");
        cfg
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.limits.max_lines == 0 {
        anyhow::bail!("limits.max_lines must be > 0");
    }
    if config.limits.title_scan_lines == 0 {
        anyhow::bail!("limits.title_scan_lines must be > 0");
    }
    if config.limits.title_max_len < 8 {
        anyhow::bail!("limits.title_max_len must be >= 8");
    }
    if config.limits.concurrency == 0 {
        anyhow::bail!("limits.concurrency must be >= 1");
    }
    if config.limits.min_year < 1000 {
        anyhow::bail!("limits.min_year must be a four-digit year");
    }

    for lang in &config.locale.languages {
        match lang.as_str() {
            "en" | "fr" => {}
            other => anyhow::bail!(
                "Unknown locale language: '{}'. Built-in tables: en, fr. \
                 Use locale.extra_months for other languages.",
                other
            ),
        }
    }
    if config.locale.languages.is_empty() && config.locale.extra_months.is_empty() {
        anyhow::bail!("locale must activate at least one month-name table");
    }
    for table in &config.locale.extra_months {
        if table.len() != 12 {
            anyhow::bail!(
                "locale.extra_months tables must have exactly 12 entries, got {}",
                table.len()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate(&Config::default()).unwrap();
    }

    #[test]
    fn parses_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [output]
            root = "/tmp/out"

            [locale]
            languages = ["fr"]
            "#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.output.root, PathBuf::from("/tmp/out"));
        assert_eq!(config.locale.effective_date_order(), DateOrder::Dmy);
        assert_eq!(config.limits.min_year, 1900);
    }

    #[test]
    fn parses_max_date_string() {
        let config: Config = toml::from_str(
            r#"
            [limits]
            max_date = "2018-11-30"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.limits.effective_max_date(),
            NaiveDate::from_ymd_opt(2018, 11, 30).unwrap()
        );
    }

    #[test]
    fn rejects_unknown_language() {
        let config: Config = toml::from_str(
            r#"
            [locale]
            languages = ["xx"]
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_short_month_table() {
        let config: Config = toml::from_str(
            r#"
            [locale]
            languages = ["en"]
            extra_months = [["jan", "feb"]]
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }
}
