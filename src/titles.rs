//! Title inference: find a short descriptive string in extracted text.
//!
//! The first few lines usually carry the title; OCR noise, boilerplate, and
//! decoration have to be filtered out. When the text yields nothing usable
//! the embedded metadata title is tried, then author/creator fields, and the
//! caller finally falls back to the original filename stem.

use chrono::Datelike;
use regex::Regex;

use crate::config::Config;
use crate::models::{ExtractionResult, TitleCandidate};

/// A single line with at least this many word characters is taken as the
/// title outright.
const STRONG_LINE_ALPHA: usize = 40;

/// Accumulated shorter lines stop once they carry this many word characters.
const ACCUM_ALPHA: usize = 50;

/// Metadata titles shorter than this are ignored as noise.
const MIN_METADATA_TITLE: usize = 3;

/// Titles shorter than this get the author appended; shorter than 5, the
/// creator too (original filenames are precious when content is thin).
const SHORT_TITLE: usize = 20;

pub struct TitleInferencer {
    scan_lines: usize,
    max_len: usize,
    min_year: i32,
    max_year: i32,
    re_spaced: Regex,
    re_dashes: Regex,
    re_dots: Regex,
    re_spaces: Regex,
    re_year: Regex,
}

impl TitleInferencer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            scan_lines: config.limits.title_scan_lines,
            max_len: config.limits.title_max_len,
            min_year: config.limits.min_year,
            max_year: config.limits.effective_max_date().year(),
            re_spaced: Regex::new(r" (\w) ")?,
            re_dashes: Regex::new(r"--+")?,
            re_dots: Regex::new(r"\.\.\.+")?,
            re_spaces: Regex::new(r"\s\s+")?,
            re_year: Regex::new(r"\b((?:19|20)\d{2})\b")?,
        })
    }

    /// Best title for a file, already sanitized, or none (caller then uses
    /// the original filename stem).
    pub fn infer(&self, extraction: &ExtractionResult) -> Option<TitleCandidate> {
        let mut candidate = self
            .from_lines(&extraction.lines)
            .or_else(|| self.from_year_line(&extraction.lines))
            .or_else(|| self.from_metadata_title(extraction));

        // Thin titles are padded out with author/creator, the way a human
        // would label "invoice — ACME".
        let text = candidate.as_ref().map(|c| c.text.clone()).unwrap_or_default();
        if text.len() < SHORT_TITLE {
            let mut parts: Vec<String> = Vec::new();
            if !text.is_empty() {
                parts.push(text);
            }
            if let Some(author) = extraction.metadata.get("Author") {
                parts.push(author.clone());
            }
            if parts.iter().map(|p| p.len()).sum::<usize>() < 5 {
                if let Some(creator) = extraction.metadata.get("Creator") {
                    parts.push(creator.chars().take(10).collect());
                }
            }
            if !parts.is_empty() {
                let joined = parts.join("-");
                let score = candidate.as_ref().map(|c| c.score).unwrap_or(5);
                candidate = Some(TitleCandidate { text: joined, score });
            }
        }

        candidate.and_then(|c| {
            let text = sanitize(&c.text, self.max_len);
            if text.is_empty() {
                None
            } else {
                Some(TitleCandidate { text, score: c.score })
            }
        })
    }

    /// First pass: one strong line wins; otherwise short lines accumulate
    /// until they amount to a title.
    fn from_lines(&self, lines: &[String]) -> Option<TitleCandidate> {
        let mut accum = String::new();
        let mut accum_alpha = 0usize;
        for line in lines.iter().take(self.scan_lines) {
            let line = self.clean_line(line);
            if line.is_empty() {
                continue;
            }
            let alpha = line.chars().filter(|c| c.is_alphanumeric()).count();
            if alpha > STRONG_LINE_ALPHA {
                return Some(TitleCandidate { text: line, score: 30 });
            }
            if !accum.is_empty() {
                accum.push(' ');
            }
            accum.push_str(&line);
            accum_alpha += alpha;
            if accum_alpha > ACCUM_ALPHA {
                return Some(TitleCandidate { text: accum, score: 20 });
            }
        }
        None
    }

    /// Second pass: a line mentioning a plausible year often is the title
    /// ("ANNEE UNIVERSITAIRE 2017-2018").
    fn from_year_line(&self, lines: &[String]) -> Option<TitleCandidate> {
        for line in lines {
            let cleaned = self.clean_line(line);
            let in_range = self.re_year.find_iter(&cleaned).any(|m| {
                m.as_str()
                    .parse::<i32>()
                    // Future years are common in titles; only the low bound
                    // filters OCR noise here.
                    .map(|y| y >= self.min_year && y <= self.max_year + 10)
                    .unwrap_or(false)
            });
            if in_range {
                return Some(TitleCandidate { text: cleaned, score: 10 });
            }
        }
        None
    }

    fn from_metadata_title(&self, extraction: &ExtractionResult) -> Option<TitleCandidate> {
        let title = extraction.metadata.get("Title")?;
        if title.trim().len() < MIN_METADATA_TITLE {
            return None;
        }
        Some(TitleCandidate {
            text: title.trim().to_string(),
            score: 15,
        })
    }

    /// Undo common OCR artifacts: "S a l u t" → "Salut", runs of dashes,
    /// dots, and whitespace collapsed.
    fn clean_line(&self, line: &str) -> String {
        let line = line.trim().replace('…', "");
        let line = self.re_spaced.replace_all(&line, "$1");
        let line = self.re_dashes.replace_all(&line, "-");
        let line = self.re_dots.replace_all(&line, ".");
        self.re_spaces.replace_all(&line, " ").trim().to_string()
    }
}

/// Keep the original filename stem as a prefix when it looks meaningful.
/// Carved names like "f23292344" are almost all digits and get discarded.
pub fn keep_original_stem(stem: &str) -> Option<String> {
    let digits = stem.chars().filter(|c| c.is_ascii_digit()).count();
    if stem.chars().count() - digits >= 2 {
        Some(stem.to_string())
    } else {
        None
    }
}

/// Turn a free-form string into a filesystem-safe token: accents folded,
/// whitespace to underscores, anything outside `[A-Za-z0-9._-]` dropped,
/// photorec `_000…` noise removed, capped at `max_len`.
pub fn sanitize(s: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_control() {
            continue;
        }
        if c.is_whitespace() {
            out.push('_');
            continue;
        }
        match fold_accent(c) {
            Some(folded) => out.push(folded),
            None if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => out.push(c),
            None => out.push('_'),
        }
    }
    // Carved trees are full of names like "23292344_000_000D_000f.pdf".
    while let Some(pos) = out.find("_00") {
        let rest = out[pos + 1..].trim_start_matches('0');
        out = format!("{}{}", &out[..pos], rest);
    }
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    let out = out.trim_matches(|c| c == '_' || c == '.').to_string();
    out.chars().take(max_len).collect()
}

/// ASCII folding for the Latin accents that dominate the target locales.
fn fold_accent(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'â' | 'ä' | 'á' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' | 'í' => 'i',
        'ô' | 'ö' | 'ó' => 'o',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'ç' => 'c',
        'À' | 'Â' | 'Ä' | 'Á' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Î' | 'Ï' | 'Í' => 'I',
        'Ô' | 'Ö' | 'Ó' => 'O',
        'Ù' | 'Û' | 'Ü' | 'Ú' => 'U',
        'Ç' => 'C',
        _ => return None,
    };
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormatKind;
    use std::collections::BTreeMap;

    fn inferencer() -> TitleInferencer {
        TitleInferencer::new(&Config::default()).unwrap()
    }

    fn extraction(lines: &[&str]) -> ExtractionResult {
        ExtractionResult {
            kind: FormatKind::PlainText,
            lines: lines.iter().map(|s| s.to_string()).collect(),
            metadata: BTreeMap::new(),
            text_ok: true,
            metadata_ok: true,
            error: None,
        }
    }

    #[test]
    fn strong_line_wins_outright() {
        let ex = extraction(&[
            "x",
            "Rapport d'activite du laboratoire de mathematiques applique 2018",
            "ignored body text",
        ]);
        let got = inferencer().infer(&ex).unwrap();
        assert!(got.text.starts_with("Rapport_d_activite"));
        assert_eq!(got.score, 30);
    }

    #[test]
    fn short_lines_accumulate() {
        let ex = extraction(&[
            "Compte rendu du conseil",
            "reunion pleniere du departement de mathematiques",
            "body text that must not be part of the title",
        ]);
        let got = inferencer().infer(&ex).unwrap();
        assert!(got.text.contains("Compte_rendu"));
        assert!(got.text.contains("reunion"));
        assert!(!got.text.contains("body"));
    }

    #[test]
    fn ocr_letter_spacing_is_repaired() {
        assert_eq!(inferencer().clean_line("S a l u t "), "Salut");
    }

    #[test]
    fn year_line_fallback() {
        let mut lines: Vec<String> = (0..15).map(|_| "..".to_string()).collect();
        lines.push("ANNEE UNIVERSITAIRE 2017-2018".to_string());
        let ex = ExtractionResult {
            lines,
            ..extraction(&[])
        };
        let got = inferencer().infer(&ex).unwrap();
        assert!(got.text.contains("2017-2018"));
        assert_eq!(got.score, 10);
    }

    #[test]
    fn metadata_title_when_text_is_empty() {
        let mut ex = extraction(&[]);
        ex.metadata
            .insert("Title".to_string(), "Budget prévisionnel".to_string());
        let got = inferencer().infer(&ex).unwrap();
        assert_eq!(got.text, "Budget_previsionnel");
    }

    #[test]
    fn thin_content_falls_back_to_author() {
        let mut ex = extraction(&["Facture"]);
        ex.metadata
            .insert("Author".to_string(), "ACME Corp".to_string());
        let got = inferencer().infer(&ex).unwrap();
        assert_eq!(got.text, "ACME_Corp");
    }

    #[test]
    fn metadata_title_is_padded_with_author() {
        let mut ex = extraction(&[]);
        ex.metadata.insert("Title".to_string(), "Facture 18".to_string());
        ex.metadata
            .insert("Author".to_string(), "ACME Corp".to_string());
        let got = inferencer().infer(&ex).unwrap();
        assert_eq!(got.text, "Facture_18-ACME_Corp");
    }

    #[test]
    fn nothing_usable_returns_none() {
        assert!(inferencer().infer(&extraction(&["", "  ", "\t"])).is_none());
    }

    #[test]
    fn sanitize_photorec_noise() {
        let got = sanitize("23292344_000_000D_000_000f_000a_000v", 100);
        assert!(!got.contains("_000"));
    }

    #[test]
    fn sanitize_accents_and_separators() {
        assert_eq!(sanitize("ça c'est sûr", 100), "ca_c_est_sur");
        assert_eq!(sanitize("a/b\\c", 100), "a_b_c");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize(&long, 100).len(), 100);
    }

    #[test]
    fn carved_stems_are_discarded() {
        assert_eq!(keep_original_stem("f23292344"), None);
        assert_eq!(
            keep_original_stem("lettre_motivation"),
            Some("lettre_motivation".to_string())
        );
    }
}
