//! Date inference: scan extracted metadata and text for the date a document
//! was written, and pick one candidate.
//!
//! Priority: explicit metadata date fields, then date-like substrings in the
//! text (scored by how explicit the expression is), then the filesystem
//! timestamp as a last resort. Month-name tables are per-run configuration,
//! so two batches with different locales can run side by side.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::collections::HashMap;

use crate::config::{Config, DateOrder};
use crate::models::{DateCandidate, DateSource, ExtractionResult};

/// Metadata fields that may carry a document date, in descending trust
/// order. FileModifyDate is deliberately absent: carving resets it.
const METADATA_DATE_FIELDS: &[&str] = &[
    "ModifyDate",
    "CreateDate",
    "CreationDate",
    "Creation-date",
    "MetadataDate",
    "Date",
    "ZipModifyDate",
    "TarModifyDate",
    "MboxDate",
];

/// Scores for text candidates. An expression introduced by wording like
/// "fait le …" or "Date: …" is close to certain; a bare year barely counts.
const SCORE_PREFIXED: u32 = 30;
const SCORE_NUMERIC: u32 = 10;
const SCORE_MONTH_NAME_FULL: u32 = 10;
const SCORE_MONTH_NAME_NO_DAY: u32 = 5;
const SCORE_COMPACT: u32 = 5;
const SCORE_BARE_YEAR: u32 = 2;

const MONTHS_EN: &[&[&str]] = &[
    &["january", "jan"],
    &["february", "feb"],
    &["march", "mar"],
    &["april", "apr"],
    &["may"],
    &["june", "jun"],
    &["july", "jul"],
    &["august", "aug"],
    &["september", "sept", "sep"],
    &["october", "oct"],
    &["november", "nov"],
    &["december", "dec"],
];

const MONTHS_FR: &[&[&str]] = &[
    &["janvier", "janv"],
    &["février", "fevrier", "févr"],
    &["mars"],
    &["avril", "avr"],
    &["mai"],
    &["juin"],
    &["juillet", "juil"],
    &["août", "aout"],
    &["septembre", "sept"],
    &["octobre", "oct"],
    &["novembre", "nov"],
    &["décembre", "decembre", "déc"],
];

pub struct DateInferencer {
    min_year: i32,
    max_date: NaiveDate,
    max_lines: usize,
    date_order: DateOrder,
    mtime_fallback: bool,
    month_numbers: HashMap<String, u32>,
    re_prefixed: Regex,
    re_numeric: Regex,
    re_month_name: Regex,
    re_compact: Regex,
    re_year: Regex,
}

impl DateInferencer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut month_numbers = HashMap::new();
        let mut tokens: Vec<String> = Vec::new();
        for lang in &config.locale.languages {
            let table = match lang.as_str() {
                "fr" => MONTHS_FR,
                _ => MONTHS_EN,
            };
            for (i, variants) in table.iter().enumerate() {
                for variant in *variants {
                    month_numbers.insert(variant.to_string(), i as u32 + 1);
                    tokens.push(regex::escape(variant));
                }
            }
        }
        for table in &config.locale.extra_months {
            for (i, name) in table.iter().enumerate() {
                month_numbers.insert(name.to_lowercase(), i as u32 + 1);
                tokens.push(regex::escape(&name.to_lowercase()));
            }
        }
        // Longest-first keeps "mars" from being eaten by the "mar" abbreviation.
        tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
        tokens.dedup();
        let month_alt = tokens.join("|");

        Ok(Self {
            min_year: config.limits.min_year,
            max_date: config.limits.effective_max_date(),
            max_lines: config.limits.max_lines,
            date_order: config.locale.effective_date_order(),
            mtime_fallback: config.limits.mtime_fallback,
            month_numbers,
            re_prefixed: Regex::new(r"(?i)(?:\bfait\s+le|,\s*le|\bdate\s*:)\s*(.{0,48})")?,
            // The regex crate has no backreferences; separator equality is
            // checked after the match.
            re_numeric: Regex::new(
                r"\b(\d{1,4})\s*([/\-.:])\s*(\d{1,2})\s*([/\-.:])\s*(\d{4}|\d{2})\b",
            )?,
            re_month_name: Regex::new(&format!(
                r"(?i)\b(?:(\d{{1,2}})(?:er|e)?\s+)?({})\.?,?\s+(\d{{4}}|\d{{2}})\b",
                month_alt
            ))?,
            re_compact: Regex::new(r"[_\-\s]((?:19|20)\d{2})(\d{2})(\d{2})[_\-\s.]")?,
            re_year: Regex::new(r"\b((?:19|20)\d{2})\b")?,
        })
    }

    /// Pick one date for a file, or none. `mtime` is the filesystem
    /// timestamp used as the last resort (when enabled).
    pub fn infer(
        &self,
        extraction: &ExtractionResult,
        mtime: chrono::DateTime<chrono::Utc>,
    ) -> Option<DateCandidate> {
        if let Some(candidate) = self.from_metadata(extraction) {
            return Some(candidate);
        }
        if let Some(candidate) = self.from_text(&extraction.lines) {
            return Some(candidate);
        }
        if self.mtime_fallback {
            let date = mtime.date_naive();
            if self.in_range(date.year(), Some(date.month())) {
                return Some(DateCandidate {
                    year: date.year(),
                    month: Some(date.month()),
                    day: Some(date.day()),
                    source: DateSource::Filesystem,
                    score: 0,
                    line: 0,
                });
            }
        }
        None
    }

    fn from_metadata(&self, extraction: &ExtractionResult) -> Option<DateCandidate> {
        for field in METADATA_DATE_FIELDS {
            let value = match extraction.metadata.get(*field) {
                Some(v) => v,
                None => continue,
            };
            if let Some((year, month, day)) = self.parse_metadata_value(value) {
                return Some(DateCandidate {
                    year,
                    month,
                    day,
                    source: DateSource::Metadata,
                    score: 100,
                    line: 0,
                });
            }
        }
        None
    }

    /// Metadata values are mostly exiftool-normalized (`2019:03:15`), but
    /// OOXML and mail headers leak other shapes through.
    fn parse_metadata_value(&self, value: &str) -> Option<(i32, Option<u32>, Option<u32>)> {
        let first = value.split_whitespace().next()?;
        for format in ["%Y:%m:%d", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d/%m/%y"] {
            if let Ok(date) = NaiveDate::parse_from_str(first, format) {
                if self.in_range(date.year(), Some(date.month())) {
                    return Some((date.year(), Some(date.month()), Some(date.day())));
                }
            }
        }
        // "4 Mar 2019 10:00:00 +0100" and friends.
        let head: Vec<&str> = value.split_whitespace().take(3).collect();
        if head.len() == 3 {
            let joined = head.join(" ");
            for format in ["%d %b %Y", "%d %B %Y"] {
                if let Ok(date) = NaiveDate::parse_from_str(&joined, format) {
                    if self.in_range(date.year(), Some(date.month())) {
                        return Some((date.year(), Some(date.month()), Some(date.day())));
                    }
                }
            }
        }
        self.date_in_line(value)
            .map(|(year, month, day, _)| (year, month, day))
    }

    fn from_text(&self, lines: &[String]) -> Option<DateCandidate> {
        let mut best: Option<DateCandidate> = None;
        for (index, line) in lines.iter().take(self.max_lines).enumerate() {
            let (year, month, day, score) = match self.date_in_line(line) {
                Some(found) => found,
                None => continue,
            };
            let candidate = DateCandidate {
                year,
                month,
                day,
                source: DateSource::Text,
                score,
                line: index,
            };
            let better = match &best {
                None => true,
                // Higher score wins; then the earliest line (headers beat
                // body text); then the more complete date.
                Some(b) => {
                    candidate.score > b.score
                        || (candidate.score == b.score
                            && candidate.completeness() > b.completeness())
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }

    /// Best date expression within one line, by pattern priority.
    pub fn date_in_line(&self, line: &str) -> Option<(i32, Option<u32>, Option<u32>, u32)> {
        // "Rennes, le 3 janvier 2018" / "Date: 3/11/18" — the wording makes
        // the date nearly certain.
        if let Some(caps) = self.re_prefixed.captures(line) {
            let rest = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if let Some((y, m, d)) = self.explicit_date(rest) {
                return Some((y, m, d, SCORE_PREFIXED));
            }
        }
        if let Some((y, m, d)) = self.numeric_date(line) {
            return Some((y, m, d, SCORE_NUMERIC));
        }
        if let Some((y, m, d)) = self.month_name_date(line) {
            let score = if d.is_some() {
                SCORE_MONTH_NAME_FULL
            } else {
                SCORE_MONTH_NAME_NO_DAY
            };
            return Some((y, m, d, score));
        }
        if let Some(caps) = self.re_compact.captures(line) {
            let year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            if self.valid_full(year, month, day) {
                return Some((year, Some(month), Some(day), SCORE_COMPACT));
            }
        }
        // "Réunion 2018-2019" — a bare year is better than nothing; the
        // latest in-range year on the line wins.
        let year = self
            .re_year
            .find_iter(line)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .filter(|&y| self.in_range(y, None))
            .max()?;
        Some((year, None, None, SCORE_BARE_YEAR))
    }

    fn explicit_date(&self, text: &str) -> Option<(i32, Option<u32>, Option<u32>)> {
        self.month_name_date(text)
            .filter(|(_, _, day)| day.is_some())
            .or_else(|| self.numeric_date(text))
    }

    fn numeric_date(&self, line: &str) -> Option<(i32, Option<u32>, Option<u32>)> {
        for caps in self.re_numeric.captures_iter(line) {
            if caps[2] != caps[4] {
                continue; // mixed separators, e.g. "3/4-2018"
            }
            let a: i32 = caps[1].parse().ok()?;
            let b: u32 = caps[3].parse().ok()?;
            let c: i32 = caps[5].parse().ok()?;

            let (year, month, day) = if (1900..2100).contains(&a) {
                // "2019/03/15" — year first regardless of locale order.
                (a, b, c as u32)
            } else {
                match self.date_order {
                    DateOrder::Mdy => (self.complete_year(c), a as u32, b),
                    DateOrder::Dmy | DateOrder::Ymd => (self.complete_year(c), b, a as u32),
                }
            };
            if self.valid_full(year, month, day) {
                return Some((year, Some(month), Some(day)));
            }
        }
        None
    }

    fn month_name_date(&self, line: &str) -> Option<(i32, Option<u32>, Option<u32>)> {
        let caps = self.re_month_name.captures(line)?;
        let month = *self.month_numbers.get(&caps[2].to_lowercase())?;
        let year = self.complete_year(caps[3].parse().ok()?);
        let day: Option<u32> = caps.get(1).and_then(|d| d.as_str().parse().ok());
        match day {
            Some(d) if self.valid_full(year, month, d) => Some((year, Some(month), Some(d))),
            Some(_) | None if self.in_range(year, Some(month)) => Some((year, Some(month), None)),
            _ => None,
        }
    }

    /// Two-digit years pivot on the configured max date: "18" is 2018 when
    /// the crash was in 2023, but "97" is 1997.
    fn complete_year(&self, year: i32) -> i32 {
        if year < 100 {
            if year <= self.max_date.year() % 100 {
                year + 2000
            } else {
                year + 1900
            }
        } else {
            year
        }
    }

    /// Year/month comparison against the sane range; day is not considered
    /// (a document dated the day of the crash is still plausible).
    fn in_range(&self, year: i32, month: Option<u32>) -> bool {
        if year < self.min_year {
            return false;
        }
        match month {
            Some(month) => {
                year < self.max_date.year()
                    || (year == self.max_date.year() && month <= self.max_date.month())
            }
            None => year <= self.max_date.year(),
        }
    }

    fn valid_full(&self, year: i32, month: u32, day: u32) -> bool {
        (1..=12).contains(&month) && (1..=31).contains(&day) && self.in_range(year, Some(month))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FormatKind;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn inferencer_for(languages: &[&str]) -> DateInferencer {
        let mut config = Config::default();
        config.locale.languages = languages.iter().map(|s| s.to_string()).collect();
        config.limits.max_date = Some(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
        DateInferencer::new(&config).unwrap()
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

    fn mtime(year: i32, month: u32, day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn french_month_name_with_day() {
        let inf = inferencer_for(&["fr"]);
        let got = inf
            .infer(&extraction(&["Compte rendu", "15 mars 2019"]), mtime(2021, 1, 1))
            .unwrap();
        assert_eq!((got.year, got.month, got.day), (2019, Some(3), Some(15)));
        assert_eq!(got.source, DateSource::Text);
    }

    #[test]
    fn accented_and_unaccented_french() {
        let inf = inferencer_for(&["fr"]);
        for line in ["3 février 2018", "3 fevrier 2018", "1er août 2018"] {
            let got = inf.infer(&extraction(&[line]), mtime(2021, 1, 1)).unwrap();
            assert_eq!(got.year, 2018);
        }
    }

    #[test]
    fn metadata_beats_text() {
        let inf = inferencer_for(&["en"]);
        let mut ex = extraction(&["Written on 12 January 2001"]);
        ex.metadata
            .insert("CreateDate".to_string(), "2017:01:09".to_string());
        let got = inf.infer(&ex, mtime(2021, 1, 1)).unwrap();
        assert_eq!((got.year, got.month), (2017, Some(1)));
        assert_eq!(got.source, DateSource::Metadata);
    }

    #[test]
    fn mbox_style_metadata_date() {
        let inf = inferencer_for(&["en"]);
        let mut ex = extraction(&[]);
        ex.metadata
            .insert("MboxDate".to_string(), "4 Mar 2019 10:00:00 +0100".to_string());
        let got = inf.infer(&ex, mtime(2021, 1, 1)).unwrap();
        assert_eq!((got.year, got.month, got.day), (2019, Some(3), Some(4)));
    }

    #[test]
    fn numeric_dmy_with_two_digit_year() {
        let inf = inferencer_for(&["fr"]);
        let got = inf
            .infer(&extraction(&["Le 03/12/18 à Rennes"]), mtime(2021, 1, 1))
            .unwrap();
        assert_eq!((got.year, got.month, got.day), (2018, Some(12), Some(3)));
    }

    #[test]
    fn two_digit_year_pivots_to_previous_century() {
        let inf = inferencer_for(&["fr"]);
        let got = inf
            .infer(&extraction(&["signé le 05/06/97"]), mtime(2021, 1, 1))
            .unwrap();
        assert_eq!(got.year, 1997);
    }

    #[test]
    fn year_first_numeric() {
        let inf = inferencer_for(&["en"]);
        let got = inf
            .infer(&extraction(&["archived 2001/1/23"]), mtime(2021, 1, 1))
            .unwrap();
        assert_eq!((got.year, got.month, got.day), (2001, Some(1), Some(23)));
    }

    #[test]
    fn compact_screenshot_date() {
        let inf = inferencer_for(&["en"]);
        let got = inf
            .infer(&extraction(&["Screenshot_20230504_164636.png"]), mtime(2021, 1, 1))
            .unwrap();
        assert_eq!((got.year, got.month, got.day), (2023, Some(5), Some(4)));
    }

    #[test]
    fn prefixed_date_beats_earlier_plain_year() {
        let inf = inferencer_for(&["fr"]);
        let ex = extraction(&[
            "Rapport annuel 2016",
            "Rennes, le 3 janvier 2018",
        ]);
        let got = inf.infer(&ex, mtime(2021, 1, 1)).unwrap();
        assert_eq!((got.year, got.month, got.day), (2018, Some(1), Some(3)));
        assert_eq!(got.score, SCORE_PREFIXED);
    }

    #[test]
    fn equal_scores_prefer_earliest_line() {
        let inf = inferencer_for(&["en"]);
        let ex = extraction(&["12 March 2015", "20 June 2017"]);
        let got = inf.infer(&ex, mtime(2021, 1, 1)).unwrap();
        assert_eq!((got.year, got.month), (2015, Some(3)));
    }

    #[test]
    fn future_dates_are_rejected() {
        let inf = inferencer_for(&["en"]); // max_date = 2023-06-01
        let ex = extraction(&["planning for September 2024"]);
        // The month-name candidate is out of range; the bare year 2024 is
        // out of range too, so only the mtime fallback remains.
        let got = inf.infer(&ex, mtime(2020, 2, 2)).unwrap();
        assert_eq!(got.source, DateSource::Filesystem);
        assert_eq!((got.year, got.month), (2020, Some(2)));
    }

    #[test]
    fn ancient_years_are_ocr_noise() {
        let inf = inferencer_for(&["en"]);
        let got = inf.infer(&extraction(&["page 1823 of 2000"]), mtime(2020, 2, 2));
        // 1823 < min_year; 2000 is in range and wins as a bare year.
        assert_eq!(got.unwrap().year, 2000);
    }

    #[test]
    fn no_date_anywhere_uses_mtime() {
        let inf = inferencer_for(&["en"]);
        let got = inf.infer(&extraction(&["no dates here"]), mtime(2019, 11, 5)).unwrap();
        assert_eq!((got.year, got.month), (2019, Some(11)));
        assert_eq!(got.source, DateSource::Filesystem);
    }

    #[test]
    fn mtime_fallback_can_be_disabled() {
        let mut config = Config::default();
        config.limits.mtime_fallback = false;
        let inf = DateInferencer::new(&config).unwrap();
        assert!(inf.infer(&extraction(&["no dates here"]), mtime(2019, 11, 5)).is_none());
    }

    #[test]
    fn bare_year_only_gives_partial_date() {
        let inf = inferencer_for(&["en"]);
        let got = inf
            .infer(&extraction(&["Réunion de 2018-2019"]), mtime(2021, 1, 1))
            .unwrap();
        assert_eq!((got.year, got.month, got.day), (2019, None, None));
    }
}
