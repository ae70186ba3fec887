//! Naming & placement resolution: inferred date + title → a destination
//! path under `OUTPUT/YEAR/MM/` that is guaranteed never to overwrite.
//!
//! Collision checks consult three sources: the filesystem, every `Copied`
//! destination already in the ledger, and the paths assigned earlier in this
//! run (so dry runs suffix consistently even though they write nothing).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::{DateCandidate, FormatKind};
use crate::titles;

/// Bucket for files with no inferable date at all.
const UNKNOWN_DATE_BUCKET: &str = "unknown-date";

/// Month directory for year-only dates.
const UNKNOWN_MONTH_BUCKET: &str = "unknown-month";

pub struct Resolver {
    output_root: PathBuf,
    /// Destinations taken by prior runs (ledger) or assigned in this run.
    taken: HashSet<PathBuf>,
    title_max_len: usize,
}

impl Resolver {
    pub fn new(
        output_root: impl Into<PathBuf>,
        ledger_destinations: impl IntoIterator<Item = PathBuf>,
        title_max_len: usize,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            taken: ledger_destinations.into_iter().collect(),
            title_max_len,
        }
    }

    /// Compute and reserve a collision-free destination for one file.
    pub fn resolve(
        &mut self,
        date: Option<&DateCandidate>,
        title: Option<&str>,
        original: &Path,
        kind: FormatKind,
        keep_name: bool,
    ) -> PathBuf {
        let dir = self.output_root.join(bucket(date));

        let file_name = if keep_name {
            original
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string())
        } else {
            let stem = title
                .map(|t| t.to_string())
                .unwrap_or_else(|| {
                    let stem = original
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    titles::sanitize(&stem, self.title_max_len)
                });
            let stem = if stem.is_empty() { "file".to_string() } else { stem };
            match extension_for(original, kind) {
                Some(ext) => format!("{}.{}", stem, ext),
                None => stem,
            }
        };

        self.unique(dir.join(file_name))
    }

    /// Append `_NN` before the extension until the path is free, then
    /// reserve it. Total: the suffix space is unbounded.
    fn unique(&mut self, candidate: PathBuf) -> PathBuf {
        let mut path = candidate.clone();
        let mut count = 0u32;
        while path.exists() || self.taken.contains(&path) {
            count += 1;
            let stem = candidate
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());
            let name = match candidate.extension() {
                Some(ext) => format!("{}_{:02}.{}", stem, count, ext.to_string_lossy()),
                None => format!("{}_{:02}", stem, count),
            };
            path = candidate.with_file_name(name);
        }
        self.taken.insert(path.clone());
        path
    }
}

/// `YYYY/MM`, `YYYY/unknown-month`, or `unknown-date`.
fn bucket(date: Option<&DateCandidate>) -> PathBuf {
    match date {
        Some(d) => {
            let month = match d.month {
                Some(m) => format!("{:02}", m),
                None => UNKNOWN_MONTH_BUCKET.to_string(),
            };
            PathBuf::from(d.year.to_string()).join(month)
        }
        None => PathBuf::from(UNKNOWN_DATE_BUCKET),
    }
}

/// Destination extension: the original one when present (normalized so text
/// subtypes collapse to `txt`), otherwise derived from the sniffed kind.
fn extension_for(original: &Path, kind: FormatKind) -> Option<String> {
    let original_ext = original
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    match original_ext {
        Some(ext) if kind.is_text_like() => {
            // `.log`, `.mbox`, `.csv` … all read as text; keep recognizable
            // ones, normalize the rest.
            if ext == "txt" || ext == "csv" || ext == "log" {
                Some(ext)
            } else {
                Some("txt".to_string())
            }
        }
        Some(ext) => Some(ext),
        None => kind.default_extension().map(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateSource;

    fn date(year: i32, month: Option<u32>) -> DateCandidate {
        DateCandidate {
            year,
            month,
            day: None,
            source: DateSource::Text,
            score: 10,
            line: 0,
        }
    }

    fn resolver(root: &Path) -> Resolver {
        Resolver::new(root, Vec::new(), 100)
    }

    #[test]
    fn full_date_buckets_by_year_and_month() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let got = r.resolve(
            Some(&date(2019, Some(3))),
            Some("report"),
            Path::new("f001.pdf"),
            FormatKind::Pdf,
            false,
        );
        assert_eq!(got, dir.path().join("2019/03/report.pdf"));
    }

    #[test]
    fn year_only_uses_unknown_month() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let got = r.resolve(
            Some(&date(2018, None)),
            Some("notes"),
            Path::new("f001.txt"),
            FormatKind::PlainText,
            false,
        );
        assert_eq!(got, dir.path().join("2018/unknown-month/notes.txt"));
    }

    #[test]
    fn no_date_uses_unknown_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let got = r.resolve(None, Some("mystery"), Path::new("f001"), FormatKind::Unknown, false);
        assert_eq!(got, dir.path().join("unknown-date/mystery"));
    }

    #[test]
    fn collisions_get_incrementing_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let d = date(2019, Some(3));
        let args = (Some("report"), Path::new("f001.pdf"), FormatKind::Pdf);
        let first = r.resolve(Some(&d), args.0, args.1, args.2, false);
        let second = r.resolve(Some(&d), args.0, args.1, args.2, false);
        let third = r.resolve(Some(&d), args.0, args.1, args.2, false);
        assert_eq!(first, dir.path().join("2019/03/report.pdf"));
        assert_eq!(second, dir.path().join("2019/03/report_01.pdf"));
        assert_eq!(third, dir.path().join("2019/03/report_02.pdf"));
    }

    #[test]
    fn existing_file_on_disk_collides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2019/03")).unwrap();
        std::fs::write(dir.path().join("2019/03/report.pdf"), b"x").unwrap();

        let mut r = resolver(dir.path());
        let got = r.resolve(
            Some(&date(2019, Some(3))),
            Some("report"),
            Path::new("f001.pdf"),
            FormatKind::Pdf,
            false,
        );
        assert_eq!(got, dir.path().join("2019/03/report_01.pdf"));
    }

    #[test]
    fn ledger_destinations_collide() {
        let dir = tempfile::tempdir().unwrap();
        let prior = vec![dir.path().join("2019/03/report.pdf")];
        let mut r = Resolver::new(dir.path(), prior, 100);
        let got = r.resolve(
            Some(&date(2019, Some(3))),
            Some("report"),
            Path::new("f001.pdf"),
            FormatKind::Pdf,
            false,
        );
        assert_eq!(got, dir.path().join("2019/03/report_01.pdf"));
    }

    #[test]
    fn keep_name_preserves_original_filename() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let got = r.resolve(
            Some(&date(2019, Some(3))),
            Some("ignored-title"),
            Path::new("/carved/f0042.odt"),
            FormatKind::OpenDocument,
            true,
        );
        assert_eq!(got, dir.path().join("2019/03/f0042.odt"));
    }

    #[test]
    fn missing_extension_falls_back_to_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let got = r.resolve(
            Some(&date(2019, Some(3))),
            Some("scan"),
            Path::new("f0099"),
            FormatKind::Pdf,
            false,
        );
        assert_eq!(got, dir.path().join("2019/03/scan.pdf"));
    }

    #[test]
    fn text_subtypes_normalize_to_txt() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let got = r.resolve(
            Some(&date(2019, Some(3))),
            Some("mail"),
            Path::new("f0099.mbox"),
            FormatKind::Mbox,
            false,
        );
        assert_eq!(got, dir.path().join("2019/03/mail.txt"));
    }

    #[test]
    fn suffixes_widen_past_ninety_nine() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = resolver(dir.path());
        let d = date(2020, Some(1));
        let mut last = PathBuf::new();
        for _ in 0..=101 {
            last = r.resolve(Some(&d), Some("x"), Path::new("f.txt"), FormatKind::PlainText, false);
        }
        assert_eq!(last, dir.path().join("2020/01/x_101.txt"));
    }
}
