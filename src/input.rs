//! Input collection: expand the command-line file/directory arguments into
//! the concrete file set a batch will process.
//!
//! Explicit file arguments are always kept; directory arguments are walked
//! and filtered through the configured include/exclude globs. The result is
//! sorted and deduplicated so batches are deterministic.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::InputConfig;

pub fn collect_files(args: &[PathBuf], config: &InputConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut files = BTreeSet::new();
    for arg in args {
        if arg.is_dir() {
            collect_dir(arg, config, &include_set, &exclude_set, &mut files)?;
        } else {
            // Explicit arguments bypass the globs; a missing file stays in
            // the set so the batch can report it as failed rather than
            // silently dropping it.
            files.insert(arg.clone());
        }
    }
    Ok(files.into_iter().collect())
}

fn collect_dir(
    root: &Path,
    config: &InputConfig,
    include_set: &GlobSet,
    exclude_set: &GlobSet,
    files: &mut BTreeSet<PathBuf>,
) -> Result<()> {
    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }
        files.insert(path.to_path_buf());
    }
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_walked_with_globs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/b.doc"), b"x").unwrap();
        std::fs::write(dir.path().join("skip.tmp"), b"x").unwrap();

        let config = InputConfig {
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec!["**/*.tmp".to_string()],
            follow_symlinks: false,
        };
        let files = collect_files(&[dir.path().to_path_buf()], &config).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.to_string_lossy().ends_with(".tmp")));
    }

    #[test]
    fn explicit_files_bypass_globs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("keep.tmp");
        std::fs::write(&file, b"x").unwrap();

        let config = InputConfig {
            include_globs: vec!["**/*.pdf".to_string()],
            exclude_globs: vec!["**/*.tmp".to_string()],
            follow_symlinks: false,
        };
        let files = collect_files(&[file.clone()], &config).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn missing_explicit_file_is_kept_for_error_reporting() {
        let config = InputConfig::default();
        let ghost = PathBuf::from("/no/such/file.pdf");
        let files = collect_files(&[ghost.clone()], &config).unwrap();
        assert_eq!(files, vec![ghost]);
    }

    #[test]
    fn duplicates_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"x").unwrap();
        let files =
            collect_files(&[file.clone(), file.clone()], &InputConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
    }
}
