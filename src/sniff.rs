//! Content-based format detection.
//!
//! Carved files frequently have wrong or missing extensions, so dispatch is
//! decided from leading bytes (and, for ZIP containers, from the entry names
//! inside). Extensions are only used later, when building destination names.

use crate::models::FormatKind;
use std::io::Read;
use std::path::Path;

/// Bytes read from the head of the file for signature checks.
const SNIFF_LEN: usize = 8192;

/// Offset of the `ustar` magic in a tar header block.
const TAR_MAGIC_OFFSET: usize = 257;

/// Detect the format of a file from its content.
pub fn sniff(path: &Path) -> std::io::Result<FormatKind> {
    let mut head = vec![0u8; SNIFF_LEN];
    let mut file = std::fs::File::open(path)?;
    let n = read_fully(&mut file, &mut head)?;
    head.truncate(n);

    let kind = sniff_bytes(&head);
    if kind == FormatKind::Zip {
        // A ZIP container may really be an OOXML or OpenDocument file;
        // only the entry names can tell.
        return Ok(classify_zip(path));
    }
    Ok(kind)
}

fn read_fully(file: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Signature dispatch on the head bytes alone (ZIP subtypes resolved by
/// [`sniff`], which can open the archive).
pub fn sniff_bytes(head: &[u8]) -> FormatKind {
    if head.starts_with(b"%PDF") {
        return FormatKind::Pdf;
    }
    if head.starts_with(b"PK\x03\x04") {
        return FormatKind::Zip;
    }
    if head.starts_with(b"{\\rtf") {
        return FormatKind::Rtf;
    }
    // OLE2 compound document: legacy doc/xls/ppt.
    if head.starts_with(&[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1]) {
        return FormatKind::OfficeLegacy;
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G'])
        || head.starts_with(&[0xff, 0xd8, 0xff])
        || head.starts_with(b"GIF87a")
        || head.starts_with(b"GIF89a")
        || head.starts_with(b"BM")
        || head.starts_with(b"II*\x00")
        || head.starts_with(b"MM\x00*")
    {
        return FormatKind::Image;
    }
    if head.len() > TAR_MAGIC_OFFSET + 5 && &head[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        return FormatKind::Tar;
    }

    let text = String::from_utf8_lossy(head);
    let lowered = text.to_lowercase();
    if lowered.trim_start().starts_with("<!doctype html") || lowered.contains("<html") {
        return FormatKind::Html;
    }
    if looks_textual(head) {
        if is_mbox(&text) {
            return FormatKind::Mbox;
        }
        return FormatKind::PlainText;
    }
    FormatKind::Unknown
}

/// Heuristic: text files contain no NULs and are mostly printable.
fn looks_textual(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    let printable = head
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b) || b >= 0x80)
        .count();
    printable * 100 / head.len() >= 95
}

fn is_mbox(text: &str) -> bool {
    if text.starts_with("From ") {
        return true;
    }
    text.lines().take(30).any(|line| {
        line.starts_with("Received: from ")
            || line.starts_with("Message-ID:")
            || line.starts_with("Message-Id:")
    })
}

/// Split ZIP-family containers by their entry names.
fn classify_zip(path: &Path) -> FormatKind {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return FormatKind::Zip,
    };
    let archive = match zip::ZipArchive::new(file) {
        Ok(a) => a,
        Err(_) => return FormatKind::Zip,
    };
    let names: Vec<&str> = archive.file_names().collect();
    if names.iter().any(|n| *n == "[Content_Types].xml") {
        return FormatKind::OfficeOpenXml;
    }
    if names.iter().any(|n| *n == "mimetype") || names.iter().any(|n| *n == "content.xml") {
        return FormatKind::OpenDocument;
    }
    FormatKind::Zip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_magic() {
        assert_eq!(sniff_bytes(b"%PDF-1.4\n..."), FormatKind::Pdf);
    }

    #[test]
    fn rtf_magic() {
        assert_eq!(sniff_bytes(b"{\\rtf1\\ansi"), FormatKind::Rtf);
    }

    #[test]
    fn ole2_magic() {
        let head = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1, 0, 0];
        assert_eq!(sniff_bytes(&head), FormatKind::OfficeLegacy);
    }

    #[test]
    fn image_magics() {
        assert_eq!(sniff_bytes(&[0x89, b'P', b'N', b'G', 13, 10]), FormatKind::Image);
        assert_eq!(sniff_bytes(&[0xff, 0xd8, 0xff, 0xe0]), FormatKind::Image);
        assert_eq!(sniff_bytes(b"GIF89a..."), FormatKind::Image);
    }

    #[test]
    fn plain_text() {
        assert_eq!(
            sniff_bytes(b"Meeting notes\nJanuary 2020\n"),
            FormatKind::PlainText
        );
    }

    #[test]
    fn mbox_from_line() {
        assert_eq!(
            sniff_bytes(b"From alice@example.org Mon Jan  6 10:00:00 2020\nSubject: hi\n"),
            FormatKind::Mbox
        );
    }

    #[test]
    fn mbox_header_deeper_in() {
        let head = b"Return-Path: <a@b>\nMessage-ID: <x@y>\nSubject: hi\n";
        assert_eq!(sniff_bytes(head), FormatKind::Mbox);
    }

    #[test]
    fn html_doctype() {
        assert_eq!(
            sniff_bytes(b"<!DOCTYPE html><html><body>x</body></html>"),
            FormatKind::Html
        );
    }

    #[test]
    fn binary_garbage_is_unknown() {
        let head: Vec<u8> = (0u8..=255).cycle().take(1024).collect();
        assert_eq!(sniff_bytes(&head), FormatKind::Unknown);
    }

    #[test]
    fn tar_magic_at_offset() {
        let mut head = vec![0u8; 512];
        head[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5].copy_from_slice(b"ustar");
        assert_eq!(sniff_bytes(&head), FormatKind::Tar);
    }

    #[test]
    fn ooxml_container_detected_via_entries() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystery");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<w:document/>").unwrap();
        zip.finish().unwrap();

        assert_eq!(sniff(&path).unwrap(), FormatKind::OfficeOpenXml);
    }
}
