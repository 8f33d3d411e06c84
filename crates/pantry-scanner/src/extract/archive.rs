//! Module archive unpacking
//!
//! Archives come from an untrusted upstream. Every entry is resolved against
//! the scratch root and rejected on its own if it would land outside of it;
//! the remaining entries are still unpacked.

use regex::Regex;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::ExtractError;

/// Case-insensitive README match on the end of an entry name
pub const README_PATTERN: &str = r"(?i)readme(\.md|\.txt)?$";

/// What unpacking produced
#[derive(Debug, Default)]
pub struct UnpackedArchive {
    /// Concatenated README text, one trailing newline per file
    pub readme: String,
    pub files_written: usize,
    /// Entries refused because they resolved outside the scratch root
    pub rejected: usize,
    /// README files skipped because they were not valid UTF-8
    pub skipped_readmes: usize,
}

/// Unpack `data` into `root`
///
/// Entries under `module_prefix` (`<path>@<version>`) are written relative to
/// it, so `root` becomes the module root. Entries outside the prefix are kept
/// at their archive path.
///
/// At most `max_unpacked_bytes` are written in total. Sizes declared by the
/// archive are not trusted: reads are bounded by the remaining budget, and
/// going over it fails the whole archive.
pub fn unpack_archive(
    data: &[u8],
    root: &Path,
    module_prefix: &str,
    readme_pattern: &Regex,
    max_unpacked_bytes: u64,
) -> Result<UnpackedArchive, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut unpacked = UnpackedArchive::default();
    let mut remaining = max_unpacked_bytes;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();

        let Some(destination) = destination(root, module_prefix, &name, entry.enclosed_name())
        else {
            warn!(entry = %name, "Rejecting archive entry outside the scratch directory");
            unpacked.rejected += 1;
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        if entry.size() > remaining {
            return Err(ExtractError::UnpackLimit {
                entry: name,
                limit: max_unpacked_bytes,
            });
        }

        let mut content = Vec::new();
        entry.by_ref().take(remaining.saturating_add(1)).read_to_end(&mut content)?;
        let size = content.len() as u64;
        if size > remaining {
            return Err(ExtractError::UnpackLimit {
                entry: name,
                limit: max_unpacked_bytes,
            });
        }
        remaining -= size;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&destination, &content)?;
        unpacked.files_written += 1;

        if readme_pattern.is_match(&name) {
            match String::from_utf8(content) {
                Ok(text) => {
                    unpacked.readme.push_str(&text);
                    unpacked.readme.push('\n');
                }
                Err(_) => {
                    debug!(entry = %name, "README is not valid UTF-8, skipping");
                    unpacked.skipped_readmes += 1;
                }
            }
        }
    }

    Ok(unpacked)
}

/// Destination of an entry, or `None` when it must not be written
fn destination(
    root: &Path,
    module_prefix: &str,
    name: &str,
    enclosed: Option<PathBuf>,
) -> Option<PathBuf> {
    let enclosed = enclosed?;
    let relative = enclosed
        .strip_prefix(module_prefix)
        .map(Path::to_path_buf)
        .unwrap_or(enclosed);

    if relative.as_os_str().is_empty() {
        // The module root directory entry itself
        return Some(root.to_path_buf());
    }

    // `enclosed_name` allows `a/../b`; once the prefix is gone that can climb out.
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        debug!(entry = %name, "Entry escapes the module root");
        return None;
    }

    Some(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const LIMIT: u64 = 1 << 20;

    fn readme_regex() -> Regex {
        Regex::new(README_PATTERN).unwrap()
    }

    /// Stored single-entry archive whose ZIP64 extra fields declare
    /// `declared_size` uncompressed bytes while carrying no data
    fn zip64_declaring(name: &str, declared_size: u64) -> Vec<u8> {
        let name = name.as_bytes();
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&declared_size.to_le_bytes());
        extra.extend_from_slice(&0u64.to_le_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&[0; 4]); // flags, method
        out.extend_from_slice(&[0; 4]); // time, date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&extra);

        let cd_offset = out.len() as u32;
        out.extend_from_slice(&0x02014b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes()); // version made by
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&[0; 4]); // flags, method
        out.extend_from_slice(&[0; 4]); // time, date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0; 8]); // comment len, disk, internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        out.extend_from_slice(name);
        out.extend_from_slice(&extra);
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(&0x06054b50u32.to_le_bytes());
        out.extend_from_slice(&[0; 4]); // disk numbers
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_readme_blob_in_archive_order() {
        let data = build_zip(&[
            ("example.com/foo@v1.0.0/README.md", b"# Foo"),
            ("example.com/foo@v1.0.0/foo.go", b"package foo"),
            ("example.com/foo@v1.0.0/docs/readme.txt", b"more"),
        ]);
        let scratch = tempfile::tempdir().unwrap();

        let unpacked = unpack_archive(
            &data,
            scratch.path(),
            "example.com/foo@v1.0.0",
            &readme_regex(),
            LIMIT,
        )
        .unwrap();

        assert_eq!(unpacked.readme, "# Foo\nmore\n");
        assert_eq!(unpacked.files_written, 3);
        assert!(scratch.path().join("foo.go").is_file());
        assert!(scratch.path().join("docs/readme.txt").is_file());
    }

    #[test]
    fn test_readme_match_is_case_insensitive_and_anchored() {
        let pattern = readme_regex();
        assert!(pattern.is_match("a@v1/README"));
        assert!(pattern.is_match("a@v1/ReadMe.MD"));
        assert!(pattern.is_match("a@v1/sub/readme.txt"));
        assert!(!pattern.is_match("a@v1/README.rst"));
        assert!(!pattern.is_match("a@v1/readme.md.bak"));
    }

    #[test]
    fn test_invalid_utf8_readme_is_skipped() {
        let data = build_zip(&[
            ("m@v1/README", &[0xff, 0xfe, 0x00]),
            ("m@v1/sub/README.md", b"ok"),
        ]);
        let scratch = tempfile::tempdir().unwrap();

        let unpacked = unpack_archive(&data, scratch.path(), "m@v1", &readme_regex(), LIMIT).unwrap();

        assert_eq!(unpacked.readme, "ok\n");
        assert_eq!(unpacked.skipped_readmes, 1);
    }

    #[test]
    fn test_traversal_entry_rejected_others_written() {
        let data = build_zip(&[
            ("../../etc/passwd", b"root:x:0:0"),
            ("m@v1/README.md", b"hello"),
            ("m@v1/main.go", b"package main"),
        ]);
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("job");
        fs::create_dir_all(&root).unwrap();

        let unpacked = unpack_archive(&data, &root, "m@v1", &readme_regex(), LIMIT).unwrap();

        assert_eq!(unpacked.rejected, 1);
        assert_eq!(unpacked.files_written, 2);
        assert_eq!(unpacked.readme, "hello\n");
        assert!(!outer.path().join("etc/passwd").exists());
        assert!(root.join("main.go").is_file());
    }

    #[test]
    fn test_parent_dir_under_module_prefix_is_rejected() {
        let data = build_zip(&[
            ("m@v1/../escaped.txt", b"out"),
            ("m@v1/sub/../../escaped-too.txt", b"out"),
            ("m@v1/ok.go", b"package ok"),
        ]);
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("job");
        fs::create_dir_all(&root).unwrap();

        let unpacked = unpack_archive(&data, &root, "m@v1", &readme_regex(), LIMIT).unwrap();

        assert_eq!(unpacked.rejected, 2);
        assert_eq!(unpacked.files_written, 1);
        assert!(!outer.path().join("escaped.txt").exists());
        assert!(!outer.path().join("escaped-too.txt").exists());
        assert!(root.join("ok.go").is_file());
    }

    #[test]
    fn test_declared_size_beyond_limit_fails_without_allocating() {
        let data = zip64_declaring("m@v1/huge.bin", 1 << 62);
        let scratch = tempfile::tempdir().unwrap();

        let result = unpack_archive(&data, scratch.path(), "m@v1", &readme_regex(), LIMIT);

        assert!(result.is_err());
        assert!(!scratch.path().join("huge.bin").exists());
    }

    #[test]
    fn test_total_unpacked_size_is_bounded() {
        let data = build_zip(&[
            ("m@v1/a.bin", &[7u8; 600]),
            ("m@v1/b.bin", &[7u8; 600]),
        ]);
        let scratch = tempfile::tempdir().unwrap();

        let result = unpack_archive(&data, scratch.path(), "m@v1", &readme_regex(), 1000);

        assert!(matches!(
            result,
            Err(ExtractError::UnpackLimit { ref entry, limit: 1000 }) if entry == "m@v1/b.bin"
        ));

        let fits = unpack_archive(&data, scratch.path(), "m@v1", &readme_regex(), 1200).unwrap();
        assert_eq!(fits.files_written, 2);
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let scratch = tempfile::tempdir().unwrap();
        let result = unpack_archive(b"not a zip", scratch.path(), "m@v1", &readme_regex(), LIMIT);
        assert!(matches!(result, Err(ExtractError::Archive(_))));
    }
}
