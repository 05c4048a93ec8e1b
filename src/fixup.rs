//! Load path fixups.
//!
//! Some libraries record dependencies by bare name or relative to an
//! executable they are never installed next to. A fixup changes one such
//! reference in every binary matching a file-name pattern.

use crate::config::LoadPathFixup;
use crate::error::{Error, Result};
use macship_macho::BinaryEdit;
use std::path::{Path, PathBuf};

/// Apply `fixups` to binaries under `base`.
///
/// Patterns are relative to `base`; only their last component may contain
/// `*`. Symlinks and non Mach-O files are skipped. Returns the rewritten
/// binaries.
pub fn apply(base: &Path, fixups: &[LoadPathFixup], prefix: &Path) -> Result<Vec<PathBuf>> {
    let mut rewritten = Vec::new();

    for fixup in fixups {
        let new = fixup.new_path(prefix);
        let matches = matching_files(base, &fixup.pattern)?;
        if matches.is_empty() {
            tracing::warn!(pattern = %fixup.pattern, base = %base.display(), "fixup matched no files");
        }

        for path in matches {
            let metadata = std::fs::symlink_metadata(&path)?;
            if metadata.file_type().is_symlink() || !metadata.is_file() {
                continue;
            }
            if !macship_macho::is_macho(&path) {
                continue;
            }

            let mut edit = BinaryEdit::new();
            edit.change_dependency(&fixup.old, &new);
            let changed = edit
                .apply_to_file(&path)
                .map_err(|e| Error::binary(&path, e))?;
            if changed {
                tracing::info!(binary = %path.display(), old = %fixup.old, new = %new, "fixed load path");
                rewritten.push(path);
            }
        }
    }

    Ok(rewritten)
}

/// Files in the pattern's directory whose names match its last component.
fn matching_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = Path::new(pattern);
    let name = pattern
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::config(format!("invalid fixup pattern '{}'", pattern.display())))?;
    let dir = match pattern.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => base.join(parent),
        _ => base.to_path_buf(),
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| glob_match(&name, &entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    files.sort();
    Ok(files)
}

/// Match `name` against a pattern where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if name.len() < first.len() + last.len() || !name.starts_with(first) || !name.ends_with(last)
    {
        return false;
    }

    let mut rest = &name[first.len()..name.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use macship_macho::fixture::FixtureBuilder;

    #[test]
    fn test_glob_match() {
        let cases = [
            ("libpcl_*", "libpcl_common.1.12.dylib", true),
            ("libpcl_*", "libpcl_", true),
            ("libpdalcpp*.dylib", "libpdalcpp.13.dylib", true),
            ("libpdalcpp*.dylib", "libpdalcpp.13.a", false),
            ("libQPCL*.dylib", "libQPCL_IO.dylib", true),
            ("lib*_*.dylib", "libpcl_io.dylib", true),
            ("lib*_*.dylib", "libpclio.dylib", false),
            ("*a*a", "aa", true),
            ("*a*a", "a", false),
            ("exact.dylib", "exact.dylib", true),
            ("exact.dylib", "exact.dylibx", false),
        ];
        for (pattern, name, expected) in cases {
            assert_eq!(glob_match(pattern, name), expected, "{} vs {}", pattern, name);
        }
    }

    #[test]
    fn test_apply_rewrites_matching_binaries_only() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();

        let matched = lib.join("libpcl_io.1.12.dylib");
        let other = lib.join("libother.dylib");
        FixtureBuilder::dylib("@rpath/libpcl_io.1.12.dylib")
            .depends_on("libflann_cpp.1.9.dylib")
            .write_to(&matched)
            .unwrap();
        FixtureBuilder::dylib("@rpath/libother.dylib")
            .depends_on("libflann_cpp.1.9.dylib")
            .write_to(&other)
            .unwrap();
        std::fs::write(lib.join("libpcl_notes.txt"), b"not a binary").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("libpcl_io.1.12.dylib", lib.join("libpcl_io.dylib")).unwrap();

        let fixups = vec![LoadPathFixup {
            pattern: "lib/libpcl_*".into(),
            old: "libflann_cpp.1.9.dylib".into(),
            new: "{prefix}/lib/libflann_cpp.1.9.dylib".into(),
        }];
        let prefix = Path::new("/w/arm64/install");
        let rewritten = apply(dir.path(), &fixups, prefix).unwrap();
        assert_eq!(rewritten, vec![matched.clone()]);

        let info = macship_macho::inspect(&matched).unwrap();
        assert_eq!(
            info.dependencies[0].path,
            "/w/arm64/install/lib/libflann_cpp.1.9.dylib"
        );
        let untouched = macship_macho::inspect(&other).unwrap();
        assert_eq!(untouched.dependencies[0].path, "libflann_cpp.1.9.dylib");

        // Second run finds nothing left to change.
        assert!(apply(dir.path(), &fixups, prefix).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fixups = vec![LoadPathFixup {
            pattern: "Plugins/none/*.dylib".into(),
            old: "a".into(),
            new: "b".into(),
        }];
        assert!(apply(dir.path(), &fixups, dir.path()).unwrap().is_empty());
    }
}
