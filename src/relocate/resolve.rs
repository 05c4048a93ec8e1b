//! Dependency path resolution, following dyld's rules.

use std::path::{Path, PathBuf};

const EXECUTABLE_PATH: &str = "@executable_path/";
const LOADER_PATH: &str = "@loader_path/";
const RPATH: &str = "@rpath/";

/// Resolves load command paths to files.
#[derive(Debug, Clone)]
pub struct Resolver {
    executable_dir: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl Resolver {
    /// `executable_dir` is the bundle's `Contents/MacOS`; `search_paths`
    /// are tried for bare library names.
    pub fn new(executable_dir: PathBuf, search_paths: Vec<PathBuf>) -> Self {
        Self {
            executable_dir,
            search_paths,
        }
    }

    /// Expand `@executable_path` and `@loader_path` in an rpath entry.
    ///
    /// Returns `None` for relative entries, which dyld ignores.
    pub fn expand(&self, path: &str, loader_dir: &Path) -> Option<PathBuf> {
        if let Some(rest) = path.strip_prefix(EXECUTABLE_PATH) {
            Some(self.executable_dir.join(rest))
        } else if let Some(rest) = path.strip_prefix(LOADER_PATH) {
            Some(loader_dir.join(rest))
        } else if path == "@executable_path" {
            Some(self.executable_dir.clone())
        } else if path == "@loader_path" {
            Some(loader_dir.to_path_buf())
        } else if path.starts_with('/') {
            Some(PathBuf::from(path))
        } else {
            None
        }
    }

    /// Resolve a dependency path to an existing file.
    ///
    /// `loader_dirs` are candidate directories of the referencing binary,
    /// tried in order. `rpaths` is the expanded run-path stack, the
    /// binary's own entries first.
    pub fn resolve(&self, reference: &str, loader_dirs: &[&Path], rpaths: &[PathBuf]) -> Option<PathBuf> {
        let found = |candidate: PathBuf| candidate.is_file().then_some(candidate);

        if let Some(rest) = reference.strip_prefix(RPATH) {
            return rpaths.iter().find_map(|dir| found(dir.join(rest)));
        }
        if let Some(rest) = reference.strip_prefix(EXECUTABLE_PATH) {
            return found(self.executable_dir.join(rest));
        }
        if let Some(rest) = reference.strip_prefix(LOADER_PATH) {
            return loader_dirs.iter().find_map(|dir| found(dir.join(rest)));
        }
        if reference.starts_with('/') {
            return found(PathBuf::from(reference));
        }
        if reference.starts_with('@') {
            return None;
        }

        // Bare name recorded by a library built without an install name.
        self.search_paths
            .iter()
            .find_map(|dir| found(dir.join(reference)))
    }
}
