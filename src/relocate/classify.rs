//! Dependency classification.

use std::path::{Component, Path, PathBuf};

/// Libraries every macOS installation ships.
pub const DEFAULT_SYSTEM_PREFIXES: &[&str] = &["/usr/lib/", "/System/"];

/// Where a dependency lives relative to the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Allow-listed system library, never touched.
    System,
    /// Resolves to a file inside the bundle.
    InBundle { path: PathBuf, real: PathBuf },
    /// Resolves to a file outside the bundle; must be copied in.
    External { path: PathBuf, real: PathBuf },
}

/// Allow-list of system library prefixes.
///
/// Package manager prefixes (`/usr/local`, `/opt/homebrew`, `/opt/local`)
/// are never system: their libraries are absent on user machines.
#[derive(Debug, Clone)]
pub struct SystemLibraries {
    prefixes: Vec<String>,
}

impl Default for SystemLibraries {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_SYSTEM_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SystemLibraries {
    /// Defaults plus configured prefixes.
    pub fn with_extra(extra: &[String]) -> Self {
        let mut system = Self::default();
        for prefix in extra {
            if !system.prefixes.contains(prefix) {
                system.prefixes.push(prefix.clone());
            }
        }
        system
    }

    pub fn is_system(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Split `.../Name.framework/Versions/A/Name` into the framework root and
/// the path inside it.
pub fn framework_root(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let mut root = PathBuf::new();
    let mut components = path.components();
    while let Some(component) = components.next() {
        root.push(component);
        if let Component::Normal(name) = component {
            if name.to_string_lossy().ends_with(".framework") {
                let inner: PathBuf = components.collect();
                if inner.as_os_str().is_empty() {
                    return None;
                }
                return Some((root, inner));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prefixes() {
        let system = SystemLibraries::default();
        let cases = [
            ("/usr/lib/libc++.1.dylib", true),
            ("/usr/lib/swift/libswiftCore.dylib", true),
            ("/System/Library/Frameworks/Cocoa.framework/Versions/A/Cocoa", true),
            ("/usr/local/lib/libpng16.16.dylib", false),
            ("/opt/homebrew/lib/libgdal.dylib", false),
            ("/opt/local/lib/libz.1.dylib", false),
            ("@rpath/libCCCoreLib.dylib", false),
            ("/usr/libexec/foo", false),
        ];
        for (path, expected) in cases {
            assert_eq!(system.is_system(path), expected, "{}", path);
        }
    }

    #[test]
    fn test_extra_system_prefixes() {
        let system = SystemLibraries::with_extra(&["/Library/Frameworks/".to_string()]);
        assert!(system.is_system("/Library/Frameworks/Mono.framework/Mono"));
        assert!(system.is_system("/usr/lib/libSystem.B.dylib"));
    }

    #[test]
    fn test_framework_root() {
        let (root, inner) =
            framework_root(Path::new("/opt/qt/lib/QtCore.framework/Versions/5/QtCore")).unwrap();
        assert_eq!(root, PathBuf::from("/opt/qt/lib/QtCore.framework"));
        assert_eq!(inner, PathBuf::from("Versions/5/QtCore"));

        assert!(framework_root(Path::new("/opt/lib/libz.dylib")).is_none());
        assert!(framework_root(Path::new("/opt/lib/QtCore.framework")).is_none());
    }
}
