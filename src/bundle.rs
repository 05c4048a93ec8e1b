//! Application bundle layout.

use crate::error::{Error, Result};
use crate::target::Arch;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A `.app` directory.
#[derive(Debug, Clone)]
pub struct Bundle {
    root: PathBuf,
    executable: String,
    plugin_dir: String,
}

impl Bundle {
    /// Open a bundle and locate its main executable.
    ///
    /// The executable name comes from `executable`, then `CFBundleExecutable`
    /// in `Info.plist`, then the bundle's own name.
    pub fn open(root: &Path, executable: Option<&str>, plugin_dir: &str) -> Result<Self> {
        if root.extension().map_or(true, |ext| ext != "app") {
            return Err(Error::invalid_bundle(root, "path must end in .app"));
        }
        if !root.join("Contents").is_dir() {
            return Err(Error::invalid_bundle(root, "missing Contents directory"));
        }
        let root = root.canonicalize()?;

        let executable = match executable {
            Some(name) => name.to_string(),
            None => {
                let from_plist = std::fs::read_to_string(root.join("Contents/Info.plist"))
                    .ok()
                    .and_then(|xml| plist_string(&xml, "CFBundleExecutable"));
                match from_plist {
                    Some(name) => name,
                    None => root
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .ok_or_else(|| Error::invalid_bundle(&root, "unnamed bundle"))?,
                }
            }
        };

        let bundle = Self {
            root,
            executable,
            plugin_dir: plugin_dir.to_string(),
        };
        if !bundle.executable().is_file() {
            return Err(Error::invalid_bundle(
                &bundle.root,
                format!("main executable Contents/MacOS/{} not found", bundle.executable),
            ));
        }
        Ok(bundle)
    }

    /// Canonical bundle path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `App.app`.
    pub fn file_name(&self) -> String {
        self.root
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn contents(&self) -> PathBuf {
        self.root.join("Contents")
    }

    pub fn executable_name(&self) -> &str {
        &self.executable
    }

    pub fn executable(&self) -> PathBuf {
        self.macos_dir().join(&self.executable)
    }

    pub fn macos_dir(&self) -> PathBuf {
        self.contents().join("MacOS")
    }

    /// Libraries directory; created by relocation.
    pub fn frameworks_dir(&self) -> PathBuf {
        self.contents().join("Frameworks")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.contents().join("Plugins").join(&self.plugin_dir)
    }

    pub fn info_plist(&self) -> PathBuf {
        self.contents().join("Info.plist")
    }

    /// Whether `path` lies inside the bundle. `path` must be canonical.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Mach-O files under the plugin directory, sorted.
    ///
    /// Symlinks are skipped; their targets are visited on their own.
    pub fn plugin_binaries(&self) -> Result<Vec<PathBuf>> {
        let dir = self.plugins_dir();
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "bundle has no plugin directory");
            return Ok(Vec::new());
        }

        let mut binaries = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() && macship_macho::is_macho(entry.path()) {
                binaries.push(entry.into_path());
            }
        }
        Ok(binaries)
    }

    /// `CFBundleShortVersionString` from `Info.plist`.
    pub fn short_version(&self) -> Result<String> {
        let path = self.info_plist();
        let xml = std::fs::read_to_string(&path)
            .map_err(|e| Error::invalid_bundle(&self.root, format!("reading Info.plist: {}", e)))?;
        plist_string(&xml, "CFBundleShortVersionString").ok_or_else(|| {
            Error::invalid_bundle(&self.root, "Info.plist has no CFBundleShortVersionString")
        })
    }

    /// Architecture of the main executable.
    ///
    /// Universal executables report their first supported slice.
    pub fn arch(&self) -> Result<Arch> {
        let path = self.executable();
        let info = macship_macho::inspect(&path).map_err(|e| Error::binary(&path, e))?;
        info.archs
            .iter()
            .find_map(|arch| Arch::from_macho(*arch))
            .ok_or_else(|| {
                Error::invalid_bundle(
                    &self.root,
                    "main executable has no x86_64 or arm64 slice",
                )
            })
    }

    /// `codesign` writes `Contents/_CodeSignature/CodeResources`.
    pub fn has_signature(&self) -> bool {
        self.contents()
            .join("_CodeSignature")
            .join("CodeResources")
            .is_file()
    }

    /// `stapler` writes the ticket to `Contents/CodeResources`.
    pub fn has_stapled_ticket(&self) -> bool {
        self.contents().join("CodeResources").is_file()
    }
}

/// The `<string>` value following `<key>{key}</key>` in an XML plist.
///
/// Only handles the flat top-level dictionary produced by build tools,
/// which is all we read.
pub fn plist_string(xml: &str, key: &str) -> Option<String> {
    let marker = format!("<key>{}</key>", key);
    let after = &xml[xml.find(&marker)? + marker.len()..];
    let after = after.trim_start();
    let value = after.strip_prefix("<string>")?;
    let end = value.find("</string>")?;
    Some(unescape_xml(value[..end].trim()))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
