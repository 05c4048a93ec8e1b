//! Work directory layout.
//!
//! ```text
//! <workdir>/
//!   sources/<dependency>/          downloads and checkouts, shared by archs
//!   <arch>/
//!     builds/<dependency>/         out-of-tree build directories
//!     builds/<app>/                application build directory
//!     install/{bin,include,lib}    install prefix
//!     <App>-<version>/             application install tree
//!     pipeline.json                stage record
//! ```

use crate::target::Arch;
use std::path::{Path, PathBuf};

/// Root of all intermediate and output files.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Downloaded sources, shared across architectures.
    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    pub fn arch_dir(&self, arch: Arch) -> PathBuf {
        self.root.join(arch.as_str())
    }

    pub fn build_dir(&self, arch: Arch, name: &str) -> PathBuf {
        self.arch_dir(arch).join("builds").join(name)
    }

    pub fn prefix(&self, arch: Arch) -> InstallPrefix {
        InstallPrefix::new(self.arch_dir(arch).join("install"))
    }

    /// Where the application build installs `<App>-<version>`.
    pub fn app_install_dir(&self, arch: Arch, app: &str, version: &str) -> PathBuf {
        self.arch_dir(arch).join(format!("{}-{}", app, version))
    }

    pub fn state_path(&self, arch: Arch) -> PathBuf {
        self.arch_dir(arch).join("pipeline.json")
    }
}

/// Common install root for built dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPrefix {
    root: PathBuf,
}

impl InstallPrefix {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lib(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn include(&self) -> PathBuf {
        self.root.join("include")
    }

    pub fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn pkgconfig(&self) -> PathBuf {
        self.lib().join("pkgconfig")
    }

    /// CMake package config directory.
    pub fn cmake_dir(&self) -> PathBuf {
        self.lib().join("cmake")
    }

    /// Create the standard subdirectories.
    pub fn create(&self) -> std::io::Result<()> {
        for dir in [self.lib(), self.include(), self.bin(), self.pkgconfig()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let workdir = WorkDir::new("/w");
        assert_eq!(workdir.sources_dir(), PathBuf::from("/w/sources"));
        assert_eq!(
            workdir.build_dir(Arch::Arm64, "flann"),
            PathBuf::from("/w/arm64/builds/flann")
        );
        assert_eq!(
            workdir.prefix(Arch::X86_64).lib(),
            PathBuf::from("/w/x86_64/install/lib")
        );
        assert_eq!(
            workdir.app_install_dir(Arch::Arm64, "CloudCompare", "2.12.0"),
            PathBuf::from("/w/arm64/CloudCompare-2.12.0")
        );
        assert_eq!(
            workdir.state_path(Arch::Arm64),
            PathBuf::from("/w/arm64/pipeline.json")
        );
    }

    #[test]
    fn test_prefix_create() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = InstallPrefix::new(dir.path().join("install"));
        prefix.create().unwrap();
        assert!(prefix.pkgconfig().is_dir());
        assert!(prefix.include().is_dir());
        assert!(prefix.bin().is_dir());
    }
}
