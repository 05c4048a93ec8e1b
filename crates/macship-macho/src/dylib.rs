//! Dylib dependency inspection, the native equivalent of `otool -L -l`.

use crate::fat;
use crate::macho::{
    MachoFile, CPU_TYPE_ARM64, CPU_TYPE_X86_64, LC_LAZY_LOAD_DYLIB, LC_LOAD_UPWARD_DYLIB,
    LC_LOAD_WEAK_DYLIB, LC_REEXPORT_DYLIB, MH_BUNDLE, MH_DYLIB, MH_EXECUTE,
};
use crate::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// CPU architecture of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Arm64,
    Other(i32),
}

impl Arch {
    pub fn from_cputype(cputype: i32) -> Self {
        match cputype {
            CPU_TYPE_X86_64 => Arch::X86_64,
            CPU_TYPE_ARM64 => Arch::Arm64,
            other => Arch::Other(other),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::X86_64 => write!(f, "x86_64"),
            Arch::Arm64 => write!(f, "arm64"),
            Arch::Other(cputype) => write!(f, "cputype-0x{:x}", cputype),
        }
    }
}

/// How a dependency is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Load,
    Weak,
    Reexport,
    Lazy,
    Upward,
}

impl DependencyKind {
    fn from_cmd(cmd: u32) -> Self {
        match cmd {
            LC_LOAD_WEAK_DYLIB => DependencyKind::Weak,
            LC_REEXPORT_DYLIB => DependencyKind::Reexport,
            LC_LAZY_LOAD_DYLIB => DependencyKind::Lazy,
            LC_LOAD_UPWARD_DYLIB => DependencyKind::Upward,
            _ => DependencyKind::Load,
        }
    }
}

/// A dependency as recorded in a load command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDylib {
    pub kind: DependencyKind,
    pub path: String,
}

/// What a binary declares about its own linkage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DylibInfo {
    /// Architectures of every slice.
    pub archs: Vec<Arch>,
    /// `MH_EXECUTE`, `MH_DYLIB`, `MH_BUNDLE`, ...
    pub file_type: u32,
    /// `LC_ID_DYLIB` path for libraries.
    pub install_id: Option<String>,
    /// Dependencies in load order, deduplicated across slices.
    pub dependencies: Vec<LoadedDylib>,
    /// `LC_RPATH` entries, deduplicated across slices.
    pub rpaths: Vec<String>,
    /// Whether any slice carries `LC_CODE_SIGNATURE`.
    pub signed: bool,
}

impl DylibInfo {
    pub fn is_executable(&self) -> bool {
        self.file_type == MH_EXECUTE
    }

    pub fn is_library(&self) -> bool {
        self.file_type == MH_DYLIB || self.file_type == MH_BUNDLE
    }
}

/// Inspect the Mach-O binary at `path`.
pub fn inspect(path: &Path) -> Result<DylibInfo> {
    let data = std::fs::read(path)?;
    inspect_bytes(&data)
}

/// Inspect an in-memory Mach-O binary.
pub fn inspect_bytes(data: &[u8]) -> Result<DylibInfo> {
    let mut info = DylibInfo::default();

    for slice in fat::slices(data)? {
        let macho = MachoFile::parse(&data[slice.range()])?;
        info.archs.push(Arch::from_cputype(macho.header.cputype));
        info.file_type = macho.header.filetype;
        info.signed |= macho.has_code_signature();

        if info.install_id.is_none() {
            info.install_id = macho.install_id().map(str::to_string);
        }
        for dylib in macho.dependencies() {
            if !info.dependencies.iter().any(|d| d.path == dylib.name) {
                info.dependencies.push(LoadedDylib {
                    kind: DependencyKind::from_cmd(dylib.cmd),
                    path: dylib.name.clone(),
                });
            }
        }
        for rpath in macho.rpaths() {
            if !info.rpaths.iter().any(|r| r == rpath) {
                info.rpaths.push(rpath.to_string());
            }
        }
    }

    Ok(info)
}

/// Cheap magic-number check used to skip resources when scanning a bundle.
pub fn is_macho(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map(|_| fat::has_macho_magic(&magic))
        .unwrap_or(false)
}
