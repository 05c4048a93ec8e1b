//! Build target: architecture and minimum macOS version.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CPU architecture a release is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    /// Intel 64-bit.
    #[serde(rename = "x86_64")]
    X86_64,
    /// Apple silicon.
    #[serde(rename = "arm64")]
    Arm64,
}

impl Arch {
    /// Architecture of the machine running macship, if it is one we target.
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Arch::X86_64),
            "aarch64" => Some(Arch::Arm64),
            _ => None,
        }
    }

    /// Name used by Apple tools and in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Oldest macOS release that supports the architecture.
    pub fn default_min_macos(&self) -> &'static str {
        match self {
            Arch::X86_64 => "10.15",
            Arch::Arm64 => "11.0",
        }
    }

    /// Clang target triple.
    pub fn triple(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64-apple-darwin",
            Arch::Arm64 => "arm64-apple-darwin",
        }
    }

    /// Convert the architecture read from a Mach-O header.
    pub fn from_macho(arch: macship_macho::Arch) -> Option<Self> {
        match arch {
            macship_macho::Arch::X86_64 => Some(Arch::X86_64),
            macship_macho::Arch::Arm64 => Some(Arch::Arm64),
            macship_macho::Arch::Other(_) => None,
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "x86-64" | "amd64" | "intel" => Ok(Arch::X86_64),
            "arm64" | "aarch64" | "apple" => Ok(Arch::Arm64),
            other => Err(Error::config(format!(
                "unknown architecture '{}' (expected x86_64 or arm64)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture plus deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub arch: Arch,
    pub min_macos: String,
}

impl Target {
    /// Build a target, defaulting the macOS version per architecture.
    pub fn new(arch: Arch, min_macos: Option<&str>) -> Result<Self> {
        let min_macos = min_macos.unwrap_or(arch.default_min_macos());
        let valid = !min_macos.is_empty()
            && min_macos
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if !valid {
            return Err(Error::config(format!(
                "invalid macOS version '{}' (expected e.g. 11.0)",
                min_macos
            )));
        }

        Ok(Self {
            arch,
            min_macos: min_macos.to_string(),
        })
    }

    /// Whether the target differs from the machine we are running on.
    pub fn is_cross(&self) -> bool {
        Arch::host() != Some(self.arch)
    }
}
