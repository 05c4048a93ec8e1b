//! Synthetic Mach-O images for tests.
//!
//! Images carry a `__TEXT` segment with one `__text` section placed after
//! the load commands plus a configurable amount of header padding, which is
//! all the relocation code looks at.

use crate::fat::FAT_MAGIC;
use crate::macho::{
    align8, CPU_TYPE_ARM64, LC_ID_DYLIB, LC_LOAD_DYLIB, LC_LOAD_WEAK_DYLIB, LC_RPATH,
    LC_SEGMENT_64, MH_DYLIB, MH_EXECUTE, MH_MAGIC_64,
};
use std::path::Path;

const DEFAULT_PADDING: usize = 4096;
const TEXT_LEN: usize = 64;
const FAT_ALIGN_SHIFT: u32 = 12;

/// Builder for a thin 64-bit image.
#[derive(Debug, Clone)]
pub struct FixtureBuilder {
    filetype: u32,
    cputype: i32,
    install_id: Option<String>,
    dependencies: Vec<(u32, String)>,
    rpaths: Vec<String>,
    padding: usize,
}

impl FixtureBuilder {
    /// A main executable (`MH_EXECUTE`).
    pub fn executable() -> Self {
        Self {
            filetype: MH_EXECUTE,
            cputype: CPU_TYPE_ARM64,
            install_id: None,
            dependencies: Vec::new(),
            rpaths: Vec::new(),
            padding: DEFAULT_PADDING,
        }
    }

    /// A shared library (`MH_DYLIB`) with the given install name.
    pub fn dylib(install_id: impl Into<String>) -> Self {
        Self {
            filetype: MH_DYLIB,
            install_id: Some(install_id.into()),
            ..Self::executable()
        }
    }

    pub fn cpu(mut self, cputype: i32) -> Self {
        self.cputype = cputype;
        self
    }

    pub fn depends_on(mut self, path: impl Into<String>) -> Self {
        self.dependencies.push((LC_LOAD_DYLIB, path.into()));
        self
    }

    pub fn weak_dependency(mut self, path: impl Into<String>) -> Self {
        self.dependencies.push((LC_LOAD_WEAK_DYLIB, path.into()));
        self
    }

    pub fn rpath(mut self, path: impl Into<String>) -> Self {
        self.rpaths.push(path.into());
        self
    }

    /// Free bytes between the load commands and the first section.
    pub fn header_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut commands = Vec::new();
        let mut ncmds = 1u32;

        if let Some(id) = &self.install_id {
            push_dylib(&mut commands, LC_ID_DYLIB, id);
            ncmds += 1;
        }
        for (cmd, path) in &self.dependencies {
            push_dylib(&mut commands, *cmd, path);
            ncmds += 1;
        }
        for path in &self.rpaths {
            let size = align8(12 + path.len() + 1);
            let start = commands.len();
            commands.extend(&LC_RPATH.to_le_bytes());
            commands.extend(&(size as u32).to_le_bytes());
            commands.extend(&12u32.to_le_bytes());
            commands.extend(path.as_bytes());
            commands.resize(start + size, 0);
            ncmds += 1;
        }

        let segment_size = 72 + 80;
        let sizeofcmds = segment_size + commands.len();
        let text_offset = 32 + sizeofcmds + self.padding;
        let total = text_offset + TEXT_LEN;

        let mut out = Vec::with_capacity(total);
        out.extend(&MH_MAGIC_64.to_le_bytes());
        out.extend(&self.cputype.to_le_bytes());
        out.extend(&0i32.to_le_bytes());
        out.extend(&self.filetype.to_le_bytes());
        out.extend(&ncmds.to_le_bytes());
        out.extend(&(sizeofcmds as u32).to_le_bytes());
        out.extend(&0x0020_0085u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());

        // __TEXT segment with a single __text section.
        out.extend(&LC_SEGMENT_64.to_le_bytes());
        out.extend(&(segment_size as u32).to_le_bytes());
        out.extend(&name16("__TEXT"));
        out.extend(&0u64.to_le_bytes());
        out.extend(&(total as u64).to_le_bytes());
        out.extend(&0u64.to_le_bytes());
        out.extend(&(total as u64).to_le_bytes());
        out.extend(&5i32.to_le_bytes());
        out.extend(&5i32.to_le_bytes());
        out.extend(&1u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());

        out.extend(&name16("__text"));
        out.extend(&name16("__TEXT"));
        out.extend(&(text_offset as u64).to_le_bytes());
        out.extend(&(TEXT_LEN as u64).to_le_bytes());
        out.extend(&(text_offset as u32).to_le_bytes());
        out.extend(&2u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());
        out.extend(&0x8000_0400u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());
        out.extend(&0u32.to_le_bytes());

        out.extend(&commands);
        out.resize(text_offset, 0);
        out.resize(total, 0xc3);
        out
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.build())
    }
}

fn name16(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..name.len()].copy_from_slice(name.as_bytes());
    out
}

fn push_dylib(out: &mut Vec<u8>, cmd: u32, path: &str) {
    let size = align8(24 + path.len() + 1);
    let start = out.len();
    out.extend(&cmd.to_le_bytes());
    out.extend(&(size as u32).to_le_bytes());
    out.extend(&24u32.to_le_bytes());
    out.extend(&2u32.to_le_bytes());
    out.extend(&0x0001_0000u32.to_le_bytes());
    out.extend(&0x0001_0000u32.to_le_bytes());
    out.extend(path.as_bytes());
    out.resize(start + size, 0);
}

/// Wrap thin images into a universal file.
pub fn fat(images: &[Vec<u8>]) -> Vec<u8> {
    let align = 1usize << FAT_ALIGN_SHIFT;
    let mut offset = align8(8 + images.len() * 20).max(align);
    let mut table = Vec::new();
    let mut placements = Vec::new();

    table.extend(&FAT_MAGIC.to_be_bytes());
    table.extend(&(images.len() as u32).to_be_bytes());
    for image in images {
        let cputype = i32::from_le_bytes([image[4], image[5], image[6], image[7]]);
        table.extend(&cputype.to_be_bytes());
        table.extend(&0i32.to_be_bytes());
        table.extend(&(offset as u32).to_be_bytes());
        table.extend(&(image.len() as u32).to_be_bytes());
        table.extend(&FAT_ALIGN_SHIFT.to_be_bytes());
        placements.push(offset);
        offset = (offset + image.len() + align - 1) & !(align - 1);
    }

    let mut out = table;
    for (image, at) in images.iter().zip(placements) {
        out.resize(at, 0);
        out.extend(image);
    }
    out
}
