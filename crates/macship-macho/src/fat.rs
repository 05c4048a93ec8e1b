//! Universal (fat) binary slicing.
//!
//! A universal file is a big-endian table of architectures followed by one
//! complete Mach-O image per architecture. Thin files are treated as a
//! universal file with a single slice covering the whole file.

use crate::macho::{MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64};
use crate::{MachoError, Result};

pub const FAT_MAGIC: u32 = 0xcafebabe;
pub const FAT_MAGIC_64: u32 = 0xcafebabf;

/// Java class files share `FAT_MAGIC`; real universal files have few slices.
const MAX_SLICES: u32 = 32;

/// One architecture image inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub cputype: i32,
    pub offset: usize,
    pub size: usize,
}

impl Slice {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}

fn be_u32(buf: &[u8], at: usize) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| MachoError::Truncated("fat header".into()))
}

fn be_u64(buf: &[u8], at: usize) -> Result<u64> {
    let hi = be_u32(buf, at)? as u64;
    let lo = be_u32(buf, at + 4)? as u64;
    Ok((hi << 32) | lo)
}

/// First four bytes of a file as a native-order magic.
pub fn magic_of(data: &[u8]) -> Option<u32> {
    data.get(0..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Whether the leading bytes look like any Mach-O or universal file.
pub fn has_macho_magic(data: &[u8]) -> bool {
    match magic_of(data) {
        Some(MH_MAGIC_64 | MH_CIGAM_64 | MH_MAGIC | MH_CIGAM) => true,
        Some(_) => matches!(
            data.get(0..4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
            Some(FAT_MAGIC | FAT_MAGIC_64)
        ),
        None => false,
    }
}

/// Split a file into its architecture images.
pub fn slices(data: &[u8]) -> Result<Vec<Slice>> {
    let big_endian_magic = be_u32(data, 0)?;
    let is_64 = match big_endian_magic {
        FAT_MAGIC => false,
        FAT_MAGIC_64 => true,
        _ => {
            // Thin image; the Mach-O parser validates the magic itself.
            let cputype = data
                .get(4..8)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| MachoError::Truncated("mach header".into()))?;
            return Ok(vec![Slice {
                cputype,
                offset: 0,
                size: data.len(),
            }]);
        }
    };

    let count = be_u32(data, 4)?;
    if count == 0 || count > MAX_SLICES {
        return Err(MachoError::NotMachO {
            magic: big_endian_magic,
        });
    }

    let entry_size = if is_64 { 32 } else { 20 };
    let mut result = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let at = 8 + index * entry_size;
        let cputype = be_u32(data, at)? as i32;
        let (offset, size) = if is_64 {
            (be_u64(data, at + 8)? as usize, be_u64(data, at + 16)? as usize)
        } else {
            (be_u32(data, at + 8)? as usize, be_u32(data, at + 12)? as usize)
        };
        if offset.checked_add(size).map_or(true, |end| end > data.len()) {
            return Err(MachoError::Truncated(format!(
                "slice {} ({} bytes at {}) exceeds file size {}",
                index,
                size,
                offset,
                data.len()
            )));
        }
        result.push(Slice {
            cputype,
            offset,
            size,
        });
    }

    Ok(result)
}
