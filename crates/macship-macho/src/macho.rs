//! Mach-O structures and load command parsing.
//!
//! Only little-endian 64-bit images are handled, which covers every
//! `x86_64` and `arm64` slice a macOS bundle can ship.

use crate::{MachoError, Result};
use std::io::{self, Write};

/// Mach-O magic numbers
pub const MH_MAGIC_64: u32 = 0xfeedfacf;
pub const MH_CIGAM_64: u32 = 0xcffaedfe;
pub const MH_MAGIC: u32 = 0xfeedface;
pub const MH_CIGAM: u32 = 0xcefaedfe;

/// File types
pub const MH_EXECUTE: u32 = 0x2;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_BUNDLE: u32 = 0x8;

/// CPU types
pub const CPU_TYPE_X86_64: i32 = 0x0100_0007;
pub const CPU_TYPE_ARM64: i32 = 0x0100_000c;

/// Load command types
pub const LC_REQ_DYLD: u32 = 0x8000_0000;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_RPATH: u32 = 0x1c | LC_REQ_DYLD;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | LC_REQ_DYLD;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;

/// Section types that occupy no file space
const SECTION_TYPE: u32 = 0xff;
const S_ZEROFILL: u32 = 0x1;
const S_GB_ZEROFILL: u32 = 0xc;
const S_THREAD_LOCAL_ZEROFILL: u32 = 0x12;

/// Read a little-endian u32 from a buffer already known to be long enough.
fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Round up to the 8-byte alignment 64-bit load commands require.
pub(crate) fn align8(size: usize) -> usize {
    (size + 7) & !7
}

/// Read a NUL-terminated string starting at `offset` within a load command.
fn cstr_at(bytes: &[u8], offset: usize, what: &str) -> Result<String> {
    let tail = bytes
        .get(offset..)
        .ok_or_else(|| MachoError::Malformed(format!("{} offset {} out of range", what, offset)))?;
    let len = tail.iter().position(|&c| c == 0).unwrap_or(tail.len());
    String::from_utf8(tail[..len].to_vec())
        .map_err(|_| MachoError::Malformed(format!("{} is not valid UTF-8", what)))
}

/// Mach-O 64-bit header
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MachHeader64 {
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

impl MachHeader64 {
    pub const SIZE: usize = 32;

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(MachoError::Truncated("mach header".into()));
        }
        Ok(Self {
            magic: le_u32(buf, 0),
            cputype: le_u32(buf, 4) as i32,
            cpusubtype: le_u32(buf, 8) as i32,
            filetype: le_u32(buf, 12),
            ncmds: le_u32(buf, 16),
            sizeofcmds: le_u32(buf, 20),
            flags: le_u32(buf, 24),
            reserved: le_u32(buf, 28),
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.magic.to_le_bytes())?;
        writer.write_all(&self.cputype.to_le_bytes())?;
        writer.write_all(&self.cpusubtype.to_le_bytes())?;
        writer.write_all(&self.filetype.to_le_bytes())?;
        writer.write_all(&self.ncmds.to_le_bytes())?;
        writer.write_all(&self.sizeofcmds.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        Ok(())
    }
}

/// Segment command (64-bit)
#[derive(Debug, Clone)]
pub struct SegmentCommand64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

impl SegmentCommand64 {
    pub const SIZE: usize = 72;

    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(MachoError::Malformed("segment command too small".into()));
        }
        let mut segname = [0u8; 16];
        segname.copy_from_slice(&bytes[8..24]);

        Ok(Self {
            cmd: le_u32(bytes, 0),
            cmdsize: le_u32(bytes, 4),
            segname,
            vmaddr: le_u64(bytes, 24),
            vmsize: le_u64(bytes, 32),
            fileoff: le_u64(bytes, 40),
            filesize: le_u64(bytes, 48),
            maxprot: le_u32(bytes, 56) as i32,
            initprot: le_u32(bytes, 60) as i32,
            nsects: le_u32(bytes, 64),
            flags: le_u32(bytes, 68),
        })
    }

    pub fn name(&self) -> &str {
        let len = self.segname.iter().position(|&c| c == 0).unwrap_or(16);
        std::str::from_utf8(&self.segname[..len]).unwrap_or("")
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.cmd.to_le_bytes())?;
        writer.write_all(&self.cmdsize.to_le_bytes())?;
        writer.write_all(&self.segname)?;
        writer.write_all(&self.vmaddr.to_le_bytes())?;
        writer.write_all(&self.vmsize.to_le_bytes())?;
        writer.write_all(&self.fileoff.to_le_bytes())?;
        writer.write_all(&self.filesize.to_le_bytes())?;
        writer.write_all(&self.maxprot.to_le_bytes())?;
        writer.write_all(&self.initprot.to_le_bytes())?;
        writer.write_all(&self.nsects.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        Ok(())
    }
}

/// Section (64-bit)
#[derive(Debug, Clone)]
pub struct Section64 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

impl Section64 {
    pub const SIZE: usize = 80;

    fn parse(buf: &[u8]) -> Self {
        let mut sectname = [0u8; 16];
        let mut segname = [0u8; 16];
        sectname.copy_from_slice(&buf[0..16]);
        segname.copy_from_slice(&buf[16..32]);

        Self {
            sectname,
            segname,
            addr: le_u64(buf, 32),
            size: le_u64(buf, 40),
            offset: le_u32(buf, 48),
            align: le_u32(buf, 52),
            reloff: le_u32(buf, 56),
            nreloc: le_u32(buf, 60),
            flags: le_u32(buf, 64),
            reserved1: le_u32(buf, 68),
            reserved2: le_u32(buf, 72),
            reserved3: le_u32(buf, 76),
        }
    }

    pub fn name(&self) -> &str {
        let len = self.sectname.iter().position(|&c| c == 0).unwrap_or(16);
        std::str::from_utf8(&self.sectname[..len]).unwrap_or("")
    }

    /// Whether the section occupies bytes in the file.
    pub fn has_file_data(&self) -> bool {
        let kind = self.flags & SECTION_TYPE;
        self.offset != 0
            && self.size != 0
            && kind != S_ZEROFILL
            && kind != S_GB_ZEROFILL
            && kind != S_THREAD_LOCAL_ZEROFILL
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.sectname)?;
        writer.write_all(&self.segname)?;
        writer.write_all(&self.addr.to_le_bytes())?;
        writer.write_all(&self.size.to_le_bytes())?;
        writer.write_all(&self.offset.to_le_bytes())?;
        writer.write_all(&self.align.to_le_bytes())?;
        writer.write_all(&self.reloff.to_le_bytes())?;
        writer.write_all(&self.nreloc.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.reserved1.to_le_bytes())?;
        writer.write_all(&self.reserved2.to_le_bytes())?;
        writer.write_all(&self.reserved3.to_le_bytes())?;
        Ok(())
    }
}

/// Dylib reference (`LC_ID_DYLIB`, `LC_LOAD_DYLIB` and its variants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DylibCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub name_offset: u32,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
    pub name: String,
}

impl DylibCommand {
    pub const SIZE: usize = 24;

    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(MachoError::Malformed("dylib command too small".into()));
        }
        let name_offset = le_u32(bytes, 8);
        if (name_offset as usize) < Self::SIZE {
            return Err(MachoError::Malformed(format!(
                "dylib name offset {} overlaps command fields",
                name_offset
            )));
        }
        Ok(Self {
            cmd: le_u32(bytes, 0),
            cmdsize: le_u32(bytes, 4),
            name_offset,
            timestamp: le_u32(bytes, 12),
            current_version: le_u32(bytes, 16),
            compatibility_version: le_u32(bytes, 20),
            name: cstr_at(bytes, name_offset as usize, "dylib name")?,
        })
    }

    /// Replace the path, growing the command if the new one does not fit.
    pub fn set_name(&mut self, name: &str) {
        let needed = self.name_offset as usize + name.len() + 1;
        if needed > self.cmdsize as usize {
            self.cmdsize = align8(needed) as u32;
        }
        self.name = name.to_string();
    }

    fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend(&self.cmd.to_le_bytes());
        out.extend(&self.cmdsize.to_le_bytes());
        out.extend(&self.name_offset.to_le_bytes());
        out.extend(&self.timestamp.to_le_bytes());
        out.extend(&self.current_version.to_le_bytes());
        out.extend(&self.compatibility_version.to_le_bytes());
        out.resize(start + self.name_offset as usize, 0);
        out.extend(self.name.as_bytes());
        out.resize(start + self.cmdsize as usize, 0);
    }
}

/// Run-path search entry (`LC_RPATH`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpathCommand {
    pub cmdsize: u32,
    pub path_offset: u32,
    pub path: String,
}

impl RpathCommand {
    pub const SIZE: usize = 12;

    /// Build a fresh run-path command.
    pub fn new(path: &str) -> Self {
        Self {
            cmdsize: align8(Self::SIZE + path.len() + 1) as u32,
            path_offset: Self::SIZE as u32,
            path: path.to_string(),
        }
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(MachoError::Malformed("rpath command too small".into()));
        }
        let path_offset = le_u32(bytes, 8);
        if (path_offset as usize) < Self::SIZE {
            return Err(MachoError::Malformed(format!(
                "rpath offset {} overlaps command fields",
                path_offset
            )));
        }
        Ok(Self {
            cmdsize: le_u32(bytes, 4),
            path_offset,
            path: cstr_at(bytes, path_offset as usize, "rpath")?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend(&LC_RPATH.to_le_bytes());
        out.extend(&self.cmdsize.to_le_bytes());
        out.extend(&self.path_offset.to_le_bytes());
        out.resize(start + self.path_offset as usize, 0);
        out.extend(self.path.as_bytes());
        out.resize(start + self.cmdsize as usize, 0);
    }
}

/// Parsed load command with data
#[derive(Debug, Clone)]
pub enum ParsedLoadCommand {
    Segment64 {
        segment: SegmentCommand64,
        sections: Vec<Section64>,
    },
    Dylib(DylibCommand),
    Rpath(RpathCommand),
    Other {
        cmd: u32,
        data: Vec<u8>,
    },
}

impl ParsedLoadCommand {
    fn parse(cmd: u32, bytes: &[u8]) -> Result<Self> {
        let parsed = match cmd {
            LC_SEGMENT_64 => {
                let segment = SegmentCommand64::parse(bytes)?;
                let needed = SegmentCommand64::SIZE + segment.nsects as usize * Section64::SIZE;
                if needed > bytes.len() {
                    return Err(MachoError::Malformed(format!(
                        "segment {} declares {} sections beyond its command size",
                        segment.name(),
                        segment.nsects
                    )));
                }
                let sections = bytes[SegmentCommand64::SIZE..needed]
                    .chunks_exact(Section64::SIZE)
                    .map(Section64::parse)
                    .collect();
                ParsedLoadCommand::Segment64 { segment, sections }
            }
            LC_ID_DYLIB | LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB
            | LC_LAZY_LOAD_DYLIB | LC_LOAD_UPWARD_DYLIB => {
                ParsedLoadCommand::Dylib(DylibCommand::parse(bytes)?)
            }
            LC_RPATH => ParsedLoadCommand::Rpath(RpathCommand::parse(bytes)?),
            _ => ParsedLoadCommand::Other {
                cmd,
                data: bytes[8..].to_vec(),
            },
        };
        Ok(parsed)
    }

    /// Load command type.
    pub fn cmd(&self) -> u32 {
        match self {
            ParsedLoadCommand::Segment64 { segment, .. } => segment.cmd,
            ParsedLoadCommand::Dylib(dylib) => dylib.cmd,
            ParsedLoadCommand::Rpath(_) => LC_RPATH,
            ParsedLoadCommand::Other { cmd, .. } => *cmd,
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            ParsedLoadCommand::Segment64 { segment, .. } => segment.cmdsize as usize,
            ParsedLoadCommand::Dylib(dylib) => dylib.cmdsize as usize,
            ParsedLoadCommand::Rpath(rpath) => rpath.cmdsize as usize,
            ParsedLoadCommand::Other { data, .. } => data.len() + 8,
        }
    }

    fn write(&self, out: &mut Vec<u8>) -> io::Result<()> {
        match self {
            ParsedLoadCommand::Segment64 { segment, sections } => {
                let start = out.len();
                segment.write(out)?;
                for section in sections {
                    section.write(out)?;
                }
                out.resize(start + segment.cmdsize as usize, 0);
            }
            ParsedLoadCommand::Dylib(dylib) => dylib.write(out),
            ParsedLoadCommand::Rpath(rpath) => rpath.write(out),
            ParsedLoadCommand::Other { cmd, data } => {
                out.extend(&cmd.to_le_bytes());
                out.extend(&((data.len() + 8) as u32).to_le_bytes());
                out.extend(data);
            }
        }
        Ok(())
    }
}

/// The header and load commands of one 64-bit Mach-O image.
#[derive(Debug, Clone)]
pub struct MachoFile {
    pub header: MachHeader64,
    pub load_commands: Vec<ParsedLoadCommand>,
    /// End of the load commands as parsed, relative to the image start.
    commands_end: usize,
    /// First byte owned by segment or section data.
    padding_limit: usize,
}

impl MachoFile {
    /// Parse the header and load commands of an image.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = MachHeader64::parse(data)?;
        match header.magic {
            MH_MAGIC_64 => {}
            MH_CIGAM_64 | MH_CIGAM => {
                return Err(MachoError::Unsupported("big-endian image".into()));
            }
            MH_MAGIC => return Err(MachoError::Unsupported("32-bit image".into())),
            magic => return Err(MachoError::NotMachO { magic }),
        }

        let commands_end = MachHeader64::SIZE + header.sizeofcmds as usize;
        if commands_end > data.len() {
            return Err(MachoError::Truncated(format!(
                "load commands end at {} but image is {} bytes",
                commands_end,
                data.len()
            )));
        }

        let mut load_commands = Vec::with_capacity(header.ncmds as usize);
        let mut offset = MachHeader64::SIZE;
        for index in 0..header.ncmds {
            if offset + 8 > commands_end {
                return Err(MachoError::Malformed(format!(
                    "load command {} starts past sizeofcmds",
                    index
                )));
            }
            let cmd = le_u32(data, offset);
            let cmdsize = le_u32(data, offset + 4) as usize;
            if cmdsize < 8 || offset + cmdsize > commands_end {
                return Err(MachoError::Malformed(format!(
                    "load command {} (0x{:x}) has invalid size {}",
                    index, cmd, cmdsize
                )));
            }
            load_commands.push(ParsedLoadCommand::parse(
                cmd,
                &data[offset..offset + cmdsize],
            )?);
            offset += cmdsize;
        }

        let padding_limit = Self::first_data_offset(&load_commands).unwrap_or(data.len());
        if padding_limit < commands_end {
            return Err(MachoError::Malformed(format!(
                "section data at {} overlaps load commands ending at {}",
                padding_limit, commands_end
            )));
        }

        Ok(Self {
            header,
            load_commands,
            commands_end,
            padding_limit,
        })
    }

    /// Lowest file offset of any section or segment content.
    fn first_data_offset(commands: &[ParsedLoadCommand]) -> Option<usize> {
        let mut lowest: Option<u64> = None;
        let mut consider = |offset: u64| {
            lowest = Some(lowest.map_or(offset, |current| current.min(offset)));
        };

        for cmd in commands {
            if let ParsedLoadCommand::Segment64 { segment, sections } = cmd {
                if segment.fileoff > 0 && segment.filesize > 0 {
                    consider(segment.fileoff);
                }
                for section in sections.iter().filter(|s| s.has_file_data()) {
                    consider(section.offset as u64);
                }
            }
        }

        lowest.map(|offset| offset as usize)
    }

    /// Bytes available for header and load commands.
    pub fn available_space(&self) -> usize {
        self.padding_limit
    }

    /// Bytes currently needed for header and load commands.
    pub fn needed_space(&self) -> usize {
        MachHeader64::SIZE + self.load_commands.iter().map(|c| c.size()).sum::<usize>()
    }

    pub fn install_id(&self) -> Option<&str> {
        self.load_commands.iter().find_map(|cmd| match cmd {
            ParsedLoadCommand::Dylib(dylib) if dylib.cmd == LC_ID_DYLIB => {
                Some(dylib.name.as_str())
            }
            _ => None,
        })
    }

    /// Dylib commands that load another image (everything but `LC_ID_DYLIB`).
    pub fn dependencies(&self) -> impl Iterator<Item = &DylibCommand> {
        self.load_commands.iter().filter_map(|cmd| match cmd {
            ParsedLoadCommand::Dylib(dylib) if dylib.cmd != LC_ID_DYLIB => Some(dylib),
            _ => None,
        })
    }

    pub fn rpaths(&self) -> impl Iterator<Item = &str> {
        self.load_commands.iter().filter_map(|cmd| match cmd {
            ParsedLoadCommand::Rpath(rpath) => Some(rpath.path.as_str()),
            _ => None,
        })
    }

    pub fn has_code_signature(&self) -> bool {
        self.load_commands
            .iter()
            .any(|cmd| cmd.cmd() == LC_CODE_SIGNATURE)
    }

    /// Point every dependency on `old` at `new`. Returns whether anything changed.
    pub fn change_dependency(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for cmd in &mut self.load_commands {
            if let ParsedLoadCommand::Dylib(dylib) = cmd {
                if dylib.cmd != LC_ID_DYLIB && dylib.name == old && old != new {
                    dylib.set_name(new);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Set the install name of a dylib.
    pub fn set_install_id(&mut self, id: &str) -> Result<bool> {
        for cmd in &mut self.load_commands {
            if let ParsedLoadCommand::Dylib(dylib) = cmd {
                if dylib.cmd == LC_ID_DYLIB {
                    if dylib.name == id {
                        return Ok(false);
                    }
                    dylib.set_name(id);
                    return Ok(true);
                }
            }
        }
        Err(MachoError::Unsupported(
            "image has no LC_ID_DYLIB to rename".into(),
        ))
    }

    /// Remove every `LC_RPATH` equal to `path`.
    pub fn delete_rpath(&mut self, path: &str) -> bool {
        let before = self.load_commands.len();
        self.load_commands.retain(|cmd| {
            !matches!(cmd, ParsedLoadCommand::Rpath(rpath) if rpath.path == path)
        });
        self.load_commands.len() != before
    }

    /// Append an `LC_RPATH` unless an identical entry exists.
    pub fn add_rpath(&mut self, path: &str) -> bool {
        if self.rpaths().any(|existing| existing == path) {
            return false;
        }
        self.load_commands
            .push(ParsedLoadCommand::Rpath(RpathCommand::new(path)));
        true
    }

    /// Serialize header and load commands back into the image.
    ///
    /// Bytes between the new end of the load commands and the old end are
    /// zeroed. Fails without touching `image` when the commands no longer
    /// fit before the first section.
    pub fn write_into(&self, image: &mut [u8]) -> Result<()> {
        let mut out = Vec::with_capacity(self.needed_space());
        let mut header = self.header;
        header.ncmds = self.load_commands.len() as u32;
        header.sizeofcmds = (self.needed_space() - MachHeader64::SIZE) as u32;
        header.write(&mut out)?;
        for cmd in &self.load_commands {
            cmd.write(&mut out)?;
        }

        if out.len() > self.padding_limit || out.len() > image.len() {
            return Err(MachoError::InsufficientPadding {
                needed: out.len(),
                available: self.padding_limit.min(image.len()),
            });
        }

        image[..out.len()].copy_from_slice(&out);
        if self.commands_end > out.len() {
            image[out.len()..self.commands_end].fill(0);
        }
        Ok(())
    }
}
