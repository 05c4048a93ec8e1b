//! Mach-O load command inspection and rewriting.
//!
//! This crate reads the dylib-related load commands of Mach-O binaries
//! (thin 64-bit or universal) and rewrites them in place, the way
//! `otool -L` and `install_name_tool` would:
//!
//! - [`inspect`] lists a binary's install name, dependencies and run paths
//! - [`BinaryEdit`] changes dependency paths, the install name and run paths
//!
//! Rewrites never change the file size: the new load commands must fit in
//! the header padding that precedes the first section.

pub mod dylib;
pub mod edit;
pub mod fat;
pub mod macho;

#[cfg(any(test, feature = "test-support"))]
pub mod fixture;

pub use dylib::{inspect, inspect_bytes, is_macho, Arch, DependencyKind, DylibInfo, LoadedDylib};
pub use edit::BinaryEdit;

use thiserror::Error;

/// Result type for Mach-O operations.
pub type Result<T> = std::result::Result<T, MachoError>;

/// Errors from parsing or rewriting Mach-O binaries.
#[derive(Error, Debug)]
pub enum MachoError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file does not start with a Mach-O or universal magic.
    #[error("not a Mach-O binary (magic 0x{magic:08x})")]
    NotMachO {
        /// The magic number found.
        magic: u32,
    },

    /// A valid Mach-O variant this crate does not handle.
    #[error("unsupported Mach-O: {0}")]
    Unsupported(String),

    /// The file ends before a structure it declares.
    #[error("truncated Mach-O: {0}")]
    Truncated(String),

    /// Structurally invalid load commands.
    #[error("malformed Mach-O: {0}")]
    Malformed(String),

    /// The rewritten load commands would overrun the first section.
    #[error(
        "insufficient header padding: load commands need {needed} bytes, {available} available"
    )]
    InsufficientPadding {
        /// Bytes required for header plus load commands.
        needed: usize,
        /// Bytes available before the first section.
        available: usize,
    },
}
