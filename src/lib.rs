//! macship - release pipeline for macOS application bundles.
//!
//! macship drives one application's release through a fixed sequence of
//! stages, each a separate invocation:
//!
//! 1. [`deps`]: build third-party libraries into a per-architecture prefix
//! 2. [`app`]: build the application bundle against that prefix
//! 3. [`relocate`]: copy external libraries into the bundle and rewrite
//!    load commands so the bundle is self-contained
//! 4. [`sign`] and [`notarize`]: sign, upload for notarization, staple
//! 5. [`dmg`]: package the finalized bundle into a disk image
//!
//! Progress is recorded per architecture by [`pipeline`], which refuses
//! to run a stage before its predecessor completed.

pub mod app;
pub mod bundle;
pub mod config;
pub mod copy;
pub mod deps;
pub mod dmg;
pub mod error;
pub mod fixup;
pub mod notarize;
pub mod pipeline;
pub mod relocate;
pub mod sign;
pub mod target;
pub mod tool;
pub mod workdir;

pub use bundle::Bundle;
pub use config::MacshipConfig;
pub use error::{Error, Result};
pub use pipeline::{PipelineState, Stage, Step};
pub use target::{Arch, Target};
pub use workdir::WorkDir;

/// macship version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
