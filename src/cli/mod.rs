//! CLI command implementations.

pub mod build;
pub mod config;
pub mod deps;
pub mod dmg;
pub mod notarize;
pub mod parsers;
pub mod relocate;
pub mod sign;
pub mod staple;
pub mod status;

use clap::Args;
use macship::pipeline::PipelineState;
use macship::{Arch, Bundle, Error, MacshipConfig, Result, Target, WorkDir};
use std::path::{Path, PathBuf};

/// Configuration and work directory shared by all commands.
#[derive(Debug)]
pub struct Context {
    pub config: MacshipConfig,
    /// File the configuration was read from, if any.
    pub config_path: Option<PathBuf>,
    pub workdir: WorkDir,
}

impl Context {
    pub fn new(
        config: MacshipConfig,
        config_path: Option<PathBuf>,
        workdir: Option<PathBuf>,
    ) -> Self {
        let workdir = WorkDir::new(workdir.unwrap_or_else(|| config.workdir.clone()));
        Self {
            config,
            config_path,
            workdir,
        }
    }

    /// Directory relative config paths (dmg assets) are resolved against.
    pub fn config_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn state_path(&self, arch: Arch) -> PathBuf {
        self.workdir.state_path(arch)
    }

    pub fn load_state(&self, arch: Arch) -> Result<PipelineState> {
        PipelineState::load(&self.state_path(arch), arch)
    }

    /// Open `explicit`, or the bundle recorded by `macship build`.
    pub fn open_bundle(&self, explicit: Option<&Path>, state: &PipelineState) -> Result<Bundle> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| state.bundle.clone())
            .ok_or_else(|| {
                Error::State(format!(
                    "no bundle recorded for {}; pass the bundle path",
                    state.arch
                ))
            })?;
        Bundle::open(
            &path,
            self.config.app.executable.as_deref(),
            &self.config.app.plugin_dir,
        )
    }
}

/// Target selection shared by the build stages.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target architecture (x86_64 or arm64). Defaults to the host.
    #[arg(long, value_parser = parsers::parse_arch)]
    pub arch: Option<Arch>,

    /// Minimum macOS version (default: 10.15 for x86_64, 11.0 for arm64).
    #[arg(long = "macos-version", value_name = "VERSION")]
    pub macos_version: Option<String>,
}

impl TargetArgs {
    pub fn arch(&self) -> Result<Arch> {
        self.arch.or_else(Arch::host).ok_or_else(|| {
            Error::config("cannot target the host architecture; pass --arch")
        })
    }

    pub fn target(&self) -> Result<Target> {
        Target::new(self.arch()?, self.macos_version.as_deref())
    }

    /// Architecture for a stage working on an existing bundle: `--arch`,
    /// else the bundle's main executable, else the host.
    pub fn arch_for_bundle(&self, bundle: Option<&Path>, ctx: &Context) -> Result<Arch> {
        if let Some(arch) = self.arch {
            return Ok(arch);
        }
        if let Some(path) = bundle {
            let bundle = Bundle::open(
                path,
                ctx.config.app.executable.as_deref(),
                &ctx.config.app.plugin_dir,
            )?;
            return bundle.arch();
        }
        self.arch()
    }
}
