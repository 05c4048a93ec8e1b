//! Dependency builder.
//!
//! Compiles the configured third-party libraries, in order, into the
//! architecture's install prefix:
//! - [`source`]: download, checksum and extraction, or git checkout
//! - [`build_system`]: configure, build and install commands per build system
//!
//! The first failure aborts the whole run.

pub mod build_system;
pub mod source;

pub use build_system::{BuildContext, BuildSystem, CompilerFlags};

use crate::config::{BuildSpec, DependencySpec, LoadPathFixup, SourceSpec};
use crate::error::{Error, Result};
use crate::fixup;
use crate::target::Target;
use crate::tool::{self, BuildEnv};
use crate::workdir::WorkDir;
use std::process::Command;

/// Outcome of a dependency run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Dependencies built, in order.
    pub built: Vec<String>,
    /// Prefix libraries rewritten by post-install fixups.
    pub fixed: usize,
}

/// Builds dependencies for one target.
pub struct DependencyBuilder<'a> {
    workdir: &'a WorkDir,
    target: Target,
    jobs: usize,
}

impl<'a> DependencyBuilder<'a> {
    pub fn new(workdir: &'a WorkDir, target: Target, jobs: usize) -> Self {
        Self {
            workdir,
            target,
            jobs: jobs.max(1),
        }
    }

    /// Tools the given dependencies need.
    pub fn required_tools(dependencies: &[&DependencySpec]) -> Vec<&'static str> {
        let mut tools = Vec::new();
        let mut add = |tool: &'static str| {
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        };

        for dep in dependencies {
            match &dep.source {
                SourceSpec::Archive { .. } => {
                    add("curl");
                    add("tar");
                }
                SourceSpec::Git { .. } => add("git"),
            }
            match &dep.build {
                BuildSpec::Cmake { .. } => {
                    add("cmake");
                    add("ninja");
                }
                BuildSpec::Autotools { .. } | BuildSpec::Qt5 { .. } => add("make"),
                BuildSpec::Boost => {}
            }
        }
        tools
    }

    /// Build `dependencies` in order, then apply `post_install` fixups to
    /// the prefix libraries.
    pub fn build_all(
        &self,
        dependencies: &[&DependencySpec],
        post_install: &[LoadPathFixup],
    ) -> Result<DependencyReport> {
        tool::require(&Self::required_tools(dependencies))?;

        let prefix = self.workdir.prefix(self.target.arch);
        prefix.create()?;
        let env = BuildEnv::new(&prefix);

        let mut report = DependencyReport::default();
        for (index, dep) in dependencies.iter().enumerate() {
            println!(
                "[{}/{}] {} ({})",
                index + 1,
                dependencies.len(),
                dep.name,
                self.target.arch
            );
            self.build_one(dep, &env)?;
            report.built.push(dep.name.clone());
        }

        if !post_install.is_empty() {
            let fixed = fixup::apply(&prefix.lib(), post_install, prefix.root())
                .map_err(|e| Error::dependency("post-install", "fixup", e.to_string()))?;
            report.fixed = fixed.len();
        }

        Ok(report)
    }

    fn build_one(&self, dep: &DependencySpec, env: &BuildEnv) -> Result<()> {
        let sources_dir = self.workdir.sources_dir().join(&dep.name);
        let source_dir = source::fetch(&dep.name, &dep.source, &sources_dir, env)
            .map_err(|e| wrap(&dep.name, "fetch", e))?;
        tracing::debug!(name = %dep.name, dir = %source_dir.display(), "sources ready");

        let build_dir = self.workdir.build_dir(self.target.arch, &dep.name);
        std::fs::create_dir_all(&build_dir)?;

        let ctx = BuildContext {
            source_dir,
            build_dir,
            prefix: self.workdir.prefix(self.target.arch),
            target: self.target.clone(),
            jobs: self.jobs,
            env: env.clone(),
        };
        let system = build_system::for_spec(&dep.build);
        tracing::info!(name = %dep.name, system = system.name(), "building dependency");

        system
            .prepare(&ctx)
            .map_err(|e| wrap(&dep.name, "configure", e))?;
        run_all(&dep.name, "configure", system.configure(&ctx))?;
        run_all(&dep.name, "build", system.build(&ctx))?;
        run_all(&dep.name, "install", system.install(&ctx))?;

        tracing::info!(name = %dep.name, "dependency installed");
        Ok(())
    }
}

fn run_all(name: &str, step: &str, commands: Vec<Command>) -> Result<()> {
    for mut cmd in commands {
        tool::run(&mut cmd).map_err(|e| wrap(name, step, e))?;
    }
    Ok(())
}

/// Attach the dependency and step to a failure.
fn wrap(name: &str, step: &str, err: Error) -> Error {
    match err {
        e @ (Error::DependencyBuild { .. } | Error::ChecksumMismatch { .. }) => e,
        other => Error::dependency(name, step, other.to_string()),
    }
}
