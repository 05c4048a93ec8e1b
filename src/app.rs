//! Application builder.
//!
//! Configures the application's CMake project against the install prefix,
//! builds and installs it into `<workdir>/<arch>/<App>-<version>/`, then
//! applies the configured load path fixups to the bundle. The result is an
//! unsigned bundle that still references the prefix; relocation is a
//! separate stage.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::fixup;
use crate::target::Target;
use crate::tool::{self, BuildEnv};
use crate::workdir::{InstallPrefix, WorkDir};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Result of an application build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBuild {
    pub version: String,
    pub install_dir: PathBuf,
    pub bundle: PathBuf,
}

/// Read the version from a `project(<name> VERSION x.y.z)` call.
pub fn detect_version(cmake_lists: &str) -> Option<String> {
    let re = Regex::new(r"(?i)project\s*\(\s*[\w-]+\s+VERSION\s+([0-9][0-9A-Za-z.\-]*)").ok()?;
    re.captures(cmake_lists)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Builds the application for one target.
pub struct AppBuilder<'a> {
    config: &'a AppConfig,
    workdir: &'a WorkDir,
    target: Target,
    jobs: usize,
}

impl<'a> AppBuilder<'a> {
    pub fn new(config: &'a AppConfig, workdir: &'a WorkDir, target: Target, jobs: usize) -> Self {
        Self {
            config,
            workdir,
            target,
            jobs: jobs.max(1),
        }
    }

    /// Version from `--version`, or from the sources' CMakeLists.
    pub fn version(&self, source_dir: &Path, explicit: Option<&str>) -> Result<String> {
        if let Some(version) = explicit {
            return Ok(version.to_string());
        }

        let file = source_dir.join(
            self.config
                .version_file
                .as_deref()
                .unwrap_or_else(|| Path::new("CMakeLists.txt")),
        );
        let text = std::fs::read_to_string(&file).map_err(|e| {
            Error::AppBuild(format!("cannot read version from {}: {}", file.display(), e))
        })?;
        detect_version(&text).ok_or_else(|| {
            Error::AppBuild(format!(
                "no project(... VERSION x.y.z) in {}; pass --version",
                file.display()
            ))
        })
    }

    /// Configure, build and install the application.
    pub fn build(&self, source_dir: &Path, version: Option<&str>) -> Result<AppBuild> {
        if !source_dir.join("CMakeLists.txt").is_file() {
            return Err(Error::AppBuild(format!(
                "{} is not a CMake project",
                source_dir.display()
            )));
        }
        tool::require(&["cmake", "ninja"])?;

        let version = self.version(source_dir, version)?;
        let prefix = self.workdir.prefix(self.target.arch);
        if !prefix.lib().is_dir() {
            return Err(Error::AppBuild(format!(
                "install prefix {} is empty; run `macship deps` first",
                prefix.root().display()
            )));
        }

        let build_dir = self.build_dir(&version);
        let install_dir = self
            .workdir
            .app_install_dir(self.target.arch, &self.config.name, &version);
        std::fs::create_dir_all(&build_dir)?;
        tracing::info!(
            app = %self.config.name,
            version = %version,
            arch = %self.target.arch,
            "building application"
        );

        let env = BuildEnv::new(&prefix);
        for mut cmd in self.commands(source_dir, &build_dir, &install_dir, &prefix, &env) {
            tool::run(&mut cmd).map_err(|e| Error::AppBuild(e.to_string()))?;
        }

        let bundle = install_dir.join(self.config.bundle_path());
        if !bundle.join("Contents").is_dir() {
            return Err(Error::AppBuild(format!(
                "install did not produce {}",
                bundle.display()
            )));
        }

        if !self.config.fixups.is_empty() {
            let fixed = fixup::apply(&bundle.join("Contents"), &self.config.fixups, prefix.root())?;
            tracing::debug!(count = fixed.len(), "applied bundle fixups");
        }

        Ok(AppBuild {
            version,
            install_dir,
            bundle,
        })
    }

    fn build_dir(&self, version: &str) -> PathBuf {
        self.workdir.build_dir(
            self.target.arch,
            &format!("{}-{}", self.config.name, version),
        )
    }

    /// CMake cache entries for the configure step.
    pub fn cmake_options(&self, install_dir: &Path, prefix: &InstallPrefix) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            options.insert(key.to_string(), value);
        };

        set("CMAKE_FIND_ROOT_PATH", prefix.root().display().to_string());
        set("CMAKE_PREFIX_PATH", prefix.cmake_dir().display().to_string());
        set("CMAKE_INCLUDE_PATH", prefix.include().display().to_string());
        set("CMAKE_BUILD_TYPE", "Release".to_string());
        set("CMAKE_INSTALL_PREFIX", install_dir.display().to_string());
        set("CMAKE_OSX_ARCHITECTURES", self.target.arch.to_string());
        set("CMAKE_OSX_DEPLOYMENT_TARGET", self.target.min_macos.clone());
        set("CMAKE_INSTALL_RPATH", prefix.lib().display().to_string());
        set(
            "EIGEN_ROOT_DIR",
            prefix.include().join("eigen3").display().to_string(),
        );
        if !self.config.ignore_paths.is_empty() {
            set("CMAKE_IGNORE_PATH", self.config.ignore_paths.join(";"));
        }
        if !self.config.cxx_flags.is_empty() {
            set("CMAKE_CXX_FLAGS", self.config.cxx_flags.clone());
        }

        options.extend(self.config.cmake_options.clone());
        options
    }

    fn commands(
        &self,
        source_dir: &Path,
        build_dir: &Path,
        install_dir: &Path,
        prefix: &InstallPrefix,
        env: &BuildEnv,
    ) -> Vec<Command> {
        let mut configure = env.command("cmake");
        configure
            .arg("-S")
            .arg(source_dir)
            .arg("-B")
            .arg(build_dir)
            .arg("-GNinja");
        for (key, value) in self.cmake_options(install_dir, prefix) {
            configure.arg(format!("-D{}={}", key, value));
        }

        let mut build = env.command("cmake");
        build
            .arg("--build")
            .arg(build_dir)
            .arg(format!("-j{}", self.jobs));

        let mut install = env.command("cmake");
        install.arg("--install").arg(build_dir);

        vec![configure, build, install]
    }
}
