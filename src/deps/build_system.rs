//! Native build systems driven for dependencies.
//!
//! Each implementation turns a dependency's build directory into the
//! commands for its configure, build and install steps. Commands are
//! returned rather than run so their arguments can be checked in tests.

use crate::config::BuildSpec;
use crate::copy;
use crate::error::Result;
use crate::target::{Arch, Target};
use crate::tool::BuildEnv;
use crate::workdir::InstallPrefix;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

/// Everything a build system needs to know about one dependency build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub prefix: InstallPrefix,
    pub target: Target,
    pub jobs: usize,
    pub env: BuildEnv,
}

impl BuildContext {
    fn command(&self, program: impl AsRef<std::ffi::OsStr>) -> Command {
        self.env.command_in(program, &self.build_dir)
    }

    fn flags(&self) -> CompilerFlags {
        CompilerFlags::new(&self.prefix, &self.target)
    }
}

/// Compiler and linker flags for autotools-style builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerFlags {
    /// `CPPFLAGS`
    pub preprocessor: String,
    /// `CFLAGS` and `CXXFLAGS`
    pub compiler: String,
    /// `LDFLAGS`
    pub linker: String,
}

impl CompilerFlags {
    pub fn new(prefix: &InstallPrefix, target: &Target) -> Self {
        let version = format!(" -mmacosx-version-min={}", target.min_macos);
        let mut compiler = format!("-O3{}", version);
        let mut linker = format!("-L{}{}", prefix.lib().display(), version);

        if target.is_cross() {
            compiler.push_str(&format!(" --target={}", target.arch.triple()));
            compiler.push_str(&format!(" -arch {}", target.arch));
            linker.push_str(&format!(" -arch {}", target.arch));
        }

        Self {
            preprocessor: format!("-I{}", prefix.include().display()),
            compiler,
            linker,
        }
    }

    /// `VAR=value` arguments for a `configure` script.
    pub fn configure_args(&self) -> Vec<String> {
        vec![
            format!("CPPFLAGS={}", self.preprocessor),
            format!("CXXFLAGS={}", self.compiler),
            format!("CFLAGS={}", self.compiler),
            format!("LDFLAGS={}", self.linker),
        ]
    }
}

/// A native build system.
pub trait BuildSystem {
    /// Build system name for logs.
    fn name(&self) -> &'static str;

    /// Prepare the build directory before configuring.
    fn prepare(&self, _ctx: &BuildContext) -> Result<()> {
        Ok(())
    }

    fn configure(&self, ctx: &BuildContext) -> Vec<Command>;

    fn build(&self, ctx: &BuildContext) -> Vec<Command>;

    fn install(&self, ctx: &BuildContext) -> Vec<Command>;
}

/// Build system for a configured dependency.
pub fn for_spec(spec: &BuildSpec) -> Box<dyn BuildSystem> {
    match spec {
        BuildSpec::Cmake { options } => Box::new(CMake {
            options: options.clone(),
        }),
        BuildSpec::Autotools {
            options,
            out_of_tree,
        } => Box::new(Autotools {
            options: options.clone(),
            out_of_tree: *out_of_tree,
        }),
        BuildSpec::Qt5 { skip } => Box::new(Qt5 { skip: skip.clone() }),
        BuildSpec::Boost => Box::new(Boost),
    }
}

/// Copy sources into an empty build directory for builds that cannot run
/// out of tree.
fn copy_sources(ctx: &BuildContext) -> Result<()> {
    if copy::is_empty_dir(&ctx.build_dir)? {
        tracing::debug!(
            source = %ctx.source_dir.display(),
            build = %ctx.build_dir.display(),
            "out of tree build not supported, copying sources"
        );
        copy::copy_tree(&ctx.source_dir, &ctx.build_dir)?;
    }
    Ok(())
}

/// CMake with the Ninja generator.
#[derive(Debug, Clone, Default)]
pub struct CMake {
    /// Overrides for the default cache entries.
    pub options: BTreeMap<String, String>,
}

impl CMake {
    /// Default cache entries, before per-dependency overrides.
    pub fn default_options(prefix: &InstallPrefix, target: &Target) -> BTreeMap<String, String> {
        let root = prefix.root().display().to_string();
        let lib = prefix.lib().display().to_string();
        let mut options = BTreeMap::new();
        options.insert("CMAKE_BUILD_TYPE".to_string(), "Release".to_string());
        options.insert("CMAKE_INSTALL_PREFIX".to_string(), root.clone());
        options.insert("CMAKE_INSTALL_LIBDIR".to_string(), lib.clone());
        options.insert(
            "CMAKE_PREFIX_PATH".to_string(),
            format!("{};{}", prefix.cmake_dir().display(), root),
        );
        options.insert(
            "CMAKE_INCLUDE_PATH".to_string(),
            prefix.include().display().to_string(),
        );
        options.insert("CMAKE_LIBRARY_PATH".to_string(), lib);
        options.insert("CMAKE_FIND_ROOT_PATH".to_string(), root);
        options.insert(
            "CMAKE_OSX_ARCHITECTURES".to_string(),
            target.arch.to_string(),
        );
        options.insert(
            "CMAKE_OSX_DEPLOYMENT_TARGET".to_string(),
            target.min_macos.clone(),
        );
        options
    }
}

impl BuildSystem for CMake {
    fn name(&self) -> &'static str {
        "cmake"
    }

    fn configure(&self, ctx: &BuildContext) -> Vec<Command> {
        let mut options = Self::default_options(&ctx.prefix, &ctx.target);
        options.extend(self.options.clone());

        let mut cmd = ctx.command("cmake");
        cmd.arg("-S")
            .arg(&ctx.source_dir)
            .arg("-B")
            .arg(&ctx.build_dir)
            .args(["-G", "Ninja"]);
        for (key, value) in &options {
            cmd.arg(format!("-D{}={}", key, value));
        }
        vec![cmd]
    }

    fn build(&self, ctx: &BuildContext) -> Vec<Command> {
        let mut cmd = ctx.command("cmake");
        cmd.arg("--build")
            .arg(&ctx.build_dir)
            .arg(format!("-j{}", ctx.jobs));
        vec![cmd]
    }

    fn install(&self, ctx: &BuildContext) -> Vec<Command> {
        let mut cmd = ctx.command("cmake");
        cmd.arg("--install").arg(&ctx.build_dir);
        vec![cmd]
    }
}

/// `configure && make && make install`.
#[derive(Debug, Clone)]
pub struct Autotools {
    /// Extra `configure` arguments.
    pub options: Vec<String>,
    pub out_of_tree: bool,
}

impl Autotools {
    /// `--prefix`, plus `--host` when cross compiling.
    fn default_options(prefix: &InstallPrefix, target: &Target) -> Vec<String> {
        let mut options = vec![format!("--prefix={}", prefix.root().display())];
        if target.is_cross() {
            options.push(format!("--host={}", target.arch.triple()));
        }
        options
    }

    fn script(&self, ctx: &BuildContext) -> PathBuf {
        if self.out_of_tree {
            ctx.source_dir.join("configure")
        } else {
            ctx.build_dir.join("configure")
        }
    }
}

impl BuildSystem for Autotools {
    fn name(&self) -> &'static str {
        "autotools"
    }

    fn prepare(&self, ctx: &BuildContext) -> Result<()> {
        if self.out_of_tree {
            Ok(())
        } else {
            copy_sources(ctx)
        }
    }

    fn configure(&self, ctx: &BuildContext) -> Vec<Command> {
        let mut cmd = ctx.command(self.script(ctx));
        cmd.args(ctx.flags().configure_args())
            .args(Self::default_options(&ctx.prefix, &ctx.target))
            .args(&self.options);
        vec![cmd]
    }

    fn build(&self, ctx: &BuildContext) -> Vec<Command> {
        make(ctx)
    }

    fn install(&self, ctx: &BuildContext) -> Vec<Command> {
        make_install(ctx)
    }
}

fn make(ctx: &BuildContext) -> Vec<Command> {
    let mut cmd = ctx.command("make");
    cmd.arg(format!("-j{}", ctx.jobs));
    vec![cmd]
}

fn make_install(ctx: &BuildContext) -> Vec<Command> {
    let mut cmd = ctx.command("make");
    cmd.arg("install");
    vec![cmd]
}

/// Qt 5's own configure script, then make.
#[derive(Debug, Clone, Default)]
pub struct Qt5 {
    /// Modules passed to `-skip`.
    pub skip: Vec<String>,
}

impl BuildSystem for Qt5 {
    fn name(&self) -> &'static str {
        "qt5"
    }

    fn configure(&self, ctx: &BuildContext) -> Vec<Command> {
        let mut cmd = ctx.command(ctx.source_dir.join("configure"));
        cmd.args([
            "-release",
            "-nomake",
            "examples",
            "-nomake",
            "tests",
            "-opensource",
            "-confirm-license",
        ]);
        for module in &self.skip {
            cmd.arg("-skip").arg(module);
        }
        cmd.args([
            "-qt-pcre",
            "-qt-libjpeg",
            "-qt-freetype",
            "-platform",
            "macx-clang",
        ])
        .arg("-prefix")
        .arg(ctx.prefix.root())
        .arg(format!("QMAKE_APPLE_DEVICE_ARCHS={}", ctx.target.arch))
        .arg(format!(
            "QMAKE_MACOSX_DEPLOYMENT_TARGET={}",
            ctx.target.min_macos
        ));
        vec![cmd]
    }

    fn build(&self, ctx: &BuildContext) -> Vec<Command> {
        make(ctx)
    }

    fn install(&self, ctx: &BuildContext) -> Vec<Command> {
        make_install(ctx)
    }
}

/// Boost's `bootstrap.sh` and `b2`, run in a copy of the sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct Boost;

impl Boost {
    fn b2(&self, ctx: &BuildContext) -> Command {
        let flags = ctx.flags();
        let architecture = match ctx.target.arch {
            Arch::X86_64 => "x86",
            Arch::Arm64 => "arm",
        };

        let mut cmd = ctx.command(ctx.build_dir.join("b2"));
        cmd.arg(format!("-j{}", ctx.jobs))
            .arg(format!("cxxflags={}", flags.compiler))
            .arg(format!("cflags={}", flags.compiler))
            .arg(format!("linkflags={}", flags.linker))
            .arg("target-os=darwin")
            .arg(format!("architecture={}", architecture));

        if ctx.target.arch == Arch::X86_64 && ctx.target.is_cross() {
            cmd.args(["abi=sysv", "binary-format=mach-o", "-a"]);
        }
        cmd
    }
}

impl BuildSystem for Boost {
    fn name(&self) -> &'static str {
        "boost"
    }

    fn prepare(&self, ctx: &BuildContext) -> Result<()> {
        copy_sources(ctx)
    }

    fn configure(&self, ctx: &BuildContext) -> Vec<Command> {
        let arch_flag = format!("-arch {}", ctx.target.arch);
        let mut cmd = ctx.command(ctx.build_dir.join("bootstrap.sh"));
        cmd.arg(format!("cxxflags={}", arch_flag))
            .arg(format!("cflags={}", arch_flag))
            .arg(format!("linkflags={}", arch_flag))
            .arg(format!("--prefix={}", ctx.prefix.root().display()));
        vec![cmd]
    }

    fn build(&self, ctx: &BuildContext) -> Vec<Command> {
        vec![self.b2(ctx)]
    }

    fn install(&self, ctx: &BuildContext) -> Vec<Command> {
        let mut cmd = self.b2(ctx);
        cmd.arg("install");
        vec![cmd]
    }
}

/// Command line arguments as strings, for assertions.
#[cfg(test)]
pub(crate) fn args_of(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
pub(crate) fn context(arch: Arch, cross: bool) -> BuildContext {
    let prefix = InstallPrefix::new("/w/arm64/install");
    let mut target = Target::new(arch, None).unwrap();
    if !cross && target.is_cross() {
        // Pick the host so the test is independent of the machine.
        target = Target::new(Arch::host().unwrap_or(arch), None).unwrap();
    }
    BuildContext {
        source_dir: PathBuf::from("/w/sources/dep/dep-1.0"),
        build_dir: PathBuf::from("/w/arm64/builds/dep"),
        env: BuildEnv::new(&prefix),
        prefix,
        target,
        jobs: 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn cross_target(arch: Arch) -> Option<Target> {
        let target = Target::new(arch, None).unwrap();
        target.is_cross().then_some(target)
    }

    #[test]
    fn test_cmake_defaults_and_overrides() {
        let ctx = context(Arch::Arm64, false);
        let mut overrides = BTreeMap::new();
        overrides.insert("BUILD_SHARED_LIBS".to_string(), "ON".to_string());
        overrides.insert("CMAKE_BUILD_TYPE".to_string(), "RelWithDebInfo".to_string());
        let cmake = CMake { options: overrides };

        let configure = cmake.configure(&ctx);
        assert_eq!(configure.len(), 1);
        assert_eq!(configure[0].get_program(), "cmake");
        assert_eq!(
            configure[0].get_current_dir(),
            Some(Path::new("/w/arm64/builds/dep"))
        );
        let args = args_of(&configure[0]);
        assert_eq!(
            &args[..6],
            &[
                "-S",
                "/w/sources/dep/dep-1.0",
                "-B",
                "/w/arm64/builds/dep",
                "-G",
                "Ninja"
            ]
        );
        assert!(args.contains(&"-DBUILD_SHARED_LIBS=ON".to_string()));
        assert!(args.contains(&"-DCMAKE_BUILD_TYPE=RelWithDebInfo".to_string()));
        assert!(!args.contains(&"-DCMAKE_BUILD_TYPE=Release".to_string()));
        assert!(args.contains(&"-DCMAKE_INSTALL_PREFIX=/w/arm64/install".to_string()));
        assert!(args.contains(&"-DCMAKE_INSTALL_LIBDIR=/w/arm64/install/lib".to_string()));
        assert!(args.contains(
            &"-DCMAKE_PREFIX_PATH=/w/arm64/install/lib/cmake;/w/arm64/install".to_string()
        ));
        assert!(args.contains(&"-DCMAKE_FIND_ROOT_PATH=/w/arm64/install".to_string()));
        assert!(args.contains(&format!(
            "-DCMAKE_OSX_DEPLOYMENT_TARGET={}",
            ctx.target.min_macos
        )));

        assert_eq!(
            args_of(&cmake.build(&ctx)[0]),
            vec!["--build", "/w/arm64/builds/dep", "-j8"]
        );
        assert_eq!(
            args_of(&cmake.install(&ctx)[0]),
            vec!["--install", "/w/arm64/builds/dep"]
        );
    }

    #[test]
    fn test_autotools_native() {
        let ctx = context(Arch::Arm64, false);
        let autotools = Autotools {
            options: vec!["--without-curl".into()],
            out_of_tree: true,
        };

        let configure = &autotools.configure(&ctx)[0];
        assert_eq!(configure.get_program(), "/w/sources/dep/dep-1.0/configure");
        let min = &ctx.target.min_macos;
        assert_eq!(
            args_of(configure),
            vec![
                "CPPFLAGS=-I/w/arm64/install/include".to_string(),
                format!("CXXFLAGS=-O3 -mmacosx-version-min={}", min),
                format!("CFLAGS=-O3 -mmacosx-version-min={}", min),
                format!("LDFLAGS=-L/w/arm64/install/lib -mmacosx-version-min={}", min),
                "--prefix=/w/arm64/install".to_string(),
                "--without-curl".to_string(),
            ]
        );
        assert_eq!(args_of(&autotools.build(&ctx)[0]), vec!["-j8"]);
        assert_eq!(args_of(&autotools.install(&ctx)[0]), vec!["install"]);
    }

    #[test]
    fn test_autotools_cross_flags() {
        for arch in [Arch::X86_64, Arch::Arm64] {
            let Some(target) = cross_target(arch) else {
                continue;
            };
            let mut ctx = context(arch, true);
            ctx.target = target;
            let autotools = Autotools {
                options: vec![],
                out_of_tree: true,
            };
            let args = args_of(&autotools.configure(&ctx)[0]);
            let triple = arch.triple();
            assert!(args.contains(&format!("--host={}", triple)), "{:?}", args);
            assert!(args
                .iter()
                .any(|a| a.starts_with("CFLAGS=") && a.contains(&format!("--target={}", triple))));
            assert!(args
                .iter()
                .any(|a| a.starts_with("LDFLAGS=") && a.ends_with(&format!("-arch {}", arch))));
        }
    }

    #[test]
    fn test_autotools_in_tree_copies_sources() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("configure"), b"#!/bin/sh\n").unwrap();

        let mut ctx = context(Arch::Arm64, false);
        ctx.source_dir = source;
        ctx.build_dir = dir.path().join("build");

        let autotools = Autotools {
            options: vec![],
            out_of_tree: false,
        };
        autotools.prepare(&ctx).unwrap();
        assert!(ctx.build_dir.join("configure").is_file());
        assert_eq!(
            autotools.configure(&ctx)[0].get_program(),
            ctx.build_dir.join("configure").as_os_str()
        );

        // A populated build directory is left alone.
        std::fs::write(ctx.build_dir.join("config.status"), b"").unwrap();
        std::fs::write(ctx.source_dir.join("new-file"), b"").unwrap();
        autotools.prepare(&ctx).unwrap();
        assert!(!ctx.build_dir.join("new-file").exists());
    }

    #[test]
    fn test_qt5_configure() {
        let ctx = context(Arch::Arm64, false);
        let qt = Qt5 {
            skip: vec!["qtwebengine".into(), "qt3d".into()],
        };
        let configure = &qt.configure(&ctx)[0];
        assert_eq!(configure.get_program(), "/w/sources/dep/dep-1.0/configure");
        let args = args_of(configure);
        let joined = args.join(" ");
        assert!(joined.starts_with("-release -nomake examples -nomake tests -opensource -confirm-license"));
        assert!(joined.contains("-skip qtwebengine -skip qt3d"));
        assert!(joined.contains("-platform macx-clang -prefix /w/arm64/install"));
        assert!(args.contains(&format!("QMAKE_APPLE_DEVICE_ARCHS={}", ctx.target.arch)));
        assert!(args.contains(&format!(
            "QMAKE_MACOSX_DEPLOYMENT_TARGET={}",
            ctx.target.min_macos
        )));
    }

    #[test]
    fn test_boost_commands() {
        let ctx = context(Arch::Arm64, false);
        let boost = Boost;

        let bootstrap = &boost.configure(&ctx)[0];
        assert_eq!(bootstrap.get_program(), "/w/arm64/builds/dep/bootstrap.sh");
        let arch = ctx.target.arch;
        assert_eq!(
            args_of(bootstrap),
            vec![
                format!("cxxflags=-arch {}", arch),
                format!("cflags=-arch {}", arch),
                format!("linkflags=-arch {}", arch),
                "--prefix=/w/arm64/install".to_string(),
            ]
        );

        let build = args_of(&boost.build(&ctx)[0]);
        assert!(build.contains(&"target-os=darwin".to_string()));
        let expected_arch = match arch {
            Arch::X86_64 => "architecture=x86",
            Arch::Arm64 => "architecture=arm",
        };
        assert!(build.contains(&expected_arch.to_string()));
        assert!(!build.contains(&"abi=sysv".to_string()));

        let install = args_of(&boost.install(&ctx)[0]);
        assert_eq!(install.last().map(String::as_str), Some("install"));
    }

    #[test]
    fn test_boost_cross_to_x86_64() {
        let Some(target) = cross_target(Arch::X86_64) else {
            return;
        };
        let mut ctx = context(Arch::X86_64, true);
        ctx.target = target;
        let args = args_of(&Boost.build(&ctx)[0]);
        assert!(args.ends_with(&[
            "abi=sysv".to_string(),
            "binary-format=mach-o".to_string(),
            "-a".to_string()
        ]));
    }

    #[test]
    fn test_for_spec() {
        let cases = [
            (BuildSpec::Cmake { options: BTreeMap::new() }, "cmake"),
            (
                BuildSpec::Autotools {
                    options: vec![],
                    out_of_tree: true,
                },
                "autotools",
            ),
            (BuildSpec::Qt5 { skip: vec![] }, "qt5"),
            (BuildSpec::Boost, "boost"),
        ];
        for (spec, name) in cases {
            assert_eq!(for_spec(&spec).name(), name);
        }
    }
}
