//! Bundle relocation.
//!
//! Makes a bundle self-contained: every non-system library its main
//! executable and plugins load (directly or transitively) is copied into
//! `Contents/Frameworks`, and every load command is rewritten to an
//! `@executable_path`-relative path.
//!
//! Relocation runs in two phases. [`Relocator::plan`] walks the dependency
//! graph without writing anything and fails on missing dependencies,
//! destination name conflicts and dependency cycles. [`Relocator::apply`]
//! then performs the copies and rewrites through a staging directory and
//! checks the staged binaries for leftover external references before
//! anything is moved into the bundle.
//! Running relocation on an already relocated bundle yields an empty plan.

mod apply;
mod classify;
mod plan;
mod resolve;

pub use apply::RelocationReport;
pub use classify::{framework_root, Location, SystemLibraries, DEFAULT_SYSTEM_PREFIXES};
pub use plan::{CopyAction, CopyKind, RelocationPlan};
pub use resolve::Resolver;

use crate::bundle::Bundle;
use crate::error::{Error, Result};
use std::path::PathBuf;
use walkdir::WalkDir;

/// Relocation settings.
#[derive(Debug, Clone, Default)]
pub struct RelocateOptions {
    /// Prefixes treated as system libraries in addition to the defaults.
    pub system_prefixes: Vec<String>,
    /// Directories searched for bare library names.
    pub search_paths: Vec<PathBuf>,
}

/// A dependency or run path that still points outside the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub binary: PathBuf,
    pub path: String,
}

impl std::fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.binary.display(), self.path)
    }
}

/// Relocates one bundle.
pub struct Relocator<'a> {
    bundle: &'a Bundle,
    system: SystemLibraries,
    search_paths: Vec<PathBuf>,
}

impl<'a> Relocator<'a> {
    pub fn new(bundle: &'a Bundle, options: RelocateOptions) -> Self {
        Self {
            bundle,
            system: SystemLibraries::with_extra(&options.system_prefixes),
            search_paths: options.search_paths,
        }
    }

    /// Compute the relocation without touching the bundle.
    pub fn plan(&self) -> Result<RelocationPlan> {
        plan::Planner::new(self.bundle, &self.system, self.search_paths.clone()).run()
    }

    /// Apply a plan computed by [`Relocator::plan`].
    ///
    /// Fails without touching the bundle when a staged binary would still
    /// reference a file outside it. Weak dependencies the plan skipped
    /// are allowed to stay.
    pub fn apply(&self, plan: &RelocationPlan) -> Result<RelocationReport> {
        apply::apply(self.bundle, plan, |staged| self.verify(plan, staged))
    }

    /// Plan and apply.
    pub fn relocate(&self) -> Result<RelocationReport> {
        let plan = self.plan()?;
        tracing::info!(
            copies = plan.copies.len(),
            edits = plan.edits.len(),
            binaries = plan.binaries.len(),
            "relocation planned"
        );

        self.apply(&plan)
    }

    fn verify(&self, plan: &RelocationPlan, staged: &[(PathBuf, PathBuf)]) -> Result<()> {
        let leftovers: Vec<String> = self
            .scan(staged)?
            .into_iter()
            .filter(|r| !plan.skipped_weak.contains(r))
            .map(|r| r.to_string())
            .collect();
        if leftovers.is_empty() {
            return Ok(());
        }
        Err(Error::Relocation(format!(
            "external references would remain after relocation:\n  {}",
            leftovers.join("\n  ")
        )))
    }

    /// Load commands of `binaries` that still name a file outside the
    /// bundle: absolute non-system paths, bare names, and absolute run
    /// paths.
    pub fn external_references(&self, binaries: &[PathBuf]) -> Result<Vec<ExternalReference>> {
        let pairs: Vec<_> = binaries.iter().map(|b| (b.clone(), b.clone())).collect();
        self.scan(&pairs)
    }

    /// Like [`Relocator::external_references`], reading each binary's
    /// load commands from the paired file.
    fn scan(&self, binaries: &[(PathBuf, PathBuf)]) -> Result<Vec<ExternalReference>> {
        let mut found = Vec::new();
        for (binary, holder) in binaries {
            let info =
                macship_macho::inspect(holder).map_err(|e| Error::binary(binary, e))?;
            let deps = info.dependencies.iter().map(|d| d.path.as_str());
            for path in deps.chain(info.rpaths.iter().map(String::as_str)) {
                if path.starts_with('@') || self.system.is_system(path) {
                    continue;
                }
                found.push(ExternalReference {
                    binary: binary.clone(),
                    path: path.to_string(),
                });
            }
        }
        Ok(found)
    }

    /// Every Mach-O file in the bundle, skipping symlinks.
    pub fn bundle_binaries(&self) -> Result<Vec<PathBuf>> {
        let mut binaries = Vec::new();
        for entry in WalkDir::new(self.bundle.root()).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.file_type().is_file() && macship_macho::is_macho(entry.path()) {
                binaries.push(entry.into_path());
            }
        }
        Ok(binaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::tests::make_bundle;
    use macship_macho::fixture::FixtureBuilder;
    use macship_macho::inspect;
    use std::path::Path;

    const FW: &str = "@executable_path/../Frameworks";

    fn open(root: &Path) -> Bundle {
        Bundle::open(root, None, "ccPlugins").unwrap()
    }

    fn deps_of(path: &Path) -> Vec<String> {
        inspect(path)
            .unwrap()
            .dependencies
            .into_iter()
            .map(|d| d.path)
            .collect()
    }

    /// Snapshot of every file in a tree, for byte-level comparisons.
    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                files.push((
                    entry.path().strip_prefix(root).unwrap().to_path_buf(),
                    std::fs::read(entry.path()).unwrap(),
                ));
            }
        }
        files
    }

    /// Bundle B with main executable E, plugin P, external A (used by E
    /// and P) and B' (used by A), all under an external prefix.
    struct Scenario {
        _dir: tempfile::TempDir,
        bundle_root: PathBuf,
        lib: PathBuf,
    }

    fn scenario() -> Scenario {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("prefix/lib");
        let liba = lib.join("libA.dylib");
        let libb = lib.join("libB.dylib");

        FixtureBuilder::dylib(libb.to_string_lossy())
            .depends_on("/usr/lib/libSystem.B.dylib")
            .write_to(&libb)
            .unwrap();
        FixtureBuilder::dylib(liba.to_string_lossy())
            .depends_on(libb.to_string_lossy())
            .depends_on("/usr/lib/libc++.1.dylib")
            .write_to(&liba)
            .unwrap();

        let exe = FixtureBuilder::executable()
            .depends_on(liba.to_string_lossy())
            .depends_on("/System/Library/Frameworks/Cocoa.framework/Versions/A/Cocoa")
            .rpath(lib.to_string_lossy());
        let bundle_root = make_bundle(dir.path(), &exe);
        FixtureBuilder::dylib("libP.dylib")
            .depends_on(liba.to_string_lossy())
            .write_to(&bundle_root.join("Contents/Plugins/ccPlugins/libP.dylib"))
            .unwrap();

        Scenario {
            _dir: dir,
            bundle_root,
            lib,
        }
    }

    #[test]
    fn test_scenario_relocates_transitive_closure() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let relocator = Relocator::new(&bundle, RelocateOptions::default());

        let report = relocator.relocate().unwrap();
        assert_eq!(report.copied.len(), 2);
        // E -> A, P -> A, A -> B'.
        assert_eq!(report.changed_references, 3);
        assert_eq!(report.deleted_rpaths, 1);

        let frameworks = bundle.frameworks_dir();
        assert_eq!(
            deps_of(&bundle.executable()),
            vec![
                format!("{}/libA.dylib", FW),
                "/System/Library/Frameworks/Cocoa.framework/Versions/A/Cocoa".to_string(),
            ]
        );
        assert!(inspect(&bundle.executable()).unwrap().rpaths.is_empty());
        assert_eq!(
            deps_of(&bundle.plugins_dir().join("libP.dylib")),
            vec![format!("{}/libA.dylib", FW)]
        );

        let a = inspect(&frameworks.join("libA.dylib")).unwrap();
        assert_eq!(a.install_id, Some(format!("{}/libA.dylib", FW)));
        assert_eq!(
            deps_of(&frameworks.join("libA.dylib")),
            vec![format!("{}/libB.dylib", FW), "/usr/lib/libc++.1.dylib".to_string()]
        );
        let b = inspect(&frameworks.join("libB.dylib")).unwrap();
        assert_eq!(b.install_id, Some(format!("{}/libB.dylib", FW)));

        // The prefix is read-only from the bundle's perspective.
        let original = inspect(&s.lib.join("libA.dylib")).unwrap();
        assert!(original.install_id.unwrap().starts_with('/'));

        // No staging leftovers.
        let names: Vec<_> = std::fs::read_dir(bundle.contents())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.starts_with(".macship")), "{:?}", names);
    }

    #[test]
    fn test_second_run_is_noop() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let relocator = Relocator::new(&bundle, RelocateOptions::default());
        relocator.relocate().unwrap();
        let before = snapshot(bundle.root());

        let plan = relocator.plan().unwrap();
        assert!(plan.is_empty(), "{}", plan);
        let report = relocator.relocate().unwrap();
        assert!(report.is_noop());
        assert_eq!(snapshot(bundle.root()), before);
    }

    #[test]
    fn test_shared_library_copied_once() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let plan = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap();

        let sources: Vec<_> = plan.copies.iter().map(|c| c.source.clone()).collect();
        let liba = s.lib.join("libA.dylib").canonicalize().unwrap();
        assert_eq!(sources.iter().filter(|p| **p == liba).count(), 1);
        assert_eq!(plan.copies.len(), 2);
    }

    #[test]
    fn test_completeness_after_relocation() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let relocator = Relocator::new(&bundle, RelocateOptions::default());
        relocator.relocate().unwrap();

        let binaries = relocator.bundle_binaries().unwrap();
        assert_eq!(binaries.len(), 4);
        assert!(relocator.external_references(&binaries).unwrap().is_empty());

        // Every non-system dependency resolves inside the bundle.
        let resolver = Resolver::new(bundle.macos_dir(), vec![]);
        let system = SystemLibraries::default();
        for binary in &binaries {
            for dep in deps_of(binary) {
                if system.is_system(&dep) {
                    continue;
                }
                let resolved = resolver
                    .resolve(&dep, &[binary.parent().unwrap()], &[])
                    .unwrap_or_else(|| panic!("{} unresolved in {}", dep, binary.display()));
                assert!(bundle.contains(&resolved.canonicalize().unwrap()));
            }
        }
    }

    #[test]
    fn test_dry_run_plan_touches_nothing() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let before = snapshot(bundle.root());

        let plan = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap();
        let text = plan.to_string();
        assert!(text.contains("copy "));
        assert!(text.contains("change "));
        assert!(text.contains("delete rpath "));
        assert_eq!(snapshot(bundle.root()), before);
        assert!(!bundle.frameworks_dir().exists());
    }

    #[test]
    fn test_bundle_without_external_dependencies_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let exe = FixtureBuilder::executable()
            .depends_on("/usr/lib/libSystem.B.dylib")
            .rpath("@executable_path/../Frameworks");
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);
        let before = snapshot(bundle.root());

        let report = Relocator::new(&bundle, RelocateOptions::default())
            .relocate()
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(report.checked, 1);
        assert_eq!(snapshot(bundle.root()), before);
    }

    #[test]
    fn test_missing_dependency_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let exe = FixtureBuilder::executable().depends_on("/nonexistent/libgone.dylib");
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);

        let err = Relocator::new(&bundle, RelocateOptions::default())
            .relocate()
            .unwrap_err();
        match err {
            Error::MissingDependency { binary, dependency } => {
                assert_eq!(dependency, "/nonexistent/libgone.dylib");
                assert_eq!(binary, bundle.executable().canonicalize().unwrap());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_weak_dependency_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let exe = FixtureBuilder::executable().weak_dependency("/nonexistent/libopt.dylib");
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);

        let plan = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.skipped_weak.len(), 1);
        assert_eq!(plan.skipped_weak[0].path, "/nonexistent/libopt.dylib");
        assert!(plan.to_string().contains("/nonexistent/libopt.dylib (weak, not found)"));
    }

    #[test]
    fn test_relocate_keeps_missing_weak_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let liba = dir.path().join("prefix/lib/libA.dylib");
        FixtureBuilder::dylib(liba.to_string_lossy())
            .write_to(&liba)
            .unwrap();
        let exe = FixtureBuilder::executable()
            .depends_on(liba.to_string_lossy())
            .weak_dependency("/nonexistent/libopt.dylib");
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);
        let relocator = Relocator::new(&bundle, RelocateOptions::default());

        let report = relocator.relocate().unwrap();
        assert_eq!(report.copied, vec![bundle.frameworks_dir().join("libA.dylib")]);
        let deps = deps_of(&bundle.executable());
        assert!(deps.contains(&format!("{}/libA.dylib", FW)), "{:?}", deps);
        assert!(deps.contains(&"/nonexistent/libopt.dylib".to_string()), "{:?}", deps);

        // Rerunning finds nothing left to do and still succeeds.
        let before = snapshot(bundle.root());
        assert!(relocator.relocate().unwrap().is_noop());
        assert_eq!(snapshot(bundle.root()), before);
    }

    #[test]
    fn test_failed_verification_leaves_bundle_untouched() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let before = snapshot(bundle.root());
        let plan = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap();
        assert!(!plan.is_empty());

        let mut seen = Vec::new();
        let err = apply::apply(&bundle, &plan, |staged| {
            for (binary, holder) in staged {
                assert!(holder.is_file(), "{} not staged", binary.display());
                seen.push(binary.clone());
            }
            Err(Error::Relocation("leftover reference".into()))
        })
        .unwrap_err();

        assert!(matches!(err, Error::Relocation(_)), "{:?}", err);
        assert_eq!(seen, plan.binaries);
        assert_eq!(snapshot(bundle.root()), before);
        assert!(!bundle.frameworks_dir().exists());
    }

    #[test]
    fn test_staged_binaries_are_verified_with_final_bytes() {
        let s = scenario();
        let bundle = open(&s.bundle_root);
        let relocator = Relocator::new(&bundle, RelocateOptions::default());
        let plan = relocator.plan().unwrap();

        let mut leftovers = None;
        apply::apply(&bundle, &plan, |staged| {
            leftovers = Some(relocator.scan(staged)?);
            Ok(())
        })
        .unwrap();
        assert_eq!(leftovers, Some(Vec::new()));
    }

    #[test]
    fn test_destination_conflict_is_fatal_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one/libz.1.dylib");
        let two = dir.path().join("two/libz.1.dylib");
        FixtureBuilder::dylib("/one/libz.1.dylib").write_to(&one).unwrap();
        FixtureBuilder::dylib("/two/libz.1.dylib")
            .depends_on("/usr/lib/libSystem.B.dylib")
            .write_to(&two)
            .unwrap();

        let exe = FixtureBuilder::executable()
            .depends_on(one.to_string_lossy())
            .depends_on(two.to_string_lossy());
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);
        let before = snapshot(bundle.root());

        let err = Relocator::new(&bundle, RelocateOptions::default())
            .relocate()
            .unwrap_err();
        assert!(
            matches!(err, Error::DestinationConflict { ref name, .. } if name == "libz.1.dylib"),
            "{:?}",
            err
        );
        assert_eq!(snapshot(bundle.root()), before);
    }

    #[test]
    fn test_cycle_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        let liba = lib.join("libA.dylib");
        let libb = lib.join("libB.dylib");
        FixtureBuilder::dylib(liba.to_string_lossy())
            .depends_on(libb.to_string_lossy())
            .write_to(&liba)
            .unwrap();
        FixtureBuilder::dylib(libb.to_string_lossy())
            .depends_on(liba.to_string_lossy())
            .write_to(&libb)
            .unwrap();

        let exe = FixtureBuilder::executable().depends_on(liba.to_string_lossy());
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);

        let err = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap_err();
        match err {
            Error::DependencyCycle { chain } => {
                assert_eq!(chain.len(), 3);
                assert!(chain[0].ends_with("libA.dylib"));
                assert!(chain[1].ends_with("libB.dylib"));
                assert!(chain[2].ends_with("libA.dylib"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_same_library_through_symlink_is_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        let real = lib.join("libfoo.1.2.dylib");
        FixtureBuilder::dylib(lib.join("libfoo.1.dylib").to_string_lossy())
            .write_to(&real)
            .unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink(&real, lib.join("libfoo.1.dylib")).unwrap();
        #[cfg(not(unix))]
        std::fs::copy(&real, lib.join("libfoo.1.dylib")).unwrap();

        let exe = FixtureBuilder::executable()
            .depends_on(lib.join("libfoo.1.dylib").to_string_lossy())
            .depends_on(real.to_string_lossy());
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);

        let plan = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap();
        if cfg!(unix) {
            assert_eq!(plan.copies.len(), 1);
            assert_eq!(
                plan.copies[0].dest,
                bundle.frameworks_dir().join("libfoo.1.dylib")
            );
        }
    }

    #[test]
    fn test_rpath_and_bare_name_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("prefix/lib");
        FixtureBuilder::dylib("libflann_cpp.1.9.dylib")
            .write_to(&lib.join("libflann_cpp.1.9.dylib"))
            .unwrap();
        FixtureBuilder::dylib("@rpath/libpcl_common.dylib")
            .depends_on("libflann_cpp.1.9.dylib")
            .write_to(&lib.join("libpcl_common.dylib"))
            .unwrap();

        let exe = FixtureBuilder::executable()
            .depends_on("@rpath/libpcl_common.dylib")
            .rpath(lib.to_string_lossy())
            .rpath("@executable_path/../Frameworks");
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);

        let options = RelocateOptions {
            search_paths: vec![lib.clone()],
            ..Default::default()
        };
        let relocator = Relocator::new(&bundle, options);
        relocator.relocate().unwrap();

        let exe_info = inspect(&bundle.executable()).unwrap();
        assert_eq!(
            exe_info.dependencies[0].path,
            format!("{}/libpcl_common.dylib", FW)
        );
        assert_eq!(exe_info.rpaths, vec!["@executable_path/../Frameworks"]);
        assert_eq!(
            deps_of(&bundle.frameworks_dir().join("libpcl_common.dylib")),
            vec![format!("{}/libflann_cpp.1.9.dylib", FW)]
        );
    }

    #[test]
    fn test_framework_is_copied_whole() {
        let dir = tempfile::tempdir().unwrap();
        let framework = dir.path().join("qt/lib/QtCore.framework");
        let binary = framework.join("Versions/5/QtCore");
        FixtureBuilder::dylib(binary.to_string_lossy())
            .write_to(&binary)
            .unwrap();
        std::fs::create_dir_all(framework.join("Versions/5/Resources")).unwrap();
        std::fs::write(framework.join("Versions/5/Resources/Info.plist"), "<plist/>").unwrap();

        let exe = FixtureBuilder::executable().depends_on(binary.to_string_lossy());
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);

        let report = Relocator::new(&bundle, RelocateOptions::default())
            .relocate()
            .unwrap();
        let dest = bundle.frameworks_dir().join("QtCore.framework");
        assert_eq!(report.copied, vec![dest.clone()]);
        assert!(dest.join("Versions/5/Resources/Info.plist").is_file());
        assert_eq!(
            deps_of(&bundle.executable()),
            vec![format!("{}/QtCore.framework/Versions/5/QtCore", FW)]
        );
        assert_eq!(
            inspect(&dest.join("Versions/5/QtCore")).unwrap().install_id,
            Some(format!("{}/QtCore.framework/Versions/5/QtCore", FW))
        );
    }

    #[test]
    fn test_insufficient_padding_leaves_bundle_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let libq = dir.path().join("l/libq.dylib");
        // No room to grow the install name.
        FixtureBuilder::dylib("libq.dylib")
            .header_padding(0)
            .write_to(&libq)
            .unwrap();

        let exe = FixtureBuilder::executable().depends_on(libq.to_string_lossy());
        let root = make_bundle(dir.path(), &exe);
        let bundle = open(&root);
        let before = snapshot(bundle.root());

        let err = Relocator::new(&bundle, RelocateOptions::default())
            .relocate()
            .unwrap_err();
        assert!(matches!(err, Error::Binary { .. }), "{:?}", err);
        assert!(err.to_string().contains("Frameworks/libq.dylib"));
        assert_eq!(snapshot(bundle.root()), before);
        assert!(!bundle.frameworks_dir().exists());
    }

    #[test]
    fn test_absolute_in_bundle_reference_made_relative() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_bundle(dir.path(), &FixtureBuilder::executable());
        let inner = root.join("Contents/Frameworks/libin.dylib");
        FixtureBuilder::dylib("@rpath/libin.dylib")
            .write_to(&inner)
            .unwrap();
        let absolute = inner.canonicalize().unwrap();
        FixtureBuilder::executable()
            .depends_on(absolute.to_string_lossy())
            .write_to(&root.join("Contents/MacOS/Viewer"))
            .unwrap();

        let bundle = open(&root);
        let plan = Relocator::new(&bundle, RelocateOptions::default())
            .plan()
            .unwrap();
        assert!(plan.copies.is_empty());
        let edit = plan.edits.values().next().unwrap();
        assert_eq!(
            edit.changes,
            vec![(
                absolute.to_string_lossy().into_owned(),
                format!("{}/libin.dylib", FW)
            )]
        );
    }
}
