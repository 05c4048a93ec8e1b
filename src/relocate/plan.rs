//! Relocation planning.
//!
//! The walk is read-only: it resolves every dependency of the main
//! executable and plugins, follows external libraries recursively and
//! records what must be copied and rewritten. Nothing touches the bundle
//! until the complete plan exists.

use super::classify::{framework_root, Location, SystemLibraries};
use super::resolve::Resolver;
use super::ExternalReference;
use crate::bundle::Bundle;
use crate::deps::source::sha256_file;
use crate::error::{Error, Result};
use macship_macho::{BinaryEdit, DependencyKind, DylibInfo, LoadedDylib};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// What is copied into the libraries directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    Library,
    /// Whole `Name.framework` directory.
    Framework,
}

/// One library (or framework) copied into the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAction {
    pub kind: CopyKind,
    /// Real path of the file or framework directory.
    pub source: PathBuf,
    /// Destination inside `Contents/Frameworks`.
    pub dest: PathBuf,
}

/// Everything relocation will do, computed before anything is written.
#[derive(Debug, Clone, Default)]
pub struct RelocationPlan {
    /// Copies in discovery order.
    pub copies: Vec<CopyAction>,
    /// Load command edits keyed by the binary's final path in the bundle.
    pub edits: BTreeMap<PathBuf, BinaryEdit>,
    /// Final paths of every binary inspected.
    pub binaries: Vec<PathBuf>,
    /// Weak dependencies that resolve nowhere and stay as they are.
    pub skipped_weak: Vec<ExternalReference>,
}

impl RelocationPlan {
    /// Whether relocation has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.edits.is_empty()
    }

    /// Number of dependency paths rewritten.
    pub fn changed_references(&self) -> usize {
        self.edits.values().map(|e| e.changes.len()).sum()
    }

    pub fn deleted_rpaths(&self) -> usize {
        self.edits.values().map(|e| e.delete_rpaths.len()).sum()
    }

    /// The copy that will produce `path`, if any.
    pub fn copy_for(&self, path: &Path) -> Option<&CopyAction> {
        self.copies.iter().find(|copy| path.starts_with(&copy.dest))
    }
}

impl fmt::Display for RelocationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for skipped in &self.skipped_weak {
            writeln!(f, "keep  {} (weak, not found)", skipped)?;
        }
        if self.is_empty() {
            return writeln!(f, "nothing to relocate ({} binaries checked)", self.binaries.len());
        }
        for copy in &self.copies {
            writeln!(f, "copy  {} -> {}", copy.source.display(), copy.dest.display())?;
        }
        for (path, edit) in &self.edits {
            writeln!(f, "edit  {}", path.display())?;
            if let Some(id) = &edit.install_id {
                writeln!(f, "        id {}", id)?;
            }
            for (old, new) in &edit.changes {
                writeln!(f, "        change {} -> {}", old, new)?;
            }
            for rpath in &edit.delete_rpaths {
                writeln!(f, "        delete rpath {}", rpath)?;
            }
            for rpath in &edit.add_rpaths {
                writeln!(f, "        add rpath {}", rpath)?;
            }
        }
        Ok(())
    }
}

/// A binary in the walk.
#[derive(Debug, Clone)]
struct Node {
    /// Identity: canonical path of the file as it exists now.
    real: PathBuf,
    /// Location once relocation is applied.
    dest: PathBuf,
    /// Copied in from outside the bundle.
    copied: bool,
}

#[derive(Debug)]
struct Frame {
    node: Node,
    info: DylibInfo,
    /// Expanded `LC_RPATH` entries.
    rpaths: Vec<PathBuf>,
    next: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Explicit-stack depth-first walk over the dependency graph.
pub(crate) struct Planner<'a> {
    bundle: &'a Bundle,
    system: &'a SystemLibraries,
    resolver: Resolver,
    /// Real path of the main executable.
    executable: PathBuf,
    /// Run paths of the main executable, the base of every rpath stack.
    main_rpaths: Vec<PathBuf>,
    visits: HashMap<PathBuf, Visit>,
    /// External binary real path to its destination.
    relocated: HashMap<PathBuf, PathBuf>,
    /// Destination name to the real path of what claimed it.
    names: HashMap<String, PathBuf>,
    plan: RelocationPlan,
}

impl<'a> Planner<'a> {
    pub(crate) fn new(bundle: &'a Bundle, system: &'a SystemLibraries, search_paths: Vec<PathBuf>) -> Self {
        Self {
            bundle,
            system,
            resolver: Resolver::new(bundle.macos_dir(), search_paths),
            executable: PathBuf::new(),
            main_rpaths: Vec::new(),
            visits: HashMap::new(),
            relocated: HashMap::new(),
            names: HashMap::new(),
            plan: RelocationPlan::default(),
        }
    }

    /// Walk from the main executable and every plugin.
    pub(crate) fn run(mut self) -> Result<RelocationPlan> {
        for root in self.roots()? {
            if self.visits.contains_key(&root) {
                continue;
            }
            let mut stack = Vec::new();
            let node = Node {
                real: root.clone(),
                dest: root,
                copied: false,
            };
            self.enter(node, &mut stack)?;
            self.drain(&mut stack)?;
        }

        self.plan.edits.retain(|_, edit| !edit.is_empty());
        Ok(self.plan)
    }

    /// Record the main executable's run paths and list the walk roots:
    /// the executable, then every plugin.
    fn roots(&mut self) -> Result<Vec<PathBuf>> {
        let executable = self.bundle.executable().canonicalize()?;
        let main_info = inspect(&executable)?;
        let loader_dir = parent_of(&executable);
        self.main_rpaths = main_info
            .rpaths
            .iter()
            .filter_map(|r| self.resolver.expand(r, loader_dir))
            .collect();
        self.executable = executable.clone();

        let mut roots = vec![executable];
        for plugin in self.bundle.plugin_binaries()? {
            roots.push(plugin.canonicalize()?);
        }
        Ok(roots)
    }

    fn drain(&mut self, stack: &mut Vec<Frame>) -> Result<()> {
        loop {
            let dependency = match stack.last_mut() {
                None => return Ok(()),
                Some(top) if top.next == top.info.dependencies.len() => None,
                Some(top) => {
                    top.next += 1;
                    Some(top.info.dependencies[top.next - 1].clone())
                }
            };

            match dependency {
                None => {
                    if let Some(frame) = stack.pop() {
                        self.visits.insert(frame.node.real, Visit::Done);
                    }
                }
                Some(dependency) => {
                    if let Some(child) = self.follow(stack, &dependency)? {
                        self.enter(child, stack)?;
                    }
                }
            }
        }
    }

    /// Inspect a binary, record its own edits and push it on the stack.
    fn enter(&mut self, node: Node, stack: &mut Vec<Frame>) -> Result<()> {
        let info = inspect(&node.real)?;
        let loader_dir = parent_of(&node.real).to_path_buf();

        let mut rpaths = Vec::new();
        for entry in &info.rpaths {
            let expanded = self.resolver.expand(entry, &loader_dir);
            if entry.starts_with('/') {
                // Absolute run paths only exist on the build machine.
                let replacement = self
                    .bundle_path(Path::new(entry))
                    .map(|inside| self.install_name(&inside));
                let edit = self.edit(&node.dest);
                edit.delete_rpath(entry.clone());
                if let Some(replacement) = replacement {
                    edit.add_rpath(replacement);
                }
            }
            rpaths.extend(expanded);
        }

        if node.copied && info.install_id.is_some() {
            let install_name = self.install_name(&node.dest);
            if info.install_id.as_deref() != Some(install_name.as_str()) {
                self.edit(&node.dest).set_install_id(install_name);
            }
        }

        tracing::debug!(binary = %node.dest.display(), deps = info.dependencies.len(), "inspecting");
        self.visits.insert(node.real.clone(), Visit::InProgress);
        self.plan.binaries.push(node.dest.clone());
        stack.push(Frame {
            node,
            info,
            rpaths,
            next: 0,
        });
        Ok(())
    }

    /// Plan one dependency of the binary on top of the stack. Returns the
    /// dependency when it has not been walked yet.
    fn follow(&mut self, stack: &[Frame], dependency: &LoadedDylib) -> Result<Option<Node>> {
        let Some(frame) = stack.last() else {
            return Ok(None);
        };

        let location = match self.locate(stack, &dependency.path)? {
            Some(location) => location,
            None if dependency.kind == DependencyKind::Weak => {
                tracing::warn!(
                    binary = %frame.node.dest.display(),
                    dependency = %dependency.path,
                    "weak dependency not found, leaving it as is"
                );
                self.plan.skipped_weak.push(ExternalReference {
                    binary: frame.node.dest.clone(),
                    path: dependency.path.clone(),
                });
                return Ok(None);
            }
            None => {
                return Err(Error::MissingDependency {
                    binary: frame.node.dest.clone(),
                    dependency: dependency.path.clone(),
                })
            }
        };

        let (child, new_path) = match location {
            Location::System => return Ok(None),
            Location::InBundle { real, .. } => {
                let new_path = if dependency.path.starts_with('@') {
                    None
                } else {
                    Some(self.install_name(&real))
                };
                let node = Node {
                    real: real.clone(),
                    dest: real,
                    copied: false,
                };
                (node, new_path)
            }
            Location::External { path, real } => {
                let dest = self.map_external(&path, &real)?;
                let new_path = Some(self.install_name(&dest));
                let node = Node {
                    real,
                    dest,
                    copied: true,
                };
                (node, new_path)
            }
        };

        if let Some(new_path) = new_path {
            if new_path != dependency.path {
                let dest = frame.node.dest.clone();
                self.edit(&dest)
                    .change_dependency(dependency.path.clone(), new_path);
            }
        }

        match self.visits.get(&child.real) {
            None => Ok(Some(child)),
            Some(Visit::Done) => Ok(None),
            Some(Visit::InProgress) if dependency.kind == DependencyKind::Upward => Ok(None),
            Some(Visit::InProgress) => {
                let start = stack
                    .iter()
                    .position(|f| f.node.real == child.real)
                    .unwrap_or(0);
                let mut chain: Vec<String> = stack[start..]
                    .iter()
                    .map(|f| f.node.dest.display().to_string())
                    .collect();
                chain.push(child.dest.display().to_string());
                Err(Error::DependencyCycle { chain })
            }
        }
    }

    /// Classify a dependency path of the binary on top of the stack.
    fn locate(&self, stack: &[Frame], reference: &str) -> Result<Option<Location>> {
        if self.system.is_system(reference) {
            return Ok(Some(Location::System));
        }
        let Some(frame) = stack.last() else {
            return Ok(None);
        };

        let rpaths = self.search_rpaths(stack);
        let loader_dirs = [parent_of(&frame.node.dest), parent_of(&frame.node.real)];
        let Some(path) = self.resolver.resolve(reference, &loader_dirs, &rpaths) else {
            return Ok(None);
        };

        let real = path.canonicalize()?;
        if self.system.is_system(&real.to_string_lossy()) {
            Ok(Some(Location::System))
        } else if self.bundle.contains(&real) {
            Ok(Some(Location::InBundle { path, real }))
        } else {
            Ok(Some(Location::External { path, real }))
        }
    }

    /// Run paths searched for the binary on top of the stack: its own,
    /// then those of the binaries that loaded it, then the main
    /// executable's unless the executable already heads the stack.
    fn search_rpaths(&self, stack: &[Frame]) -> Vec<PathBuf> {
        let mut rpaths: Vec<PathBuf> = stack
            .iter()
            .rev()
            .flat_map(|f| f.rpaths.iter().cloned())
            .collect();
        let from_executable = stack
            .first()
            .is_some_and(|f| f.node.real == self.executable);
        if !from_executable {
            rpaths.extend(self.main_rpaths.iter().cloned());
        }
        rpaths
    }

    /// Destination of an external binary, claiming its name on first use.
    fn map_external(&mut self, path: &Path, real: &Path) -> Result<PathBuf> {
        if let Some(dest) = self.relocated.get(real) {
            return Ok(dest.clone());
        }

        let frameworks = self.bundle.frameworks_dir();
        let dest = match framework_root(path) {
            Some((root, inner)) => {
                let name = file_name(&root);
                let root_real = root.canonicalize()?;
                let dest_root = frameworks.join(&name);
                if self.claim(&name, &root_real, &dest_root, CopyKind::Framework)? {
                    self.plan.copies.push(CopyAction {
                        kind: CopyKind::Framework,
                        source: root_real,
                        dest: dest_root.clone(),
                    });
                }
                dest_root.join(inner)
            }
            None => {
                let name = file_name(path);
                let dest = frameworks.join(&name);
                if self.claim(&name, real, &dest, CopyKind::Library)? {
                    self.plan.copies.push(CopyAction {
                        kind: CopyKind::Library,
                        source: real.to_path_buf(),
                        dest: dest.clone(),
                    });
                }
                dest
            }
        };

        tracing::debug!(source = %real.display(), dest = %dest.display(), "relocating");
        self.relocated.insert(real.to_path_buf(), dest.clone());
        Ok(dest)
    }

    /// Reserve a destination name. Returns whether a copy is needed.
    fn claim(&mut self, name: &str, real: &Path, dest: &Path, kind: CopyKind) -> Result<bool> {
        if let Some(owner) = self.names.get(name) {
            if owner == real {
                return Ok(false);
            }
            return Err(Error::DestinationConflict {
                name: name.to_string(),
                first: owner.clone(),
                second: real.to_path_buf(),
            });
        }

        let mut needs_copy = true;
        if dest.symlink_metadata().is_ok() {
            // Something already ships under this name. Only an identical
            // library may stand in for the external one.
            let identical = kind == CopyKind::Library && same_contents(dest, real)?;
            if !identical {
                return Err(Error::DestinationConflict {
                    name: name.to_string(),
                    first: dest.to_path_buf(),
                    second: real.to_path_buf(),
                });
            }
            needs_copy = false;
        }

        self.names.insert(name.to_string(), real.to_path_buf());
        Ok(needs_copy)
    }

    /// `@executable_path`-relative install name of an in-bundle path.
    fn install_name(&self, path: &Path) -> String {
        let contents = self.bundle.contents();
        match path.strip_prefix(&contents) {
            Ok(rel) => format!("@executable_path/../{}", rel.display()),
            Err(_) => match path.strip_prefix(self.bundle.root()) {
                Ok(rel) => format!("@executable_path/../../{}", rel.display()),
                Err(_) => path.display().to_string(),
            },
        }
    }

    /// Canonical form of `path` when it lies inside the bundle.
    fn bundle_path(&self, path: &Path) -> Option<PathBuf> {
        let real = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.bundle.contains(&real).then_some(real)
    }

    fn edit(&mut self, binary: &Path) -> &mut BinaryEdit {
        self.plan.edits.entry(binary.to_path_buf()).or_default()
    }
}

fn inspect(path: &Path) -> Result<DylibInfo> {
    macship_macho::inspect(path).map_err(|e| Error::binary(path, e))
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("/"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let (meta_a, meta_b) = (std::fs::metadata(a)?, std::fs::metadata(b)?);
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(sha256_file(a)? == sha256_file(b)?)
}
