//! Applying a relocation plan.
//!
//! Copies and rewritten binaries are first produced in a staging directory
//! inside `Contents`. Only when every copy and rewrite has succeeded and the
//! staged result passes verification are they renamed into place, so a
//! failure leaves the bundle as it was.

use super::plan::{CopyKind, RelocationPlan};
use crate::bundle::Bundle;
use crate::copy::{copy_file, copy_tree};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of an applied plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    /// Destinations of copied libraries and frameworks.
    pub copied: Vec<PathBuf>,
    pub changed_references: usize,
    pub deleted_rpaths: usize,
    /// Binaries whose load commands changed.
    pub rewritten: usize,
    /// Binaries inspected by the walk.
    pub checked: usize,
}

impl RelocationReport {
    pub fn is_noop(&self) -> bool {
        self.copied.is_empty() && self.rewritten == 0
    }
}

/// Stage the plan, hand `verify` each binary's final path paired with the
/// file currently holding its final bytes, then commit.
pub(crate) fn apply<F>(bundle: &Bundle, plan: &RelocationPlan, verify: F) -> Result<RelocationReport>
where
    F: FnOnce(&[(PathBuf, PathBuf)]) -> Result<()>,
{
    let mut report = RelocationReport {
        checked: plan.binaries.len(),
        ..Default::default()
    };
    if plan.is_empty() {
        let unchanged: Vec<_> = plan.binaries.iter().map(|b| (b.clone(), b.clone())).collect();
        verify(&unchanged)?;
        return Ok(report);
    }

    let staging = tempfile::Builder::new()
        .prefix(".macship-staging")
        .tempdir_in(bundle.contents())?;
    let copies_dir = staging.path().join("copies");
    let edits_dir = staging.path().join("edits");
    fs::create_dir_all(&copies_dir)?;
    fs::create_dir_all(&edits_dir)?;

    // Destination of each copy to its staged location.
    let mut staged: HashMap<&Path, PathBuf> = HashMap::new();
    for (index, copy) in plan.copies.iter().enumerate() {
        let target = copies_dir.join(index.to_string());
        match copy.kind {
            CopyKind::Library => copy_file(&copy.source, &target)?,
            CopyKind::Framework => copy_tree(&copy.source, &target)?,
        }
        tracing::debug!(source = %copy.source.display(), "staged copy");
        staged.insert(copy.dest.as_path(), target);
    }

    let staged_path = |binary: &Path| -> Option<PathBuf> {
        let copy = plan.copy_for(binary)?;
        let inner = binary.strip_prefix(&copy.dest).ok()?;
        let root = staged.get(copy.dest.as_path())?;
        Some(if inner.as_os_str().is_empty() {
            root.clone()
        } else {
            root.join(inner)
        })
    };

    let mut replacements = Vec::new();
    for (index, (binary, edit)) in plan.edits.iter().enumerate() {
        let staged_copy = staged_path(binary);

        let source = staged_copy.clone().unwrap_or_else(|| binary.clone());
        let mut data = fs::read(&source)?;
        let changed = edit
            .apply_to_bytes(&mut data)
            .map_err(|e| Error::binary(binary, e))?;
        if !changed {
            continue;
        }
        report.rewritten += 1;

        match staged_copy {
            Some(path) => fs::write(&path, &data)?,
            None => {
                let target = edits_dir.join(index.to_string());
                fs::write(&target, &data)?;
                fs::set_permissions(&target, fs::metadata(binary)?.permissions())?;
                replacements.push((target, binary.clone()));
            }
        }
    }

    let replaced: HashMap<&Path, &Path> = replacements
        .iter()
        .map(|(from, to): &(PathBuf, PathBuf)| (to.as_path(), from.as_path()))
        .collect();
    let final_bytes: Vec<(PathBuf, PathBuf)> = plan
        .binaries
        .iter()
        .map(|binary| {
            let holder = replaced
                .get(binary.as_path())
                .map(|p| p.to_path_buf())
                .or_else(|| staged_path(binary))
                .unwrap_or_else(|| binary.clone());
            (binary.clone(), holder)
        })
        .collect();
    verify(&final_bytes)?;

    // Commit.
    fs::create_dir_all(bundle.frameworks_dir())?;
    for copy in &plan.copies {
        let from = staged.get(copy.dest.as_path()).ok_or_else(|| {
            Error::Relocation(format!("{} was not staged", copy.dest.display()))
        })?;
        fs::rename(from, &copy.dest)?;
        report.copied.push(copy.dest.clone());
    }
    for (from, to) in &replacements {
        fs::rename(from, to)?;
    }

    report.changed_references = plan.changed_references();
    report.deleted_rpaths = plan.deleted_rpaths();
    Ok(report)
}
