//! In-place load command rewriting, the native equivalent of
//! `install_name_tool -change/-id/-delete_rpath/-add_rpath`.

use crate::fat;
use crate::macho::MachoFile;
use crate::Result;
use std::io::Write;
use std::path::Path;

/// A set of load command edits for one binary.
///
/// Edits apply to every architecture slice. Rewriting invalidates an
/// existing code signature; the binary must be re-signed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryEdit {
    /// `(old, new)` dependency paths.
    pub changes: Vec<(String, String)>,
    /// New `LC_ID_DYLIB` path.
    pub install_id: Option<String>,
    pub delete_rpaths: Vec<String>,
    pub add_rpaths: Vec<String>,
}

impl BinaryEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change_dependency(&mut self, old: impl Into<String>, new: impl Into<String>) {
        let (old, new) = (old.into(), new.into());
        if !self.changes.iter().any(|(o, _)| *o == old) {
            self.changes.push((old, new));
        }
    }

    pub fn set_install_id(&mut self, id: impl Into<String>) {
        self.install_id = Some(id.into());
    }

    pub fn delete_rpath(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.delete_rpaths.contains(&path) {
            self.delete_rpaths.push(path);
        }
    }

    pub fn add_rpath(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.add_rpaths.contains(&path) {
            self.add_rpaths.push(path);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
            && self.install_id.is_none()
            && self.delete_rpaths.is_empty()
            && self.add_rpaths.is_empty()
    }

    fn apply_to_image(&self, macho: &mut MachoFile) -> Result<bool> {
        let mut changed = false;
        for (old, new) in &self.changes {
            changed |= macho.change_dependency(old, new);
        }
        if let Some(id) = &self.install_id {
            changed |= macho.set_install_id(id)?;
        }
        for rpath in &self.delete_rpaths {
            changed |= macho.delete_rpath(rpath);
        }
        for rpath in &self.add_rpaths {
            changed |= macho.add_rpath(rpath);
        }
        Ok(changed)
    }

    /// Apply to an in-memory file. Returns whether any byte changed.
    ///
    /// On error `data` may hold partially rewritten slices; callers
    /// working on files should use [`BinaryEdit::apply_to_file`].
    pub fn apply_to_bytes(&self, data: &mut [u8]) -> Result<bool> {
        let mut changed = false;
        for slice in fat::slices(data)? {
            let image = &mut data[slice.range()];
            let mut macho = MachoFile::parse(image)?;
            if self.apply_to_image(&mut macho)? {
                macho.write_into(image)?;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Apply to a file on disk.
    ///
    /// The file is replaced through a temporary sibling and a rename, so a
    /// failure leaves the original untouched. Permissions are preserved.
    pub fn apply_to_file(&self, path: &Path) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let mut data = std::fs::read(path)?;
        if !self.apply_to_bytes(&mut data)? {
            return Ok(false);
        }

        let permissions = std::fs::metadata(path)?.permissions();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&data)?;
        temp.flush()?;
        std::fs::set_permissions(temp.path(), permissions)?;
        temp.persist(path).map_err(|e| e.error)?;

        tracing::debug!(path = %path.display(), "rewrote load commands");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dylib::inspect;
    use crate::fixture::{fat, FixtureBuilder};
    use crate::MachoError;

    #[test]
    fn test_apply_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfoo.dylib");
        FixtureBuilder::dylib("/opt/deps/lib/libfoo.dylib")
            .depends_on("/opt/deps/lib/libbar.dylib")
            .rpath("/opt/deps/lib")
            .write_to(&path)
            .unwrap();

        let mut edit = BinaryEdit::new();
        edit.change_dependency(
            "/opt/deps/lib/libbar.dylib",
            "@executable_path/../Frameworks/libbar.dylib",
        );
        edit.set_install_id("@executable_path/../Frameworks/libfoo.dylib");
        edit.delete_rpath("/opt/deps/lib");
        assert!(edit.apply_to_file(&path).unwrap());

        let info = inspect(&path).unwrap();
        assert_eq!(
            info.install_id.as_deref(),
            Some("@executable_path/../Frameworks/libfoo.dylib")
        );
        assert_eq!(
            info.dependencies[0].path,
            "@executable_path/../Frameworks/libbar.dylib"
        );
        assert!(info.rpaths.is_empty());

        // Second application is a no-op.
        assert!(!edit.apply_to_file(&path).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("App");
        FixtureBuilder::executable()
            .depends_on("/opt/lib/liba.dylib")
            .write_to(&path)
            .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut edit = BinaryEdit::new();
        edit.change_dependency("/opt/lib/liba.dylib", "@executable_path/liba.dylib");
        assert!(edit.apply_to_file(&path).unwrap());

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_failed_edit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libtight.dylib");
        FixtureBuilder::dylib("/a/libtight.dylib")
            .header_padding(0)
            .write_to(&path)
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut edit = BinaryEdit::new();
        edit.set_install_id(format!("/{}/libtight.dylib", "long".repeat(40)));
        let err = edit.apply_to_file(&path).unwrap_err();
        assert!(matches!(err, MachoError::InsufficientPadding { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_apply_to_every_fat_slice() {
        let arm = FixtureBuilder::executable()
            .depends_on("/opt/lib/liba.dylib")
            .build();
        let intel = FixtureBuilder::executable()
            .cpu(crate::macho::CPU_TYPE_X86_64)
            .depends_on("/opt/lib/liba.dylib")
            .build();
        let mut data = fat(&[arm, intel]);

        let mut edit = BinaryEdit::new();
        edit.change_dependency("/opt/lib/liba.dylib", "@loader_path/liba.dylib");
        assert!(edit.apply_to_bytes(&mut data).unwrap());

        for slice in fat::slices(&data).unwrap() {
            let macho = MachoFile::parse(&data[slice.range()]).unwrap();
            let deps: Vec<_> = macho.dependencies().map(|d| d.name.as_str()).collect();
            assert_eq!(deps, vec!["@loader_path/liba.dylib"]);
        }
    }

    #[test]
    fn test_edit_deduplicates_entries() {
        let mut edit = BinaryEdit::new();
        assert!(edit.is_empty());
        edit.change_dependency("a", "b");
        edit.change_dependency("a", "c");
        edit.delete_rpath("/x");
        edit.delete_rpath("/x");
        assert_eq!(edit.changes, vec![("a".to_string(), "b".to_string())]);
        assert_eq!(edit.delete_rpaths.len(), 1);
        assert!(!edit.is_empty());
    }
}
