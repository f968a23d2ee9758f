//! Per-session scratch directory holding the submitted source file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

/// A private, uniquely named directory with one source file inside.
///
/// The directory is removed by [`Workspace::destroy`] or, failing that, on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    script_path: PathBuf,
}

impl Workspace {
    /// Allocate a fresh directory under `root` (or the system temp dir) and
    /// write `source` to `file_name` inside it.
    pub fn create(
        root: Option<&Path>,
        prefix: &str,
        file_name: &str,
        source: &str,
    ) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let script_path = dir.path().join(file_name);
        // On failure `dir` is dropped here, which removes the directory.
        fs::write(&script_path, source)?;
        debug!("workspace created at {}", dir.path().display());

        Ok(Self {
            dir: Some(dir),
            script_path,
        })
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Directory path, or `None` once destroyed.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Remove the directory and its contents. Idempotent; failures are logged.
    pub fn destroy(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!("workspace removed: {}", path.display()),
            Err(e) => warn!("failed to remove workspace {}: {}", path.display(), e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_writes_source() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(root.path()), "t-", "main.py", "print('hi')\n").unwrap();

        assert_eq!(ws.script_path().file_name().unwrap(), "main.py");
        assert!(ws.script_path().starts_with(root.path()));
        let body = fs::read_to_string(ws.script_path()).unwrap();
        assert_eq!(body, "print('hi')\n");
    }

    #[test]
    fn test_directories_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = Workspace::create(Some(root.path()), "t-", "main.py", "").unwrap();
        let b = Workspace::create(Some(root.path()), "t-", "main.py", "").unwrap();
        assert_ne!(a.dir(), b.dir());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(Some(root.path()), "t-", "main.py", "x = 1").unwrap();
        let dir = ws.dir().unwrap().to_path_buf();

        ws.destroy();
        assert!(!dir.exists());
        assert!(ws.dir().is_none());
        ws.destroy();
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let ws = Workspace::create(Some(root.path()), "t-", "main.py", "").unwrap();
            ws.dir().unwrap().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_destroy_tolerates_external_removal() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(Some(root.path()), "t-", "main.py", "").unwrap();
        fs::remove_dir_all(ws.dir().unwrap()).unwrap();
        ws.destroy();
    }

    #[test]
    fn test_missing_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let ws = Workspace::create(Some(&nested), "t-", "main.py", "").unwrap();
        assert!(ws.script_path().starts_with(&nested));
    }
}
