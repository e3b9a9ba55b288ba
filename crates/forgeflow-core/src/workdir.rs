use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::CoreError;

/// Registry-backed acquirer of exclusive working subpaths under a root.
///
/// Every `Workdir` produced by `acquire_dir`/`acquire_file` from the same
/// original root shares one registry, so a subpath can be acquired at most
/// once across the whole tree of children.
#[derive(Debug, Clone)]
pub struct Workdir {
    root: PathBuf,
    registry: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Workdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workdir {
            root: root.into(),
            registry: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn child(&self, root: PathBuf) -> Self {
        Workdir {
            root,
            registry: Arc::clone(&self.registry),
        }
    }

    fn acquire(&self, path: &Path) -> Result<(), CoreError> {
        let mut registry = self.registry.lock().expect("workdir registry poisoned");
        if !registry.insert(path.to_path_buf()) {
            return Err(CoreError::WorkpathAlreadyAcquired(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn acquire_dir(
        &self,
        relpath: impl AsRef<Path>,
        force_empty: bool,
        exist_ok: bool,
    ) -> Result<Workdir, CoreError> {
        let path = self.root.join(relpath.as_ref());
        if exist_ok {
            // Acquiring with exist_ok still registers the path, but a prior
            // acquisition of the same path is not itself an error.
            let mut registry = self.registry.lock().expect("workdir registry poisoned");
            registry.insert(relpath.as_ref().to_path_buf());
        } else {
            self.acquire(relpath.as_ref())?;
        }

        if path.exists() && (force_empty || !exist_ok) {
            debug!("clearing workdir {}", path.display());
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(&path)?;
        Ok(self.child(path))
    }

    pub fn acquire_file(&self, relpath: impl AsRef<Path>, exist_ok: bool) -> Result<PathBuf, CoreError> {
        let path = self.root.join(relpath.as_ref());
        if let Some(parent) = path.parent() {
            if parent != self.root {
                let rel_parent = parent.strip_prefix(&self.root).unwrap_or(parent);
                self.acquire_dir(rel_parent, false, true)?;
            } else {
                std::fs::create_dir_all(parent)?;
            }
        }

        if path.exists() && !exist_ok {
            return Err(CoreError::WorkFileExists(path));
        }
        self.acquire(relpath.as_ref())
            .or_else(|e| if exist_ok { Ok(()) } else { Err(e) })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_dir_creates_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let wd = Workdir::new(dir.path());
        let child = wd.acquire_dir("status", false, false).unwrap();
        assert!(child.root().is_dir());
    }

    #[test]
    fn acquiring_same_dir_twice_without_exist_ok_fails() {
        let dir = tempfile::tempdir().unwrap();
        let wd = Workdir::new(dir.path());
        wd.acquire_dir("status", false, false).unwrap();
        assert!(wd.acquire_dir("status", false, false).is_err());
    }

    #[test]
    fn acquire_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let wd = Workdir::new(dir.path());
        let path = wd.acquire_file("status/abc123", false).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn acquire_file_refuses_existing_unless_exist_ok() {
        let dir = tempfile::tempdir().unwrap();
        let wd = Workdir::new(dir.path());
        std::fs::write(dir.path().join("out.txt"), b"x").unwrap();
        assert!(wd.acquire_file("out.txt", false).is_err());
        assert!(wd.acquire_file("out.txt", true).is_ok());
    }
}
