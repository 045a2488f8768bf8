//! Mount table: one namespace composed of a root file system and ordered,
//! possibly nested, mounts.
//!
//! A path resolves to the mount whose point is its longest component-wise
//! prefix, so the innermost mount wins. Operations delegate with the path
//! rebased onto the mounted file system; listings and error paths are
//! rebased back.

use std::cell::RefCell;
use std::rc::Rc;

use vos_types::error::{Result, VosError};
use vos_types::path::{self, normalize};

use crate::program::{Executable, Program};
use crate::vfs::FileSystem;

struct MountPoint {
    path: String,
    fs: Rc<dyn FileSystem>,
}

/// A path resolved to its owning file system.
struct Resolved {
    fs: Rc<dyn FileSystem>,
    /// Path inside `fs`.
    inner: String,
    /// Where `fs` is attached; `/` for the root.
    point: String,
}

impl Resolved {
    fn outer(&self, inner: &str) -> String {
        path::rebase(&self.point, inner)
    }

    fn outer_error(&self, e: VosError) -> VosError {
        e.map_path(|p| self.outer(p))
    }

    fn outer_all(&self, paths: Vec<String>) -> Vec<String> {
        paths.iter().map(|p| self.outer(p)).collect()
    }
}

/// A computer's unified file system namespace.
pub struct MountTable {
    root: Rc<dyn FileSystem>,
    mounts: RefCell<Vec<MountPoint>>,
}

impl MountTable {
    pub fn new(root: Rc<dyn FileSystem>) -> Self {
        Self {
            root,
            mounts: RefCell::new(Vec::new()),
        }
    }

    /// Mount points in the order they were attached.
    pub fn mount_points(&self) -> Vec<String> {
        self.mounts.borrow().iter().map(|m| m.path.clone()).collect()
    }

    fn is_mount_point(&self, path: &str) -> bool {
        self.mounts.borrow().iter().any(|m| m.path == path)
    }

    /// Whether another mount sits strictly below `path`.
    fn has_nested_mount(&self, path: &str) -> bool {
        self.mounts
            .borrow()
            .iter()
            .any(|m| m.path != path && path::is_within(&m.path, path))
    }

    fn resolve(&self, path: &str) -> Resolved {
        let path = normalize(path);
        let mounts = self.mounts.borrow();
        let best = mounts
            .iter()
            .filter(|m| path::is_within(&path, &m.path))
            .max_by_key(|m| m.path.len());
        match best {
            Some(m) => Resolved {
                fs: Rc::clone(&m.fs),
                inner: path::strip_prefix(&path, &m.path).unwrap_or_else(|| "/".to_string()),
                point: m.path.clone(),
            },
            None => Resolved {
                fs: Rc::clone(&self.root),
                inner: path.into_owned(),
                point: "/".to_string(),
            },
        }
    }

    fn delegate<T>(
        &self,
        path: &str,
        op: impl FnOnce(&dyn FileSystem, &str) -> Result<T>,
    ) -> Result<T> {
        let r = self.resolve(path);
        op(r.fs.as_ref(), &r.inner).map_err(|e| r.outer_error(e))
    }
}

impl FileSystem for MountTable {
    fn directory_exists(&self, path: &str) -> bool {
        let r = self.resolve(path);
        r.inner == "/" || r.fs.directory_exists(&r.inner)
    }

    fn file_exists(&self, path: &str) -> bool {
        let r = self.resolve(path);
        r.fs.file_exists(&r.inner)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.delegate(path, |fs, p| fs.create_directory(p))
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.delegate(path, |fs, p| fs.delete_file(p))
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        if self.is_mount_point(&path) || self.has_nested_mount(&path) {
            return Err(VosError::Busy(path.into_owned()));
        }
        self.delegate(&path, |fs, p| fs.delete_directory(p))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.delegate(path, |fs, p| fs.read_file(p))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.delegate(path, |fs, p| fs.write_file(p, data))
    }

    fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.delegate(path, |fs, p| fs.append_file(p, data))
    }

    fn directories(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path);
        let r = self.resolve(&path);
        let mut dirs = r
            .fs
            .directories(&r.inner)
            .map(|d| r.outer_all(d))
            .map_err(|e| r.outer_error(e))?;
        for point in self.mount_points() {
            if point != "/" && path::parent(&point) == path && !dirs.contains(&point) {
                dirs.push(point);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn files(&self, path: &str) -> Result<Vec<String>> {
        let r = self.resolve(path);
        r.fs.files(&r.inner)
            .map(|f| r.outer_all(f))
            .map_err(|e| r.outer_error(e))
    }

    fn is_executable(&self, path: &str) -> bool {
        let r = self.resolve(path);
        r.fs.is_executable(&r.inner)
    }

    fn executable(&self, path: &str) -> Result<Executable> {
        self.delegate(path, |fs, p| fs.executable(p))
    }

    fn set_executable(&self, path: &str, executable: bool) -> Result<()> {
        self.delegate(path, |fs, p| fs.set_executable(p, executable))
    }

    fn install_program(&self, path: &str, program: Rc<dyn Program>) -> Result<()> {
        self.delegate(path, |fs, p| fs.install_program(p, program))
    }

    fn is_read_only(&self, path: &str) -> bool {
        let r = self.resolve(path);
        r.fs.is_read_only(&r.inner)
    }

    fn mount(&self, path: &str, fs: Rc<dyn FileSystem>) -> Result<()> {
        let path = normalize(path).into_owned();
        if path == "/" || self.is_mount_point(&path) {
            return Err(VosError::Busy(path));
        }
        if !self.directory_exists(&path) {
            return Err(VosError::NotFound(path));
        }
        if self.is_read_only(&path) {
            return Err(VosError::ReadOnly(path));
        }
        log::debug!("Mounted file system at {path}");
        self.mounts.borrow_mut().push(MountPoint { path, fs });
        Ok(())
    }

    fn unmount(&self, path: &str) -> Result<()> {
        let path = normalize(path).into_owned();
        let Some(index) = self.mounts.borrow().iter().position(|m| m.path == path) else {
            return Err(VosError::NotFound(path));
        };
        if self.has_nested_mount(&path) {
            return Err(VosError::Busy(path));
        }
        self.mounts.borrow_mut().remove(index);
        log::debug!("Unmounted {path}");
        Ok(())
    }
}
