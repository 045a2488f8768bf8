//! Narrative-device file system.
//!
//! The first path segment names a device (a computer's narrative id); the
//! rest of the path is handed, rooted at `/`, to that device's file system.
//! The synthetic root lists the known devices and cannot be written.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use vos_types::error::{Result, VosError};
use vos_types::path::{self, normalize};

use crate::program::{Executable, Program};
use crate::vfs::FileSystem;

/// Narrative id to file system. Holds weak references; a device disappears
/// when its owner drops it.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RefCell<BTreeMap<String, Weak<dyn FileSystem>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &str, fs: &Rc<dyn FileSystem>) {
        log::debug!("Registered narrative device {id}");
        self.devices
            .borrow_mut()
            .insert(id.to_string(), Rc::downgrade(fs));
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.devices.borrow_mut().remove(id).is_some()
    }

    pub fn lookup(&self, id: &str) -> Option<Rc<dyn FileSystem>> {
        self.devices.borrow().get(id).and_then(Weak::upgrade)
    }

    /// Ids of devices that are still alive, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.devices
            .borrow()
            .iter()
            .filter(|(_, fs)| fs.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

enum Target {
    /// The synthetic root (empty device id).
    Root,
    Unknown(String),
    Device {
        fs: Rc<dyn FileSystem>,
        prefix: String,
        rest: String,
    },
}

/// File system addressing other computers by narrative id.
pub struct DevicesFileSystem {
    registry: Rc<DeviceRegistry>,
}

impl DevicesFileSystem {
    pub fn new(registry: Rc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Split a path into its device id and the remaining path.
    fn split(path: &str) -> (String, String) {
        let path = normalize(path);
        let trimmed = &path[1..];
        match trimmed.find('/') {
            Some(i) => (trimmed[..i].to_string(), trimmed[i..].to_string()),
            None => (trimmed.to_string(), "/".to_string()),
        }
    }

    fn target(&self, path: &str) -> Target {
        let (id, rest) = Self::split(path);
        if id.is_empty() {
            return Target::Root;
        }
        match self.registry.lookup(&id) {
            Some(fs) => Target::Device {
                fs,
                prefix: format!("/{id}"),
                rest,
            },
            None => Target::Unknown(id),
        }
    }

    /// Run `op` against the addressed device, or fail with `otherwise`.
    fn delegate<T>(
        &self,
        path: &str,
        otherwise: impl FnOnce(String) -> VosError,
        op: impl FnOnce(&dyn FileSystem, &str) -> Result<T>,
    ) -> Result<T> {
        match self.target(path) {
            Target::Device { fs, prefix, rest } => {
                op(fs.as_ref(), &rest).map_err(|e| e.map_path(|p| path::rebase(&prefix, p)))
            },
            Target::Root | Target::Unknown(_) => Err(otherwise(normalize(path).into_owned())),
        }
    }

    fn list(
        &self,
        path: &str,
        at_root: impl FnOnce() -> Vec<String>,
        op: impl FnOnce(&dyn FileSystem, &str) -> Result<Vec<String>>,
    ) -> Result<Vec<String>> {
        match self.target(path) {
            Target::Root => Ok(at_root()),
            Target::Unknown(id) => Err(VosError::NotFound(format!("/{id}"))),
            Target::Device { fs, prefix, rest } => op(fs.as_ref(), &rest)
                .map(|entries| entries.iter().map(|e| path::rebase(&prefix, e)).collect())
                .map_err(|e| e.map_path(|p| path::rebase(&prefix, p))),
        }
    }
}

impl FileSystem for DevicesFileSystem {
    fn directory_exists(&self, path: &str) -> bool {
        match self.target(path) {
            Target::Root => true,
            Target::Unknown(_) => false,
            Target::Device { fs, rest, .. } => fs.directory_exists(&rest),
        }
    }

    fn file_exists(&self, path: &str) -> bool {
        match self.target(path) {
            Target::Device { fs, rest, .. } => fs.file_exists(&rest),
            _ => false,
        }
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.create_directory(p))
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.delegate(path, VosError::NotFound, |fs, p| fs.delete_file(p))
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        match self.target(path) {
            Target::Root => Err(VosError::ReadOnly(normalize(path).into_owned())),
            _ => self.delegate(path, VosError::NotFound, |fs, p| fs.delete_directory(p)),
        }
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.delegate(path, VosError::NotFound, |fs, p| fs.read_file(p))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.write_file(p, data))
    }

    fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.append_file(p, data))
    }

    fn directories(&self, path: &str) -> Result<Vec<String>> {
        self.list(
            path,
            || self.registry.ids().iter().map(|id| format!("/{id}")).collect(),
            |fs, p| fs.directories(p),
        )
    }

    fn files(&self, path: &str) -> Result<Vec<String>> {
        self.list(path, Vec::new, |fs, p| fs.files(p))
    }

    fn is_executable(&self, path: &str) -> bool {
        match self.target(path) {
            Target::Device { fs, rest, .. } => fs.is_executable(&rest),
            _ => false,
        }
    }

    fn executable(&self, path: &str) -> Result<Executable> {
        self.delegate(path, VosError::NotFound, |fs, p| fs.executable(p))
    }

    fn set_executable(&self, path: &str, executable: bool) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.set_executable(p, executable))
    }

    fn install_program(&self, path: &str, program: Rc<dyn Program>) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.install_program(p, program))
    }

    fn is_read_only(&self, path: &str) -> bool {
        match self.target(path) {
            Target::Device { fs, rest, .. } => fs.is_read_only(&rest),
            _ => true,
        }
    }

    fn mount(&self, path: &str, mounted: Rc<dyn FileSystem>) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.mount(p, mounted))
    }

    fn unmount(&self, path: &str) -> Result<()> {
        self.delegate(path, VosError::ReadOnly, |fs, p| fs.unmount(p))
    }
}
