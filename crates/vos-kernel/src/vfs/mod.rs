//! Virtual file system.
//!
//! Every backing store implements [`FileSystem`]. A computer's namespace is
//! a [`MountTable`] over an in-memory root; the world's narrative devices
//! are exposed through [`DevicesFileSystem`]; users see it all through a
//! permission-checking [`VirtualFileSystem`].
//!
//! Paths are absolute and `/`-separated. Listings return absolute paths.

use std::rc::Rc;

use vos_types::error::{Result, VosError};

use crate::program::{Executable, Program};

pub mod devices;
pub mod memory;
pub mod mount;
pub mod view;

pub use devices::{DeviceRegistry, DevicesFileSystem};
pub use memory::MemoryFs;
pub use mount::MountTable;
pub use view::{FileReader, FileWriter, VirtualFileSystem};

/// A backing file system. Methods take `&self`; implementations keep their
/// state behind `RefCell` and assume a single writer.
pub trait FileSystem {
    fn directory_exists(&self, path: &str) -> bool;

    /// True for regular files and installed programs.
    fn file_exists(&self, path: &str) -> bool;

    /// Create a directory and any missing parents.
    fn create_directory(&self, path: &str) -> Result<()>;

    fn delete_file(&self, path: &str) -> Result<()>;

    /// Delete an empty directory.
    fn delete_directory(&self, path: &str) -> Result<()>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or truncate a file with `data`.
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Append to a file, creating it if missing.
    fn append_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Absolute paths of the subdirectories of `path`.
    fn directories(&self, path: &str) -> Result<Vec<String>>;

    /// Absolute paths of the files in `path`.
    fn files(&self, path: &str) -> Result<Vec<String>>;

    fn is_executable(&self, path: &str) -> bool;

    fn executable(&self, path: &str) -> Result<Executable>;

    fn set_executable(&self, path: &str, _executable: bool) -> Result<()> {
        Err(VosError::ReadOnly(path.to_string()))
    }

    /// Place a native program at `path`.
    fn install_program(&self, path: &str, _program: Rc<dyn Program>) -> Result<()> {
        Err(VosError::ReadOnly(path.to_string()))
    }

    /// Whether `path` has no writable backing store.
    fn is_read_only(&self, _path: &str) -> bool {
        false
    }

    /// Attach `fs` at `path`.
    fn mount(&self, path: &str, _fs: Rc<dyn FileSystem>) -> Result<()> {
        Err(VosError::ReadOnly(path.to_string()))
    }

    fn unmount(&self, path: &str) -> Result<()> {
        Err(VosError::ReadOnly(path.to_string()))
    }
}
