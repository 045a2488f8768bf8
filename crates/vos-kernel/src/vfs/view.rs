//! Per-user view over a computer's file system.
//!
//! Reads pass straight through. Anything that changes the tree requires
//! root, or a path inside the user's home or `/tmp`.

use std::io::{self, BufRead, Cursor, Read, Write};
use std::rc::Rc;

use vos_types::error::{Result, VosError};
use vos_types::path::{self, normalize};

use crate::program::{Executable, Program};
use crate::user::User;
use crate::vfs::FileSystem;

/// A user's filtered view of a file system.
#[derive(Clone)]
pub struct VirtualFileSystem {
    fs: Rc<dyn FileSystem>,
    user: Rc<User>,
}

impl VirtualFileSystem {
    pub fn new(fs: Rc<dyn FileSystem>, user: Rc<User>) -> Self {
        Self { fs, user }
    }

    pub fn user(&self) -> &Rc<User> {
        &self.user
    }

    /// Whether the user may modify `path`.
    pub fn can_write(&self, path: &str) -> bool {
        let path = normalize(path);
        self.user.is_root()
            || path::is_within(&path, &self.user.home)
            || path::is_within(&path, "/tmp")
    }

    fn check_write(&self, path: &str) -> Result<()> {
        if self.can_write(path) {
            Ok(())
        } else {
            Err(VosError::PermissionDenied(normalize(path).into_owned()))
        }
    }

    /// Open a file for reading.
    pub fn open_read(&self, path: &str) -> Result<FileReader> {
        let data = self.fs.read_file(path)?;
        Ok(FileReader {
            inner: Cursor::new(data),
        })
    }

    /// Open a file for writing, creating or truncating it now.
    pub fn open_write(&self, path: &str) -> Result<FileWriter> {
        self.write_file(path, &[])?;
        Ok(FileWriter::new(Rc::clone(&self.fs), path))
    }

    /// Open a file for appending, creating it if missing.
    pub fn open_write_append(&self, path: &str) -> Result<FileWriter> {
        self.append_file(path, &[])?;
        Ok(FileWriter::new(Rc::clone(&self.fs), path))
    }

    pub fn read_to_string(&self, path: &str) -> Result<String> {
        let data = self.fs.read_file(path)?;
        String::from_utf8(data).map_err(|e| VosError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    pub fn write_all_text(&self, path: &str, text: &str) -> Result<()> {
        self.write_file(path, text.as_bytes())
    }
}

impl FileSystem for VirtualFileSystem {
    fn directory_exists(&self, path: &str) -> bool {
        self.fs.directory_exists(path)
    }

    fn file_exists(&self, path: &str) -> bool {
        self.fs.file_exists(path)
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.check_write(path)?;
        self.fs.create_directory(path)
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        self.check_write(path)?;
        self.fs.delete_file(path)
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        self.check_write(path)?;
        self.fs.delete_directory(path)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.read_file(path)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check_write(path)?;
        self.fs.write_file(path, data)
    }

    fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check_write(path)?;
        self.fs.append_file(path, data)
    }

    fn directories(&self, path: &str) -> Result<Vec<String>> {
        self.fs.directories(path)
    }

    fn files(&self, path: &str) -> Result<Vec<String>> {
        self.fs.files(path)
    }

    fn is_executable(&self, path: &str) -> bool {
        self.fs.is_executable(path)
    }

    fn executable(&self, path: &str) -> Result<Executable> {
        self.fs.executable(path)
    }

    fn set_executable(&self, path: &str, executable: bool) -> Result<()> {
        self.check_write(path)?;
        self.fs.set_executable(path, executable)
    }

    fn install_program(&self, path: &str, program: Rc<dyn Program>) -> Result<()> {
        self.check_write(path)?;
        self.fs.install_program(path, program)
    }

    fn is_read_only(&self, path: &str) -> bool {
        !self.can_write(path) || self.fs.is_read_only(path)
    }

    fn mount(&self, path: &str, fs: Rc<dyn FileSystem>) -> Result<()> {
        self.check_write(path)?;
        self.fs.mount(path, fs)
    }

    fn unmount(&self, path: &str) -> Result<()> {
        self.check_write(path)?;
        self.fs.unmount(path)
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Reader over a snapshot of a file's contents.
#[derive(Debug)]
pub struct FileReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for FileReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}

/// Buffered writer that appends to a file on flush and on drop.
pub struct FileWriter {
    fs: Rc<dyn FileSystem>,
    path: String,
    pending: Vec<u8>,
}

impl FileWriter {
    fn new(fs: Rc<dyn FileSystem>, path: &str) -> Self {
        Self {
            fs,
            path: normalize(path).into_owned(),
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.fs
            .append_file(&self.path, &self.pending)
            .map_err(VosError::into_io)?;
        self.pending.clear();
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush {}: {e}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::ComputerId;
    use crate::vfs::MemoryFs;
    use vos_types::config::PrivilegeLevel;

    fn user(name: &str, privilege: PrivilegeLevel) -> Rc<User> {
        Rc::new(User {
            id: if privilege == PrivilegeLevel::Root { 0 } else { 1000 },
            name: name.to_string(),
            privilege,
            computer: ComputerId(0),
            home: format!("/home/{name}"),
        })
    }

    fn fs() -> Rc<dyn FileSystem> {
        let fs = MemoryFs::new();
        fs.create_directory("/home/kim").unwrap();
        fs.create_directory("/tmp").unwrap();
        fs.create_directory("/etc").unwrap();
        fs.write_file("/etc/motd", b"welcome\nto vos\n").unwrap();
        Rc::new(fs)
    }

    #[test]
    fn standard_user_writes_only_home_and_tmp() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        view.write_all_text("/home/kim/a", "x").unwrap();
        view.write_all_text("/tmp/b", "y").unwrap();
        assert!(matches!(
            view.write_all_text("/etc/c", "z"),
            Err(VosError::PermissionDenied(_))
        ));
        assert!(matches!(
            view.delete_file("/etc/motd"),
            Err(VosError::PermissionDenied(_))
        ));
        assert!(view.is_read_only("/etc"));
    }

    #[test]
    fn root_writes_anywhere() {
        let view = VirtualFileSystem::new(fs(), user("root", PrivilegeLevel::Root));
        view.write_all_text("/etc/c", "z").unwrap();
        assert_eq!(view.read_to_string("/etc/c").unwrap(), "z");
    }

    #[test]
    fn reads_are_unrestricted() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        assert_eq!(view.read_to_string("/etc/motd").unwrap(), "welcome\nto vos\n");
    }

    #[test]
    fn open_read_yields_lines() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        let lines: Vec<String> = view
            .open_read("/etc/motd")
            .unwrap()
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["welcome", "to vos"]);
    }

    #[test]
    fn open_write_truncates_immediately() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        view.write_all_text("/tmp/f", "old").unwrap();
        let writer = view.open_write("/tmp/f").unwrap();
        assert_eq!(view.read_to_string("/tmp/f").unwrap(), "");
        drop(writer);
        assert_eq!(view.read_to_string("/tmp/f").unwrap(), "");
    }

    #[test]
    fn writer_flushes_on_flush_and_drop() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        let mut writer = view.open_write("/tmp/out").unwrap();
        writer.write_all(b"one ").unwrap();
        assert_eq!(view.read_to_string("/tmp/out").unwrap(), "");
        writer.flush().unwrap();
        assert_eq!(view.read_to_string("/tmp/out").unwrap(), "one ");
        writer.write_all(b"two").unwrap();
        drop(writer);
        assert_eq!(view.read_to_string("/tmp/out").unwrap(), "one two");
    }

    #[test]
    fn append_keeps_existing() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        view.write_all_text("/tmp/log", "a").unwrap();
        let mut writer = view.open_write_append("/tmp/log").unwrap();
        writer.write_all(b"b").unwrap();
        writer.flush().unwrap();
        assert_eq!(view.read_to_string("/tmp/log").unwrap(), "ab");
    }

    #[test]
    fn open_write_outside_home_is_denied() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        assert!(view.open_write("/etc/x").is_err());
        assert!(view.open_write_append("/etc/motd").is_err());
    }

    #[test]
    fn standard_user_cannot_mount_outside_home() {
        let view = VirtualFileSystem::new(fs(), user("kim", PrivilegeLevel::Standard));
        assert!(matches!(
            view.mount("/etc", Rc::new(MemoryFs::new())),
            Err(VosError::PermissionDenied(_))
        ));
    }
}
