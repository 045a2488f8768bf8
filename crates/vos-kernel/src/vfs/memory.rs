//! In-memory file system.
//!
//! The entire tree lives in a `BTreeMap<String, Node>` keyed by normalized
//! absolute paths, so a directory's children are a contiguous key range.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use vos_types::error::{Result, VosError};
use vos_types::path::{normalize, parent};

use crate::program::{Executable, Program};
use crate::vfs::FileSystem;

#[derive(Clone)]
enum Node {
    File { data: Vec<u8>, executable: bool },
    Dir,
    Program(Rc<dyn Program>),
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { data, executable } => f
                .debug_struct("File")
                .field("len", &data.len())
                .field("executable", executable)
                .finish(),
            Self::Dir => f.write_str("Dir"),
            Self::Program(p) => f.debug_tuple("Program").field(&p.name()).finish(),
        }
    }
}

/// A fully in-memory file system.
#[derive(Debug)]
pub struct MemoryFs {
    nodes: RefCell<BTreeMap<String, Node>>,
}

impl MemoryFs {
    /// Create a file system containing only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes: RefCell::new(nodes),
        }
    }

    /// Direct children of a directory, filtered by `keep`.
    fn children(&self, path: &str, keep: impl Fn(&Node) -> bool) -> Result<Vec<String>> {
        let path = normalize(path);
        let nodes = self.nodes.borrow();
        match nodes.get(path.as_ref()) {
            Some(Node::Dir) => {},
            Some(_) => return Err(VosError::NotADirectory(path.into_owned())),
            None => return Err(VosError::NotFound(path.into_owned())),
        }
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut entries = Vec::new();
        for (key, node) in nodes.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') && keep(node) {
                entries.push(key.clone());
            }
        }
        Ok(entries)
    }

    /// Fail unless the parent of `path` is an existing directory.
    fn check_parent(&self, path: &str) -> Result<()> {
        let par = parent(path);
        match self.nodes.borrow().get(par) {
            Some(Node::Dir) => Ok(()),
            Some(_) => Err(VosError::NotADirectory(par.to_string())),
            None => Err(VosError::NotFound(par.to_string())),
        }
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFs {
    fn directory_exists(&self, path: &str) -> bool {
        matches!(self.nodes.borrow().get(normalize(path).as_ref()), Some(Node::Dir))
    }

    fn file_exists(&self, path: &str) -> bool {
        matches!(
            self.nodes.borrow().get(normalize(path).as_ref()),
            Some(Node::File { .. } | Node::Program(_))
        )
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        match self.nodes.borrow().get(path.as_ref()) {
            Some(Node::Dir) => return Ok(()),
            Some(_) => return Err(VosError::AlreadyExists(path.into_owned())),
            None => {},
        }
        let par = parent(&path).to_string();
        if par != path.as_ref() {
            self.create_directory(&par)?;
        }
        self.nodes.borrow_mut().insert(path.into_owned(), Node::Dir);
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(path.as_ref()) {
            Some(Node::File { .. } | Node::Program(_)) => {
                nodes.remove(path.as_ref());
                Ok(())
            },
            Some(Node::Dir) => Err(VosError::IsADirectory(path.into_owned())),
            None => Err(VosError::NotFound(path.into_owned())),
        }
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        if path == "/" {
            return Err(VosError::PermissionDenied("/".to_string()));
        }
        match self.nodes.borrow().get(path.as_ref()) {
            Some(Node::Dir) => {},
            Some(_) => return Err(VosError::NotADirectory(path.into_owned())),
            None => return Err(VosError::NotFound(path.into_owned())),
        }
        if !self.children(&path, |_| true)?.is_empty() {
            return Err(VosError::DirectoryNotEmpty(path.into_owned()));
        }
        self.nodes.borrow_mut().remove(path.as_ref());
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        match self.nodes.borrow().get(path.as_ref()) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Program(p)) => Ok(format!("<native program: {}>\n", p.name()).into_bytes()),
            Some(Node::Dir) => Err(VosError::IsADirectory(path.into_owned())),
            None => Err(VosError::NotFound(path.into_owned())),
        }
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = normalize(path);
        self.check_parent(&path)?;
        let mut nodes = self.nodes.borrow_mut();
        let executable = match nodes.get(path.as_ref()) {
            Some(Node::Dir) => return Err(VosError::IsADirectory(path.into_owned())),
            Some(Node::Program(_)) => return Err(VosError::PermissionDenied(path.into_owned())),
            Some(Node::File { executable, .. }) => *executable,
            None => false,
        };
        nodes.insert(
            path.into_owned(),
            Node::File {
                data: data.to_vec(),
                executable,
            },
        );
        Ok(())
    }

    fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = normalize(path);
        {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.get_mut(path.as_ref()) {
                Some(Node::File { data: existing, .. }) => {
                    existing.extend_from_slice(data);
                    return Ok(());
                },
                Some(Node::Dir) => return Err(VosError::IsADirectory(path.into_owned())),
                Some(Node::Program(_)) => {
                    return Err(VosError::PermissionDenied(path.into_owned()));
                },
                None => {},
            }
        }
        self.write_file(&path, data)
    }

    fn directories(&self, path: &str) -> Result<Vec<String>> {
        self.children(path, |n| matches!(n, Node::Dir))
    }

    fn files(&self, path: &str) -> Result<Vec<String>> {
        self.children(path, |n| !matches!(n, Node::Dir))
    }

    fn is_executable(&self, path: &str) -> bool {
        matches!(
            self.nodes.borrow().get(normalize(path).as_ref()),
            Some(Node::File {
                executable: true,
                ..
            } | Node::Program(_))
        )
    }

    fn executable(&self, path: &str) -> Result<Executable> {
        let path = normalize(path);
        match self.nodes.borrow().get(path.as_ref()) {
            Some(Node::Program(p)) => Ok(Executable::Native(Rc::clone(p))),
            Some(Node::File {
                data,
                executable: true,
            }) => Ok(Executable::Script(String::from_utf8_lossy(data).into_owned())),
            Some(Node::File { .. }) => Err(VosError::NotExecutable(path.into_owned())),
            Some(Node::Dir) => Err(VosError::IsADirectory(path.into_owned())),
            None => Err(VosError::NotFound(path.into_owned())),
        }
    }

    fn set_executable(&self, path: &str, value: bool) -> Result<()> {
        let path = normalize(path);
        match self.nodes.borrow_mut().get_mut(path.as_ref()) {
            Some(Node::File { executable, .. }) => {
                *executable = value;
                Ok(())
            },
            Some(Node::Program(_)) if value => Ok(()),
            Some(Node::Program(_)) => Err(VosError::PermissionDenied(path.into_owned())),
            Some(Node::Dir) => Err(VosError::IsADirectory(path.into_owned())),
            None => Err(VosError::NotFound(path.into_owned())),
        }
    }

    fn install_program(&self, path: &str, program: Rc<dyn Program>) -> Result<()> {
        let path = normalize(path);
        self.check_parent(&path)?;
        let mut nodes = self.nodes.borrow_mut();
        if matches!(nodes.get(path.as_ref()), Some(Node::Dir)) {
            return Err(VosError::IsADirectory(path.into_owned()));
        }
        nodes.insert(path.into_owned(), Node::Program(program));
        Ok(())
    }
}
