//! Kernel services for VOS.
//!
//! Users, the per-computer process coordinator, programs, computers and the
//! world registry that ties them together, and the virtual file system.

pub mod computer;
pub mod process;
pub mod program;
pub mod user;
pub mod vfs;

pub use computer::{Computer, World};
pub use process::{Environment, Process, ProcessCoordinator};
pub use program::{
    Executable, Program, ProgramCatalog, ProgramContext, ProgramResolver, ScriptRunner,
};
pub use user::{ComputerId, User};
pub use vfs::{FileSystem, VirtualFileSystem};
