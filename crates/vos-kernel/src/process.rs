//! Processes and the per-computer process coordinator.
//!
//! The coordinator owns the process table and PID allocation. Processes are
//! cheap `Rc` handles; each keeps a strong reference to its parent and a
//! weak one to its coordinator. Children are never stored: they are found by
//! scanning the table, so the view stays consistent with kills.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use vos_types::error::{Result, VosError};

use crate::user::{ComputerId, User};

/// A process environment. Cloning yields an independent deep copy.
pub type Environment = BTreeMap<String, String>;

type DeathListener = Box<dyn FnOnce(&Process)>;

/// Hands out the lowest free PID, starting at 1.
#[derive(Debug)]
struct PidAllocator {
    next: u32,
    free: BTreeSet<u32>,
}

impl PidAllocator {
    fn new() -> Self {
        Self {
            next: 1,
            free: BTreeSet::new(),
        }
    }

    fn allocate(&mut self) -> u32 {
        if let Some(pid) = self.free.pop_first() {
            return pid;
        }
        let pid = self.next;
        self.next += 1;
        pid
    }

    fn release(&mut self, pid: u32) {
        self.free.insert(pid);
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Per-computer authority over process creation, PIDs, and termination.
pub struct ProcessCoordinator {
    computer: ComputerId,
    table: RefCell<BTreeMap<u32, Process>>,
    pids: RefCell<PidAllocator>,
    init: Process,
}

impl ProcessCoordinator {
    /// Boot a coordinator and its init process.
    ///
    /// Fails with [`VosError::Config`] unless `users` contains the id-0 root
    /// account.
    pub fn boot(computer: ComputerId, users: &[Rc<User>]) -> Result<Rc<Self>> {
        let root = users
            .iter()
            .find(|u| u.is_super_user())
            .ok_or_else(|| {
                VosError::Config("no user with id 0 and root privilege exists".to_string())
            })?;
        let root = Rc::clone(root);
        Ok(Rc::new_cyclic(|weak| {
            let mut pids = PidAllocator::new();
            let pid = pids.allocate();
            let init = Process::new(
                pid,
                "init".to_string(),
                root,
                None,
                Weak::clone(weak),
                "/".to_string(),
                Environment::new(),
            );
            let mut table = BTreeMap::new();
            table.insert(pid, init.clone());
            log::debug!("Booted process coordinator for computer {}", computer.0);
            Self {
                computer,
                table: RefCell::new(table),
                pids: RefCell::new(pids),
                init,
            }
        }))
    }

    pub fn computer(&self) -> ComputerId {
        self.computer
    }

    /// The first process, owned by root.
    pub fn init(&self) -> &Process {
        &self.init
    }

    /// All live processes ordered by PID.
    pub fn processes(&self) -> Vec<Process> {
        self.table.borrow().values().cloned().collect()
    }

    pub fn find(&self, pid: u32) -> Option<Process> {
        self.table.borrow().get(&pid).cloned()
    }

    /// Live processes whose parent is `parent`.
    pub fn child_processes(&self, parent: &Process) -> Vec<Process> {
        self.table
            .borrow()
            .values()
            .filter(|p| p.parent().is_some_and(|pp| pp.ptr_eq(parent)))
            .cloned()
            .collect()
    }

    /// Live processes owned by the user with `user_id`.
    pub fn tasks_for_user(&self, user_id: u32) -> Vec<Process> {
        self.table
            .borrow()
            .values()
            .filter(|p| p.user().id == user_id)
            .cloned()
            .collect()
    }

    fn register(&self, process: &Process) {
        self.table
            .borrow_mut()
            .insert(process.id(), process.clone());
    }

    fn release(&self, pid: u32) {
        self.table.borrow_mut().remove(&pid);
        self.pids.borrow_mut().release(pid);
        log::debug!("Released pid {pid}");
    }
}

impl fmt::Debug for ProcessCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessCoordinator")
            .field("computer", &self.computer)
            .field("processes", &self.table.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Process
// ---------------------------------------------------------------------------

struct ProcessInner {
    id: u32,
    name: RefCell<String>,
    user: Rc<User>,
    parent: Option<Process>,
    coordinator: Weak<ProcessCoordinator>,
    working_directory: RefCell<String>,
    environment: RefCell<Environment>,
    alive: Cell<bool>,
    exit_code: Cell<i32>,
    on_death: RefCell<Vec<DeathListener>>,
}

/// Handle to a process. Clones refer to the same process.
#[derive(Clone)]
pub struct Process(Rc<ProcessInner>);

impl Process {
    fn new(
        id: u32,
        name: String,
        user: Rc<User>,
        parent: Option<Process>,
        coordinator: Weak<ProcessCoordinator>,
        working_directory: String,
        environment: Environment,
    ) -> Self {
        Self(Rc::new(ProcessInner {
            id,
            name: RefCell::new(name),
            user,
            parent,
            coordinator,
            working_directory: RefCell::new(working_directory),
            environment: RefCell::new(environment),
            alive: Cell::new(true),
            exit_code: Cell::new(0),
            on_death: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn name(&self) -> String {
        self.0.name.borrow().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.0.name.borrow_mut() = name.to_string();
    }

    pub fn user(&self) -> &Rc<User> {
        &self.0.user
    }

    pub fn parent(&self) -> Option<&Process> {
        self.0.parent.as_ref()
    }

    pub fn is_alive(&self) -> bool {
        self.0.alive.get()
    }

    /// Exit code; meaningful once the process is dead.
    pub fn exit_code(&self) -> i32 {
        self.0.exit_code.get()
    }

    pub fn working_directory(&self) -> String {
        self.0.working_directory.borrow().clone()
    }

    pub fn set_working_directory(&self, path: &str) {
        *self.0.working_directory.borrow_mut() = path.to_string();
    }

    /// A copy of the environment.
    pub fn environment(&self) -> Environment {
        self.0.environment.borrow().clone()
    }

    pub fn env_var(&self, name: &str) -> Option<String> {
        self.0.environment.borrow().get(name).cloned()
    }

    pub fn set_env_var(&self, name: &str, value: &str) {
        self.0
            .environment
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_env_var(&self, name: &str) -> Option<String> {
        self.0.environment.borrow_mut().remove(name)
    }

    /// Whether both handles refer to the same process.
    pub fn ptr_eq(&self, other: &Process) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether `ancestor` appears on this process's parent chain.
    pub fn is_descendant_of(&self, ancestor: &Process) -> bool {
        let mut current = self.parent();
        while let Some(p) = current {
            if p.ptr_eq(ancestor) {
                return true;
            }
            current = p.parent();
        }
        false
    }

    /// Live children, computed from the coordinator's table.
    pub fn children(&self) -> Vec<Process> {
        match self.0.coordinator.upgrade() {
            Some(coordinator) => coordinator.child_processes(self),
            None => Vec::new(),
        }
    }

    fn coordinator(&self) -> Result<Rc<ProcessCoordinator>> {
        self.0
            .coordinator
            .upgrade()
            .ok_or(VosError::ProcessDead(self.0.id))
    }

    /// Fork a child running as the same user.
    pub fn fork(&self) -> Result<Process> {
        self.fork_as_user(Rc::clone(&self.0.user))
    }

    /// Fork a child running as `user`.
    ///
    /// The child inherits the working directory and a deep copy of the
    /// environment. `user` must belong to this process's computer; when it
    /// differs from the current user, `USER` and `HOME` are rewritten.
    pub fn fork_as_user(&self, user: Rc<User>) -> Result<Process> {
        if !self.is_alive() {
            return Err(VosError::ProcessDead(self.0.id));
        }
        let coordinator = self.coordinator()?;
        if user.computer != self.0.user.computer || user.computer != coordinator.computer {
            return Err(VosError::Unauthorized(
                "An invalid attempt was made to execute a process on one computer by the user \
                 of another computer."
                    .to_string(),
            ));
        }

        let mut environment = self.environment();
        if user.id != self.0.user.id {
            environment.insert("USER".to_string(), user.name.clone());
            environment.insert("HOME".to_string(), user.home.clone());
        }

        let pid = coordinator.pids.borrow_mut().allocate();
        let child = Process::new(
            pid,
            self.name(),
            user,
            Some(self.clone()),
            Weak::clone(&self.0.coordinator),
            self.working_directory(),
            environment,
        );
        coordinator.register(&child);
        log::debug!(
            "Forked pid {pid} from {} as {}",
            self.0.id,
            child.user().name
        );
        Ok(child)
    }

    /// Kill this process and, first, all of its live descendants.
    ///
    /// Death listeners fire once, after every descendant is dead. Killing a
    /// dead process does nothing.
    pub fn kill(&self, exit_code: i32) {
        if !self.is_alive() {
            log::warn!("Ignoring kill of dead pid {}", self.0.id);
            return;
        }
        let coordinator = self.0.coordinator.upgrade();
        if let Some(coordinator) = &coordinator {
            for child in coordinator.child_processes(self) {
                child.kill(exit_code);
            }
        }
        if !self.is_alive() {
            return;
        }
        self.0.exit_code.set(exit_code);
        self.0.alive.set(false);
        if let Some(coordinator) = &coordinator {
            coordinator.release(self.0.id);
        }
        log::debug!("Killed pid {} with exit code {exit_code}", self.0.id);

        let listeners = std::mem::take(&mut *self.0.on_death.borrow_mut());
        for listener in listeners {
            listener(self);
        }
    }

    /// Run `listener` when this process dies. Runs immediately if it is
    /// already dead.
    pub fn on_death(&self, listener: impl FnOnce(&Process) + 'static) {
        if self.is_alive() {
            self.0.on_death.borrow_mut().push(Box::new(listener));
        } else {
            listener(self);
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.0.id)
            .field("name", &*self.0.name.borrow())
            .field("user", &self.0.user.name)
            .field("alive", &self.0.alive.get())
            .finish()
    }
}
