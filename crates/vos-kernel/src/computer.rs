//! Computers and the world that holds them.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use vos_types::LocalFuture;
use vos_types::config::{ComputerConfig, MountKind};
use vos_types::console::TextConsole;
use vos_types::error::{Result, VosError};
use vos_types::network::NetworkConnection;
use vos_types::path;

use crate::process::{Process, ProcessCoordinator};
use crate::program::{Executable, ProgramContext, ProgramResolver, ScriptRunner};
use crate::user::{ComputerId, User};
use crate::vfs::{
    DeviceRegistry, DevicesFileSystem, FileSystem, MemoryFs, MountTable, VirtualFileSystem,
};

/// One simulated computer: users, processes, and a file system namespace.
pub struct Computer {
    id: ComputerId,
    hostname: String,
    narrative_id: Option<String>,
    search_path: String,
    users: Vec<Rc<User>>,
    file_system: Rc<MountTable>,
    coordinator: Rc<ProcessCoordinator>,
    systemd: Process,
    network: RefCell<Option<Rc<dyn NetworkConnection>>>,
    programs: RefCell<Option<Rc<dyn ProgramResolver>>>,
}

impl Computer {
    /// Boot a computer over an existing namespace.
    ///
    /// Fails with [`VosError::Config`] when the user list has no id-0 root.
    pub fn boot(id: ComputerId, config: &ComputerConfig, file_system: Rc<MountTable>) -> Result<Self> {
        let users: Vec<Rc<User>> = config
            .users
            .iter()
            .map(|u| Rc::new(User::from_config(u, id)))
            .collect();
        let coordinator = ProcessCoordinator::boot(id, &users)?;
        let systemd = coordinator.init().fork()?;
        systemd.set_name("systemd");
        log::info!("Booted computer {} ({} users)", config.hostname, users.len());
        Ok(Self {
            id,
            hostname: config.hostname.clone(),
            narrative_id: config.narrative_id.clone(),
            search_path: config.search_path.clone(),
            users,
            file_system,
            coordinator,
            systemd,
            network: RefCell::new(None),
            programs: RefCell::new(None),
        })
    }

    pub fn id(&self) -> ComputerId {
        self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn narrative_id(&self) -> Option<&str> {
        self.narrative_id.as_deref()
    }

    pub fn users(&self) -> &[Rc<User>] {
        &self.users
    }

    pub fn find_user_by_id(&self, id: u32) -> Option<Rc<User>> {
        self.users.iter().find(|u| u.id == id).map(Rc::clone)
    }

    pub fn find_user_by_name(&self, name: &str) -> Option<Rc<User>> {
        self.users.iter().find(|u| u.name == name).map(Rc::clone)
    }

    /// The id-0 root account. Present on every booted computer.
    pub fn super_user(&self) -> Rc<User> {
        Rc::clone(self.coordinator.init().user())
    }

    pub fn coordinator(&self) -> &Rc<ProcessCoordinator> {
        &self.coordinator
    }

    pub fn init(&self) -> &Process {
        self.coordinator.init()
    }

    /// Parent of all daemon processes.
    pub fn systemd(&self) -> &Process {
        &self.systemd
    }

    /// The unfiltered namespace.
    pub fn mount_table(&self) -> &Rc<MountTable> {
        &self.file_system
    }

    /// The namespace as seen by `user`.
    pub fn file_system(&self, user: &Rc<User>) -> VirtualFileSystem {
        let fs: Rc<dyn FileSystem> = Rc::clone(&self.file_system) as Rc<dyn FileSystem>;
        VirtualFileSystem::new(fs, Rc::clone(user))
    }

    pub fn network(&self) -> Option<Rc<dyn NetworkConnection>> {
        self.network.borrow().as_ref().map(Rc::clone)
    }

    pub fn set_network(&self, network: Rc<dyn NetworkConnection>) {
        *self.network.borrow_mut() = Some(network);
    }

    pub fn programs(&self) -> Option<Rc<dyn ProgramResolver>> {
        self.programs.borrow().as_ref().map(Rc::clone)
    }

    /// Set the content lookup consulted after `PATH`.
    pub fn set_programs(&self, programs: Rc<dyn ProgramResolver>) {
        *self.programs.borrow_mut() = Some(programs);
    }

    /// Fork a named daemon under `systemd`.
    pub fn create_daemon_process(&self, name: &str) -> Result<Process> {
        let daemon = self.systemd.fork()?;
        daemon.set_name(name);
        Ok(daemon)
    }

    /// Fork a login process for `user` from init, starting in their home
    /// directory with `USER`, `HOME`, and `PATH` set.
    pub fn create_login_process(&self, user: Rc<User>) -> Result<Process> {
        let login = self.coordinator.init().fork_as_user(Rc::clone(&user))?;
        login.set_name("login");
        login.set_working_directory(&user.home);
        login.set_env_var("USER", &user.name);
        login.set_env_var("HOME", &user.home);
        login.set_env_var("PATH", &self.search_path);
        Ok(login)
    }

    fn search_dirs(&self, process: &Process) -> Vec<String> {
        process
            .env_var("PATH")
            .unwrap_or_else(|| self.search_path.clone())
            .split(':')
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect()
    }

    /// Find what `name` would run for `process`: a path when it contains
    /// `/`, otherwise the first executable on `PATH`, otherwise the content
    /// resolver.
    pub fn resolve_program(&self, process: &Process, name: &str) -> Option<(String, Executable)> {
        let fs = self.file_system(process.user());
        if name.contains('/') {
            let path = path::make_absolute(&process.working_directory(), name, &process.user().home);
            return fs.executable(&path).ok().map(|exe| (path, exe));
        }
        for dir in self.search_dirs(process) {
            let candidate = path::combine(&dir, name);
            if fs.is_executable(&candidate) {
                return fs.executable(&candidate).ok().map(|exe| (candidate, exe));
            }
        }
        self.programs()
            .and_then(|resolver| resolver.resolve(name))
            .map(|program| (name.to_string(), Executable::Native(program)))
    }

    /// Run a program by name in a child of `parent`.
    ///
    /// Returns `Ok(None)` when nothing by that name exists. The child is
    /// killed with the program's exit code when it finishes.
    pub fn execute_program<'a>(
        &'a self,
        parent: &'a Process,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        args: &'a [String],
        scripts: Option<&'a dyn ScriptRunner>,
    ) -> LocalFuture<'a, Result<Option<i32>>> {
        Box::pin(async move {
            let Some((path, executable)) = self.resolve_program(parent, name) else {
                return Ok(None);
            };
            let child = parent.fork()?;
            child.set_name(path::file_name(&path));
            log::debug!("Executing {path} as pid {}", child.id());
            let ctx = ProgramContext {
                process: &child,
                computer: self,
                console,
                args,
            };
            let result = match executable {
                Executable::Native(program) => program.run(ctx).await,
                Executable::Script(source) => match scripts {
                    Some(runner) => runner.run_script(ctx, &path, source).await,
                    None => Err(VosError::NotExecutable(path.clone())),
                },
            };
            match result {
                Ok(code) | Err(VosError::ScriptEnd { exit_code: code, .. }) => {
                    child.kill(code);
                    Ok(Some(code))
                },
                Err(e) => {
                    child.kill(1);
                    Err(e)
                },
            }
        })
    }

    /// Command names offered for completion: executables on the default
    /// search path plus the content resolver's names.
    pub fn command_names(&self, process: &Process) -> Vec<String> {
        let fs = self.file_system(process.user());
        let mut names: Vec<String> = self
            .search_dirs(process)
            .iter()
            .filter_map(|dir| fs.files(dir).ok())
            .flatten()
            .filter(|f| fs.is_executable(f))
            .map(|f| path::file_name(&f).to_string())
            .collect();
        if let Some(resolver) = self.programs() {
            names.extend(resolver.names());
        }
        names.sort();
        names.dedup();
        names
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Every computer in the simulation plus the narrative-device registry that
/// lets them address each other.
pub struct World {
    computers: RefCell<Vec<Rc<Computer>>>,
    devices: Rc<DeviceRegistry>,
    next_id: Cell<u32>,
}

impl World {
    pub fn new() -> Self {
        Self {
            computers: RefCell::new(Vec::new()),
            devices: Rc::new(DeviceRegistry::new()),
            next_id: Cell::new(0),
        }
    }

    /// Build and boot a computer from configuration: an in-memory root with
    /// the configured directories and home directories, the configured
    /// mounts, and a device registration under its narrative id.
    pub fn add_computer(&self, config: &ComputerConfig) -> Result<Rc<Computer>> {
        let id = ComputerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let root = MemoryFs::new();
        for dir in &config.directories {
            root.create_directory(dir)?;
        }
        for user in &config.users {
            root.create_directory(&user.home_dir())?;
        }
        for mount in &config.mounts {
            root.create_directory(&mount.path)?;
        }
        let table = Rc::new(MountTable::new(Rc::new(root)));
        for mount in &config.mounts {
            let fs: Rc<dyn FileSystem> = match mount.kind {
                MountKind::Memory => Rc::new(MemoryFs::new()),
                MountKind::Devices => Rc::new(self.file_system()),
            };
            table.mount(&mount.path, fs)?;
        }

        let computer = Rc::new(Computer::boot(id, config, table)?);
        if let Some(narrative_id) = computer.narrative_id() {
            let fs: Rc<dyn FileSystem> = Rc::clone(computer.mount_table()) as Rc<dyn FileSystem>;
            self.devices.register(narrative_id, &fs);
        }
        self.computers.borrow_mut().push(Rc::clone(&computer));
        Ok(computer)
    }

    pub fn computers(&self) -> Vec<Rc<Computer>> {
        self.computers.borrow().clone()
    }

    pub fn narrative_computer(&self, narrative_id: &str) -> Option<Rc<Computer>> {
        self.computers
            .borrow()
            .iter()
            .find(|c| c.narrative_id() == Some(narrative_id))
            .map(Rc::clone)
    }

    pub fn devices(&self) -> &Rc<DeviceRegistry> {
        &self.devices
    }

    /// Every registered computer, addressed by narrative id.
    pub fn file_system(&self) -> DevicesFileSystem {
        DevicesFileSystem::new(Rc::clone(&self.devices))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;
    use futures_lite::future::block_on;
    use vos_types::config::{MountConfig, PrivilegeLevel, UserConfig};
    use vos_types::console::BufferConsole;

    struct Echo;

    impl Program for Echo {
        fn name(&self) -> &str {
            "echo-args"
        }

        fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
            Box::pin(async move {
                ctx.console.write_line(&ctx.args.join(" "));
                assert!(ctx.process.is_alive());
                Ok(ctx.args.len() as i32)
            })
        }
    }

    struct Resolver;

    impl ProgramResolver for Resolver {
        fn resolve(&self, name: &str) -> Option<Rc<dyn Program>> {
            (name == "echo-args").then(|| Rc::new(Echo) as Rc<dyn Program>)
        }

        fn names(&self) -> Vec<String> {
            vec!["echo-args".to_string()]
        }
    }

    fn config(hostname: &str, narrative_id: Option<&str>) -> ComputerConfig {
        ComputerConfig {
            hostname: hostname.to_string(),
            narrative_id: narrative_id.map(String::from),
            ..ComputerConfig::default()
        }
    }

    #[test]
    fn missing_root_fails_at_boot() {
        let world = World::new();
        let mut cfg = config("alpha", None);
        cfg.users = vec![UserConfig::new(7, "kim", PrivilegeLevel::Standard)];
        assert!(matches!(world.add_computer(&cfg), Err(VosError::Config(_))));
    }

    #[test]
    fn boot_creates_homes_and_daemons() {
        let world = World::new();
        let c = world.add_computer(&config("alpha", None)).unwrap();
        assert!(c.mount_table().directory_exists("/home/user"));
        assert!(c.mount_table().directory_exists("/root"));
        assert_eq!(c.systemd().name(), "systemd");
        let daemon = c.create_daemon_process("sshd").unwrap();
        assert!(daemon.parent().unwrap().ptr_eq(c.systemd()));
        assert_eq!(c.super_user().id, 0);
        assert_eq!(c.find_user_by_name("user").unwrap().id, 1000);
        assert!(c.find_user_by_id(42).is_none());
    }

    #[test]
    fn login_process_starts_home() {
        let world = World::new();
        let c = world.add_computer(&config("alpha", None)).unwrap();
        let user = c.find_user_by_name("user").unwrap();
        let login = c.create_login_process(user).unwrap();
        assert_eq!(login.working_directory(), "/home/user");
        assert_eq!(login.env_var("PATH").as_deref(), Some("/bin:/usr/bin"));
        assert_eq!(login.env_var("USER").as_deref(), Some("user"));
    }

    #[test]
    fn login_for_foreign_user_is_unauthorized() {
        let world = World::new();
        let a = world.add_computer(&config("alpha", None)).unwrap();
        let b = world.add_computer(&config("beta", None)).unwrap();
        let foreign = b.find_user_by_name("user").unwrap();
        assert!(matches!(
            a.create_login_process(foreign),
            Err(VosError::Unauthorized(_))
        ));
    }

    #[test]
    fn narrative_ids_are_addressable() {
        let world = World::new();
        let mut cfg = config("alpha", Some("alpha-01"));
        cfg.mounts.push(MountConfig {
            path: "/net".to_string(),
            kind: MountKind::Devices,
        });
        let alpha = world.add_computer(&cfg).unwrap();
        let beta = world.add_computer(&config("beta", Some("beta-02"))).unwrap();
        beta.mount_table().write_file("/tmp/secret", b"42").unwrap();

        assert_eq!(
            alpha.mount_table().read_file("/net/beta-02/tmp/secret").unwrap(),
            b"42"
        );
        assert_eq!(
            alpha.mount_table().directories("/net").unwrap(),
            vec!["/net/alpha-01", "/net/beta-02"]
        );
        assert!(world.narrative_computer("beta-02").is_some());
        assert_eq!(world.computers().len(), 2);
    }

    #[test]
    fn execute_program_via_resolver() {
        let world = World::new();
        let c = world.add_computer(&config("alpha", None)).unwrap();
        c.set_programs(Rc::new(Resolver));
        let console = Rc::new(BufferConsole::new());
        let args = vec!["a".to_string(), "b".to_string()];
        let shared: Rc<dyn TextConsole> = Rc::clone(&console) as Rc<dyn TextConsole>;
        let code = block_on(c.execute_program(c.init(), shared, "echo-args", &args, None)).unwrap();
        assert_eq!(code, Some(2));
        assert_eq!(console.output(), "a b\n");
        // The child was reaped.
        assert_eq!(c.coordinator().processes().len(), 2);
    }

    #[test]
    fn execute_program_prefers_path() {
        let world = World::new();
        let c = world.add_computer(&config("alpha", None)).unwrap();
        c.mount_table().install_program("/bin/echo-args", Rc::new(Echo)).unwrap();
        let (path, _) = c.resolve_program(c.init(), "echo-args").unwrap();
        assert_eq!(path, "/bin/echo-args");
        let (path, _) = c.resolve_program(c.init(), "/bin/echo-args").unwrap();
        assert_eq!(path, "/bin/echo-args");
        assert!(c.command_names(c.init()).contains(&"echo-args".to_string()));
    }

    #[test]
    fn execute_unknown_program_is_none() {
        let world = World::new();
        let c = world.add_computer(&config("alpha", None)).unwrap();
        let console = Rc::new(BufferConsole::new());
        let code = block_on(c.execute_program(c.init(), console, "nope", &[], None)).unwrap();
        assert_eq!(code, None);
    }

    #[test]
    fn scripts_need_a_runner() {
        let world = World::new();
        let c = world.add_computer(&config("alpha", None)).unwrap();
        c.mount_table().write_file("/bin/hello", b"echo hi").unwrap();
        c.mount_table().set_executable("/bin/hello", true).unwrap();
        let console = Rc::new(BufferConsole::new());
        let err = block_on(c.execute_program(c.init(), console, "hello", &[], None)).unwrap_err();
        assert!(matches!(err, VosError::NotExecutable(_)));
    }
}
