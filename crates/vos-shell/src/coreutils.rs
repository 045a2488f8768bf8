//! Core utility programs: ls, cat, pwd, mkdir, rm, ps, whoami, chmod, ping.

use std::rc::Rc;

use futures_lite::future;
use vos_kernel::{FileSystem, Program, ProgramCatalog, ProgramContext, VirtualFileSystem};
use vos_types::LocalFuture;
use vos_types::error::{Result, VosError};
use vos_types::path;

/// Every core utility, for use as a content resolver.
pub fn catalog() -> ProgramCatalog {
    let mut catalog = ProgramCatalog::new();
    catalog.register(Rc::new(LsCmd));
    catalog.register(Rc::new(CatCmd));
    catalog.register(Rc::new(PwdCmd));
    catalog.register(Rc::new(MkdirCmd));
    catalog.register(Rc::new(RmCmd));
    catalog.register(Rc::new(PsCmd));
    catalog.register(Rc::new(WhoamiCmd));
    catalog.register(Rc::new(ChmodCmd));
    catalog.register(Rc::new(PingCmd));
    catalog
}

/// Install every core utility as an executable under `dir`.
pub fn install(fs: &dyn FileSystem, dir: &str) -> Result<()> {
    if !fs.directory_exists(dir) {
        fs.create_directory(dir)?;
    }
    for program in catalog().iter() {
        fs.install_program(&path::combine(dir, program.name()), Rc::clone(program))?;
    }
    Ok(())
}

fn file_system(ctx: &ProgramContext<'_>) -> VirtualFileSystem {
    ctx.computer.file_system(ctx.process.user())
}

fn resolve(ctx: &ProgramContext<'_>, arg: &str) -> String {
    let home = ctx
        .process
        .env_var("HOME")
        .unwrap_or_else(|| ctx.process.user().home.clone());
    path::make_absolute(&ctx.process.working_directory(), arg, &home)
}

/// Split leading `-x` style flags from operands.
fn split_flags(args: &[String]) -> (String, Vec<&String>) {
    let mut flags = String::new();
    let mut operands = Vec::new();
    for arg in args {
        match arg.strip_prefix('-') {
            Some(f) if operands.is_empty() && !f.is_empty() => flags.push_str(f),
            _ => operands.push(arg),
        }
    }
    (flags, operands)
}

// ---------------------------------------------------------------------------
// ls
// ---------------------------------------------------------------------------

struct LsCmd;
impl Program for LsCmd {
    fn name(&self) -> &str {
        "ls"
    }
    fn description(&self) -> &str {
        "List directory contents"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let fs = file_system(&ctx);
            let targets: Vec<String> = if ctx.args.is_empty() {
                vec![".".to_string()]
            } else {
                ctx.args.to_vec()
            };
            let mut code = 0;
            for (i, arg) in targets.iter().enumerate() {
                let target = resolve(&ctx, arg);
                if fs.file_exists(&target) {
                    ctx.console.write_line(arg);
                    continue;
                }
                if !fs.directory_exists(&target) {
                    ctx.console.write_line(&format!(
                        "ls: cannot access '{arg}': No such file or directory"
                    ));
                    code = 2;
                    continue;
                }
                if targets.len() > 1 {
                    if i > 0 {
                        ctx.console.write_text("\n");
                    }
                    ctx.console.write_line(&format!("{arg}:"));
                }
                let mut entries: Vec<String> = fs
                    .directories(&target)?
                    .iter()
                    .map(|d| format!("{}/", path::file_name(d)))
                    .collect();
                entries.extend(
                    fs.files(&target)?
                        .iter()
                        .map(|f| path::file_name(f).to_string()),
                );
                entries.sort();
                for entry in entries {
                    ctx.console.write_line(&entry);
                }
            }
            Ok(code)
        })
    }
}

// ---------------------------------------------------------------------------
// cat
// ---------------------------------------------------------------------------

struct CatCmd;
impl Program for CatCmd {
    fn name(&self) -> &str {
        "cat"
    }
    fn description(&self) -> &str {
        "Print files, or the console input when given none"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            if ctx.args.is_empty() {
                while let Some(line) = ctx.console.read_line().await {
                    ctx.console.write_line(&line);
                }
                return Ok(0);
            }
            let fs = file_system(&ctx);
            let mut code = 0;
            for arg in ctx.args {
                match fs.read_to_string(&resolve(&ctx, arg)) {
                    Ok(text) => ctx.console.write_text(&text),
                    Err(e) => {
                        ctx.console.write_line(&format!("cat: {e}"));
                        code = 1;
                    },
                }
            }
            Ok(code)
        })
    }
}

// ---------------------------------------------------------------------------
// pwd
// ---------------------------------------------------------------------------

struct PwdCmd;
impl Program for PwdCmd {
    fn name(&self) -> &str {
        "pwd"
    }
    fn description(&self) -> &str {
        "Print working directory"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            ctx.console.write_line(&ctx.process.working_directory());
            Ok(0)
        })
    }
}

// ---------------------------------------------------------------------------
// mkdir
// ---------------------------------------------------------------------------

struct MkdirCmd;
impl Program for MkdirCmd {
    fn name(&self) -> &str {
        "mkdir"
    }
    fn description(&self) -> &str {
        "Create directories"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let (flags, operands) = split_flags(ctx.args);
            if operands.is_empty() {
                return Err(VosError::Command("usage: mkdir [-p] <dir>...".into()));
            }
            let parents = flags.contains('p');
            let fs = file_system(&ctx);
            let mut code = 0;
            for arg in operands {
                let target = resolve(&ctx, arg);
                if fs.directory_exists(&target) || fs.file_exists(&target) {
                    if !parents {
                        ctx.console.write_line(&format!(
                            "mkdir: cannot create directory '{arg}': File exists"
                        ));
                        code = 1;
                    }
                    continue;
                }
                if let Err(e) = fs.create_directory(&target) {
                    ctx.console.write_line(&format!("mkdir: {e}"));
                    code = 1;
                }
            }
            Ok(code)
        })
    }
}

// ---------------------------------------------------------------------------
// rm
// ---------------------------------------------------------------------------

/// Delete a directory tree bottom-up, yielding between deletions.
async fn remove_tree(fs: &VirtualFileSystem, root: &str) -> Result<()> {
    let mut pending = vec![root.to_string()];
    let mut visited = Vec::new();
    while let Some(dir) = pending.pop() {
        for file in fs.files(&dir)? {
            fs.delete_file(&file)?;
            future::yield_now().await;
        }
        pending.extend(fs.directories(&dir)?);
        visited.push(dir);
    }
    for dir in visited.iter().rev() {
        fs.delete_directory(dir)?;
        future::yield_now().await;
    }
    Ok(())
}

struct RmCmd;
impl Program for RmCmd {
    fn name(&self) -> &str {
        "rm"
    }
    fn description(&self) -> &str {
        "Remove files or directories"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let (flags, operands) = split_flags(ctx.args);
            if operands.is_empty() {
                return Err(VosError::Command("usage: rm [-rf] <path>...".into()));
            }
            let recursive = flags.contains('r') || flags.contains('R');
            let force = flags.contains('f');
            let fs = file_system(&ctx);
            let mut code = 0;
            for arg in operands {
                let target = resolve(&ctx, arg);
                let result = if fs.file_exists(&target) {
                    fs.delete_file(&target)
                } else if !fs.directory_exists(&target) {
                    if force {
                        continue;
                    }
                    Err(VosError::NotFound(arg.clone()))
                } else if recursive {
                    remove_tree(&fs, &target).await
                } else {
                    Err(VosError::IsADirectory(arg.clone()))
                };
                if let Err(e) = result {
                    ctx.console
                        .write_line(&format!("rm: cannot remove '{arg}': {e}"));
                    code = 1;
                }
            }
            Ok(code)
        })
    }
}

// ---------------------------------------------------------------------------
// ps
// ---------------------------------------------------------------------------

struct PsCmd;
impl Program for PsCmd {
    fn name(&self) -> &str {
        "ps"
    }
    fn description(&self) -> &str {
        "List running processes"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            ctx.console.write_line(&format!("{:>5} {:>5} {:<10} CMD", "PID", "PPID", "USER"));
            let mut processes = ctx.computer.coordinator().processes();
            processes.sort_by_key(|p| p.id());
            for p in processes {
                let ppid = p.parent().map_or(0, |parent| parent.id());
                ctx.console.write_line(&format!(
                    "{:>5} {:>5} {:<10} {}",
                    p.id(),
                    ppid,
                    p.user().name,
                    p.name()
                ));
            }
            Ok(0)
        })
    }
}

// ---------------------------------------------------------------------------
// whoami
// ---------------------------------------------------------------------------

struct WhoamiCmd;
impl Program for WhoamiCmd {
    fn name(&self) -> &str {
        "whoami"
    }
    fn description(&self) -> &str {
        "Print the current user name"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            ctx.console.write_line(&ctx.process.user().name);
            Ok(0)
        })
    }
}

// ---------------------------------------------------------------------------
// chmod
// ---------------------------------------------------------------------------

struct ChmodCmd;
impl Program for ChmodCmd {
    fn name(&self) -> &str {
        "chmod"
    }
    fn description(&self) -> &str {
        "Mark files executable (+x) or not (-x)"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let Some((mode, files)) = ctx.args.split_first() else {
                return Err(VosError::Command("usage: chmod +x|-x <file>...".into()));
            };
            let executable = match mode.as_str() {
                "+x" => true,
                "-x" => false,
                _ => {
                    return Err(VosError::Command(format!("chmod: invalid mode: '{mode}'")));
                },
            };
            let fs = file_system(&ctx);
            let mut code = 0;
            for arg in files {
                if let Err(e) = fs.set_executable(&resolve(&ctx, arg), executable) {
                    ctx.console.write_line(&format!("chmod: {e}"));
                    code = 1;
                }
            }
            Ok(code)
        })
    }
}

// ---------------------------------------------------------------------------
// ping
// ---------------------------------------------------------------------------

const PING_COUNT: u32 = 3;

struct PingCmd;
impl Program for PingCmd {
    fn name(&self) -> &str {
        "ping"
    }
    fn description(&self) -> &str {
        "Check whether a host answers"
    }
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let Some(host) = ctx.args.first() else {
                return Err(VosError::Command("usage: ping <host>".into()));
            };
            let Some(network) = ctx.computer.network() else {
                ctx.console.write_line("ping: connect: Network is unreachable");
                return Ok(2);
            };
            let Some(address) = network.resolve(host) else {
                ctx.console
                    .write_line(&format!("ping: {host}: Name or service not known"));
                return Ok(2);
            };
            ctx.console.write_line(&format!("PING {host} ({address})"));
            let mut received = 0;
            for seq in 1..=PING_COUNT {
                if network.ping(&address) {
                    received += 1;
                    ctx.console
                        .write_line(&format!("reply from {address}: icmp_seq={seq}"));
                } else {
                    ctx.console
                        .write_line(&format!("from {address}: icmp_seq={seq} Destination Host Unreachable"));
                }
                future::yield_now().await;
            }
            ctx.console.write_line(&format!(
                "{PING_COUNT} packets transmitted, {received} received"
            ));
            Ok(if received > 0 { 0 } else { 1 })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use vos_kernel::{Computer, Process, World};
    use vos_types::config::ComputerConfig;
    use vos_types::console::{BufferConsole, TextConsole};
    use vos_types::network::{HostEntry, StaticNetwork};

    struct Fixture {
        _world: World,
        computer: Rc<Computer>,
        shell: Process,
    }

    fn fixture() -> Fixture {
        let world = World::new();
        let computer = world.add_computer(&ComputerConfig::default()).unwrap();
        let root = computer.super_user();
        install(&computer.file_system(&root), "/bin").unwrap();
        let user = computer.find_user_by_name("user").unwrap();
        let shell = computer.create_login_process(user).unwrap();
        Fixture {
            _world: world,
            computer,
            shell,
        }
    }

    fn run(fx: &Fixture, name: &str, args: &[&str]) -> (i32, String) {
        let console = Rc::new(BufferConsole::new());
        let shared: Rc<dyn TextConsole> = Rc::clone(&console) as Rc<dyn TextConsole>;
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let code = block_on(fx.computer.execute_program(&fx.shell, shared, name, &args, None))
            .unwrap()
            .unwrap();
        (code, console.output())
    }

    #[test]
    fn install_places_every_program() {
        let fx = fixture();
        let fs = fx.computer.file_system(&fx.computer.super_user());
        for name in ["ls", "cat", "pwd", "mkdir", "rm", "ps", "whoami", "chmod", "ping"] {
            assert!(fs.is_executable(&format!("/bin/{name}")), "{name}");
        }
        assert_eq!(catalog().len(), 9);
    }

    #[test]
    fn pwd_and_whoami() {
        let fx = fixture();
        assert_eq!(run(&fx, "pwd", &[]), (0, "/home/user\n".to_string()));
        assert_eq!(run(&fx, "whoami", &[]), (0, "user\n".to_string()));
    }

    #[test]
    fn mkdir_then_ls() {
        let fx = fixture();
        assert_eq!(run(&fx, "mkdir", &["docs", "src"]).0, 0);
        let fs = fx.computer.file_system(fx.shell.user());
        fs.write_all_text("/home/user/notes.txt", "hi").unwrap();
        let (code, out) = run(&fx, "ls", &[]);
        assert_eq!(code, 0);
        assert_eq!(out, "docs/\nnotes.txt\nsrc/\n");
    }

    #[test]
    fn mkdir_existing_fails_without_p() {
        let fx = fixture();
        run(&fx, "mkdir", &["a"]);
        let (code, out) = run(&fx, "mkdir", &["a"]);
        assert_eq!(code, 1);
        assert!(out.contains("File exists"));
        assert_eq!(run(&fx, "mkdir", &["-p", "a"]).0, 0);
    }

    #[test]
    fn mkdir_outside_home_is_denied() {
        let fx = fixture();
        let (code, out) = run(&fx, "mkdir", &["/etc/x"]);
        assert_eq!(code, 1);
        assert!(out.starts_with("mkdir: "));
    }

    #[test]
    fn ls_missing_path() {
        let fx = fixture();
        let (code, out) = run(&fx, "ls", &["nope"]);
        assert_eq!(code, 2);
        assert_eq!(out, "ls: cannot access 'nope': No such file or directory\n");
    }

    #[test]
    fn cat_files_and_errors() {
        let fx = fixture();
        let fs = fx.computer.file_system(fx.shell.user());
        fs.write_all_text("/home/user/a.txt", "alpha\n").unwrap();
        assert_eq!(run(&fx, "cat", &["a.txt"]), (0, "alpha\n".to_string()));
        let (code, out) = run(&fx, "cat", &["missing"]);
        assert_eq!(code, 1);
        assert!(out.starts_with("cat: "));
    }

    #[test]
    fn cat_copies_console_input() {
        let fx = fixture();
        let console = Rc::new(BufferConsole::with_input(["x", "y"]));
        let shared: Rc<dyn TextConsole> = Rc::clone(&console) as Rc<dyn TextConsole>;
        let code = block_on(fx.computer.execute_program(&fx.shell, shared, "cat", &[], None));
        assert_eq!(code.unwrap(), Some(0));
        assert_eq!(console.output(), "x\ny\n");
    }

    #[test]
    fn rm_recursive_removes_tree() {
        let fx = fixture();
        let fs = fx.computer.file_system(fx.shell.user());
        fs.create_directory("/home/user/t/a/b").unwrap();
        fs.write_all_text("/home/user/t/a/b/f", "1").unwrap();
        fs.write_all_text("/home/user/t/g", "2").unwrap();
        let (code, out) = run(&fx, "rm", &["t"]);
        assert_eq!(code, 1);
        assert!(out.contains("cannot remove 't'"));
        assert_eq!(run(&fx, "rm", &["-r", "t"]).0, 0);
        assert!(!fs.directory_exists("/home/user/t"));
        assert_eq!(run(&fx, "rm", &["-f", "t"]).0, 0);
    }

    #[test]
    fn ps_lists_processes() {
        let fx = fixture();
        let (code, out) = run(&fx, "ps", &[]);
        assert_eq!(code, 0);
        assert!(out.contains(" init"));
        assert!(out.contains(" systemd"));
        assert!(out.contains(" ps"));
    }

    #[test]
    fn chmod_toggles_executable() {
        let fx = fixture();
        let fs = fx.computer.file_system(fx.shell.user());
        fs.write_all_text("/home/user/s.sh", "echo hi").unwrap();
        assert_eq!(run(&fx, "chmod", &["+x", "s.sh"]).0, 0);
        assert!(fs.is_executable("/home/user/s.sh"));
        assert_eq!(run(&fx, "chmod", &["-x", "s.sh"]).0, 0);
        assert!(!fs.is_executable("/home/user/s.sh"));
    }

    #[test]
    fn ping_uses_network() {
        let fx = fixture();
        let (code, out) = run(&fx, "ping", &["mainframe"]);
        assert_eq!(code, 2);
        assert!(out.contains("unreachable"));

        fx.computer.set_network(Rc::new(StaticNetwork::new(vec![HostEntry {
            name: "mainframe".into(),
            address: "10.0.0.5".into(),
            ports: Vec::new(),
        }])));
        let (code, out) = run(&fx, "ping", &["mainframe"]);
        assert_eq!(code, 0);
        assert!(out.starts_with("PING mainframe (10.0.0.5)\n"));
        assert!(out.ends_with("3 packets transmitted, 3 received\n"));
        assert_eq!(run(&fx, "ping", &["nowhere"]).0, 2);
    }

    #[test]
    fn usage_errors_propagate() {
        let fx = fixture();
        let console: Rc<dyn TextConsole> = Rc::new(BufferConsole::new());
        let err = block_on(fx.computer.execute_program(&fx.shell, console, "rm", &[], None));
        assert!(matches!(err, Err(VosError::Command(_))));
    }
}
