//! VOS terminal entry point.
//!
//! Boots a world with one computer from `vos.toml` (path from the first
//! argument or `VOS_CONFIG`, built-in defaults otherwise), logs in the
//! configured user, and runs a shell session on stdin/stdout until the
//! shell exits. The process exit code is the shell's.

mod host_console;
mod world_setup;

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use futures_lite::future;

use host_console::HostConsole;
use vos_kernel::{Computer, User, World};
use vos_shell::TerminalSession;
use vos_types::config::VosConfig;
use vos_types::console::TextConsole;
use vos_types::network::StaticNetwork;

/// The configured login, else the first standard user, else root.
fn login_user(computer: &Computer, login: Option<&str>) -> Result<Rc<User>> {
    if let Some(name) = login {
        return computer
            .find_user_by_name(name)
            .with_context(|| format!("login user {name} is not configured"));
    }
    Ok(computer
        .users()
        .iter()
        .find(|u| !u.is_super_user())
        .map_or_else(|| computer.super_user(), Rc::clone))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1).or_else(|| std::env::var("VOS_CONFIG").ok()) {
        Some(path) => VosConfig::load(Path::new(&path)).with_context(|| format!("loading {path}"))?,
        None => VosConfig::default(),
    };

    let world = World::new();
    let computer = world.add_computer(&config.computer)?;
    world_setup::populate(&computer)?;
    if !config.network.host.is_empty() {
        log::info!("Network has {} known hosts", config.network.host.len());
        computer.set_network(Rc::new(StaticNetwork::new(config.network.host.clone())));
    }

    let user = login_user(&computer, config.computer.login.as_deref())?;
    let console: Rc<dyn TextConsole> = Rc::new(HostConsole::stdio());
    if let Ok(motd) = computer.file_system(&user).read_to_string("/etc/motd") {
        console.write_text(&motd);
    }

    let session = TerminalSession::new(Rc::clone(&computer), console, config.shell.clone());
    let code = future::block_on(session.run(user))?;
    log::info!("VOS shut down with exit code {code}");
    std::process::exit(code);
}
