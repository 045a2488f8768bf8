//! Boot-time content for the terminal's computer.

use std::rc::Rc;

use vos_kernel::{Computer, FileSystem};
use vos_shell::coreutils;
use vos_types::error::Result;

const MOTD: &str = "Welcome to VOS.\n\
Try `ls /bin`, `ps`, or `./hello.sh world` from your home directory.\n";

const HELLO_SCRIPT: &str = "# Greets its first argument.\n\
greet() {\n\
  echo \"Hello, $1!\"\n\
}\n\
if_missing() { test -z \"$1\"; }\n\
if_missing \"$1\" && greet stranger || greet \"$1\"\n";

/// Install core utilities and demo files.
///
/// Utilities go into `/bin` and also back the content resolver, so they
/// stay reachable when `PATH` is cleared.
pub fn populate(computer: &Computer) -> Result<()> {
    let root = computer.super_user();
    let fs = computer.file_system(&root);
    coreutils::install(&fs, "/bin")?;
    computer.set_programs(Rc::new(coreutils::catalog()));

    if !fs.directory_exists("/etc") {
        fs.create_directory("/etc")?;
    }
    fs.write_all_text("/etc/motd", MOTD)?;
    fs.write_all_text("/etc/hostname", &format!("{}\n", computer.hostname()))?;

    for user in computer.users().iter().filter(|u| !u.is_super_user()) {
        let script = format!("{}/hello.sh", user.home);
        fs.write_all_text(&script, HELLO_SCRIPT)?;
        fs.set_executable(&script, true)?;
    }
    log::info!("Populated {} with core utilities", computer.hostname());
    Ok(())
}
