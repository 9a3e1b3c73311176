use std::ffi::OsStr;
use std::path::Path;
use std::process::{Child, Command};

/// Build a `Command` suitable for running tools behind a UI application.
pub fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    configure_for_background(&mut cmd);
    cmd
}

#[cfg(windows)]
fn configure_for_background(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;

    // Keep tool invocations from popping console windows over the player.
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn configure_for_background(_cmd: &mut Command) {}

/// The platform's discard file, for tool bookkeeping we never want to keep.
pub fn discard_path() -> &'static Path {
    if cfg!(windows) {
        Path::new("NUL")
    } else {
        Path::new("/dev/null")
    }
}

/// Kill a child process and everything it spawned, then reap it.
///
/// Best effort: a child that already exited is not an error.
pub fn kill_tree(child: &mut Child) {
    #[cfg(windows)]
    {
        // `Child::kill` does not reach grandchildren on Windows.
        let pid = child.id().to_string();
        let _ = command("taskkill").args(["/PID", &pid, "/T", "/F"]).status();
    }

    let _ = child.kill();
    let _ = child.wait();
}
