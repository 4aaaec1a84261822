use std::path::Path;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::debug;

/// Splits a shell-style argument string, e.g. `--threads 4 --name 'my model'`.
pub fn split_args(args: &str) -> Result<Vec<String>> {
    let split = shlex::split(args).ok_or_else(|| anyhow!("Arguments <{}> are not valid shell words", args))?;
    debug!("Split arguments <{}> into parts: <{}>", args, split.join(", "));
    Ok(split)
}

pub fn build_command(exec_path: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new(exec_path);
    cmd.args(args);
    cmd
}

#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(unix)]
fn send_term_signal(pid: u32) -> Result<()> {
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::SIGTERM,
    )
    .map_err(|e| anyhow!("Error sending SIGTERM to process <{}>: {}", pid, e))
}

fn wait_with_deadline(child: &mut Child, grace: Duration) -> Result<bool> {
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child.try_wait()? {
            debug!("Process <{}> exited with <{}>", child.id(), status);
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Gives the child `grace` to exit on its own, then asks it to terminate, then kills it.
pub fn stop_child(child: &mut Child, grace: Duration) -> Result<()> {
    if wait_with_deadline(child, grace)? {
        return Ok(());
    }

    #[cfg(unix)]
    {
        debug!("Sending SIGTERM to process <{}>", child.id());
        if is_process_alive(child.id()) {
            send_term_signal(child.id())?;
        }
        if wait_with_deadline(child, grace)? {
            return Ok(());
        }
    }

    debug!("Killing process <{}>", child.id());
    child.kill()?;
    child.wait()?;
    Ok(())
}
