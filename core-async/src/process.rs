//! Child process abstractions.
//!
//! Re-exports `tokio::process` so decoder subprocesses are spawned and
//! reaped on the same runtime that drives the pipeline, plus a helper for
//! delivering an interrupt to a running child.

pub use std::process::{ExitStatus, Stdio};
pub use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Sends an interrupt (`SIGINT`) to the child process.
///
/// Returns `Ok(false)` if the child has already been reaped and has no pid.
#[cfg(unix)]
pub fn interrupt(child: &mut Child) -> std::io::Result<bool> {
    let Some(pid) = child.id() else {
        return Ok(false);
    };

    let pid = libc_pid(pid)?;
    // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs to
    // a child we have not reaped yet, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc == 0 {
        Ok(true)
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Non-unix targets have no interrupt signal; the child is killed instead.
#[cfg(not(unix))]
pub fn interrupt(child: &mut Child) -> std::io::Result<bool> {
    if child.id().is_none() {
        return Ok(false);
    }
    child.start_kill()?;
    Ok(true)
}

#[cfg(unix)]
fn libc_pid(pid: u32) -> std::io::Result<libc::pid_t> {
    libc::pid_t::try_from(pid).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("pid {} does not fit pid_t", pid),
        )
    })
}
