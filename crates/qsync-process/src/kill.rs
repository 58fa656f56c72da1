use std::{
    io,
    process::{Child, Command, ExitStatus},
    time::Duration,
};

/// Start the child in its own process group so that terminating it also reaches the
/// processes it spawned (the Bazel client forks a server and helper processes that would
/// otherwise keep the output pipes open).
pub(crate) fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        // SAFETY: `setpgid` is async-signal-safe and runs in the forked child before exec.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
    }
}

/// SIGTERM the process group, wait up to `grace`, then SIGKILL it.
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    tracing::debug!(target = "qsync.process", pid = child.id(), "terminating process tree");

    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        // SAFETY: plain syscall; a negative pid addresses the process group.
        unsafe {
            libc::kill(-pgid, libc::SIGTERM);
        }

        let deadline = std::time::Instant::now() + grace;
        while std::time::Instant::now() < deadline {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // SAFETY: as above.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
        child.wait()
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill()?;
        child.wait()
    }
}
