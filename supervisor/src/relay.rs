//! Fallback for runtimes where the supervisor cannot replace itself.
//!
//! The target runs as a child while the supervisor stays resident and does
//! what an init process must: forward termination and job-control signals,
//! and reap every child that exits. When running as PID 1 that includes
//! orphans re-parented to us; otherwise only our own child is waited on.
//!
//! Signals are blocked before the child is spawned and collected
//! synchronously with `sigwait`, so there are no signal handlers and no
//! window where a SIGCHLD can be lost. This relies on the supervisor being
//! single-threaded.

use nix::errno::Errno;
use nix::sys::signal::{kill, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpid, Pid};
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

const FORWARDED: [Signal; 7] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGQUIT,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGWINCH,
];

fn io_err(e: Errno) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Spawns `cmd`, relays signals to it until it exits, and returns the exit
/// code to leave with.
pub fn run(mut cmd: Command) -> io::Result<i32> {
    let mut mask = SigSet::empty();
    for sig in FORWARDED {
        mask.add(sig);
    }
    mask.add(Signal::SIGCHLD);

    let previous = mask.thread_swap_mask(SigmaskHow::SIG_BLOCK).map_err(io_err)?;

    // The child must not inherit our blocked set.
    unsafe {
        cmd.pre_exec(move || previous.thread_set_mask().map_err(io_err));
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = previous.thread_set_mask();
            return Err(e);
        }
    };
    let child_pid = Pid::from_raw(child.id() as i32);
    let reap_all = getpid() == Pid::from_raw(1);
    log::info!("Relaying signals to pid {} (reaping orphans: {})", child_pid, reap_all);

    let result = supervise(&mask, child_pid, reap_all);
    let _ = previous.thread_set_mask();
    result
}

fn supervise(mask: &SigSet, child: Pid, reap_all: bool) -> io::Result<i32> {
    loop {
        let sig = mask.wait().map_err(io_err)?;

        if sig == Signal::SIGCHLD {
            if let Some(code) = reap(child, reap_all)? {
                log::info!("Pid {} exited with code {}", child, code);
                return Ok(code);
            }
            continue;
        }

        log::info!("Forwarding {:?} to pid {}", sig, child);
        match kill(child, sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => log::warn!("Failed to forward {:?} to pid {}: {}", sig, child, e),
        }
    }
}

/// Collects every exited child without blocking. Returns the exit code of
/// `child` once it has been reaped.
fn reap(child: Pid, reap_all: bool) -> io::Result<Option<i32>> {
    let which = if reap_all { Pid::from_raw(-1) } else { child };
    let mut child_code = None;

    loop {
        match waitpid(which, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                let Some(code) = exit_code(&status) else {
                    continue;
                };
                if status.pid() == Some(child) {
                    child_code = Some(code);
                    if !reap_all {
                        break;
                    }
                } else {
                    log::debug!("Reaped orphan {:?} (code {})", status.pid(), code);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => return Err(io_err(e)),
        }
    }

    Ok(child_code)
}

/// Shell convention: the exit code, or 128 + signal number when killed.
fn exit_code(status: &WaitStatus) -> Option<i32> {
    match *status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
        _ => None,
    }
}
