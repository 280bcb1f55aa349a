//! Child process helpers shared by the command runner and interactive spawner.

use std::process::Child;
use std::time::Duration;

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminate a child: SIGTERM first, then SIGKILL once `grace` has passed.
#[cfg(unix)]
pub(crate) fn terminate(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    let _ = kill(pid, Signal::SIGTERM);

    if wait_for_exit(child, grace) {
        return;
    }

    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
pub(crate) fn terminate(child: &mut Child, _grace: Duration) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Poll until the child exits or `within` elapses. Returns whether it exited.
pub(crate) fn wait_for_exit(child: &mut Child, within: Duration) -> bool {
    let deadline = std::time::Instant::now() + within;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return false,
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
