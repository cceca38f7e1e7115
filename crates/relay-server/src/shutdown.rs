use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Process-wide shutdown latch.
///
/// One writer (the signal handler, which only flips the atomic), one reader
/// (the event loop, between wakeups). Raising it more than once is the same
/// as raising it once.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// A flag with no signal wiring; raise it directly. Used by tests and
    /// embedders that drive shutdown themselves.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Installs `SIGINT`/`SIGTERM` handlers that raise the flag, and sets
    /// `SIGPIPE` to ignore so a dead peer cannot kill the process inside a
    /// send. Call once at startup, before the loop.
    pub fn install() -> io::Result<Self> {
        let flag = Self::new();
        signal_hook::flag::register(SIGINT, Arc::clone(&flag.0))?;
        signal_hook::flag::register(SIGTERM, Arc::clone(&flag.0))?;
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        Ok(flag)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raising_is_idempotent() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_raised());
        flag.raise();
        flag.raise();
        assert!(flag.is_raised());
    }

    #[test]
    fn clones_share_the_latch() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();
        flag.raise();
        assert!(observer.is_raised());
    }
}
